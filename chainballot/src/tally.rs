use crate::*;
use indexmap::IndexMap;
use tracing::info;

/// Tally of one option
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct OptionStats {
    pub count: u64,
    pub weight: u64,
    pub support: f64,
    pub weighted_support: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Abstention {
    pub count: u64,
    pub weight: u64,
}

/// Participation measured against the whole roll
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct Turnout {
    pub weighted: f64,
    pub unweighted: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct VotersCount {
    pub nb_eligible_voters: u64,
    pub nb_effective_voters: u64,
    pub weight_of_eligible_voters: u64,
    pub weight_of_effective_voters: u64,
}

/// First remaining preference counts of one instant run-off round
pub type RunoffRound = IndexMap<String, u64>;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VoteResult {
    /// Per option statistics, in definition order. First preferences only for instant run-off.
    pub options: IndexMap<String, OptionStats>,

    pub voters_count: VotersCount,
    pub abstention: Abstention,
    pub turnout: Turnout,

    /// Whether the acceptance criteria are met
    pub valid: bool,

    pub winner: Option<String>,

    /// Instant run-off rounds, in order
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rounds: Option<Vec<RunoffRound>>,
}

/// Compute the result of a processed vote
pub fn compute_result(vote: &ProcessedVote) -> Result<VoteResult, Error> {
    let definition = &vote.definition;
    let config = &definition.config;
    let method = definition.method()?;

    let first_preference_only = method == VoteMethod::InstantRunOff;
    let mut result = tally(
        config,
        &vote.eligible_voters,
        &vote.valid_votes,
        first_preference_only,
    )?;

    let criteria = config.winner_criteria.clone().unwrap_or_default();
    match method {
        VoteMethod::Binary => {
            result.winner = binary_winner(&result.options, &criteria)?;
        }
        VoteMethod::Approval => {
            result.winner = approval_winner(&result.options, &criteria);
        }
        VoteMethod::InstantRunOff => {
            let outcome = instant_runoff(
                &config.options,
                vote.valid_votes.iter().map(|(_, selection)| selection.as_slice()),
            );
            result.winner = outcome.winner;
            result.rounds = Some(outcome.rounds);
        }
    }

    info!(
        method = ?method,
        valid = result.valid,
        winner = ?result.winner,
        "computed vote result"
    );

    Ok(result)
}

/// Count selections, support, turnout and acceptance
///
/// With `first_preference_only` only the first selected option of each ballot is counted.
pub fn tally(
    config: &VoteConfig,
    roll: &EligibleVoterRoll,
    votes: &ValidVoteSet,
    first_preference_only: bool,
) -> Result<VoteResult, Error> {
    let mut options: IndexMap<String, OptionStats> = config
        .options
        .iter()
        .map(|option| (option.clone(), OptionStats::default()))
        .collect();
    let mut abstention = Abstention::default();
    let mut effective_weight = 0u64;

    for (voter, selection) in votes.iter() {
        let weight = roll.weight(voter).ok_or_else(|| {
            Error::InvariantViolation(format!("voter {} is not on the roll", voter))
        })?;
        effective_weight = add_weight(effective_weight, weight)?;

        if selection.is_empty() {
            abstention.count += 1;
            abstention.weight = add_weight(abstention.weight, weight)?;
            continue;
        }

        let counted = if first_preference_only {
            &selection[..1]
        } else {
            &selection[..]
        };
        for choice in counted {
            let stats = options.get_mut(choice).ok_or_else(|| {
                Error::InvariantViolation(format!("vote for unknown option {:?}", choice))
            })?;
            stats.count += 1;
            stats.weight = add_weight(stats.weight, weight)?;
        }
    }

    if !config.allow_abstention && abstention.count > 0 {
        return Err(Error::InvariantViolation(
            "abstention vote while abstention is not allowed".to_owned(),
        ));
    }

    let voters_count = VotersCount {
        nb_eligible_voters: roll.len() as u64,
        nb_effective_voters: votes.len() as u64,
        weight_of_eligible_voters: roll.total_weight()?,
        weight_of_effective_voters: effective_weight,
    };

    let (denominator, weight_denominator) = match config.compute_results_against {
        ComputeResultsAgainst::AllEligibleVoters => (
            voters_count.nb_eligible_voters,
            voters_count.weight_of_eligible_voters,
        ),
        ComputeResultsAgainst::ParticipantsOnly => (
            voters_count.nb_effective_voters,
            voters_count.weight_of_effective_voters,
        ),
    };

    for stats in options.values_mut() {
        stats.support = ratio(stats.count, denominator);
        stats.weighted_support = ratio(stats.weight, weight_denominator);
    }

    let turnout = Turnout {
        unweighted: ratio(
            voters_count.nb_effective_voters,
            voters_count.nb_eligible_voters,
        ),
        weighted: ratio(
            voters_count.weight_of_effective_voters,
            voters_count.weight_of_eligible_voters,
        ),
    };

    let valid = meets_acceptance(config.acceptance_criteria.as_ref(), &turnout);

    Ok(VoteResult {
        options,
        voters_count,
        abstention,
        turnout,
        valid,
        winner: None,
        rounds: None,
    })
}

fn add_weight(sum: u64, weight: u64) -> Result<u64, Error> {
    sum.checked_add(weight)
        .ok_or_else(|| Error::InvariantViolation("voter weights overflow".to_owned()))
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn meets_acceptance(criteria: Option<&AcceptanceCriteria>, turnout: &Turnout) -> bool {
    let min_turnout = match criteria.and_then(|c| c.min_turnout.as_ref()) {
        Some(min_turnout) => min_turnout,
        None => return true,
    };

    min_turnout.weighted.map_or(true, |min| turnout.weighted >= min)
        && min_turnout.unweighted.map_or(true, |min| turnout.unweighted >= min)
}

fn clears_min_support(stats: &OptionStats, min: &Thresholds) -> bool {
    stats.support >= min.unweighted.unwrap_or(0.0)
        && stats.weighted_support >= min.weighted.unwrap_or(0.0)
}

struct Leaders<'a> {
    /// Every option tied at the highest weight
    top: Vec<&'a str>,

    /// Those of `top` clearing their minimum support
    winners: Vec<&'a str>,
}

fn leaders<'a>(options: &'a IndexMap<String, OptionStats>, criteria: &WinnerCriteria) -> Leaders<'a> {
    let mut max_weight = 0;
    let mut top = vec![];
    for (option, stats) in options {
        if stats.weight > max_weight {
            max_weight = stats.weight;
            top = vec![option.as_str()];
        } else if stats.weight == max_weight {
            top.push(option.as_str());
        }
    }

    let winners = top
        .iter()
        .copied()
        .filter(|option| clears_min_support(&options[*option], &criteria.min_support_for(option)))
        .collect();

    Leaders { top, winners }
}

/// Winner of a two option vote
///
/// When the leading option misses its minimum support, the other option wins by default.
pub fn binary_winner(
    options: &IndexMap<String, OptionStats>,
    criteria: &WinnerCriteria,
) -> Result<Option<String>, Error> {
    let Leaders { top, winners } = leaders(options, criteria);

    match winners.len() {
        0 => Ok(options
            .keys()
            .find(|option| !top.contains(&option.as_str()))
            .cloned()),
        1 => Ok(Some(winners[0].to_owned())),
        2 => Ok(None),
        n => Err(Error::InvariantViolation(format!(
            "binary vote with {} leading options",
            n
        ))),
    }
}

/// Winner of an approval vote: the single heaviest option, if it clears its minimum support
pub fn approval_winner(
    options: &IndexMap<String, OptionStats>,
    criteria: &WinnerCriteria,
) -> Option<String> {
    match leaders(options, criteria).winners.as_slice() {
        [winner] => Some((*winner).to_owned()),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunoffOutcome {
    pub rounds: Vec<RunoffRound>,
    pub winner: Option<String>,
}

/// Instant run-off over ranked ballots
///
/// Each round counts the first remaining preference of every ballot that still has one. An
/// option with more than half of those ballots wins. Otherwise every option tied at the lowest
/// count is eliminated at once. If all remaining options are tied there is no winner.
pub fn instant_runoff<'a, I>(options: &[String], ballots: I) -> RunoffOutcome
where
    I: IntoIterator<Item = &'a [String]>,
{
    let mut ballots: Vec<Vec<&str>> = ballots
        .into_iter()
        .map(|ballot| ballot.iter().map(|s| s.as_str()).collect())
        .collect();
    let mut remaining: Vec<&str> = options.iter().map(|s| s.as_str()).collect();
    let mut rounds = vec![];

    loop {
        ballots.retain(|ballot| !ballot.is_empty());
        if ballots.is_empty() || remaining.is_empty() {
            return RunoffOutcome {
                rounds,
                winner: None,
            };
        }

        let mut round: RunoffRound = remaining.iter().map(|o| (o.to_string(), 0)).collect();
        for ballot in &ballots {
            if let Some(count) = round.get_mut(ballot[0]) {
                *count += 1;
            }
        }

        let majority = ballots.len() as u64 / 2 + 1;
        let winner = round
            .iter()
            .find(|(_, count)| **count >= majority)
            .map(|(option, _)| option.clone());
        let min = round.values().copied().min().unwrap_or(0);
        let eliminated: Vec<String> = round
            .iter()
            .filter(|(_, count)| **count == min)
            .map(|(option, _)| option.clone())
            .collect();
        rounds.push(round);

        if winner.is_some() || eliminated.len() == remaining.len() {
            return RunoffOutcome { rounds, winner };
        }

        remaining.retain(|option| !eliminated.iter().any(|e| e.as_str() == *option));
        for ballot in ballots.iter_mut() {
            ballot.retain(|option| !eliminated.iter().any(|e| e.as_str() == *option));
        }
    }
}
