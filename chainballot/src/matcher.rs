use crate::*;
use indexmap::IndexMap;
use std::collections::HashSet;

/// Selections of the voters whose reveal opens their commitment
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidVoteSet(IndexMap<ChainId, Vec<String>>);

impl ValidVoteSet {
    pub fn selection(&self, voter: &ChainId) -> Option<&[String]> {
        self.0.get(voter).map(|s| s.as_slice())
    }

    pub fn contains(&self, voter: &ChainId) -> bool {
        self.0.contains_key(voter)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ChainId, &Vec<String>)> {
        self.0.iter()
    }
}

impl std::iter::FromIterator<(ChainId, Vec<String>)> for ValidVoteSet {
    fn from_iter<I: IntoIterator<Item = (ChainId, Vec<String>)>>(iter: I) -> Self {
        ValidVoteSet(iter.into_iter().collect())
    }
}

/// What the result is computed from
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedVote {
    pub definition: VoteDefinition,
    pub eligible_voters: EligibleVoterRoll,
    pub valid_votes: ValidVoteSet,
}

/// Resolve the roll and match commits with reveals
pub fn process_vote(parsed: &ParsedVote) -> ProcessedVote {
    let definition = parsed.vote.definition.definition.vote.clone();
    let window = definition.phases_block_heights;

    let eligible_voters =
        EligibleVoterRoll::resolve(&parsed.eligible_voters.registrations, window.commit_start);
    let commits = valid_commits(&parsed.vote.commits, &window, &eligible_voters);
    let reveals = valid_reveals(
        &parsed.vote.reveals,
        &window,
        &eligible_voters,
        &definition.config,
    );
    let valid_votes = valid_votes(&commits, &reveals);

    ProcessedVote {
        definition,
        eligible_voters,
        valid_votes,
    }
}

fn by_height<'a, T, F>(records: &'a [T], height: F) -> Vec<&'a T>
where
    F: Fn(&T) -> u64,
{
    let mut sorted: Vec<&T> = records.iter().collect();
    sorted.sort_by_key(|r| height(r));
    sorted
}

/// The commit that counts for each eligible voter
///
/// Commits outside `[commit_start, commit_end]` are dropped. A later commit replaces an
/// earlier one.
pub fn valid_commits<'a>(
    commits: &'a [CommitRecord],
    window: &PhaseWindow,
    roll: &EligibleVoterRoll,
) -> IndexMap<ChainId, &'a CommitRecord> {
    let mut valid = IndexMap::new();
    for commit in by_height(commits, |c| c.height) {
        if !roll.contains(&commit.voter) {
            continue;
        }
        if commit.height < window.commit_start || commit.height > window.commit_end {
            continue;
        }
        valid.insert(commit.voter, commit);
    }
    valid
}

/// The reveal that counts for each eligible voter
///
/// Reveals after `reveal_end` are dropped. A voter with any reveal before `reveal_start`
/// is excluded altogether. Otherwise the first reveal with an acceptable selection counts.
pub fn valid_reveals<'a>(
    reveals: &'a [RevealRecord],
    window: &PhaseWindow,
    roll: &EligibleVoterRoll,
    config: &VoteConfig,
) -> IndexMap<ChainId, &'a RevealRecord> {
    let mut valid = IndexMap::new();
    let mut excluded = HashSet::new();

    for reveal in by_height(reveals, |r| r.height) {
        let voter = reveal.voter;
        if !roll.contains(&voter) || reveal.height > window.reveal_end {
            continue;
        }
        if reveal.height < window.reveal_start {
            excluded.insert(voter);
            valid.shift_remove(&voter);
            continue;
        }
        if excluded.contains(&voter) || valid.contains_key(&voter) {
            continue;
        }
        if config.accepts(&reveal.ballot.vote) {
            valid.insert(voter, reveal);
        }
    }
    valid
}

/// Keep the voters whose reveal opens their commitment
pub fn valid_votes(
    commits: &IndexMap<ChainId, &CommitRecord>,
    reveals: &IndexMap<ChainId, &RevealRecord>,
) -> ValidVoteSet {
    commits
        .iter()
        .filter_map(|(voter, commit)| {
            let reveal = reveals.get(voter)?;
            if reveal.ballot.opens(&commit.commitment) {
                Some((*voter, reveal.ballot.vote.clone()))
            } else {
                None
            }
        })
        .collect()
}
