use crate::*;
use std::collections::HashSet;

/// Structural checks on record contents
///
/// Holds no state: one value can be shared by any number of parsers.
#[derive(Default, Debug, Clone, Copy)]
pub struct Validator;

impl Validator {
    pub fn new() -> Self {
        Validator
    }

    /// Validate the content of a vote definition entry
    pub fn validate_definition(&self, doc: &VoteDefinitionDocument) -> Result<(), ValidationError> {
        let vote = &doc.vote;
        if vote.eligible_voters_chain_id.is_none() {
            return Err(ValidationError::MissingEligibleVotersChain);
        }
        self.validate_config(&vote.config)?;

        // Unknown methods are only refused when a result is computed
        if let Ok(VoteMethod::Binary) = vote.method() {
            if vote.config.options.len() != 2 {
                return Err(ValidationError::BinaryOptionCount(vote.config.options.len()));
            }
        }
        Ok(())
    }

    /// Validate the option configuration of a vote
    pub fn validate_config(&self, config: &VoteConfig) -> Result<(), ValidationError> {
        if config.options.is_empty() {
            return Err(ValidationError::NoOptions);
        }

        let mut seen = HashSet::new();
        for option in &config.options {
            if option.is_empty() {
                return Err(ValidationError::EmptyOption);
            }
            if !seen.insert(option.as_str()) {
                return Err(ValidationError::DuplicateOption(option.clone()));
            }
        }

        if config.max_options == 0
            || config.min_options > config.max_options
            || config.max_options > config.options.len()
        {
            return Err(ValidationError::InvalidOptionBounds {
                min: config.min_options,
                max: config.max_options,
                available: config.options.len(),
            });
        }

        if let Some(min_turnout) = config
            .acceptance_criteria
            .as_ref()
            .and_then(|c| c.min_turnout.as_ref())
        {
            validate_thresholds(min_turnout)?;
        }

        if let Some(min_support) = config
            .winner_criteria
            .as_ref()
            .and_then(|c| c.min_support.as_ref())
        {
            for (option, thresholds) in min_support {
                if option != "*" && !seen.contains(option.as_str()) {
                    return Err(ValidationError::UnknownCriteriaOption(option.clone()));
                }
                validate_thresholds(thresholds)?;
            }
        }

        Ok(())
    }

    /// Validate the content of an eligible voters entry
    ///
    /// The initial roster may be empty, an append batch may not.
    pub fn validate_eligible_voters(
        &self,
        voters: &[EligibleVoter],
        initial: bool,
    ) -> Result<(), ValidationError> {
        if voters.is_empty() && !initial {
            return Err(ValidationError::EmptyRegistration);
        }
        Ok(())
    }

    /// Validate the content of a reveal entry
    ///
    /// Whether the selection fits a particular vote is decided when reveals are matched, not here.
    pub fn validate_ballot(&self, ballot: &Ballot) -> Result<(), ValidationError> {
        if !is_hex(&ballot.secret) {
            return Err(ValidationError::InvalidSecret);
        }

        let mut seen = HashSet::new();
        for choice in &ballot.vote {
            if !seen.insert(choice.as_str()) {
                return Err(ValidationError::DuplicateSelection(choice.clone()));
            }
        }
        Ok(())
    }

    /// Validate the content of a commit entry
    pub fn validate_commitment(&self, commitment: &Commitment) -> Result<(), ValidationError> {
        if !is_hex(&commitment.commitment) {
            return Err(ValidationError::InvalidCommitment);
        }
        Ok(())
    }
}

fn validate_thresholds(thresholds: &Thresholds) -> Result<(), ValidationError> {
    for value in [thresholds.weighted, thresholds.unweighted].iter().flatten() {
        if !(0.0..=1.0).contains(value) {
            return Err(ValidationError::InvalidThreshold(*value));
        }
    }
    Ok(())
}

fn is_hex(s: &str) -> bool {
    !s.is_empty() && hex::decode(s).is_ok()
}
