use crate::*;
use indexmap::IndexMap;

/// Voting weight of every eligible voter at the opening of the commit phase
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct EligibleVoterRoll(IndexMap<ChainId, u64>);

impl EligibleVoterRoll {
    /// Replay registrations made strictly before `commit_start`
    ///
    /// Registrations are taken in height order, keeping the given order for equal heights.
    /// A batch at or after `commit_start` is ignored as a whole. Within a batch the last write
    /// for a voter wins and a weight of zero removes the voter.
    pub fn resolve(registrations: &[EligibleVotersRegistration], commit_start: u64) -> Self {
        let mut ordered: Vec<&EligibleVotersRegistration> = registrations.iter().collect();
        ordered.sort_by_key(|registration| registration.height);

        let mut roll = IndexMap::new();
        for registration in ordered {
            if registration.height >= commit_start {
                break;
            }
            for voter in &registration.voters {
                match voter.effective_weight() {
                    0 => {
                        roll.shift_remove(&voter.voter_id);
                    }
                    weight => {
                        roll.insert(voter.voter_id, weight);
                    }
                }
            }
        }

        EligibleVoterRoll(roll)
    }

    pub fn weight(&self, voter: &ChainId) -> Option<u64> {
        self.0.get(voter).copied()
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

    /// Sum of all weights, failing when it does not fit a `u64`
    pub fn total_weight(&self) -> Result<u64, Error> {
        self.0.values().try_fold(0u64, |total, weight| {
            total
                .checked_add(*weight)
                .ok_or_else(|| Error::InvariantViolation("total voter weight overflows".to_owned()))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ChainId, &u64)> {
        self.0.iter()
    }
}

impl std::iter::FromIterator<(ChainId, u64)> for EligibleVoterRoll {
    fn from_iter<I: IntoIterator<Item = (ChainId, u64)>>(iter: I) -> Self {
        EligibleVoterRoll(iter.into_iter().filter(|(_, weight)| *weight != 0).collect())
    }
}
