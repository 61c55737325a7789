use crate::*;
use hmac::{Hmac, Mac, NewMac};
use indexmap::IndexMap;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use sha2::{Sha224, Sha256, Sha384, Sha512};
use std::convert::TryFrom;

/// Content of a vote chain's first entry
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VoteDefinitionDocument {
    /// Free-form description of what is being voted on.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposal: Option<serde_json::Value>,

    pub vote: VoteDefinition,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VoteDefinition {
    /// Raw vote method code, see [`VoteMethod`]
    #[serde(rename = "type")]
    pub vote_type: u8,

    pub phases_block_heights: PhaseWindow,

    /// Set when the vote is composed, after the eligible voters chain exists
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eligible_voters_chain_id: Option<ChainId>,

    pub config: VoteConfig,
}

impl VoteDefinition {
    pub fn method(&self) -> Result<VoteMethod, Error> {
        VoteMethod::try_from(self.vote_type).map_err(|_| Error::UnsupportedVoteType(self.vote_type))
    }
}

#[derive(Serialize, Deserialize, TryFromPrimitive, IntoPrimitive, Copy, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum VoteMethod {
    Binary = 0,
    Approval = 1,
    InstantRunOff = 2,
}

/// Ledger heights delimiting the commit and reveal phases (both bounds inclusive)
#[derive(Serialize, Deserialize, Copy, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PhaseWindow {
    pub commit_start: u64,
    pub commit_end: u64,
    pub reveal_start: u64,
    pub reveal_end: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VoteConfig {
    pub options: Vec<String>,
    pub min_options: usize,
    pub max_options: usize,
    pub allow_abstention: bool,
    pub compute_results_against: ComputeResultsAgainst,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acceptance_criteria: Option<AcceptanceCriteria>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner_criteria: Option<WinnerCriteria>,
}

impl VoteConfig {
    /// Whether a revealed selection is acceptable under this configuration
    pub fn accepts(&self, selection: &[String]) -> bool {
        if selection.is_empty() {
            return self.allow_abstention;
        }
        if selection.len() < self.min_options || selection.len() > self.max_options {
            return false;
        }
        for (i, choice) in selection.iter().enumerate() {
            if !self.options.contains(choice) || selection[..i].contains(choice) {
                return false;
            }
        }
        true
    }
}

#[derive(Serialize, Deserialize, Copy, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComputeResultsAgainst {
    AllEligibleVoters,
    ParticipantsOnly,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AcceptanceCriteria {
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_turnout: Option<Thresholds>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct WinnerCriteria {
    /// Per option minimum support, `*` applies to options without their own entry
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_support: Option<IndexMap<String, Thresholds>>,
}

impl WinnerCriteria {
    pub fn min_support_for(&self, option: &str) -> Thresholds {
        self.min_support
            .as_ref()
            .and_then(|m| m.get(option).or_else(|| m.get("*")))
            .cloned()
            .unwrap_or_default()
    }
}

#[derive(Serialize, Deserialize, Copy, Debug, Clone, PartialEq, Default)]
pub struct Thresholds {
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weighted: Option<f64>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unweighted: Option<f64>,
}

/// One line of an eligible voters registration
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EligibleVoter {
    /// Identity chain of the voter
    pub voter_id: ChainId,

    /// Missing means 1, zero removes the voter
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<u64>,
}

impl EligibleVoter {
    pub fn new(voter_id: ChainId, weight: Option<u64>) -> Self {
        EligibleVoter { voter_id, weight }
    }

    pub fn effective_weight(&self) -> u64 {
        self.weight.unwrap_or(1)
    }
}

#[derive(Serialize, Deserialize, Copy, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    pub fn hmac(self, key: &[u8], data: &[u8]) -> Vec<u8> {
        match self {
            DigestAlgorithm::Sha224 => hmac_with::<Hmac<Sha224>>(key, data),
            DigestAlgorithm::Sha256 => hmac_with::<Hmac<Sha256>>(key, data),
            DigestAlgorithm::Sha384 => hmac_with::<Hmac<Sha384>>(key, data),
            DigestAlgorithm::Sha512 => hmac_with::<Hmac<Sha512>>(key, data),
        }
    }
}

fn hmac_with<M: Mac + NewMac>(key: &[u8], data: &[u8]) -> Vec<u8> {
    // HMAC takes keys of any length
    let mut mac = match M::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => return vec![],
    };
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// A voter's choice, kept hidden behind a commitment until the reveal phase
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Ballot {
    /// Selected options, in preference order for ranked methods
    pub vote: Vec<String>,

    /// Hex encoded HMAC key
    pub secret: String,

    pub hmac_algo: DigestAlgorithm,
}

impl Ballot {
    pub fn new(vote: Vec<String>, secret: &[u8], hmac_algo: DigestAlgorithm) -> Self {
        Ballot {
            vote,
            secret: hex::encode(secret),
            hmac_algo,
        }
    }

    /// `HMAC(hmac_algo, secret, concat(vote))`
    pub fn digest(&self) -> Result<Vec<u8>, ValidationError> {
        let secret = hex::decode(&self.secret).map_err(|_| ValidationError::InvalidSecret)?;
        let voted: Vec<u8> = self.vote.iter().flat_map(|v| v.bytes()).collect();
        Ok(self.hmac_algo.hmac(&secret, &voted))
    }

    /// Hex commitment to publish during the commit phase
    pub fn commitment(&self) -> Result<Commitment, ValidationError> {
        Ok(Commitment {
            commitment: hex::encode(self.digest()?),
        })
    }

    /// Whether this ballot opens `commitment`
    pub fn opens(&self, commitment: &Commitment) -> bool {
        match (self.digest(), hex::decode(&commitment.commitment)) {
            (Ok(digest), Ok(committed)) => digest == committed,
            _ => false,
        }
    }
}

/// Content of a commit entry
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Commitment {
    pub commitment: String,
}
