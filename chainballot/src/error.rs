use crate::*;

use thiserror::Error;

/// Error types
#[derive(Debug, Error)]
pub enum Error {
    #[error("chainballot: invalid identity key encoding: {0}")]
    InvalidKeyEncoding(String),

    #[error("chainballot: bad key length: expected 32 or 64 bytes, found {0}")]
    BadKeyLength(usize),

    #[error("chainballot: mismatched public keys")]
    MismatchedPublicKeys,

    #[error("chainballot: public identity key {key} is not associated with identity {identity} at height {height:?}")]
    UnassociatedKey {
        key: String,
        identity: ChainId,
        height: Option<u64>,
    },

    #[error("chainballot: identity key lookup failed: {0}")]
    KeyLookup(String),

    #[error("chainballot: signature error: {0}")]
    SignatureError(#[from] ed25519_dalek::SignatureError),

    #[error("chainballot: external signer returned a signature that does not verify for public key {0}")]
    ExternalSignerMismatch(String),

    #[error("chainballot: no secret key available for {0}")]
    NoSecretKey(String),

    #[error("chainballot: invalid identifier - invalid hexidecimal")]
    IdentifierBadHex,

    #[error("chainballot: invalid identifier - wrong length")]
    IdentifierBadLen,

    #[error("chainballot: JSON error: {0}")]
    JSON(#[from] serde_json::Error),

    #[error("chainballot: ledger error: {0}")]
    Ledger(String),

    #[error("chainballot: chain {chain_id} first entry is not a valid vote definition: {reason}")]
    MissingDefinition { chain_id: ChainId, reason: String },

    #[error("chainballot: chain {chain_id} first entry is not a valid eligible voters registration: {reason}")]
    MissingEligibleVoters { chain_id: ChainId, reason: String },

    #[error("chainballot: vote chain initiator {vote} does not match eligible voters chain initiator {eligible_voters}")]
    IdentityMismatch {
        vote: ChainId,
        eligible_voters: ChainId,
    },

    #[error("chainballot: key is not authorized to append eligible voters to chain {0}")]
    AppendNotAuthorized(ChainId),

    #[error("chainballot: unsupported vote type {0}")]
    UnsupportedVoteType(u8),

    #[error("chainballot: invariant violation: {0}")]
    InvariantViolation(String),

    #[error("chainballot: invalid configuration: {0}")]
    Config(String),

    #[error("chainballot: operation cancelled or deadline exceeded")]
    Cancelled,

    #[error("chainballot: {0}")]
    Validation(#[from] ValidationError),
}

/// Reasons a single ledger entry was rejected.
///
/// None of these abort a chain parse: the entry is dropped and the reason recorded.
#[derive(Debug, Error)]
pub enum EntryError {
    #[error("entry has no external ids")]
    NoExternalIds,

    #[error("unknown entry tag {0:?}")]
    UnknownTag(String),

    #[error("invalid number of external ids for {kind} entry: expected {expected}, found {found}")]
    WrongExtIdCount {
        kind: RecordKind,
        expected: usize,
        found: usize,
    },

    #[error("invalid header for {kind} entry: {field} must be {expected} bytes, found {found}")]
    BadFieldLength {
        kind: RecordKind,
        field: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(ed25519_dalek::SignatureError),

    #[error("invalid signature of {0} entry")]
    InvalidSignature(RecordKind),

    #[error("identity verification failed: {0}")]
    Identity(#[from] Error),

    #[error("invalid content: {0}")]
    InvalidContent(String),

    #[error("replayed entry")]
    Replayed,

    #[error("vote definition already set by an earlier entry")]
    DuplicateDefinition,
}

impl From<serde_json::Error> for EntryError {
    fn from(err: serde_json::Error) -> Self {
        EntryError::InvalidContent(err.to_string())
    }
}

impl From<ValidationError> for EntryError {
    fn from(err: ValidationError) -> Self {
        EntryError::InvalidContent(err.to_string())
    }
}

/// Payload validation errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("chainballot validation: vote must offer at least one option")]
    NoOptions,

    #[error("chainballot validation: option labels must be non-empty")]
    EmptyOption,

    #[error("chainballot validation: option {0:?} is listed more than once")]
    DuplicateOption(String),

    #[error("chainballot validation: invalid option bounds min={min} max={max} for {available} options")]
    InvalidOptionBounds {
        min: usize,
        max: usize,
        available: usize,
    },

    #[error("chainballot validation: a binary vote needs exactly two options, found {0}")]
    BinaryOptionCount(usize),

    #[error("chainballot validation: threshold {0} is not within [0, 1]")]
    InvalidThreshold(f64),

    #[error("chainballot validation: support criteria refers to unknown option {0:?}")]
    UnknownCriteriaOption(String),

    #[error("chainballot validation: missing eligible voters chain id")]
    MissingEligibleVotersChain,

    #[error("chainballot validation: appended eligible voters batch must list at least one voter")]
    EmptyRegistration,

    #[error("chainballot validation: secret must be non-empty hexadecimal")]
    InvalidSecret,

    #[error("chainballot validation: commitment must be non-empty hexadecimal")]
    InvalidCommitment,

    #[error("chainballot validation: selection lists option {0:?} more than once")]
    DuplicateSelection(String),
}
