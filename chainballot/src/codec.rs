use crate::*;
use digest::Digest;
use ed25519_dalek::PublicKey;
use ed25519_dalek::Signature;
use sha2::Sha512;
use std::convert::TryFrom;

pub const VOTE_TAG: &str = "factom-vote";
pub const ELIGIBLE_VOTERS_TAG: &str = "factom-vote-eligible-voters";
pub const COMMIT_TAG: &str = "factom-vote-commit";
pub const REVEAL_TAG: &str = "factom-vote-reveal";
pub const REGISTRATION_POINTER_TAG: &str = "Register Factom Vote";
pub const REGISTRATION_CHAIN_TAG: &str = "factom-vote-registration";

/// Version byte carried by vote definition entries
pub const PROTOCOL_VERSION: u8 = 0x00;

pub const REGISTRATION_CHAIN_CONTENT: &str =
    "This is the Factom Vote Registration Chain. It holds pointers to the individual vote chains.";

const ID_LEN: usize = 32;
const NONCE_LEN: usize = 32;
const PUBLIC_KEY_LEN: usize = 32;
const SIGNATURE_LEN: usize = 64;

/// Kinds of ledger record
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Definition,
    InitialEligibleVoters,
    AppendEligibleVoters,
    Commit,
    Reveal,
    RegistrationPointer,
    RegistrationChain,
}

impl RecordKind {
    /// First external id of every record of this kind
    pub fn tag(self) -> &'static str {
        match self {
            RecordKind::Definition => VOTE_TAG,
            RecordKind::InitialEligibleVoters | RecordKind::AppendEligibleVoters => {
                ELIGIBLE_VOTERS_TAG
            }
            RecordKind::Commit => COMMIT_TAG,
            RecordKind::Reveal => REVEAL_TAG,
            RecordKind::RegistrationPointer => REGISTRATION_POINTER_TAG,
            RecordKind::RegistrationChain => REGISTRATION_CHAIN_TAG,
        }
    }

    /// Number of external ids, tag included
    pub fn ext_id_count(self) -> usize {
        match self {
            RecordKind::Definition => 5,
            RecordKind::InitialEligibleVoters => 5,
            RecordKind::AppendEligibleVoters => 3,
            RecordKind::Commit => 4,
            RecordKind::Reveal => 2,
            RecordKind::RegistrationPointer => 2,
            RecordKind::RegistrationChain => 2,
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            RecordKind::Definition => "vote definition",
            RecordKind::InitialEligibleVoters => "initial eligible voters",
            RecordKind::AppendEligibleVoters => "append eligible voters",
            RecordKind::Commit => "vote commit",
            RecordKind::Reveal => "vote reveal",
            RecordKind::RegistrationPointer => "vote registration",
            RecordKind::RegistrationChain => "vote registration chain",
        };
        write!(f, "{}", name)
    }
}

fn sha512_of(parts: &[&[u8]]) -> Vec<u8> {
    let mut hasher = Sha512::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().to_vec()
}

/// Bytes signed by a vote definition's initiator
pub fn definition_signed_bytes(content: &[u8]) -> Vec<u8> {
    sha512_of(&[content])
}

/// Bytes signed for the first entry of an eligible voters chain
pub fn initial_eligible_voters_signed_bytes(nonce: &[u8], content: &[u8]) -> Vec<u8> {
    sha512_of(&[nonce, content])
}

/// Bytes signed for a batch appended to an eligible voters chain
pub fn append_eligible_voters_signed_bytes(
    chain_id: &ChainId,
    nonce: &[u8],
    content: &[u8],
) -> Vec<u8> {
    sha512_of(&[chain_id.as_bytes(), nonce, content])
}

/// Bytes signed by a voter for a commit
pub fn commit_signed_bytes(chain_id: &ChainId, content: &[u8]) -> Vec<u8> {
    sha512_of(&[chain_id.as_bytes(), content])
}

// Write path

/// Build the first entry of a vote chain
pub async fn build_vote_chain(
    definition: &VoteDefinitionDocument,
    initiator: &Identity,
    validator: &Validator,
) -> Result<EntryDraft, Error> {
    validator.validate_definition(definition)?;

    let content = serde_json::to_vec(definition)?;
    let signature = initiator.sign(&definition_signed_bytes(&content)).await?;

    Ok(EntryDraft::first_entry(
        vec![
            VOTE_TAG.as_bytes().to_vec(),
            vec![PROTOCOL_VERSION],
            initiator.chain_id.to_bytes(),
            initiator.public_key.to_bytes().to_vec(),
            signature.to_bytes().to_vec(),
        ],
        content,
    ))
}

/// Build the first entry of an eligible voters chain
pub async fn build_eligible_voters_chain(
    voters: &[EligibleVoter],
    initiator: &Identity,
    validator: &Validator,
) -> Result<EntryDraft, Error> {
    validator.validate_eligible_voters(voters, true)?;

    let nonce = generate_nonce();
    let content = serde_json::to_vec(voters)?;
    let signature = initiator
        .sign(&initial_eligible_voters_signed_bytes(&nonce, &content))
        .await?;

    Ok(EntryDraft::first_entry(
        vec![
            ELIGIBLE_VOTERS_TAG.as_bytes().to_vec(),
            initiator.chain_id.to_bytes(),
            nonce.to_vec(),
            initiator.public_key.to_bytes().to_vec(),
            signature.to_bytes().to_vec(),
        ],
        content,
    ))
}

/// Build an entry appending voters to an existing eligible voters chain
pub async fn build_append_eligible_voters(
    voters: &[EligibleVoter],
    chain_id: ChainId,
    initiator: &Identity,
    validator: &Validator,
) -> Result<EntryDraft, Error> {
    validator.validate_eligible_voters(voters, false)?;

    let nonce = generate_nonce();
    let content = serde_json::to_vec(voters)?;
    let signature = initiator
        .sign(&append_eligible_voters_signed_bytes(&chain_id, &nonce, &content))
        .await?;

    Ok(EntryDraft {
        chain_id,
        ext_ids: vec![
            ELIGIBLE_VOTERS_TAG.as_bytes().to_vec(),
            nonce.to_vec(),
            signature.to_bytes().to_vec(),
        ],
        content,
    })
}

/// Build the commit entry hiding `ballot`
pub async fn build_commit(
    vote_chain_id: ChainId,
    ballot: &Ballot,
    voter: &Identity,
    validator: &Validator,
) -> Result<EntryDraft, Error> {
    validator.validate_ballot(ballot)?;

    let content = serde_json::to_vec(&ballot.commitment()?)?;
    let signature = voter
        .sign(&commit_signed_bytes(&vote_chain_id, &content))
        .await?;

    Ok(EntryDraft {
        chain_id: vote_chain_id,
        ext_ids: vec![
            COMMIT_TAG.as_bytes().to_vec(),
            voter.chain_id.to_bytes(),
            voter.public_key.to_bytes().to_vec(),
            signature.to_bytes().to_vec(),
        ],
        content,
    })
}

/// Build the reveal entry disclosing `ballot`
///
/// Reveals are not signed: the commitment already binds the ballot to its voter.
pub fn build_reveal(
    vote_chain_id: ChainId,
    ballot: &Ballot,
    voter_id: ChainId,
    validator: &Validator,
) -> Result<EntryDraft, Error> {
    validator.validate_ballot(ballot)?;

    Ok(EntryDraft {
        chain_id: vote_chain_id,
        ext_ids: vec![REVEAL_TAG.as_bytes().to_vec(), voter_id.to_bytes()],
        content: serde_json::to_vec(ballot)?,
    })
}

/// Build the entry pointing a registration chain at a vote chain
pub fn build_registration_pointer(registration_chain_id: ChainId, vote_chain_id: ChainId) -> EntryDraft {
    EntryDraft {
        chain_id: registration_chain_id,
        ext_ids: vec![
            REGISTRATION_POINTER_TAG.as_bytes().to_vec(),
            vote_chain_id.to_bytes(),
        ],
        content: vec![],
    }
}

/// Build the first entry of a vote registration chain
///
/// Passing a nonce makes the chain id reproducible.
pub fn build_registration_chain(nonce: Option<[u8; 32]>) -> EntryDraft {
    let nonce = nonce.unwrap_or_else(generate_nonce);
    EntryDraft::first_entry(
        vec![REGISTRATION_CHAIN_TAG.as_bytes().to_vec(), nonce.to_vec()],
        REGISTRATION_CHAIN_CONTENT.as_bytes().to_vec(),
    )
}

// Read path

/// A verified vote definition
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionRecord {
    /// Initiator identity chain
    pub identity: ChainId,

    #[serde(with = "EdPublicKeyHex")]
    pub public_key: PublicKey,

    pub definition: VoteDefinitionDocument,
    pub height: u64,
    pub entry_hash: EntryHash,
}

/// A verified batch of eligible voters
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EligibleVotersRegistration {
    /// Identity anchored by the chain's first entry
    pub identity: ChainId,

    #[serde(with = "EdPublicKeyHex")]
    pub public_key: PublicKey,

    /// Whether this is the chain's first entry
    pub initial: bool,

    pub voters: Vec<EligibleVoter>,
    pub height: u64,
    pub entry_hash: EntryHash,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CommitRecord {
    pub voter: ChainId,

    #[serde(with = "EdPublicKeyHex")]
    pub public_key: PublicKey,

    pub commitment: Commitment,
    pub height: u64,
    pub entry_hash: EntryHash,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RevealRecord {
    pub voter: ChainId,
    pub ballot: Ballot,
    pub height: u64,
    pub entry_hash: EntryHash,
}

/// A decoded vote chain entry
#[derive(Debug, Clone)]
pub enum VoteChainRecord {
    Definition(DefinitionRecord),
    Commit(CommitRecord),
    Reveal(RevealRecord),
}

impl VoteChainRecord {
    pub fn kind(&self) -> RecordKind {
        match self {
            VoteChainRecord::Definition(_) => RecordKind::Definition,
            VoteChainRecord::Commit(_) => RecordKind::Commit,
            VoteChainRecord::Reveal(_) => RecordKind::Reveal,
        }
    }
}

/// An entry left out of a parse, with the reason
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RejectedEntry {
    pub entry_hash: EntryHash,
    pub height: u64,

    #[serde(serialize_with = "serialize_display")]
    pub error: EntryError,
}

impl RejectedEntry {
    pub fn new(entry: &Entry, error: EntryError) -> Self {
        RejectedEntry {
            entry_hash: entry.hash,
            height: entry.height(),
            error,
        }
    }
}

/// Decode and verify any entry found on a vote chain
pub async fn decode_vote_chain_entry(
    entry: &Entry,
    resolver: &dyn PublicKeysResolver,
    validator: &Validator,
) -> Result<VoteChainRecord, EntryError> {
    let tag = entry.ext_ids.first().ok_or(EntryError::NoExternalIds)?;

    if tag.as_slice() == VOTE_TAG.as_bytes() {
        Ok(VoteChainRecord::Definition(
            decode_definition(entry, resolver, validator).await?,
        ))
    } else if tag.as_slice() == COMMIT_TAG.as_bytes() {
        Ok(VoteChainRecord::Commit(
            decode_commit(entry, resolver, validator).await?,
        ))
    } else if tag.as_slice() == REVEAL_TAG.as_bytes() {
        Ok(VoteChainRecord::Reveal(decode_reveal(entry, validator)?))
    } else {
        Err(EntryError::UnknownTag(
            String::from_utf8_lossy(tag).into_owned(),
        ))
    }
}

pub async fn decode_definition(
    entry: &Entry,
    resolver: &dyn PublicKeysResolver,
    validator: &Validator,
) -> Result<DefinitionRecord, EntryError> {
    let kind = RecordKind::Definition;
    expect_shape(entry, kind)?;
    if entry.ext_ids[1] != [PROTOCOL_VERSION] {
        return Err(EntryError::UnsupportedVersion(hex::encode(&entry.ext_ids[1])));
    }
    let identity = chain_id_field(entry, kind, 2, "initiator id")?;
    let public_key = field(entry, kind, 3, "public key", PUBLIC_KEY_LEN)?;
    let signature = field(entry, kind, 4, "signature", SIGNATURE_LEN)?;

    let public_key = parse_public_key(public_key)?;
    verify_signature(
        kind,
        &public_key,
        &definition_signed_bytes(&entry.content),
        signature,
    )?;
    verify_key(resolver, &identity, &public_key, entry.height()).await?;

    let definition: VoteDefinitionDocument = serde_json::from_slice(&entry.content)?;
    validator.validate_definition(&definition)?;

    Ok(DefinitionRecord {
        identity,
        public_key,
        definition,
        height: entry.height(),
        entry_hash: entry.hash,
    })
}

pub async fn decode_initial_eligible_voters(
    entry: &Entry,
    resolver: &dyn PublicKeysResolver,
    validator: &Validator,
) -> Result<EligibleVotersRegistration, EntryError> {
    let kind = RecordKind::InitialEligibleVoters;
    expect_shape(entry, kind)?;
    let identity = chain_id_field(entry, kind, 1, "initiator id")?;
    let nonce = field(entry, kind, 2, "nonce", NONCE_LEN)?;
    let public_key = field(entry, kind, 3, "public key", PUBLIC_KEY_LEN)?;
    let signature = field(entry, kind, 4, "signature", SIGNATURE_LEN)?;

    let public_key = parse_public_key(public_key)?;
    verify_signature(
        kind,
        &public_key,
        &initial_eligible_voters_signed_bytes(nonce, &entry.content),
        signature,
    )?;
    verify_key(resolver, &identity, &public_key, entry.height()).await?;

    let voters: Vec<EligibleVoter> = serde_json::from_slice(&entry.content)?;
    validator.validate_eligible_voters(&voters, true)?;

    Ok(EligibleVotersRegistration {
        identity,
        public_key,
        initial: true,
        voters,
        height: entry.height(),
        entry_hash: entry.hash,
    })
}

/// Decode a batch appended to an eligible voters chain
///
/// `identity` and `public_key` are the ones anchored by the chain's first entry.
pub async fn decode_append_eligible_voters(
    entry: &Entry,
    identity: &ChainId,
    public_key: &PublicKey,
    resolver: &dyn PublicKeysResolver,
    validator: &Validator,
) -> Result<EligibleVotersRegistration, EntryError> {
    let kind = RecordKind::AppendEligibleVoters;
    expect_shape(entry, kind)?;
    let nonce = field(entry, kind, 1, "nonce", NONCE_LEN)?;
    let signature = field(entry, kind, 2, "signature", SIGNATURE_LEN)?;

    verify_signature(
        kind,
        public_key,
        &append_eligible_voters_signed_bytes(&entry.chain_id, nonce, &entry.content),
        signature,
    )?;
    verify_key(resolver, identity, public_key, entry.height()).await?;

    let voters: Vec<EligibleVoter> = serde_json::from_slice(&entry.content)?;
    validator.validate_eligible_voters(&voters, false)?;

    Ok(EligibleVotersRegistration {
        identity: *identity,
        public_key: *public_key,
        initial: false,
        voters,
        height: entry.height(),
        entry_hash: entry.hash,
    })
}

pub async fn decode_commit(
    entry: &Entry,
    resolver: &dyn PublicKeysResolver,
    validator: &Validator,
) -> Result<CommitRecord, EntryError> {
    let kind = RecordKind::Commit;
    expect_shape(entry, kind)?;
    let voter = chain_id_field(entry, kind, 1, "voter id")?;
    let public_key = field(entry, kind, 2, "public key", PUBLIC_KEY_LEN)?;
    let signature = field(entry, kind, 3, "signature", SIGNATURE_LEN)?;

    let public_key = parse_public_key(public_key)?;
    verify_signature(
        kind,
        &public_key,
        &commit_signed_bytes(&entry.chain_id, &entry.content),
        signature,
    )?;
    verify_key(resolver, &voter, &public_key, entry.height()).await?;

    let commitment: Commitment = serde_json::from_slice(&entry.content)?;
    validator.validate_commitment(&commitment)?;

    Ok(CommitRecord {
        voter,
        public_key,
        commitment,
        height: entry.height(),
        entry_hash: entry.hash,
    })
}

pub fn decode_reveal(entry: &Entry, validator: &Validator) -> Result<RevealRecord, EntryError> {
    let kind = RecordKind::Reveal;
    expect_shape(entry, kind)?;
    let voter = chain_id_field(entry, kind, 1, "voter id")?;

    let ballot: Ballot = serde_json::from_slice(&entry.content)?;
    validator.validate_ballot(&ballot)?;

    Ok(RevealRecord {
        voter,
        ballot,
        height: entry.height(),
        entry_hash: entry.hash,
    })
}

/// Vote chain referenced by a registration pointer entry
pub fn decode_registration_pointer(entry: &Entry) -> Result<ChainId, EntryError> {
    let kind = RecordKind::RegistrationPointer;
    expect_shape(entry, kind)?;
    chain_id_field(entry, kind, 1, "vote chain id")
}

fn expect_shape(entry: &Entry, kind: RecordKind) -> Result<(), EntryError> {
    let tag = entry.ext_ids.first().ok_or(EntryError::NoExternalIds)?;
    if entry.ext_ids.len() != kind.ext_id_count() {
        return Err(EntryError::WrongExtIdCount {
            kind,
            expected: kind.ext_id_count(),
            found: entry.ext_ids.len(),
        });
    }
    if tag.as_slice() != kind.tag().as_bytes() {
        return Err(EntryError::UnknownTag(
            String::from_utf8_lossy(tag).into_owned(),
        ));
    }
    Ok(())
}

fn field<'a>(
    entry: &'a Entry,
    kind: RecordKind,
    index: usize,
    name: &'static str,
    len: usize,
) -> Result<&'a [u8], EntryError> {
    let value = &entry.ext_ids[index];
    if value.len() != len {
        return Err(EntryError::BadFieldLength {
            kind,
            field: name,
            expected: len,
            found: value.len(),
        });
    }
    Ok(value)
}

fn chain_id_field(
    entry: &Entry,
    kind: RecordKind,
    index: usize,
    name: &'static str,
) -> Result<ChainId, EntryError> {
    let bytes = field(entry, kind, index, name, ID_LEN)?;
    Ok(ChainId::from_slice(bytes)?)
}

fn parse_public_key(bytes: &[u8]) -> Result<PublicKey, EntryError> {
    PublicKey::from_bytes(bytes).map_err(EntryError::InvalidPublicKey)
}

fn verify_signature(
    kind: RecordKind,
    public_key: &PublicKey,
    signed: &[u8],
    signature: &[u8],
) -> Result<(), EntryError> {
    let signature = Signature::try_from(signature).map_err(|_| EntryError::InvalidSignature(kind))?;
    public_key
        .verify_strict(signed, &signature)
        .map_err(|_| EntryError::InvalidSignature(kind))
}

async fn verify_key(
    resolver: &dyn PublicKeysResolver,
    identity: &ChainId,
    public_key: &PublicKey,
    height: u64,
) -> Result<(), EntryError> {
    let key = IdentityKey::from_public_key(public_key).to_string();
    verify_association(resolver, identity, &key, Some(height)).await?;
    Ok(())
}
