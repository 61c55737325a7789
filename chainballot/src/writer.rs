use crate::*;
use ed25519_dalek::PublicKey;

/// Entries creating a new vote
#[derive(Debug, Clone)]
pub struct ComposedVote {
    pub eligible_voters_chain: EntryDraft,
    pub vote_chain: EntryDraft,

    /// Pointer to the vote chain, for the registration chain
    pub registration: EntryDraft,
}

impl ComposedVote {
    /// In the order they should be submitted
    pub fn entries(&self) -> Vec<&EntryDraft> {
        vec![
            &self.eligible_voters_chain,
            &self.vote_chain,
            &self.registration,
        ]
    }
}

/// Build the chains of a new vote
///
/// A new eligible voters chain is created for `eligible_voters` and its id is written into
/// the definition before the vote chain is signed.
pub async fn compose_vote(
    mut definition: VoteDefinitionDocument,
    eligible_voters: &[EligibleVoter],
    registration_chain_id: ChainId,
    initiator: &Identity,
    validator: &Validator,
) -> Result<ComposedVote, Error> {
    let eligible_voters_chain =
        build_eligible_voters_chain(eligible_voters, initiator, validator).await?;
    definition.vote.eligible_voters_chain_id = Some(eligible_voters_chain.chain_id);

    let vote_chain = build_vote_chain(&definition, initiator, validator).await?;
    let registration = build_registration_pointer(registration_chain_id, vote_chain.chain_id);

    Ok(ComposedVote {
        eligible_voters_chain,
        vote_chain,
        registration,
    })
}

/// Whether `public_key` is the key anchored by the first entry of an eligible voters chain
pub async fn can_append_eligible_voters<L>(
    ledger: &L,
    chain_id: &ChainId,
    public_key: &PublicKey,
) -> Result<bool, Error>
where
    L: Ledger + ?Sized,
{
    let first = ledger.get_first_entry(chain_id).await?;
    Ok(first.tag().as_deref() == Some(ELIGIBLE_VOTERS_TAG)
        && first.ext_ids.len() == RecordKind::InitialEligibleVoters.ext_id_count()
        && first.ext_ids[3] == public_key.as_bytes())
}

/// Build an entry adding voters to an existing eligible voters chain
///
/// Fails unless the initiator holds the key that created the chain.
pub async fn append_eligible_voters<L>(
    ledger: &L,
    chain_id: ChainId,
    voters: &[EligibleVoter],
    initiator: &Identity,
    validator: &Validator,
) -> Result<EntryDraft, Error>
where
    L: Ledger + ?Sized,
{
    if !can_append_eligible_voters(ledger, &chain_id, &initiator.public_key).await? {
        return Err(Error::AppendNotAuthorized(chain_id));
    }
    build_append_eligible_voters(voters, chain_id, initiator, validator).await
}
