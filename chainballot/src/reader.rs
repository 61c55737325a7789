use crate::*;

/// Everything an auditor needs to check a vote
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VoteReport {
    pub vote: ProcessedVote,
    pub result: VoteResult,

    /// Entries of either chain left out, with the reason
    pub rejected: Vec<RejectedEntry>,
}

/// Read a vote from the ledger and compute its result
pub async fn read_vote<L, R>(parser: &ChainParser<L, R>, chain_id: &ChainId) -> Result<VoteReport, Error>
where
    L: Ledger,
    R: PublicKeysResolver,
{
    let parsed = parser.parse_vote(chain_id).await?;
    let vote = process_vote(&parsed);
    let result = compute_result(&vote)?;

    let ParsedVote {
        vote: vote_chain,
        eligible_voters,
    } = parsed;
    let rejected = vote_chain
        .rejected
        .into_iter()
        .chain(eligible_voters.rejected)
        .collect();

    Ok(VoteReport {
        vote,
        result,
        rejected,
    })
}
