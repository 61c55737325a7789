use crate::*;
use ed25519_dalek::PublicKey;
use futures_util::stream::{self, StreamExt};
use std::collections::HashSet;
use std::future::Future;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Verified contents of a vote chain
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ParsedVoteChain {
    pub chain_id: ChainId,
    pub definition: DefinitionRecord,
    pub commits: Vec<CommitRecord>,
    pub reveals: Vec<RevealRecord>,
    pub rejected: Vec<RejectedEntry>,
}

/// Verified contents of an eligible voters chain
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ParsedEligibleVotersChain {
    pub chain_id: ChainId,

    /// Identity allowed to append voters, anchored by the first entry
    pub identity: ChainId,

    #[serde(with = "EdPublicKeyHex")]
    pub public_key: PublicKey,

    /// Initial roster first, then accepted appends in height order
    pub registrations: Vec<EligibleVotersRegistration>,

    pub rejected: Vec<RejectedEntry>,
}

/// Both chains of a vote
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ParsedVote {
    pub vote: ParsedVoteChain,
    pub eligible_voters: ParsedEligibleVotersChain,
}

impl ParsedVote {
    /// Every rejected entry of both chains
    pub fn rejected(&self) -> impl Iterator<Item = &RejectedEntry> {
        self.vote
            .rejected
            .iter()
            .chain(self.eligible_voters.rejected.iter())
    }
}

/// Reads chains from the ledger and keeps the entries that verify
///
/// Entries are decoded and verified concurrently (up to `max_concurrency` at once) and then
/// folded one by one in height order. A bad entry is recorded and skipped; it never aborts the
/// parse. Cancelling the token or reaching the configured deadline aborts it with
/// [`Error::Cancelled`].
pub struct ChainParser<L, R> {
    ledger: L,
    resolver: R,
    validator: Validator,
    config: ParseConfig,
    cancel: CancellationToken,
}

impl<L, R> ChainParser<L, R>
where
    L: Ledger,
    R: PublicKeysResolver,
{
    pub fn new(ledger: L, resolver: R) -> Self {
        ChainParser {
            ledger,
            resolver,
            validator: Validator::new(),
            config: ParseConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_config(mut self, config: ParseConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    /// Use a caller-owned token to cancel parses
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    pub fn config(&self) -> &ParseConfig {
        &self.config
    }

    /// Parse a vote chain: its definition, commits and reveals
    pub async fn parse_vote_chain(&self, chain_id: &ChainId) -> Result<ParsedVoteChain, Error> {
        let deadline = self.deadline();
        self.guarded(deadline, self.vote_chain(chain_id)).await
    }

    /// Parse an eligible voters chain into its registrations
    pub async fn parse_eligible_voters_chain(
        &self,
        chain_id: &ChainId,
    ) -> Result<ParsedEligibleVotersChain, Error> {
        let deadline = self.deadline();
        self.guarded(deadline, self.eligible_voters_chain(chain_id))
            .await
    }

    /// Parse a vote chain and the eligible voters chain it references
    ///
    /// Both chains must have been created by the same identity.
    pub async fn parse_vote(&self, chain_id: &ChainId) -> Result<ParsedVote, Error> {
        let deadline = self.deadline();
        self.guarded(deadline, async {
            let vote = self.vote_chain(chain_id).await?;
            let eligible_voters_chain_id = vote
                .definition
                .definition
                .vote
                .eligible_voters_chain_id
                .ok_or(ValidationError::MissingEligibleVotersChain)?;

            let eligible_voters = self.eligible_voters_chain(&eligible_voters_chain_id).await?;

            if vote.definition.identity != eligible_voters.identity {
                warn!(
                    vote = %chain_id,
                    eligible_voters = %eligible_voters_chain_id,
                    "vote and eligible voters chains were created by different identities"
                );
                return Err(Error::IdentityMismatch {
                    vote: vote.definition.identity,
                    eligible_voters: eligible_voters.identity,
                });
            }

            Ok(ParsedVote {
                vote,
                eligible_voters,
            })
        })
        .await
    }

    fn deadline(&self) -> Option<Instant> {
        self.config.timeout().map(|timeout| Instant::now() + timeout)
    }

    async fn guarded<T, F>(&self, deadline: Option<Instant>, work: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, Error>>,
    {
        let bounded = async {
            match deadline {
                Some(deadline) => match timeout_at(deadline, work).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(timeout_secs = self.config.timeout_secs, "chain parse deadline exceeded");
                        Err(Error::Cancelled)
                    }
                },
                None => work.await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                warn!("chain parse cancelled");
                Err(Error::Cancelled)
            }
            result = bounded => result,
        }
    }

    async fn sorted_entries(&self, chain_id: &ChainId) -> Result<Vec<Entry>, Error> {
        let mut entries = self.ledger.get_all_entries_of_chain(chain_id).await?;
        sort_chain_entries(chain_id, &mut entries);
        Ok(entries)
    }

    async fn vote_chain(&self, chain_id: &ChainId) -> Result<ParsedVoteChain, Error> {
        let entries = self.sorted_entries(chain_id).await?;

        let decoded: Vec<Result<VoteChainRecord, EntryError>> = stream::iter(entries.iter())
            .map(|entry| decode_vote_chain_entry(entry, &self.resolver, &self.validator))
            .buffered(self.config.concurrency())
            .collect()
            .await;

        let mut records = entries.iter().zip(decoded);

        let definition = match records.next() {
            Some((_, Ok(VoteChainRecord::Definition(definition)))) => definition,
            Some((_, Ok(other))) => {
                return Err(Error::MissingDefinition {
                    chain_id: *chain_id,
                    reason: format!("first entry is a {} entry", other.kind()),
                })
            }
            Some((_, Err(e))) => {
                return Err(Error::MissingDefinition {
                    chain_id: *chain_id,
                    reason: e.to_string(),
                })
            }
            None => {
                return Err(Error::MissingDefinition {
                    chain_id: *chain_id,
                    reason: "chain has no entries".to_owned(),
                })
            }
        };

        let mut commits = vec![];
        let mut reveals = vec![];
        let mut rejected = vec![];

        for (entry, record) in records {
            match record {
                Ok(VoteChainRecord::Commit(commit)) => commits.push(commit),
                Ok(VoteChainRecord::Reveal(reveal)) => reveals.push(reveal),
                Ok(VoteChainRecord::Definition(_)) => {
                    rejected.push(reject(chain_id, entry, EntryError::DuplicateDefinition))
                }
                Err(e) => rejected.push(reject(chain_id, entry, e)),
            }
        }

        info!(
            chain = %chain_id,
            commits = commits.len(),
            reveals = reveals.len(),
            rejected = rejected.len(),
            "parsed vote chain"
        );

        Ok(ParsedVoteChain {
            chain_id: *chain_id,
            definition,
            commits,
            reveals,
            rejected,
        })
    }

    async fn eligible_voters_chain(
        &self,
        chain_id: &ChainId,
    ) -> Result<ParsedEligibleVotersChain, Error> {
        let entries = self.sorted_entries(chain_id).await?;

        let (first, appends) = entries
            .split_first()
            .ok_or_else(|| Error::MissingEligibleVoters {
                chain_id: *chain_id,
                reason: "chain has no entries".to_owned(),
            })?;

        let initial = decode_initial_eligible_voters(first, &self.resolver, &self.validator)
            .await
            .map_err(|e| Error::MissingEligibleVoters {
                chain_id: *chain_id,
                reason: e.to_string(),
            })?;
        let identity = initial.identity;
        let public_key = initial.public_key;

        let decoded: Vec<Result<EligibleVotersRegistration, EntryError>> =
            stream::iter(appends.iter())
                .map(|entry| {
                    decode_append_eligible_voters(
                        entry,
                        &identity,
                        &public_key,
                        &self.resolver,
                        &self.validator,
                    )
                })
                .buffered(self.config.concurrency())
                .collect()
                .await;

        let mut registrations = vec![initial];
        let mut rejected = vec![];
        let mut seen = HashSet::new();

        for (entry, registration) in appends.iter().zip(decoded) {
            if seen.contains(&entry.hash) {
                rejected.push(reject(chain_id, entry, EntryError::Replayed));
                continue;
            }
            match registration {
                Ok(registration) => {
                    seen.insert(entry.hash);
                    registrations.push(registration);
                }
                Err(e) => rejected.push(reject(chain_id, entry, e)),
            }
        }

        info!(
            chain = %chain_id,
            registrations = registrations.len(),
            rejected = rejected.len(),
            "parsed eligible voters chain"
        );

        Ok(ParsedEligibleVotersChain {
            chain_id: *chain_id,
            identity,
            public_key,
            registrations,
            rejected,
        })
    }
}

fn reject(chain_id: &ChainId, entry: &Entry, error: EntryError) -> RejectedEntry {
    debug!(
        chain = %chain_id,
        entry = %entry.hash,
        height = entry.height(),
        reason = %error,
        "rejected entry"
    );
    RejectedEntry::new(entry, error)
}
