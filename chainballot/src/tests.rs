use super::*;
use async_trait::async_trait;
use ed25519_dalek::{ExpandedSecretKey, PublicKey, SecretKey};
use std::sync::Arc;

struct Voter {
    identity: Identity,
    ballot: Ballot,
}

fn new_identity(registry: &mut MemKeyRegistry, id: u8) -> Identity {
    let (secret, public) = generate_keypair();
    registry.register(ChainId([id; 32]), &public, 0);
    Identity::from_secret_key(ChainId([id; 32]), secret)
}

fn approval_definition() -> VoteDefinitionDocument {
    serde_json::from_value(serde_json::json!({
        "proposal": { "title": "Pick any" },
        "vote": {
            "type": 1,
            "phasesBlockHeights": { "commitStart": 10, "commitEnd": 20, "revealStart": 21, "revealEnd": 30 },
            "config": {
                "options": ["A", "B", "Z"],
                "minOptions": 1,
                "maxOptions": 3,
                "allowAbstention": true,
                "computeResultsAgainst": "PARTICIPANTS_ONLY",
                "acceptanceCriteria": { "minTurnout": { "weighted": 0.5, "unweighted": 0.5 } }
            }
        }
    }))
    .unwrap()
}

#[tokio::test]
async fn end_to_end_approval_vote() {
    let validator = Validator::new();
    let mut registry = MemKeyRegistry::default();
    let mut ledger = MemLedger::default();

    // The vote initiator and six voters, all with registered identity keys
    let initiator = new_identity(&mut registry, 0xaa);
    let choices: Vec<&[&str]> = vec![&["A", "B"], &["B"], &["Z", "B"], &[], &["A"], &["A"]];
    let voters: Vec<Voter> = choices
        .iter()
        .enumerate()
        .map(|(i, choice)| Voter {
            identity: new_identity(&mut registry, i as u8 + 1),
            ballot: Ballot::new(
                choice.iter().map(|s| s.to_string()).collect(),
                &[i as u8 + 1; 32],
                DigestAlgorithm::Sha256,
            ),
        })
        .collect();
    let id = |i: usize| voters[i].identity.chain_id;

    // Create the vote: eligible voters chain, vote chain and registration pointer
    let registration_chain = build_registration_chain(None);
    let composed = compose_vote(
        approval_definition(),
        &[
            EligibleVoter::new(id(0), Some(6)),
            EligibleVoter::new(id(1), Some(7)),
            EligibleVoter::new(id(2), None),
        ],
        registration_chain.chain_id,
        &initiator,
        &validator,
    )
    .await
    .unwrap();
    let vote_chain_id = composed.vote_chain.chain_id;
    let roster_chain_id = composed.eligible_voters_chain.chain_id;
    ledger.add(registration_chain, 1);
    ledger.add(composed.eligible_voters_chain.clone(), 1);
    ledger.add(composed.vote_chain.clone(), 2);
    ledger.add(composed.registration.clone(), 2);

    // More voters before the commit phase, and one too late to count
    let append = append_eligible_voters(
        &ledger,
        roster_chain_id,
        &[
            EligibleVoter::new(id(2), Some(1)),
            EligibleVoter::new(id(3), Some(10)),
            EligibleVoter::new(id(4), Some(3)),
        ],
        &initiator,
        &validator,
    )
    .await
    .unwrap();
    ledger.add(append.clone(), 5);
    // Somebody replays the append
    ledger.add(append, 8);
    let late = append_eligible_voters(
        &ledger,
        roster_chain_id,
        &[EligibleVoter::new(id(5), Some(100))],
        &initiator,
        &validator,
    )
    .await
    .unwrap();
    ledger.add(late, 12);

    // Commit phase. Voter 2 changes their mind before it ends.
    let change_of_mind = Ballot::new(vec!["A".into()], &[99; 32], DigestAlgorithm::Sha256);
    ledger.add(
        build_commit(vote_chain_id, &change_of_mind, &voters[1].identity, &validator)
            .await
            .unwrap(),
        11,
    );
    for (i, voter) in voters.iter().enumerate() {
        let commit = build_commit(vote_chain_id, &voter.ballot, &voter.identity, &validator)
            .await
            .unwrap();
        ledger.add(commit, 13 + i as u64);
    }
    ledger.add(
        EntryDraft {
            chain_id: vote_chain_id,
            ext_ids: vec![b"not a vote".to_vec()],
            content: b"spam".to_vec(),
        },
        15,
    );

    // Voter 5 leaks their reveal before the reveal phase
    let reveal = |i: usize| build_reveal(vote_chain_id, &voters[i].ballot, id(i), &validator).unwrap();
    ledger.add(reveal(4), 20);

    // Reveal phase
    for i in 0..voters.len() {
        ledger.add(reveal(i), 22 + i as u64);
    }

    // Anyone can now reconstruct the result
    let parser = ChainParser::new(ledger, registry);
    let report = read_vote(&parser, &vote_chain_id).await.unwrap();

    let roll = &report.vote.eligible_voters;
    assert_eq!(roll.len(), 5);
    assert_eq!(roll.weight(&id(2)), Some(1));
    assert!(!roll.contains(&id(5)));

    let votes = &report.vote.valid_votes;
    assert_eq!(votes.len(), 4);
    assert!(!votes.contains(&id(4)));
    assert_eq!(votes.selection(&id(1)).unwrap(), &["B".to_string()][..]);

    let result = &report.result;
    assert_eq!(result.options["A"].count, 1);
    assert_eq!(result.options["A"].weighted_support, 0.25);
    assert_eq!(result.options["B"].weight, 14);
    assert_eq!(result.options["B"].support, 0.75);
    assert_eq!(result.options["B"].weighted_support, 14.0 / 24.0);
    assert_eq!(result.options["Z"].weighted_support, 1.0 / 24.0);
    assert_eq!(result.abstention, Abstention { count: 1, weight: 10 });
    assert_eq!(result.turnout.unweighted, 0.8);
    assert_eq!(result.turnout.weighted, 24.0 / 27.0);
    assert!(result.valid);
    assert_eq!(result.winner.as_deref(), Some("B"));

    // The replayed append and the spam entry are reported
    assert_eq!(report.rejected.len(), 2);
    assert!(report
        .rejected
        .iter()
        .any(|r| matches!(r.error, EntryError::Replayed) && r.height == 8));
    assert!(report
        .rejected
        .iter()
        .any(|r| matches!(r.error, EntryError::UnknownTag(_)) && r.height == 15));

    // The report serializes for publication
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["result"]["winner"], "B");
    assert_eq!(json["rejected"][0]["error"], "unknown entry tag \"not a vote\"");
}

/// Signs on behalf of an identity without handing over its secret key
struct RemoteSigner(SecretKey);

#[async_trait]
impl ExternalSigner for RemoteSigner {
    async fn sign(&self, message: &[u8]) -> Result<Vec<u8>, Error> {
        let public: PublicKey = (&self.0).into();
        let expanded: ExpandedSecretKey = (&self.0).into();
        Ok(expanded.sign(message, &public).to_bytes().to_vec())
    }
}

#[tokio::test]
async fn end_to_end_instant_runoff() {
    let validator = Validator::new();
    let mut registry = MemKeyRegistry::default();
    let mut ledger = MemLedger::default();

    // The initiator signs through an external signer
    let (initiator_secret, initiator_public) = generate_keypair();
    registry.register(ChainId([0xaa; 32]), &initiator_public, 0);
    let signer: Arc<dyn ExternalSigner> = Arc::new(RemoteSigner(initiator_secret));
    let initiator = Identity::resolve(
        &registry,
        None,
        ChainId([0xaa; 32]),
        &IdentityKey::from_public_key(&initiator_public).to_string(),
        Some(signer),
    )
    .await
    .unwrap();

    let rankings: [&[&str]; 5] = [
        &["Bob", "Bill", "Sue"],
        &["Sue", "Bob", "Bill"],
        &["Bill", "Sue", "Bob"],
        &["Bob", "Bill", "Sue"],
        &["Sue", "Bob", "Bill"],
    ];
    let voters: Vec<Identity> = (1..=5).map(|i| new_identity(&mut registry, i)).collect();

    let definition: VoteDefinitionDocument = serde_json::from_value(serde_json::json!({
        "vote": {
            "type": 2,
            "phasesBlockHeights": { "commitStart": 10, "commitEnd": 20, "revealStart": 21, "revealEnd": 30 },
            "config": {
                "options": ["Bob", "Sue", "Bill"],
                "minOptions": 1,
                "maxOptions": 3,
                "allowAbstention": false,
                "computeResultsAgainst": "ALL_ELIGIBLE_VOTERS"
            }
        }
    }))
    .unwrap();

    let roster: Vec<EligibleVoter> = voters
        .iter()
        .map(|v| EligibleVoter::new(v.chain_id, None))
        .collect();
    let composed = compose_vote(definition, &roster, ChainId([0xbb; 32]), &initiator, &validator)
        .await
        .unwrap();
    let vote_chain_id = composed.vote_chain.chain_id;
    ledger.add(composed.eligible_voters_chain, 1);
    ledger.add(composed.vote_chain, 1);

    for (i, (voter, ranking)) in voters.iter().zip(rankings.iter()).enumerate() {
        let ballot = Ballot::new(
            ranking.iter().map(|s| s.to_string()).collect(),
            format!("secret {}", i).as_bytes(),
            DigestAlgorithm::Sha512,
        );
        let commit = build_commit(vote_chain_id, &ballot, voter, &validator)
            .await
            .unwrap();
        ledger.add(commit, 15);
        let reveal = build_reveal(vote_chain_id, &ballot, voter.chain_id, &validator).unwrap();
        ledger.add(reveal, 25);
    }

    let parser = ChainParser::new(ledger, registry).with_config(ParseConfig {
        max_concurrency: 2,
        timeout_secs: 30,
    });
    let report = read_vote(&parser, &vote_chain_id).await.unwrap();

    assert!(report.rejected.is_empty());
    let rounds = report.result.rounds.as_ref().unwrap();
    assert_eq!(rounds.len(), 2);
    assert_eq!(rounds[0]["Bill"], 1);
    assert_eq!(rounds[1]["Sue"], 3);
    assert_eq!(report.result.winner.as_deref(), Some("Sue"));
}
