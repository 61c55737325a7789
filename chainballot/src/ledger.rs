use crate::*;
use async_trait::async_trait;
use digest::Digest;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Sha256, Sha512};
use std::collections::BTreeMap;
use std::convert::TryInto;
use std::str::FromStr;

macro_rules! hex_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            /// Build from a byte slice, which must be exactly 32 bytes long
            pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
                let bytes: [u8; 32] = bytes.try_into().map_err(|_| Error::IdentifierBadLen)?;
                Ok($name(bytes))
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            pub fn to_bytes(&self) -> Vec<u8> {
                self.0.to_vec()
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let bytes = hex::decode(s).map_err(|_| Error::IdentifierBadHex)?;
                $name::from_slice(&bytes)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(f, "{}", hex::encode(self.0))
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                FromStr::from_str(&s).map_err(de::Error::custom)
            }
        }

        impl From<$name> for [u8; 32] {
            fn from(item: $name) -> Self {
                item.0
            }
        }
    };
}

hex_identifier!(
    /// Chain identifier
    ///
    /// Identity chains, vote chains and eligible voters chains are all addressed by one.
    ChainId
);

hex_identifier!(
    /// Hash of a single ledger entry
    EntryHash
);

impl ChainId {
    /// Derive the id of a new chain from the external ids of its first entry
    pub fn for_first_entry(ext_ids: &[Vec<u8>]) -> Self {
        let mut hasher = Sha256::new();
        for ext_id in ext_ids {
            hasher.update(Sha256::digest(ext_id));
        }
        ChainId(digest_array(hasher))
    }
}

fn digest_array(hasher: Sha256) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Ledger position of an entry
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BlockContext {
    pub directory_block_height: u64,
}

/// An entry that has been built but not yet placed on the ledger
#[derive(Clone, Debug, PartialEq)]
pub struct EntryDraft {
    pub chain_id: ChainId,
    pub ext_ids: Vec<Vec<u8>>,
    pub content: Vec<u8>,
}

impl EntryDraft {
    /// Start a new chain: the chain id is derived from the external ids
    pub fn first_entry(ext_ids: Vec<Vec<u8>>, content: Vec<u8>) -> Self {
        EntryDraft {
            chain_id: ChainId::for_first_entry(&ext_ids),
            ext_ids,
            content,
        }
    }

    /// Binary form the entry hash is computed over
    pub fn marshal(&self) -> Vec<u8> {
        let ext_ids_len: usize = self.ext_ids.iter().map(|e| e.len() + 2).sum();

        let mut out = Vec::with_capacity(35 + ext_ids_len + self.content.len());
        out.push(0);
        out.extend_from_slice(self.chain_id.as_bytes());
        out.extend_from_slice(&(ext_ids_len as u16).to_be_bytes());
        for ext_id in &self.ext_ids {
            out.extend_from_slice(&(ext_id.len() as u16).to_be_bytes());
            out.extend_from_slice(ext_id);
        }
        out.extend_from_slice(&self.content);
        out
    }

    /// `sha256(sha512(m) || m)` over the marshalled entry
    pub fn hash(&self) -> EntryHash {
        let marshalled = self.marshal();
        let mut hasher = Sha256::new();
        hasher.update(Sha512::digest(&marshalled));
        hasher.update(&marshalled);
        EntryHash(digest_array(hasher))
    }

    /// What the ledger hands back once the draft is included at `height`
    pub fn at_height(self, height: u64) -> Entry {
        let hash = self.hash();
        Entry {
            chain_id: self.chain_id,
            ext_ids: self.ext_ids,
            content: self.content,
            hash,
            block_context: BlockContext {
                directory_block_height: height,
            },
        }
    }
}

/// An entry as retrieved from the ledger
#[derive(Clone, Debug, PartialEq)]
pub struct Entry {
    pub chain_id: ChainId,
    pub ext_ids: Vec<Vec<u8>>,
    pub content: Vec<u8>,
    pub hash: EntryHash,
    pub block_context: BlockContext,
}

impl Entry {
    pub fn height(&self) -> u64 {
        self.block_context.directory_block_height
    }

    /// First external id, read as text
    pub fn tag(&self) -> Option<String> {
        self.ext_ids
            .first()
            .map(|tag| String::from_utf8_lossy(tag).into_owned())
    }
}

/// Read access to the ledger
///
/// Entries may be returned in any order; every entry carries its own height.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Get every entry of a chain
    async fn get_all_entries_of_chain(&self, chain_id: &ChainId) -> Result<Vec<Entry>, Error>;

    /// Check whether a chain has been created
    async fn chain_exists(&self, chain_id: &ChainId) -> Result<bool, Error>;

    /// Get the entry that created the chain
    async fn get_first_entry(&self, chain_id: &ChainId) -> Result<Entry, Error> {
        let mut entries = self.get_all_entries_of_chain(chain_id).await?;
        sort_chain_entries(chain_id, &mut entries);
        entries
            .into_iter()
            .next()
            .ok_or_else(|| Error::Ledger(format!("chain {} has no entries", chain_id)))
    }
}

/// Stable sort on height, entries at the same height keep the order they were delivered in.
pub fn sort_by_height(entries: &mut [Entry]) {
    entries.sort_by_key(|entry| entry.height());
}

/// Sort by height, then move the entry that created the chain to the front
///
/// Among the entries at the lowest height, the creating entry is the one whose external ids
/// derive `chain_id`. Without such an entry the delivery order is kept.
pub fn sort_chain_entries(chain_id: &ChainId, entries: &mut [Entry]) {
    sort_by_height(entries);

    let lowest = match entries.first() {
        Some(entry) => entry.height(),
        None => return,
    };
    let creating = entries
        .iter()
        .take_while(|entry| entry.height() == lowest)
        .position(|entry| ChainId::for_first_entry(&entry.ext_ids) == *chain_id);
    if let Some(index) = creating {
        entries[..=index].rotate_right(1);
    }
}

/// A simple ledger that keeps chains in an in-memory BTreeMap
///
/// Entries are returned in the order they were added.
#[derive(Default, Clone)]
pub struct MemLedger {
    inner: BTreeMap<ChainId, Vec<Entry>>,
}

impl MemLedger {
    /// Place a draft on the ledger at the given height
    pub fn add(&mut self, draft: EntryDraft, height: u64) -> Entry {
        let entry = draft.at_height(height);
        self.set(entry.clone());
        entry
    }

    /// Store an already-placed entry
    pub fn set(&mut self, entry: Entry) {
        self.inner.entry(entry.chain_id).or_default().push(entry);
    }
}

#[async_trait]
impl Ledger for MemLedger {
    async fn get_all_entries_of_chain(&self, chain_id: &ChainId) -> Result<Vec<Entry>, Error> {
        self.inner
            .get(chain_id)
            .cloned()
            .ok_or_else(|| Error::Ledger(format!("chain {} not found", chain_id)))
    }

    async fn chain_exists(&self, chain_id: &ChainId) -> Result<bool, Error> {
        Ok(self.inner.contains_key(chain_id))
    }
}

impl From<Vec<Entry>> for MemLedger {
    fn from(item: Vec<Entry>) -> Self {
        let mut ledger = MemLedger::default();
        for entry in item {
            ledger.set(entry);
        }
        ledger
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_id_string_form() {
        let chain_id = ChainId([7; 32]);
        let stringed = chain_id.to_string();
        assert_eq!(stringed.len(), 64);
        assert_eq!(ChainId::from_str(&stringed).unwrap(), chain_id);

        assert!(matches!(
            ChainId::from_str("zz"),
            Err(Error::IdentifierBadHex)
        ));
        assert!(matches!(
            ChainId::from_str("abcd"),
            Err(Error::IdentifierBadLen)
        ));

        let json = serde_json::to_string(&chain_id).unwrap();
        assert_eq!(json, format!("\"{}\"", stringed));
        let back: ChainId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, chain_id);
    }

    #[test]
    fn entry_hash_ignores_height() {
        let draft = EntryDraft::first_entry(vec![b"tag".to_vec(), vec![1, 2, 3]], b"hello".to_vec());
        let low = draft.clone().at_height(1);
        let high = draft.at_height(9);
        assert_eq!(low.hash, high.hash);
        assert_ne!(low.block_context, high.block_context);
    }

    #[test]
    fn chain_id_depends_on_ext_ids() {
        let a = ChainId::for_first_entry(&[b"a".to_vec(), b"b".to_vec()]);
        let b = ChainId::for_first_entry(&[b"ab".to_vec()]);
        assert_ne!(a, b);
    }

    #[test]
    fn marshalled_layout() {
        let draft = EntryDraft {
            chain_id: ChainId([0; 32]),
            ext_ids: vec![b"xy".to_vec()],
            content: b"z".to_vec(),
        };
        let m = draft.marshal();
        assert_eq!(m.len(), 1 + 32 + 2 + 2 + 2 + 1);
        assert_eq!(&m[33..35], &[0, 4]);
        assert_eq!(&m[35..37], &[0, 2]);
        assert_eq!(&m[37..39], b"xy");
        assert_eq!(m[39], b'z');
    }

    #[tokio::test]
    async fn mem_ledger_first_entry_by_height() {
        let chain = EntryDraft::first_entry(vec![b"first".to_vec()], vec![]);
        let chain_id = chain.chain_id;
        let later = EntryDraft {
            chain_id,
            ext_ids: vec![b"later".to_vec()],
            content: vec![],
        };

        // Newest first, as a rewinding client would hand them over
        let ledger = MemLedger::from(vec![later.at_height(5), chain.at_height(2)]);

        assert!(ledger.chain_exists(&chain_id).await.unwrap());
        assert!(!ledger.chain_exists(&ChainId([1; 32])).await.unwrap());

        let first = ledger.get_first_entry(&chain_id).await.unwrap();
        assert_eq!(first.height(), 2);
        assert_eq!(first.tag().unwrap(), "first");
    }

    #[tokio::test]
    async fn creating_entry_leads_its_block() {
        let chain = EntryDraft::first_entry(vec![b"first".to_vec()], vec![]);
        let chain_id = chain.chain_id;
        let same_block = |tag: &[u8]| EntryDraft {
            chain_id,
            ext_ids: vec![tag.to_vec()],
            content: vec![],
        };

        let ledger = MemLedger::from(vec![
            same_block(b"spam").at_height(3),
            same_block(b"more spam").at_height(3),
            chain.at_height(3),
            same_block(b"later").at_height(4),
        ]);
        let first = ledger.get_first_entry(&chain_id).await.unwrap();
        assert_eq!(first.tag().unwrap(), "first");

        let mut entries = ledger.get_all_entries_of_chain(&chain_id).await.unwrap();
        sort_chain_entries(&chain_id, &mut entries);
        let tags: Vec<String> = entries.iter().filter_map(|e| e.tag()).collect();
        assert_eq!(tags, vec!["first", "spam", "more spam", "later"]);
    }

    #[test]
    fn creating_entry_must_be_at_lowest_height() {
        let chain = EntryDraft::first_entry(vec![b"first".to_vec()], vec![]);
        let chain_id = chain.chain_id;
        let early = EntryDraft {
            chain_id,
            ext_ids: vec![b"early".to_vec()],
            content: vec![],
        };

        let mut entries = vec![chain.at_height(5), early.at_height(4)];
        sort_chain_entries(&chain_id, &mut entries);
        assert_eq!(entries[0].tag().unwrap(), "early");
    }
}
