use ed25519_dalek::PublicKey;
use serde::Serializer;
use std::borrow::Cow;

pub use hex_buffer_serde::Hex;

/// `#[serde(with = "EdPublicKeyHex")]` for ed25519 public keys
pub enum EdPublicKeyHex {}

impl Hex<PublicKey> for EdPublicKeyHex {
    type Error = String;

    fn create_bytes(public_key: &PublicKey) -> Cow<[u8]> {
        public_key.as_ref().into()
    }

    fn from_bytes(bytes: &[u8]) -> Result<PublicKey, String> {
        PublicKey::from_bytes(bytes).map_err(|e| format!("{}", e))
    }
}

/// Serialize any error (or other Display type) as its message
pub fn serialize_display<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: std::fmt::Display,
    S: Serializer,
{
    serializer.collect_str(value)
}
