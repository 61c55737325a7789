use crate::*;
use async_trait::async_trait;
use digest::Digest;
use ed25519_dalek::ExpandedSecretKey;
use ed25519_dalek::PublicKey;
use ed25519_dalek::SecretKey;
use ed25519_dalek::Signature;
use sha2::Sha256;
use std::collections::HashMap;
use std::convert::TryFrom;
use std::str::FromStr;
use std::sync::Arc;

const ID_PUB_PREFIX: [u8; 5] = [0x03, 0x45, 0xef, 0x9d, 0xe0];
const ID_SEC_PREFIX: [u8; 5] = [0x03, 0x45, 0xf3, 0xd0, 0xd6];
const ID_KEY_LEN: usize = 41;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum KeyKind {
    Public,
    Secret,
}

impl KeyKind {
    fn text_prefix(self) -> &'static str {
        match self {
            KeyKind::Public => "idpub",
            KeyKind::Secret => "idsec",
        }
    }

    fn byte_prefix(self) -> [u8; 5] {
        match self {
            KeyKind::Public => ID_PUB_PREFIX,
            KeyKind::Secret => ID_SEC_PREFIX,
        }
    }
}

/// An identity key in its checksummed text form (`idpub...` / `idsec...`)
#[derive(Clone, PartialEq, Eq)]
pub struct IdentityKey {
    kind: KeyKind,
    raw: [u8; 32],
}

impl IdentityKey {
    pub fn public(raw: [u8; 32]) -> Self {
        IdentityKey {
            kind: KeyKind::Public,
            raw,
        }
    }

    pub fn secret(raw: [u8; 32]) -> Self {
        IdentityKey {
            kind: KeyKind::Secret,
            raw,
        }
    }

    pub fn from_public_key(public_key: &PublicKey) -> Self {
        IdentityKey::public(public_key.to_bytes())
    }

    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    pub fn raw(&self) -> &[u8; 32] {
        &self.raw
    }

    /// The public half, deriving it when this is a secret key
    pub fn to_public(&self) -> Result<IdentityKey, Error> {
        match self.kind {
            KeyKind::Public => Ok(self.clone()),
            KeyKind::Secret => Ok(IdentityKey::from_public_key(
                &derive_public_from_secret(&self.raw)?,
            )),
        }
    }

    pub fn public_key(&self) -> Result<PublicKey, Error> {
        let public = self.to_public()?;
        Ok(PublicKey::from_bytes(&public.raw)?)
    }

    pub fn secret_key(&self) -> Result<SecretKey, Error> {
        match self.kind {
            KeyKind::Secret => Ok(SecretKey::from_bytes(&self.raw)?),
            KeyKind::Public => Err(Error::NoSecretKey(self.to_string())),
        }
    }
}

impl FromStr for IdentityKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_identity_key(s)
    }
}

impl std::fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let mut bytes = Vec::with_capacity(ID_KEY_LEN);
        bytes.extend_from_slice(&self.kind.byte_prefix());
        bytes.extend_from_slice(&self.raw);
        let checksum = sha256d(&bytes);
        bytes.extend_from_slice(&checksum[..4]);
        write!(f, "{}", bs58::encode(bytes).into_string())
    }
}

// Secret keys must never end up in logs
impl std::fmt::Debug for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self.kind {
            KeyKind::Public => write!(f, "IdentityKey({})", self),
            KeyKind::Secret => write!(f, "IdentityKey(idsec...)"),
        }
    }
}

fn sha256d(data: &[u8]) -> Vec<u8> {
    Sha256::digest(&Sha256::digest(data)).to_vec()
}

/// Decode an `idpub` / `idsec` identity key
///
/// The text must carry the expected prefix, decode from base58 to exactly 41 bytes, and end
/// with the first 4 bytes of a double sha256 over the preceding 37.
pub fn decode_identity_key(text: &str) -> Result<IdentityKey, Error> {
    let kind = if text.starts_with(KeyKind::Public.text_prefix()) {
        KeyKind::Public
    } else if text.starts_with(KeyKind::Secret.text_prefix()) {
        KeyKind::Secret
    } else {
        return Err(Error::InvalidKeyEncoding(format!("unknown prefix in {}", text)));
    };

    let bytes = bs58::decode(text)
        .into_vec()
        .map_err(|e| Error::InvalidKeyEncoding(e.to_string()))?;
    if bytes.len() != ID_KEY_LEN {
        return Err(Error::InvalidKeyEncoding(format!(
            "decoded key is {} bytes",
            bytes.len()
        )));
    }
    if bytes[..5] != kind.byte_prefix() {
        return Err(Error::InvalidKeyEncoding(
            "prefix bytes do not match key type".to_owned(),
        ));
    }
    if sha256d(&bytes[..37])[..4] != bytes[37..] {
        return Err(Error::InvalidKeyEncoding("bad checksum".to_owned()));
    }

    let mut raw = [0u8; 32];
    raw.copy_from_slice(&bytes[5..37]);
    Ok(IdentityKey { kind, raw })
}

/// The `idpub` form of a public or secret identity key
pub fn public_identity_key(text: &str) -> Result<String, Error> {
    Ok(decode_identity_key(text)?.to_public()?.to_string())
}

/// Read a secret key given either as a 32 byte seed or as 64 bytes of seed followed by public key
pub fn secret_key_from_bytes(secret: &[u8]) -> Result<SecretKey, Error> {
    match secret.len() {
        32 => Ok(SecretKey::from_bytes(secret)?),
        64 => {
            let secret_key = SecretKey::from_bytes(&secret[..32])?;
            let public_key: PublicKey = (&secret_key).into();
            if public_key.as_bytes()[..] != secret[32..] {
                return Err(Error::MismatchedPublicKeys);
            }
            Ok(secret_key)
        }
        len => Err(Error::BadKeyLength(len)),
    }
}

pub fn derive_public_from_secret(secret: &[u8]) -> Result<PublicKey, Error> {
    let secret_key = secret_key_from_bytes(secret)?;
    Ok((&secret_key).into())
}

/// External key registry: which public keys were active for an identity at a height.
#[async_trait]
pub trait PublicKeysResolver: Send + Sync {
    /// `height: None` asks for the currently active keys
    async fn public_keys(&self, identity: &ChainId, height: Option<u64>)
        -> Result<Vec<String>, Error>;
}

/// External wallet lookup of the secret half of a public identity key (write path only).
#[async_trait]
pub trait SecretKeyResolver: Send + Sync {
    async fn secret_key(&self, public_key: &str) -> Result<String, Error>;
}

/// Check that `key` was active for `identity` at `height`
///
/// Always asks the registry; associations are never cached.
pub async fn verify_association<R>(
    resolver: &R,
    identity: &ChainId,
    key: &str,
    height: Option<u64>,
) -> Result<(), Error>
where
    R: PublicKeysResolver + ?Sized,
{
    let public = public_identity_key(key)?;
    let keys = resolver.public_keys(identity, height).await?;

    if !keys.iter().any(|k| *k == public) {
        return Err(Error::UnassociatedKey {
            key: public,
            identity: *identity,
            height,
        });
    }
    Ok(())
}

/// Signs on behalf of an identity whose secret key is held elsewhere (hardware wallet, remote signer...)
#[async_trait]
pub trait ExternalSigner: Send + Sync {
    async fn sign(&self, message: &[u8]) -> Result<Vec<u8>, Error>;
}

pub enum Signer {
    Local(SecretKey),
    External(Arc<dyn ExternalSigner>),
}

/// An identity able to sign ledger records
pub struct Identity {
    pub chain_id: ChainId,
    pub public_key: PublicKey,
    signer: Signer,
}

impl Identity {
    pub fn from_secret_key(chain_id: ChainId, secret: SecretKey) -> Self {
        let public_key: PublicKey = (&secret).into();
        Identity {
            chain_id,
            public_key,
            signer: Signer::Local(secret),
        }
    }

    pub fn with_external_signer(
        chain_id: ChainId,
        public_key: PublicKey,
        signer: Arc<dyn ExternalSigner>,
    ) -> Self {
        Identity {
            chain_id,
            public_key,
            signer: Signer::External(signer),
        }
    }

    /// Build a signing identity from key text, checking the key is currently active for the identity
    ///
    /// An `idsec` key signs directly. For an `idpub` key the external signer is used when given,
    /// otherwise the secret is fetched from the secret key resolver.
    pub async fn resolve(
        public_keys: &dyn PublicKeysResolver,
        secret_keys: Option<&dyn SecretKeyResolver>,
        chain_id: ChainId,
        key: &str,
        external: Option<Arc<dyn ExternalSigner>>,
    ) -> Result<Self, Error> {
        let decoded = decode_identity_key(key)?;
        let public = decoded.to_public()?;
        verify_association(public_keys, &chain_id, &public.to_string(), None).await?;
        let public_key = public.public_key()?;

        if let Some(signer) = external {
            return Ok(Identity::with_external_signer(chain_id, public_key, signer));
        }

        let secret = match decoded.kind() {
            KeyKind::Secret => decoded,
            KeyKind::Public => {
                let resolver = secret_keys.ok_or_else(|| Error::NoSecretKey(public.to_string()))?;
                decode_identity_key(&resolver.secret_key(&public.to_string()).await?)?
            }
        };

        let identity = Identity::from_secret_key(chain_id, secret.secret_key()?);
        if identity.public_key != public_key {
            return Err(Error::MismatchedPublicKeys);
        }
        Ok(identity)
    }

    pub fn signer(&self) -> &Signer {
        &self.signer
    }

    pub fn public_identity_key(&self) -> String {
        IdentityKey::from_public_key(&self.public_key).to_string()
    }

    /// Sign a message
    ///
    /// Signatures produced by an external signer are verified against this identity's public
    /// key before being handed back.
    pub async fn sign(&self, message: &[u8]) -> Result<Signature, Error> {
        match &self.signer {
            Signer::Local(secret) => {
                let expanded: ExpandedSecretKey = secret.into();
                Ok(expanded.sign(message, &self.public_key))
            }
            Signer::External(external) => {
                let bytes = external.sign(message).await?;
                let mismatch = || Error::ExternalSignerMismatch(self.public_identity_key());
                let signature = Signature::try_from(&bytes[..]).map_err(|_| mismatch())?;
                self.public_key
                    .verify_strict(message, &signature)
                    .map_err(|_| mismatch())?;
                Ok(signature)
            }
        }
    }
}

/// A key registry kept in memory
///
/// Each key is active from its registration height (inclusive) until it is revoked (exclusive).
#[derive(Default, Clone)]
pub struct MemKeyRegistry {
    keys: HashMap<ChainId, Vec<RegisteredKey>>,
    secrets: HashMap<String, String>,
}

#[derive(Clone)]
struct RegisteredKey {
    key: String,
    from: u64,
    until: Option<u64>,
}

impl MemKeyRegistry {
    pub fn register(&mut self, identity: ChainId, key: &PublicKey, from: u64) {
        self.keys.entry(identity).or_default().push(RegisteredKey {
            key: IdentityKey::from_public_key(key).to_string(),
            from,
            until: None,
        });
    }

    pub fn revoke(&mut self, identity: ChainId, key: &PublicKey, at: u64) {
        let encoded = IdentityKey::from_public_key(key).to_string();
        if let Some(keys) = self.keys.get_mut(&identity) {
            for registered in keys.iter_mut().filter(|k| k.key == encoded) {
                registered.until = Some(at);
            }
        }
    }

    pub fn store_secret(&mut self, secret: &SecretKey) {
        let public: PublicKey = secret.into();
        self.secrets.insert(
            IdentityKey::from_public_key(&public).to_string(),
            IdentityKey::secret(secret.to_bytes()).to_string(),
        );
    }
}

#[async_trait]
impl PublicKeysResolver for MemKeyRegistry {
    async fn public_keys(
        &self,
        identity: &ChainId,
        height: Option<u64>,
    ) -> Result<Vec<String>, Error> {
        let keys = match self.keys.get(identity) {
            Some(keys) => keys,
            None => return Ok(vec![]),
        };

        Ok(keys
            .iter()
            .filter(|k| match height {
                Some(h) => k.from <= h && k.until.map_or(true, |until| h < until),
                None => k.until.is_none(),
            })
            .map(|k| k.key.clone())
            .collect())
    }
}

#[async_trait]
impl SecretKeyResolver for MemKeyRegistry {
    async fn secret_key(&self, public_key: &str) -> Result<String, Error> {
        self.secrets
            .get(public_key)
            .cloned()
            .ok_or_else(|| Error::NoSecretKey(public_key.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUB_KEY: &str = "idpub3Doj5fqXye8PkX8w83hzPh3PXbiLhrxTZjT6sXmtFQdDyzwymz";
    const SEC_KEY: &str = "idsec1wnZ9FLheMDXZNnnDHXdqZcMiDrgg2hTNzdseNLwFnEot362c4";

    struct FixedSigner(SecretKey);

    #[async_trait]
    impl ExternalSigner for FixedSigner {
        async fn sign(&self, message: &[u8]) -> Result<Vec<u8>, Error> {
            let public: PublicKey = (&self.0).into();
            let expanded: ExpandedSecretKey = (&self.0).into();
            Ok(expanded.sign(message, &public).to_bytes().to_vec())
        }
    }

    struct GarbageSigner;

    #[async_trait]
    impl ExternalSigner for GarbageSigner {
        async fn sign(&self, _message: &[u8]) -> Result<Vec<u8>, Error> {
            Ok(vec![7; 64])
        }
    }

    #[test]
    fn validate_identity_keys() {
        assert!(decode_identity_key("idpub2eubg6p18fefnHPW2Z42Wyre8LwqmRbHpkaEfEmJ213cUo8u7w").is_ok());
        assert!(decode_identity_key("idsec2Vn3VT8FdE1YpcDms8zSvXR4DGzQeMMdeLRP2RbMCSWCFoQDbS").is_ok());

        // Last character altered: checksum no longer matches
        assert!(matches!(
            decode_identity_key("idsec2Vn3VT8FdE1YpcDms8zSvXR4DGzQeMMdeLRP2RbMCSWCFoQDbK"),
            Err(Error::InvalidKeyEncoding(_))
        ));
        assert!(decode_identity_key("idxyz2Vn3VT8FdE1YpcDms8zSvXR4DGzQeMMdeLRP2RbMCSWCFoQDbS").is_err());
        assert!(decode_identity_key("idpub").is_err());
        assert!(decode_identity_key("").is_err());

        let key = decode_identity_key(PUB_KEY).unwrap();
        assert_eq!(key.kind(), KeyKind::Public);
        assert_eq!(
            hex::encode(key.raw()),
            "c103756200d0c1223c0ee9911196bf06de6ee570b0f45897e2ef39f9abf39d24"
        );

        let key = decode_identity_key(SEC_KEY).unwrap();
        assert_eq!(key.kind(), KeyKind::Secret);
        assert_eq!(
            hex::encode(key.raw()),
            "67fe571d8cbad2c0d0d10b295301eaf631d43ff82f21c7f161448f220ad22c66"
        );
        assert_eq!(key.to_string(), SEC_KEY);
    }

    #[test]
    fn public_key_from_secret() {
        assert_eq!(public_identity_key(SEC_KEY).unwrap(), PUB_KEY);
        assert_eq!(public_identity_key(PUB_KEY).unwrap(), PUB_KEY);
        assert_eq!(
            public_identity_key("idsec2Vn3VT8FdE1YpcDms8zSvXR4DGzQeMMdeLRP2RbMCSWCFoQDbS").unwrap(),
            "idpub2eubg6p18fefnHPW2Z42Wyre8LwqmRbHpkaEfEmJ213cUo8u7w"
        );
    }

    #[test]
    fn derive_from_seed_or_full_secret() {
        let seed =
            hex::decode("11de38af16cfc79c0827d7671b501560bfe4161e1801c6db6a4128aa0013d3ff").unwrap();
        let public =
            hex::decode("a1597a9808b2be2548d7f29c7fcd884a52916aca4bbe442118044e294c2de971").unwrap();

        assert_eq!(derive_public_from_secret(&seed).unwrap().as_bytes()[..], public[..]);

        let mut full = seed.clone();
        full.extend_from_slice(&public);
        assert_eq!(derive_public_from_secret(&full).unwrap().as_bytes()[..], public[..]);

        full[63] ^= 1;
        assert!(matches!(
            derive_public_from_secret(&full),
            Err(Error::MismatchedPublicKeys)
        ));
        assert!(matches!(
            derive_public_from_secret(&seed[..31]),
            Err(Error::BadKeyLength(31))
        ));
    }

    #[tokio::test]
    async fn association_at_height() {
        let identity = ChainId([1; 32]);
        let key = decode_identity_key(PUB_KEY).unwrap().public_key().unwrap();

        let mut registry = MemKeyRegistry::default();
        registry.register(identity, &key, 5);
        registry.revoke(identity, &key, 10);

        verify_association(&registry, &identity, PUB_KEY, Some(7)).await.unwrap();
        // A secret key text is checked through its public half
        verify_association(&registry, &identity, SEC_KEY, Some(5)).await.unwrap();

        for height in &[Some(4), Some(10), None] {
            let err = verify_association(&registry, &identity, PUB_KEY, *height)
                .await
                .unwrap_err();
            assert!(matches!(err, Error::UnassociatedKey { .. }));
        }

        let other = ChainId([2; 32]);
        assert!(verify_association(&registry, &other, PUB_KEY, Some(7)).await.is_err());
    }

    #[tokio::test]
    async fn sign_with_secret_key() {
        let seed =
            hex::decode("11de38af16cfc79c0827d7671b501560bfe4161e1801c6db6a4128aa0013d3ff").unwrap();
        let identity = Identity::from_secret_key(ChainId([1; 32]), SecretKey::from_bytes(&seed).unwrap());

        let sig = identity.sign(b"dummy").await.unwrap();
        assert_eq!(
            hex::encode(sig.to_bytes().to_vec()),
            "ce88857fbacb8eaa8afffbc90d2ef9ee79d5b79a80d182942e098bf0feac092ca0630a5e2bfe0d4e6e7eee704fe714db6a010c99f4f1f178f3fbeb430fefc40d"
        );
    }

    #[tokio::test]
    async fn sign_with_external_signer() {
        let (secret, public) = generate_keypair();
        let signer = Arc::new(FixedSigner(secret));
        let identity = Identity::with_external_signer(ChainId([1; 32]), public, signer);

        let sig = identity.sign(b"hello").await.unwrap();
        public.verify_strict(b"hello", &sig).unwrap();

        // A signer that produces garbage is caught
        let identity = Identity::with_external_signer(ChainId([1; 32]), public, Arc::new(GarbageSigner));
        assert!(matches!(
            identity.sign(b"hello").await,
            Err(Error::ExternalSignerMismatch(_))
        ));

        // So is a signer holding the wrong key
        let (other_secret, _) = generate_keypair();
        let identity =
            Identity::with_external_signer(ChainId([1; 32]), public, Arc::new(FixedSigner(other_secret)));
        assert!(identity.sign(b"hello").await.is_err());
    }

    #[tokio::test]
    async fn resolve_identity() {
        let chain_id =
            ChainId::from_str("2d98021e3cf71580102224b2fcb4c5c60595e8fdf6fd1b97c6ef63e9fb3ed635")
                .unwrap();
        let secret = decode_identity_key(SEC_KEY).unwrap().secret_key().unwrap();
        let public: PublicKey = (&secret).into();

        let mut registry = MemKeyRegistry::default();
        registry.register(chain_id, &public, 0);

        // No secret anywhere
        assert!(matches!(
            Identity::resolve(&registry, None, chain_id, PUB_KEY, None).await,
            Err(Error::NoSecretKey(_))
        ));

        registry.store_secret(&secret);
        let identity = Identity::resolve(&registry, Some(&registry), chain_id, PUB_KEY, None)
            .await
            .unwrap();
        assert_eq!(identity.chain_id, chain_id);
        assert_eq!(identity.public_identity_key(), PUB_KEY);
        assert!(matches!(identity.signer(), Signer::Local(_)));

        let identity = Identity::resolve(&registry, None, chain_id, SEC_KEY, None)
            .await
            .unwrap();
        assert_eq!(identity.public_key, public);

        let external: Arc<dyn ExternalSigner> =
            Arc::new(FixedSigner(SecretKey::from_bytes(secret.as_bytes()).unwrap()));
        let identity = Identity::resolve(&registry, None, chain_id, PUB_KEY, Some(external))
            .await
            .unwrap();
        assert!(matches!(identity.signer(), Signer::External(_)));

        // Unregistered key
        let (_, stranger) = generate_keypair();
        let stranger_key = IdentityKey::from_public_key(&stranger).to_string();
        assert!(matches!(
            Identity::resolve(&registry, Some(&registry), chain_id, &stranger_key, None).await,
            Err(Error::UnassociatedKey { .. })
        ));
    }
}
