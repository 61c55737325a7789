use ed25519_dalek::Keypair;
use ed25519_dalek::PublicKey;
use ed25519_dalek::SecretKey;
use rand::Rng;

pub fn generate_keypair() -> (SecretKey, PublicKey) {
    let mut csprng = rand::rngs::OsRng {};
    let Keypair { public, secret } = Keypair::generate(&mut csprng);
    (secret, public)
}

/// Fresh 32 byte nonce binding a signature to a single record
pub fn generate_nonce() -> [u8; 32] {
    let mut csprng = rand::rngs::OsRng {};
    csprng.gen()
}
