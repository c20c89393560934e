//! Cryptographic primitives
//!
//! Blake2b digests of the sizes the protocol uses, deterministic key
//! derivation from a seed, and the network's Ed25519 variant (Blake2b-512 in
//! place of SHA-512) for signing and verification.

use crate::types::{PrivateKey, PublicKey, Seed, Signature, KEY_SIZE};
use crate::{Error, Result};
use blake2::digest::consts::{U32, U5, U8};
use blake2::{Blake2b, Blake2b512, Digest};
use byteorder::{ByteOrder, LittleEndian};
use ed25519_dalek::hazmat::{raw_sign, raw_verify, ExpandedSecretKey};
use ed25519_dalek::{Signature as DalekSignature, VerifyingKey};

type Blake2b256 = Blake2b<U32>;
type Blake2b64 = Blake2b<U8>;
type Blake2b40 = Blake2b<U5>;

/// Blake2b-256 over the concatenation of `parts`
pub fn blake2b_256(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Blake2b with a 5-byte digest, in natural output order
pub fn blake2b_40(data: &[u8]) -> [u8; 5] {
    let digest = Blake2b40::digest(data);
    let mut out = [0u8; 5];
    out.copy_from_slice(&digest);
    out
}

/// Work hash: Blake2b-64 of `nonce_le ‖ root`, read as a little-endian integer
#[inline]
pub fn work_hash(nonce_le: &[u8; 8], root: &[u8; KEY_SIZE]) -> u64 {
    let mut hasher = Blake2b64::new();
    hasher.update(nonce_le);
    hasher.update(root);
    LittleEndian::read_u64(&hasher.finalize())
}

/// Private/public key pair of one account
#[derive(Clone)]
pub struct KeyPair {
    private_key: PrivateKey,
    public_key: PublicKey,
}

impl KeyPair {
    /// Rebuild a key pair from a private key
    pub fn from_private_key(private_key: PrivateKey) -> Self {
        let public_key = PublicKey(verifying_key(&private_key).to_bytes());
        Self {
            private_key,
            public_key,
        }
    }

    /// Get the private key
    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    /// Get the public key
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> Signature {
        sign_message(&self.private_key, message)
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

/// Derive the key pair at `index` from `seed`
///
/// The private key is `Blake2b-256(seed ‖ index_be32)`. The index is taken as
/// `u64` so that out-of-range input is rejected here instead of being
/// truncated by the caller.
pub fn derive(seed: &Seed, index: u64) -> Result<KeyPair> {
    let index = u32::try_from(index).map_err(|_| Error::IndexOutOfRange { index })?;
    let private_key = PrivateKey(blake2b_256(&[seed.as_bytes(), &index.to_be_bytes()]));
    Ok(KeyPair::from_private_key(private_key))
}

fn expand(private_key: &PrivateKey) -> ExpandedSecretKey {
    let mut expanded = [0u8; 64];
    expanded.copy_from_slice(&Blake2b512::digest(private_key.as_bytes()));
    ExpandedSecretKey::from_bytes(&expanded)
}

fn verifying_key(private_key: &PrivateKey) -> VerifyingKey {
    VerifyingKey::from(&expand(private_key))
}

/// Sign `message` with the Blake2b-512 Ed25519 variant
pub fn sign_message(private_key: &PrivateKey, message: &[u8]) -> Signature {
    let expanded = expand(private_key);
    let verifying = VerifyingKey::from(&expanded);
    let signature = raw_sign::<Blake2b512>(&expanded, message, &verifying);
    Signature(signature.to_bytes())
}

/// Verify `signature` over `message`
///
/// A public key that does not decode to a curve point cannot have produced
/// any signature, so it verifies as `false`.
pub fn verify_message(public_key: &PublicKey, message: &[u8], signature: &Signature) -> bool {
    let Ok(verifying) = VerifyingKey::from_bytes(public_key.as_bytes()) else {
        return false;
    };
    let signature = DalekSignature::from_bytes(signature.as_bytes());
    raw_verify::<Blake2b512>(&verifying, message, &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const ZERO_SEED_KEY_0: &str =
        "9F0E444C69F77A49BD0BE89DB92C38FE713E0963165CCA12FAF5712D7657120F";
    const ZERO_SEED_PUB_0: &str =
        "C008B814A7D269A1FA3C6528B19201A24D797912DB9996FF02A1FF356E45552B";

    #[test]
    fn test_blake2b_sizes() {
        assert_eq!(blake2b_40(b"abc"), blake2b_40(b"abc"));
        assert_ne!(blake2b_40(b"abc"), blake2b_40(b"abd"));
        assert_eq!(blake2b_256(&[b"ab", b"c"]), blake2b_256(&[b"abc"]));
    }

    #[test]
    fn test_work_hash_known_value() {
        let root: [u8; 32] =
            hex::decode("718CC2121C3E641059BC1C2CFC45666C99E8AE922F7A807B7D07B62C995D79E2")
                .unwrap()
                .try_into()
                .unwrap();
        let nonce = 0x2bf2_9ef0_0786_a6bcu64.to_le_bytes();
        assert_eq!(work_hash(&nonce, &root), 0xffff_ffd2_1c39_33f4);
    }

    #[test]
    fn test_derive_known_vector() {
        let seed = Seed::from_bytes([0u8; 32]);
        let keys = derive(&seed, 0).unwrap();
        assert_eq!(keys.private_key().to_hex(), ZERO_SEED_KEY_0);
        assert_eq!(keys.public_key().to_hex(), ZERO_SEED_PUB_0);
    }

    #[test]
    fn test_derive_is_deterministic() {
        let seed = Seed::from_bytes([0x42u8; 32]);
        let a = derive(&seed, 7).unwrap();
        let b = derive(&seed, 7).unwrap();
        let c = derive(&seed, 8).unwrap();
        assert_eq!(a.private_key(), b.private_key());
        assert_eq!(a.public_key(), b.public_key());
        assert_ne!(a.public_key(), c.public_key());
    }

    #[test]
    fn test_derive_index_boundary() {
        let seed = Seed::from_bytes([1u8; 32]);
        assert!(derive(&seed, 4_294_967_295).is_ok());
        assert_matches!(
            derive(&seed, 4_294_967_296),
            Err(Error::IndexOutOfRange { index: 4_294_967_296 })
        );
    }

    #[test]
    fn test_key_pair_from_private_key() {
        let keys = KeyPair::from_private_key(PrivateKey::from_hex(ZERO_SEED_KEY_0).unwrap());
        assert_eq!(keys.public_key().to_hex(), ZERO_SEED_PUB_0);
        assert!(!format!("{:?}", keys).contains(ZERO_SEED_KEY_0));
    }

    #[test]
    fn test_sign_and_verify() {
        let keys = derive(&Seed::from_bytes([3u8; 32]), 0).unwrap();
        let signature = keys.sign(b"block hash");
        assert!(verify_message(keys.public_key(), b"block hash", &signature));
        assert!(!verify_message(keys.public_key(), b"other hash", &signature));

        let other = derive(&Seed::from_bytes([3u8; 32]), 1).unwrap();
        assert!(!verify_message(other.public_key(), b"block hash", &signature));
    }

    #[test]
    fn test_known_signature() {
        let keys = derive(&Seed::from_bytes([0u8; 32]), 0).unwrap();
        let hash =
            hex::decode("D8F678EBE97FCC9EEF4FAF73C93DD4937D09072504A721C81079F8C2D5710C6D")
                .unwrap();
        let signature = keys.sign(&hash);
        assert_eq!(
            signature.to_hex(),
            "F09E7BC3C8C5CE4A11FD133E72B6C8093FC65F6E211B0FC4FC3AEEA53DF4750B\
             23C58911E56228D77A5676C6F9B3002DBE4D53A8709B648EA16E78355C412404"
        );
    }
}
