//! Cryptographic primitives named by spec.md §6.
//!
//! spec.md treats the *implementations* of ECDSA, SHA-256 and RIPEMD-160 as
//! external collaborators and only specifies their call signatures; here
//! they are backed by real, widely used crates (`sha2`, `ripemd`,
//! `secp256k1`) rather than hand-rolled, since nothing about this exercise's
//! ground rules asks us to reinvent a cipher primitive the ecosystem already
//! gets right.

use ripemd::Ripemd160;
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1, VerifyOnly};
use sha2::{Digest, Sha256};

use crate::error::CryptoError;
use crate::Hash;

/// `SHA256(SHA256(bytes))`.
pub fn sha256d(bytes: &[u8]) -> Hash {
    let once = Sha256::digest(bytes);
    let twice = Sha256::digest(once);
    let mut out = [0u8; 32];
    out.copy_from_slice(&twice);
    out
}

/// `RIPEMD160(SHA256(bytes))`, a.k.a. "hash160".
pub fn ripemd160_sha256(bytes: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(bytes);
    let ripe = Ripemd160::digest(sha);
    let mut out = [0u8; 20];
    out.copy_from_slice(&ripe);
    out
}

/// First four bytes of `SHA256(SHA256(payload))`, used as the wire message
/// checksum (spec.md §3).
pub fn checksum(payload: &[u8]) -> [u8; 4] {
    let digest = sha256d(payload);
    let mut out = [0u8; 4];
    out.copy_from_slice(&digest[..4]);
    out
}

fn verifier() -> Secp256k1<VerifyOnly> {
    Secp256k1::verification_only()
}

/// Verifies a DER-encoded ECDSA signature over `message` (already hashed to
/// 32 bytes by the caller) against a 33/65-byte serialized public key.
pub fn verify_ecdsa(public_key: &[u8], message: &Hash, der_signature: &[u8]) -> Result<(), CryptoError> {
    let pk = PublicKey::from_slice(public_key).map_err(|_| CryptoError::BadPublicKey)?;
    let sig = Signature::from_der(der_signature).map_err(|_| CryptoError::BadSignature)?;
    let msg = Message::from_digest_slice(message).map_err(|_| CryptoError::BadSignature)?;
    verifier()
        .verify_ecdsa(&msg, &sig, &pk)
        .map_err(|_| CryptoError::VerificationFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secp256k1::{rand, SecretKey, Secp256k1};

    #[test]
    fn sha256d_is_idempotent_on_same_input() {
        let a = sha256d(b"thunderbolt");
        let b = sha256d(b"thunderbolt");
        assert_eq!(a, b);
    }

    #[test]
    fn ecdsa_roundtrip_verifies() {
        let secp = Secp256k1::new();
        let mut rng = rand::thread_rng();
        let (sk, pk) = secp.generate_keypair(&mut rng);
        let msg_bytes = sha256d(b"preimage");
        let msg = Message::from_digest_slice(&msg_bytes).unwrap();
        let sig = secp.sign_ecdsa(&msg, &SecretKey::from(sk));
        assert!(verify_ecdsa(&pk.serialize(), &msg_bytes, &sig.serialize_der()).is_ok());
    }

    #[test]
    fn ecdsa_rejects_wrong_key() {
        let secp = Secp256k1::new();
        let mut rng = rand::thread_rng();
        let (sk, _pk) = secp.generate_keypair(&mut rng);
        let (_, other_pk) = secp.generate_keypair(&mut rng);
        let msg_bytes = sha256d(b"preimage");
        let msg = Message::from_digest_slice(&msg_bytes).unwrap();
        let sig = secp.sign_ecdsa(&msg, &SecretKey::from(sk));
        assert!(verify_ecdsa(&other_pk.serialize(), &msg_bytes, &sig.serialize_der()).is_err());
    }
}
