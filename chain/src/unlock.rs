//! Script-free unlock evaluation (spec.md §4.4.2, §1 Non-goals).
//!
//! The system has no script VM; instead a fixed taxonomy of three lock
//! types is evaluated directly against a witness blob carried alongside
//! each input. Witness encoding is local to this crate — the wire/storage
//! codec only ever sees `witnesses: list<bytes>`.

use std::collections::HashSet;

use thiserror::Error;
use thunderbolt_core::codec::{encode_outpoint, Reader, Writer};
use thunderbolt_core::crypto::{ripemd160_sha256, sha256d, verify_ecdsa};
use thunderbolt_core::model::{LockType, Outpoint, Output};
use thunderbolt_core::{CodecError, CodecResult, CryptoError};

#[derive(Debug, Error)]
pub enum UnlockError {
    #[error("output is unspendable")]
    Unspendable,
    #[error("witness key does not match lock params")]
    KeyMismatch,
    #[error("expected {expected} signatures, witness carries {got}")]
    WrongSignatureCount { expected: usize, got: usize },
    #[error("key index {0} used more than once")]
    DuplicateKeyIndex(u8),
    #[error("key index {0} out of range")]
    KeyIndexOutOfRange(u8),
    #[error("signature does not verify")]
    SignatureInvalid,
    #[error("malformed witness: {0}")]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// One public key and one DER signature, the witness shape for `SingleSig`.
pub struct SingleSigWitness {
    pub public_key: Vec<u8>,
    pub signature: Vec<u8>,
}

pub fn encode_single_sig_witness(w: &SingleSigWitness) -> Vec<u8> {
    let mut writer = Writer::new();
    writer.write_bytes(&w.public_key);
    writer.write_bytes(&w.signature);
    writer.into_bytes()
}

pub fn decode_single_sig_witness(bytes: &[u8]) -> CodecResult<SingleSigWitness> {
    let mut r = Reader::new(bytes);
    let public_key = r.read_bytes(4096)?;
    let signature = r.read_bytes(4096)?;
    Ok(SingleSigWitness { public_key, signature })
}

/// `M` signatures over `pubkeys`, keyed by the index of the key they claim
/// to belong to, the witness shape for `MultiSig`.
pub struct MultiSigWitness {
    pub m: u8,
    pub pubkeys: Vec<Vec<u8>>,
    pub sig_map: Vec<(u8, Vec<u8>)>,
}

pub fn encode_multi_sig_witness(w: &MultiSigWitness) -> Vec<u8> {
    let mut writer = Writer::new();
    writer.write_u8(w.m);
    writer.write_vec(&w.pubkeys, |w, pk| w.write_bytes(pk));
    writer.write_vec(&w.sig_map, |w, (idx, sig)| {
        w.write_u8(*idx);
        w.write_bytes(sig);
    });
    writer.into_bytes()
}

pub fn decode_multi_sig_witness(bytes: &[u8]) -> CodecResult<MultiSigWitness> {
    let mut r = Reader::new(bytes);
    let m = r.read_u8()?;
    let pubkeys = r.read_vec(256, |r| r.read_bytes(4096))?;
    let sig_map = r.read_vec(256, |r| Ok((r.read_u8()?, r.read_bytes(4096)?)))?;
    Ok(MultiSigWitness { m, pubkeys, sig_map })
}

/// The bytes that are signed: `serialize(input) || lockType || lockParams`
/// (spec.md §4.4.2), double-hashed before being handed to `verify_ecdsa`.
/// Public so a wallet can compute the same digest it must sign over.
pub fn signed_digest(input: &Outpoint, output: &Output) -> thunderbolt_core::Hash {
    let mut w = Writer::new();
    encode_outpoint(&mut w, input);
    w.write_u8(output.lock_type.tag());
    w.write_bytes(&output.lock_params);
    sha256d(&w.into_bytes())
}

/// Encodes the `(M, pubkeys)` pair whose double-hash a `MultiSig` output's
/// `lockParams` must equal.
fn multi_sig_key_hash(m: u8, pubkeys: &[Vec<u8>]) -> thunderbolt_core::Hash {
    let mut w = Writer::new();
    w.write_u8(m);
    w.write_vec(pubkeys, |w, pk| w.write_bytes(pk));
    sha256d(&w.into_bytes())
}

/// Evaluates one input's witness against the output it claims to spend.
pub fn check_unlock(input: &Outpoint, output: &Output, witness_bytes: &[u8]) -> Result<(), UnlockError> {
    match output.lock_type {
        LockType::Unspendable => Err(UnlockError::Unspendable),
        LockType::SingleSig => {
            let witness = decode_single_sig_witness(witness_bytes)?;
            let hash160 = ripemd160_sha256(&witness.public_key);
            if hash160.as_slice() != output.lock_params.as_slice() {
                return Err(UnlockError::KeyMismatch);
            }
            let digest = signed_digest(input, output);
            verify_ecdsa(&witness.public_key, &digest, &witness.signature).map_err(UnlockError::from)
        }
        LockType::MultiSig => {
            let witness = decode_multi_sig_witness(witness_bytes)?;
            let key_hash = multi_sig_key_hash(witness.m, &witness.pubkeys);
            if key_hash.as_slice() != output.lock_params.as_slice() {
                return Err(UnlockError::KeyMismatch);
            }
            if witness.sig_map.len() != witness.m as usize {
                return Err(UnlockError::WrongSignatureCount { expected: witness.m as usize, got: witness.sig_map.len() });
            }
            let digest = signed_digest(input, output);
            let mut used = HashSet::new();
            for (idx, sig) in &witness.sig_map {
                if !used.insert(*idx) {
                    return Err(UnlockError::DuplicateKeyIndex(*idx));
                }
                let pubkey = witness
                    .pubkeys
                    .get(*idx as usize)
                    .ok_or(UnlockError::KeyIndexOutOfRange(*idx))?;
                verify_ecdsa(pubkey, &digest, sig).map_err(|_| UnlockError::SignatureInvalid)?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secp256k1::{rand, Message, Secp256k1, SecretKey};

    fn sample_outpoint() -> Outpoint {
        Outpoint { ref_tx: [7u8; 32], index: 1 }
    }

    #[test]
    fn single_sig_roundtrip_verifies() {
        let secp = Secp256k1::new();
        let mut rng = rand::thread_rng();
        let (sk, pk) = secp.generate_keypair(&mut rng);
        let input = sample_outpoint();
        let lock_params = ripemd160_sha256(&pk.serialize()).to_vec();
        let output = Output { amount: 100, lock_type: LockType::SingleSig, lock_params };
        let digest = signed_digest(&input, &output);
        let msg = Message::from_digest_slice(&digest).unwrap();
        let sig = secp.sign_ecdsa(&msg, &SecretKey::from(sk));
        let witness = encode_single_sig_witness(&SingleSigWitness {
            public_key: pk.serialize().to_vec(),
            signature: sig.serialize_der().to_vec(),
        });
        assert!(check_unlock(&input, &output, &witness).is_ok());
    }

    #[test]
    fn single_sig_rejects_wrong_key() {
        let secp = Secp256k1::new();
        let mut rng = rand::thread_rng();
        let (sk, pk) = secp.generate_keypair(&mut rng);
        let (_, other_pk) = secp.generate_keypair(&mut rng);
        let input = sample_outpoint();
        let lock_params = ripemd160_sha256(&pk.serialize()).to_vec();
        let output = Output { amount: 100, lock_type: LockType::SingleSig, lock_params };
        let digest = signed_digest(&input, &output);
        let msg = Message::from_digest_slice(&digest).unwrap();
        let sig = secp.sign_ecdsa(&msg, &SecretKey::from(sk));
        let witness = encode_single_sig_witness(&SingleSigWitness {
            public_key: other_pk.serialize().to_vec(),
            signature: sig.serialize_der().to_vec(),
        });
        assert!(check_unlock(&input, &output, &witness).is_err());
    }

    #[test]
    fn unspendable_always_fails() {
        let input = sample_outpoint();
        let output = Output { amount: 1, lock_type: LockType::Unspendable, lock_params: vec![] };
        assert!(matches!(check_unlock(&input, &output, &[]), Err(UnlockError::Unspendable)));
    }

    #[test]
    fn multisig_two_of_three_verifies() {
        let secp = Secp256k1::new();
        let mut rng = rand::thread_rng();
        let (sk1, pk1) = secp.generate_keypair(&mut rng);
        let (sk2, pk2) = secp.generate_keypair(&mut rng);
        let (_, pk3) = secp.generate_keypair(&mut rng);
        let pubkeys = vec![pk1.serialize().to_vec(), pk2.serialize().to_vec(), pk3.serialize().to_vec()];
        let lock_params = multi_sig_key_hash(2, &pubkeys).to_vec();
        let input = sample_outpoint();
        let output = Output { amount: 100, lock_type: LockType::MultiSig, lock_params };
        let digest = signed_digest(&input, &output);
        let msg = Message::from_digest_slice(&digest).unwrap();
        let sig1 = secp.sign_ecdsa(&msg, &SecretKey::from(sk1));
        let sig2 = secp.sign_ecdsa(&msg, &SecretKey::from(sk2));
        let witness = encode_multi_sig_witness(&MultiSigWitness {
            m: 2,
            pubkeys,
            sig_map: vec![(0, sig1.serialize_der().to_vec()), (1, sig2.serialize_der().to_vec())],
        });
        assert!(check_unlock(&input, &output, &witness).is_ok());
    }

    #[test]
    fn multisig_rejects_duplicate_key_index() {
        let secp = Secp256k1::new();
        let mut rng = rand::thread_rng();
        let (sk1, pk1) = secp.generate_keypair(&mut rng);
        let (_, pk2) = secp.generate_keypair(&mut rng);
        let pubkeys = vec![pk1.serialize().to_vec(), pk2.serialize().to_vec()];
        let lock_params = multi_sig_key_hash(2, &pubkeys).to_vec();
        let input = sample_outpoint();
        let output = Output { amount: 100, lock_type: LockType::MultiSig, lock_params };
        let digest = signed_digest(&input, &output);
        let msg = Message::from_digest_slice(&digest).unwrap();
        let sig1 = secp.sign_ecdsa(&msg, &SecretKey::from(sk1));
        let witness = encode_multi_sig_witness(&MultiSigWitness {
            m: 2,
            pubkeys,
            sig_map: vec![(0, sig1.serialize_der().to_vec()), (0, sig1.serialize_der().to_vec())],
        });
        assert!(matches!(check_unlock(&input, &output, &witness), Err(UnlockError::DuplicateKeyIndex(0))));
    }
}
