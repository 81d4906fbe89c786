//! `wallet.dat` container format (spec.md §6): `IV(16) || SALT(32) ||
//! len:u32 || ciphertext`. Key derivation `K = SHA256(SHA256(utf8(pass)) ||
//! salt)`; cipher AES-128-CBC with PKCS#7. Plaintext is the big-endian
//! ECDSA private scalar (32 bytes).
//!
//! `K` is a 32-byte SHA-256 digest; AES-128 takes a 16-byte key, so the
//! leading half of `K` is used as the cipher key. spec.md names the key
//! derivation but not this truncation explicitly — see DESIGN.md.

use aes::Aes128;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{Result, WalletError};

const IV_LEN: usize = 16;
const SALT_LEN: usize = 32;
const SCALAR_LEN: usize = 32;

type Encryptor = cbc::Encryptor<Aes128>;
type Decryptor = cbc::Decryptor<Aes128>;

fn derive_key(passphrase: &str, salt: &[u8; SALT_LEN]) -> [u8; 16] {
    let once = Sha256::digest(passphrase.as_bytes());
    let mut preimage = Vec::with_capacity(32 + SALT_LEN);
    preimage.extend_from_slice(&once);
    preimage.extend_from_slice(salt);
    let twice = Sha256::digest(&preimage);
    let mut key = [0u8; 16];
    key.copy_from_slice(&twice[..16]);
    key
}

/// Encrypts `scalar` (the big-endian private key) under `passphrase`,
/// returning the full on-disk container bytes.
pub fn seal(passphrase: &str, scalar: &[u8; SCALAR_LEN]) -> Vec<u8> {
    let mut iv = [0u8; IV_LEN];
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut iv);
    rand::thread_rng().fill_bytes(&mut salt);
    let key = derive_key(passphrase, &salt);

    let ciphertext = Encryptor::new(&key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(scalar);

    let mut out = Vec::with_capacity(IV_LEN + SALT_LEN + 4 + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&salt);
    out.extend_from_slice(&(ciphertext.len() as u32).to_le_bytes());
    out.extend_from_slice(&ciphertext);
    out
}

/// Decrypts a container produced by [`seal`], returning the recovered
/// 32-byte scalar.
pub fn open(passphrase: &str, container: &[u8]) -> Result<[u8; SCALAR_LEN]> {
    if container.len() < IV_LEN + SALT_LEN + 4 {
        return Err(WalletError::Corrupt);
    }
    let iv: [u8; IV_LEN] = container[..IV_LEN].try_into().unwrap();
    let salt: [u8; SALT_LEN] = container[IV_LEN..IV_LEN + SALT_LEN].try_into().unwrap();
    let len_offset = IV_LEN + SALT_LEN;
    let len = u32::from_le_bytes(container[len_offset..len_offset + 4].try_into().unwrap()) as usize;
    let ciphertext = container
        .get(len_offset + 4..len_offset + 4 + len)
        .ok_or(WalletError::Corrupt)?;

    let key = derive_key(passphrase, &salt);
    let plaintext = Decryptor::new(&key.into(), &iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| WalletError::WrongPassphrase)?;
    if plaintext.len() != SCALAR_LEN {
        return Err(WalletError::Corrupt);
    }
    let mut scalar = [0u8; SCALAR_LEN];
    scalar.copy_from_slice(&plaintext);
    Ok(scalar)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_then_open_round_trips() {
        let scalar = [7u8; SCALAR_LEN];
        let sealed = seal("correct horse battery staple", &scalar);
        let recovered = open("correct horse battery staple", &sealed).unwrap();
        assert_eq!(recovered, scalar);
    }

    #[test]
    fn wrong_passphrase_is_rejected() {
        let scalar = [7u8; SCALAR_LEN];
        let sealed = seal("right", &scalar);
        assert!(matches!(open("wrong", &sealed), Err(WalletError::WrongPassphrase)));
    }

    #[test]
    fn truncated_container_is_rejected() {
        let sealed = seal("pw", &[1u8; SCALAR_LEN]);
        assert!(matches!(open("pw", &sealed[..10]), Err(WalletError::Corrupt)));
    }

    #[test]
    fn each_seal_uses_a_fresh_iv_and_salt() {
        let scalar = [3u8; SCALAR_LEN];
        let a = seal("pw", &scalar);
        let b = seal("pw", &scalar);
        assert_ne!(a[..IV_LEN + SALT_LEN], b[..IV_LEN + SALT_LEN]);
    }
}
