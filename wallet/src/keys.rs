//! Keypair generation and signing (spec.md §6, §4.4.2's `SingleSig`
//! unlock taxonomy).

use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};

use thunderbolt_core::address::Address;
use thunderbolt_core::model::{Outpoint, Output};
use thunderbolt_chain::unlock::{encode_single_sig_witness, signed_digest, SingleSigWitness};

use crate::error::{Result, WalletError};

/// An unlocked `SingleSig` keypair.
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl KeyPair {
    /// Generates a fresh keypair (spec.md's `encryptWallet` with no prior
    /// wallet.dat: there is nothing to decrypt, so a new key is minted).
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let mut rng = rand::thread_rng();
        let (secret, public) = secp.generate_keypair(&mut rng);
        Self { secret, public }
    }

    /// Rebuilds a keypair from the 32-byte big-endian scalar recovered from
    /// `wallet.dat` (spec.md §6).
    pub fn from_scalar(scalar: &[u8; 32]) -> Result<Self> {
        let secret = SecretKey::from_slice(scalar).map_err(|_| WalletError::InvalidKey)?;
        let secp = Secp256k1::new();
        let public = PublicKey::from_secret_key(&secp, &secret);
        Ok(Self { secret, public })
    }

    /// The 32-byte big-endian scalar, for sealing into `wallet.dat`.
    pub fn scalar(&self) -> [u8; 32] {
        self.secret.secret_bytes()
    }

    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.public.serialize().to_vec()
    }

    /// This keypair's `SingleSig` receive address.
    pub fn address(&self) -> Address {
        Address::from_single_sig_pubkey(&self.public_key_bytes())
    }

    /// Builds and signs the `SingleSig` witness for spending `output`
    /// through `input` (spec.md §4.4.2: `serialize(input) || lockType ||
    /// lockParams`, double-hashed, verified with `verify_ecdsa`).
    pub fn sign_single_sig(&self, input: &Outpoint, output: &Output) -> Vec<u8> {
        let secp = Secp256k1::new();
        let digest = signed_digest(input, output);
        let msg = Message::from_digest_slice(&digest).expect("sha256d output is always 32 bytes");
        let signature = secp.sign_ecdsa(&msg, &self.secret);
        encode_single_sig_witness(&SingleSigWitness {
            public_key: self.public_key_bytes(),
            signature: signature.serialize_der().to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_round_trips_through_keypair() {
        let kp = KeyPair::generate();
        let scalar = kp.scalar();
        let rebuilt = KeyPair::from_scalar(&scalar).unwrap();
        assert_eq!(kp.public_key_bytes(), rebuilt.public_key_bytes());
    }

    #[test]
    fn address_commits_to_the_public_key() {
        let kp = KeyPair::generate();
        let addr = kp.address();
        assert_eq!(addr.encode().len(), 52);
    }

    #[test]
    fn signed_witness_verifies_against_its_own_output() {
        use thunderbolt_core::model::LockType;
        use thunderbolt_core::crypto::ripemd160_sha256;
        use thunderbolt_chain::unlock::check_unlock;

        let kp = KeyPair::generate();
        let input = Outpoint { ref_tx: [9u8; 32], index: 0 };
        let output = Output {
            amount: 500,
            lock_type: LockType::SingleSig,
            lock_params: ripemd160_sha256(&kp.public_key_bytes()).to_vec(),
        };
        let witness = kp.sign_single_sig(&input, &output);
        assert!(check_unlock(&input, &output, &witness).is_ok());
    }
}
