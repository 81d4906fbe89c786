//! Wallet: `wallet.dat` container plus a single `SingleSig` keypair built on
//! top of `thunderbolt-chain`'s unlock machinery (spec.md §6).

pub mod container;
pub mod error;
pub mod keys;
pub mod send;

use std::path::{Path, PathBuf};

use thunderbolt_core::address::Address;
use thunderbolt_core::model::{Transaction, UtxoEntry};

pub use error::{Result, WalletError};
pub use keys::KeyPair;
pub use send::FLAT_FEE;

/// A single-keypair wallet backed by an on-disk `wallet.dat`.
///
/// Unlocking (`Wallet::open`/`unlock`) decrypts the keypair into memory;
/// `lock()` drops it again. Every other operation requires an unlocked
/// wallet, matching spec.md's `unlockWallet`/`encryptWallet` pairing.
pub struct Wallet {
    path: PathBuf,
    keypair: Option<KeyPair>,
}

impl Wallet {
    /// Creates a fresh `wallet.dat` at `path`, sealing a freshly generated
    /// keypair under `passphrase`. Fails if a file already exists there.
    pub fn create(path: impl AsRef<Path>, passphrase: &str) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            return Err(WalletError::AlreadyExists);
        }
        let keypair = KeyPair::generate();
        let sealed = container::seal(passphrase, &keypair.scalar());
        std::fs::write(&path, sealed)?;
        Ok(Self { path, keypair: Some(keypair) })
    }

    /// Opens an existing `wallet.dat` without unlocking it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(WalletError::Corrupt);
        }
        Ok(Self { path, keypair: None })
    }

    /// Decrypts `wallet.dat` under `passphrase`, loading the keypair into
    /// memory (spec.md's `unlockWallet`).
    pub fn unlock(&mut self, passphrase: &str) -> Result<()> {
        let sealed = std::fs::read(&self.path)?;
        let scalar = container::open(passphrase, &sealed)?;
        self.keypair = Some(KeyPair::from_scalar(&scalar)?);
        Ok(())
    }

    /// Re-seals the current keypair under a new passphrase, overwriting
    /// `wallet.dat` (spec.md's `encryptWallet` applied to an already-open
    /// wallet).
    pub fn reencrypt(&mut self, passphrase: &str) -> Result<()> {
        let keypair = self.keypair.as_ref().ok_or(WalletError::Locked)?;
        let sealed = container::seal(passphrase, &keypair.scalar());
        std::fs::write(&self.path, sealed)?;
        Ok(())
    }

    /// Drops the in-memory keypair; the on-disk file is untouched.
    pub fn lock(&mut self) {
        self.keypair = None;
    }

    pub fn is_unlocked(&self) -> bool {
        self.keypair.is_some()
    }

    /// This wallet's receive address. Requires the wallet to be unlocked,
    /// since the address is derived from the keypair, not stored
    /// separately.
    pub fn address(&self) -> Result<Address> {
        Ok(self.keypair.as_ref().ok_or(WalletError::Locked)?.address())
    }

    /// Builds and signs a `sendToAddress` transaction spending from
    /// `utxos` (already filtered to this wallet's address by the caller).
    pub fn build_send_transaction(
        &self,
        utxos: &[UtxoEntry],
        destination: &Address,
        amount: u64,
    ) -> Result<Transaction> {
        let keypair = self.keypair.as_ref().ok_or(WalletError::Locked)?;
        send::build_send_transaction(keypair, utxos, destination, amount)
    }
}
