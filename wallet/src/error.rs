//! Wallet errors (spec.md §6 "Wallet container", §7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("wallet.dat is truncated or malformed")]
    Corrupt,

    #[error("passphrase is wrong or wallet.dat is corrupt")]
    WrongPassphrase,

    #[error("wallet is locked; call unlock() first")]
    Locked,

    #[error("wallet.dat already exists at this path")]
    AlreadyExists,

    #[error("invalid recovered private key")]
    InvalidKey,

    #[error("no address has a spendable balance covering amount + fee")]
    InsufficientFunds,

    #[error(transparent)]
    Crypto(#[from] thunderbolt_core::CryptoError),

    #[error(transparent)]
    Unlock(#[from] thunderbolt_chain::error::ChainError),
}

pub type Result<T> = core::result::Result<T, WalletError>;
