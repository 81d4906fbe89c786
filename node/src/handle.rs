//! Read-only and command-submitting access to a running [`crate::coordinator::Node`].
//!
//! Cloned freely and handed to the RPC surface (spec.md §5: "readers...see
//! snapshots through a read-only handle"). Every read here goes straight to
//! the metadata store or the address book, both of which tolerate
//! concurrent readers on their own; the one thing a handle cannot do
//! directly is mutate the chain or the mempool — that always goes through
//! [`crate::command::NodeCommand`] so the coordinator stays the sole writer.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};

use thunderbolt_core::address::Address;
use thunderbolt_core::model::{BlockMetadata, LockType, NetworkAddress, UtxoEntry};
use thunderbolt_core::Hash;
use thunderbolt_network::PeerManager;
use thunderbolt_storage::{MetaView, MetadataStore, RocksMetadataStore};
use thunderbolt_wallet::Wallet;

use crate::command::NodeCommand;
use crate::error::{NodeError, Result};

/// `true` when `entry` is spendable by a `SingleSig` wallet holding `addr`.
fn matches_address(entry: &UtxoEntry, addr: &Address) -> bool {
    matches!(entry.output.lock_type, LockType::SingleSig) && entry.output.lock_params == addr.hash160
}

#[derive(Clone)]
pub struct NodeHandle {
    pub(crate) meta: MetaView<dyn MetadataStore>,
    pub(crate) peers: Arc<PeerManager<RocksMetadataStore>>,
    pub(crate) wallet: Arc<Mutex<Option<Wallet>>>,
    pub(crate) wallet_path: PathBuf,
    pub(crate) commands: mpsc::Sender<NodeCommand>,
    pub(crate) mempool_count: Arc<AtomicUsize>,
    pub(crate) started_at: Instant,
}

impl NodeHandle {
    /// `getBestBlockHash` (spec.md §6).
    pub fn best_block_hash(&self) -> Result<Hash> {
        let head = self.meta.get_chain_head()?.ok_or(NodeError::ChainNotBootstrapped)?;
        Ok(thunderbolt_core::codec::hash_block_header(&head.header))
    }

    /// `getBlock` (spec.md §6): the stored metadata for a block header hash.
    pub fn get_block(&self, hash: &Hash) -> Result<Option<BlockMetadata>> {
        Ok(self.meta.get_block(hash)?)
    }

    /// `getConfirmedTransactions` (spec.md §6): txids of every confirmed
    /// UTXO this node's wallet can currently spend.
    pub fn confirmed_wallet_transactions(&self) -> Result<Vec<Hash>> {
        let addr = self.wallet_address()?;
        Ok(self
            .meta
            .scan_utxos()?
            .into_iter()
            .filter(|u| matches_address(u, &addr))
            .map(|u| u.txid)
            .collect())
    }

    /// `getPendingBalance` (spec.md §6). Defaults to the wallet's own
    /// address when `address` is `None`.
    pub fn pending_balance(&self, address: Option<Address>) -> Result<u64> {
        let addr = match address {
            Some(a) => a,
            None => self.wallet_address()?,
        };
        Ok(self
            .meta
            .scan_utxos()?
            .into_iter()
            .filter(|u| matches_address(u, &addr))
            .map(|u| u.output.amount)
            .sum())
    }

    /// `sendToAddress` (spec.md §6): builds and signs a spend from the
    /// wallet's own UTXOs, then hands it to the coordinator for mempool
    /// admission and relay.
    pub async fn send_to_address(&self, destination: &Address, amount: u64) -> Result<Hash> {
        let tx = {
            let guard = self.wallet.lock().unwrap();
            let wallet = guard.as_ref().ok_or(NodeError::WalletLocked)?;
            let my_addr = wallet.address().map_err(NodeError::Wallet)?;
            let utxos: Vec<UtxoEntry> =
                self.meta.scan_utxos()?.into_iter().filter(|u| matches_address(u, &my_addr)).collect();
            wallet.build_send_transaction(&utxos, destination, amount).map_err(NodeError::Wallet)?
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(NodeCommand::SubmitTransaction(tx, reply_tx))
            .await
            .map_err(|_| NodeError::ShuttingDown)?;
        reply_rx.await.map_err(|_| NodeError::ShuttingDown)?
    }

    /// `encryptWallet` (spec.md §6) applied to a data directory with no
    /// `wallet.dat` yet: mints a fresh keypair sealed under `passphrase`.
    pub fn create_wallet(&self, passphrase: &str) -> Result<Address> {
        let mut guard = self.wallet.lock().unwrap();
        if guard.is_some() || self.wallet_path.exists() {
            return Err(NodeError::WalletAlreadyExists);
        }
        let wallet = Wallet::create(&self.wallet_path, passphrase).map_err(NodeError::Wallet)?;
        let addr = wallet.address().map_err(NodeError::Wallet)?;
        *guard = Some(wallet);
        Ok(addr)
    }

    /// `unlockWallet` (spec.md §6): decrypts the existing `wallet.dat`.
    pub fn unlock_wallet(&self, passphrase: &str) -> Result<()> {
        let mut guard = self.wallet.lock().unwrap();
        if guard.is_none() {
            *guard = Some(Wallet::open(&self.wallet_path).map_err(NodeError::Wallet)?);
        }
        guard.as_mut().unwrap().unlock(passphrase).map_err(NodeError::Wallet)?;
        Ok(())
    }

    fn wallet_address(&self) -> Result<Address> {
        let guard = self.wallet.lock().unwrap();
        let wallet = guard.as_ref().ok_or(NodeError::WalletLocked)?;
        wallet.address().map_err(NodeError::Wallet)
    }

    /// `listBannedPeers` (spec.md §6).
    pub fn banned_peers(&self) -> Result<Vec<NetworkAddress>> {
        Ok(self.peers.book().banned()?.into_iter().map(|m| m.addr).collect())
    }

    /// `unbanPeer` (spec.md §6). Returns `false` if the address carried no
    /// active ban.
    pub fn unban_peer(&self, addr: &NetworkAddress) -> Result<bool> {
        Ok(self.peers.book().unban(addr)?)
    }

    /// `getUptime` (spec.md §6).
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// `getTransactionPoolCount` (spec.md §6).
    pub fn mempool_count(&self) -> usize {
        self.mempool_count.load(Ordering::Relaxed)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.peer_count()
    }
}
