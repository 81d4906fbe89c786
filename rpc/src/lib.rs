//! The JSON-RPC surface (spec.md §6): one method per row of the CLI
//! table, wrapping a [`thunderbolt_node::NodeHandle`]. Kept deliberately
//! thin per spec.md §1's non-goals — no batching, subscriptions, or
//! authentication beyond what `jsonrpsee`'s HTTP server gives for free.

use std::net::SocketAddr;

use jsonrpsee::core::{async_trait, RpcResult};
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::server::{ServerBuilder, ServerHandle};
use jsonrpsee::types::ErrorObjectOwned;

use thunderbolt_core::address::Address;
use thunderbolt_core::model::NetworkAddress;
use thunderbolt_core::Hash;
use thunderbolt_node::NodeHandle;

/// JSON shape returned by `getBlock`: a block's header plus the height
/// and hash the metadata store indexes it under.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct BlockHeaderDto {
    pub hash: String,
    pub height: u64,
    pub version: i32,
    pub parent: String,
    pub merkle_root: String,
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
}

#[rpc(client, server)]
pub trait ThunderboltApi {
    #[method(name = "getBestBlockHash")]
    async fn get_best_block_hash(&self) -> RpcResult<String>;

    #[method(name = "getBlock")]
    async fn get_block(&self, block_hash: String) -> RpcResult<Option<BlockHeaderDto>>;

    #[method(name = "getConfirmedTransactions")]
    async fn get_confirmed_transactions(&self) -> RpcResult<Vec<String>>;

    #[method(name = "sendToAddress")]
    async fn send_to_address(&self, address: String, amount: u64) -> RpcResult<String>;

    #[method(name = "encryptWallet")]
    async fn encrypt_wallet(&self, passphrase: String) -> RpcResult<String>;

    #[method(name = "unlockWallet")]
    async fn unlock_wallet(&self, passphrase: String) -> RpcResult<()>;

    #[method(name = "listBannedPeers")]
    async fn list_banned_peers(&self) -> RpcResult<Vec<String>>;

    #[method(name = "unbanPeer")]
    async fn unban_peer(&self, address: String) -> RpcResult<bool>;

    #[method(name = "getUptime")]
    async fn get_uptime(&self) -> RpcResult<u64>;

    #[method(name = "getTransactionPoolCount")]
    async fn get_transaction_pool_count(&self) -> RpcResult<usize>;

    #[method(name = "getPendingBalance")]
    async fn get_pending_balance(&self, address: Option<String>) -> RpcResult<u64>;
}

pub struct ThunderboltApiImpl {
    handle: NodeHandle,
}

impl ThunderboltApiImpl {
    pub fn new(handle: NodeHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl ThunderboltApiServer for ThunderboltApiImpl {
    async fn get_best_block_hash(&self) -> RpcResult<String> {
        self.handle.best_block_hash().map(hex::encode).map_err(rpc_err)
    }

    async fn get_block(&self, block_hash: String) -> RpcResult<Option<BlockHeaderDto>> {
        let hash = parse_hash(&block_hash)?;
        let meta = self.handle.get_block(&hash).map_err(rpc_err)?;
        Ok(meta.map(|m| BlockHeaderDto {
            hash: block_hash,
            height: m.height,
            version: m.header.version,
            parent: hex::encode(m.header.parent),
            merkle_root: hex::encode(m.header.merkle_root),
            timestamp: m.header.timestamp,
            bits: m.header.bits,
            nonce: m.header.nonce,
        }))
    }

    async fn get_confirmed_transactions(&self) -> RpcResult<Vec<String>> {
        Ok(self.handle.confirmed_wallet_transactions().map_err(rpc_err)?.into_iter().map(hex::encode).collect())
    }

    async fn send_to_address(&self, address: String, amount: u64) -> RpcResult<String> {
        let addr = parse_address(&address)?;
        let txid = self.handle.send_to_address(&addr, amount).await.map_err(rpc_err)?;
        Ok(hex::encode(txid))
    }

    async fn encrypt_wallet(&self, passphrase: String) -> RpcResult<String> {
        Ok(self.handle.create_wallet(&passphrase).map_err(rpc_err)?.encode())
    }

    async fn unlock_wallet(&self, passphrase: String) -> RpcResult<()> {
        self.handle.unlock_wallet(&passphrase).map_err(rpc_err)
    }

    async fn list_banned_peers(&self) -> RpcResult<Vec<String>> {
        Ok(self.handle.banned_peers().map_err(rpc_err)?.iter().map(format_network_address).collect())
    }

    async fn unban_peer(&self, address: String) -> RpcResult<bool> {
        let addr = parse_network_address(&address)?;
        self.handle.unban_peer(&addr).map_err(rpc_err)
    }

    async fn get_uptime(&self) -> RpcResult<u64> {
        Ok(self.handle.uptime().as_secs())
    }

    async fn get_transaction_pool_count(&self) -> RpcResult<usize> {
        Ok(self.handle.mempool_count())
    }

    async fn get_pending_balance(&self, address: Option<String>) -> RpcResult<u64> {
        let addr = address.as_deref().map(parse_address).transpose()?;
        self.handle.pending_balance(addr).map_err(rpc_err)
    }
}

/// Starts the HTTP JSON-RPC server on `addr`; the returned handle keeps
/// it alive until dropped or explicitly stopped.
pub async fn serve(handle: NodeHandle, addr: SocketAddr) -> std::io::Result<ServerHandle> {
    let server = ServerBuilder::default().build(addr).await?;
    let module = ThunderboltApiImpl::new(handle).into_rpc();
    Ok(server.start(module))
}

fn parse_hash(s: &str) -> RpcResult<Hash> {
    let bytes = hex::decode(s).map_err(|_| invalid_params("block hash is not valid hex"))?;
    bytes.try_into().map_err(|_| invalid_params("block hash must be 32 bytes"))
}

fn parse_address(s: &str) -> RpcResult<Address> {
    Address::decode(s).map_err(|err| invalid_params(err.to_string()))
}

fn parse_network_address(s: &str) -> RpcResult<NetworkAddress> {
    let socket: SocketAddr = s.parse().map_err(|_| invalid_params("expected host:port"))?;
    Ok(NetworkAddress::from_socket_addr(socket, 0))
}

fn format_network_address(meta: &NetworkAddress) -> String {
    meta.to_socket_addr().to_string()
}

fn invalid_params(msg: impl Into<String>) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(-32602, msg.into(), None::<()>)
}

fn rpc_err(err: impl std::fmt::Display) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(-32000, err.to_string(), None::<()>)
}
