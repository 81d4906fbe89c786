//! Thin CLI client (spec.md §6): every subcommand except `start` is a
//! JSON-RPC call against a running node, never an in-process operation.
//! Exit codes follow spec.md §6: 0 success, 1 argument error, 2 RPC/IO
//! error.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use jsonrpsee::http_client::HttpClientBuilder;

use thunderbolt_core::config::{Config, ConfigBuilder, DEFAULT_RPC_PORT};
use thunderbolt_node::Node;
use thunderbolt_rpc::ThunderboltApiClient;

#[derive(Parser)]
#[command(name = "thunderbolt", about = "Thunderbolt node and wallet CLI", version)]
struct Cli {
    /// JSON-RPC endpoint of a running node.
    #[arg(long, global = true, default_value_t = format!("http://127.0.0.1:{DEFAULT_RPC_PORT}"))]
    rpc_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Opens the data directory, joins the peer network, and serves RPC.
    /// Not part of the spec's CLI table; everything else in it assumes
    /// this is already running somewhere.
    Start {
        #[arg(long)]
        datadir: Option<std::path::PathBuf>,
        #[arg(long)]
        listen_port: Option<u16>,
        #[arg(long)]
        rpc_port: Option<u16>,
        #[arg(long = "seed")]
        seed_nodes: Vec<String>,
    },
    GetBestBlockHash,
    GetBlock {
        block_hash: String,
    },
    GetConfirmedTransactions,
    SendToAddress {
        address: String,
        amount: u64,
    },
    EncryptWallet {
        passphrase: String,
    },
    UnlockWallet {
        passphrase: String,
    },
    ListBannedPeers,
    UnbanPeer {
        address: String,
    },
    GetUptime,
    GetTransactionPoolCount,
    GetPendingBalance {
        address: Option<String>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return ExitCode::from(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("failed to start async runtime: {err}");
            return ExitCode::from(2);
        }
    };
    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> ExitCode {
    if let Commands::Start { datadir, listen_port, rpc_port, seed_nodes } = cli.command {
        return run_start(datadir, listen_port, rpc_port, seed_nodes).await;
    }

    let client = match HttpClientBuilder::default().build(&cli.rpc_url) {
        Ok(client) => client,
        Err(err) => {
            eprintln!("invalid RPC endpoint {}: {err}", cli.rpc_url);
            return ExitCode::from(1);
        }
    };

    let result: Result<(), jsonrpsee::core::ClientError> = match cli.command {
        Commands::Start { .. } => unreachable!("handled above"),
        Commands::GetBestBlockHash => client.get_best_block_hash().await.map(|hash| println!("{hash}")),
        Commands::GetBlock { block_hash } => client.get_block(block_hash).await.map(|block| match block {
            Some(header) => println!("{}", serde_json::to_string_pretty(&header).unwrap_or_default()),
            None => println!("null"),
        }),
        Commands::GetConfirmedTransactions => {
            client.get_confirmed_transactions().await.map(|txids| txids.iter().for_each(|id| println!("{id}")))
        }
        Commands::SendToAddress { address, amount } => {
            client.send_to_address(address, amount).await.map(|txid| println!("{txid}"))
        }
        Commands::EncryptWallet { passphrase } => {
            client.encrypt_wallet(passphrase).await.map(|address| println!("{address}"))
        }
        Commands::UnlockWallet { passphrase } => client.unlock_wallet(passphrase).await,
        Commands::ListBannedPeers => {
            client.list_banned_peers().await.map(|peers| peers.iter().for_each(|peer| println!("{peer}")))
        }
        Commands::UnbanPeer { address } => {
            client.unban_peer(address).await.map(|unbanned| println!("{unbanned}"))
        }
        Commands::GetUptime => client.get_uptime().await.map(|secs| println!("{secs}")),
        Commands::GetTransactionPoolCount => client.get_transaction_pool_count().await.map(|count| println!("{count}")),
        Commands::GetPendingBalance { address } => {
            client.get_pending_balance(address).await.map(|balance| println!("{balance}"))
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("rpc error: {err}");
            ExitCode::from(2)
        }
    }
}

async fn run_start(
    datadir: Option<std::path::PathBuf>,
    listen_port: Option<u16>,
    rpc_port: Option<u16>,
    seed_nodes: Vec<String>,
) -> ExitCode {
    let mut builder = ConfigBuilder::new();
    if let Some(datadir) = datadir {
        builder = builder.datadir(datadir);
    }
    if let Some(port) = listen_port {
        builder = builder.listen_port(port);
    }
    if let Some(port) = rpc_port {
        builder = builder.rpc_port(port);
    }
    if !seed_nodes.is_empty() {
        builder = builder.seed_nodes(seed_nodes);
    }
    let config: Config = builder.finish();
    let rpc_addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.rpc_port));

    let (node, handle) = match Node::open(config) {
        Ok(pair) => pair,
        Err(err) => {
            eprintln!("failed to open node: {err}");
            return ExitCode::from(2);
        }
    };

    let rpc_handle = match thunderbolt_rpc::serve(handle, rpc_addr).await {
        Ok(handle) => handle,
        Err(err) => {
            eprintln!("failed to start RPC server: {err}");
            return ExitCode::from(2);
        }
    };
    tracing::info!(addr = %rpc_addr, "serving RPC");

    tokio::select! {
        result = node.run() => {
            if let Err(err) = result {
                eprintln!("node loop exited with error: {err}");
                rpc_handle.stop().ok();
                return ExitCode::from(2);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
        }
    }
    rpc_handle.stop().ok();
    ExitCode::SUCCESS
}
