use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use fam_common::constants::{DEFAULT_NUM_CONSUMER, DEFAULT_QUEUE_DEPTH};
use fam_ms::{LoopbackFabric, MemoryService, MemoryServiceConfig, MsHandler};
use tracing::info;

#[derive(Parser, Debug)]
#[command(about = "FAM memory service")]
struct Args {
    /// Address to listen on for memory-service RPCs.
    #[arg(long, default_value = "127.0.0.1:9721")]
    listen: String,

    /// This node's fabric address, as advertised to peer memory services.
    #[arg(long, default_value = "127.0.0.1:9721")]
    node_addr: String,

    /// Numeric id of this memory-service node.
    #[arg(long, default_value_t = 0)]
    memserver_id: u32,

    /// Directory backup/restore chunks and sidecars are written under.
    #[arg(long, default_value = "./fam-backups")]
    backup_root: PathBuf,

    /// Disables the async copy/backup/restore queue, rejecting those ops.
    #[arg(long)]
    disable_async_jobs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let config = MemoryServiceConfig {
        node_addr: args.node_addr,
        memserver_id: args.memserver_id,
        backup_root: args.backup_root,
        num_consumer: DEFAULT_NUM_CONSUMER,
        queue_depth: DEFAULT_QUEUE_DEPTH,
        async_jobs_enabled: !args.disable_async_jobs,
    };

    // `LoopbackFabric` stands in for libfabric, which the spec treats as an
    // external collaborator reached only through `FabricProvider` (see
    // fabric.rs). Other memory-service nodes are registered as peers via
    // `update_memserver_addrlist` once the deployment topology is known.
    let fabric = LoopbackFabric::new();
    let service = MemoryService::new(config, fabric.clone())?;
    fabric.register_peer(service.node_addr().to_string(), service.clone());
    let handler = Arc::new(MsHandler::new(service));

    info!(addr = %args.listen, "starting memory service");
    fam_rpc::serve(&args.listen, handler).await
}
