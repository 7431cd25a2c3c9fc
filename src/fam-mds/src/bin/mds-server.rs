use std::sync::Arc;

use clap::Parser;
use fam_mds::{MdsHandler, MdsService, MemStore};
use tracing::info;

#[derive(Parser, Debug)]
#[command(about = "FAM metadata service")]
struct Args {
    /// Address to listen on for metadata RPCs.
    #[arg(long, default_value = "127.0.0.1:9720")]
    listen: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let store = Arc::new(MemStore::new());
    let handler = Arc::new(MdsHandler::new(MdsService::new(store)));

    info!(addr = %args.listen, "starting metadata service");
    fam_rpc::serve(&args.listen, handler).await
}
