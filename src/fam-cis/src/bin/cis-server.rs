use std::sync::Arc;

use clap::Parser;
use fam_cis::{CisConfig, CisHandler, ClientInterfaceService};
use tracing::info;

#[derive(Parser, Debug)]
#[command(about = "FAM client-interface service")]
struct Args {
    /// Address to listen on for client RPCs.
    #[arg(long, default_value = "127.0.0.1:9700")]
    listen: String,

    /// Address of the metadata service.
    #[arg(long, default_value = "127.0.0.1:9720")]
    mds_addr: String,

    /// Comma-separated memory-service addresses, in memserver-id order.
    #[arg(long, value_delimiter = ',', default_value = "127.0.0.1:9721")]
    memserver_list: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let service = ClientInterfaceService::new(CisConfig {
        mds_addr: args.mds_addr,
        ms_addrs: args.memserver_list,
    });
    let handler = Arc::new(CisHandler::new(service));

    info!(addr = %args.listen, "starting client-interface service");
    fam_rpc::serve(&args.listen, handler).await
}
