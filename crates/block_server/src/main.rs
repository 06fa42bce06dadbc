use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use river_block_server::tracing::setup_tracing;
use river_block_server::{BlockServer, Config};
use river_proto::block::block_api_server::BlockApiServer;
use tracing::info;

#[derive(Parser)]
#[command(version, about = "Content-addressed block storage server", long_about = None)]
struct Cli {
    #[arg(short, long, value_name = "config file", help = "Path to config file")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = match cli.config {
        Some(path) => Config::from_path(path.to_str().context("config path is not utf-8")?)?,
        None => Config::default(),
    };

    setup_tracing()?;

    let client =
        river_object_client::registry::new_client(&config.backend, Path::new(&config.data_dir))?;
    let server = BlockServer::new(client, config.cache_bytes);

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .with_context(|| format!("invalid listen address {}", config.listen_addr))?;
    info!(
        %addr,
        backend = %config.backend,
        cache_bytes = config.cache_bytes,
        "starting block server"
    );

    tonic::transport::Server::builder()
        .add_service(BlockApiServer::new(server))
        .serve(addr)
        .await?;

    Ok(())
}
