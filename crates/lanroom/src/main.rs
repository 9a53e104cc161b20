//! The `lanroom` binary: parse arguments, load configuration, run the
//! server. Exits zero on a graceful shutdown and non-zero when binding
//! the listener or initializing the ban registry fails.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use lanroom::{Server, ServerConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Multiplayer room and relay server")]
struct Args {
    /// Path to the server configuration file (TOML). Defaults apply if
    /// omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen address from the config
    #[arg(short, long)]
    bind: Option<String>,

    /// Override the room name from the config
    #[arg(long)]
    room_name: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(name) = args.room_name {
        config.room.name = name;
    }

    let server = Server::start(config).await?;
    tracing::info!(addr = %server.local_addr()?, "room server listening");
    server.run().await?;

    tracing::info!("room server stopped");
    Ok(())
}
