use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mini_tracker::config::Config;
use mini_tracker::harvest::Harvester;
use mini_tracker::server::{self, SharedStore};
use mini_tracker::store::JsonFilePeerStore;
use mini_tracker::tracker::TrackerClient;

#[derive(Parser)]
#[command(name = "mini-tracker")]
#[command(about = "Harvests peers from public trackers and re-serves them")]
struct Cli {
    /// TOML config file (defaults to ./mini-tracker.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Peer store file, overriding the config
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Announce every local torrent to its trackers and store the peers found
    Harvest {
        #[arg(long)]
        torrents: Option<PathBuf>,
        #[arg(long)]
        modified: Option<PathBuf>,
    },
    /// Serve stored peers on the announce endpoint
    Serve {
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(store) = cli.store {
        config.store.path = store;
    }

    let store: SharedStore = Arc::new(JsonFilePeerStore::open(config.store.path.clone()).await?);

    match cli.command {
        Command::Harvest { torrents, modified } => {
            let torrents = torrents.unwrap_or(config.client.torrents_dir.clone());
            let modified = modified.unwrap_or(config.client.modified_dir.clone());

            let harvester = Harvester::new(TrackerClient::new(&config.client)?, store);
            let report = harvester
                .harvest_directory(&torrents, &modified, &config.server.announce_url)
                .await?;
            tracing::info!(
                "Harvested {} torrents ({} failed): {} trackers contacted, {} skipped, {} records written",
                report.torrents,
                report.failed_torrents,
                report.trackers_contacted,
                report.trackers_skipped,
                report.records_written
            );
        }
        Command::Serve { bind } => {
            server::serve(bind.unwrap_or(config.server.bind), store).await?;
        }
    }

    Ok(())
}
