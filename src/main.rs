use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

use quiet_observer::controller::ChatController;
use quiet_observer::models::OpenAICompatible;
use quiet_observer::server::{self, AppState};
use quiet_observer::settings::Settings;
use quiet_observer::storage::JsonSnapshotFile;

#[derive(Debug, Parser)]
#[command(name = "quiet_observer")]
#[command(about = "Headless chat-session service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Start {
        #[arg(long, default_value = "127.0.0.1:7878")]
        listen: String,
        /// Snapshot file override; defaults to the XDG data directory.
        #[arg(long)]
        data: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Start { listen, data } => {
            let addr: SocketAddr = listen.parse()?;
            let settings = Settings::from_env();
            let snapshot = JsonSnapshotFile::initialize(data)?;
            tracing::info!(snapshot = %snapshot.path().display(), model = %settings.model, "starting quiet_observer");
            let model = OpenAICompatible::new(&settings)?;
            let controller = Arc::new(ChatController::new(Arc::new(model), Box::new(snapshot)));
            server::serve(addr, AppState { controller }).await?;
        }
    }
    Ok(())
}
