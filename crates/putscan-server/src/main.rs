mod csv;
mod error;
mod params;
mod routes;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use putscan_core::{ChainClient, ConfigError, ReqwestHttpClient, ScanRunner, UniverseProvider};

use crate::routes::AppState;

/// Fat-put scanner HTTP service.
#[derive(Debug, Parser)]
#[command(
    name = "putscan",
    version,
    about = "Scans a ticker universe for overpriced put options"
)]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8787")]
    listen: SocketAddr,

    /// Directory holding universe files.
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Explicit universe file, overriding the data-dir candidates.
    #[arg(long)]
    universe: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("putscan=info,tower_http=warn")),
        )
        .init();

    let args = Args::parse();

    // A missing data dir just means an empty universe, but an explicit
    // override that does not exist is a startup error.
    if let Some(path) = &args.universe {
        if !path.exists() {
            return Err(ConfigError::UniverseMissing {
                path: path.display().to_string(),
            }
            .into());
        }
    }

    let client = Arc::new(ChainClient::new(Arc::new(ReqwestHttpClient::new())));
    let state = Arc::new(AppState {
        runner: ScanRunner::new(client),
        universe: UniverseProvider::new(args.data_dir, args.universe),
    });

    let app = routes::router(state);
    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    tracing::info!("putscan listening on http://{}", args.listen);
    axum::serve(listener, app).await?;
    Ok(())
}
