//! Segment Studio: subscriber segmentation service for email campaigns.
//!
//! Loads the subscriber base, builds the segment store, and serves the REST API.

use clap::Parser;
use segment_api::ApiServer;
use segment_core::config::AppConfig;
use segment_engine::{InMemorySubscriberStore, SegmentStore};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "segment-studio")]
#[command(about = "Subscriber segmentation service for email campaigns")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "SEGMENT_STUDIO__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "SEGMENT_STUDIO__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// JSON file of subscribers to seed the store with (overrides config)
    #[arg(long, env = "SEGMENT_STUDIO__SUBSCRIBERS__SEED_FILE")]
    seed_file: Option<String>,

    /// Number of matching subscribers returned with each evaluation
    #[arg(long)]
    sample_size: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "segment_studio=info,segment_engine=info,tower_http=info".into()
            }),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Segment Studio starting up");

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(path) = cli.seed_file {
        config.subscribers.seed_file = Some(path);
    }
    if let Some(size) = cli.sample_size {
        config.preview.sample_size = size;
    }

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        sample_size = config.preview.sample_size,
        debounce_ms = config.preview.debounce_ms,
        "Configuration loaded"
    );

    let subscribers = match &config.subscribers.seed_file {
        Some(path) => {
            let store = InMemorySubscriberStore::load_json(path)?;
            info!(path = %path, subscribers = store.len(), "Subscriber base loaded");
            store
        }
        None => {
            warn!("No subscriber seed file configured, starting with an empty base");
            InMemorySubscriberStore::new()
        }
    };

    let store = Arc::new(
        SegmentStore::new(Arc::new(subscribers)).with_sample_limit(config.preview.sample_size),
    );

    let api_server = ApiServer::new(config.clone(), store);

    if let Err(e) = api_server.start_metrics().await {
        error!(error = %e, "Failed to start metrics exporter");
    }

    info!("Segment Studio is ready to serve traffic");

    api_server.start_http().await?;

    Ok(())
}
