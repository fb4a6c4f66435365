mod handlers;
mod server;

use anyhow::Result;
use stundenplan_core::FeedConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stundenplan_server=info,stundenplan_core=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = FeedConfig::from_env()?;
    if config.url.is_none() {
        tracing::warn!(
            "STUNDENPLAN_FEED_URL is not set; serving from the local snapshot only"
        );
    }

    server::start_server(config).await
}
