use std::{env, net::SocketAddr};

use anyhow::Result;
use stundenplan_core::FeedConfig;
use tokio::net::TcpListener;

use crate::handlers::create_app;

pub async fn start_server(config: FeedConfig) -> Result<()> {
    let app = create_app(config);

    // Port from the environment, default 3000
    let port = env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse::<u16>()
        .unwrap_or(3000);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!("Stundenplan server starting on {}", addr);

    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app).await?;

    Ok(())
}
