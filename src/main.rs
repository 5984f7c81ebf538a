use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;

mod app;
mod auth;
mod config;
mod error;
mod health;
mod registry;
mod sessions;
mod shutdown;
mod state;
mod storage;

use crate::{config::AppConfig, shutdown::ShutdownCoordinator, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Arc::new(AppConfig::from_env()?);

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        format!("login_service={},tower_http=info", config.log.level)
    });

    if config.log.json {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    tracing::info!(
        service = %config.service.name,
        instance_id = %config.service.instance_id,
        version = env!("CARGO_PKG_VERSION"),
        "starting login service"
    );

    let state = AppState::init(config.clone()).await?;

    let addr: SocketAddr = tokio::net::lookup_host((config.host.as_str(), config.port))
        .await?
        .next()
        .with_context(|| format!("cannot resolve APP_HOST {}", config.host))?;

    let coordinator = Arc::new(ShutdownCoordinator::new());
    tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.wait_for_signal().await }
    });

    app::run(state, addr, coordinator).await
}
