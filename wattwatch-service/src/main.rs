use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use wattwatch_service::{
    api::{self, AppState},
    config::AppConfig,
    metrics_server, observability,
    store::PgReportStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr);
    }

    let offset = cfg.reporting.utc_offset()?;

    let pool = PgPoolOptions::new()
        .max_connections(cfg.database.max_connections)
        .connect(&cfg.database.uri)
        .await?;

    let state = AppState {
        pool: pool.clone(),
        store: Arc::new(PgReportStore::new(pool)),
        auth_bearer_token: cfg.server.auth_bearer_token.clone(),
        offset,
        interval_minutes: cfg.reporting.interval_minutes,
    };

    let app = api::router(state);
    let listener = tokio::net::TcpListener::bind(&cfg.server.bind_addr).await?;
    tracing::info!(addr = %cfg.server.bind_addr, "wattwatch service listening");
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
