//! Storefront Orders - order fulfillment service

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront_orders::http::{router, AppState};
use storefront_orders::{Catalog, Config, EventSink, Fulfillment, PgStorage};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("connecting to postgres")?;
    sqlx::migrate!("./migrations").run(&db).await.context("running migrations")?;

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, domain events disabled");
                None
            }
        },
        None => None,
    };
    let events = EventSink::new(nats);

    let storage = Arc::new(PgStorage::new(db));
    let state = AppState {
        orders: Arc::new(Fulfillment::new(storage.clone(), config.orders, events.clone())),
        catalog: Arc::new(Catalog::new(storage, events)),
    };

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("storefront-orders listening on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(&addr).await?, router(state)).await?;
    Ok(())
}
