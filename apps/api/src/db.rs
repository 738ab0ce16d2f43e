use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use crate::storage::{MemoryStore, PgStore, Store};

/// Connects to PostgreSQL and prepares the schema.
pub async fn connect(database_url: &str) -> Result<PgStore> {
    info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await
        .context("failed to connect to PostgreSQL")?;

    info!("PostgreSQL connection pool established");
    let store = PgStore::new(pool);
    store
        .migrate()
        .await
        .context("failed to create database schema")?;
    Ok(store)
}

/// PostgreSQL when a URL is configured, the in-memory store otherwise.
pub async fn open_store(database_url: Option<&str>) -> Result<Arc<dyn Store>> {
    match database_url {
        Some(url) => Ok(Arc::new(connect(url).await?)),
        None => {
            warn!("DATABASE_URL not set; profiles and search history are kept in memory");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
