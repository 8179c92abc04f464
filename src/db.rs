//! SeaORM connection pool setup.
//!
//! Production runs against Postgres; dev and tests use SQLite
//! (`sqlite::memory:`). Connecting retries a few times with backoff so
//! the service survives a database that comes up slightly after it.

use std::time::Duration;

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Statement};
use thiserror::Error;

use crate::config::AppConfig;

const CONNECT_ATTEMPTS: u32 = 5;
const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum DbInitError {
    #[error("database URL is not configured")]
    MissingUrl,
    #[error("could not connect to the database after {attempts} attempts: {source}")]
    Connect {
        attempts: u32,
        #[source]
        source: DbErr,
    },
}

/// Opens the connection pool described by the configuration.
///
/// Pool sizing and the acquire timeout come from `RAD_DB_MAX_CONNECTIONS`
/// and `RAD_DB_ACQUIRE_TIMEOUT_MS`; idle and lifetime limits are fixed.
pub async fn init_pool(cfg: &AppConfig) -> Result<DatabaseConnection, DbInitError> {
    if cfg.database_url.is_empty() {
        return Err(DbInitError::MissingUrl);
    }

    let mut options = ConnectOptions::new(&cfg.database_url);
    options
        .max_connections(cfg.db_max_connections)
        .acquire_timeout(Duration::from_millis(cfg.db_acquire_timeout_ms))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let mut delay = INITIAL_RETRY_DELAY;
    let mut attempt = 1;
    loop {
        match Database::connect(options.clone()).await {
            Ok(conn) => {
                tracing::debug!(attempt, "database pool ready");
                return Ok(conn);
            }
            Err(source) if attempt < CONNECT_ATTEMPTS => {
                tracing::warn!(
                    attempt,
                    error = %source,
                    retry_in_ms = delay.as_millis() as u64,
                    "database connect failed, retrying"
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(source) => {
                return Err(DbInitError::Connect {
                    attempts: attempt,
                    source,
                });
            }
        }
    }
}

/// Runs a trivial query to confirm the pool can still serve connections.
pub async fn health_check(db: &DatabaseConnection) -> Result<(), DbErr> {
    let stmt = Statement::from_string(db.get_database_backend(), "SELECT 1");
    db.query_one(stmt).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_url_is_rejected_before_connecting() {
        let config = AppConfig {
            database_url: String::new(),
            ..AppConfig::default()
        };
        assert!(matches!(
            init_pool(&config).await,
            Err(DbInitError::MissingUrl)
        ));
    }

    #[tokio::test]
    async fn health_check_passes_on_a_live_connection() {
        let db = Database::connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite");
        health_check(&db).await.expect("healthy connection");
    }
}
