//! Startup readiness probe for PostgreSQL.
//!
//! The database container usually starts alongside the API, so the first
//! connection attempts are expected to fail. The probe retries with a capped
//! exponential backoff and gives up after a bounded number of attempts.

use std::time::Duration;

use sqlx::{Connection, PgConnection};

/// Upper bound on the delay between two attempts.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Timeout for a single connection attempt.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ReadinessError {
    #[error("database not reachable after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

/// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`, capped.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor).min(MAX_RETRY_DELAY)
}

/// Block until the database accepts a connection or attempts run out.
pub async fn wait_for_database(
    database_url: &str,
    max_attempts: u32,
    base_delay: Duration,
) -> Result<(), ReadinessError> {
    let attempts = max_attempts.max(1);
    tracing::info!("Waiting for database to accept connections");

    let mut attempt = 1;
    loop {
        let last_error = match try_connect(database_url).await {
            Ok(()) => {
                tracing::info!("Database is ready (attempt {}/{})", attempt, attempts);
                return Ok(());
            }
            Err(e) => e,
        };

        if attempt >= attempts {
            tracing::error!(
                "Database not reachable after {} attempts: {}",
                attempts,
                last_error
            );
            return Err(ReadinessError::Exhausted {
                attempts,
                last_error,
            });
        }

        let delay = backoff_delay(base_delay, attempt);
        tracing::warn!(
            "Database not ready (attempt {}/{}): {}; retrying in {:?}",
            attempt,
            attempts,
            last_error,
            delay
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

async fn try_connect(database_url: &str) -> Result<(), String> {
    match tokio::time::timeout(CONNECT_TIMEOUT, PgConnection::connect(database_url)).await {
        Ok(Ok(conn)) => {
            // A failed close still proves the server accepted the connection.
            if let Err(e) = conn.close().await {
                tracing::debug!("Readiness probe connection close failed: {}", e);
            }
            Ok(())
        }
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("connect timed out after {:?}", CONNECT_TIMEOUT)),
    }
}
