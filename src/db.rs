//! Run-ledger persistence.
//!
//! The ledger is the engine's only durable state: one row per calendar day
//! on which a full decision run completed. A failed run leaves no row, so
//! the next hourly tick retries.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

pub type DbPool = SqlitePool;

/// Initialize the database connection pool and run migrations
pub async fn initialize_db(database_url: &str) -> Result<DbPool, String> {
  let pool = SqlitePoolOptions::new()
    .max_connections(5)
    .connect(database_url)
    .await
    .map_err(|e| format!("Failed to connect to {}: {}", database_url, e))?;

  sqlx::migrate!("./migrations")
    .run(&pool)
    .await
    .map_err(|e| format!("Failed to run migrations: {}", e))?;

  Ok(pool)
}

/// Idempotency-key store for the scheduler: at most one successful
/// generation per calendar day.
#[async_trait]
pub trait RunLedger: Send + Sync {
  async fn has_run_on(&self, date: NaiveDate) -> Result<bool, String>;

  /// Record a completed run. Only called after the full pipeline succeeded.
  async fn mark_complete(&self, date: NaiveDate, decision_json: &str) -> Result<(), String>;
}

pub struct SqliteRunLedger {
  pool: DbPool,
}

impl SqliteRunLedger {
  pub fn new(pool: DbPool) -> Self {
    Self { pool }
  }
}

#[async_trait]
impl RunLedger for SqliteRunLedger {
  async fn has_run_on(&self, date: NaiveDate) -> Result<bool, String> {
    let row: Option<(String,)> =
      sqlx::query_as("SELECT run_date FROM run_ledger WHERE run_date = ?1")
        .bind(date.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| format!("Failed to query run ledger: {}", e))?;

    Ok(row.is_some())
  }

  async fn mark_complete(&self, date: NaiveDate, decision_json: &str) -> Result<(), String> {
    sqlx::query(
      r#"
      INSERT INTO run_ledger (run_date, completed_at, decision_json)
      VALUES (?1, ?2, ?3)
      ON CONFLICT(run_date) DO UPDATE SET
        completed_at = excluded.completed_at,
        decision_json = excluded.decision_json
      "#,
    )
    .bind(date.to_string())
    .bind(Utc::now().to_rfc3339())
    .bind(decision_json)
    .execute(&self.pool)
    .await
    .map_err(|e| format!("Failed to record run: {}", e))?;

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_utils::setup_test_db;

  #[tokio::test]
  async fn test_ledger_roundtrip() {
    let pool = setup_test_db().await;
    let ledger = SqliteRunLedger::new(pool);
    let date: NaiveDate = "2024-03-08".parse().unwrap();

    assert!(!ledger.has_run_on(date).await.unwrap());

    ledger
      .mark_complete(date, r#"{"workout_type":"endurance"}"#)
      .await
      .unwrap();

    assert!(ledger.has_run_on(date).await.unwrap());

    // Other days remain unmarked
    let next: NaiveDate = "2024-03-09".parse().unwrap();
    assert!(!ledger.has_run_on(next).await.unwrap());
  }

  #[tokio::test]
  async fn test_mark_complete_is_idempotent() {
    let pool = setup_test_db().await;
    let ledger = SqliteRunLedger::new(pool);
    let date: NaiveDate = "2024-03-08".parse().unwrap();

    ledger.mark_complete(date, "{}").await.unwrap();
    ledger.mark_complete(date, "{}").await.unwrap();

    assert!(ledger.has_run_on(date).await.unwrap());
  }
}
