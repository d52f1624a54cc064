pub mod memory;
pub mod models;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub use memory::MemoryStore;
pub use models::{AlertRecord, CheckResult, InterventionRecord};
pub use postgres::PgStore;

/// Upper bound on rows returned by any `*_since` query.
pub const QUERY_LIMIT: usize = 1000;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Append-only persistence for observations, alerts and interventions.
///
/// Every `*_since` query returns records with `timestamp >= from`, newest
/// first, capped at [`QUERY_LIMIT`].
#[async_trait]
pub trait MonitorStore: Send + Sync {
    async fn save_check_result(&self, result: &CheckResult) -> Result<(), StoreError>;

    async fn check_results_since(
        &self,
        test_id: &str,
        from: DateTime<Utc>,
    ) -> Result<Vec<CheckResult>, StoreError>;

    async fn save_alert(&self, alert: &AlertRecord) -> Result<(), StoreError>;

    async fn alerts_since(
        &self,
        alert_id: &str,
        from: DateTime<Utc>,
    ) -> Result<Vec<AlertRecord>, StoreError>;

    async fn save_intervention(&self, intervention: &InterventionRecord) -> Result<(), StoreError>;

    async fn interventions_since(
        &self,
        test_id: &str,
        from: DateTime<Utc>,
    ) -> Result<Vec<InterventionRecord>, StoreError>;

    /// Drops records older than `cutoff` and returns how many went. Durable
    /// backends keep their full history.
    async fn prune_before(&self, _cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        Ok(0)
    }
}
