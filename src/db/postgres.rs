use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};

use super::models::{AlertRecord, CheckResult, InterventionRecord};
use super::{MonitorStore, QUERY_LIMIT, StoreError};

const SCHEMA: &str = include_str!("../../migrations/20250101000000_create_monitor_tables.sql");

/// Postgres-backed store.
#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    /// Creates the tables if they do not exist yet.
    pub async fn initialize(&self) -> Result<(), StoreError> {
        info!("Running monitor schema migrations...");
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await.map_err(|e| {
            error!(error = %e, "Failed to apply monitor schema.");
            e
        })?;
        info!("Monitor schema is up to date.");
        Ok(())
    }
}

#[async_trait]
impl MonitorStore for PgStore {
    async fn save_check_result(&self, result: &CheckResult) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO check_results (test_id, target_kind, target_name, check_name, passed, message, "timestamp")
               VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
        )
        .bind(&result.test_id)
        .bind(&result.target_kind)
        .bind(&result.target_name)
        .bind(&result.check_name)
        .bind(result.passed)
        .bind(&result.message)
        .bind(result.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn check_results_since(
        &self,
        test_id: &str,
        from: DateTime<Utc>,
    ) -> Result<Vec<CheckResult>, StoreError> {
        let rows = sqlx::query_as::<_, CheckResult>(
            r#"SELECT test_id, target_kind, target_name, check_name, passed, message, "timestamp"
               FROM check_results
               WHERE test_id = $1 AND "timestamp" >= $2
               ORDER BY "timestamp" DESC
               LIMIT $3"#,
        )
        .bind(test_id)
        .bind(from)
        .bind(QUERY_LIMIT as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn save_alert(&self, alert: &AlertRecord) -> Result<(), StoreError> {
        sqlx::query(r#"INSERT INTO alerts (alert_id, "timestamp") VALUES ($1, $2)"#)
            .bind(&alert.alert_id)
            .bind(alert.timestamp)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn alerts_since(
        &self,
        alert_id: &str,
        from: DateTime<Utc>,
    ) -> Result<Vec<AlertRecord>, StoreError> {
        let rows = sqlx::query_as::<_, AlertRecord>(
            r#"SELECT alert_id, "timestamp" FROM alerts
               WHERE alert_id = $1 AND "timestamp" >= $2
               ORDER BY "timestamp" DESC
               LIMIT $3"#,
        )
        .bind(alert_id)
        .bind(from)
        .bind(QUERY_LIMIT as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn save_intervention(&self, intervention: &InterventionRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO interventions (test_id, command, succeeded, "timestamp")
               VALUES ($1, $2, $3, $4)"#,
        )
        .bind(&intervention.test_id)
        .bind(&intervention.command)
        .bind(intervention.succeeded)
        .bind(intervention.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn interventions_since(
        &self,
        test_id: &str,
        from: DateTime<Utc>,
    ) -> Result<Vec<InterventionRecord>, StoreError> {
        let rows = sqlx::query_as::<_, InterventionRecord>(
            r#"SELECT test_id, command, succeeded, "timestamp" FROM interventions
               WHERE test_id = $1 AND "timestamp" >= $2
               ORDER BY "timestamp" DESC
               LIMIT $3"#,
        )
        .bind(test_id)
        .bind(from)
        .bind(QUERY_LIMIT as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
