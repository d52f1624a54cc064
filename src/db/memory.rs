use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::models::{AlertRecord, CheckResult, InterventionRecord};
use super::{MonitorStore, QUERY_LIMIT, StoreError};

/// Process-local store. Nothing survives a restart, and the scheduler prunes
/// it down to what the current configuration can still query.
#[derive(Debug, Default)]
pub struct MemoryStore {
    check_results: RwLock<Vec<CheckResult>>,
    alerts: RwLock<Vec<AlertRecord>>,
    interventions: RwLock<Vec<InterventionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all_check_results(&self) -> Vec<CheckResult> {
        self.check_results.read().await.clone()
    }

    pub async fn all_alerts(&self) -> Vec<AlertRecord> {
        self.alerts.read().await.clone()
    }

    pub async fn all_interventions(&self) -> Vec<InterventionRecord> {
        self.interventions.read().await.clone()
    }
}

fn retain_since<T>(
    rows: &mut Vec<T>,
    cutoff: DateTime<Utc>,
    timestamp: impl Fn(&T) -> DateTime<Utc>,
) -> usize {
    let before = rows.len();
    rows.retain(|row| timestamp(row) >= cutoff);
    before - rows.len()
}

fn newest_first<T: Clone>(
    rows: &[T],
    matches: impl Fn(&T) -> bool,
    timestamp: impl Fn(&T) -> DateTime<Utc>,
) -> Vec<T> {
    let mut selected: Vec<T> = rows.iter().filter(|row| matches(row)).cloned().collect();
    selected.sort_by_key(|row| std::cmp::Reverse(timestamp(row)));
    selected.truncate(QUERY_LIMIT);
    selected
}

#[async_trait]
impl MonitorStore for MemoryStore {
    async fn save_check_result(&self, result: &CheckResult) -> Result<(), StoreError> {
        self.check_results.write().await.push(result.clone());
        Ok(())
    }

    async fn check_results_since(
        &self,
        test_id: &str,
        from: DateTime<Utc>,
    ) -> Result<Vec<CheckResult>, StoreError> {
        let rows = self.check_results.read().await;
        Ok(newest_first(
            &rows,
            |r| r.test_id == test_id && r.timestamp >= from,
            |r| r.timestamp,
        ))
    }

    async fn save_alert(&self, alert: &AlertRecord) -> Result<(), StoreError> {
        self.alerts.write().await.push(alert.clone());
        Ok(())
    }

    async fn alerts_since(
        &self,
        alert_id: &str,
        from: DateTime<Utc>,
    ) -> Result<Vec<AlertRecord>, StoreError> {
        let rows = self.alerts.read().await;
        Ok(newest_first(
            &rows,
            |a| a.alert_id == alert_id && a.timestamp >= from,
            |a| a.timestamp,
        ))
    }

    async fn save_intervention(&self, intervention: &InterventionRecord) -> Result<(), StoreError> {
        self.interventions.write().await.push(intervention.clone());
        Ok(())
    }

    async fn interventions_since(
        &self,
        test_id: &str,
        from: DateTime<Utc>,
    ) -> Result<Vec<InterventionRecord>, StoreError> {
        let rows = self.interventions.read().await;
        Ok(newest_first(
            &rows,
            |i| i.test_id == test_id && i.timestamp >= from,
            |i| i.timestamp,
        ))
    }

    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut removed = retain_since(&mut *self.check_results.write().await, cutoff, |r| {
            r.timestamp
        });
        removed += retain_since(&mut *self.alerts.write().await, cutoff, |a| a.timestamp);
        removed += retain_since(&mut *self.interventions.write().await, cutoff, |i| {
            i.timestamp
        });
        Ok(removed)
    }
}
