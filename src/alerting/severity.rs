use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::db::{CheckResult, MonitorStore, StoreError};
use crate::model::SeverityPolicy;

/// Results older than the window by up to this much are fetched only to learn
/// whether the history reaches back past the window start.
pub(crate) const LOOKBACK_SLACK_MINUTES: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Severity {
    pub failure_percentage: f64,
    pub is_severe: bool,
    pub failures: usize,
    /// Observed in-window results, or the estimate when history is short.
    pub total: usize,
}

fn window_start(policy: &SeverityPolicy, now: DateTime<Utc>) -> DateTime<Utc> {
    now - ChronoDuration::minutes(policy.window_minutes as i64)
}

/// Windowed failure percentage over `results` (any order).
///
/// When nothing older than the window exists the monitor has not been running
/// for a full window yet, so the denominator becomes the number of samples a
/// full window would hold at `check_interval`.
pub fn compute(
    results: &[CheckResult],
    policy: &SeverityPolicy,
    check_interval: Duration,
    now: DateTime<Utc>,
) -> Severity {
    let start = window_start(policy, now);
    let (in_window, older): (Vec<&CheckResult>, Vec<&CheckResult>) =
        results.iter().partition(|r| r.timestamp >= start);

    let failures = in_window.iter().filter(|r| !r.passed).count();
    let mut total = in_window.len();
    if older.is_empty() {
        let interval_secs = check_interval.as_secs().max(1);
        let estimated = (policy.window_minutes * 60 / interval_secs) as usize;
        total = total.max(estimated);
    }

    let failure_percentage = if total == 0 {
        0.0
    } else {
        failures as f64 / total as f64 * 100.0
    };

    Severity {
        failure_percentage,
        is_severe: failure_percentage > policy.failure_threshold_percent,
        failures,
        total,
    }
}

pub struct SeverityEvaluator {
    store: Arc<dyn MonitorStore>,
}

impl SeverityEvaluator {
    pub fn new(store: Arc<dyn MonitorStore>) -> Self {
        Self { store }
    }

    pub async fn evaluate(
        &self,
        test_id: &str,
        policy: &SeverityPolicy,
        check_interval: Duration,
        now: DateTime<Utc>,
    ) -> Result<Severity, StoreError> {
        let from = window_start(policy, now) - ChronoDuration::minutes(LOOKBACK_SLACK_MINUTES);
        let results = self.store.check_results_since(test_id, from).await?;
        Ok(compute(&results, policy, check_interval, now))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::model::TargetKind;
    use std::collections::HashMap;

    pub(crate) fn policy(window_minutes: u64, threshold: f64) -> SeverityPolicy {
        SeverityPolicy {
            name: "critical".to_string(),
            window_minutes,
            failure_threshold_percent: threshold,
            intervention_threshold_percent: 100.0,
            alert_resend_minutes: 10,
            alerts: HashMap::new(),
        }
    }

    pub(crate) fn result(test_id: &str, passed: bool, at: DateTime<Utc>) -> CheckResult {
        let failures = if passed { Vec::new() } else { vec!["boom".to_string()] };
        CheckResult::new(
            TargetKind::Server,
            test_id.to_string(),
            "db",
            Some("disk"),
            &failures,
        )
        .at(at)
    }

    /// Ten in-window results `seconds` apart, the first `failed` of them
    /// failing, plus one result older than the window.
    fn full_history(failed: usize, now: DateTime<Utc>) -> Vec<CheckResult> {
        let mut results: Vec<CheckResult> = (0..10)
            .map(|i| result("t", i >= failed, now - ChronoDuration::seconds(i as i64 * 25)))
            .collect();
        results.push(result("t", true, now - ChronoDuration::seconds(5 * 60 + 30)));
        results
    }

    #[test]
    fn full_history_below_threshold_is_not_severe() {
        let now = Utc::now();
        let severity = compute(
            &full_history(4, now),
            &policy(5, 50.0),
            Duration::from_secs(60),
            now,
        );
        assert_eq!(severity.total, 10);
        assert!((severity.failure_percentage - 40.0).abs() < f64::EPSILON);
        assert!(!severity.is_severe);
    }

    #[test]
    fn full_history_above_threshold_is_severe() {
        let now = Utc::now();
        let severity = compute(
            &full_history(6, now),
            &policy(5, 50.0),
            Duration::from_secs(60),
            now,
        );
        assert!((severity.failure_percentage - 60.0).abs() < f64::EPSILON);
        assert!(severity.is_severe);
    }

    #[test]
    fn short_history_uses_estimated_total() {
        let now = Utc::now();
        let results = vec![
            result("t", false, now - ChronoDuration::seconds(10)),
            result("t", false, now - ChronoDuration::seconds(70)),
        ];
        let severity = compute(&results, &policy(5, 50.0), Duration::from_secs(60), now);
        assert_eq!(severity.total, 5);
        assert!((severity.failure_percentage - 40.0).abs() < f64::EPSILON);
        assert!(!severity.is_severe);
    }

    #[test]
    fn estimate_never_drops_below_observed_count() {
        let now = Utc::now();
        let results: Vec<CheckResult> = (0..8)
            .map(|i| result("t", i % 2 == 0, now - ChronoDuration::seconds(i * 10)))
            .collect();
        let severity = compute(&results, &policy(5, 50.0), Duration::from_secs(60), now);
        assert_eq!(severity.total, 8);
        assert!((severity.failure_percentage - 50.0).abs() < f64::EPSILON);
        assert!(!severity.is_severe);
    }

    #[test]
    fn threshold_is_strictly_greater() {
        let now = Utc::now();
        let severity = compute(
            &full_history(5, now),
            &policy(5, 50.0),
            Duration::from_secs(60),
            now,
        );
        assert!(!severity.is_severe);
    }

    #[test]
    fn empty_history_is_zero_percent() {
        let severity = compute(&[], &policy(5, 0.0), Duration::from_secs(60), Utc::now());
        assert_eq!(severity.failure_percentage, 0.0);
        assert!(!severity.is_severe);
    }

    #[tokio::test]
    async fn evaluator_reads_window_from_store() {
        let now = Utc::now();
        let store = Arc::new(MemoryStore::new());
        for r in full_history(6, now) {
            store.save_check_result(&r).await.unwrap();
        }
        // Outside the lookback slack and for another test id: both ignored.
        store
            .save_check_result(&result("t", false, now - ChronoDuration::minutes(30)))
            .await
            .unwrap();
        store
            .save_check_result(&result("other", false, now))
            .await
            .unwrap();

        let evaluator = SeverityEvaluator::new(store);
        let severity = evaluator
            .evaluate("t", &policy(5, 50.0), Duration::from_secs(60), now)
            .await
            .unwrap();
        assert_eq!(severity.failures, 6);
        assert_eq!(severity.total, 10);
        assert!(severity.is_severe);
    }
}
