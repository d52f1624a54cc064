use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

use super::AppState;
use crate::alerting::severity;
use crate::model::{CONNECTION_CHECK_NAME, SeverityPolicy};
use crate::server::state::Snapshot;

/// Only results this recent count as "running".
pub const RECENT_MINUTES: i64 = 5;

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub running: bool,
    /// Targets with at least one severe (or, without a policy, currently
    /// failing) test id.
    pub failing: usize,
}

struct TestSpec {
    test_id: String,
    policy: Option<Arc<SeverityPolicy>>,
}

/// Test ids of every enabled target, grouped per target.
fn enabled_tests(snapshot: &Snapshot) -> Vec<Vec<TestSpec>> {
    let mut targets = Vec::new();
    for server in snapshot.servers.iter().filter(|s| s.common.enabled) {
        let mut tests: Vec<TestSpec> = server
            .effective_checks(&snapshot.groups)
            .into_iter()
            .map(|check| TestSpec {
                test_id: server.test_id(&check.name),
                policy: snapshot.severity_for_check(server, check),
            })
            .collect();
        tests.push(TestSpec {
            test_id: server.test_id(CONNECTION_CHECK_NAME),
            policy: snapshot.severity(server.common.severity.as_deref()),
        });
        targets.push(tests);
    }
    for website in snapshot.websites.iter().filter(|w| w.common.enabled) {
        targets.push(vec![TestSpec {
            test_id: website.test_id(),
            policy: snapshot.severity(website.common.severity.as_deref()),
        }]);
    }
    targets
}

pub async fn compute_status(app_state: &AppState, now: DateTime<Utc>) -> StatusResponse {
    let snapshot = app_state.monitor_state.current();
    let interval = snapshot.check_interval();
    let recent_from = now - ChronoDuration::minutes(RECENT_MINUTES);
    let mut running = false;
    let mut failing = 0;

    for tests in enabled_tests(&snapshot) {
        let mut target_failing = false;
        for test in tests {
            let policy_from = test
                .policy
                .as_ref()
                .map(|p| now - ChronoDuration::minutes(p.window_minutes as i64 + 1))
                .unwrap_or(recent_from);
            let results = match app_state
                .store
                .check_results_since(&test.test_id, policy_from.min(recent_from))
                .await
            {
                Ok(results) => results,
                Err(e) => {
                    error!(
                        test_id = %test.test_id,
                        error = %e,
                        "Could not read results for status."
                    );
                    target_failing = true;
                    continue;
                }
            };

            if results.iter().any(|r| r.timestamp >= recent_from) {
                running = true;
            }
            let is_failing = match &test.policy {
                Some(policy) => severity::compute(&results, policy, interval, now).is_severe,
                // Newest first.
                None => results.first().is_some_and(|r| !r.passed && r.timestamp >= recent_from),
            };
            target_failing |= is_failing;
        }
        if target_failing {
            failing += 1;
        }
    }

    StatusResponse { running, failing }
}

async fn get_status_handler(
    State(app_state): State<Arc<AppState>>,
) -> (StatusCode, Json<StatusResponse>) {
    let status = compute_status(&app_state, Utc::now()).await;
    let code = if status.running && status.failing == 0 {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (code, Json(status))
}

pub fn status_routes() -> Router<Arc<AppState>> {
    Router::new().route("/status", get(get_status_handler))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CheckResult, MemoryStore, MonitorStore};
    use crate::model::{HttpMethod, TargetCommon, TargetKind, WebsiteTarget};
    use crate::server::state::MonitorState;
    use crate::web::create_router;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::collections::{BTreeMap, HashMap};
    use tower::ServiceExt;

    fn website(name: &str) -> Arc<WebsiteTarget> {
        Arc::new(WebsiteTarget {
            common: TargetCommon::new(name.to_string(), true, Some("critical".to_string())),
            url: format!("https://{name}.test/"),
            method: HttpMethod::Get,
            status_code: 200,
            max_response_time_ms: 0.0,
            response_headers: BTreeMap::new(),
            request_headers: BTreeMap::new(),
            request_body: None,
        })
    }

    fn app_state(store: Arc<MemoryStore>) -> Arc<AppState> {
        let mut snapshot = Snapshot::default();
        snapshot.severities.insert(
            "critical".to_string(),
            Arc::new(SeverityPolicy {
                name: "critical".to_string(),
                window_minutes: 5,
                failure_threshold_percent: 50.0,
                intervention_threshold_percent: 100.0,
                alert_resend_minutes: 10,
                alerts: HashMap::new(),
            }),
        );
        snapshot.websites = vec![website("shop"), website("blog")];
        Arc::new(AppState {
            monitor_state: Arc::new(MonitorState::new(snapshot)),
            store,
        })
    }

    async fn record(store: &MemoryStore, name: &str, passed: bool, count: i64) {
        let now = Utc::now();
        for i in 0..count {
            let failures = if passed { Vec::new() } else { vec!["down".to_string()] };
            let result = CheckResult::new(
                TargetKind::Website,
                format!("website:{name}"),
                name,
                None,
                &failures,
            )
            .at(now - ChronoDuration::seconds(i * 20));
            store.save_check_result(&result).await.unwrap();
        }
    }

    async fn get_status(state: Arc<AppState>) -> (StatusCode, serde_json::Value) {
        let response = create_router(state)
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn healthy_when_recent_results_and_nothing_severe() {
        let store = Arc::new(MemoryStore::new());
        record(&store, "shop", true, 3).await;
        record(&store, "blog", false, 1).await;

        let (status, body) = get_status(app_state(store)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({"running": true, "failing": 0}));
    }

    #[tokio::test]
    async fn severe_target_fails_the_status() {
        let store = Arc::new(MemoryStore::new());
        record(&store, "shop", true, 3).await;
        record(&store, "blog", false, 5).await;

        let (status, body) = get_status(app_state(store)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, serde_json::json!({"running": true, "failing": 1}));
    }

    #[tokio::test]
    async fn no_recent_results_is_not_running() {
        let (status, body) = get_status(app_state(Arc::new(MemoryStore::new()))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, serde_json::json!({"running": false, "failing": 0}));
    }
}
