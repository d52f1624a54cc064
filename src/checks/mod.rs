//! Executes a target's checks, persists every observation and hands failures
//! to alerting and interventions.

pub mod assertion;
pub mod http_probe;
pub mod website_check;

use chrono::Utc;
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

use crate::alerting::{AlertDispatcher, AlertRequest, InterventionController};
use crate::db::{CheckResult, MonitorStore};
use crate::model::{
    CONNECTION_CHECK_NAME, Check, ServerTarget, Target, TargetKind, WebsiteTarget,
};
use crate::remote::{ConnectionManager, RemoteError};
use crate::server::state::Snapshot;

/// How much of a failing website's response body goes into the debug log.
const BODY_EXCERPT_CHARS: usize = 512;

pub use http_probe::{HttpProbe, HttpRequestSpec, HttpResponse, ProbeError, ReqwestProbe};

pub struct CheckEngine {
    store: Arc<dyn MonitorStore>,
    connections: Arc<ConnectionManager>,
    probe: Arc<dyn HttpProbe>,
    alerts: Arc<AlertDispatcher>,
    interventions: Arc<InterventionController>,
    tracker: TaskTracker,
}

impl CheckEngine {
    pub fn new(
        store: Arc<dyn MonitorStore>,
        connections: Arc<ConnectionManager>,
        probe: Arc<dyn HttpProbe>,
        alerts: Arc<AlertDispatcher>,
        interventions: Arc<InterventionController>,
        tracker: TaskTracker,
    ) -> Self {
        Self {
            store,
            connections,
            probe,
            alerts,
            interventions,
            tracker,
        }
    }

    /// Runs every check of `target` once. Alerts and interventions are spawned
    /// onto the tracker and not awaited.
    pub async fn run_target(&self, snapshot: Arc<Snapshot>, target: Target) {
        match target {
            Target::Server(server) => self.run_server(&snapshot, &server).await,
            Target::Website(website) => self.run_website(&snapshot, &website).await,
        }
    }

    async fn run_server(&self, snapshot: &Arc<Snapshot>, server: &Arc<ServerTarget>) {
        let name = &server.common.name;
        if !self.connections.is_connected(name).await {
            self.report_not_connected(snapshot, server).await;
            return;
        }

        for check in server.effective_checks(&snapshot.groups) {
            let outcome = self.connections.run_command(name, &check.command).await;
            let reasons = assertion::evaluate(check, &outcome);
            let result = CheckResult::new(
                TargetKind::Server,
                server.test_id(&check.name),
                name,
                Some(&check.name),
                &reasons,
            );
            self.save(&result).await;
            if result.passed {
                debug!(test_id = %result.test_id, "Check passed.");
                continue;
            }

            warn!(test_id = %result.test_id, reasons = %result.message, "Check failed.");
            self.spawn_alert(
                snapshot,
                AlertRequest {
                    test_id: result.test_id.clone(),
                    target: Target::Server(Arc::clone(server)),
                    severity: snapshot.severity_for_check(server, check),
                    subject: format!("{} ({})", name, check.name),
                    message: result.message.clone(),
                },
            );
            if check.intervention.is_some() {
                self.spawn_intervention(snapshot, server, check);
            }
        }
    }

    async fn report_not_connected(&self, snapshot: &Arc<Snapshot>, server: &Arc<ServerTarget>) {
        let name = &server.common.name;
        let result = CheckResult::new(
            TargetKind::Server,
            server.test_id(CONNECTION_CHECK_NAME),
            name,
            Some(CONNECTION_CHECK_NAME),
            &[RemoteError::NotConnected.to_string()],
        );
        self.save(&result).await;
        warn!(server = %name, "Server not connected, checks skipped.");
        self.spawn_alert(
            snapshot,
            AlertRequest {
                test_id: result.test_id.clone(),
                target: Target::Server(Arc::clone(server)),
                severity: snapshot.severity(server.common.severity.as_deref()),
                subject: format!("{name} ({CONNECTION_CHECK_NAME})"),
                message: result.message.clone(),
            },
        );
    }

    async fn run_website(&self, snapshot: &Arc<Snapshot>, website: &Arc<WebsiteTarget>) {
        let outcome = self
            .probe
            .request(&website_check::request_spec(website))
            .await;
        let reasons = website_check::evaluate_website(website, &outcome);
        let result = CheckResult::new(
            TargetKind::Website,
            website.test_id(),
            &website.common.name,
            None,
            &reasons,
        );
        self.save(&result).await;
        if result.passed {
            debug!(test_id = %result.test_id, "Website check passed.");
            return;
        }

        warn!(test_id = %result.test_id, reasons = %result.message, "Website check failed.");
        if let Ok(response) = &outcome {
            let excerpt: String = response.body.chars().take(BODY_EXCERPT_CHARS).collect();
            debug!(test_id = %result.test_id, body = %excerpt, "Failing response body.");
        }
        self.spawn_alert(
            snapshot,
            AlertRequest {
                test_id: result.test_id.clone(),
                target: Target::Website(Arc::clone(website)),
                severity: snapshot.severity(website.common.severity.as_deref()),
                subject: format!("{} failed", website.common.name),
                message: result.message.clone(),
            },
        );
    }

    async fn save(&self, result: &CheckResult) {
        if let Err(e) = self.store.save_check_result(result).await {
            error!(test_id = %result.test_id, error = %e, "Could not save check result.");
        }
    }

    fn spawn_alert(&self, snapshot: &Arc<Snapshot>, request: AlertRequest) {
        let alerts = Arc::clone(&self.alerts);
        let snapshot = Arc::clone(snapshot);
        self.tracker.spawn(async move {
            let outcome = alerts.dispatch(&snapshot, &request, Utc::now()).await;
            debug!(test_id = %request.test_id, ?outcome, "Alert evaluated.");
        });
    }

    fn spawn_intervention(
        &self,
        snapshot: &Arc<Snapshot>,
        server: &Arc<ServerTarget>,
        check: &Check,
    ) {
        let interventions = Arc::clone(&self.interventions);
        let snapshot = Arc::clone(snapshot);
        let server = Arc::clone(server);
        let check = check.clone();
        self.tracker.spawn(async move {
            let outcome = interventions
                .consider(&snapshot, &server, &check, Utc::now())
                .await;
            debug!(
                server = %server.common.name,
                check = %check.name,
                ?outcome,
                "Intervention evaluated."
            );
        });
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::alerting::dispatcher::tests::{RecordingNotifier, channel};
    use crate::db::MemoryStore;
    use crate::model::{
        Assertion, Credentials, HttpMethod, InterventionPolicy, SeverityPolicy, TargetCommon,
    };
    use crate::remote::connection_manager::tests::{ScriptedDialer, ScriptedSession};
    use async_trait::async_trait;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Mutex;

    /// Answers every request with `response`, or a probe error when unset.
    #[derive(Default)]
    pub(crate) struct FakeProbe {
        pub response: Option<HttpResponse>,
        pub requests: Mutex<Vec<HttpRequestSpec>>,
    }

    #[async_trait]
    impl HttpProbe for FakeProbe {
        async fn request(&self, spec: &HttpRequestSpec) -> Result<HttpResponse, ProbeError> {
            self.requests.lock().unwrap().push(spec.clone());
            self.response
                .clone()
                .ok_or_else(|| ProbeError::InvalidHeader("connection refused".to_string()))
        }
    }

    pub(crate) struct Harness {
        pub store: Arc<MemoryStore>,
        pub notifier: Arc<RecordingNotifier>,
        pub connections: Arc<ConnectionManager>,
        pub tracker: TaskTracker,
        pub engine: Arc<CheckEngine>,
    }

    impl Harness {
        pub(crate) fn new(sessions: Vec<Arc<ScriptedSession>>, probe: FakeProbe) -> Self {
            let store = Arc::new(MemoryStore::new());
            let notifier = Arc::new(RecordingNotifier::default());
            let connections = Arc::new(ConnectionManager::new(ScriptedDialer::new(sessions)));
            let tracker = TaskTracker::new();
            let alerts = Arc::new(AlertDispatcher::new(store.clone(), notifier.clone()));
            let interventions = Arc::new(InterventionController::new(
                store.clone(),
                Arc::clone(&connections),
            ));
            let engine = Arc::new(CheckEngine::new(
                store.clone(),
                Arc::clone(&connections),
                Arc::new(probe),
                alerts,
                interventions,
                tracker.clone(),
            ));
            Self {
                store,
                notifier,
                connections,
                tracker,
                engine,
            }
        }

        pub(crate) async fn drain(&self) {
            self.tracker.close();
            self.tracker.wait().await;
        }
    }

    fn check(name: &str, command: &str, contains: &str) -> Check {
        Check {
            name: name.to_string(),
            command: command.to_string(),
            assertion: Assertion::Contains(contains.to_string()),
            severity: None,
            intervention: None,
        }
    }

    fn policy(failure_threshold: f64, intervention_threshold: f64) -> Arc<SeverityPolicy> {
        Arc::new(SeverityPolicy {
            name: "critical".to_string(),
            window_minutes: 5,
            failure_threshold_percent: failure_threshold,
            intervention_threshold_percent: intervention_threshold,
            alert_resend_minutes: 10,
            alerts: HashMap::new(),
        })
    }

    pub(crate) fn server_with(checks: Vec<Check>) -> Arc<ServerTarget> {
        Arc::new(ServerTarget {
            common: TargetCommon::new("db".to_string(), true, Some("critical".to_string())),
            host: "10.0.0.1".to_string(),
            port: 22,
            credentials: Credentials::default(),
            groups: Vec::new(),
            checks,
            interventions: None,
        })
    }

    fn snapshot(policy: Arc<SeverityPolicy>) -> Snapshot {
        let mut snapshot = Snapshot::default();
        snapshot.settings.interventions_enabled = true;
        snapshot.settings.channels = vec![channel("push", true, true)];
        snapshot.severities.insert("critical".to_string(), policy);
        snapshot
    }

    #[tokio::test]
    async fn server_checks_are_persisted_and_failures_alerted() {
        let session = ScriptedSession::new(vec![
            Ok("/dev/sda1 40% /".to_string()),
            Ok("inactive".to_string()),
        ]);
        let harness = Harness::new(vec![session.clone()], FakeProbe::default());
        let server = server_with(vec![
            check("disk", "df -P /", "/dev/sda1"),
            check("nginx", "systemctl is-active nginx", "active (running)"),
        ]);
        harness.connections.connect_all(std::slice::from_ref(&server)).await;
        let mut snapshot = snapshot(policy(0.0, 100.0));
        snapshot.servers.push(Arc::clone(&server));

        harness
            .engine
            .run_target(Arc::new(snapshot), Target::Server(server))
            .await;
        harness.drain().await;

        let results = harness.store.all_check_results().await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].test_id, "server:db:disk");
        assert!(results[0].passed);
        assert_eq!(results[1].test_id, "server:db:nginx");
        assert!(!results[1].passed);
        assert_eq!(results[1].message, "'nginx' failed with response: inactive");

        let sent = harness.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "db (nginx)");
        assert_eq!(harness.store.all_alerts().await[0].alert_id, "server:db:nginx");
    }

    #[tokio::test]
    async fn unconnected_server_reports_standing_failure() {
        let harness = Harness::new(Vec::new(), FakeProbe::default());
        let server = server_with(vec![check("disk", "df -P /", "/")]);
        harness.connections.connect_all(std::slice::from_ref(&server)).await;
        let mut snapshot = snapshot(policy(50.0, 100.0));
        snapshot.servers.push(Arc::clone(&server));

        harness
            .engine
            .run_target(Arc::new(snapshot), Target::Server(server))
            .await;
        harness.drain().await;

        let results = harness.store.all_check_results().await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].test_id, "server:db:connection");
        assert_eq!(results[0].message, "SSH not connected");
        // A single failure against an estimated five samples is not severe.
        assert!(harness.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn failing_check_triggers_intervention() {
        let session = ScriptedSession::new(vec![Ok("inactive".to_string())]);
        let harness = Harness::new(vec![session.clone()], FakeProbe::default());
        let mut nginx = check("nginx", "systemctl is-active nginx", "active (running)");
        nginx.intervention = Some(InterventionPolicy {
            command: "systemctl restart nginx".to_string(),
            stop_when_severe: false,
            cooldown_minutes: 0,
        });
        let server = server_with(vec![nginx]);
        harness.connections.connect_all(std::slice::from_ref(&server)).await;
        let mut snapshot = snapshot(policy(50.0, 10.0));
        snapshot.servers.push(Arc::clone(&server));

        harness
            .engine
            .run_target(Arc::new(snapshot), Target::Server(server))
            .await;
        harness.drain().await;

        assert_eq!(
            session.commands(),
            vec![
                "systemctl is-active nginx".to_string(),
                "systemctl restart nginx".to_string()
            ]
        );
        assert_eq!(harness.store.all_interventions().await.len(), 1);
        assert!(harness.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn website_failure_is_persisted_with_joined_reasons() {
        let probe = FakeProbe {
            response: Some(HttpResponse {
                status: 502,
                headers: HashMap::new(),
                elapsed_ms: 20.0,
                body: String::new(),
            }),
            ..FakeProbe::default()
        };
        let harness = Harness::new(Vec::new(), probe);
        let mut response_headers = BTreeMap::new();
        response_headers.insert("Content-Type".to_string(), "text/html".to_string());
        let website = Arc::new(WebsiteTarget {
            common: TargetCommon::new("Shop".to_string(), true, Some("critical".to_string())),
            url: "https://shop.test/".to_string(),
            method: HttpMethod::Get,
            status_code: 200,
            max_response_time_ms: 0.0,
            response_headers,
            request_headers: BTreeMap::new(),
            request_body: None,
        });
        let mut snapshot = snapshot(policy(0.0, 100.0));
        snapshot.websites.push(Arc::clone(&website));

        harness
            .engine
            .run_target(Arc::new(snapshot), Target::Website(website))
            .await;
        harness.drain().await;

        let results = harness.store.all_check_results().await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].test_id, "website:shop");
        assert_eq!(results[0].check_name, None);
        assert_eq!(
            results[0].message,
            "Status code - expected '200', got '502', Header 'Content-Type' - expected 'text/html', got ''"
        );
        let sent = harness.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "Shop failed");
    }
}
