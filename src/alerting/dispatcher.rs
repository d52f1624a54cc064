use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::severity::SeverityEvaluator;
use crate::config::MonitorSettings;
use crate::db::{AlertRecord, MonitorStore};
use crate::model::{SeverityPolicy, Target, TargetCommon};
use crate::notifications::{ChannelSettings, Notifier};
use crate::server::state::Snapshot;

/// A failed check asking to be alerted on.
#[derive(Debug, Clone)]
pub struct AlertRequest {
    pub test_id: String,
    pub target: Target,
    /// Policy resolved by the check executor; `None` suppresses alerting.
    pub severity: Option<Arc<SeverityPolicy>>,
    pub subject: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AlertOutcome {
    NoPolicy,
    NotSevere,
    /// An alert for the same test id was already recorded within the resend window.
    Throttled,
    Sent {
        channels: Vec<String>,
        failed: usize,
    },
}

/// Channels that should receive an alert for `target` under `policy`.
///
/// A channel must be globally enabled. Its per-target override wins, then the
/// policy's channel map, then the channel's own default.
pub fn enabled_channels<'a>(
    settings: &'a MonitorSettings,
    target: &TargetCommon,
    policy: &SeverityPolicy,
) -> Vec<&'a ChannelSettings> {
    settings
        .channels
        .iter()
        .filter(|channel| channel.enabled)
        .filter(|channel| {
            target
                .alert_override(&channel.name)
                .or_else(|| policy.alerts.get(&channel.name).copied())
                .unwrap_or(channel.default)
        })
        .collect()
}

pub struct AlertDispatcher {
    store: Arc<dyn MonitorStore>,
    evaluator: SeverityEvaluator,
    notifier: Arc<dyn Notifier>,
}

impl AlertDispatcher {
    pub fn new(store: Arc<dyn MonitorStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            evaluator: SeverityEvaluator::new(Arc::clone(&store)),
            store,
            notifier,
        }
    }

    pub async fn dispatch(
        &self,
        snapshot: &Snapshot,
        request: &AlertRequest,
        now: DateTime<Utc>,
    ) -> AlertOutcome {
        let Some(policy) = request.severity.as_deref() else {
            warn!(
                test_id = %request.test_id,
                target_name = %request.target.name(),
                "No severity policy resolved, alert suppressed."
            );
            return AlertOutcome::NoPolicy;
        };

        match self
            .evaluator
            .evaluate(&request.test_id, policy, snapshot.check_interval(), now)
            .await
        {
            Ok(severity) if !severity.is_severe => return AlertOutcome::NotSevere,
            Ok(_) => {}
            Err(e) => {
                error!(
                    test_id = %request.test_id,
                    error = %e,
                    "Could not evaluate severity, alerting anyway."
                );
            }
        }

        let resend_from = now - ChronoDuration::minutes(policy.alert_resend_minutes as i64);
        match self.store.alerts_since(&request.test_id, resend_from).await {
            Ok(recent) if !recent.is_empty() => return AlertOutcome::Throttled,
            Ok(_) => {}
            Err(e) => {
                warn!(
                    test_id = %request.test_id,
                    error = %e,
                    "Could not read recent alerts, not throttling."
                );
            }
        }

        error!(test_id = %request.test_id, "{} ALERT - {}", policy.name, request.subject);

        let channels = enabled_channels(&snapshot.settings, request.target.common(), policy);
        let deliveries = channels.iter().map(|channel| async move {
            let outcome = self
                .notifier
                .notify(channel, &request.subject, &request.message)
                .await;
            if let Err(e) = &outcome {
                error!(channel = %channel.name, error = %e, "Could not send alert.");
            }
            outcome.is_ok()
        });
        let failed = join_all(deliveries).await.into_iter().filter(|ok| !ok).count();

        if let Err(e) = self
            .store
            .save_alert(&AlertRecord::new(&request.test_id, now))
            .await
        {
            error!(test_id = %request.test_id, error = %e, "Could not save alert.");
        }

        info!(test_id = %request.test_id, channels = channels.len(), failed, "Alert dispatched.");
        AlertOutcome::Sent {
            channels: channels.iter().map(|c| c.name.clone()).collect(),
            failed,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::alerting::severity::tests::{policy, result};
    use crate::db::{CheckResult, MemoryStore};
    use crate::model::{Credentials, ServerTarget};
    use crate::notifications::{ChannelConfig, NotificationError};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Records every notification; channels named in `failing` return an error.
    #[derive(Default)]
    pub(crate) struct RecordingNotifier {
        pub sent: Mutex<Vec<(String, String, String)>>,
        pub failing: Vec<String>,
    }

    impl RecordingNotifier {
        pub(crate) fn sent(&self) -> Vec<(String, String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(
            &self,
            channel: &ChannelSettings,
            subject: &str,
            message: &str,
        ) -> Result<(), NotificationError> {
            self.sent.lock().unwrap().push((
                channel.name.clone(),
                subject.to_string(),
                message.to_string(),
            ));
            if self.failing.contains(&channel.name) {
                return Err(NotificationError::Disabled(channel.name.clone()));
            }
            Ok(())
        }
    }

    pub(crate) fn channel(name: &str, enabled: bool, default: bool) -> ChannelSettings {
        ChannelSettings {
            name: name.to_string(),
            enabled,
            default,
            config: ChannelConfig::SimplePush {
                key: "k".to_string(),
            },
        }
    }

    fn target(alerts: &[(&str, bool)]) -> Target {
        let mut common = TargetCommon::new("db".to_string(), true, Some("critical".to_string()));
        common.alerts = alerts.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        Target::Server(Arc::new(ServerTarget {
            common,
            host: "10.0.0.1".to_string(),
            port: 22,
            credentials: Credentials::default(),
            groups: Vec::new(),
            checks: Vec::new(),
            interventions: None,
        }))
    }

    fn snapshot() -> Snapshot {
        let mut snapshot = Snapshot::default();
        snapshot.settings.channels = vec![channel("push", true, true)];
        snapshot
    }

    fn request(severity: Option<SeverityPolicy>) -> AlertRequest {
        AlertRequest {
            test_id: "t".to_string(),
            target: target(&[]),
            severity: severity.map(Arc::new),
            subject: "db (disk)".to_string(),
            message: "disk full".to_string(),
        }
    }

    /// Five failures ending at `at`, enough to be severe on their own.
    async fn add_failures(store: &MemoryStore, at: DateTime<Utc>) {
        for i in 0..5 {
            let r: CheckResult = result("t", false, at - ChronoDuration::seconds(i * 20));
            store.save_check_result(&r).await.unwrap();
        }
    }

    async fn severe_store(now: DateTime<Utc>) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        add_failures(&store, now).await;
        store
    }

    #[tokio::test]
    async fn resend_is_throttled_within_window() {
        let t0 = Utc::now() - ChronoDuration::minutes(20);
        let store = Arc::new(MemoryStore::new());
        store.save_alert(&AlertRecord::new("t", t0)).await.unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = AlertDispatcher::new(store.clone(), notifier.clone());
        let request = request(Some(policy(5, 50.0)));

        let at_5 = t0 + ChronoDuration::minutes(5);
        add_failures(&store, at_5).await;
        let outcome = dispatcher.dispatch(&snapshot(), &request, at_5).await;
        assert_eq!(outcome, AlertOutcome::Throttled);
        assert_eq!(store.all_alerts().await.len(), 1);
        assert!(notifier.sent().is_empty());

        let at_11 = t0 + ChronoDuration::minutes(11);
        add_failures(&store, at_11).await;
        let outcome = dispatcher.dispatch(&snapshot(), &request, at_11).await;
        assert!(matches!(outcome, AlertOutcome::Sent { .. }));
        let alerts = store.all_alerts().await;
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[1].timestamp, at_11);
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn not_severe_writes_nothing() {
        let now = Utc::now();
        let store = Arc::new(MemoryStore::new());
        store.save_check_result(&result("t", false, now)).await.unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = AlertDispatcher::new(store.clone(), notifier.clone());

        // One failure against an estimated five samples is 20%.
        let outcome = dispatcher
            .dispatch(&snapshot(), &request(Some(policy(5, 50.0))), now)
            .await;
        assert_eq!(outcome, AlertOutcome::NotSevere);
        assert!(store.all_alerts().await.is_empty());
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn missing_policy_suppresses_alert() {
        let now = Utc::now();
        let store = severe_store(now).await;
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = AlertDispatcher::new(store.clone(), notifier.clone());

        let outcome = dispatcher.dispatch(&snapshot(), &request(None), now).await;
        assert_eq!(outcome, AlertOutcome::NoPolicy);
        assert!(store.all_alerts().await.is_empty());
    }

    #[tokio::test]
    async fn channel_failure_does_not_block_others_or_record() {
        let now = Utc::now();
        let store = severe_store(now).await;
        let notifier = Arc::new(RecordingNotifier {
            failing: vec!["push".to_string()],
            ..RecordingNotifier::default()
        });
        let dispatcher = AlertDispatcher::new(store.clone(), notifier.clone());
        let mut snapshot = snapshot();
        snapshot.settings.channels.push(channel("hook", true, true));

        let outcome = dispatcher
            .dispatch(&snapshot, &request(Some(policy(5, 50.0))), now)
            .await;
        assert_eq!(
            outcome,
            AlertOutcome::Sent {
                channels: vec!["push".to_string(), "hook".to_string()],
                failed: 1
            }
        );
        assert_eq!(notifier.sent().len(), 2);
        assert_eq!(store.all_alerts().await.len(), 1);
    }

    #[test]
    fn channel_resolution_order() {
        let mut settings = MonitorSettings::default();
        settings.channels = vec![
            channel("off", false, true),
            channel("by-default", true, true),
            channel("by-policy", true, false),
            channel("by-target", true, true),
        ];
        let mut policy = policy(5, 50.0);
        policy.alerts = HashMap::from([
            ("by-policy".to_string(), true),
            ("by-target".to_string(), true),
            ("off".to_string(), true),
        ]);
        let target = target(&[("by-target", false)]);

        let names: Vec<&str> = enabled_channels(&settings, target.common(), &policy)
            .into_iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["by-default", "by-policy"]);
    }
}
