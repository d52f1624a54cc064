use chrono::Duration as ChronoDuration;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::alerting::severity::LOOKBACK_SLACK_MINUTES;
use crate::config::MonitorSettings;
use crate::web::status_routes::RECENT_MINUTES;
use crate::model::{Check, Group, ServerTarget, SeverityPolicy, Target, WebsiteTarget};

/// One immutable generation of configuration. Replaced wholesale at reload.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub settings: MonitorSettings,
    pub severities: HashMap<String, Arc<SeverityPolicy>>,
    pub groups: HashMap<String, Group>,
    pub servers: Vec<Arc<ServerTarget>>,
    pub websites: Vec<Arc<WebsiteTarget>>,
}

impl Snapshot {
    /// All targets, servers first.
    pub fn targets(&self) -> Vec<Target> {
        self.servers
            .iter()
            .cloned()
            .map(Target::Server)
            .chain(self.websites.iter().cloned().map(Target::Website))
            .collect()
    }

    pub fn check_interval(&self) -> Duration {
        self.settings.check_interval()
    }

    pub fn severity(&self, name: Option<&str>) -> Option<Arc<SeverityPolicy>> {
        name.and_then(|n| self.severities.get(n)).cloned()
    }

    /// The check's own policy when it names a known one, else the server's.
    pub fn severity_for_check(
        &self,
        server: &ServerTarget,
        check: &Check,
    ) -> Option<Arc<SeverityPolicy>> {
        self.severity(check.severity.as_deref())
            .or_else(|| self.severity(server.common.severity.as_deref()))
    }

    /// The furthest back any severity, throttle, cooldown or status query of
    /// this snapshot reads.
    pub fn retention(&self) -> ChronoDuration {
        let policies = self.severities.values().flat_map(|policy| {
            [
                policy.window_minutes as i64 + LOOKBACK_SLACK_MINUTES,
                policy.alert_resend_minutes as i64,
            ]
        });
        let cooldowns = self
            .servers
            .iter()
            .flat_map(|server| server.effective_checks(&self.groups))
            .filter_map(|check| check.intervention.as_ref())
            .map(|intervention| intervention.cooldown_minutes as i64);
        let minutes = policies.chain(cooldowns).fold(RECENT_MINUTES, i64::max);
        ChronoDuration::minutes(minutes)
    }

    pub fn any_in_progress(&self) -> bool {
        self.servers
            .iter()
            .map(|s| &s.common)
            .chain(self.websites.iter().map(|w| &w.common))
            .any(|common| common.in_progress.is_set())
    }

    /// Resolves once no target of this snapshot has a run in flight.
    ///
    /// Only sound while nothing starts new runs, which holds for the scheduler
    /// loop since it is the only spawner and it is the one waiting here.
    pub async fn wait_idle(&self) {
        for server in &self.servers {
            server.common.in_progress.wait_idle().await;
        }
        for website in &self.websites {
            website.common.in_progress.wait_idle().await;
        }
    }
}

/// Holder of the current [`Snapshot`]. Readers clone the `Arc` and keep a
/// consistent view for as long as they need it.
#[derive(Debug, Default)]
pub struct MonitorState {
    current: RwLock<Arc<Snapshot>>,
}

impl MonitorState {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn replace(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let fresh = Arc::new(snapshot);
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::clone(&fresh);
        fresh
    }
}
