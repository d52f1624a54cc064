use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::severity::SeverityEvaluator;
use crate::db::{InterventionRecord, MonitorStore};
use crate::model::{Check, ServerTarget};
use crate::remote::ConnectionManager;
use crate::server::state::Snapshot;

#[derive(Debug, Clone, PartialEq)]
pub enum InterventionOutcome {
    /// The check has no remedial command.
    NotApplicable,
    /// Interventions are switched off for this server.
    Disabled,
    NoPolicy,
    SkippedSevere,
    BelowThreshold,
    CoolingDown,
    /// History could not be read, so nothing was run.
    StorageUnavailable,
    Executed { succeeded: bool },
}

pub struct InterventionController {
    store: Arc<dyn MonitorStore>,
    evaluator: SeverityEvaluator,
    connections: Arc<ConnectionManager>,
}

impl InterventionController {
    pub fn new(store: Arc<dyn MonitorStore>, connections: Arc<ConnectionManager>) -> Self {
        Self {
            evaluator: SeverityEvaluator::new(Arc::clone(&store)),
            store,
            connections,
        }
    }

    /// Runs the check's remedial command when its failure rate is past the
    /// intervention threshold.
    pub async fn consider(
        &self,
        snapshot: &Snapshot,
        server: &ServerTarget,
        check: &Check,
        now: DateTime<Utc>,
    ) -> InterventionOutcome {
        let Some(intervention) = &check.intervention else {
            return InterventionOutcome::NotApplicable;
        };
        if !server.interventions_enabled(snapshot.settings.interventions_enabled) {
            return InterventionOutcome::Disabled;
        }
        let test_id = server.test_id(&check.name);
        let Some(policy) = snapshot.severity_for_check(server, check) else {
            warn!(test_id = %test_id, "No severity policy resolved, intervention skipped.");
            return InterventionOutcome::NoPolicy;
        };

        let severity = match self
            .evaluator
            .evaluate(&test_id, &policy, snapshot.check_interval(), now)
            .await
        {
            Ok(severity) => severity,
            Err(e) => {
                error!(
                    test_id = %test_id,
                    error = %e,
                    "Could not evaluate severity, intervention skipped."
                );
                return InterventionOutcome::StorageUnavailable;
            }
        };

        if intervention.stop_when_severe && severity.is_severe {
            info!(test_id = %test_id, "Check is severe, intervention stopped.");
            return InterventionOutcome::SkippedSevere;
        }
        if severity.failure_percentage <= policy.intervention_threshold_percent {
            return InterventionOutcome::BelowThreshold;
        }

        if intervention.cooldown_minutes > 0 {
            let from = now - ChronoDuration::minutes(intervention.cooldown_minutes as i64);
            match self.store.interventions_since(&test_id, from).await {
                Ok(recent) if !recent.is_empty() => return InterventionOutcome::CoolingDown,
                Ok(_) => {}
                Err(e) => {
                    error!(
                        test_id = %test_id,
                        error = %e,
                        "Could not read recent interventions, intervention skipped."
                    );
                    return InterventionOutcome::StorageUnavailable;
                }
            }
        }

        info!(
            test_id = %test_id,
            failure_percentage = severity.failure_percentage,
            command = %intervention.command,
            "Running intervention."
        );
        let succeeded = match self
            .connections
            .run_command(&server.common.name, &intervention.command)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                error!(test_id = %test_id, error = %e, "Intervention failed.");
                false
            }
        };

        let record = InterventionRecord {
            test_id: test_id.clone(),
            command: intervention.command.clone(),
            succeeded,
            timestamp: now,
        };
        if let Err(e) = self.store.save_intervention(&record).await {
            error!(test_id = %test_id, error = %e, "Could not save intervention.");
        }
        InterventionOutcome::Executed { succeeded }
    }
}
