use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::state::MonitorState;
use crate::checks::CheckEngine;
use crate::config::{ConfigError, ConfigSource, Reload};
use crate::db::MonitorStore;
use crate::remote::ConnectionManager;

/// The single control loop: reload barrier, per-target dispatch, sleep.
pub struct Scheduler {
    source: Box<dyn ConfigSource>,
    state: Arc<MonitorState>,
    store: Arc<dyn MonitorStore>,
    connections: Arc<ConnectionManager>,
    engine: Arc<CheckEngine>,
    tracker: TaskTracker,
}

impl Scheduler {
    pub fn new(
        source: Box<dyn ConfigSource>,
        state: Arc<MonitorState>,
        store: Arc<dyn MonitorStore>,
        connections: Arc<ConnectionManager>,
        engine: Arc<CheckEngine>,
        tracker: TaskTracker,
    ) -> Self {
        Self {
            source,
            state,
            store,
            connections,
            engine,
            tracker,
        }
    }

    /// Loads the initial configuration and connects to every enabled server.
    pub async fn start(&mut self) -> Result<(), ConfigError> {
        let reload = self.source.load()?;
        self.apply(Reload {
            rebuild_sessions: true,
            ..reload
        })
        .await;
        Ok(())
    }

    /// Picks up configuration changes once no target has a run in flight.
    /// Returns whether a new snapshot was installed.
    pub async fn reload_if_changed(&mut self) -> Result<bool, ConfigError> {
        if !self.source.has_changes() {
            return Ok(false);
        }

        info!("Configuration changed, waiting for running checks to finish.");
        self.state.current().wait_idle().await;

        let reload = self.source.load()?;
        self.apply(reload).await;
        Ok(true)
    }

    async fn apply(&self, reload: Reload) {
        if reload.rebuild_sessions {
            self.connections.teardown_all().await;
            self.connections.connect_all(&reload.snapshot.servers).await;
        }
        self.state.replace(reload.snapshot);
    }

    /// Spawns a run for every enabled target that is not already running.
    /// Returns how many runs were started.
    pub fn dispatch(&self) -> usize {
        let snapshot = self.state.current();
        let mut started = 0;
        for target in snapshot.targets() {
            let common = target.common();
            if !common.enabled {
                continue;
            }
            let Some(guard) = common.in_progress.try_begin() else {
                debug!(target_name = %common.name, "Previous run still in progress, skipping.");
                continue;
            };

            let engine = Arc::clone(&self.engine);
            let snapshot = Arc::clone(&snapshot);
            self.tracker.spawn(async move {
                let _guard = guard;
                engine.run_target(snapshot, target).await;
            });
            started += 1;
        }
        started
    }

    /// Drops stored records no query of the current snapshot can reach.
    pub async fn prune(&self) -> usize {
        let cutoff = Utc::now() - self.state.current().retention();
        match self.store.prune_before(cutoff).await {
            Ok(removed) => {
                if removed > 0 {
                    debug!(removed, "Pruned expired records.");
                }
                removed
            }
            Err(e) => {
                warn!(error = %e, "Could not prune expired records.");
                0
            }
        }
    }

    pub async fn tick(&mut self) -> Result<(), ConfigError> {
        self.reload_if_changed().await?;
        self.prune().await;
        let started = self.dispatch();
        debug!(started, "Tick dispatched.");
        Ok(())
    }

    /// Ticks until `shutdown` resolves or a reload fails, then drains.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Result<(), ConfigError> {
        tokio::pin!(shutdown);
        let result = loop {
            if let Err(e) = self.tick().await {
                break Err(e);
            }
            let interval = self.state.current().check_interval();
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested.");
                    break Ok(());
                }
                _ = tokio::time::sleep(interval) => {}
            }
        };
        self.shutdown().await;
        result
    }

    /// A single tick followed by a full drain.
    pub async fn run_once(mut self) -> Result<(), ConfigError> {
        let result = self.tick().await;
        self.shutdown().await;
        result
    }

    async fn shutdown(&self) {
        self.tracker.close();
        info!(tasks = self.tracker.len(), "Waiting for running tasks.");
        self.tracker.wait().await;
        self.connections.teardown_all().await;
        info!("Scheduler stopped.");
    }
}
