use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use super::{RemoteDialer, RemoteError, RemoteSession};
use crate::model::ServerTarget;

/// Owns one persistent session per enabled server.
///
/// Sessions are only created and torn down around configuration reloads, while
/// the scheduler holds its barrier. Between reloads the only mutation is the
/// single reconnect a failing `run_command` may perform.
pub struct ConnectionManager {
    dialer: Arc<dyn RemoteDialer>,
    connections: RwLock<HashMap<String, Arc<ServerConnection>>>,
}

struct ServerConnection {
    server: Arc<ServerTarget>,
    session: Mutex<Option<Arc<dyn RemoteSession>>>,
}

impl ConnectionManager {
    pub fn new(dialer: Arc<dyn RemoteDialer>) -> Self {
        Self {
            dialer,
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Dials every enabled server concurrently. Failed dials leave the server
    /// registered without a session.
    pub async fn connect_all(&self, servers: &[Arc<ServerTarget>]) {
        let attempts = servers
            .iter()
            .filter(|server| server.common.enabled)
            .map(|server| async move {
                let session = match self.dialer.dial(server).await {
                    Ok(session) => {
                        info!(server = %server.common.name, "Connected to server.");
                        Some(session)
                    }
                    Err(e) => {
                        error!(
                            server = %server.common.name,
                            error = %e,
                            "Failed to connect to server."
                        );
                        None
                    }
                };
                (
                    server.common.name.clone(),
                    Arc::new(ServerConnection {
                        server: Arc::clone(server),
                        session: Mutex::new(session),
                    }),
                )
            });
        let established = join_all(attempts).await;

        let mut connections = self.connections.write().await;
        connections.extend(established);
    }

    /// Closes and forgets every session.
    pub async fn teardown_all(&self) {
        let drained: Vec<_> = self.connections.write().await.drain().collect();
        for (name, connection) in drained {
            if let Some(session) = connection.session.lock().await.take() {
                if let Err(e) = session.close().await {
                    error!(server = %name, error = %e, "Could not close SSH session.");
                }
            }
        }
    }

    pub async fn is_connected(&self, server_name: &str) -> bool {
        match self.connection(server_name).await {
            Some(connection) => connection.session.lock().await.is_some(),
            None => false,
        }
    }

    /// Runs a command on a fresh channel of the server's session.
    ///
    /// A channel-open failure triggers exactly one reconnect and one retry; the
    /// retry's outcome is returned as is.
    pub async fn run_command(
        &self,
        server_name: &str,
        command: &str,
    ) -> Result<String, RemoteError> {
        let connection = self
            .connection(server_name)
            .await
            .ok_or(RemoteError::NotConnected)?;
        let session = connection
            .session
            .lock()
            .await
            .clone()
            .ok_or(RemoteError::NotConnected)?;

        match session.run(command).await {
            Err(e) if e.is_channel_failure() => {
                warn!(server = %server_name, error = %e, "Channel open failed, reconnecting.");
                let fresh = connection.reconnect(self.dialer.as_ref(), &session).await?;
                fresh.run(command).await
            }
            outcome => outcome,
        }
    }

    async fn connection(&self, server_name: &str) -> Option<Arc<ServerConnection>> {
        self.connections.read().await.get(server_name).cloned()
    }
}

impl ServerConnection {
    /// Replaces `stale` with a freshly dialed session. If another caller already
    /// replaced it, that session is reused instead of dialing again.
    async fn reconnect(
        &self,
        dialer: &dyn RemoteDialer,
        stale: &Arc<dyn RemoteSession>,
    ) -> Result<Arc<dyn RemoteSession>, RemoteError> {
        let mut slot = self.session.lock().await;
        if let Some(current) = slot.as_ref() {
            if !Arc::ptr_eq(current, stale) {
                return Ok(Arc::clone(current));
            }
        }

        if let Some(old) = slot.take() {
            if let Err(e) = old.close().await {
                error!(
                    server = %self.server.common.name,
                    error = %e,
                    "Could not close SSH session."
                );
            }
        }

        match dialer.dial(&self.server).await {
            Ok(session) => {
                info!(server = %self.server.common.name, "Reconnected to server.");
                *slot = Some(Arc::clone(&session));
                Ok(session)
            }
            Err(e) => {
                error!(
                    server = %self.server.common.name,
                    error = %e,
                    "Failed to reconnect to server."
                );
                Err(e.into())
            }
        }
    }
}
