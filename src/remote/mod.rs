//! Remote command execution against monitored servers.

pub mod connection_manager;
pub mod openssh;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::model::ServerTarget;

pub use connection_manager::ConnectionManager;
pub use openssh::OpenSshDialer;

#[derive(Error, Debug)]
#[error("Could not connect to {host}: {reason}")]
pub struct ConnectionError {
    pub host: String,
    pub reason: String,
}

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("SSH not connected")]
    NotConnected,
    /// The transport refused a new channel. Triggers a reconnect.
    #[error("Could not start session for {host}: {reason}")]
    Channel { host: String, reason: String },
    #[error("Command exited with status {status}: {stderr}")]
    Command { status: i32, stderr: String },
    #[error(transparent)]
    Reconnect(#[from] ConnectionError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RemoteError {
    pub fn is_channel_failure(&self) -> bool {
        matches!(self, RemoteError::Channel { .. })
    }
}

/// A persistent transport to one server. Each `run` opens a fresh channel.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    async fn run(&self, command: &str) -> Result<String, RemoteError>;

    async fn close(&self) -> Result<(), RemoteError>;
}

#[async_trait]
pub trait RemoteDialer: Send + Sync {
    async fn dial(&self, server: &ServerTarget) -> Result<Arc<dyn RemoteSession>, ConnectionError>;
}
