//! OpenSSH transport built on connection multiplexing.
//!
//! `dial` starts a background master connection bound to a control socket;
//! every `run` is a multiplexed client that opens a new channel on it. ssh
//! exits with 255 when the channel or transport fails, which is reported as
//! [`RemoteError::Channel`] so the connection manager can reconnect.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tempfile::TempDir;
use tokio::process::Command as TokioCommand;
use tracing::{debug, info};

use super::{ConnectionError, RemoteDialer, RemoteError, RemoteSession};
use crate::model::{ServerTarget, normalize_name};

const SSH_TRANSPORT_FAILURE: i32 = 255;
const CONNECT_TIMEOUT_SECONDS: u64 = 3;
const SSH_PROGRAM: &str = "ssh";

pub struct OpenSshDialer {
    control_dir: Arc<TempDir>,
    /// Numbers every dial so no two masters ever share a control socket.
    dials: AtomicU64,
}

impl OpenSshDialer {
    pub fn new() -> std::io::Result<Self> {
        let control_dir = tempfile::Builder::new().prefix("warden-ssh-").tempdir()?;
        info!(path = ?control_dir.path(), "Created SSH control socket directory.");
        Ok(Self {
            control_dir: Arc::new(control_dir),
            dials: AtomicU64::new(0),
        })
    }

    fn control_path(&self, server: &ServerTarget) -> PathBuf {
        let dial = self.dials.fetch_add(1, Ordering::Relaxed);
        self.control_dir
            .path()
            .join(format!("{dial}-{}.sock", normalize_name(&server.common.name)))
    }
}

/// Connection parameters shared by the master and its multiplexed clients.
#[derive(Debug, Clone)]
struct Destination {
    host: String,
    port: u16,
    username: String,
    control_path: PathBuf,
}

impl Destination {
    fn target(&self) -> String {
        if self.username.is_empty() {
            self.host.clone()
        } else {
            format!("{}@{}", self.username, self.host)
        }
    }

    fn common_args(&self) -> Vec<String> {
        vec![
            "-S".to_string(),
            self.control_path.display().to_string(),
            "-p".to_string(),
            self.port.to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={CONNECT_TIMEOUT_SECONDS}"),
        ]
    }
}

fn master_args(
    destination: &Destination,
    identity_file: Option<&Path>,
    batch_mode: bool,
) -> Vec<String> {
    let mut args = vec![
        "-M".to_string(),
        "-N".to_string(),
        "-f".to_string(),
        "-o".to_string(),
        "ControlPersist=yes".to_string(),
    ];
    args.extend(destination.common_args());
    if batch_mode {
        args.push("-o".to_string());
        args.push("BatchMode=yes".to_string());
    }
    if let Some(identity) = identity_file {
        args.push("-i".to_string());
        args.push(identity.display().to_string());
    }
    args.push(destination.target());
    args
}

fn client_args(destination: &Destination, command: &str) -> Vec<String> {
    let mut args = destination.common_args();
    args.extend([
        "-o".to_string(),
        "ControlMaster=no".to_string(),
        "-o".to_string(),
        "BatchMode=yes".to_string(),
        destination.target(),
        "--".to_string(),
        command.to_string(),
    ]);
    args
}

fn control_args(destination: &Destination, operation: &str) -> Vec<String> {
    let mut args = destination.common_args();
    args.extend(["-O".to_string(), operation.to_string(), destination.target()]);
    args
}

fn stderr_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

#[async_trait]
impl RemoteDialer for OpenSshDialer {
    async fn dial(
        &self,
        server: &ServerTarget,
    ) -> Result<Arc<dyn RemoteSession>, ConnectionError> {
        let destination = Destination {
            host: server.host.clone(),
            port: server.port,
            username: server.credentials.username.clone(),
            control_path: self.control_path(server),
        };
        let password = server.credentials.password.as_deref();
        let args = master_args(
            &destination,
            server.credentials.identity_file.as_deref(),
            password.is_none(),
        );

        // Password logins go through sshpass, which reads SSHPASS from the environment.
        let mut command = match password {
            Some(password) => {
                let mut cmd = TokioCommand::new("sshpass");
                cmd.arg("-e").arg(SSH_PROGRAM).env("SSHPASS", password);
                cmd
            }
            None => TokioCommand::new(SSH_PROGRAM),
        };
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        debug!(server = %server.common.name, "Starting SSH master connection.");
        let output = command.output().await.map_err(|e| ConnectionError {
            host: server.host.clone(),
            reason: e.to_string(),
        })?;
        if !output.status.success() {
            return Err(ConnectionError {
                host: server.host.clone(),
                reason: stderr_text(&output),
            });
        }

        Ok(Arc::new(OpenSshSession {
            destination,
            _control_dir: Arc::clone(&self.control_dir),
        }))
    }
}

pub struct OpenSshSession {
    destination: Destination,
    // Keeps the socket directory alive for as long as any session uses it.
    _control_dir: Arc<TempDir>,
}

#[async_trait]
impl RemoteSession for OpenSshSession {
    async fn run(&self, command: &str) -> Result<String, RemoteError> {
        let output = TokioCommand::new(SSH_PROGRAM)
            .args(client_args(&self.destination, command))
            .stdin(Stdio::null())
            .output()
            .await?;

        match output.status.code() {
            Some(0) => Ok(String::from_utf8_lossy(&output.stdout).into_owned()),
            Some(SSH_TRANSPORT_FAILURE) | None => Err(RemoteError::Channel {
                host: self.destination.host.clone(),
                reason: stderr_text(&output),
            }),
            Some(status) => Err(RemoteError::Command {
                status,
                stderr: stderr_text(&output),
            }),
        }
    }

    async fn close(&self) -> Result<(), RemoteError> {
        let output = TokioCommand::new(SSH_PROGRAM)
            .args(control_args(&self.destination, "exit"))
            .stdin(Stdio::null())
            .output()
            .await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(RemoteError::Channel {
                host: self.destination.host.clone(),
                reason: stderr_text(&output),
            })
        }
    }
}
