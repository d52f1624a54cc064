pub mod loader;
pub mod model;

use std::path::PathBuf;
use thiserror::Error;

use crate::server::state::Snapshot;

pub use loader::FileConfigSource;
pub use model::{MonitorSettings, StorageSettings};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file `{file}` does not exist in {dir} or its default/ directory")]
    Missing { file: &'static str, dir: PathBuf },
    #[error("Could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Could not parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid check `{check}`: {reason}")]
    InvalidCheck { check: String, reason: String },
    #[error("Invalid website `{website}`: {reason}")]
    InvalidWebsite { website: String, reason: String },
    /// Also raised for names that differ only in case or whitespace.
    #[error("Duplicate {kind} name `{name}`")]
    Duplicate { kind: &'static str, name: String },
    #[error("Server `{server}` has more than one check named like `{check}`")]
    DuplicateCheck { server: String, check: String },
}

/// A freshly loaded configuration.
pub struct Reload {
    pub snapshot: Snapshot,
    /// Server, group or website definitions changed, so remote sessions must
    /// be torn down and re-established.
    pub rebuild_sessions: bool,
}

/// Where the scheduler gets its configuration from.
pub trait ConfigSource: Send {
    /// Whether anything changed since the last successful `load`.
    fn has_changes(&self) -> bool;

    fn load(&mut self) -> Result<Reload, ConfigError>;
}
