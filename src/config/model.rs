//! On-disk shapes of the TOML config files and their validation into the
//! runtime model.

use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

use super::ConfigError;
use crate::model::{
    Assertion, Check, Credentials, Group, HttpMethod, InterventionPolicy, RegexAssertion,
    ServerTarget, TargetCommon, WebsiteTarget,
};
use crate::notifications::ChannelSettings;

pub const DEFAULT_CHECK_INTERVAL_SECONDS: u64 = 60;
pub const DEFAULT_STATUS_LISTEN: &str = "0.0.0.0:8080";
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Contents of `monitor.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorSettings {
    #[serde(default = "default_check_interval")]
    pub check_interval_seconds: u64,
    /// Global intervention switch, overridable per server.
    #[serde(default)]
    pub interventions_enabled: bool,
    #[serde(default = "default_status_listen")]
    pub status_listen: String,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub channels: Vec<ChannelSettings>,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            check_interval_seconds: DEFAULT_CHECK_INTERVAL_SECONDS,
            interventions_enabled: false,
            status_listen: DEFAULT_STATUS_LISTEN.to_string(),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            storage: StorageSettings::default(),
            channels: Vec::new(),
        }
    }
}

fn default_check_interval() -> u64 {
    DEFAULT_CHECK_INTERVAL_SECONDS
}

fn default_status_listen() -> String {
    DEFAULT_STATUS_LISTEN.to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from(DEFAULT_LOG_DIR)
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageSettings {
    #[default]
    Memory,
    Postgres {
        #[serde(default)]
        database_url: String,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
}

fn default_max_connections() -> u32 {
    5
}

impl MonitorSettings {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_seconds.max(1))
    }

    /// Applies `DATABASE_URL` and `WARDEN_LOG_DIR` from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("DATABASE_URL").filter(|v| !v.is_empty()) {
            if let StorageSettings::Postgres { database_url, .. } = &mut self.storage {
                *database_url = url;
            }
        }
        if let Some(dir) = lookup("WARDEN_LOG_DIR").filter(|v| !v.is_empty()) {
            self.log_dir = PathBuf::from(dir);
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RawRegex {
    pub expression: String,
    #[serde(default)]
    pub index: usize,
    pub greater_than: Option<f64>,
    pub less_than: Option<f64>,
    pub equals: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawCheck {
    pub name: String,
    pub command: String,
    pub severity: Option<String>,
    pub response_contains: Option<String>,
    pub regex: Option<RawRegex>,
    pub intervention: Option<InterventionPolicy>,
}

impl RawCheck {
    pub fn into_check(self) -> Result<Check, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidCheck {
            check: self.name.clone(),
            reason,
        };
        if self.name.trim().is_empty() {
            return Err(invalid("check name must not be empty".to_string()));
        }
        if self.command.trim().is_empty() {
            return Err(invalid("command must not be empty".to_string()));
        }

        let assertion = match (&self.response_contains, &self.regex) {
            (Some(_), Some(_)) => {
                return Err(invalid(
                    "response_contains and regex are mutually exclusive".to_string(),
                ));
            }
            (Some(substring), None) => Assertion::Contains(substring.clone()),
            (None, Some(raw)) => {
                let regex = Regex::new(&raw.expression)
                    .map_err(|e| invalid(format!("invalid regex: {e}")))?;
                if raw.index >= regex.captures_len() {
                    return Err(invalid(format!(
                        "capture index {} out of range, expression has {} groups",
                        raw.index,
                        regex.captures_len() - 1
                    )));
                }
                Assertion::Regex(RegexAssertion {
                    regex,
                    index: raw.index,
                    greater_than: raw.greater_than,
                    less_than: raw.less_than,
                    equals: raw.equals.clone(),
                })
            }
            (None, None) => Assertion::None,
        };

        Ok(Check {
            name: self.name,
            command: self.command,
            assertion,
            severity: self.severity,
            intervention: self.intervention,
        })
    }
}

fn into_checks(raw: Vec<RawCheck>) -> Result<Vec<Check>, ConfigError> {
    raw.into_iter().map(RawCheck::into_check).collect()
}

fn default_true() -> bool {
    true
}

fn default_ssh_port() -> u16 {
    22
}

#[derive(Debug, Deserialize)]
pub struct RawServer {
    pub name: String,
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    pub password: Option<String>,
    pub identity_file: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub severity: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub checks: Vec<RawCheck>,
    #[serde(default)]
    pub alerts: HashMap<String, bool>,
    pub interventions: Option<bool>,
}

impl RawServer {
    pub fn into_target(self) -> Result<ServerTarget, ConfigError> {
        let mut common = TargetCommon::new(self.name, self.enabled, self.severity);
        common.alerts = self.alerts;
        Ok(ServerTarget {
            common,
            host: self.host,
            port: self.port,
            credentials: Credentials {
                username: self.username,
                password: self.password,
                identity_file: self.identity_file,
            },
            groups: self.groups,
            checks: into_checks(self.checks)?,
            interventions: self.interventions,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct RawGroup {
    pub name: String,
    #[serde(default)]
    pub checks: Vec<RawCheck>,
}

impl RawGroup {
    pub fn into_group(self) -> Result<Group, ConfigError> {
        Ok(Group {
            name: self.name,
            checks: into_checks(self.checks)?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct RawWebsite {
    pub name: String,
    pub url: String,
    pub method: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub severity: Option<String>,
    #[serde(default)]
    pub status_code: u16,
    #[serde(default)]
    pub max_response_time_ms: f64,
    #[serde(default)]
    pub response_headers: BTreeMap<String, String>,
    #[serde(default)]
    pub request_headers: BTreeMap<String, String>,
    pub request_body: Option<String>,
    #[serde(default)]
    pub alerts: HashMap<String, bool>,
}

impl RawWebsite {
    pub fn into_target(self) -> Result<WebsiteTarget, ConfigError> {
        let method = match self.method.as_deref().map(str::to_ascii_uppercase).as_deref() {
            None | Some("") | Some("GET") => HttpMethod::Get,
            Some("POST") => HttpMethod::Post,
            Some(other) => {
                return Err(ConfigError::InvalidWebsite {
                    website: self.name,
                    reason: format!("unsupported method '{other}'"),
                });
            }
        };
        if self.url.trim().is_empty() {
            return Err(ConfigError::InvalidWebsite {
                website: self.name,
                reason: "url must not be empty".to_string(),
            });
        }

        let mut common = TargetCommon::new(self.name, self.enabled, self.severity);
        common.alerts = self.alerts;
        Ok(WebsiteTarget {
            common,
            url: self.url,
            method,
            status_code: self.status_code,
            max_response_time_ms: self.max_response_time_ms,
            response_headers: self.response_headers,
            request_headers: self.request_headers,
            request_body: self.request_body,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ServersFile {
    #[serde(default)]
    pub servers: Vec<RawServer>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GroupsFile {
    #[serde(default)]
    pub groups: Vec<RawGroup>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebsitesFile {
    #[serde(default)]
    pub websites: Vec<RawWebsite>,
}
