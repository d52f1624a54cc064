use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use super::check::{Check, Group};
use super::in_progress::InProgress;
use super::{server_test_id, website_test_id};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Server,
    Website,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Server => "server",
            TargetKind::Website => "website",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields shared by every target variant.
#[derive(Debug)]
pub struct TargetCommon {
    pub name: String,
    pub enabled: bool,
    pub severity: Option<String>,
    /// Per-channel overrides keyed by channel name.
    pub alerts: HashMap<String, bool>,
    pub in_progress: Arc<InProgress>,
}

impl TargetCommon {
    pub fn new(name: String, enabled: bool, severity: Option<String>) -> Self {
        Self {
            name,
            enabled,
            severity,
            alerts: HashMap::new(),
            in_progress: InProgress::new(),
        }
    }

    /// The target's explicit choice for a channel, if any.
    pub fn alert_override(&self, channel: &str) -> Option<bool> {
        self.alerts.get(channel).copied()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
    pub identity_file: Option<PathBuf>,
}

#[derive(Debug)]
pub struct ServerTarget {
    pub common: TargetCommon,
    pub host: String,
    pub port: u16,
    pub credentials: Credentials,
    pub groups: Vec<String>,
    pub checks: Vec<Check>,
    /// Overrides the global intervention switch for this server.
    pub interventions: Option<bool>,
}

impl ServerTarget {
    /// Group checks overridden by direct checks, keyed and ordered by name.
    pub fn effective_checks<'a>(&'a self, groups: &'a HashMap<String, Group>) -> Vec<&'a Check> {
        let mut merged: BTreeMap<&str, &Check> = BTreeMap::new();
        for group_name in &self.groups {
            if let Some(group) = groups.get(group_name) {
                for check in &group.checks {
                    merged.insert(check.name.as_str(), check);
                }
            }
        }
        for check in &self.checks {
            merged.insert(check.name.as_str(), check);
        }
        merged.into_values().collect()
    }

    pub fn test_id(&self, check_name: &str) -> String {
        server_test_id(&self.common.name, check_name)
    }

    pub fn interventions_enabled(&self, global: bool) -> bool {
        self.interventions.unwrap_or(global)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

#[derive(Debug)]
pub struct WebsiteTarget {
    pub common: TargetCommon,
    pub url: String,
    pub method: HttpMethod,
    /// Zero means "any status".
    pub status_code: u16,
    /// Zero means "no budget".
    pub max_response_time_ms: f64,
    /// Expected response headers. An empty value means the header must be absent.
    pub response_headers: BTreeMap<String, String>,
    pub request_headers: BTreeMap<String, String>,
    pub request_body: Option<String>,
}

impl WebsiteTarget {
    pub fn test_id(&self) -> String {
        website_test_id(&self.common.name)
    }
}

/// A unit of scheduling.
#[derive(Debug, Clone)]
pub enum Target {
    Server(Arc<ServerTarget>),
    Website(Arc<WebsiteTarget>),
}

impl Target {
    pub fn common(&self) -> &TargetCommon {
        match self {
            Target::Server(server) => &server.common,
            Target::Website(website) => &website.common,
        }
    }

    pub fn kind(&self) -> TargetKind {
        match self {
            Target::Server(_) => TargetKind::Server,
            Target::Website(_) => TargetKind::Website,
        }
    }

    pub fn name(&self) -> &str {
        &self.common().name
    }
}
