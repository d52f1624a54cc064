use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;

/// One named command run against a server.
#[derive(Debug, Clone)]
pub struct Check {
    pub name: String,
    pub command: String,
    pub assertion: Assertion,
    /// Overrides the server's severity policy when it names a known policy.
    pub severity: Option<String>,
    pub intervention: Option<InterventionPolicy>,
}

/// How a successful command's output is judged. Exactly one mode per check.
#[derive(Debug, Clone)]
pub enum Assertion {
    /// The command succeeding is enough.
    None,
    /// Raw output must contain the substring.
    Contains(String),
    Regex(RegexAssertion),
}

#[derive(Debug, Clone)]
pub struct RegexAssertion {
    pub regex: Regex,
    /// Capture group evaluated on every match.
    pub index: usize,
    pub greater_than: Option<f64>,
    pub less_than: Option<f64>,
    pub equals: Option<String>,
}

/// Remedial command attached to a check.
#[derive(Debug, Clone, Deserialize)]
pub struct InterventionPolicy {
    pub command: String,
    #[serde(default)]
    pub stop_when_severe: bool,
    /// Minimum minutes between two interventions for the same check. Zero
    /// disables the cooldown.
    #[serde(default)]
    pub cooldown_minutes: u64,
}

/// A named set of checks that servers inherit by membership.
#[derive(Debug, Clone)]
pub struct Group {
    pub name: String,
    pub checks: Vec<Check>,
}

/// Windowed failure thresholds for alerting and intervention.
#[derive(Debug, Clone, Deserialize)]
pub struct SeverityPolicy {
    #[serde(skip)]
    pub name: String,
    pub window_minutes: u64,
    pub failure_threshold_percent: f64,
    #[serde(default = "default_intervention_threshold")]
    pub intervention_threshold_percent: f64,
    pub alert_resend_minutes: u64,
    /// Per-channel enablement applied when a target has no override.
    #[serde(default)]
    pub alerts: HashMap<String, bool>,
}

fn default_intervention_threshold() -> f64 {
    // Without an explicit threshold interventions never fire.
    100.0
}
