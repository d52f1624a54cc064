//! Core monitoring entities: targets, checks, severity policies.
//!
//! Everything in here is immutable once built by the config loader, with the
//! exception of the per-target [`InProgress`] flag which the scheduler and the
//! running check task share.

pub mod check;
pub mod in_progress;
pub mod target;

pub use check::{Assertion, Check, Group, InterventionPolicy, RegexAssertion, SeverityPolicy};
pub use in_progress::{InProgress, RunGuard};
pub use target::{
    Credentials, HttpMethod, ServerTarget, Target, TargetCommon, TargetKind, WebsiteTarget,
};

/// Check name used for the standing "not connected" failure of a server.
pub const CONNECTION_CHECK_NAME: &str = "connection";

/// Lower-cases a name and collapses whitespace runs into single hyphens.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}

/// Correlation key for one check on one server.
pub fn server_test_id(server_name: &str, check_name: &str) -> String {
    format!(
        "server:{}:{}",
        normalize_name(server_name),
        normalize_name(check_name)
    )
}

/// Correlation key for a website target (one implicit check per website).
pub fn website_test_id(website_name: &str) -> String {
    format!("website:{}", normalize_name(website_name))
}
