//! Pass/fail classification of a server check's command outcome.

use std::collections::HashSet;

use crate::model::{Assertion, Check, RegexAssertion};
use crate::remote::RemoteError;

/// Returns the failure reasons for one command outcome; empty means passed.
///
/// A transport or command error always fails. Otherwise only the check's
/// single assertion mode is evaluated.
pub fn evaluate(check: &Check, outcome: &Result<String, RemoteError>) -> Vec<String> {
    let output = match outcome {
        Ok(output) => output,
        Err(e) => return vec![format!("Failed to run check '{}': {}", check.name, e)],
    };

    match &check.assertion {
        Assertion::None => Vec::new(),
        Assertion::Contains(expected) => {
            if output.contains(expected.as_str()) {
                Vec::new()
            } else {
                vec![format!("'{}' failed with response: {}", check.name, output)]
            }
        }
        Assertion::Regex(regex) => evaluate_regex(&check.name, regex, output),
    }
}

fn evaluate_regex(check_name: &str, assertion: &RegexAssertion, output: &str) -> Vec<String> {
    let mut reasons = Vec::new();
    let mut seen = HashSet::new();
    let mut push = |reason: String| {
        if seen.insert(reason.clone()) {
            reasons.push(reason);
        }
    };

    for captures in assertion.regex.captures_iter(output) {
        let Some(value) = captures.get(assertion.index).map(|m| m.as_str()) else {
            push(format!(
                "'{check_name}' has no capture group {}",
                assertion.index
            ));
            continue;
        };

        if assertion.greater_than.is_some() || assertion.less_than.is_some() {
            match value.trim().parse::<f64>() {
                Ok(number) => {
                    if let Some(min) = assertion.greater_than {
                        if number <= min {
                            push(format!("'{check_name}' is less than '{min}': {value}"));
                        }
                    }
                    if let Some(max) = assertion.less_than {
                        if number >= max {
                            push(format!("'{check_name}' is greater than '{max}': {value}"));
                        }
                    }
                }
                Err(_) => push(format!("'{check_name}' expected a number: {value}")),
            }
        }

        if let Some(expected) = &assertion.equals {
            if value != expected {
                push(format!("'{check_name}' does not equal '{expected}': {value}"));
            }
        }
    }

    reasons
}
