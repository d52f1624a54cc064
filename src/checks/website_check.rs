use super::http_probe::{HttpRequestSpec, HttpResponse, ProbeError};
use crate::model::WebsiteTarget;

pub fn request_spec(website: &WebsiteTarget) -> HttpRequestSpec {
    HttpRequestSpec {
        method: website.method,
        url: website.url.clone(),
        headers: website.request_headers.clone(),
        body: website.request_body.clone(),
    }
}

/// Returns every unmet expectation of `website` for one probe outcome.
pub fn evaluate_website(
    website: &WebsiteTarget,
    outcome: &Result<HttpResponse, ProbeError>,
) -> Vec<String> {
    let response = match outcome {
        Ok(response) => response,
        Err(e) => return vec![format!("Failed request: {e}")],
    };

    let mut reasons = Vec::new();
    if website.status_code != 0 && response.status != website.status_code {
        reasons.push(format!(
            "Status code - expected '{}', got '{}'",
            website.status_code, response.status
        ));
    }
    if website.max_response_time_ms > 0.0 && response.elapsed_ms > website.max_response_time_ms {
        reasons.push(format!(
            "Response time - expected below '{}' ms, took '{:.0}' ms",
            website.max_response_time_ms, response.elapsed_ms
        ));
    }
    for (header, expected) in &website.response_headers {
        match (expected.is_empty(), response.header(header)) {
            (true, Some(_)) => reasons.push(format!("Header '{header}' should not exist")),
            (true, None) => {}
            (false, actual) if actual != Some(expected.as_str()) => {
                reasons.push(format!(
                    "Header '{header}' - expected '{expected}', got '{}'",
                    actual.unwrap_or_default()
                ));
            }
            (false, _) => {}
        }
    }
    reasons
}
