//! `suitedbot sweep`: ask a running server to run the auto-approval sweeper.
//!
//! Meant to be invoked from cron. Exits non-zero when the server refuses the
//! call or cannot be reached.

use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error("could not reach {url}: {source}")]
    Unreachable { url: String, source: ureq::Error },
    #[error("unreadable response from {url}: {source}")]
    Body { url: String, source: ureq::Error },
    #[error("server returned {status}: {message}")]
    Refused { status: u16, message: String },
}

pub fn sweeper_url(base_url: &str) -> String {
    format!(
        "{}/cron/auto-approve-submissions",
        base_url.trim_end_matches('/')
    )
}

/// POST the sweeper endpoint and return the server's report.
pub fn trigger(base_url: &str, secret: &str) -> Result<Value, SweepError> {
    let url = sweeper_url(base_url);
    let config = ureq::Agent::config_builder()
        .http_status_as_error(false)
        .build();
    let agent = ureq::Agent::new_with_config(config);

    let response = agent
        .post(&url)
        .header("Authorization", &format!("Bearer {secret}"))
        .send_empty()
        .map_err(|source| SweepError::Unreachable {
            url: url.clone(),
            source,
        })?;
    let status = response.status().as_u16();
    let body: Value = response
        .into_body()
        .read_json()
        .map_err(|source| SweepError::Body {
            url: url.clone(),
            source,
        })?;

    if status != 200 || body["success"] != true {
        let message = body["error"].as_str().unwrap_or("unknown error").to_string();
        return Err(SweepError::Refused { status, message });
    }
    Ok(body)
}
