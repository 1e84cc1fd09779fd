use anyhow::{Context, Result, anyhow};
use log::{info, warn};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;

use crate::config::Settings;
use crate::model::{CallbackTarget, Outcome, ResponseStatus};

/// Delivers the terminal outcome of an invocation to its caller.
pub trait OutcomeReporter: Send + Sync {
    /// Makes a single delivery attempt.
    fn report(&self, target: &CallbackTarget, outcome: &Outcome) -> Result<()>;
}

/// Response document expected by CloudFormation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CallbackResponse<'a> {
    status: ResponseStatus,
    reason: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    physical_resource_id: Option<&'a str>,
    stack_id: &'a str,
    request_id: &'a str,
    logical_resource_id: &'a str,
}

pub fn response_body(target: &CallbackTarget, outcome: &Outcome) -> Result<Vec<u8>> {
    let response = CallbackResponse {
        status: outcome.status,
        reason: &outcome.reason,
        physical_resource_id: outcome.physical_id.as_ref().map(|id| id.as_str()),
        stack_id: &target.stack_id,
        request_id: &target.request_id,
        logical_resource_id: &target.logical_resource_id,
    };
    serde_json::to_vec(&response).context("Failed to serialize callback response")
}

/// PUTs the outcome to the pre-signed `ResponseURL`.
pub struct HttpOutcomeReporter {
    client: Client,
}

impl HttpOutcomeReporter {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.http_timeout)
            .build()
            .context("Failed to build callback HTTP client")?;
        Ok(Self { client })
    }
}

impl OutcomeReporter for HttpOutcomeReporter {
    fn report(&self, target: &CallbackTarget, outcome: &Outcome) -> Result<()> {
        let body = response_body(target, outcome)?;
        info!(
            "[callback] Sending {:?} for {} to CloudFormation",
            outcome.status, target.logical_resource_id
        );
        // The pre-signed URL is signed without a content type.
        let response = self
            .client
            .put(&target.response_url)
            .header(CONTENT_TYPE, "")
            .body(body)
            .send()
            .context("Failed to deliver CloudFormation response")?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().ok().filter(|text| !text.trim().is_empty());
            warn!("[callback] Response rejected with status {}", status);
            return Err(status_error(status, text));
        }
        Ok(())
    }
}

fn status_error(status: StatusCode, body: Option<String>) -> anyhow::Error {
    if status == StatusCode::FORBIDDEN {
        return anyhow!("CloudFormation response URL rejected the request: {status}");
    }
    if let Some(body) = body {
        return anyhow!("CloudFormation response callback error: {body}");
    }
    anyhow!("CloudFormation response callback error: {status}")
}
