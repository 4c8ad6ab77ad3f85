//! Flux driver: JSON submission that returns a remote task immediately. The
//! submission response itself carries the poll URL, so there is no
//! separate "create task then look up poll endpoint" round trip.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde_json::{json, Value};

use gateway_core::job::Operation;

use crate::driver::{ArtifactRef, Driver, DriverCapabilities, DriverInputs, DriverOutcome, PollResult};
use crate::error::{DriverError, DriverResult};

const BASE_URL: &str = "https://api.bfl.ai";

pub struct FluxDriver {
    client: Client,
    api_key: String,
    timeout: Duration,
    base_url: String,
}

impl FluxDriver {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            timeout,
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn path_for(operation: Operation) -> DriverResult<&'static str> {
        match operation {
            Operation::ImageToImage => Ok("/v1/flux-kontext-pro"),
            Operation::TextToImage => Ok("/v1/flux-pro"),
            other => Err(DriverError::InvalidInput(format!(
                "flux driver does not support {other:?}"
            ))),
        }
    }
}

#[async_trait]
impl Driver for FluxDriver {
    async fn submit(&self, operation: Operation, inputs: DriverInputs) -> DriverResult<DriverOutcome> {
        let path = Self::path_for(operation)?;
        let prompt = inputs.param_str("prompt").unwrap_or_default().to_string();
        let mut body = json!({ "prompt": prompt });

        if operation == Operation::ImageToImage {
            let bytes = inputs
                .bytes
                .ok_or_else(|| DriverError::InvalidInput("flux image-to-image requires input bytes".into()))?;
            body["input_image"] = Value::String(base64::engine::general_purpose::STANDARD.encode(bytes));
        }

        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .header("x-key", &self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Ok(DriverOutcome::Failed {
                reason: format!("flux returned {status}: {text}"),
            });
        }

        let body: Value = response.json().await?;
        let provider_task_id = body["id"]
            .as_str()
            .ok_or_else(|| DriverError::UnexpectedResponse("missing id in flux submission response".into()))?
            .to_string();
        let poll_url = body["polling_url"].as_str().map(|s| s.to_string());

        Ok(DriverOutcome::RemoteTask { provider_task_id, poll_url })
    }

    async fn poll(
        &self,
        _operation: Operation,
        provider_task_id: &str,
        poll_url: Option<&str>,
    ) -> DriverResult<PollResult> {
        let url = poll_url
            .ok_or_else(|| DriverError::InvalidInput(format!("no poll url recorded for flux task {provider_task_id}")))?;

        let response = self
            .client
            .get(url)
            .header("x-key", &self.api_key)
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(DriverError::UnexpectedResponse(format!("flux poll returned {status}")));
        }

        let body: Value = response.json().await?;
        let status = body["status"].as_str().unwrap_or("Pending");

        match status {
            "Ready" => {
                let url = body["result"]["sample"]
                    .as_str()
                    .or_else(|| body["result"].as_str())
                    .ok_or_else(|| DriverError::UnexpectedResponse("flux ready response has no sample url".into()))?
                    .to_string();
                Ok(PollResult::Ready { artifact_ref: ArtifactRef::Url(url) })
            }
            "Error" | "Failed" => {
                let reason = body["error"].as_str().unwrap_or("flux task failed").to_string();
                Ok(PollResult::Failed { reason })
            }
            _ => Ok(PollResult::InProgress { progress_percent: 0 }),
        }
    }

    fn capabilities(&self, operation: Operation) -> DriverCapabilities {
        DriverCapabilities {
            needs_input_bytes: matches!(operation, Operation::ImageToImage),
            is_synchronous: false,
            artifact_content_type_hint: Some("image/png"),
        }
    }
}
