//! Recraft driver: JSON or multipart submission returning a JSON envelope of
//! one or more image URLs. The driver fetches the first URL to bytes and
//! returns it as `Synchronous`, since the gateway's artifact pipeline wants
//! bytes, not a foreign URL, at the job boundary.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::{json, Value};

use gateway_core::job::Operation;

use crate::driver::{Driver, DriverCapabilities, DriverInputs, DriverOutcome, ExtraArtifact, PollResult};
use crate::error::{DriverError, DriverResult};

const BASE_URL: &str = "https://external.api.recraft.ai";

pub struct RecraftDriver {
    client: Client,
    api_key: String,
    timeout: Duration,
    base_url: String,
}

impl RecraftDriver {
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

    /// Registers a custom style from a reference image ahead of image-to-image
    /// generation. A provider-side convenience outside the job lifecycle, not
    /// a distinct operation, so it is exposed as a plain method rather than
    /// routed through `submit`.
    pub async fn create_custom_style(&self, reference_bytes: Vec<u8>) -> DriverResult<String> {
        let part = Part::bytes(reference_bytes).file_name("reference.png");
        let form = Form::new().part("file", part);
        let response = self
            .client
            .post(format!("{}/v1/styles", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .multipart(form)
            .send()
            .await?;
        let body: Value = response.json().await?;
        body["id"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| DriverError::UnexpectedResponse("missing style id in recraft response".into()))
    }

    async fn fetch_bytes(&self, url: &str) -> DriverResult<(Vec<u8>, Option<String>)> {
        let response = self.client.get(url).timeout(self.timeout).send().await?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        Ok((response.bytes().await?.to_vec(), content_type))
    }

    fn extract_urls(body: &Value) -> Vec<String> {
        body["data"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item["url"].as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl Driver for RecraftDriver {
    async fn submit(&self, operation: Operation, inputs: DriverInputs) -> DriverResult<DriverOutcome> {
        let (path, multipart) = match operation {
            Operation::ImageToImage => ("/v1/images/imageToImage", true),
            Operation::TextToImage => ("/v1/images/textToImage", false),
            Operation::RemoveBackground => ("/v1/images/removeBackground", true),
            Operation::Inpaint => ("/v1/images/inpaint", true),
            Operation::Upscale => ("/v1/images/crispUpscale", true),
            other => {
                return Err(DriverError::InvalidInput(format!(
                    "recraft driver does not support {other:?}"
                )))
            }
        };

        let response = if multipart {
            let mut form = Form::new();
            if let Some(bytes) = inputs.bytes.clone() {
                form = form.part("image", Part::bytes(bytes).file_name("image.png"));
            }
            if operation == Operation::Inpaint {
                let mask = inputs
                    .mask_bytes
                    .clone()
                    .ok_or_else(|| DriverError::InvalidInput("inpaint requires mask bytes".into()))?;
                form = form.part("mask", Part::bytes(mask).file_name("mask.png"));
            }
            if let Some(prompt) = inputs.param_str("prompt") {
                form = form.text("prompt", prompt.to_string());
            }
            if let Some(style) = inputs.param_str("style") {
                form = form.text("style", style.to_string());
            }
            self.client
                .post(format!("{}{path}", self.base_url))
                .bearer_auth(&self.api_key)
                .timeout(self.timeout)
                .multipart(form)
                .send()
                .await?
        } else {
            let mut body = json!({ "prompt": inputs.param_str("prompt").unwrap_or_default() });
            if let Some(style) = inputs.param_str("style") {
                body["style"] = Value::String(style.to_string());
            }
            self.client
                .post(format!("{}{path}", self.base_url))
                .bearer_auth(&self.api_key)
                .timeout(self.timeout)
                .json(&body)
                .send()
                .await?
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Ok(DriverOutcome::Failed {
                reason: format!("recraft returned {status}: {body}"),
            });
        }

        let body: Value = response.json().await?;
        let urls = Self::extract_urls(&body);
        let (first_url, rest) = urls
            .split_first()
            .ok_or_else(|| DriverError::UnexpectedResponse("no image urls in recraft response".into()))?;
        let (bytes, content_type) = self.fetch_bytes(first_url).await?;

        let mut extra = Vec::with_capacity(rest.len());
        for url in rest {
            let (bytes, content_type) = self.fetch_bytes(url).await?;
            extra.push(ExtraArtifact {
                bytes,
                content_type: content_type.unwrap_or_else(|| "image/png".to_string()),
            });
        }

        Ok(DriverOutcome::Synchronous {
            bytes,
            content_type: content_type.unwrap_or_else(|| "image/png".to_string()),
            extra,
        })
    }

    async fn poll(
        &self,
        _operation: Operation,
        _provider_task_id: &str,
        _poll_url: Option<&str>,
    ) -> DriverResult<PollResult> {
        Err(DriverError::InvalidInput(
            "recraft driver has no remote tasks to poll".into(),
        ))
    }

    fn capabilities(&self, operation: Operation) -> DriverCapabilities {
        DriverCapabilities {
            needs_input_bytes: !matches!(operation, Operation::TextToImage),
            is_synchronous: true,
            artifact_content_type_hint: Some("image/png"),
        }
    }
}
