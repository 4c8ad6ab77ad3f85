//! Stability driver: synchronous multipart endpoints that return raw image
//! or 3D-model bytes directly in the HTTP response body. Stability backs
//! both an image provider role and, via its point-aware-3D endpoint, the
//! second 3D-model provider alongside Tripo.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;

use gateway_core::job::Operation;

use crate::driver::{Driver, DriverCapabilities, DriverInputs, DriverOutcome, PollResult};
use crate::error::{DriverError, DriverResult};

const BASE_URL: &str = "https://api.stability.ai";

pub struct StabilityDriver {
    client: Client,
    api_key: String,
    timeout: Duration,
    base_url: String,
}

impl StabilityDriver {
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
            Operation::TextToImage => Ok("/v2beta/stable-image/generate/core"),
            Operation::ImageToImage => Ok("/v2beta/stable-image/control/style"),
            Operation::SketchToImage => Ok("/v2beta/stable-image/control/sketch"),
            Operation::RemoveBackground => Ok("/v2beta/stable-image/edit/remove-background"),
            Operation::SearchAndRecolor => Ok("/v2beta/stable-image/edit/search-and-recolor"),
            Operation::Upscale => Ok("/v2beta/stable-image/upscale/fast"),
            Operation::ImageToModel => Ok("/v2beta/3d/stable-point-aware-3d"),
            other => Err(DriverError::InvalidInput(format!(
                "stability driver does not support {other:?}"
            ))),
        }
    }
}

#[async_trait]
impl Driver for StabilityDriver {
    async fn submit(&self, operation: Operation, inputs: DriverInputs) -> DriverResult<DriverOutcome> {
        let path = Self::path_for(operation)?;
        let mut form = Form::new();

        if let Some(bytes) = inputs.bytes.clone() {
            let filename = inputs.filename.clone().unwrap_or_else(|| "image.png".to_string());
            form = form.part("image", Part::bytes(bytes).file_name(filename));
        }

        if let Some(prompt) = inputs.param_str("prompt") {
            form = form.text("prompt", prompt.to_string());
        }
        if let Some(select_prompt) = inputs.param_str("select_prompt") {
            form = form.text("select_prompt", select_prompt.to_string());
        }
        let output_format = inputs.param_str("output_format").unwrap_or("png").to_string();
        form = form.text("output_format", output_format.clone());

        if operation == Operation::ImageToModel {
            for key in [
                "texture_resolution",
                "remesh",
                "foreground_ratio",
                "target_type",
                "target_count",
                "guidance_scale",
                "seed",
            ] {
                if let Some(value) = inputs.param_form_value(key) {
                    form = form.text(key, value);
                }
            }
        }

        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(&self.api_key)
            .header("accept", "image/*")
            .timeout(self.timeout)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Ok(DriverOutcome::Failed {
                reason: format!("stability returned {status}: {body}"),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("image/{output_format}"));

        let bytes = response.bytes().await?.to_vec();
        Ok(DriverOutcome::Synchronous { bytes, content_type, extra: Vec::new() })
    }

    async fn poll(
        &self,
        _operation: Operation,
        _provider_task_id: &str,
        _poll_url: Option<&str>,
    ) -> DriverResult<PollResult> {
        Err(DriverError::InvalidInput(
            "stability driver has no remote tasks to poll".into(),
        ))
    }

    fn capabilities(&self, operation: Operation) -> DriverCapabilities {
        DriverCapabilities {
            needs_input_bytes: !matches!(operation, Operation::TextToImage),
            is_synchronous: true,
            artifact_content_type_hint: if operation == Operation::ImageToModel {
                Some("model/gltf-binary")
            } else {
                Some("image/png")
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn unsupported_operation_is_rejected() {
        let driver = StabilityDriver::new("key", Duration::from_secs(5));
        let result = driver
            .submit(Operation::Inpaint, DriverInputs::default())
            .await;
        assert!(matches!(result, Err(DriverError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn text_to_image_returns_raw_bytes_as_synchronous() {
        let server = MockServer::start().await;
        let image_bytes = vec![9u8, 9, 9];
        Mock::given(method("POST"))
            .and(path("/v2beta/stable-image/generate/core"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(image_bytes.clone())
                    .insert_header("content-type", "image/png"),
            )
            .mount(&server)
            .await;

        let driver = StabilityDriver::new("key", Duration::from_secs(5)).with_base_url(server.uri());
        let mut params = serde_json::Map::new();
        params.insert("prompt".to_string(), serde_json::json!("a lighthouse"));
        let inputs = DriverInputs { params, ..Default::default() };

        let outcome = driver.submit(Operation::TextToImage, inputs).await.unwrap();
        match outcome {
            DriverOutcome::Synchronous { bytes, content_type, .. } => {
                assert_eq!(bytes, image_bytes);
                assert_eq!(content_type, "image/png");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
