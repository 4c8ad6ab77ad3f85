//! OpenAI driver: synchronous image edit via multipart upload. OpenAI's
//! image endpoints never return a remote task, so `poll` is unreachable in
//! practice.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::Value;
use tracing::instrument;

use gateway_core::job::Operation;

use crate::driver::{Driver, DriverCapabilities, DriverInputs, DriverOutcome, ExtraArtifact, PollResult};
use crate::error::{DriverError, DriverResult};

const IMAGE_EDIT_URL: &str = "https://api.openai.com/v1/images/edits";

pub struct OpenAiDriver {
    client: Client,
    api_key: String,
    timeout: Duration,
    base_url: String,
}

impl OpenAiDriver {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            timeout,
            base_url: IMAGE_EDIT_URL.to_string(),
        }
    }

    /// Overrides the image-edit endpoint, used in tests to point at a mock server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Driver for OpenAiDriver {
    #[instrument(skip(self, inputs))]
    async fn submit(&self, operation: Operation, inputs: DriverInputs) -> DriverResult<DriverOutcome> {
        if operation != Operation::ImageToImage {
            return Err(DriverError::InvalidInput(format!(
                "openai driver does not support {operation:?}"
            )));
        }

        let bytes = inputs
            .bytes
            .ok_or_else(|| DriverError::InvalidInput("openai image edit requires input bytes".into()))?;
        let filename = inputs.filename.unwrap_or_else(|| "image.png".to_string());
        let prompt = inputs
            .param_str("prompt")
            .ok_or_else(|| DriverError::InvalidInput("missing prompt".into()))?
            .to_string();
        let size = inputs.param_str("size").unwrap_or("auto").to_string();
        let n = inputs.param_form_value("n").unwrap_or_else(|| "1".to_string());

        let image_part = Part::bytes(bytes)
            .file_name(filename)
            .mime_str("image/png")
            .map_err(|e| DriverError::InvalidInput(e.to_string()))?;

        let mut form = Form::new()
            .part("image", image_part)
            .text("prompt", prompt)
            .text("model", "gpt-image-1")
            .text("n", n)
            .text("size", size);

        if let Some(background) = inputs.param_str("background") {
            form = form.text("background", background.to_string());
        }

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Ok(DriverOutcome::Failed {
                reason: format!("openai returned {status}: {body}"),
            });
        }

        let body: Value = response.json().await?;
        let images = body["data"]
            .as_array()
            .ok_or_else(|| DriverError::UnexpectedResponse("missing data array".into()))?;
        if images.is_empty() {
            return Err(DriverError::UnexpectedResponse("openai returned no images".into()));
        }

        let mut decoded_images = Vec::with_capacity(images.len());
        for image in images {
            let b64 = image["b64_json"]
                .as_str()
                .ok_or_else(|| DriverError::UnexpectedResponse("missing data[].b64_json".into()))?;
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(b64)
                .map_err(|e| DriverError::UnexpectedResponse(format!("invalid base64 image data: {e}")))?;
            decoded_images.push(decoded);
        }

        // Only index 0 becomes the job's primary asset_url; the rest ride
        // along as extra artifacts recorded under metadata.extra_asset_urls.
        let mut decoded_images = decoded_images.into_iter();
        let bytes = decoded_images.next().expect("checked non-empty above");
        let extra = decoded_images
            .map(|bytes| ExtraArtifact { bytes, content_type: "image/png".to_string() })
            .collect();

        Ok(DriverOutcome::Synchronous {
            bytes,
            content_type: "image/png".to_string(),
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
            "openai driver has no remote tasks to poll".into(),
        ))
    }

    fn capabilities(&self, _operation: Operation) -> DriverCapabilities {
        DriverCapabilities {
            needs_input_bytes: true,
            is_synchronous: true,
            artifact_content_type_hint: Some("image/png"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_inputs(prompt: &str) -> DriverInputs {
        let mut params = serde_json::Map::new();
        params.insert("prompt".to_string(), json!(prompt));
        DriverInputs {
            bytes: Some(vec![1, 2, 3, 4]),
            filename: Some("input.png".to_string()),
            params,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn submit_without_bytes_is_rejected() {
        let driver = OpenAiDriver::new("key", Duration::from_secs(5));
        let inputs = DriverInputs {
            params: {
                let mut p = serde_json::Map::new();
                p.insert("prompt".to_string(), json!("a cat"));
                p
            },
            ..Default::default()
        };
        let result = driver.submit(Operation::ImageToImage, inputs).await;
        assert!(matches!(result, Err(DriverError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn unsupported_operation_is_rejected() {
        let driver = OpenAiDriver::new("key", Duration::from_secs(5));
        let result = driver.submit(Operation::TextToImage, make_inputs("a cat")).await;
        assert!(matches!(result, Err(DriverError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn non_success_status_yields_failed_outcome() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/edits"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .mount(&server)
            .await;

        let driver = OpenAiDriver::new("key", Duration::from_secs(5))
            .with_base_url(format!("{}/edits", server.uri()));
        let outcome = driver
            .submit(Operation::ImageToImage, make_inputs("a cat"))
            .await
            .unwrap();
        assert!(matches!(outcome, DriverOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn success_decodes_base64_image() {
        let server = MockServer::start().await;
        let image_bytes = vec![5u8, 6, 7, 8];
        let b64 = base64::engine::general_purpose::STANDARD.encode(&image_bytes);
        Mock::given(method("POST"))
            .and(path("/edits"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "b64_json": b64 }]
            })))
            .mount(&server)
            .await;

        let driver = OpenAiDriver::new("key", Duration::from_secs(5))
            .with_base_url(format!("{}/edits", server.uri()));
        let outcome = driver
            .submit(Operation::ImageToImage, make_inputs("a cat"))
            .await
            .unwrap();
        match outcome {
            DriverOutcome::Synchronous { bytes, content_type, extra } => {
                assert_eq!(bytes, image_bytes);
                assert_eq!(content_type, "image/png");
                assert!(extra.is_empty());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn n_greater_than_one_surfaces_remaining_images_as_extra() {
        let server = MockServer::start().await;
        let first = vec![1u8, 2, 3];
        let second = vec![4u8, 5, 6];
        let b64_first = base64::engine::general_purpose::STANDARD.encode(&first);
        let b64_second = base64::engine::general_purpose::STANDARD.encode(&second);
        Mock::given(method("POST"))
            .and(path("/edits"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "b64_json": b64_first }, { "b64_json": b64_second }]
            })))
            .mount(&server)
            .await;

        let mut params = serde_json::Map::new();
        params.insert("prompt".to_string(), json!("a cat"));
        params.insert("n".to_string(), json!(2));
        let inputs = DriverInputs {
            bytes: Some(vec![1, 2, 3, 4]),
            filename: Some("input.png".to_string()),
            params,
            ..Default::default()
        };

        let driver = OpenAiDriver::new("key", Duration::from_secs(5))
            .with_base_url(format!("{}/edits", server.uri()));
        let outcome = driver.submit(Operation::ImageToImage, inputs).await.unwrap();

        match outcome {
            DriverOutcome::Synchronous { bytes, extra, .. } => {
                assert_eq!(bytes, first);
                assert_eq!(extra.len(), 1);
                assert_eq!(extra[0].bytes, second);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
