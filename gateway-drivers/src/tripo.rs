//! Tripo driver: JSON task submission plus a dedicated status-poll endpoint.
//! Image operations carry an already-ingested BlobStore URL and a file-type
//! tag rather than raw bytes; multiview assembles a fixed four-slot
//! `[front, left, back, right]` sequence, with only the front slot mandatory.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use gateway_core::job::Operation;

use crate::driver::{ArtifactRef, Driver, DriverCapabilities, DriverInputs, DriverOutcome, PollResult};
use crate::error::{DriverError, DriverResult};

const BASE_URL: &str = "https://api.tripo3d.ai/v2/openapi";

pub struct TripoDriver {
    client: Client,
    api_key: String,
    timeout: Duration,
    base_url: String,
}

impl TripoDriver {
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

    fn file_type_for(filename: &str) -> &'static str {
        if filename.to_lowercase().ends_with(".png") {
            "png"
        } else {
            "jpg"
        }
    }

    fn file_slot(url: &str, filename: &str) -> Value {
        json!({ "type": Self::file_type_for(filename), "url": url })
    }

    async fn call_task(&self, task_type: &str, mut payload: Value) -> DriverResult<DriverOutcome> {
        payload["type"] = Value::String(task_type.to_string());

        let response = self
            .client
            .post(format!("{}/task", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Ok(DriverOutcome::Failed {
                reason: format!("tripo returned {status}: {body}"),
            });
        }

        let body: Value = response.json().await?;
        let code = body["code"].as_i64().unwrap_or(-1);
        if code != 0 {
            let message = body["message"].as_str().unwrap_or("unknown tripo error").to_string();
            return Ok(DriverOutcome::Failed { reason: message });
        }

        let task_id = body["data"]["task_id"]
            .as_str()
            .ok_or_else(|| DriverError::UnexpectedResponse("missing data.task_id in tripo response".into()))?
            .to_string();

        Ok(DriverOutcome::RemoteTask { provider_task_id: task_id, poll_url: None })
    }

    fn extract_model_url(data: &Value) -> Option<String> {
        let output = &data["output"];
        for key in ["pbr_model", "base_model", "model"] {
            if let Some(url) = output[key].as_str() {
                return Some(url.to_string());
            }
        }
        let result = &data["result"];
        for key in ["pbr_model", "base_model", "model"] {
            if let Some(url) = result[key]["url"].as_str() {
                return Some(url.to_string());
            }
        }
        None
    }
}

#[async_trait]
impl Driver for TripoDriver {
    async fn submit(&self, operation: Operation, inputs: DriverInputs) -> DriverResult<DriverOutcome> {
        match operation {
            Operation::TextToModel => {
                let prompt = inputs
                    .param_str("prompt")
                    .ok_or_else(|| DriverError::InvalidInput("text_to_model requires a prompt".into()))?
                    .to_string();
                self.call_task("text_to_model", json!({ "prompt": prompt })).await
            }
            Operation::ImageToModel if !inputs.multiview => {
                let url = inputs
                    .image_urls
                    .first()
                    .ok_or_else(|| DriverError::InvalidInput("image_to_model requires at least one image url".into()))?;
                let filename = inputs.filename.as_deref().unwrap_or("image.jpg");
                let file = Self::file_slot(url, filename);
                self.call_task("image_to_model", json!({ "file": file })).await
            }
            Operation::ImageToModel => {
                if inputs.image_urls.is_empty() {
                    return Err(DriverError::InvalidInput(
                        "multiview_to_model requires at least a front view".into(),
                    ));
                }
                let filename = inputs.filename.as_deref().unwrap_or("image.jpg");
                let mut slots = Vec::with_capacity(4);
                for i in 0..4 {
                    match inputs.image_urls.get(i) {
                        Some(url) => slots.push(Self::file_slot(url, filename)),
                        None => slots.push(json!({})),
                    }
                }
                self.call_task("multiview_to_model", json!({ "files": slots })).await
            }
            Operation::RefineModel => {
                let draft_task_id = inputs
                    .param_str("draft_model_task_id")
                    .ok_or_else(|| DriverError::InvalidInput("refine_model requires draft_model_task_id".into()))?
                    .to_string();
                self.call_task("refine_model", json!({ "draft_model_task_id": draft_task_id })).await
            }
            other => Err(DriverError::InvalidInput(format!("tripo driver does not support {other:?}"))),
        }
    }

    async fn poll(
        &self,
        _operation: Operation,
        provider_task_id: &str,
        _poll_url: Option<&str>,
    ) -> DriverResult<PollResult> {
        let response = self
            .client
            .get(format!("{}/task/{provider_task_id}", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(DriverError::UnexpectedResponse(format!("tripo poll returned {status}")));
        }

        let body: Value = response.json().await?;
        let data = &body["data"];
        let status = data["status"].as_str().unwrap_or("unknown");
        let progress = data["progress"].as_u64().unwrap_or(0) as u8;

        match status {
            "queued" | "running" => Ok(PollResult::InProgress { progress_percent: progress }),
            "success" => {
                let url = Self::extract_model_url(data)
                    .ok_or_else(|| DriverError::UnexpectedResponse("tripo task succeeded with no model url".into()))?;
                Ok(PollResult::Ready { artifact_ref: ArtifactRef::Url(url) })
            }
            "failed" | "cancelled" => {
                let reason = data["error"].as_str().unwrap_or(status).to_string();
                Ok(PollResult::Failed { reason })
            }
            _ => {
                if progress == 100 {
                    match Self::extract_model_url(data) {
                        Some(url) => Ok(PollResult::Ready { artifact_ref: ArtifactRef::Url(url) }),
                        None => Ok(PollResult::InProgress { progress_percent: 100 }),
                    }
                } else {
                    Ok(PollResult::InProgress { progress_percent: progress })
                }
            }
        }
    }

    fn capabilities(&self, operation: Operation) -> DriverCapabilities {
        DriverCapabilities {
            needs_input_bytes: false,
            is_synchronous: false,
            artifact_content_type_hint: if operation == Operation::TextToModel {
                None
            } else {
                Some("model/gltf-binary")
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
    async fn multiview_with_only_front_view_fills_empty_slots() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/task"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 0,
                "data": { "task_id": "mv-1" }
            })))
            .mount(&server)
            .await;

        let driver = TripoDriver::new("key", Duration::from_secs(5)).with_base_url(server.uri());
        let inputs = DriverInputs {
            image_urls: vec!["https://blob.example/front.jpg".to_string()],
            filename: Some("front.jpg".to_string()),
            multiview: true,
            ..Default::default()
        };
        let outcome = driver.submit(Operation::ImageToModel, inputs).await.unwrap();
        match outcome {
            DriverOutcome::RemoteTask { provider_task_id, .. } => assert_eq!(provider_task_id, "mv-1"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn multiview_with_zero_urls_is_rejected() {
        let driver = TripoDriver::new("key", Duration::from_secs(5));
        let inputs = DriverInputs { multiview: true, ..Default::default() };
        let result = driver.submit(Operation::ImageToModel, inputs).await;
        assert!(matches!(result, Err(DriverError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn poll_maps_success_to_ready_via_pbr_model_priority() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/task/t1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {
                    "status": "success",
                    "progress": 100,
                    "output": { "pbr_model": "https://cdn.example/pbr.glb", "base_model": "https://cdn.example/base.glb" }
                }
            })))
            .mount(&server)
            .await;

        let driver = TripoDriver::new("key", Duration::from_secs(5)).with_base_url(server.uri());
        let result = driver.poll(Operation::ImageToModel, "t1", None).await.unwrap();
        match result {
            PollResult::Ready { artifact_ref: ArtifactRef::Url(url) } => {
                assert_eq!(url, "https://cdn.example/pbr.glb");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn poll_treats_unknown_status_with_full_progress_as_ready_when_url_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/task/t2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {
                    "status": "unknown",
                    "progress": 100,
                    "output": { "model": "https://cdn.example/model.glb" }
                }
            })))
            .mount(&server)
            .await;

        let driver = TripoDriver::new("key", Duration::from_secs(5)).with_base_url(server.uri());
        let result = driver.poll(Operation::ImageToModel, "t2", None).await.unwrap();
        assert!(matches!(result, PollResult::Ready { .. }));
    }

    #[tokio::test]
    async fn poll_treats_unknown_status_with_partial_progress_as_in_progress() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/task/t3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "status": "unknown", "progress": 40 }
            })))
            .mount(&server)
            .await;

        let driver = TripoDriver::new("key", Duration::from_secs(5)).with_base_url(server.uri());
        let result = driver.poll(Operation::ImageToModel, "t3", None).await.unwrap();
        assert!(matches!(result, PollResult::InProgress { progress_percent: 40 }));
    }
}
