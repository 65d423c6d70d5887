use std::time::{Duration, Instant};

use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::CaptionError;

/// Everything needed to ask the service for one caption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionJob {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
    /// Already trimmed; `None` when the user left the field blank.
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptionResult {
    pub caption: String,
    /// Reported by the service.
    pub inference_time_seconds: f64,
    /// Measured here, dispatch to full body receipt.
    pub round_trip: Duration,
}

#[derive(Debug, Deserialize)]
struct CaptionResponse {
    #[serde(default)]
    success: bool,
    caption: Option<String>,
    inference_time: Option<f64>,
    error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub model_loaded: Option<bool>,
    /// Set by the client once the endpoint answered with a 2xx, whatever the
    /// body held.
    #[serde(skip_deserializing)]
    online: bool,
}

impl HealthStatus {
    pub fn offline() -> Self {
        Self {
            status: None,
            device: None,
            model_loaded: None,
            online: false,
        }
    }

    /// A reachable endpoint whose body carried nothing usable.
    pub fn reachable() -> Self {
        Self {
            online: true,
            ..Self::offline()
        }
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    /// Short device string for the status indicator.
    pub fn device_label(&self) -> String {
        match (&self.device, self.online) {
            (Some(device), true) => device.to_uppercase(),
            (_, true) => "unknown".to_string(),
            (_, false) => "offline".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model_name: String,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub model_loaded: bool,
    #[serde(default)]
    pub supported_formats: Vec<String>,
    #[serde(default)]
    pub max_file_size_mb: Option<u64>,
}

/// HTTP client for the captioning backend.
#[derive(Debug, Clone)]
pub struct CaptionClient {
    http: reqwest::Client,
    base_url: String,
}

impl CaptionClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sends one caption request. There is no retry and no timeout beyond the
    /// transport's own.
    pub async fn request_caption(&self, job: &CaptionJob) -> Result<CaptionResult, CaptionError> {
        let url = format!("{}/api/caption", self.base_url);

        let image = Part::bytes(job.bytes.clone())
            .file_name(job.file_name.clone())
            .mime_str(&job.content_type)?;
        let mut form = Form::new().part("image", image);
        if let Some(prompt) = job.prompt.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            form = form.text("prompt", prompt.to_string());
        }

        info!(
            "📤 Sending {} ({} bytes) to {}",
            job.file_name,
            job.bytes.len(),
            url
        );
        let started = Instant::now();
        let response = self.http.post(&url).multipart(form).send().await?;
        let status = response.status();
        let body = response.text().await?;
        let round_trip = started.elapsed();

        debug!(
            "caption response {}: {}",
            status,
            body.chars().take(500).collect::<String>()
        );

        if !status.is_success() {
            warn!("captioning service answered {}", status);
            return Err(CaptionError::Status(status));
        }

        let parsed: CaptionResponse =
            serde_json::from_str(&body).map_err(|e| CaptionError::Malformed(e.to_string()))?;

        if !parsed.success {
            let message = parsed
                .error
                .unwrap_or_else(|| "captioning service reported a failure".to_string());
            warn!("captioning service error: {}", message);
            return Err(CaptionError::Service(message));
        }

        let caption = parsed
            .caption
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| CaptionError::Malformed("no caption in response".to_string()))?;
        let inference_time_seconds = parsed
            .inference_time
            .ok_or_else(|| CaptionError::Malformed("no inference_time in response".to_string()))?;

        info!(
            "✅ Caption in {:.2}s (round trip {} ms): {}",
            inference_time_seconds,
            round_trip.as_millis(),
            caption
        );

        Ok(CaptionResult {
            caption,
            inference_time_seconds,
            round_trip,
        })
    }

    /// Asks the backend which device it runs on. Never fails: an unreachable
    /// endpoint or a non-2xx answer reads as offline; a 2xx answer is online
    /// even when the body lacks a device.
    pub async fn health(&self) -> HealthStatus {
        let url = format!("{}/health", self.base_url);
        let response = match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                warn!("health check returned {}", response.status());
                return HealthStatus::offline();
            }
            Err(e) => {
                warn!("health check failed: {}", e);
                return HealthStatus::offline();
            }
        };

        match response.json::<HealthStatus>().await {
            Ok(health) => HealthStatus {
                online: true,
                ..health
            },
            Err(e) => {
                warn!("health check body unreadable: {}", e);
                HealthStatus::reachable()
            }
        }
    }

    pub async fn model_info(&self) -> Result<ModelInfo, CaptionError> {
        let url = format!("{}/api/models/info", self.base_url);
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CaptionError::Status(status));
        }
        response
            .json::<ModelInfo>()
            .await
            .map_err(|e| CaptionError::Malformed(e.to_string()))
    }
}
