//! Hosted image uploads, used for profile avatars.

use std::time::Duration;

use async_trait::async_trait;
use parley_shared::constants::{HOSTED_IMAGE_TYPES, MAX_IMAGE_FILE_SIZE};
use parley_shared::image::ImageFile;
use parley_shared::ImageError;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{ClientError, Result};

#[async_trait]
pub trait ImageHost: Send + Sync {
    /// Upload an image and return its public URL.
    async fn upload(&self, file: &ImageFile) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
}

#[derive(Debug, Deserialize)]
struct UploadErrorBody {
    message: Option<String>,
}

/// Multipart uploader for an unsigned-preset image host.
pub struct HttpImageHost {
    client: reqwest::Client,
    endpoint: String,
    upload_preset: String,
    timeout: Duration,
}

impl HttpImageHost {
    pub fn new(endpoint: impl Into<String>, upload_preset: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            upload_preset: upload_preset.into(),
            timeout,
        }
    }

    fn validate(file: &ImageFile) -> std::result::Result<(), ImageError> {
        if !HOSTED_IMAGE_TYPES.contains(&file.mime_type.as_str()) {
            return Err(ImageError::InvalidFile(format!(
                "{} not accepted, only JPEG, PNG and WebP",
                file.mime_type
            )));
        }
        if file.bytes.is_empty() {
            return Err(ImageError::InvalidFile("empty file".into()));
        }
        if file.size() > MAX_IMAGE_FILE_SIZE {
            return Err(ImageError::InvalidFile(format!(
                "{} bytes exceeds the 5MB limit",
                file.size()
            )));
        }
        Ok(())
    }

    async fn send(&self, file: &ImageFile) -> Result<String> {
        let part = Part::bytes(file.bytes.clone())
            .file_name(file.name.clone())
            .mime_str(&file.mime_type)
            .map_err(|e| ClientError::Upload(e.to_string()))?;
        let form = Form::new()
            .part("file", part)
            .text("upload_preset", self.upload_preset.clone());

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ClientError::Upload(format!("network error: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<UploadErrorBody>()
                .await
                .ok()
                .and_then(|b| b.message)
                .unwrap_or_else(|| format!("HTTP {status}"));
            return Err(ClientError::Upload(message));
        }

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Upload(format!("invalid response from server: {e}")))?;
        Ok(body.secure_url)
    }
}

#[async_trait]
impl ImageHost for HttpImageHost {
    async fn upload(&self, file: &ImageFile) -> Result<String> {
        Self::validate(file)?;
        debug!(name = %file.name, size = file.size(), "Uploading image");

        match tokio::time::timeout(self.timeout, self.send(file)).await {
            Ok(Ok(url)) => {
                info!(name = %file.name, "Image uploaded");
                Ok(url)
            }
            Ok(Err(e)) => {
                warn!(name = %file.name, error = %e, "Image upload failed");
                Err(e)
            }
            Err(_) => {
                warn!(name = %file.name, timeout_secs = self.timeout.as_secs(), "Image upload timed out");
                Err(ClientError::Timeout(self.timeout.as_secs()))
            }
        }
    }
}
