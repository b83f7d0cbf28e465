//! 头像上传（外部图床）

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::UploadConfig;
use crate::error::{ClientError, Result};

/// 待上传的图片文件
#[derive(Clone)]
pub struct PhotoFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl PhotoFile {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// 从磁盘读取图片，根据扩展名推断类型
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content_type = guess_image_type(path).ok_or_else(|| {
            ClientError::Validation(format!("Unsupported image type: {}", path.display()))
        })?;
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            ClientError::Validation(format!("Cannot read {}: {}", path.display(), e))
        })?;
        if bytes.is_empty() {
            return Err(ClientError::Validation(format!(
                "Image file is empty: {}",
                path.display()
            )));
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "photo".to_string());

        Ok(Self::new(file_name, content_type, bytes))
    }
}

impl std::fmt::Debug for PhotoFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhotoFile")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("size", &self.bytes.len())
            .finish()
    }
}

fn guess_image_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// 上传成功后图床返回的信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    pub secure_url: String,
    pub public_id: Option<String>,
}

/// 图片上传抽象
#[async_trait]
pub trait ImageUploader: Send + Sync {
    async fn upload(&self, photo: &PhotoFile) -> Result<UploadedImage>;
}

/// Cloudinary 未签名上传
pub struct CloudinaryUploader {
    client: Client,
    endpoint: String,
    cloud_name: Option<String>,
    upload_preset: Option<Secret<String>>,
    folder: String,
}

impl CloudinaryUploader {
    pub fn from_config(config: &UploadConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build upload client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            cloud_name: config.cloud_name.clone().filter(|c| !c.trim().is_empty()),
            upload_preset: config.upload_preset.clone(),
            folder: config.folder.clone(),
        })
    }
}

#[derive(Deserialize)]
struct CloudinaryResponse {
    secure_url: Option<String>,
    public_id: Option<String>,
}

#[async_trait]
impl ImageUploader for CloudinaryUploader {
    async fn upload(&self, photo: &PhotoFile) -> Result<UploadedImage> {
        let (cloud_name, preset) = match (&self.cloud_name, &self.upload_preset) {
            (Some(cloud), Some(preset)) => (cloud, preset),
            _ => return Err(ClientError::upload("Cloudinary configuration is missing")),
        };

        let file_part = Part::bytes(photo.bytes.clone())
            .file_name(photo.file_name.clone())
            .mime_str(&photo.content_type)
            .map_err(|e| ClientError::Upload(format!("invalid content type: {}", e)))?;

        let form = Form::new()
            .part("file", file_part)
            .text("upload_preset", preset.expose_secret().clone())
            .text("folder", self.folder.clone());

        let url = format!("{}/{}/image/upload", self.endpoint, cloud_name);
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ClientError::Upload(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            warn!(status = status.as_u16(), "Image host rejected upload");
            return Err(ClientError::Upload(format!("Upload failed with status {}", status)));
        }

        let body: CloudinaryResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Upload(format!("invalid upload response: {}", e)))?;

        let secure_url = body
            .secure_url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ClientError::upload("No URL returned from upload"))?;

        info!(size = photo.bytes.len(), "Photo uploaded");
        Ok(UploadedImage {
            secure_url,
            public_id: body.public_id,
        })
    }
}
