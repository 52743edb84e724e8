use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use image::ImageFormat;
use reqwest::{multipart, Client};
use tracing::{error, info};

use crate::{
    error::{UploadError, ValidationError},
    models::ImageReference,
};

/// A page photo received from the form, already sniffed as an image.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub bytes: Bytes,
    pub format: ImageFormat,
}

impl PageImage {
    /// Accepts PNG, JPEG, WebP and GIF; anything else is rejected as the `image` field.
    pub fn from_bytes(bytes: Bytes) -> Result<Self, ValidationError> {
        if bytes.is_empty() {
            return Err(ValidationError::MissingFields(vec!["image"]));
        }
        let format = image::guess_format(&bytes)
            .map_err(|_| ValidationError::invalid("image", "file is not a recognised image"))?;
        match format {
            ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::WebP | ImageFormat::Gif => Ok(Self { bytes, format }),
            other => Err(ValidationError::invalid("image", format!("unsupported image format {other:?}"))),
        }
    }

    pub fn file_name(&self) -> String {
        let ext = self.format.extensions_str().first().copied().unwrap_or("img");
        format!("page.{ext}")
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.to_mime_type()
    }
}

#[async_trait]
pub trait ImageHost: Send + Sync {
    async fn upload(&self, image: &PageImage) -> Result<ImageReference, UploadError>;
}

/// Anonymous file host taking a `fileToUpload` multipart part and answering with the
/// public URL as plain text.
pub struct FileHostClient {
    client: Client,
    upload_url: String,
}

impl FileHostClient {
    pub fn new(upload_url: String, timeout: Duration) -> Self {
        let client = Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
            error!("❌ Could not build upload client with timeout, using defaults: {}", e);
            Client::new()
        });
        Self { client, upload_url }
    }
}

#[async_trait]
impl ImageHost for FileHostClient {
    async fn upload(&self, image: &PageImage) -> Result<ImageReference, UploadError> {
        info!("📤 Uploading page image ({} bytes, {})", image.bytes.len(), image.mime_type());

        let part = multipart::Part::stream(image.bytes.clone())
            .file_name(image.file_name())
            .mime_str(image.mime_type())
            .map_err(|e| UploadError::Transport(e.to_string()))?;
        let form = multipart::Form::new().text("reqtype", "fileupload").part("fileToUpload", part);

        let response = self.client
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| UploadError::Transport(e.to_string()))?;
        if !status.is_success() {
            error!("❌ Image host returned {}: {}", status, body);
            return Err(UploadError::Status { status: status.as_u16(), body });
        }

        let url = body.trim();
        if !url.starts_with("https://") && !url.starts_with("http://") {
            return Err(UploadError::UnexpectedResponse(url.chars().take(200).collect()));
        }
        info!("✅ Page image hosted at {}", url);
        ImageReference::new(url).ok_or_else(|| UploadError::UnexpectedResponse("empty body".into()))
    }
}
