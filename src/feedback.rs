use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::{error::ValidationError, models::FeedbackRequest};

pub const RATING_RANGE: std::ops::RangeInclusive<u8> = 1..=5;

pub fn validate_feedback(feedback: &FeedbackRequest) -> Result<(), ValidationError> {
    if RATING_RANGE.contains(&feedback.rating) {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange { field: "rating", min: 1, max: 5, value: u32::from(feedback.rating) })
    }
}

/// Best-effort sink for user feedback. Failures are logged, never returned.
#[async_trait]
pub trait FeedbackLog: Send + Sync {
    async fn record(&self, comment: &str, rating: u8);
}

/// Appends one JSON line per feedback entry to a local file.
pub struct JsonlFeedbackLog {
    path: PathBuf,
}

impl JsonlFeedbackLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    async fn append(&self, line: String) -> std::io::Result<()> {
        let mut file = tokio::fs::OpenOptions::new().create(true).append(true).open(&self.path).await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}

#[async_trait]
impl FeedbackLog for JsonlFeedbackLog {
    async fn record(&self, comment: &str, rating: u8) {
        let entry = json!({ "timestamp": Utc::now().to_rfc3339(), "rating": rating, "comment": comment });
        match self.append(format!("{entry}\n")).await {
            Ok(()) => info!("📝 Feedback recorded (rating={})", rating),
            Err(e) => warn!("⚠️ Could not record feedback to {}: {}", self.path.display(), e),
        }
    }
}
