use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;
use thiserror::Error;

/// Missing or malformed form input. Never reaches the generation client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("please fill in the required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange { field: &'static str, min: u32, max: u32, value: u32 },
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ValidationError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid { field, reason: reason.into() }
    }

    pub fn fields(&self) -> Vec<&'static str> {
        match self {
            Self::MissingFields(fields) => fields.clone(),
            Self::OutOfRange { field, .. } | Self::Invalid { field, .. } => vec![*field],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no lesson template is registered for methodology '{0}'")]
pub struct UnknownMethodologyError(pub String);

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("image host unreachable: {0}")]
    Transport(String),
    #[error("image host returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected response from image host: {0}")]
    UnexpectedResponse(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("generation failed: {0}")]
pub struct GenerationError(pub String);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be a number, got '{value}'")]
    NotANumber { var: &'static str, value: String },
    #[error("{name} bounds are inverted: min {min} > max {max}")]
    InvertedBounds { name: &'static str, min: u32, max: u32 },
    #[error("{var} must be at least 1 second")]
    ZeroTimeout { var: &'static str },
}

/// Everything the request boundary can see; converted to a user-facing response.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    UnknownMethodology(#[from] UnknownMethodologyError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

impl PipelineError {
    fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::UnknownMethodology(_) => "unknown_methodology",
            Self::Upload(_) => "upload",
            Self::Generation(_) => "generation",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::UnknownMethodology(_) => StatusCode::BAD_REQUEST,
            Self::Upload(_) | Self::Generation(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let mut body = json!({ "error": self.kind(), "message": self.to_string() });
        if let Self::Validation(e) = &self {
            body["missing_fields"] = json!(e.fields());
        }
        (self.status(), Json(body)).into_response()
    }
}
