use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::{
    config::LlmSettings,
    error::GenerationError,
    models::{GeneratedText, ImageReference, InstructionText},
};

const WEB_SEARCH_TOOL: &str = "web_search_preview";

/// One outbound generation call: the compiled instruction plus the hosted page image.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub instruction: InstructionText,
    pub image_reference: ImageReference,
    pub web_search_enabled: bool,
}

/// A text/vision generation backend. Implementations make at most one remote call per
/// invocation and keep no state between calls.
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedText, GenerationError>;
}

pub struct LlmClient {
    client: Client,
    settings: LlmSettings,
}

impl LlmClient {
    pub fn new(settings: LlmSettings) -> Self {
        let mut builder = Client::builder();
        if let Some(timeout) = settings.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().unwrap_or_else(|e| {
            error!("❌ Could not build HTTP client with custom timeout, using defaults: {}", e);
            Client::new()
        });
        Self { client, settings }
    }

    pub fn request_body(&self, request: &GenerationRequest) -> Value {
        let mut body = json!({
            "model": self.settings.model,
            "input": [{
                "role": "user",
                "content": [
                    {"type": "input_text", "text": request.instruction.as_str()},
                    {"type": "input_image", "image_url": request.image_reference.as_str(), "detail": "high"}
                ]
            }],
            "max_output_tokens": self.settings.max_output_tokens,
            "stream": false
        });

        if request.web_search_enabled {
            body["tools"] = json!([{
                "type": WEB_SEARCH_TOOL,
                "search_context_size": self.settings.search_context_size,
                "user_location": {"type": "approximate", "country": self.settings.search_country}
            }]);
            body["tool_choice"] = json!({"type": WEB_SEARCH_TOOL});
        }
        body
    }

    async fn perform_api_call(&self, api_key: &str, request: &GenerationRequest) -> Result<String, GenerationError> {
        let url = format!("{}/responses", self.settings.base_url.trim_end_matches('/'));
        info!(
            "🔗 Making request to: {} (model={}, web_search={})",
            url, self.settings.model, request.web_search_enabled
        );

        let response = self.client
            .post(&url)
            .bearer_auth(api_key)
            .json(&self.request_body(request))
            .send()
            .await
            .map_err(|e| GenerationError(format!("transport error: {e}")))?;

        let status = response.status();
        info!("📥 Response status: {}", status);

        let response_text = response.text().await
            .map_err(|e| GenerationError(format!("could not read response body: {e}")))?;

        if !status.is_success() {
            error!("❌ API Error response: {}", response_text);
            return Err(GenerationError(format!("status={} body={}", status, response_text)));
        }

        let parsed: ResponsesPayload = serde_json::from_str(&response_text)
            .map_err(|e| GenerationError(format!("malformed response: {e}")))?;
        extract_output_text(&parsed).ok_or_else(|| GenerationError("no text content in response".into()))
    }
}

#[async_trait]
impl GenerationService for LlmClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedText, GenerationError> {
        let Some(api_key) = self.settings.api_key.as_deref() else {
            return Err(GenerationError("API key is not configured".into()));
        };

        info!("Generating lesson plan ({} instruction chars)...", request.instruction.as_str().len());
        match self.perform_api_call(api_key, request).await {
            Ok(text) => {
                info!("✅ Lesson plan generated ({} chars)", text.len());
                Ok(GeneratedText(text))
            }
            Err(e) => {
                error!("❌ Failed to generate lesson plan: {}", e);
                Err(e)
            }
        }
    }
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
struct ResponsesPayload {
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum OutputItem {
    #[serde(rename = "message")]
    Message {
        #[serde(default)]
        content: Vec<ContentPart>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentPart {
    #[serde(rename = "output_text")]
    OutputText { text: String },
    #[serde(other)]
    Other,
}

/// Concatenates every `output_text` part of every message, untouched.
fn extract_output_text(resp: &ResponsesPayload) -> Option<String> {
    let texts: Vec<&str> = resp
        .output
        .iter()
        .filter_map(|item| match item {
            OutputItem::Message { content } => Some(content),
            OutputItem::Other => None,
        })
        .flatten()
        .filter_map(|part| match part {
            ContentPart::OutputText { text } => Some(text.as_str()),
            ContentPart::Other => None,
        })
        .collect();
    if texts.is_empty() {
        None
    } else {
        Some(texts.concat())
    }
}
