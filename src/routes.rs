use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use bytes::Bytes;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::{path::PathBuf, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::{
    catalog::{form_options, search_textbooks, FormOptions},
    error::{PipelineError, ValidationError},
    feedback::{validate_feedback, FeedbackLog},
    image_host::PageImage,
    models::{
        ExportRequest, FeedbackRequest, ImageReference, JsonLessonRequest, LessonForm, LessonPlanResponse,
        PreviewResponse,
    },
    pdf::generate_pdf,
    pipeline::{ImageSource, LessonPipeline, LessonPlan},
};

const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;
const TEXTBOOK_SUGGESTIONS: usize = 20;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<LessonPipeline>,
    pub feedback: Arc<dyn FeedbackLog>,
    pub pdf_font_path: Option<PathBuf>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/options", get(get_options))
        .route("/api/textbooks", get(get_textbooks))
        .route("/api/lesson-plans", post(generate_lesson_plan))
        .route("/api/lesson-plans/json", post(generate_lesson_plan_json))
        .route("/api/lesson-plans/preview", post(preview_instruction))
        .route("/api/lesson-plans/export", post(export_pdf))
        .route("/api/feedback", post(submit_feedback))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}

async fn run_pipeline(
    state: &AppState,
    form: LessonForm,
    image: Option<ImageSource>,
) -> Result<Json<LessonPlanResponse>, PipelineError> {
    let request_id = Uuid::new_v4();
    tracing::info!(
        %request_id,
        "🚀 Generating lesson plan (methodology={:?}, web_search={})",
        form.methodology,
        form.web_search_enabled
    );

    match state.pipeline.run(form, image).await {
        Ok(LessonPlan { methodology, instruction, text }) => {
            tracing::info!(%request_id, "✅ Lesson plan ready ({} chars)", text.0.len());
            Ok(Json(LessonPlanResponse {
                request_id,
                plan: text.0,
                instruction: instruction.into_string(),
                methodology,
                created_at: Utc::now(),
            }))
        }
        Err(e) => {
            tracing::warn!(%request_id, "❌ Lesson plan request failed: {}", e);
            Err(e)
        }
    }
}

/// Unwraps a JSON body, reporting malformed input in the usual error envelope.
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ValidationError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ValidationError::invalid("body", rejection.body_text()))
}

pub async fn generate_lesson_plan(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<LessonPlanResponse>, PipelineError> {
    let mut form = LessonForm::default();
    let mut image = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| ValidationError::invalid("form", e.body_text()))? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let bytes = field.bytes().await.map_err(|e| ValidationError::invalid("image", e.body_text()))?;
                if !bytes.is_empty() {
                    image = Some(ImageSource::Upload(PageImage::from_bytes(bytes)?));
                }
            }
            "image_url" => {
                let url = field.text().await.map_err(|e| ValidationError::invalid("image_url", e.body_text()))?;
                if let Some(reference) = ImageReference::new(url) {
                    image = Some(ImageSource::Hosted(reference));
                }
            }
            _ => {
                let value = field.text().await.map_err(|e| ValidationError::invalid("form", e.body_text()))?;
                form.apply_field(&name, &value)?;
            }
        }
    }

    run_pipeline(&state, form, image).await
}

pub async fn generate_lesson_plan_json(
    State(state): State<AppState>,
    body: Result<Json<JsonLessonRequest>, JsonRejection>,
) -> Result<Json<LessonPlanResponse>, PipelineError> {
    let body = json_body(body)?;
    let image = json_image(body.image_url, body.image_base64)?;
    run_pipeline(&state, body.form, image).await
}

fn json_image(url: Option<String>, encoded: Option<String>) -> Result<Option<ImageSource>, ValidationError> {
    if let Some(reference) = url.and_then(ImageReference::new) {
        return Ok(Some(ImageSource::Hosted(reference)));
    }
    let Some(encoded) = encoded.filter(|e| !e.trim().is_empty()) else { return Ok(None) };
    // Accept data URIs as produced by browsers.
    let payload = encoded.split_once("base64,").map_or(encoded.as_str(), |(_, data)| data).trim();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| ValidationError::invalid("image_base64", e.to_string()))?;
    Ok(Some(ImageSource::Upload(PageImage::from_bytes(Bytes::from(bytes))?)))
}

pub async fn preview_instruction(
    State(state): State<AppState>,
    body: Result<Json<JsonLessonRequest>, JsonRejection>,
) -> Result<Json<PreviewResponse>, PipelineError> {
    let body = json_body(body)?;
    let image = body.image_url.and_then(ImageReference::new);
    let (methodology, instruction) = state.pipeline.preview(body.form, image)?;
    Ok(Json(PreviewResponse { methodology, instruction: instruction.into_string() }))
}

pub async fn export_pdf(State(state): State<AppState>, body: Result<Json<ExportRequest>, JsonRejection>) -> Response {
    let body = match json_body(body) {
        Ok(body) => body,
        Err(e) => return PipelineError::from(e).into_response(),
    };
    if body.text.trim().is_empty() {
        return PipelineError::from(ValidationError::MissingFields(vec!["text"])).into_response();
    }
    let title = body.title.filter(|t| !t.trim().is_empty()).unwrap_or_else(|| "Lesson plan".to_string());

    match generate_pdf(&title, &body.text, state.pdf_font_path.as_deref()) {
        Ok(pdf_bytes) => {
            let filename = format!("attachment; filename=\"lesson_plan_{}.pdf\"", Utc::now().format("%Y%m%d%H%M%S"));
            let mut headers = axum::http::HeaderMap::new();
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/pdf"));
            if let Ok(value) = HeaderValue::from_str(&filename) {
                headers.insert(header::CONTENT_DISPOSITION, value);
            }
            tracing::info!("📄 Exported lesson plan PDF ({} bytes)", pdf_bytes.len());
            (StatusCode::OK, headers, pdf_bytes).into_response()
        }
        Err(e) => {
            tracing::error!("❌ PDF export failed: {}", e);
            let body = json!({ "error": "export", "message": e.to_string() });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

pub async fn submit_feedback(
    State(state): State<AppState>,
    body: Result<Json<FeedbackRequest>, JsonRejection>,
) -> Result<StatusCode, PipelineError> {
    let body: FeedbackRequest = json_body(body)?;
    validate_feedback(&body)?;
    state.feedback.record(body.comment.trim(), body.rating).await;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_options(State(state): State<AppState>) -> Json<FormOptions> {
    Json(form_options(state.pipeline.limits()))
}

#[derive(Debug, Deserialize)]
pub struct TextbookQuery {
    #[serde(default)]
    q: String,
}

pub async fn get_textbooks(Query(query): Query<TextbookQuery>) -> Json<Vec<String>> {
    Json(search_textbooks(&query.q, TEXTBOOK_SUGGESTIONS))
}
