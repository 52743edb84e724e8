mod catalog;
mod config;
mod error;
mod feedback;
mod generation;
mod image_host;
mod models;
mod normalize;
mod pdf;
mod pipeline;
mod prompt;
mod routes;

use anyhow::Context;
use routes::{create_router, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

use crate::{
    config::AppConfig,
    feedback::JsonlFeedbackLog,
    generation::LlmClient,
    image_host::FileHostClient,
    pipeline::LessonPipeline,
    prompt::PromptCompiler,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    if config.llm.api_key.is_none() {
        tracing::warn!("⚠️ LLM_API_KEY is not set; generation requests will fail until it is configured");
    }
    if config.pdf_needs_external_font() {
        tracing::warn!(
            "⚠️ PDF_FONT_PATH is not set; {} lesson plans cannot be exported with the builtin font",
            config.lesson_language
        );
    }
    tracing::info!("Using model {} at {}", config.llm.model, config.llm.base_url);

    let compiler = PromptCompiler::builtin(config.lesson_language.clone());
    compiler.verify_complete().context("lesson template registry is incomplete")?;

    let pipeline = LessonPipeline::new(
        compiler,
        config.limits,
        Arc::new(FileHostClient::new(config.image_host_url.clone(), config.image_host_timeout)),
        Arc::new(LlmClient::new(config.llm.clone())),
    );
    let state = AppState {
        pipeline: Arc::new(pipeline),
        feedback: Arc::new(JsonlFeedbackLog::new(config.feedback_log_path.clone())),
        pdf_font_path: config.pdf_font_path.clone(),
    };

    let app = create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("could not bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await?;
    Ok(())
}
