use std::sync::Arc;

use tracing::info;

use crate::{
    config::Limits,
    error::{PipelineError, ValidationError},
    generation::{GenerationRequest, GenerationService},
    image_host::{ImageHost, PageImage},
    models::{GeneratedText, ImageReference, InstructionText, LessonForm, Methodology},
    normalize::{normalize, validate},
    prompt::PromptCompiler,
};

/// Where the page image comes from on a given submit.
#[derive(Debug, Clone)]
pub enum ImageSource {
    Hosted(ImageReference),
    Upload(PageImage),
}

#[derive(Debug, Clone)]
pub struct LessonPlan {
    pub methodology: Methodology,
    pub instruction: InstructionText,
    pub text: GeneratedText,
}

/// Validate, upload, normalize, compile, generate. Strictly sequential, one attempt
/// at each remote step, nothing kept between runs.
pub struct LessonPipeline {
    compiler: PromptCompiler,
    limits: Limits,
    image_host: Arc<dyn ImageHost>,
    generator: Arc<dyn GenerationService>,
}

impl LessonPipeline {
    pub fn new(
        compiler: PromptCompiler,
        limits: Limits,
        image_host: Arc<dyn ImageHost>,
        generator: Arc<dyn GenerationService>,
    ) -> Self {
        Self { compiler, limits, image_host, generator }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub async fn run(&self, form: LessonForm, image: Option<ImageSource>) -> Result<LessonPlan, PipelineError> {
        let methodology = validate(&form, image.is_some(), &self.limits)?;
        self.compiler.template(methodology)?;

        let reference = match image {
            Some(ImageSource::Hosted(reference)) => reference,
            Some(ImageSource::Upload(page)) => self.image_host.upload(&page).await?,
            None => return Err(ValidationError::MissingFields(vec!["image"]).into()),
        };

        let params = normalize(form, Some(reference), &self.limits)?;
        let instruction = self.compiler.compile(&params)?;
        info!(
            "🎯 Compiled {} instruction ({} chars, web_search={})",
            params.methodology.key(),
            instruction.as_str().len(),
            params.web_search_enabled
        );

        let request = GenerationRequest {
            instruction,
            image_reference: params.image_reference,
            web_search_enabled: params.web_search_enabled,
        };
        let text = self.generator.generate(&request).await?;
        Ok(LessonPlan { methodology: params.methodology, instruction: request.instruction, text })
    }

    /// Compiles the instruction for an already hosted image without calling the generator.
    pub fn preview(
        &self,
        form: LessonForm,
        image: Option<ImageReference>,
    ) -> Result<(Methodology, InstructionText), PipelineError> {
        let params = normalize(form, image, &self.limits)?;
        let instruction = self.compiler.compile(&params)?;
        Ok((params.methodology, instruction))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        error::{GenerationError, UnknownMethodologyError, UploadError},
        models::LessonFormat,
        prompt::MethodologyTemplate,
    };
    use async_trait::async_trait;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use std::sync::{atomic::{AtomicUsize, Ordering}, Mutex};

    #[derive(Default)]
    pub(crate) struct FakeHost {
        pub calls: AtomicUsize,
        pub fail: bool,
    }

    #[async_trait]
    impl ImageHost for FakeHost {
        async fn upload(&self, _image: &PageImage) -> Result<ImageReference, UploadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(UploadError::Transport("connection refused".into()));
            }
            Ok(ImageReference::new("https://img/x.png").unwrap())
        }
    }

    #[derive(Default)]
    pub(crate) struct FakeGenerator {
        pub requests: Mutex<Vec<GenerationRequest>>,
        pub fail: bool,
    }

    impl FakeGenerator {
        pub fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl GenerationService for FakeGenerator {
        async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedText, GenerationError> {
            self.requests.lock().unwrap().push(request.clone());
            if self.fail {
                return Err(GenerationError("transport error: connection reset".into()));
            }
            Ok(GeneratedText("  ## Lesson plan\n1. Warm-up\n".into()))
        }
    }

    pub(crate) fn png_upload() -> ImageSource {
        ImageSource::Upload(PageImage::from_bytes(Bytes::from_static(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR")).unwrap())
    }

    fn pipeline(host: Arc<FakeHost>, generator: Arc<FakeGenerator>) -> LessonPipeline {
        LessonPipeline::new(PromptCompiler::builtin("English"), Limits::default(), host, generator)
    }

    fn scenario_form() -> LessonForm {
        LessonForm {
            methodology: Some("PPP".into()),
            textbook: Some(String::new()),
            topic: Some("Daily routines".into()),
            class_size: Some(10),
            adults: false,
            age: Some("10-11".into()),
            duration_minutes: Some(60),
            homework_required: true,
            web_search_enabled: false,
            ..LessonForm::default()
        }
    }

    #[tokio::test]
    async fn scenario_runs_end_to_end() {
        let (host, generator) = (Arc::new(FakeHost::default()), Arc::new(FakeGenerator::default()));
        let plan = pipeline(host.clone(), generator.clone()).run(scenario_form(), Some(png_upload())).await.unwrap();

        assert_eq!(plan.text, GeneratedText("  ## Lesson plan\n1. Warm-up\n".into()));
        assert_eq!(plan.methodology, Methodology::Ppp);
        assert_eq!(host.calls.load(Ordering::SeqCst), 1);
        assert_eq!(generator.calls(), 1);

        let requests = generator.requests.lock().unwrap();
        let sent = &requests[0];
        assert!(!sent.web_search_enabled);
        assert_eq!(sent.image_reference.as_str(), "https://img/x.png");
        let text = sent.instruction.as_str();
        for line in [
            "- Textbook: infer from the image",
            "- Topic: Daily routines",
            "- Age: 10-11",
            "- Duration: 60 min",
            "- Homework: yes",
            "[PPP METHODOLOGY]",
        ] {
            assert!(text.contains(line), "missing '{line}'");
        }
    }

    #[tokio::test]
    async fn missing_image_stops_before_any_network_call() {
        let (host, generator) = (Arc::new(FakeHost::default()), Arc::new(FakeGenerator::default()));
        let err = pipeline(host.clone(), generator.clone()).run(scenario_form(), None).await.unwrap_err();
        assert!(matches!(err, PipelineError::Validation(ValidationError::MissingFields(ref f)) if *f == vec!["image"]));
        assert_eq!(host.calls.load(Ordering::SeqCst), 0);
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn missing_age_is_caught_before_upload() {
        let (host, generator) = (Arc::new(FakeHost::default()), Arc::new(FakeGenerator::default()));
        let form = LessonForm { age: None, ..scenario_form() };
        let err = pipeline(host.clone(), generator.clone()).run(form, Some(png_upload())).await.unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
        assert_eq!(host.calls.load(Ordering::SeqCst), 0);
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn upload_failure_skips_generation() {
        let host = Arc::new(FakeHost { fail: true, ..FakeHost::default() });
        let generator = Arc::new(FakeGenerator::default());
        let err = pipeline(host.clone(), generator.clone()).run(scenario_form(), Some(png_upload())).await.unwrap_err();
        assert!(matches!(err, PipelineError::Upload(_)));
        assert_eq!(host.calls.load(Ordering::SeqCst), 1);
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn generation_failure_surfaces_once() {
        let host = Arc::new(FakeHost::default());
        let generator = Arc::new(FakeGenerator { fail: true, ..FakeGenerator::default() });
        let err = pipeline(host, generator.clone()).run(scenario_form(), Some(png_upload())).await.unwrap_err();
        assert!(matches!(err, PipelineError::Generation(GenerationError(ref m)) if m.contains("connection reset")));
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn hosted_image_skips_upload_and_web_search_is_forwarded() {
        let (host, generator) = (Arc::new(FakeHost::default()), Arc::new(FakeGenerator::default()));
        let form = LessonForm { web_search_enabled: true, format: LessonFormat::Individual, ..scenario_form() };
        let image = ImageSource::Hosted(ImageReference::new("https://cdn/page.jpg").unwrap());
        pipeline(host.clone(), generator.clone()).run(form, Some(image)).await.unwrap();
        assert_eq!(host.calls.load(Ordering::SeqCst), 0);
        let requests = generator.requests.lock().unwrap();
        assert!(requests[0].web_search_enabled);
        assert!(requests[0].instruction.as_str().contains("- Number of students: 1\n"));
    }

    #[tokio::test]
    async fn unregistered_template_fails_before_upload() {
        let (host, generator) = (Arc::new(FakeHost::default()), Arc::new(FakeGenerator::default()));
        let compiler = PromptCompiler::new(Vec::<MethodologyTemplate>::new(), "English");
        let p = LessonPipeline::new(compiler, Limits::default(), host.clone(), generator.clone());
        let err = p.run(scenario_form(), Some(png_upload())).await.unwrap_err();
        assert!(matches!(err, PipelineError::UnknownMethodology(UnknownMethodologyError(ref k)) if k == "PPP"));
        assert_eq!(host.calls.load(Ordering::SeqCst), 0);
        assert_eq!(generator.calls(), 0);
    }

    #[test]
    fn preview_compiles_without_generating() {
        let (host, generator) = (Arc::new(FakeHost::default()), Arc::new(FakeGenerator::default()));
        let (methodology, text) = pipeline(host, generator.clone())
            .preview(scenario_form(), ImageReference::new("https://img/x.png"))
            .unwrap();
        assert_eq!(methodology, Methodology::Ppp);
        assert!(text.as_str().contains("- Topic: Daily routines"));
        assert_eq!(generator.calls(), 0);
    }
}
