//! End-to-end generation: upload, encode, submit, poll, fetch, encode.
//!
//! [`Generator`] is constructed explicitly with a [`ComfyUIApi`] and a
//! [`GeneratorConfig`] and passed to whoever needs it. In
//! [`GenerationMode::Demo`] it never contacts the backend and returns a
//! placeholder flagged with [`GenerationOutput::is_demo`].

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use miniyou_core::error::CoreError;
use miniyou_core::style::{Style, DEFAULT_STYLE};

use crate::api::ComfyUIApi;
use crate::demo::render_placeholder;
use crate::error::GenerateError;
use crate::events::{GenerationEvent, LifecycleState, EVENT_CHANNEL_CAPACITY};
use crate::history::ImageRef;
use crate::poller::{wait_for_completion, PollConfig, PollOutcome};
use crate::workflow::{encode_workflow, EncodedWorkflow, EncoderSettings};

/// Whether generations hit the backend or return placeholders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GenerationMode {
    #[default]
    Live,
    Demo,
}

impl fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Live => "live",
            Self::Demo => "demo",
        })
    }
}

impl FromStr for GenerationMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "live" => Ok(Self::Live),
            "demo" => Ok(Self::Demo),
            other => Err(CoreError::Validation(format!(
                "Invalid generation mode '{other}'. Must be one of: live, demo"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GeneratorConfig {
    pub mode: GenerationMode,
    pub poll: PollConfig,
    pub encoder: EncoderSettings,
}

/// Raw portrait bytes for image-to-image generation.
#[derive(Debug, Clone)]
pub struct InputImage {
    pub bytes: Vec<u8>,
    /// Name used for the upload; the extension selects the MIME type.
    pub filename: String,
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Style identifier; unknown ids fall back to the default style.
    pub style: String,
    /// When present, the portrait is uploaded and restyled. Otherwise the
    /// image is generated from the prompt alone.
    pub input_image: Option<InputImage>,
    /// Pin the sampler seed for a reproducible result.
    pub seed: Option<u64>,
}

impl GenerationRequest {
    pub fn new(style: impl Into<String>) -> Self {
        Self {
            style: style.into(),
            input_image: None,
            seed: None,
        }
    }

    pub fn with_input_image(mut self, bytes: Vec<u8>, filename: impl Into<String>) -> Self {
        self.input_image = Some(InputImage {
            bytes,
            filename: filename.into(),
        });
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// A finished generation.
#[derive(Debug, Clone)]
pub struct GenerationOutput {
    /// Backend job id, or `demo-<millis>` for placeholders.
    pub prompt_id: String,
    pub style: Style,
    /// Sampler seed used; `None` for placeholders.
    pub seed: Option<u64>,
    /// Result image, standard base64 with padding.
    pub image_base64: String,
    /// Backend descriptor of the selected image.
    pub source: Option<ImageRef>,
    /// `true` when the image is a demo placeholder.
    pub is_demo: bool,
}

impl GenerationOutput {
    /// Decode [`image_base64`](Self::image_base64) back to raw bytes.
    pub fn image_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        base64::engine::general_purpose::STANDARD.decode(&self.image_base64)
    }
}

/// Drives generation requests against one ComfyUI instance.
pub struct Generator {
    api: ComfyUIApi,
    config: GeneratorConfig,
    event_tx: broadcast::Sender<GenerationEvent>,
}

impl Generator {
    pub fn new(api: ComfyUIApi, config: GeneratorConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            api,
            config,
            event_tx,
        }
    }

    /// Subscribe to lifecycle events for all requests on this generator.
    pub fn subscribe(&self) -> broadcast::Receiver<GenerationEvent> {
        self.event_tx.subscribe()
    }

    pub fn mode(&self) -> GenerationMode {
        self.config.mode
    }

    pub fn api(&self) -> &ComfyUIApi {
        &self.api
    }

    /// Liveness probe against the configured backend.
    pub async fn test_connection(&self) -> bool {
        self.api.test_connection().await
    }

    /// Run one generation, bounded only by the polling ceiling.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationOutput, GenerateError> {
        self.generate_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Run one generation, stopping early if `cancel` fires while the job
    /// is being polled. A cancelled job is also removed from the backend
    /// queue on a best-effort basis.
    pub async fn generate_with_cancel(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutput, GenerateError> {
        if Style::parse(&request.style).is_none() {
            tracing::warn!(
                requested = %request.style,
                fallback = %DEFAULT_STYLE,
                "Unknown style, using default",
            );
        }
        self.emit_state(None, LifecycleState::NotStarted);

        match self.config.mode {
            GenerationMode::Demo => self.generate_demo(request),
            GenerationMode::Live => self.generate_live(request, cancel).await,
        }
    }

    // ---- private helpers ----

    fn generate_demo(&self, request: &GenerationRequest) -> Result<GenerationOutput, GenerateError> {
        let style = Style::resolve(&request.style);
        let bytes = render_placeholder(style).map_err(|e| GenerateError::Decode(e.to_string()))?;
        let prompt_id = format!("demo-{}", chrono::Utc::now().timestamp_millis());

        tracing::info!(style = %style, prompt_id = %prompt_id, "Demo mode: returning placeholder image");
        self.emit_state(Some(&prompt_id), LifecycleState::Completed);

        Ok(GenerationOutput {
            prompt_id,
            style,
            seed: None,
            image_base64: base64::engine::general_purpose::STANDARD.encode(bytes),
            source: None,
            is_demo: true,
        })
    }

    async fn generate_live(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutput, GenerateError> {
        let (prompt_id, encoded) = match self.submit(request).await {
            Ok(submitted) => submitted,
            Err(e) => {
                tracing::error!(style = %request.style, error = %e, "Generation not submitted");
                self.emit_state(None, e.lifecycle_state());
                return Err(e);
            }
        };

        let result = self.collect(&prompt_id, &encoded, cancel).await;
        match &result {
            Ok(output) => {
                tracing::info!(
                    prompt_id = %prompt_id,
                    style = %output.style,
                    encoded_len = output.image_base64.len(),
                    "Generation completed",
                );
                self.emit_state(Some(&prompt_id), LifecycleState::Completed);
            }
            Err(e) => {
                tracing::error!(prompt_id = %prompt_id, error = %e, "Generation failed");
                self.emit_state(Some(&prompt_id), e.lifecycle_state());
            }
        }
        result
    }

    /// Upload the input image (if any), encode the job graph and queue it.
    async fn submit(
        &self,
        request: &GenerationRequest,
    ) -> Result<(String, EncodedWorkflow), GenerateError> {
        let input_image = match &request.input_image {
            Some(input) => {
                let uploaded = self
                    .api
                    .upload_image(input.bytes.clone(), &input.filename)
                    .await
                    .map_err(GenerateError::from_submit)?;
                let path = uploaded.load_image_path();
                tracing::info!(name = %path, bytes = input.bytes.len(), "Input image uploaded");
                self.emit(GenerationEvent::ImageUploaded { name: path.clone() });
                Some(path)
            }
            None => None,
        };

        let encoded = encode_workflow(
            &self.config.encoder,
            &request.style,
            input_image.as_deref(),
            request.seed,
        )?;

        let client_id = uuid::Uuid::new_v4().to_string();
        let response = self
            .api
            .submit_workflow(&encoded.workflow, &client_id)
            .await
            .map_err(GenerateError::from_submit)?;

        tracing::info!(
            prompt_id = %response.prompt_id,
            queue_position = ?response.number,
            style = %encoded.style,
            seed = encoded.seed,
            "Workflow submitted to ComfyUI",
        );
        self.emit_state(Some(&response.prompt_id), LifecycleState::Submitted);

        Ok((response.prompt_id, encoded))
    }

    /// Poll the job to a terminal state and fetch the selected image.
    async fn collect(
        &self,
        prompt_id: &str,
        encoded: &EncodedWorkflow,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutput, GenerateError> {
        self.emit_state(Some(prompt_id), LifecycleState::Polling);

        let outcome = wait_for_completion(
            &self.api,
            prompt_id,
            &self.config.poll,
            cancel,
            &self.event_tx,
        )
        .await
        .map_err(GenerateError::from_status)?;

        let missing = || GenerateError::MissingOutput {
            prompt_id: prompt_id.to_string(),
        };
        let image = match outcome {
            PollOutcome::Completed { images } => images.into_iter().next().ok_or_else(missing)?,
            PollOutcome::MissingOutput => return Err(missing()),
            PollOutcome::Failed { error } => {
                return Err(GenerateError::Generation(
                    error.unwrap_or_else(|| "backend reported an error".to_string()),
                ))
            }
            PollOutcome::TimedOut { waited } => return Err(GenerateError::Timeout { waited }),
            PollOutcome::Cancelled => {
                self.cancel_remote(prompt_id).await;
                return Err(GenerateError::Cancelled);
            }
        };

        let bytes = self
            .api
            .fetch_image(&image)
            .await
            .map_err(|e| GenerateError::Decode(e.to_string()))?;
        if bytes.is_empty() {
            return Err(GenerateError::Decode(format!(
                "backend returned an empty body for {}",
                image.filename
            )));
        }

        Ok(GenerationOutput {
            prompt_id: prompt_id.to_string(),
            style: encoded.style,
            seed: Some(encoded.seed),
            image_base64: base64::engine::general_purpose::STANDARD.encode(&bytes),
            source: Some(image),
            is_demo: false,
        })
    }

    async fn cancel_remote(&self, prompt_id: &str) {
        if let Err(e) = self.api.cancel_execution(prompt_id).await {
            tracing::warn!(prompt_id, error = %e, "Failed to remove cancelled job from queue");
        }
    }

    fn emit_state(&self, prompt_id: Option<&str>, state: LifecycleState) {
        self.emit(GenerationEvent::StateChanged {
            prompt_id: prompt_id.map(str::to_string),
            state,
        });
    }

    fn emit(&self, event: GenerationEvent) {
        let _ = self.event_tx.send(event);
    }
}
