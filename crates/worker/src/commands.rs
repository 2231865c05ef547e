//! Command-line commands: `probe`, `styles` and `generate`.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use miniyou_comfyui::events::GenerationEvent;
use miniyou_comfyui::{GenerateError, GenerationOutput, GenerationRequest, Generator};
use miniyou_core::generation::{GenerationHistory, GenerationRecord};
use miniyou_core::style::{free_styles, premium_styles, Style, StyleOption};

use crate::config::WorkerConfig;

/// Stylize portraits with a ComfyUI backend.
#[derive(Debug, Parser)]
#[command(name = "miniyou-worker", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Check that the backend is reachable.
    Probe,
    /// List the available styles.
    Styles,
    /// Stylize a portrait and save the result as PNG.
    Generate {
        /// Style id, e.g. `pixel` or `pop-art`. Unknown ids use the default style.
        style: String,
        /// Portrait to restyle. Without it the image is generated from the prompt alone.
        input: Option<PathBuf>,
        /// Where to write the result [default: miniyou_<style>.png].
        output: Option<PathBuf>,
        /// Pin the sampler seed for a reproducible result.
        #[arg(long)]
        seed: Option<u64>,
    },
}

/// `miniyou_<style>.png` in the working directory.
pub fn default_output_path(style: &str) -> PathBuf {
    PathBuf::from(format!("miniyou_{style}.png"))
}

/// Execute `command` against the configured backend.
pub async fn run(command: Command, config: &WorkerConfig) -> anyhow::Result<()> {
    match command {
        Command::Styles => {
            print_styles();
            Ok(())
        }
        Command::Probe => {
            let generator = config
                .build_generator()
                .context("Failed to build HTTP client")?;
            probe(&generator).await
        }
        Command::Generate {
            style,
            input,
            output,
            seed,
        } => {
            let generator = config
                .build_generator()
                .context("Failed to build HTTP client")?;
            let output = output.unwrap_or_else(|| default_output_path(&style));
            let mut history = GenerationHistory::with_capacity(config.history_capacity);
            let record = generate(
                &generator,
                &mut history,
                &style,
                input.as_deref(),
                &output,
                seed,
            )
            .await?;
            tracing::info!(
                record_id = %record.id,
                history_len = history.len(),
                "Generation recorded",
            );
            Ok(())
        }
    }
}

async fn probe(generator: &Generator) -> anyhow::Result<()> {
    let url = generator.api().api_url().to_string();
    if generator.test_connection().await {
        println!("ComfyUI reachable at {url}");
        Ok(())
    } else {
        anyhow::bail!("ComfyUI not reachable at {url}")
    }
}

fn print_styles() {
    println!("Free styles:");
    for option in free_styles() {
        println!("{}", style_line(&option));
    }
    println!("Premium styles:");
    for option in premium_styles() {
        println!("{}", style_line(&option));
    }
}

fn style_line(option: &StyleOption) -> String {
    format!(
        "  {:<12} {:<12} {}",
        option.id.id(),
        option.name,
        option.description
    )
}

/// Run one generation, record it in `history` and write the image to
/// `output`.
///
/// Once the request is built the record is always pushed: a failed
/// generation or a failed save leaves it in the `failed` state.
pub async fn generate(
    generator: &Generator,
    history: &mut GenerationHistory,
    style: &str,
    input: Option<&Path>,
    output: &Path,
    seed: Option<u64>,
) -> anyhow::Result<GenerationRecord> {
    let mut request = GenerationRequest::new(style);
    if let Some(path) = input {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read input image {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input.png".to_string());
        request = request.with_input_image(bytes, filename);
    }
    if let Some(seed) = seed {
        request = request.with_seed(seed);
    }

    let mut record = GenerationRecord::new(Style::resolve(style));

    let (result, _) = generate_logged(generator, &request).await;
    let saved = match result {
        Ok(generated) => save_output(&mut record, generated, output).await,
        Err(e) => {
            tracing::error!(error = %e, retryable = e.is_retryable(), "Generation failed");
            Err(anyhow::Error::new(e).context(format!("Generation of '{style}' failed")))
        }
    };

    if let Err(e) = &saved {
        record.fail(format!("{e:#}"))?;
    }
    history.push(record.clone());
    saved.map(|()| record)
}

/// Write the image to `output` and close `record` as completed.
async fn save_output(
    record: &mut GenerationRecord,
    generated: GenerationOutput,
    output: &Path,
) -> anyhow::Result<()> {
    if !generated.is_demo {
        record.mark_processing(&generated.prompt_id, generated.seed)?;
    }
    let bytes = generated
        .image_bytes()
        .context("Generated image is not valid base64")?;
    tokio::fs::write(output, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;
    record.complete(generated.image_base64, generated.is_demo)?;

    tracing::info!(
        prompt_id = %generated.prompt_id,
        style = %generated.style,
        seed = ?generated.seed,
        is_demo = generated.is_demo,
        bytes = bytes.len(),
        path = %output.display(),
        "Image saved",
    );
    Ok(())
}

/// Run `request`, logging lifecycle events as they arrive.
///
/// Events still queued when the generation returns are drained afterwards,
/// so the terminal state is always logged. Every event seen is returned.
async fn generate_logged(
    generator: &Generator,
    request: &GenerationRequest,
) -> (Result<GenerationOutput, GenerateError>, Vec<GenerationEvent>) {
    let mut rx = generator.subscribe();
    let mut seen = Vec::new();

    let generation = generator.generate(request);
    tokio::pin!(generation);

    let result = loop {
        tokio::select! {
            biased;
            Ok(event) = rx.recv() => {
                log_event(&event);
                seen.push(event);
            }
            result = &mut generation => break result,
        }
    };

    while let Ok(event) = rx.try_recv() {
        log_event(&event);
        seen.push(event);
    }
    (result, seen)
}

fn log_event(event: &GenerationEvent) {
    match event {
        GenerationEvent::ImageUploaded { name } => {
            tracing::info!(name = %name, "Input image uploaded");
        }
        GenerationEvent::StateChanged { prompt_id, state } => {
            tracing::info!(prompt_id = ?prompt_id, state = ?state, "Job state changed");
        }
        GenerationEvent::Polled {
            prompt_id,
            attempt,
            elapsed_ms,
        } => {
            tracing::debug!(prompt_id = %prompt_id, attempt, elapsed_ms, "Polled job");
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use miniyou_comfyui::events::LifecycleState;
    use miniyou_comfyui::{ComfyUIApi, GenerationMode, GeneratorConfig};
    use miniyou_core::generation::GenerationStatus;

    use super::*;

    fn parse(args: &[&str]) -> Result<Command, clap::Error> {
        let argv = std::iter::once("miniyou-worker").chain(args.iter().copied());
        Cli::try_parse_from(argv).map(|cli| cli.command)
    }

    #[test]
    fn parses_probe_and_styles() {
        assert_eq!(parse(&["probe"]).unwrap(), Command::Probe);
        assert_eq!(parse(&["styles"]).unwrap(), Command::Styles);
    }

    #[test]
    fn generate_with_style_only() {
        assert_eq!(
            parse(&["generate", "pixel"]).unwrap(),
            Command::Generate {
                style: "pixel".into(),
                input: None,
                output: None,
                seed: None,
            }
        );
        assert_eq!(
            default_output_path("pixel"),
            PathBuf::from("miniyou_pixel.png")
        );
    }

    #[test]
    fn generate_with_input_output_and_seed() {
        assert_eq!(
            parse(&["generate", "anime", "me.jpg", "out/anime.png", "--seed", "42"]).unwrap(),
            Command::Generate {
                style: "anime".into(),
                input: Some(PathBuf::from("me.jpg")),
                output: Some(PathBuf::from("out/anime.png")),
                seed: Some(42),
            }
        );
    }

    #[test]
    fn rejects_bad_command_lines() {
        use clap::error::ErrorKind;

        assert!(parse(&[]).is_err());
        assert_eq!(
            parse(&["generate"]).unwrap_err().kind(),
            ErrorKind::MissingRequiredArgument
        );
        assert_eq!(
            parse(&["paint"]).unwrap_err().kind(),
            ErrorKind::InvalidSubcommand
        );
        assert_eq!(
            parse(&["probe", "now"]).unwrap_err().kind(),
            ErrorKind::UnknownArgument
        );
        assert_eq!(
            parse(&["generate", "pixel", "--seed", "soon"]).unwrap_err().kind(),
            ErrorKind::ValueValidation
        );
    }

    fn demo_generator() -> Generator {
        let config = GeneratorConfig {
            mode: GenerationMode::Demo,
            ..Default::default()
        };
        Generator::new(ComfyUIApi::new("http://127.0.0.1:9"), config)
    }

    fn live_generator_without_backend() -> Generator {
        Generator::new(
            ComfyUIApi::new("http://127.0.0.1:9"),
            GeneratorConfig::default(),
        )
    }

    fn last_state(events: &[GenerationEvent]) -> Option<LifecycleState> {
        events.iter().rev().find_map(|event| match event {
            GenerationEvent::StateChanged { state, .. } => Some(*state),
            _ => None,
        })
    }

    #[tokio::test]
    async fn demo_generate_writes_png_and_records_completion() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("cute.png");
        let mut history = GenerationHistory::with_capacity(5);

        let record = generate(&demo_generator(), &mut history, "cute", None, &output, None)
            .await
            .unwrap();

        let written = std::fs::read(&output).unwrap();
        assert_eq!(&written[..8], b"\x89PNG\r\n\x1a\n");
        assert_eq!(record.status, GenerationStatus::Completed);
        assert!(record.is_demo);
        assert_eq!(record.style, Style::Cute);
        assert_eq!(history.len(), 1);
        assert_eq!(history.latest().map(|r| r.id), Some(record.id));
    }

    #[tokio::test]
    async fn live_failure_is_recorded_as_failed() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("pixel.png");
        let mut history = GenerationHistory::with_capacity(5);

        let result = generate(
            &live_generator_without_backend(),
            &mut history,
            "pixel",
            None,
            &output,
            None,
        )
        .await;

        assert!(result.is_err());
        assert!(!output.exists());
        let record = history.latest().unwrap();
        assert_eq!(record.status, GenerationStatus::Failed);
        assert!(record.error.is_some());
    }

    #[tokio::test]
    async fn unwritable_output_is_recorded_as_failed() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("no_such_dir").join("out.png");
        let mut history = GenerationHistory::with_capacity(5);

        let result = generate(&demo_generator(), &mut history, "pixel", None, &output, None).await;

        assert!(result.is_err());
        assert_eq!(history.len(), 1);
        let record = history.latest().unwrap();
        assert_eq!(record.status, GenerationStatus::Failed);
        assert!(record.result_image.is_none());
        assert_matches!(&record.error, Some(message) if message.contains("Failed to write"));
    }

    #[tokio::test]
    async fn missing_input_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = GenerationHistory::default();
        let result = generate(
            &demo_generator(),
            &mut history,
            "pixel",
            Some(&dir.path().join("absent.jpg")),
            &dir.path().join("out.png"),
            None,
        )
        .await;

        assert!(result.is_err());
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn terminal_state_is_logged_on_success() {
        let (result, events) =
            generate_logged(&demo_generator(), &GenerationRequest::new("cartoon")).await;

        assert!(result.is_ok());
        assert_eq!(last_state(&events), Some(LifecycleState::Completed));
        assert_matches!(
            events.first(),
            Some(GenerationEvent::StateChanged { state: LifecycleState::NotStarted, .. })
        );
    }

    #[tokio::test]
    async fn terminal_state_is_logged_on_failure() {
        let (result, events) = generate_logged(
            &live_generator_without_backend(),
            &GenerationRequest::new("pixel"),
        )
        .await;

        assert_matches!(result, Err(GenerateError::Connectivity(_)));
        assert_eq!(last_state(&events), Some(LifecycleState::Failed));
    }
}
