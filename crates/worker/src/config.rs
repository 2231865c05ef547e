//! Worker configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use miniyou_comfyui::api::DEFAULT_API_URL;
use miniyou_comfyui::workflow::{EncoderSettings, DEFAULT_CHECKPOINT, DEFAULT_IMAGE_SIZE};
use miniyou_comfyui::{
    ComfyUIApi, ComfyUIApiError, GenerationMode, Generator, GeneratorConfig, PollConfig,
};
use miniyou_core::generation::DEFAULT_HISTORY_CAPACITY;

/// A variable was set to something unparseable.
#[derive(Debug, thiserror::Error)]
#[error("{var} must be {expected}, got '{value}'")]
pub struct ConfigError {
    pub var: &'static str,
    pub expected: &'static str,
    pub value: String,
}

/// Worker configuration.
///
/// All fields have defaults suitable for a local ComfyUI install.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub comfyui_url: String,
    pub mode: GenerationMode,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    /// Per-HTTP-request timeout.
    pub request_timeout: Duration,
    pub checkpoint: String,
    pub image_size: u32,
    pub history_capacity: usize,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                       |
    /// |------------------------|-------------------------------|
    /// | `COMFYUI_URL`          | `http://localhost:8188`       |
    /// | `GENERATION_MODE`      | `live`                        |
    /// | `POLL_INTERVAL_MS`     | `2000`                        |
    /// | `POLL_TIMEOUT_SECS`    | `60`                          |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                          |
    /// | `CHECKPOINT_NAME`      | `sd_v1-5-pruned-emaonly.ckpt` |
    /// | `IMAGE_SIZE`           | `512`                         |
    /// | `HISTORY_CAPACITY`     | `50`                          |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let comfyui_url = lookup("COMFYUI_URL").unwrap_or_else(|| DEFAULT_API_URL.into());

        let mode = match lookup("GENERATION_MODE") {
            Some(value) => value.parse().map_err(|_| ConfigError {
                var: "GENERATION_MODE",
                expected: "'live' or 'demo'",
                value,
            })?,
            None => GenerationMode::default(),
        };

        let poll_interval_ms: u64 =
            parse_or(&lookup, "POLL_INTERVAL_MS", 2000, "a positive integer")?;
        let poll_timeout_secs: u64 = parse_or(&lookup, "POLL_TIMEOUT_SECS", 60, "a positive integer")?;
        let request_timeout_secs: u64 =
            parse_or(&lookup, "REQUEST_TIMEOUT_SECS", 30, "a positive integer")?;
        let checkpoint = lookup("CHECKPOINT_NAME").unwrap_or_else(|| DEFAULT_CHECKPOINT.into());
        let image_size: u32 = parse_or(&lookup, "IMAGE_SIZE", DEFAULT_IMAGE_SIZE, "a positive integer")?;
        let history_capacity: usize = parse_or(
            &lookup,
            "HISTORY_CAPACITY",
            DEFAULT_HISTORY_CAPACITY,
            "a positive integer",
        )?;

        Ok(Self {
            comfyui_url,
            mode,
            poll_interval: Duration::from_millis(poll_interval_ms),
            poll_timeout: Duration::from_secs(poll_timeout_secs),
            request_timeout: Duration::from_secs(request_timeout_secs),
            checkpoint,
            image_size,
            history_capacity,
        })
    }

    pub fn generator_config(&self) -> GeneratorConfig {
        GeneratorConfig {
            mode: self.mode,
            poll: PollConfig {
                interval: self.poll_interval,
                timeout: self.poll_timeout,
            },
            encoder: EncoderSettings {
                checkpoint: self.checkpoint.clone(),
                image_size: self.image_size,
                ..Default::default()
            },
        }
    }

    pub fn build_generator(&self) -> Result<Generator, ComfyUIApiError> {
        let api = ComfyUIApi::with_timeout(self.comfyui_url.clone(), self.request_timeout)?;
        Ok(Generator::new(api, self.generator_config()))
    }
}

/// Parse a positive number from `var`, falling back to `default` when unset.
fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default,
{
    let Some(value) = lookup(var) else {
        return Ok(default);
    };
    match value.trim().parse::<T>() {
        Ok(parsed) if parsed > T::default() => Ok(parsed),
        _ => Err(ConfigError {
            var,
            expected,
            value,
        }),
    }
}
