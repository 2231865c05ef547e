//! ComfyUI job client for portrait stylization.
//!
//! Builds typed job graphs from the style catalogue, submits them over the
//! ComfyUI REST API, polls for completion with a fixed interval and a
//! wall-clock ceiling, and returns the result image as base64.

pub mod api;
pub mod demo;
pub mod error;
pub mod events;
pub mod generator;
pub mod history;
pub mod poller;
pub mod workflow;

pub use api::{ComfyUIApi, ComfyUIApiError};
pub use error::GenerateError;
pub use generator::{
    GenerationMode, GenerationOutput, GenerationRequest, Generator, GeneratorConfig,
};
pub use poller::PollConfig;
