//! Shared domain types for the MiniYou portrait stylizer.
//!
//! Holds the static style catalogue, the UI-facing generation record and
//! its bounded history, and the error type shared by the other crates.

pub mod error;
pub mod generation;
pub mod style;
pub mod types;
