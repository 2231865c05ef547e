//! Command-line worker for the MiniYou stylizer: configuration from the
//! environment and the `probe`, `styles` and `generate` commands.

pub mod commands;
pub mod config;
