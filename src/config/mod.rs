//! Configuration model for targetlock.
//!
//! This module defines the Config struct that represents `<store>/config.yaml`.
//! It supports forward-compatible YAML parsing (unknown fields are ignored),
//! sensible defaults for every field, and validation of config values.

mod model;
mod operations;


pub use model::Config;
