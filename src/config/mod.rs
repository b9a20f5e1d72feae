//! Configuration loading: a single TOML file, every field defaulted so an
//! empty file is valid, overridable by a handful of environment variables.

mod config;

pub use config::*;
