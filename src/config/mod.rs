// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Config loader and validator
//
// Loads chatrelay.yaml, validates structure, resolves variable
// interpolation, fills defaults, and computes a config hash for logs.

mod error;
mod interpolation;
mod loader;
mod raw;
mod source;
mod types;

pub use error::ConfigError;
pub use interpolation::resolve_variables;
pub use loader::{compute_hash, load_config};
pub use source::{ConfigSource, FileSource, StringSource};
pub use types::{
    CommandConfig, Config, Credentials, SessionConfig, UpstreamConfig, VariantConfig,
};

#[cfg(test)]
mod tests;
