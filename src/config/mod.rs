//! Configuration module for Recipe-Ingest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use recipe_ingest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("ingest.toml")).unwrap();
//! println!("Providers configured: {}", config.providers.len());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, IngestConfig, ProviderEntry, UserAgentConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
