//! Shared types, error model, and configuration for Paperboy.
//!
//! This crate is the foundation depended on by all other Paperboy crates.
//! It provides:
//! - [`PaperboyError`]: the unified error type
//! - Domain types ([`LinkSet`], [`Article`], [`FetchResult`], [`Artifact`])
//! - Configuration ([`AppConfig`], [`FetchConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ExtractionConfig, FetchConfig, FetchPolicyConfig, ImagePolicy, OutputConfig,
    SourceConfig, config_dir, config_file_path, init_config, init_config_at, load_config,
    load_config_from, load_config_or_default,
};
pub use error::{PaperboyError, Result};
pub use types::{
    Article, ArticleGroup, Artifact, DEFAULT_GROUP, FetchFailure, FetchResult, LinkGroup,
    LinkSet, LocalResource, Section, Subsection,
};
