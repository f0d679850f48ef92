//! Core pipeline orchestration and domain logic for Paperboy.
//!
//! This crate ties together discovery, article fetching, document assembly,
//! and EPUB writing into the end-to-end [`pipeline::run`].

pub mod assembler;
pub mod pipeline;

pub use assembler::{AssembleConfig, Assembler, downscale_url, edition_title, find_image_ref};
pub use pipeline::{ProgressReporter, RunConfig, RunResult, SilentProgress, run, write_artifact};
