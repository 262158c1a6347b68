//! Shared utilities for reportwatch.
//!
//! This crate provides common utilities used across the reportwatch workspace:
//! - Logging setup with tracing
//! - Platform directories and root-relative path handling

pub mod log;
pub mod path;

pub use log::{LogConfig, LogLevel};
