#![deny(missing_docs)]
//! Channel commenter library.
//!
//! Watches Telegram channels and comments on new posts in their discussion
//! groups, continuing the threads it starts up to a per-thread quota.

/// Telegram transport over teloxide.
pub mod bot;
/// Comment orchestration core.
pub mod commenter;
/// Configuration management.
pub mod config;
/// Comment text generation.
pub mod llm;
/// Utility functions.
pub mod utils;
