//! relay - prompt relay for coding agent CLIs
//!
//! Sends a prompt to one of several locally installed agent CLIs (Claude
//! Code, Codex, Cursor, Gemini), classifying failures and failing over to
//! the next provider behind circuit breakers, rate-limit windows and health
//! scores.

// Note: deny (not forbid) to allow #[allow(unsafe_code)] in test helpers for env var manipulation
#![deny(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod core;
pub mod error;
pub mod providers;
pub mod render;
pub mod storage;
pub mod util;

/// Test utilities module - included in test builds or when test-utils feature is enabled.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::{ExitCode, RelayError, Result};
