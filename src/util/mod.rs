//! Utility functions.

pub mod env;
pub mod format;
pub mod time;

pub use format::{format_cost, format_duration, format_tokens};
pub use time::{format_countdown, format_reset};
