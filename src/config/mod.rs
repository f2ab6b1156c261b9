//! Application configuration and constants.
//!
//! This module provides:
//! - Configuration constants (read sizes, redirect budget, request defaults)
//! - HTTP header name constants
//! - CLI option types and parsing

mod constants;
mod headers;
mod types;

// Re-export all constants
pub use constants::*;
pub use headers::*;
pub use types::{LogFormat, Opt, OutputFormat};
