//! Small shared helpers.
//!
//! This module provides:
//! - Static pattern compilation (CSS selectors and regexes)
//! - Log sanitization for raw protocol bytes

pub mod sanitize;
mod selector;

pub use sanitize::sanitize_for_log;
pub use selector::{compile_regex_unsafe, parse_selector_unsafe};
