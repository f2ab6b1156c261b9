//! Extraction of the "The Brief" section from a fetched page.
//!
//! Parsing of the link list uses CSS selectors via the `scraper` crate.

mod brief;

// Re-export public API
pub use brief::{extract, extract_div, links, links_to_json, links_to_strict_json, Links};
