//! Configuration types and CLI options.
//!
//! This module defines enums and structs used for command-line argument parsing
//! and configuration.

use clap::{Parser, ValueEnum};

use crate::config::constants::DEFAULT_URL;

/// Log output format.
///
/// Controls how log messages are formatted:
/// - `Plain`: Human-readable format with colors (default)
/// - `Json`: Structured JSON format for machine parsing
#[derive(Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable format with colors (default)
    Plain,
    /// Structured JSON format for machine parsing
    Json,
}

/// Format of the extracted link list printed on stdout.
#[derive(Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// `{ news: [ {title:"..", link:".."} ]}` with unquoted keys
    Relaxed,
    /// Standard JSON with quoted keys
    Json,
}

/// Command-line options.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "brief_fetcher",
    about = "Fetches a page and prints the links of its \"The Brief\" section as JSON"
)]
pub struct Opt {
    /// Page to fetch (http or https)
    #[arg(default_value = DEFAULT_URL)]
    pub url: String,

    /// Verbose diagnostic logging (request, response headers, TLS and socket events)
    #[arg(short, long)]
    pub verbose: bool,

    /// Log format
    #[arg(long, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Output format for the extracted links
    #[arg(long, value_enum, default_value_t = OutputFormat::Relaxed)]
    pub output: OutputFormat,
}

impl Opt {
    /// Log level implied by the verbosity flag.
    pub fn log_level(&self) -> log::LevelFilter {
        if self.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        }
    }
}

impl Default for Opt {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            verbose: false,
            log_format: LogFormat::Plain,
            output: OutputFormat::Relaxed,
        }
    }
}
