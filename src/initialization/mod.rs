//! Process-wide initialization: the logger and the shared TLS client configuration.
//!
//! All initialization functions return proper error types for error handling.

mod logger;
mod tls;

// Re-export public API
pub use logger::init_logger_with;
pub use tls::tls_client_config;
