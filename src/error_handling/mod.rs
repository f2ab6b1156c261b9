//! Error handling.
//!
//! This module provides the error enums of every layer (reactor, socket,
//! response parsing, url parsing, fetching, extraction, initialization) and
//! the failure categorization used for reporting.
//!
//! Failures are categorized into:
//! - **Resolution**: the host cannot be resolved
//! - **Transport**: descriptor creation, connect, TLS or I/O errors
//! - **Protocol parse**: malformed status line, header line or redirect target
//! - **Policy**: redirect budget exhausted
//! - **Peer closed early**: disconnect before the body was complete

mod types;

// Re-export public API
pub use types::{
    ExtractError, FailureKind, FetchError, InitializationError, ParseError, ReactorError,
    SocketError, UrlError,
};
