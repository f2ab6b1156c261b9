//! HTTP header name constants.
//!
//! Request header names are written as sent on the wire. Response header
//! names are lowercase because the response parser lowercases every name.

// Request headers
pub const HEADER_HOST: &str = "Host";
pub const HEADER_ACCEPT: &str = "Accept";
pub const HEADER_USER_AGENT: &str = "User-Agent";
pub const HEADER_CONNECTION: &str = "Connection";

/// The only connection policy the client supports.
pub const CONNECTION_CLOSE: &str = "close";

// Response headers (lowercased)
pub const HEADER_CONTENT_LENGTH: &str = "content-length";
pub const HEADER_LOCATION: &str = "location";
pub const HEADER_TRANSFER_ENCODING: &str = "transfer-encoding";
