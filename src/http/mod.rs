//! HTTP/1.1 client over the reactor.
//!
//! - `response`: status line and header parsing
//! - `exchange`: incremental framing of one response (head, body, redirect)
//! - `client`: the request lifecycle driven by socket callbacks

mod client;
mod exchange;
mod response;

pub use client::{format_request, Completion, HttpClient};
pub use exchange::{Exchange, Progress};
pub use response::{find_head_end, parse_head, Headers, ResponseHead};
