//! brief_fetcher library: a single-threaded readiness-driven HTTP(S) client
//! and the "The Brief" extractor built on top of it.
//!
//! The I/O core is layered leaf to root:
//!
//! - [`Reactor`]: epoll wait loop dispatching readiness to registered devices
//! - [`Device`] / [`Descriptor`]: ownership of one descriptor and its raw I/O
//! - [`Socket`]: non-blocking TCP connect with an optional rustls TLS layer
//! - [`HttpClient`]: one GET request with redirect following, delivered to a
//!   single completion callback
//! - [`Url`]: absolute http/https URL parsing
//!
//! # Example
//!
//! ```no_run
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use brief_fetcher::{HttpClient, Reactor};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let reactor = Reactor::factory("epoll")?;
//! let client = HttpClient::new(&reactor, "http://example.com/")?;
//!
//! let body = Rc::new(RefCell::new(None));
//! let sink = Rc::clone(&body);
//! let weak = Rc::downgrade(&reactor);
//! client.execute(move |result| {
//!     *sink.borrow_mut() = Some(result);
//!     if let Some(reactor) = weak.upgrade() {
//!         reactor.stop();
//!     }
//! });
//! if client.is_in_flight() {
//!     reactor.start()?;
//! }
//! println!("{:?}", body.borrow());
//! # Ok(())
//! # }
//! ```

pub mod config;
mod device;
pub mod error_handling;
pub mod http;
pub mod initialization;
pub mod parse;
mod reactor;
mod socket;
mod url;
mod utils;

// Re-export public API
pub use device::{Descriptor, Device};
pub use error_handling::{
    ExtractError, FailureKind, FetchError, InitializationError, ParseError, ReactorError,
    SocketError, UrlError,
};
pub use http::HttpClient;
pub use reactor::Reactor;
pub use socket::{Socket, SocketState};
pub use self::url::{Scheme, Url};
