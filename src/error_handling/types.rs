//! Error type definitions.
//!
//! This module defines all error types used throughout the application, one
//! enum per layer, plus the coarse [`FailureKind`] category used for reporting.

use std::io;
use std::os::unix::io::RawFd;

use log::SetLoggerError;
use strum_macros::EnumIter as EnumIterMacro;
use thiserror::Error;

/// Error types for initialization failures.
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)] // All variants end with "Error" by convention
pub enum InitializationError {
    /// Error initializing the logger.
    #[error("Logger initialization error: {0}")]
    LoggerError(#[from] SetLoggerError),

    /// Error building the shared TLS client configuration.
    #[error("TLS configuration error: {0}")]
    TlsConfigError(#[from] rustls::Error),
}

/// Errors raised by the reactor.
///
/// Registration errors are returned to the caller and the registration is
/// refused. `UnexpectedEvents` and `Wait` terminate [`crate::Reactor::start`].
#[derive(Error, Debug)]
pub enum ReactorError {
    /// No backend with this name exists.
    #[error("unknown reactor backend: {0}")]
    UnknownBackend(String),

    /// The multiplexing facility could not be created.
    #[error("failed to init reactor: {0}")]
    Init(#[source] io::Error),

    /// The device has no open descriptor.
    #[error("device is not open")]
    DeviceNotOpen,

    /// The descriptor is already known to this reactor.
    #[error("descriptor {0} is already registered")]
    AlreadyRegistered(RawFd),

    /// The multiplexing facility rejected the descriptor.
    #[error("failed to add fd {fd} to epoll: {source}")]
    Register {
        fd: RawFd,
        #[source]
        source: io::Error,
    },

    /// An error/hangup condition the device did not handle.
    #[error("got unexpected events {events:#x} on fd {fd}")]
    UnexpectedEvents { fd: RawFd, events: u32 },

    /// Waiting for readiness failed.
    #[error("epoll_wait failed: {0}")]
    Wait(#[source] io::Error),
}

/// Failures of a [`crate::Socket`], recorded before the disconnected callback runs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SocketError {
    #[error("dns resolve failed for {0}")]
    Resolve(String),

    #[error("failed to create socket: {0}")]
    Create(String),

    #[error("error connecting to {addr}: {reason}")]
    Connect { addr: String, reason: String },

    #[error("failed to register socket with reactor: {0}")]
    Register(String),

    #[error("SSL context init error: {0}")]
    TlsSetup(String),

    #[error("SSL failure: {0}")]
    Tls(String),

    #[error("socket I/O failed: {0}")]
    Io(String),

    #[error("connection closed by peer")]
    PeerClosed,
}

/// Malformed response head.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("malformed status line: {0:?}")]
    StatusLine(String),

    #[error("status code out of range: {0:?}")]
    StatusOutOfRange(String),

    #[error("header line without colon: {0:?}")]
    HeaderWithoutColon(String),

    #[error("empty header name: {0:?}")]
    EmptyHeaderName(String),
}

/// Url parse failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UrlError {
    #[error("invalid url: {0:?}")]
    Invalid(String),

    #[error("invalid port in url: {0:?}")]
    InvalidPort(String),
}

/// Why an `HttpClient::execute` call produced no body.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// DNS, connect, TLS or socket I/O failure (including a peer that closed
    /// before sending a complete response head).
    #[error(transparent)]
    Socket(#[from] SocketError),

    #[error("failed to parse headers: {0}")]
    Parse(#[from] ParseError),

    #[error("redirect failed early: {0}")]
    Redirect(#[source] UrlError),

    #[error("too many redirects")]
    TooManyRedirects,

    #[error("connection closed after {received} of {expected} body bytes")]
    PeerClosedEarly { received: usize, expected: usize },

    #[error("unsupported transfer-encoding: {0}")]
    UnsupportedTransferEncoding(String),

    #[error("request target {0:?} is not a valid url")]
    InvalidUrl(#[source] UrlError),

    /// `execute()` was called again before this request finished.
    #[error("request superseded by a new execute() call")]
    Superseded,
}

/// Coarse failure categories of a fetch.
///
/// The completion callback only tells success from failure; the category is
/// reported on the logging side channel and in the CLI exit message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIterMacro)]
pub enum FailureKind {
    /// Host cannot be resolved
    Resolution,
    /// Descriptor creation, connect, TLS handshake or I/O error
    Transport,
    /// Malformed status line, header line or redirect target
    ProtocolParse,
    /// Redirect budget exhausted, or the request was superseded
    Policy,
    /// Peer disconnected before the response was complete
    PeerClosedEarly,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Resolution => "resolution failure",
            FailureKind::Transport => "transport failure",
            FailureKind::ProtocolParse => "protocol parse failure",
            FailureKind::Policy => "policy failure",
            FailureKind::PeerClosedEarly => "peer closed early",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FetchError {
    /// Maps the error onto its failure category.
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::Socket(SocketError::Resolve(_)) => FailureKind::Resolution,
            FetchError::Socket(SocketError::PeerClosed) => FailureKind::PeerClosedEarly,
            FetchError::Socket(_) => FailureKind::Transport,
            FetchError::Parse(_)
            | FetchError::Redirect(_)
            | FetchError::UnsupportedTransferEncoding(_)
            | FetchError::InvalidUrl(_) => FailureKind::ProtocolParse,
            FetchError::TooManyRedirects | FetchError::Superseded => FailureKind::Policy,
            FetchError::PeerClosedEarly { .. } => FailureKind::PeerClosedEarly,
        }
    }
}

/// Failures of the brief extractor.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("\"The Brief\" not found")]
    BriefNotFound,

    #[error("invalid html for Brief")]
    InvalidBrief,

    #[error("invalid page url {url:?}: {source}")]
    BaseUrl {
        url: String,
        #[source]
        source: ::url::ParseError,
    },

    #[error("failed to serialize links: {0}")]
    Serialize(#[from] serde_json::Error),
}
