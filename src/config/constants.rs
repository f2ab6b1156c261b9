//! Configuration constants.
//!
//! This module defines the operational parameters of the fetcher: request
//! defaults, read sizes, the redirect budget and the extraction marker.

// Request defaults
/// Page fetched when no URL is given on the command line.
pub const DEFAULT_URL: &str = "http://time.com";

/// User-Agent sent with every request.
///
/// Some sites serve a stripped page (or nothing) to unknown agents, so the
/// fetcher presents itself as a desktop Firefox.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:72.0) Gecko/20100101 Firefox/72.0";

/// Accept header value. Only textual content is of interest.
pub const ACCEPT: &str = "text/*";

// Response reading
/// Upper bound for a single read from a socket (16KB).
/// Used as-is while the response head is being assembled; once the head is
/// parsed, reads are clamped to the bytes still expected, capped at this value.
pub const READ_CHUNK_SIZE: usize = 16 * 1024;

/// Largest buffer the plain descriptor read primitive allocates for one call (4KB).
/// Larger requests are served as short reads.
pub const DESCRIPTOR_READ_LIMIT: usize = 4 * 1024;

// Redirect handling
/// Redirect budget for one `execute()` call.
/// The counter is decremented on every redirect response; the response that
/// brings it to zero fails the request instead of being followed, so at most
/// `MAX_REDIRECTS - 1` hops are followed.
pub const MAX_REDIRECTS: u8 = 5;

// Reactor
/// Maximum number of readiness events collected per wait cycle.
pub const MAX_EVENTS: usize = 16;

/// Name of the only reactor backend.
pub const EPOLL_BACKEND: &str = "epoll";

// Extraction
/// Text that marks the heading of the section to extract.
pub const BRIEF_MARKER: &str = ">The Brief<";

/// Closing tag searched after the marker; the brief starts right after it.
pub const DIV_CLOSE_TAG: &str = "</div>";
