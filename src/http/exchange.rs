//! Incremental response assembly for one request/response exchange.
//!
//! [`Exchange`] is a pure state machine: bytes go in through
//! [`Exchange::feed`] in whatever pieces the transport delivers, and each call
//! reports whether the response is still incomplete, finished, redirected or
//! malformed. No I/O happens here, which makes every framing rule testable
//! without a socket.

use log::debug;

use crate::config::{HEADER_TRANSFER_ENCODING, READ_CHUNK_SIZE};
use crate::error_handling::{FetchError, SocketError};
use crate::http::response::{find_head_end, parse_head, ResponseHead};
use crate::utils::sanitize_for_log;

/// Result of feeding bytes into an [`Exchange`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// Keep reading.
    NeedMore,
    /// A 3xx with a `location` header; the body is never read.
    Redirect { status: u16, location: String },
    /// The complete body.
    Complete(Vec<u8>),
    /// The response is malformed or unsupported.
    Failed(FetchError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    /// Exactly this many body bytes.
    Length(usize),
    /// Body runs until the peer closes the connection.
    UntilClose,
}

#[derive(Debug)]
enum Phase {
    Head,
    Body(Framing),
    Done,
}

#[derive(Debug)]
pub struct Exchange {
    buffer: Vec<u8>,
    phase: Phase,
    head: Option<ResponseHead>,
}

impl Default for Exchange {
    fn default() -> Self {
        Self::new()
    }
}

impl Exchange {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            phase: Phase::Head,
            head: None,
        }
    }

    /// Accumulates `data` and advances the exchange.
    ///
    /// Once a terminal result (`Redirect`, `Complete`, `Failed`) has been
    /// returned, further input is ignored and `NeedMore` is returned.
    pub fn feed(&mut self, data: &[u8]) -> Progress {
        if matches!(self.phase, Phase::Done) {
            return Progress::NeedMore;
        }
        self.buffer.extend_from_slice(data);

        if matches!(self.phase, Phase::Head) {
            if let Some(progress) = self.try_parse_head() {
                return progress;
            }
        }

        match self.phase {
            Phase::Body(Framing::Length(expected)) if self.buffer.len() >= expected => {
                self.buffer.truncate(expected);
                self.phase = Phase::Done;
                Progress::Complete(std::mem::take(&mut self.buffer))
            }
            _ => Progress::NeedMore,
        }
    }

    /// Parses the head once the blank line has arrived. `Some` carries a
    /// terminal result; `None` means continue with the body (or wait).
    fn try_parse_head(&mut self) -> Option<Progress> {
        let (head_len, body_start) = find_head_end(&self.buffer)?;
        debug!(
            "response head:\n{}",
            sanitize_for_log(&self.buffer[..head_len])
        );
        let head = match parse_head(&self.buffer[..head_len]) {
            Ok(head) => head,
            Err(e) => return Some(self.fail(e.into())),
        };
        self.buffer.drain(..body_start);

        if head.is_redirect() {
            if let Some(location) = head.location() {
                let progress = Progress::Redirect {
                    status: head.status,
                    location: location.to_string(),
                };
                self.buffer.clear();
                self.head = Some(head);
                self.phase = Phase::Done;
                return Some(progress);
            }
        }

        let framing = match head.content_length() {
            Some(length) => Framing::Length(length),
            None if head.has_no_body() => Framing::Length(0),
            None if head.is_chunked() => {
                let coding = head
                    .headers
                    .get(HEADER_TRANSFER_ENCODING)
                    .unwrap_or_default()
                    .to_string();
                return Some(self.fail(FetchError::UnsupportedTransferEncoding(coding)));
            }
            None => Framing::UntilClose,
        };
        self.head = Some(head);
        self.phase = Phase::Body(framing);
        None
    }

    fn fail(&mut self, error: FetchError) -> Progress {
        self.buffer.clear();
        self.phase = Phase::Done;
        Progress::Failed(error)
    }

    /// How many bytes the next read should ask for: the default chunk while
    /// the head is incomplete, then the remaining body length capped at the
    /// same chunk size.
    pub fn next_read_size(&self) -> usize {
        match self.phase {
            Phase::Body(Framing::Length(expected)) => expected
                .saturating_sub(self.buffer.len())
                .clamp(1, READ_CHUNK_SIZE),
            _ => READ_CHUNK_SIZE,
        }
    }

    /// Resolves the exchange when the peer closed the connection.
    ///
    /// Only a close-delimited body is complete at this point; anything else
    /// ended early.
    pub fn finish_on_close(&mut self) -> Result<Vec<u8>, FetchError> {
        let phase = std::mem::replace(&mut self.phase, Phase::Done);
        match phase {
            Phase::Body(Framing::UntilClose) => Ok(std::mem::take(&mut self.buffer)),
            Phase::Body(Framing::Length(expected)) => Err(FetchError::PeerClosedEarly {
                received: self.buffer.len(),
                expected,
            }),
            Phase::Head | Phase::Done => Err(SocketError::PeerClosed.into()),
        }
    }

    /// Parsed head, once available.
    pub fn head(&self) -> Option<&ResponseHead> {
        self.head.as_ref()
    }

    pub fn headers_parsed(&self) -> bool {
        self.head.is_some()
    }

    /// Declared body length, when the body is length-delimited.
    pub fn expected_len(&self) -> Option<usize> {
        match self.phase {
            Phase::Body(Framing::Length(expected)) => Some(expected),
            _ => None,
        }
    }

    /// Bytes buffered so far: the partial head, or the body received so far.
    pub fn received(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_done(&self) -> bool {
        matches!(self.phase, Phase::Done)
    }
}
