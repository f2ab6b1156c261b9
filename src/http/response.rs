//! Response head parsing.
//!
//! The head is everything up to the first blank line. Header names are
//! trimmed and lowercased; repeated headers are joined with `", "`.

use std::collections::BTreeMap;

use crate::config::{HEADER_CONTENT_LENGTH, HEADER_LOCATION, HEADER_TRANSFER_ENCODING};
use crate::error_handling::ParseError;

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Response headers keyed by lowercased name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    /// Adds a header. A repeated name has its value appended after `", "`.
    pub fn insert(&mut self, name: &str, value: &str) {
        let name = name.trim().to_ascii_lowercase();
        let value = value.trim();
        self.0
            .entry(name)
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }

    /// Looks a header up by name, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Status line and headers of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub reason: String,
    pub headers: Headers,
}

impl ResponseHead {
    /// Declared body length.
    ///
    /// Leading digits are taken (`"12abc"` is 12) and a value without leading
    /// digits counts as 0. `None` when the header is absent.
    pub fn content_length(&self) -> Option<usize> {
        self.headers
            .get(HEADER_CONTENT_LENGTH)
            .map(|value| leading_number(value).unwrap_or(0))
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }

    pub fn location(&self) -> Option<&str> {
        self.headers.get(HEADER_LOCATION)
    }

    /// Whether the body uses chunked transfer coding.
    pub fn is_chunked(&self) -> bool {
        self.headers
            .get(HEADER_TRANSFER_ENCODING)
            .is_some_and(|te| te.to_ascii_lowercase().contains("chunked"))
    }

    /// Statuses that never carry a body: 1xx, 204 and 304.
    pub fn has_no_body(&self) -> bool {
        (100..200).contains(&self.status) || self.status == 204 || self.status == 304
    }
}

/// Offset of the blank line ending the head, and the offset where the body starts.
pub fn find_head_end(buffer: &[u8]) -> Option<(usize, usize)> {
    buffer
        .windows(HEAD_TERMINATOR.len())
        .position(|w| w == HEAD_TERMINATOR)
        .map(|pos| (pos, pos + HEAD_TERMINATOR.len()))
}

/// Parses a raw head (status line and header lines, without the blank line).
///
/// # Errors
///
/// Fails on a status line that does not have `version code`, a code outside
/// `[100, 600)`, a header line without a colon, or an empty header name.
pub fn parse_head(raw: &[u8]) -> Result<ResponseHead, ParseError> {
    let text = String::from_utf8_lossy(raw);
    let mut lines = text.split("\r\n");
    let status_line = lines.next().unwrap_or_default();
    let (status, reason) = parse_status_line(status_line)?;

    let mut headers = Headers::default();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            return Err(ParseError::HeaderWithoutColon(line.to_string()));
        };
        if name.trim().is_empty() {
            return Err(ParseError::EmptyHeaderName(line.to_string()));
        }
        headers.insert(name, value);
    }

    Ok(ResponseHead {
        status,
        reason,
        headers,
    })
}

/// Splits `HTTP/1.1 200 OK` on its first two spaces. The reason phrase may
/// be missing or empty.
// A line with no second space (`HTTP/1.0 204`) is accepted, not rejected.
fn parse_status_line(line: &str) -> Result<(u16, String), ParseError> {
    let mut parts = line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    let code = parts.next().unwrap_or_default();
    let reason = parts.next().unwrap_or_default().trim().to_string();

    if version.is_empty() || code.is_empty() {
        return Err(ParseError::StatusLine(line.to_string()));
    }
    let status = leading_number(code).ok_or_else(|| ParseError::StatusLine(line.to_string()))?;
    if !(100..600).contains(&status) {
        return Err(ParseError::StatusOutOfRange(line.to_string()));
    }
    // Bounded by the range check above.
    Ok((status as u16, reason))
}

/// Parses the leading decimal digits of `value` (after leading whitespace),
/// saturating on overflow. `None` if there are no leading digits.
fn leading_number(value: &str) -> Option<usize> {
    let digits: &str = {
        let trimmed = value.trim_start();
        let end = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        &trimmed[..end]
    };
    if digits.is_empty() {
        return None;
    }
    Some(digits.bytes().fold(0usize, |acc, d| {
        acc.saturating_mul(10).saturating_add(usize::from(d - b'0'))
    }))
}
