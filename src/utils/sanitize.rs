//! Rendering raw protocol bytes for diagnostic logs.
//!
//! Response heads come straight off the wire and may contain anything.
//! Control characters other than tab and line breaks are dropped, and very
//! long input is truncated.

/// Longest rendering produced by [`sanitize_for_log`], in characters.
pub const MAX_LOG_BYTES: usize = 2048;

/// Lossily decodes `bytes` as UTF-8 and removes control characters.
///
/// # Arguments
///
/// * `bytes` - Raw bytes to render
///
/// # Returns
///
/// A printable string of at most `MAX_LOG_BYTES` characters, followed by a
/// truncation marker when the input was longer.
pub fn sanitize_for_log(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let mut out: String = text
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .take(MAX_LOG_BYTES)
        .collect();
    let total = text.chars().count();
    if total > MAX_LOG_BYTES {
        out.push_str(&format!("... (truncated, {total} chars)"));
    }
    out
}
