//! HTTP byte ranges (`Range: bytes=...`).
//!
//! Only single ranges are understood. Anything else is treated as if no
//! `Range` header had been sent, which RFC 9110 permits.

use crate::error::{StorageError, StorageResult};

/// A parsed, not yet resolved, range request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRequest {
    /// `bytes=start-end` with either bound optional
    Bounded { start: Option<u64>, end: Option<u64> },
    /// `bytes=-N`: the last N bytes
    Suffix(u64),
}

/// An inclusive byte span within a file of known size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl RangeRequest {
    /// Parse a `Range` header value. Returns `None` when the header should be ignored.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        let (unit, spec) = value.split_once('=')?;
        if !unit.trim().eq_ignore_ascii_case("bytes") {
            return None;
        }

        let spec = spec.trim();
        if spec.contains(',') {
            return None;
        }

        let (start, end) = spec.split_once('-')?;
        let start = parse_bound(start)?;
        let end = parse_bound(end)?;

        match (start, end) {
            (None, None) => None,
            (None, Some(n)) => Some(RangeRequest::Suffix(n)),
            (start, end) => Some(RangeRequest::Bounded { start, end }),
        }
    }

    /// Resolve against a file of `size` bytes, clamping the end to the file.
    pub fn resolve(&self, size: u64) -> StorageResult<ByteRange> {
        let unsatisfiable = || StorageError::RangeNotSatisfiable { size };
        if size == 0 {
            return Err(unsatisfiable());
        }
        let last = size - 1;

        let (start, end) = match *self {
            RangeRequest::Suffix(0) => return Err(unsatisfiable()),
            RangeRequest::Suffix(n) => (size.saturating_sub(n), last),
            RangeRequest::Bounded { start, end } => {
                (start.unwrap_or(0), end.map_or(last, |e| e.min(last)))
            }
        };

        if start >= size || start > end {
            return Err(unsatisfiable());
        }
        Ok(ByteRange { start, end })
    }
}

/// `Some(None)` for an empty bound, `None` for a malformed one.
fn parse_bound(s: &str) -> Option<Option<u64>> {
    let s = s.trim();
    if s.is_empty() {
        return Some(None);
    }
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<u64>().ok().map(Some)
}

impl ByteRange {
    /// Number of bytes in the span.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` value for a partial response.
    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, size)
    }
}

/// `Content-Range` value for a 416 response.
pub fn unsatisfied_content_range(size: u64) -> String {
    format!("bytes */{}", size)
}
