//! Stream-pointer URLs: `mascara://<id>.<kind>`.
//!
//! A pointer is the wire name of an embedded stream. It travels as a plain
//! string inside a response's `result` array, and then as the `method` of
//! every notification that carries the stream's I/O. The `<kind>` suffix
//! records the stream's role *as seen by the peer that minted it*.

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use crate::ProtocolError;

/// The fixed URL scheme for stream pointers.
pub const POINTER_SCHEME: &str = "mascara";

/// A stream's role from the minting side's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// The minting side produces data; it flows toward the receiver.
    Readable,
    /// The minting side consumes data; it flows toward the minter.
    Writable,
}

impl StreamKind {
    /// The `<kind>` component as it appears in the URL.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Readable => "readable",
            Self::Writable => "writable",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed stream pointer.
///
/// `Display` renders the canonical URL, which is also the map key used by
/// the stream registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamPointer {
    id: String,
    kind: StreamKind,
}

impl StreamPointer {
    /// Mints a pointer with a freshly generated unique id.
    pub fn mint(kind: StreamKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
        }
    }

    /// The opaque id component.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The kind component (the minting side's view).
    pub fn kind(&self) -> StreamKind {
        self.kind
    }
}

impl fmt::Display for StreamPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{POINTER_SCHEME}://{}.{}", self.id, self.kind)
    }
}

impl FromStr for StreamPointer {
    type Err = ProtocolError;

    /// Parses `mascara://<id>.<kind>`.
    ///
    /// The host component is split on its *last* `.` so ids may themselves
    /// contain dots. The id must be non-empty and stick to URL host
    /// characters.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ProtocolError::InvalidPointer(s.to_string());

        let host = s
            .strip_prefix(POINTER_SCHEME)
            .and_then(|rest| rest.strip_prefix("://"))
            .ok_or_else(invalid)?;
        let (id, kind) = host.rsplit_once('.').ok_or_else(invalid)?;

        let kind = match kind {
            "readable" => StreamKind::Readable,
            "writable" => StreamKind::Writable,
            _ => return Err(invalid()),
        };

        if id.is_empty() || !id.chars().all(is_host_char) {
            return Err(invalid());
        }

        Ok(Self {
            id: id.to_string(),
            kind,
        })
    }
}

/// Unreserved URL host characters; covers UUID-class opaque tokens.
fn is_host_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~')
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mint_parse_round_trip() {
        for kind in [StreamKind::Readable, StreamKind::Writable] {
            let pointer = StreamPointer::mint(kind);
            let url = pointer.to_string();
            let parsed: StreamPointer = url.parse().unwrap();
            assert_eq!(parsed, pointer);
            assert_eq!(parsed.kind(), kind);
        }
    }

    #[test]
    fn test_display_shape() {
        let pointer: StreamPointer =
            "mascara://abc-123.readable".parse().unwrap();
        assert_eq!(pointer.id(), "abc-123");
        assert_eq!(pointer.to_string(), "mascara://abc-123.readable");
    }

    #[test]
    fn test_minted_ids_are_unique() {
        let a = StreamPointer::mint(StreamKind::Readable);
        let b = StreamPointer::mint(StreamKind::Readable);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_id_may_contain_dots() {
        // The kind is split off the last dot.
        let pointer: StreamPointer =
            "mascara://a.b.c.writable".parse().unwrap();
        assert_eq!(pointer.id(), "a.b.c");
        assert_eq!(pointer.kind(), StreamKind::Writable);
    }

    #[test]
    fn test_rejects_wrong_scheme() {
        assert!("http://abc.readable".parse::<StreamPointer>().is_err());
        assert!("mascara:/abc.readable".parse::<StreamPointer>().is_err());
        assert!("abc.readable".parse::<StreamPointer>().is_err());
    }

    #[test]
    fn test_rejects_bad_kind() {
        assert!("mascara://abc.duplex".parse::<StreamPointer>().is_err());
        assert!("mascara://abc".parse::<StreamPointer>().is_err());
    }

    #[test]
    fn test_rejects_bad_id() {
        assert!("mascara://.readable".parse::<StreamPointer>().is_err());
        assert!("mascara://a b.readable".parse::<StreamPointer>().is_err());
        assert!("mascara://a/b.readable".parse::<StreamPointer>().is_err());
    }

    #[test]
    fn test_plain_method_names_are_not_pointers() {
        assert!("echo".parse::<StreamPointer>().is_err());
        assert!("".parse::<StreamPointer>().is_err());
    }
}
