//! Framing codec: `\r\n`-delimited single-line JSON.
//!
//! The [`Framer`] turns a [`Message`] into bytes; the [`Deframer`] is the
//! stateful inverse, tolerating frames split across arbitrary transport
//! chunks. Standard JSON string escaping guarantees the encoded frame
//! contains no raw `\r\n` other than its terminator.

use crate::{Message, ProtocolError};

/// The two-byte frame terminator.
pub const FRAME_TERMINATOR: &[u8] = b"\r\n";

/// Encodes messages into wire frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct Framer;

impl Framer {
    /// Serializes a message as `UTF8(JSON(message)) || "\r\n"`.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    pub fn frame(&self, message: &Message) -> Result<Vec<u8>, ProtocolError> {
        let mut bytes =
            serde_json::to_vec(message).map_err(ProtocolError::Encode)?;
        bytes.extend_from_slice(FRAME_TERMINATOR);
        Ok(bytes)
    }
}

/// What the deframer does with a complete frame that fails to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodePolicy {
    /// Hold position: re-buffer from the failing frame onward and wait
    /// for more bytes. This is the reference behavior.
    #[default]
    Lenient,

    /// Treat the failure as a protocol violation fatal to the connection.
    Strict,
}

/// Stateful byte-to-message decoder.
///
/// Feed it transport chunks with [`push`](Self::push); it returns every
/// complete, valid message it can parse from the front of its buffer and
/// keeps the rest for the next chunk.
#[derive(Debug)]
pub struct Deframer {
    policy: DecodePolicy,
    buf: Vec<u8>,
}

impl Deframer {
    /// Creates an empty deframer with the given decode policy.
    pub fn new(policy: DecodePolicy) -> Self {
        Self {
            policy,
            buf: Vec::new(),
        }
    }

    /// Appends a chunk and drains every parseable frame from the front.
    ///
    /// The buffer is split on `\r\n`; frames are parsed front to back and
    /// parsing stops at the first failure. Under
    /// [`DecodePolicy::Lenient`] the failing frame and everything after it
    /// are re-joined into the buffer (the split may have crossed a
    /// partial or corrupted frame); under [`DecodePolicy::Strict`] a
    /// complete frame that fails to parse is an error.
    ///
    /// # Errors
    /// Returns `ProtocolError::BadFrame` in strict mode only. The caller
    /// must treat that as fatal to the connection.
    pub fn push(
        &mut self,
        chunk: &[u8],
    ) -> Result<Vec<Message>, ProtocolError> {
        self.buf.extend_from_slice(chunk);

        let mut parts: Vec<&[u8]> = Vec::new();
        let mut rest: &[u8] = &self.buf;
        while let Some(pos) = find_terminator(rest) {
            parts.push(&rest[..pos]);
            rest = &rest[pos + FRAME_TERMINATOR.len()..];
        }
        if parts.is_empty() {
            // No terminator yet; wait for more bytes.
            return Ok(Vec::new());
        }
        // Trailing partial frame (possibly empty).
        parts.push(rest);

        let complete = parts.len() - 1;
        let mut messages = Vec::new();
        let mut consumed = 0;
        for part in &parts[..complete] {
            match serde_json::from_slice::<Message>(part) {
                Ok(msg) => {
                    messages.push(msg);
                    consumed += 1;
                }
                Err(e) => {
                    if self.policy == DecodePolicy::Strict {
                        return Err(ProtocolError::BadFrame(e.to_string()));
                    }
                    break;
                }
            }
        }

        let remainder = parts[consumed..].join(FRAME_TERMINATOR);
        self.buf = remainder;
        Ok(messages)
    }

    /// Number of undelivered bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(FRAME_TERMINATOR.len())
        .position(|w| w == FRAME_TERMINATOR)
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame(msg: &Message) -> Vec<u8> {
        Framer.frame(msg).unwrap()
    }

    #[test]
    fn test_frame_ends_in_terminator_and_contains_no_other() {
        let msg = Message::request(
            "1",
            "echo",
            vec![json!("line one\r\nline two")],
        );
        let bytes = frame(&msg);
        assert!(bytes.ends_with(FRAME_TERMINATOR));
        // The embedded \r\n is escaped by JSON; only the terminator remains.
        assert_eq!(find_terminator(&bytes), Some(bytes.len() - 2));
    }

    #[test]
    fn test_round_trip_single_frame() {
        let msg = Message::success("9", vec![json!({"k": [1, 2, 3]})]);
        let mut deframer = Deframer::new(DecodePolicy::Lenient);
        let out = deframer.push(&frame(&msg)).unwrap();
        assert_eq!(out, vec![msg]);
        assert_eq!(deframer.buffered(), 0);
    }

    #[test]
    fn test_fragmented_frame_across_three_chunks() {
        let msg = Message::request("1", "echo", vec![json!("hi")]);
        let bytes = frame(&msg);
        let (a, rest) = bytes.split_at(5);
        let (b, c) = rest.split_at(7);

        let mut deframer = Deframer::new(DecodePolicy::Lenient);
        assert!(deframer.push(a).unwrap().is_empty());
        assert!(deframer.push(b).unwrap().is_empty());
        assert_eq!(deframer.push(c).unwrap(), vec![msg]);
    }

    #[test]
    fn test_fragment_then_whole_frame_in_order() {
        let first = Message::request("1", "a", vec![]);
        let second = Message::request("2", "b", vec![]);
        let mut bytes = frame(&first);
        bytes.extend_from_slice(&frame(&second));

        // Deliver everything except the last byte, then the last byte.
        let mut deframer = Deframer::new(DecodePolicy::Lenient);
        let split = bytes.len() - 1;
        let out = deframer.push(&bytes[..split]).unwrap();
        assert_eq!(out, vec![first]);
        let out = deframer.push(&bytes[split..]).unwrap();
        assert_eq!(out, vec![second]);
    }

    #[test]
    fn test_chunk_split_inside_terminator() {
        let msg = Message::notification("n", vec![json!(1)]);
        let bytes = frame(&msg);
        // Split between \r and \n.
        let split = bytes.len() - 1;

        let mut deframer = Deframer::new(DecodePolicy::Lenient);
        assert!(deframer.push(&bytes[..split]).unwrap().is_empty());
        assert_eq!(deframer.push(&bytes[split..]).unwrap(), vec![msg]);
    }

    #[test]
    fn test_multiple_frames_in_one_chunk() {
        let msgs = vec![
            Message::request("1", "a", vec![]),
            Message::success("1", vec![json!(true)]),
            Message::notification("n", vec![json!(null)]),
        ];
        let mut bytes = Vec::new();
        for msg in &msgs {
            bytes.extend_from_slice(&frame(msg));
        }
        let mut deframer = Deframer::new(DecodePolicy::Lenient);
        assert_eq!(deframer.push(&bytes).unwrap(), msgs);
    }

    #[test]
    fn test_lenient_holds_on_bad_frame() {
        let good = Message::request("1", "a", vec![]);
        let mut bytes = b"this is not json\r\n".to_vec();
        bytes.extend_from_slice(&frame(&good));

        let mut deframer = Deframer::new(DecodePolicy::Lenient);
        // The bad head frame blocks delivery; nothing is emitted and the
        // buffer holds everything.
        let out = deframer.push(&bytes).unwrap();
        assert!(out.is_empty());
        assert_eq!(deframer.buffered(), bytes.len());
    }

    #[test]
    fn test_lenient_emits_frames_before_bad_one() {
        let good = Message::request("1", "a", vec![]);
        let mut bytes = frame(&good);
        bytes.extend_from_slice(b"garbage\r\n");

        let mut deframer = Deframer::new(DecodePolicy::Lenient);
        let out = deframer.push(&bytes).unwrap();
        assert_eq!(out, vec![good]);
        assert_eq!(deframer.buffered(), b"garbage\r\n".len());
    }

    #[test]
    fn test_strict_errors_on_bad_complete_frame() {
        let mut deframer = Deframer::new(DecodePolicy::Strict);
        let result = deframer.push(b"garbage\r\n");
        assert!(matches!(result, Err(ProtocolError::BadFrame(_))));
    }

    #[test]
    fn test_strict_accepts_partial_tail() {
        // A partial frame with no terminator is not an error in either
        // mode; it may simply still be in flight.
        let mut deframer = Deframer::new(DecodePolicy::Strict);
        assert!(deframer.push(b"{\"id\":\"1\"").unwrap().is_empty());
    }

    #[test]
    fn test_empty_chunk_is_noop() {
        let mut deframer = Deframer::new(DecodePolicy::Lenient);
        assert!(deframer.push(b"").unwrap().is_empty());
        assert_eq!(deframer.buffered(), 0);
    }
}
