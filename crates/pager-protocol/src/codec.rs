//! Codec for the event-stream wire format.
//!
//! Each frame is a block of `field: value` lines terminated by a blank line:
//!
//! ```text
//! id: 7
//! data: {"statusCode":200,"message":"Hello"}
//!
//! ```
//!
//! Lines starting with `:` are comments and carry no frame.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::frames::{MessageEvent, StreamFrame};

/// Maximum size of a single undecoded event block (64 KiB).
pub const MAX_EVENT_SIZE: usize = 64 * 1024;

/// Comment block written on idle streams.
pub const KEEP_ALIVE: &[u8] = b": keep-alive\n\n";

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Event block exceeds maximum size.
    #[error("Event size {0} exceeds maximum {MAX_EVENT_SIZE}")]
    EventTooLarge(usize),

    /// Not enough data to decode a frame.
    #[error("Incomplete event")]
    Incomplete,

    /// A data block arrived without an `id:` field.
    #[error("Event is missing its sequence id")]
    MissingId,

    /// The `id:` field is not a sequence number.
    #[error("Invalid sequence id: {0}")]
    InvalidId(String),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Event block is not valid UTF-8.
    #[error("Event is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),
}

/// Encode a frame to bytes.
///
/// # Errors
///
/// Returns an error if the body cannot be serialized.
pub fn encode(frame: &StreamFrame) -> Result<Bytes, ProtocolError> {
    let mut buf = BytesMut::new();
    encode_into(frame, &mut buf)?;
    Ok(buf.freeze())
}

/// Encode a frame into an existing buffer.
///
/// # Errors
///
/// Returns an error if the body cannot be serialized.
pub fn encode_into(frame: &StreamFrame, buf: &mut BytesMut) -> Result<(), ProtocolError> {
    encode_event_into(frame.seq, &frame.event, buf)
}

/// Encode a borrowed event under the given sequence number.
///
/// # Errors
///
/// Returns an error if the body cannot be serialized.
pub fn encode_event(seq: u64, event: &MessageEvent) -> Result<Bytes, ProtocolError> {
    let mut buf = BytesMut::new();
    encode_event_into(seq, event, &mut buf)?;
    Ok(buf.freeze())
}

fn encode_event_into(
    seq: u64,
    event: &MessageEvent,
    buf: &mut BytesMut,
) -> Result<(), ProtocolError> {
    // Compact JSON never contains a raw newline, so one data line suffices.
    let body = serde_json::to_vec(event)?;

    buf.reserve(body.len() + 32);
    buf.put_slice(b"id: ");
    buf.put_slice(seq.to_string().as_bytes());
    buf.put_slice(b"\ndata: ");
    buf.put_slice(&body);
    buf.put_slice(b"\n\n");

    Ok(())
}

/// The keep-alive comment block.
#[must_use]
pub fn keep_alive() -> Bytes {
    Bytes::from_static(KEEP_ALIVE)
}

/// Decode exactly one frame from a complete event block.
///
/// # Errors
///
/// Returns [`ProtocolError::Incomplete`] if `data` holds no frame.
pub fn decode(data: &[u8]) -> Result<StreamFrame, ProtocolError> {
    let mut buf = BytesMut::from(data);
    decode_from(&mut buf)?.ok_or(ProtocolError::Incomplete)
}

/// Try to decode a frame from a buffer, advancing it past consumed blocks.
///
/// Comment-only blocks are consumed and skipped. Returns `Ok(None)` if more
/// data is needed.
///
/// # Errors
///
/// Returns an error if a block is too large or malformed.
pub fn decode_from(buf: &mut BytesMut) -> Result<Option<StreamFrame>, ProtocolError> {
    loop {
        let Some((block_len, consumed)) = find_block_end(buf) else {
            if buf.len() > MAX_EVENT_SIZE {
                return Err(ProtocolError::EventTooLarge(buf.len()));
            }
            return Ok(None);
        };

        if block_len > MAX_EVENT_SIZE {
            return Err(ProtocolError::EventTooLarge(block_len));
        }

        let block = buf.split_to(block_len);
        buf.advance(consumed - block_len);

        if let Some(frame) = parse_block(&block)? {
            return Ok(Some(frame));
        }
    }
}

/// Locate the blank line ending the first block.
///
/// Returns the block length and the number of bytes to consume, including
/// the terminator. Accepts both `\n\n` and `\r\n\r\n`.
fn find_block_end(buf: &[u8]) -> Option<(usize, usize)> {
    let mut i = 0;
    while i < buf.len() {
        if buf[i] == b'\n' {
            match buf.get(i + 1) {
                Some(b'\n') => return Some((i, i + 2)),
                Some(b'\r') if buf.get(i + 2) == Some(&b'\n') => return Some((i, i + 3)),
                _ => {}
            }
        }
        i += 1;
    }
    None
}

fn parse_block(block: &[u8]) -> Result<Option<StreamFrame>, ProtocolError> {
    let text = std::str::from_utf8(block)?;

    let mut id = None;
    let mut data: Option<String> = None;

    for line in text.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() || line.starts_with(':') {
            continue;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "id" => id = Some(value.to_string()),
            "data" => match data.as_mut() {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(value);
                }
                None => data = Some(value.to_string()),
            },
            // `event` and `retry` carry nothing this protocol uses.
            _ => {}
        }
    }

    let Some(data) = data else {
        return Ok(None);
    };

    let id = id.ok_or(ProtocolError::MissingId)?;
    let seq = id
        .trim()
        .parse::<u64>()
        .map_err(|_| ProtocolError::InvalidId(id.clone()))?;
    let event: MessageEvent = serde_json::from_str(&data)?;

    Ok(Some(StreamFrame::new(seq, event)))
}

/// Incremental decoder for a byte stream split at arbitrary boundaries.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    /// Create a new decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Decode the next complete frame, if one is buffered.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffered block is malformed.
    pub fn next_frame(&mut self) -> Result<Option<StreamFrame>, ProtocolError> {
        decode_from(&mut self.buf)
    }

    /// Number of buffered, undecoded bytes.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let frame = StreamFrame::new(1, MessageEvent::new("Hello", None));
        let encoded = encode(&frame).unwrap();
        assert_eq!(
            &encoded[..],
            b"id: 1\ndata: {\"statusCode\":200,\"message\":\"Hello\"}\n\n"
        );
    }

    #[test]
    fn test_decode_incomplete() {
        let frame = StreamFrame::new(3, MessageEvent::new("Hi", None));
        let encoded = encode(&frame).unwrap();

        match decode(&encoded[..encoded.len() - 1]) {
            Err(ProtocolError::Incomplete) => {}
            other => panic!("Expected Incomplete error, got {:?}", other),
        }
    }

    #[test]
    fn test_streaming_decode_skips_comments() {
        let frame1 = StreamFrame::new(1, MessageEvent::new("one", Some("c1".into())));
        let frame2 = StreamFrame::new(2, MessageEvent::new("two", None));

        let mut buf = BytesMut::new();
        buf.extend_from_slice(KEEP_ALIVE);
        encode_into(&frame1, &mut buf).unwrap();
        buf.extend_from_slice(KEEP_ALIVE);
        encode_into(&frame2, &mut buf).unwrap();

        assert_eq!(decode_from(&mut buf).unwrap(), Some(frame1));
        assert_eq!(decode_from(&mut buf).unwrap(), Some(frame2));
        assert_eq!(decode_from(&mut buf).unwrap(), None);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decoder_handles_split_chunks_and_crlf() {
        let raw = b"id: 9\r\ndata: {\"statusCode\":200,\"message\":\"x\"}\r\n\r\n";
        let mut decoder = FrameDecoder::new();

        decoder.extend(&raw[..10]);
        assert!(decoder.next_frame().unwrap().is_none());

        decoder.extend(&raw[10..]);
        let frame = decoder.next_frame().unwrap().unwrap();
        assert_eq!(frame.seq, 9);
        assert_eq!(frame.event.message, "x");
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_missing_and_invalid_id() {
        let mut buf = BytesMut::from(&b"data: {\"statusCode\":200,\"message\":\"x\"}\n\n"[..]);
        assert!(matches!(decode_from(&mut buf), Err(ProtocolError::MissingId)));

        let mut buf = BytesMut::from(&b"id: abc\ndata: {\"statusCode\":200,\"message\":\"x\"}\n\n"[..]);
        assert!(matches!(decode_from(&mut buf), Err(ProtocolError::InvalidId(_))));
    }

    #[test]
    fn test_event_too_large() {
        let mut buf = BytesMut::from(vec![b'a'; MAX_EVENT_SIZE + 1].as_slice());
        match decode_from(&mut buf) {
            Err(ProtocolError::EventTooLarge(_)) => {}
            other => panic!("Expected EventTooLarge error, got {:?}", other),
        }
    }
}
