//! Length-prefixed stream framing.
//!
//! debugpy frames every DAP message HTTP-style: the literal
//! `Content-Length: `, the payload length as ASCII decimal digits,
//! the separator `\r\n\r\n`, then exactly that many payload bytes.
//! The underlying stream delivers arbitrary fragments, so decoding is
//! incremental: bytes are appended with [`FrameDecoder::feed`] and
//! complete payloads drained with [`FrameDecoder::next_frame`].

use crate::error::WireError;

/// Literal token that opens every frame.
pub const HEADER: &str = "Content-Length: ";

/// Literal separating the length field from the payload.
pub const SEPARATOR: &str = "\r\n\r\n";

/// Encode a serialized DAP message into one wire frame.
pub fn encode_frame(payload: &str) -> Vec<u8> {
    let prefix = format!("{HEADER}{}{SEPARATOR}", payload.len());
    let mut buf = Vec::with_capacity(prefix.len() + payload.len());
    buf.extend_from_slice(prefix.as_bytes());
    buf.extend_from_slice(payload.as_bytes());
    buf
}

/// Incremental decoder for the length-prefixed stream.
///
/// A frame is emitted only once all of its declared payload bytes have
/// arrived; a trailing partial frame stays buffered for the next feed.
/// Several frames delivered in one read are drained by repeated
/// `next_frame` calls without further feeds.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    /// Where header scanning resumes. Advances past rejected prefix
    /// bytes and past consumed frames, so a header literal inside
    /// payload bytes is never matched and no prefix is scanned twice.
    scan_from: usize,
}

impl FrameDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes read from the stream.
    pub fn feed(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Extract the next complete payload, if one is fully buffered.
    ///
    /// Returns `Ok(None)` when more bytes are needed. A length field
    /// that is not a non-negative decimal is a fatal framing error;
    /// payload bytes that are not UTF-8 are a fatal parse error.
    pub fn next_frame(&mut self) -> Result<Option<String>, WireError> {
        let Some(header_pos) = find(&self.buf, HEADER.as_bytes(), self.scan_from) else {
            // Nothing before the final HEADER.len() - 1 bytes can
            // still start a header, so skip it on the next scan.
            let safe = self.buf.len().saturating_sub(HEADER.len() - 1);
            self.scan_from = self.scan_from.max(safe);
            return Ok(None);
        };

        let len_start = header_pos + HEADER.len();
        let Some(sep_pos) = find(&self.buf, SEPARATOR.as_bytes(), len_start) else {
            return Ok(None);
        };

        let len_field = std::str::from_utf8(&self.buf[len_start..sep_pos])
            .map_err(|_| WireError::Framing("length field is not text".into()))?;
        let len: usize = len_field.trim().parse().map_err(|_| {
            WireError::Framing(format!("invalid length field {len_field:?}"))
        })?;

        let payload_start = sep_pos + SEPARATOR.len();
        if self.buf.len() - payload_start < len {
            return Ok(None);
        }

        let payload = std::str::from_utf8(&self.buf[payload_start..payload_start + len])
            .map_err(|e| WireError::Parse(format!("payload is not UTF-8: {e}")))?
            .to_owned();

        // Drop the consumed frame; scanning for the next header starts
        // at the boundary right after this payload.
        self.buf.drain(..payload_start + len);
        self.scan_from = 0;
        Ok(Some(payload))
    }
}

/// First occurrence of `needle` in `haystack` at or after `from`.
fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if haystack.len() < from + needle.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(decoder: &mut FrameDecoder) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(payload) = decoder.next_frame().unwrap() {
            out.push(payload);
        }
        out
    }

    #[test]
    fn frame_encode_format() {
        let encoded = encode_frame("{}");
        assert_eq!(encoded, b"Content-Length: 2\r\n\r\n{}");
    }

    #[test]
    fn frame_single_shot_round_trip() {
        let payload = r#"{"seq":1,"type":"event","event":"output"}"#;
        let mut decoder = FrameDecoder::new();
        decoder.feed(&encode_frame(payload));
        assert_eq!(drain(&mut decoder), vec![payload.to_string()]);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn frame_round_trip_at_every_split_point() {
        let payload = r#"{"seq":3,"type":"request","command":"next"}"#;
        let encoded = encode_frame(payload);
        for split in 0..=encoded.len() {
            let mut decoder = FrameDecoder::new();
            decoder.feed(&encoded[..split]);
            let mut got = drain(&mut decoder);
            decoder.feed(&encoded[split..]);
            got.extend(drain(&mut decoder));
            assert_eq!(got, vec![payload.to_string()], "split at {split}");
            assert_eq!(decoder.buffered(), 0, "split at {split}");
        }
    }

    #[test]
    fn frame_byte_at_a_time_delivery() {
        let payload = r#"{"seq":9,"type":"response","command":"attach","request_seq":2,"success":true}"#;
        let mut decoder = FrameDecoder::new();
        let mut got = Vec::new();
        for byte in encode_frame(payload) {
            decoder.feed(&[byte]);
            got.extend(drain(&mut decoder));
        }
        assert_eq!(got, vec![payload.to_string()]);
    }

    #[test]
    fn frame_back_to_back_in_one_feed() {
        let first = r#"{"seq":1,"type":"event","event":"continued"}"#;
        let second = r#"{"seq":2,"type":"event","event":"output"}"#;
        let mut bytes = encode_frame(first);
        bytes.extend_from_slice(&encode_frame(second));

        let mut decoder = FrameDecoder::new();
        decoder.feed(&bytes);
        assert_eq!(drain(&mut decoder), vec![first.to_string(), second.to_string()]);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn frame_complete_plus_partial_leaves_remainder_buffered() {
        let first = r#"{"seq":1,"type":"event","event":"output"}"#;
        let second = r#"{"seq":2,"type":"event","event":"stopped"}"#;
        let mut bytes = encode_frame(first);
        let tail = encode_frame(second);
        bytes.extend_from_slice(&tail[..tail.len() - 5]);

        let mut decoder = FrameDecoder::new();
        decoder.feed(&bytes);
        assert_eq!(drain(&mut decoder), vec![first.to_string()]);

        decoder.feed(&tail[tail.len() - 5..]);
        assert_eq!(drain(&mut decoder), vec![second.to_string()]);
    }

    #[test]
    fn frame_header_literal_inside_payload_not_matched() {
        // The payload itself contains the header literal; the decoder
        // must honour the declared length and not resynchronize on it.
        let payload = r#"{"note":"Content-Length: 999\r\n\r\n inside"}"#;
        let mut decoder = FrameDecoder::new();
        decoder.feed(&encode_frame(payload));
        assert_eq!(drain(&mut decoder), vec![payload.to_string()]);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn frame_non_numeric_length_is_fatal() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(b"Content-Length: abc\r\n\r\n{}");
        let err = decoder.next_frame().unwrap_err();
        assert!(matches!(err, WireError::Framing(_)), "got: {err}");
    }

    #[test]
    fn frame_negative_length_is_fatal() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(b"Content-Length: -4\r\n\r\n{}");
        let err = decoder.next_frame().unwrap_err();
        assert!(matches!(err, WireError::Framing(_)));
    }

    #[test]
    fn frame_non_utf8_payload_is_fatal() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(b"Content-Length: 2\r\n\r\n\xff\xfe");
        let err = decoder.next_frame().unwrap_err();
        assert!(matches!(err, WireError::Parse(_)));
    }

    #[test]
    fn frame_waits_for_full_payload() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(b"Content-Length: 10\r\n\r\n{\"a\"");
        assert!(decoder.next_frame().unwrap().is_none());
        decoder.feed(b":1234}");
        assert_eq!(drain(&mut decoder), vec!["{\"a\":1234}".to_string()]);
    }

    #[test]
    fn frame_empty_payload() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(b"Content-Length: 0\r\n\r\n");
        assert_eq!(drain(&mut decoder), vec![String::new()]);
    }

    #[test]
    fn frame_three_frames_one_read() {
        let payloads = ["{\"seq\":1}", "{\"seq\":2}", "{\"seq\":3}"];
        let mut bytes = Vec::new();
        for p in payloads {
            bytes.extend_from_slice(&encode_frame(p));
        }
        let mut decoder = FrameDecoder::new();
        decoder.feed(&bytes);
        let got = drain(&mut decoder);
        assert_eq!(got, payloads.map(String::from).to_vec());
    }
}
