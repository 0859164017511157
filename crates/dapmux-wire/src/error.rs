//! Wire-level error types.

use thiserror::Error;

/// Errors from decoding the length-prefixed stream.
///
/// Both kinds are fatal for the session that hits them; there is no
/// partial-message recovery.
#[derive(Debug, Error)]
pub enum WireError {
    /// Malformed framing: a length field that is not a non-negative
    /// decimal, or header bytes that are not text.
    #[error("framing error: {0}")]
    Framing(String),

    /// Payload bytes that are not valid UTF-8 JSON, or a message
    /// missing a required field.
    #[error("parse error: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_framing_display() {
        let err = WireError::Framing("bad length field".into());
        assert_eq!(err.to_string(), "framing error: bad length field");
    }

    #[test]
    fn error_parse_display() {
        let err = WireError::Parse("not json".into());
        assert_eq!(err.to_string(), "parse error: not json");
    }
}
