use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UidError {
    #[error("uid is not valid base64url")]
    Encoding,
    #[error("uid is not valid UTF-8")]
    Utf8,
}

/// Encode a user id for use as a URL path segment
pub fn encode_uid(user_id: &str) -> String {
    URL_SAFE_NO_PAD.encode(user_id.as_bytes())
}

/// Decode a URL path segment back into a user id. Trailing padding is
/// tolerated.
pub fn decode_uid(encoded: &str) -> Result<String, UidError> {
    let trimmed = encoded.trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(trimmed)
        .map_err(|_| UidError::Encoding)?;
    String::from_utf8(bytes).map_err(|_| UidError::Utf8)
}
