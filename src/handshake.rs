//! WebSocket handshake control.

pub mod headers;
pub mod server;

use sha1::{Digest, Sha1};

/// Derives the `Sec-WebSocket-Accept` response header from a `Sec-WebSocket-Key` request header.
pub fn derive_accept_key(request_key: &[u8]) -> String {
    // ... field is constructed by concatenating /key/ ...
    // ... with the string "258EAFA5-E914-47DA-95CA-C5AB0DC85B11" (RFC 6455)
    const WS_GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
    let mut sha1 = Sha1::default();
    sha1.update(request_key);
    sha1.update(WS_GUID);
    data_encoding::BASE64.encode(&sha1.finalize())
}

/// Checks whether a comma and/or whitespace separated header value lists `token`.
///
/// Pieces are compared case-insensitively and as a whole, so `WebSocketX` does not match
/// `WebSocket`.
pub fn header_contains_token(value: &str, token: &str) -> bool {
    value
        .split(|c: char| c == ',' || c.is_ascii_whitespace())
        .filter(|piece| !piece.is_empty())
        .any(|piece| piece.eq_ignore_ascii_case(token))
}

#[cfg(test)]
mod tests {
    use super::{derive_accept_key, header_contains_token};

    #[test]
    fn key_conversion() {
        // example from RFC 6455
        assert_eq!(
            derive_accept_key(b"dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn token_lists() {
        assert!(header_contains_token("Upgrade", "upgrade"));
        assert!(header_contains_token("keep-alive, Upgrade", "Upgrade"));
        assert!(header_contains_token("keep-alive,upgrade", "Upgrade"));
        assert!(header_contains_token("  websocket\t", "WebSocket"));
        assert!(!header_contains_token("WebSocketX", "WebSocket"));
        assert!(!header_contains_token("keep-alive", "Upgrade"));
        assert!(!header_contains_token("", "13"));
        assert!(!header_contains_token(",, ,", "13"));
    }
}
