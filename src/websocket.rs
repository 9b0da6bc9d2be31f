//! WebSocket handshake keys and frame headers (RFC 6455).
//!
//! The message model treats this as fixed wire vocabulary: `ws` messages
//! desugar to an HTTP Upgrade handshake using these keys, and `wf` messages
//! render one unmasked frame around their body.

use base64::Engine;
use byteorder::{BigEndian, ByteOrder};
use rand::rngs::StdRng;
use rand::Rng;
use sha1::{Digest, Sha1};

/// Handshake GUID appended to the client key before hashing.
const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// FIN flag plus text opcode: every `wf` frame is a single final text frame.
const FRAME_HEADER_BYTE: u8 = 0x80 | 0x1;

/// Compute the `Sec-WebSocket-Accept` value for a client key.
pub fn accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

/// Generate a random `Sec-WebSocket-Key` (16 random bytes, base64).
pub fn client_key(rng: &mut StdRng) -> String {
    let mut key = [0u8; 16];
    rng.fill(&mut key);
    base64::engine::general_purpose::STANDARD.encode(key)
}

/// Frame header for an unmasked text frame of the given payload length:
/// 7-bit length, or 126 + u16, or 127 + u64 extended length, big-endian.
pub fn frame_header(payload_len: u64) -> Vec<u8> {
    let mut out = vec![FRAME_HEADER_BYTE];
    if payload_len < 126 {
        out.push(payload_len as u8);
    } else if payload_len <= u16::MAX as u64 {
        let mut ext = [0u8; 2];
        BigEndian::write_u16(&mut ext, payload_len as u16);
        out.push(126);
        out.extend_from_slice(&ext);
    } else {
        let mut ext = [0u8; 8];
        BigEndian::write_u64(&mut ext, payload_len);
        out.push(127);
        out.extend_from_slice(&ext);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc_6455_example_accept() {
        assert_eq!(
            accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn frame_header_length_encodings() {
        assert_eq!(frame_header(3), vec![0x81, 3]);
        assert_eq!(frame_header(125), vec![0x81, 125]);
        assert_eq!(frame_header(126), vec![0x81, 126, 0x00, 0x7e]);
        assert_eq!(frame_header(65535), vec![0x81, 126, 0xff, 0xff]);
        let h = frame_header(65536);
        assert_eq!(h[0..2], [0x81, 127]);
        assert_eq!(&h[2..], &[0, 0, 0, 0, 0, 1, 0, 0]);
    }
}
