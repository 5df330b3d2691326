use crate::error::CoreError;
use crate::wire::constants::{HANDSHAKE_LEN, HEADER, ZERO_PAD};

/// The 32-byte fixed handshake frame exchanged before any message frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handshake {
    pub peer_id: u32,
}

impl Handshake {
    pub fn new(peer_id: u32) -> Self {
        Handshake { peer_id }
    }

    pub fn encode(&self) -> [u8; HANDSHAKE_LEN] {
        let mut buf = [0u8; HANDSHAKE_LEN];
        buf[..HEADER.len()].copy_from_slice(HEADER);
        buf[HEADER.len()..HEADER.len() + ZERO_PAD.len()].copy_from_slice(ZERO_PAD);
        buf[HEADER.len() + ZERO_PAD.len()..].copy_from_slice(&self.peer_id.to_be_bytes());
        buf
    }

    /// Decodes a handshake from exactly `HANDSHAKE_LEN` bytes. Rejects any
    /// modification of the 28-byte header+padding prefix.
    pub fn decode(buf: &[u8]) -> Result<Self, CoreError> {
        if buf.len() != HANDSHAKE_LEN {
            return Err(CoreError::MalformedHandshake);
        }
        if &buf[..HEADER.len()] != HEADER.as_slice() {
            return Err(CoreError::MalformedHandshake);
        }
        let pad_start = HEADER.len();
        let pad_end = pad_start + ZERO_PAD.len();
        if &buf[pad_start..pad_end] != ZERO_PAD.as_slice() {
            return Err(CoreError::MalformedHandshake);
        }
        let mut id_bytes = [0u8; 4];
        id_bytes.copy_from_slice(&buf[pad_end..]);
        Ok(Handshake {
            peer_id: u32::from_be_bytes(id_bytes),
        })
    }
}
