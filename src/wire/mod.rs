mod codec;
mod constants;
mod handshake;

pub use codec::{Message, MessageType, PeerCodec};
pub use constants::{HANDSHAKE_LEN, HEADER, MAX_FRAME, ZERO_PAD};
pub use handshake::Handshake;
