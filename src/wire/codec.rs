use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::error::CoreError;
use crate::wire::constants::MAX_FRAME;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Choke = 0,
    Unchoke = 1,
    Interested = 2,
    NotInterested = 3,
    Have = 4,
    Bitfield = 5,
    Request = 6,
    Piece = 7,
}

impl TryFrom<u8> for MessageType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0 => Ok(MessageType::Choke),
            1 => Ok(MessageType::Unchoke),
            2 => Ok(MessageType::Interested),
            3 => Ok(MessageType::NotInterested),
            4 => Ok(MessageType::Have),
            5 => Ok(MessageType::Bitfield),
            6 => Ok(MessageType::Request),
            7 => Ok(MessageType::Piece),
            _ => Err(()),
        }
    }
}

/// A fully decoded wire message. Unlike the raw `(MessageType, payload)`
/// pair the codec works with internally, this is what the connection task
/// hands to the node actor.
#[derive(Debug, Clone)]
pub enum Message {
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have(u32),
    Bitfield(Bytes),
    Request(u32),
    Piece(u32, Bytes),
}

impl Message {
    pub fn decode_payload(mtype: MessageType, payload: Bytes) -> Result<Message, CoreError> {
        match mtype {
            MessageType::Choke => Ok(Message::Choke),
            MessageType::Unchoke => Ok(Message::Unchoke),
            MessageType::Interested => Ok(Message::Interested),
            MessageType::NotInterested => Ok(Message::NotInterested),
            MessageType::Have => {
                if payload.len() != 4 {
                    return Err(CoreError::ShortPayload(MessageType::Have, 4, payload.len()));
                }
                Ok(Message::Have(u32::from_be_bytes(payload[..4].try_into().unwrap())))
            }
            MessageType::Bitfield => Ok(Message::Bitfield(payload)),
            MessageType::Request => {
                if payload.len() != 4 {
                    return Err(CoreError::ShortPayload(MessageType::Request, 4, payload.len()));
                }
                Ok(Message::Request(u32::from_be_bytes(payload[..4].try_into().unwrap())))
            }
            MessageType::Piece => {
                if payload.len() < 4 {
                    return Err(CoreError::ShortPayload(MessageType::Piece, 4, payload.len()));
                }
                let index = u32::from_be_bytes(payload[..4].try_into().unwrap());
                Ok(Message::Piece(index, payload.slice(4..)))
            }
        }
    }

    fn encode_into(&self, dst: &mut BytesMut) {
        let (tag, payload_len): (MessageType, usize) = match self {
            Message::Choke => (MessageType::Choke, 0),
            Message::Unchoke => (MessageType::Unchoke, 0),
            Message::Interested => (MessageType::Interested, 0),
            Message::NotInterested => (MessageType::NotInterested, 0),
            Message::Have(_) => (MessageType::Have, 4),
            Message::Bitfield(b) => (MessageType::Bitfield, b.len()),
            Message::Request(_) => (MessageType::Request, 4),
            Message::Piece(_, data) => (MessageType::Piece, 4 + data.len()),
        };
        let length = 1 + payload_len;
        dst.reserve(4 + length);
        dst.put_u32(length as u32);
        dst.put_u8(tag as u8);
        match self {
            Message::Choke | Message::Unchoke | Message::Interested | Message::NotInterested => {}
            Message::Have(index) | Message::Request(index) => dst.put_u32(*index),
            Message::Bitfield(bits) => dst.put_slice(bits),
            Message::Piece(index, data) => {
                dst.put_u32(*index);
                dst.put_slice(data);
            }
        }
    }
}

/// Frames the `LEN | TYPE | PAYLOAD` wire format over a byte stream.
/// Unknown message types are dropped with a warning, not treated as fatal.
#[derive(Debug, Default)]
pub struct PeerCodec;

impl Decoder for PeerCodec {
    type Item = Message;
    type Error = CoreError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, CoreError> {
        loop {
            if src.len() < 4 {
                return Ok(None);
            }
            let length = u32::from_be_bytes(src[..4].try_into().unwrap());
            if length == 0 {
                return Err(CoreError::BadLength(length));
            }
            if length > MAX_FRAME {
                return Err(CoreError::OversizeFrame(length));
            }
            if src.len() < 4 + length as usize {
                src.reserve(4 + length as usize - src.len());
                return Ok(None);
            }

            src.advance(4);
            let mut frame = src.split_to(length as usize);
            let raw_type = frame[0];
            let payload = frame.split_off(1).freeze();

            let mtype = match MessageType::try_from(raw_type) {
                Ok(t) => t,
                Err(()) => {
                    warn!(raw_type, "dropping frame with unknown message type");
                    continue;
                }
            };

            return Message::decode_payload(mtype, payload).map(Some);
        }
    }
}

impl Encoder<Message> for PeerCodec {
    type Error = CoreError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), CoreError> {
        item.encode_into(dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(msg: Message) -> Message {
        let mut codec = PeerCodec;
        let mut buf = BytesMut::new();
        codec.encode(msg, &mut buf).unwrap();
        let consumed_before = buf.len();
        let decoded = codec.decode(&mut buf).unwrap().expect("one frame");
        assert_eq!(buf.len(), 0, "frame of length {consumed_before} fully consumed");
        decoded
    }

    #[test]
    fn choke_round_trips() {
        match round_trip(Message::Choke) {
            Message::Choke => {}
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn have_round_trips() {
        match round_trip(Message::Have(42)) {
            Message::Have(i) => assert_eq!(i, 42),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bitfield_round_trips() {
        let bits = Bytes::from_static(&[0xA8]);
        match round_trip(Message::Bitfield(bits.clone())) {
            Message::Bitfield(b) => assert_eq!(b, bits),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn piece_round_trips() {
        let data = Bytes::from_static(b"hello");
        match round_trip(Message::Piece(7, data.clone())) {
            Message::Piece(i, d) => {
                assert_eq!(i, 7);
                assert_eq!(d, data);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn consumes_exactly_5_plus_payload_bytes() {
        let mut codec = PeerCodec;
        let mut buf = BytesMut::new();
        codec.encode(Message::Have(3), &mut buf).unwrap();
        buf.extend_from_slice(b"trailing-garbage-from-next-frame");
        let before = buf.len();
        let _ = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(before - buf.len(), 5 + 4);
    }

    #[test]
    fn zero_length_frame_is_fatal() {
        let mut codec = PeerCodec;
        let mut buf = BytesMut::new();
        buf.put_u32(0);
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn oversize_frame_is_fatal() {
        let mut codec = PeerCodec;
        let mut buf = BytesMut::new();
        buf.put_u32(MAX_FRAME + 1);
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn unknown_type_is_dropped_not_fatal() {
        let mut codec = PeerCodec;
        let mut buf = BytesMut::new();
        // one bogus frame (type 200, no payload) followed by a real CHOKE frame
        buf.put_u32(1);
        buf.put_u8(200);
        codec.encode(Message::Choke, &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap();
        assert!(matches!(decoded, Some(Message::Choke)));
    }

    #[test]
    fn partial_frame_requires_more_bytes() {
        let mut codec = PeerCodec;
        let mut buf = BytesMut::new();
        buf.put_u32(5);
        buf.put_u8(MessageType::Have as u8);
        buf.put_u16(0); // only 2 of 4 index bytes
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }
}
