/// 17 ASCII chars of the protocol name plus one reserved zero byte, 18 bytes
/// total. Source revisions disagree on 16 vs 18 bytes (see Design Notes §9a
/// in SPEC_FULL.md); 18 is the value this crate treats as canonical.
pub const HEADER: &[u8; 18] = b"P2PFILESHARINGPRO\0";

/// Zero padding following the header, before the 4-byte peer id.
pub const ZERO_PAD: &[u8; 10] = &[0u8; 10];

/// Total size of a handshake frame: header + padding + u32 peer id.
pub const HANDSHAKE_LEN: usize = HEADER.len() + ZERO_PAD.len() + 4;

/// Largest allowed message frame, LEN field included.
pub const MAX_FRAME: u32 = 10 * 1024 * 1024;
