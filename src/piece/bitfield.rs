use bytes::Bytes;

/// Fixed-length packed bit array, one bit per piece. Bit `i` lives in byte
/// `i/8` at position `7 - (i % 8)` (big-endian within the byte, matching the
/// wire BITFIELD payload format). Trailing padding bits are always zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitfield {
    total: usize,
    bytes: Vec<u8>,
}

impl Bitfield {
    fn byte_len(total: usize) -> usize {
        (total + 7) / 8
    }

    pub fn empty(total: usize) -> Self {
        Bitfield {
            total,
            bytes: vec![0u8; Self::byte_len(total)],
        }
    }

    pub fn full(total: usize) -> Self {
        let mut bf = Bitfield::empty(total);
        for i in 0..total {
            bf.set(i, true);
        }
        bf
    }

    /// Builds from raw bitfield bytes (as received in a BITFIELD message).
    /// Excess bytes are ignored; a too-short buffer is zero-extended.
    pub fn from_wire_bytes(total: usize, raw: &[u8]) -> Self {
        let want = Self::byte_len(total);
        let mut bytes = vec![0u8; want];
        let take = raw.len().min(want);
        bytes[..take].copy_from_slice(&raw[..take]);
        let mut bf = Bitfield { total, bytes };
        bf.clear_padding_bits();
        bf
    }

    fn clear_padding_bits(&mut self) {
        let used_bits_in_last_byte = self.total % 8;
        if used_bits_in_last_byte != 0 {
            if let Some(last) = self.bytes.last_mut() {
                let mask = 0xFFu8 << (8 - used_bits_in_last_byte);
                *last &= mask;
            }
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.bytes)
    }

    pub fn get(&self, idx: usize) -> bool {
        if idx >= self.total {
            return false;
        }
        let byte = idx / 8;
        let off = idx % 8;
        self.bytes[byte] & (1 << (7 - off)) != 0
    }

    pub fn set(&mut self, idx: usize, val: bool) {
        if idx >= self.total {
            return;
        }
        let byte = idx / 8;
        let off = idx % 8;
        let mask = 1u8 << (7 - off);
        if val {
            self.bytes[byte] |= mask;
        } else {
            self.bytes[byte] &= !mask;
        }
    }

    pub fn count(&self) -> usize {
        self.bytes.iter().map(|b| b.count_ones() as usize).sum()
    }

    pub fn is_full(&self) -> bool {
        self.count() == self.total
    }

    /// Indices set in `other` but not in `self`.
    pub fn missing_from(&self, other: &Bitfield) -> Vec<usize> {
        (0..self.total)
            .filter(|&i| !self.get(i) && other.get(i))
            .collect()
    }
}
