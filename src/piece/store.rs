use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::error::CoreError;
use crate::piece::bitfield::Bitfield;

/// Owns a `pieces/` directory and the local bitfield. Invariant: bit `i` is
/// set iff `piece_NNNNNN.bin` exists with exactly `expected_size(i)` bytes.
#[derive(Debug)]
pub struct PieceStore {
    dir: PathBuf,
    total: usize,
    piece_size: usize,
    last_piece_size: usize,
    bits: Bitfield,
}

fn piece_file_name(index: usize) -> String {
    format!("piece_{index:06}.bin")
}

impl PieceStore {
    pub fn new(
        dir: impl Into<PathBuf>,
        total: usize,
        piece_size: usize,
        last_piece_size: usize,
        start_full: bool,
    ) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(PieceStore {
            dir,
            total,
            piece_size,
            last_piece_size,
            bits: if start_full {
                Bitfield::full(total)
            } else {
                Bitfield::empty(total)
            },
        })
    }

    pub fn bitfield(&self) -> &Bitfield {
        &self.bits
    }

    pub fn have(&self, index: u32) -> bool {
        self.bits.get(index as usize)
    }

    pub fn expected_size(&self, index: u32) -> usize {
        if index as usize == self.total - 1 {
            self.last_piece_size
        } else {
            self.piece_size
        }
    }

    fn piece_path(&self, index: usize) -> PathBuf {
        self.dir.join(piece_file_name(index))
    }

    /// Writes piece `index`; rejects (no-op, returns false) an out-of-range
    /// index or a payload of the wrong length. Idempotent: re-writing
    /// overwrites with the same bytes.
    pub fn write_piece(&mut self, index: u32, data: &[u8]) -> bool {
        if index as usize >= self.total {
            return false;
        }
        if data.len() != self.expected_size(index) {
            return false;
        }
        if std::fs::write(self.piece_path(index as usize), data).is_err() {
            return false;
        }
        self.bits.set(index as usize, true);
        true
    }

    pub fn read_piece(&self, index: u32) -> std::io::Result<Bytes> {
        std::fs::read(self.piece_path(index as usize)).map(Bytes::from)
    }

    /// Concatenates pieces `0..total` into `<pieces-dir's-parent>/<name>`.
    pub fn reconstruct_full_file(&self, name: &str) -> Result<PathBuf, CoreError> {
        if !self.bits.is_full() {
            return Err(CoreError::IncompleteData);
        }
        let parent = self.dir.parent().unwrap_or(Path::new("."));
        let out_path = parent.join(name);
        let mut out = Vec::new();
        for i in 0..self.total {
            let expected = if i == self.total - 1 {
                self.last_piece_size
            } else {
                self.piece_size
            };
            let data = std::fs::read(self.piece_path(i))?;
            if data.len() != expected {
                return Err(CoreError::SizeMismatch {
                    index: i as u32,
                    expected,
                    got: data.len(),
                });
            }
            out.extend_from_slice(&data);
        }
        std::fs::write(&out_path, out)?;
        Ok(out_path)
    }

    /// Removes every piece file (ignoring already-missing ones) then the
    /// directory itself (ignoring non-empty/missing).
    pub fn cleanup_pieces(&self) {
        for i in 0..self.total {
            let _ = std::fs::remove_file(self.piece_path(i));
        }
        let _ = std::fs::remove_dir(&self.dir);
    }

    /// Slices a complete source file into `piece_NNNNNN.bin` files. Used
    /// once, at startup, by a seed peer (`has_file = 1` in `PeerInfo.cfg`)
    /// to materialize the pieces its bitfield claims to already have.
    pub fn slice_from_file(&self, source: &Path) -> std::io::Result<()> {
        let data = std::fs::read(source)?;
        let mut offset = 0usize;
        for i in 0..self.total {
            let size = if i == self.total - 1 {
                self.last_piece_size
            } else {
                self.piece_size
            };
            let end = (offset + size).min(data.len());
            let chunk = &data[offset..end];
            if chunk.len() != size {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("source file too small for piece {i} (expected {size}, got {})", chunk.len()),
                ));
            }
            std::fs::write(self.piece_path(i), chunk)?;
            offset = end;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(total: usize, piece_size: usize, last: usize, full: bool) -> (tempfile::TempDir, PieceStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = PieceStore::new(tmp.path().join("pieces"), total, piece_size, last, full).unwrap();
        (tmp, store)
    }

    #[test]
    fn write_then_have_then_read_round_trips() {
        let (_tmp, mut store) = store(4, 2, 1, false);
        assert!(!store.have(0));
        assert!(store.write_piece(0, b"AB"));
        assert!(store.have(0));
        assert_eq!(store.read_piece(0).unwrap().as_ref(), b"AB");
    }

    #[test]
    fn rejects_wrong_size_and_out_of_range() {
        let (_tmp, mut store) = store(4, 2, 1, false);
        assert!(!store.write_piece(0, b"ABC"));
        assert!(!store.have(0));
        assert!(!store.write_piece(4, b"A"));
    }

    #[test]
    fn s1_two_peer_reconstruction() {
        let (_tmp, mut store) = store(4, 2, 1, false);
        let pieces: [&[u8]; 4] = [b"AB", b"CD", b"EF", b"G"];
        for (i, p) in pieces.iter().enumerate() {
            assert!(store.write_piece(i as u32, p));
        }
        let out = store.reconstruct_full_file("file").unwrap();
        assert_eq!(std::fs::read(out).unwrap(), b"ABCDEFG");
    }

    #[test]
    fn reconstruct_fails_when_incomplete() {
        let (_tmp, mut store) = store(4, 2, 1, false);
        store.write_piece(0, b"AB");
        assert!(matches!(
            store.reconstruct_full_file("file"),
            Err(CoreError::IncompleteData)
        ));
    }

    #[test]
    fn cleanup_removes_files_and_directory() {
        let (tmp, mut store) = store(2, 2, 2, false);
        store.write_piece(0, b"AB");
        store.write_piece(1, b"CD");
        store.cleanup_pieces();
        assert!(!tmp.path().join("pieces").exists());
    }

    #[test]
    fn slice_from_file_matches_manual_pieces() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("source.bin");
        std::fs::write(&src, b"ABCDEFG").unwrap();
        let store = PieceStore::new(tmp.path().join("pieces"), 4, 2, 1, true).unwrap();
        store.slice_from_file(&src).unwrap();
        assert_eq!(store.read_piece(0).unwrap().as_ref(), b"AB");
        assert_eq!(store.read_piece(3).unwrap().as_ref(), b"G");
    }
}
