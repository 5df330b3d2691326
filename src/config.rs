use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} not found: {1}")]
    NotFound(&'static str, String),
    #[error("malformed line in {file}: {line:?}")]
    MalformedLine { file: &'static str, line: String },
    #[error("{0} missing required key: {1}")]
    MissingKey(&'static str, &'static str),
    #[error("PeerInfo.cfg has no peers")]
    NoPeers,
    #[error("unknown peer id {0}")]
    UnknownPeer(u32),
    #[error("invalid integer value: {0}")]
    InvalidInt(#[from] std::num::ParseIntError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Parsed `Common.cfg`: whitespace-separated `KEY VALUE` lines, `#` comments
/// and blank lines ignored.
#[derive(Debug, Clone)]
pub struct CommonConfig {
    pub num_preferred_neighbors: usize,
    pub unchoking_interval: u64,
    pub optimistic_unchoking_interval: u64,
    pub file_name: String,
    pub file_size: usize,
    pub piece_size: usize,
}

fn parse_kv_lines(text: &str, file: &'static str) -> Result<HashMap<String, String>, ConfigError> {
    let mut kv = HashMap::new();
    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        let key = parts.next().ok_or_else(|| ConfigError::MalformedLine {
            file,
            line: raw.to_owned(),
        })?;
        let rest: Vec<&str> = parts.collect();
        if rest.is_empty() {
            return Err(ConfigError::MalformedLine {
                file,
                line: raw.to_owned(),
            });
        }
        kv.insert(key.to_owned(), rest.join(" "));
    }
    Ok(kv)
}

impl CommonConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound("Common.cfg", path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)?;
        let kv = parse_kv_lines(&text, "Common.cfg")?;

        let get = |key: &'static str| -> Result<&String, ConfigError> {
            kv.get(key).ok_or(ConfigError::MissingKey("Common.cfg", key))
        };

        Ok(CommonConfig {
            num_preferred_neighbors: get("NumberOfPreferredNeighbors")?.parse()?,
            unchoking_interval: get("UnchokingInterval")?.parse()?,
            optimistic_unchoking_interval: get("OptimisticUnchokingInterval")?.parse()?,
            file_name: get("FileName")?.clone(),
            file_size: get("FileSize")?.parse()?,
            piece_size: get("PieceSize")?.parse()?,
        })
    }

    pub fn total_pieces(&self) -> usize {
        (self.file_size + self.piece_size - 1) / self.piece_size
    }

    pub fn last_piece_size(&self) -> usize {
        let rem = self.file_size % self.piece_size;
        if rem == 0 {
            self.piece_size
        } else {
            rem
        }
    }
}

#[derive(Debug, Clone)]
pub struct PeerRow {
    pub peer_id: u32,
    pub host: String,
    pub port: u16,
    pub has_file: bool,
}

/// Parsed `PeerInfo.cfg`, preserving file order (needed for the "earlier
/// peers dial, later peers get dialed" rule).
#[derive(Debug, Clone)]
pub struct PeerInfoTable {
    rows: Vec<PeerRow>,
}

impl PeerInfoTable {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound("PeerInfo.cfg", path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)?;
        let mut rows = Vec::new();
        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() != 4 {
                return Err(ConfigError::MalformedLine {
                    file: "PeerInfo.cfg",
                    line: raw.to_owned(),
                });
            }
            rows.push(PeerRow {
                peer_id: parts[0].parse()?,
                host: parts[1].to_owned(),
                port: parts[2].parse()?,
                has_file: parts[3].parse::<u8>()? != 0,
            });
        }
        if rows.is_empty() {
            return Err(ConfigError::NoPeers);
        }
        Ok(PeerInfoTable { rows })
    }

    pub fn rows(&self) -> &[PeerRow] {
        &self.rows
    }

    pub fn all_peer_ids(&self) -> std::collections::HashSet<u32> {
        self.rows.iter().map(|r| r.peer_id).collect()
    }

    pub fn get(&self, peer_id: u32) -> Result<&PeerRow, ConfigError> {
        self.rows
            .iter()
            .find(|r| r.peer_id == peer_id)
            .ok_or(ConfigError::UnknownPeer(peer_id))
    }

    /// Peers that appear earlier than `peer_id` in file order — the ones
    /// this peer dials on startup.
    pub fn earlier_peers(&self, peer_id: u32) -> Vec<&PeerRow> {
        self.rows
            .iter()
            .take_while(|r| r.peer_id != peer_id)
            .collect()
    }
}
