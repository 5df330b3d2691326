use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc;

use p2p_file_share::config::{CommonConfig, PeerInfoTable};
use p2p_file_share::event_log;
use p2p_file_share::node::{fatal_reconstruction_error, Connector, NodeConfig, PeerNode};

/// Peer process for the tit-for-tat piece-exchange network. Reads
/// `Common.cfg` and `PeerInfo.cfg` from the current directory, same as the
/// original `peerProcess.py <peerID>` invocation.
#[derive(Parser, Debug)]
#[command(name = "p2p-file-share")]
struct Cli {
    /// This process's peer id, as listed in PeerInfo.cfg.
    peer_id: u32,

    /// Directory the per-peer log file is written to.
    #[arg(long, default_value = ".")]
    log_dir: PathBuf,

    /// Also log to stdout in addition to the per-peer log file.
    #[arg(long)]
    verbose: bool,

    #[arg(long, default_value = "Common.cfg")]
    common_cfg: PathBuf,

    #[arg(long, default_value = "PeerInfo.cfg")]
    peer_info_cfg: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = event_log::configure_logging(cli.peer_id, &cli.log_dir, cli.verbose)
        .context("failed to set up logging")?;

    let common = CommonConfig::from_file(&cli.common_cfg).context("loading Common.cfg")?;
    let peers = PeerInfoTable::from_file(&cli.peer_info_cfg).context("loading PeerInfo.cfg")?;
    let me = peers.get(cli.peer_id)?.clone();

    let work_dir = std::env::current_dir()?.join(format!("peer_{}", cli.peer_id));
    let data_dir = work_dir.join("pieces");
    let start_full = me.has_file;

    if start_full {
        ensure_seed_has_pieces(&work_dir, &data_dir, &common, cli.peer_id)?;
    }

    let node_cfg = NodeConfig {
        total_pieces: common.total_pieces(),
        piece_size: common.piece_size,
        last_piece_size: common.last_piece_size(),
        data_dir,
        start_with_full_file: start_full,
        k_preferred: common.num_preferred_neighbors,
        preferred_interval: Duration::from_secs(common.unchoking_interval),
        optimistic_interval: Duration::from_secs(common.optimistic_unchoking_interval),
        self_id: cli.peer_id,
        all_peer_ids: peers.all_peer_ids(),
        file_name: common.file_name.clone(),
    };
    let node = PeerNode::new(node_cfg, StdRng::from_entropy())?;

    let (node_tx, node_rx) = mpsc::channel(1024);
    let connector = Connector::new(cli.peer_id, node_tx.clone(), Duration::from_secs(10));

    let accept_handle = connector
        .serve((me.host.as_str(), me.port))
        .await
        .with_context(|| format!("binding {}:{}", me.host, me.port))?;

    for row in peers.earlier_peers(cli.peer_id) {
        let connector = Connector::new(cli.peer_id, node_tx.clone(), Duration::from_secs(10));
        let host = row.host.clone();
        let port = row.port;
        tokio::spawn(async move {
            connector
                .connect_with_retry(&host, port, 5, Duration::from_secs(1), Duration::from_secs(10))
                .await;
        });
    }

    drop(node_tx);

    let node = node.run(node_rx).await;

    accept_handle.abort();
    node.close_all_connections();

    if let Err(e) = node.store().reconstruct_full_file(&common.file_name) {
        if fatal_reconstruction_error(&e) {
            return Err(e).context("reconstructing the complete file after global completion");
        }
        tracing::warn!("final reconstruction failed: {e}");
    }
    node.store().cleanup_pieces();

    Ok(())
}

fn ensure_seed_has_pieces(
    work_dir: &std::path::Path,
    data_dir: &std::path::Path,
    common: &CommonConfig,
    peer_id: u32,
) -> anyhow::Result<()> {
    std::fs::create_dir_all(data_dir)?;
    let src = work_dir.join(&common.file_name);
    if !src.exists() {
        bail!("seed peer {peer_id} missing source file: {}", src.display());
    }
    let already = std::fs::read_dir(data_dir)
        .map(|it| {
            it.filter_map(Result::ok)
                .filter(|e| e.file_name().to_string_lossy().starts_with("piece_"))
                .count()
        })
        .unwrap_or(0);
    if already != common.total_pieces() {
        let store = p2p_file_share::piece::PieceStore::new(
            data_dir,
            common.total_pieces(),
            common.piece_size,
            common.last_piece_size(),
            false,
        )?;
        store.slice_from_file(&src)?;
    }
    Ok(())
}
