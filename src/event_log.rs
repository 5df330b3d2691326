//! Thin `tracing`-based sink for the semantic events named in spec §6.
//!
//! Grounded in `original_source/net/protocol_logger.py` and
//! `util/logging_config.py`: one call site per event, one line per call.
//! The core never formats these lines itself — it just calls these
//! functions, so a different subscriber (or a non-file sink entirely) can
//! be swapped in by the driver without touching policy code.

use tracing::info;

pub fn makes_connection_to(self_id: u32, remote_id: u32) {
    info!(self_id, remote_id, "makes a connection to Peer [{remote_id}]");
}

pub fn connected_from(self_id: u32, remote_id: u32) {
    info!(self_id, remote_id, "is connected from Peer [{remote_id}]");
}

pub fn preferred_neighbors(self_id: u32, ids: &[u32]) {
    let list = ids.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(", ");
    info!(self_id, "has the preferred neighbors [{list}]");
}

pub fn optimistic_unchoked_neighbor(self_id: u32, remote_id: u32) {
    info!(self_id, remote_id, "has the optimistically unchoked neighbor [{remote_id}]");
}

pub fn is_choked_by(self_id: u32, remote_id: u32) {
    info!(self_id, remote_id, "is choked by Peer [{remote_id}]");
}

pub fn is_unchoked_by(self_id: u32, remote_id: u32) {
    info!(self_id, remote_id, "is unchoked by Peer [{remote_id}]");
}

pub fn received_have(self_id: u32, remote_id: u32, index: u32) {
    info!(self_id, remote_id, index, "received the 'have' message from Peer [{remote_id}] for the piece [{index}]");
}

pub fn received_interested(self_id: u32, remote_id: u32) {
    info!(self_id, remote_id, "received the 'interested' message from Peer [{remote_id}]");
}

pub fn received_not_interested(self_id: u32, remote_id: u32) {
    info!(self_id, remote_id, "received the 'not interested' message from Peer [{remote_id}]");
}

pub fn downloaded_piece_from(self_id: u32, remote_id: u32, index: u32, have_count: usize) {
    info!(
        self_id, remote_id, index, have_count,
        "has downloaded the piece [{index}] from Peer [{remote_id}]. Now the number of pieces it has is [{have_count}]"
    );
}

pub fn downloaded_complete_file(self_id: u32) {
    info!(self_id, "has downloaded the complete file");
}

/// Installs a `tracing-subscriber` that writes to `log_dir/log_peer_<id>.log`
/// and, optionally, stdout — mirroring `util/logging_config.py`'s
/// `configure_logging`.
pub fn configure_logging(
    peer_id: u32,
    log_dir: impl AsRef<std::path::Path>,
    to_console: bool,
) -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::never(&log_dir, format!("log_peer_{peer_id}.log"));
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(non_blocking);
    let console_layer = to_console.then(|| tracing_subscriber::fmt::layer().with_target(false));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    Ok(guard)
}
