use crate::config::LogConfig;
use crate::peer::types::Candidate;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Installs the global fmt subscriber. `RUST_LOG` overrides the configured level.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init(config: &LogConfig) {
    if !config.enabled {
        return;
    }
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},webrtc=warn", config.level)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Logs one ICE candidate as it is gathered or applied
pub fn dump_candidate(label: &str, cand: &Candidate) {
    debug!(
        "{label}: candidate={} sdp_mid={:?} sdp_mline_index={:?} username_fragment={:?}",
        cand.candidate, cand.sdp_mid, cand.sdp_mline_index, cand.username_fragment
    );
}
