use crate::logger::dump_candidate;
use crate::peer::transport::TransportPeer;
use crate::peer::types::Candidate;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Applies the candidates delivered with the remote offer, in order.
///
/// A candidate already applied (same attribute, mid and m-line index) is
/// skipped. A rejected candidate is logged; the remaining ones are still
/// applied. Returns how many were handed to the peer successfully.
pub async fn apply_remote_candidates(peer: &dyn TransportPeer, candidates: &[Candidate]) -> usize {
    let mut seen = HashSet::new();
    let mut applied = 0;

    for candidate in candidates {
        let key = (
            candidate.candidate.as_str(),
            candidate.sdp_mid.as_deref(),
            candidate.sdp_mline_index,
        );
        if !seen.insert(key) {
            debug!(candidate = %candidate.candidate, "skipping duplicate remote candidate");
            continue;
        }

        dump_candidate("REMOTE", candidate);
        match peer.add_remote_candidate(candidate.clone()).await {
            Ok(()) => applied += 1,
            Err(e) => warn!("failed to add remote candidate: {e}"),
        }
    }

    applied
}

pub fn analyze_candidates(candidates: &[Candidate]) {
    let mut host_count = 0;
    let mut srflx_count = 0;
    let mut relay_count = 0;

    for candidate in candidates {
        match candidate.candidate_type() {
            Some("host") => host_count += 1,
            Some("srflx") => srflx_count += 1,
            Some("relay") => relay_count += 1,
            _ => {}
        }
    }

    info!(
        host = host_count,
        srflx = srflx_count,
        relay = relay_count,
        "candidate analysis"
    );

    if relay_count == 0 {
        warn!("no relay candidates found; connection through restrictive NAT may fail");
    }
}
