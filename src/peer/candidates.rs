//! Local candidate collection for one session.
//!
//! The collector is created, with its gathering gate held, before the transport
//! peer's handlers are registered. The end-of-candidates marker is the only
//! thing that releases the gate; it freezes the set and hands it to the single
//! waiter in one step under the same lock that guards appends.

use crate::error::{ClientError, Result};
use crate::logger::dump_candidate;
use crate::peer::types::Candidate;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// What happened to one gathering event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collected {
    /// UDP candidate appended to the set
    Added,
    /// Non-UDP candidate dropped
    Filtered,
    /// Candidate arrived after the set was frozen
    Late,
    /// End marker; the set is now frozen
    Complete,
}

struct Gathering {
    candidates: Vec<Candidate>,
    /// The held gate. `None` once released.
    release: Option<oneshot::Sender<Vec<Candidate>>>,
}

pub struct CandidateCollector {
    gathering: Mutex<Gathering>,
    ready: Mutex<Option<oneshot::Receiver<Vec<Candidate>>>>,
}

impl CandidateCollector {
    /// Creates a collector with the gate already acquired.
    pub fn new() -> Self {
        let (tx, rx) = oneshot::channel();
        Self {
            gathering: Mutex::new(Gathering {
                candidates: Vec::new(),
                release: Some(tx),
            }),
            ready: Mutex::new(Some(rx)),
        }
    }

    /// Feeds one gathering event. `None` is the end-of-candidates marker.
    ///
    /// Candidates after the freeze are logged and ignored. A second end marker
    /// would release the gate twice and is reported as an invariant violation.
    pub fn on_candidate(&self, candidate: Option<Candidate>) -> Result<Collected> {
        let mut g = self.gathering.lock();
        match candidate {
            Some(c) => {
                if g.release.is_none() {
                    warn!(candidate = %c.candidate, "candidate after end of gathering, ignoring");
                    return Ok(Collected::Late);
                }
                if !c.is_udp() {
                    debug!(
                        candidate = %c.candidate,
                        protocol = %c.transport_protocol(),
                        "dropping non-UDP candidate"
                    );
                    return Ok(Collected::Filtered);
                }
                dump_candidate("LOCAL", &c);
                g.candidates.push(c);
                Ok(Collected::Added)
            }
            None => {
                let release = g.release.take().ok_or_else(|| {
                    ClientError::invariant("gathering gate released more than once")
                })?;
                info!(count = g.candidates.len(), "local candidate gathering complete");
                if release.send(g.candidates.clone()).is_err() {
                    debug!("gathering completed with nobody waiting");
                }
                Ok(Collected::Complete)
            }
        }
    }

    /// Waits for the end marker and returns the frozen set.
    ///
    /// There is exactly one waiter per session; a second call is an invariant
    /// violation. If the collector is torn down first the wait fails.
    pub async fn wait_complete(&self) -> Result<Vec<Candidate>> {
        let rx = self
            .ready
            .lock()
            .take()
            .ok_or_else(|| ClientError::invariant("gathering completion awaited more than once"))?;
        rx.await
            .map_err(|_| ClientError::protocol("candidate gathering abandoned before completion"))
    }

    pub fn is_frozen(&self) -> bool {
        self.gathering.lock().release.is_none()
    }

    pub fn len(&self) -> usize {
        self.gathering.lock().candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CandidateCollector {
    fn default() -> Self {
        Self::new()
    }
}
