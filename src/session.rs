use crate::error::{ClientError, Result};
use crate::handshake::HandshakeState;
use crate::peer::candidates::CandidateCollector;
use crate::peer::transport::TransportPeer;
use crate::peer::types::{Candidate, ChannelData, Payload, SessionDescription};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// One channel opened on the signaling server
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub remote_offer: SessionDescription,
    pub remote_candidates: Vec<Candidate>,
    pub opened_at: DateTime<Utc>,
}

impl Session {
    /// Time since the server issued the channel.
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.opened_at
    }
}

impl From<ChannelData> for Session {
    fn from(data: ChannelData) -> Self {
        Self {
            id: data.channel_id,
            remote_offer: data.offer,
            remote_candidates: data.ice_candidates,
            opened_at: Utc::now(),
        }
    }
}

struct Progress {
    state: HandshakeState,
    session: Option<Session>,
    channel_open: bool,
    /// Messages that arrived on the open channel before the answer was acknowledged
    early: Vec<Payload>,
}

/// What happened to one inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    Delivered,
    Held,
    Dropped,
}

/// Everything the client holds for the one connect attempt in flight.
///
/// The peer and the collector exist from the start of the attempt; the
/// signaling session appears once the server has answered.
pub struct ActiveSession {
    attempt: String,
    peer: Arc<dyn TransportPeer>,
    collector: Arc<CandidateCollector>,
    progress: Mutex<Progress>,
    closed: watch::Sender<bool>,
}

impl ActiveSession {
    pub fn new(
        attempt: String,
        peer: Arc<dyn TransportPeer>,
        collector: Arc<CandidateCollector>,
    ) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            attempt,
            peer,
            collector,
            progress: Mutex::new(Progress {
                state: HandshakeState::Opening,
                session: None,
                channel_open: false,
                early: Vec::new(),
            }),
            closed,
        }
    }

    pub fn attempt(&self) -> &str {
        &self.attempt
    }

    pub fn peer(&self) -> &Arc<dyn TransportPeer> {
        &self.peer
    }

    pub fn collector(&self) -> &Arc<CandidateCollector> {
        &self.collector
    }

    pub fn state(&self) -> HandshakeState {
        self.progress.lock().state
    }

    pub fn session_id(&self) -> Option<String> {
        self.progress.lock().session.as_ref().map(|s| s.id.clone())
    }

    pub fn session(&self) -> Option<Session> {
        self.progress.lock().session.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == HandshakeState::Connected
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_finished()
    }

    /// Moves to `to`. Returns `Ok(false)` when the session was closed or failed
    /// meanwhile, in which case the caller abandons its step.
    pub fn advance(&self, to: HandshakeState) -> Result<bool> {
        let mut p = self.progress.lock();
        self.advance_locked(&mut p, to)
    }

    fn advance_locked(&self, p: &mut Progress, to: HandshakeState) -> Result<bool> {
        if p.state.is_finished() {
            return Ok(false);
        }
        if !p.state.can_advance_to(to) {
            return Err(ClientError::invariant(format!(
                "illegal handshake transition {:?} -> {:?}",
                p.state, to
            )));
        }
        debug!(attempt = %self.attempt, from = ?p.state, to = ?to, "handshake transition");
        p.state = to;
        Ok(true)
    }

    /// Records the opened session. `false` if the attempt was stopped meanwhile.
    pub fn attach_session(&self, session: Session) -> bool {
        let mut p = self.progress.lock();
        if p.state.is_finished() {
            return false;
        }
        p.session = Some(session);
        true
    }

    /// The answer reached the server. Returns `true` when this completes the
    /// connection (the data channel opened first).
    ///
    /// On completion `on_connected` runs under the progress lock with the
    /// messages held back so far, so nothing delivered later can overtake them.
    pub fn mark_answer_submitted(
        &self,
        on_connected: impl FnOnce(Vec<Payload>),
    ) -> Result<bool> {
        let mut p = self.progress.lock();
        if !self.advance_locked(&mut p, HandshakeState::AnswerSubmitted)? {
            return Ok(false);
        }
        if !p.channel_open || !self.advance_locked(&mut p, HandshakeState::Connected)? {
            return Ok(false);
        }
        on_connected(std::mem::take(&mut p.early));
        Ok(true)
    }

    /// Routes one inbound message. Once connected it goes to `deliver`; while
    /// the channel is open but the answer is unacknowledged it is held.
    pub fn on_message(&self, payload: Payload, deliver: impl FnOnce(Payload)) -> Inbound {
        let mut p = self.progress.lock();
        if p.state == HandshakeState::Connected {
            deliver(payload);
            Inbound::Delivered
        } else if p.channel_open && !p.state.is_finished() {
            p.early.push(payload);
            Inbound::Held
        } else {
            Inbound::Dropped
        }
    }

    /// The data channel reported ready. Returns `true` exactly once, when
    /// this completes the connection.
    pub fn mark_channel_open(&self) -> bool {
        let mut p = self.progress.lock();
        if p.channel_open {
            return false;
        }
        p.channel_open = true;
        if p.state == HandshakeState::AnswerSubmitted {
            debug!(attempt = %self.attempt, "handshake transition to Connected");
            p.state = HandshakeState::Connected;
            return true;
        }
        false
    }

    /// Marks the session closed and wakes any step waiting on it.
    /// Returns the signaling session to notify, if one was opened.
    pub fn close(&self) -> Option<Session> {
        let session = {
            let mut p = self.progress.lock();
            p.state = HandshakeState::Closed;
            p.early.clear();
            p.session.clone()
        };
        self.closed.send_replace(true);
        session
    }

    /// Marks the session failed. `false` if it had already finished.
    pub fn fail(&self) -> bool {
        let changed = {
            let mut p = self.progress.lock();
            if p.state.is_finished() {
                false
            } else {
                p.state = HandshakeState::Failed;
                true
            }
        };
        if changed {
            self.closed.send_replace(true);
        }
        changed
    }

    /// Resolves once the session is closed or failed.
    pub async fn wait_closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}
