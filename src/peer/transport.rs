use crate::error::Result;
use crate::peer::types::{Candidate, Payload, SessionDescription};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Everything a transport peer reports asynchronously.
///
/// Each handler the peer would otherwise call back into is a message on one
/// channel, consumed by the session's event pump.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    /// Locally gathered candidate. `None` marks the end of gathering.
    LocalCandidate(Option<Candidate>),
    /// The data channel is open and ready to carry payloads.
    ChannelOpen,
    /// Inbound data-channel message.
    Message(Payload),
    /// The data channel closed.
    ChannelClosed,
    /// Connection state change, for diagnostics.
    StateChanged(String),
}

pub type PeerEventSender = mpsc::UnboundedSender<PeerEvent>;
pub type PeerEventReceiver = mpsc::UnboundedReceiver<PeerEvent>;

/// Sends from a transport handler. The session may already be gone, in which
/// case the event is dropped.
pub(crate) fn forward(tx: &PeerEventSender, event: PeerEvent) {
    if let Err(e) = tx.send(event) {
        debug!(event = ?e.0, "peer event dropped, session gone");
    }
}

/// The connection primitive that negotiates paths and carries data.
#[async_trait]
pub trait TransportPeer: Send + Sync {
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()>;

    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()>;

    async fn add_remote_candidate(&self, candidate: Candidate) -> Result<()>;

    async fn send(&self, payload: Payload) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Creates one transport peer per session, wired to emit into `events`.
///
/// Implementations must register all of the peer's handlers before returning
/// so no event is produced before the caller can see it.
#[async_trait]
pub trait PeerFactory: Send + Sync {
    async fn create(&self, events: PeerEventSender) -> Result<Arc<dyn TransportPeer>>;
}
