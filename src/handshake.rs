//! Answer-side handshake for one session.
//!
//! The steps run strictly in order: remote description, remote candidates,
//! answer creation, local description, wait for gathering, answer submission.
//! Recording the submission and the transition to `Connected` belong to
//! [`ActiveSession`], not here.

use crate::error::{ClientError, Result};
use crate::peer::ice::{analyze_candidates, apply_remote_candidates};
use crate::session::ActiveSession;
use crate::signaling::SignalingChannel;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeState {
    Idle,
    Opening,
    RemoteDescriptionSet,
    AnswerCreated,
    LocalDescriptionSet,
    AwaitingGatheringComplete,
    AnswerSubmitted,
    Connected,
    Closed,
    Failed,
}

impl HandshakeState {
    /// Closed or failed; nothing else happens to the session.
    pub fn is_finished(self) -> bool {
        matches!(self, HandshakeState::Closed | HandshakeState::Failed)
    }

    pub fn can_advance_to(self, to: HandshakeState) -> bool {
        use HandshakeState::*;
        match (self, to) {
            (Idle, Opening)
            | (Opening, RemoteDescriptionSet)
            | (RemoteDescriptionSet, AnswerCreated)
            | (AnswerCreated, LocalDescriptionSet)
            | (LocalDescriptionSet, AwaitingGatheringComplete)
            | (AwaitingGatheringComplete, AnswerSubmitted)
            | (AnswerSubmitted, Connected) => true,
            (from, Closed) => from != Closed,
            (from, Failed) => !from.is_finished(),
            _ => false,
        }
    }
}

/// How a handshake run ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The answer reached the server; the session still has to record it.
    Submitted,
    /// The session was stopped while a step was in flight; its result was
    /// discarded.
    Abandoned,
}

pub struct Handshake<'a> {
    signaling: &'a dyn SignalingChannel,
    active: &'a ActiveSession,
    gathering_timeout: Duration,
}

impl<'a> Handshake<'a> {
    pub fn new(
        signaling: &'a dyn SignalingChannel,
        active: &'a ActiveSession,
        gathering_timeout: Duration,
    ) -> Self {
        Self {
            signaling,
            active,
            gathering_timeout,
        }
    }

    /// Runs the handshake from `Opening` up to answer submission.
    ///
    /// Any error is fatal for the session; nothing is retried.
    pub async fn run(&self) -> Result<Outcome> {
        let active = self.active;
        let peer = active.peer();

        let session = self.signaling.open_session().await?;
        if !active.attach_session(session.clone()) {
            info!(channel = %session.id, "session opened after stop, closing orphaned channel");
            if let Err(e) = self.signaling.close_session(&session).await {
                warn!(channel = %session.id, "failed to close orphaned channel: {e}");
            }
            return Ok(Outcome::Abandoned);
        }
        info!(attempt = %active.attempt(), channel = %session.id, "session opened");

        // The transport rejects answer creation until the remote offer is applied.
        peer.set_remote_description(session.remote_offer.clone()).await?;
        if !active.advance(HandshakeState::RemoteDescriptionSet)? {
            return Ok(Outcome::Abandoned);
        }

        let applied = apply_remote_candidates(peer.as_ref(), &session.remote_candidates).await;
        info!(
            channel = %session.id,
            applied,
            received = session.remote_candidates.len(),
            "remote candidates applied"
        );

        let answer = peer.create_answer().await?;
        if !active.advance(HandshakeState::AnswerCreated)? {
            return Ok(Outcome::Abandoned);
        }

        peer.set_local_description(answer.clone()).await?;
        if !active.advance(HandshakeState::LocalDescriptionSet)? {
            return Ok(Outcome::Abandoned);
        }

        if !active.advance(HandshakeState::AwaitingGatheringComplete)? {
            return Ok(Outcome::Abandoned);
        }
        let candidates = tokio::select! {
            gathered = tokio::time::timeout(self.gathering_timeout, active.collector().wait_complete()) => {
                gathered.map_err(|_| {
                    ClientError::protocol(format!(
                        "candidate gathering did not complete within {:?}",
                        self.gathering_timeout
                    ))
                })??
            }
            _ = active.wait_closed() => return Ok(Outcome::Abandoned),
        };
        analyze_candidates(&candidates);

        if active.is_finished() {
            return Ok(Outcome::Abandoned);
        }
        self.signaling
            .submit_answer(&session, &answer, &candidates)
            .await?;
        Ok(Outcome::Submitted)
    }
}
