//! Public client surface.
//!
//! `connect`, `send` and `stop` never return errors; every outcome reaches the
//! caller as a [`ClientEvent`] on the receiver handed out at construction.

use crate::config::ClientConfig;
use crate::error::{ClientError, Result, UserError};
use crate::handshake::{Handshake, HandshakeState, Outcome};
use crate::peer::candidates::CandidateCollector;
use crate::peer::connection::WebRtcPeerFactory;
use crate::peer::transport::{PeerEvent, PeerEventReceiver, PeerFactory};
use crate::peer::types::Payload;
use crate::session::{ActiveSession, Inbound};
use crate::signaling::{HttpSignaling, SignalingChannel};
use crate::utils::random_id;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, info_span, warn, Instrument};

#[derive(Debug)]
pub enum ClientEvent {
    Connected,
    Data(Payload),
    Closed,
    Error(ClientError),
}

pub type ClientEvents = mpsc::UnboundedReceiver<ClientEvent>;

/// Handshake client holding at most one active session.
///
/// Cheap to clone; clones share the session and the event stream.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

struct Inner {
    signaling: Arc<dyn SignalingChannel>,
    peers: Arc<dyn PeerFactory>,
    gathering_timeout: Duration,
    events: mpsc::UnboundedSender<ClientEvent>,
    active: Mutex<Option<Arc<ActiveSession>>>,
    /// Set while a connect attempt builds its peer, before it owns `active`
    connecting: AtomicBool,
}

/// Clears `connecting` when dropped.
struct ConnectingGuard<'a>(&'a AtomicBool);

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Client {
    /// Client over HTTP signaling and webrtc-rs peers.
    pub fn new(config: &ClientConfig) -> Result<(Self, ClientEvents)> {
        config.validate()?;
        let signaling = Arc::new(HttpSignaling::new(config)?);
        let peers = Arc::new(WebRtcPeerFactory::new(
            config.ice_servers.clone(),
            config.data_channel_label.clone(),
        ));
        Ok(Self::with_parts(signaling, peers, config.gathering_timeout()))
    }

    /// Client over caller-supplied signaling and peers.
    pub fn with_parts(
        signaling: Arc<dyn SignalingChannel>,
        peers: Arc<dyn PeerFactory>,
        gathering_timeout: Duration,
    ) -> (Self, ClientEvents) {
        let (events, rx) = mpsc::unbounded_channel();
        let client = Self {
            inner: Arc::new(Inner {
                signaling,
                peers,
                gathering_timeout,
                events,
                active: Mutex::new(None),
                connecting: AtomicBool::new(false),
            }),
        };
        (client, rx)
    }

    /// Current handshake state; `Idle` without a session.
    pub fn state(&self) -> HandshakeState {
        self.current()
            .map(|a| a.state())
            .unwrap_or(HandshakeState::Idle)
    }

    /// Channel id of the active session, once the server has issued one.
    pub fn session_id(&self) -> Option<String> {
        self.current().and_then(|a| a.session_id())
    }

    pub fn is_connected(&self) -> bool {
        self.current().is_some_and(|a| a.is_connected())
    }

    /// Opens a session and runs the handshake up to answer submission.
    ///
    /// Emits `connected` once the data channel is ready, or `error`.
    pub async fn connect(&self) {
        let attempt = random_id();
        let span = info_span!("connect", %attempt);
        if let Err(e) = self.try_connect(attempt).instrument(span).await {
            self.inner.emit_error(e);
        }
    }

    async fn try_connect(&self, attempt: String) -> Result<()> {
        let connecting = &self.inner.connecting;
        if connecting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(UserError::AlreadyConnected.into());
        }
        let guard = ConnectingGuard(connecting);
        if self.current().is_some() {
            return Err(UserError::AlreadyConnected.into());
        }

        // The gate must exist before the peer can produce its first candidate.
        let collector = Arc::new(CandidateCollector::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let peer = self.inner.peers.create(tx).await?;

        let active = Arc::new(ActiveSession::new(attempt.clone(), peer, collector));
        *self.inner.active.lock() = Some(active.clone());
        drop(guard);
        info!("connecting");

        tokio::spawn(
            pump(self.inner.clone(), active.clone(), rx)
                .instrument(info_span!("peer_events", %attempt)),
        );

        let outcome = Handshake::new(
            self.inner.signaling.as_ref(),
            &active,
            self.inner.gathering_timeout,
        )
        .run()
        .await;

        match outcome {
            Ok(Outcome::Submitted) => {
                let connected = active.mark_answer_submitted(|early| {
                    info!(held = early.len(), "connected");
                    self.inner.emit(ClientEvent::Connected);
                    for payload in early {
                        self.inner.emit(ClientEvent::Data(payload));
                    }
                });
                match connected {
                    Ok(true) => {}
                    Ok(false) => debug!("answer submitted, waiting for data channel"),
                    Err(e) => self.fail(&active, e).await,
                }
            }
            Ok(Outcome::Abandoned) => debug!("handshake abandoned after stop"),
            Err(e) => self.fail(&active, e).await,
        }
        Ok(())
    }

    async fn fail(&self, active: &Arc<ActiveSession>, err: ClientError) {
        let current = {
            let mut slot = self.inner.active.lock();
            if slot.as_ref().is_some_and(|a| Arc::ptr_eq(a, active)) {
                slot.take()
            } else {
                None
            }
        };
        if current.is_none() || !active.fail() {
            debug!("discarding error from stopped attempt: {err}");
            return;
        }

        error!("handshake failed: {err}");
        if let Err(e) = active.peer().close().await {
            debug!("peer close after failure: {e}");
        }
        if let Some(session) = active.session() {
            if let Err(e) = self.inner.signaling.close_session(&session).await {
                warn!(channel = %session.id, "failed to close channel after failure: {e}");
            }
        }
        self.inner.emit_error(err);
    }

    /// Sends over the data channel. Only valid once connected.
    pub async fn send(&self, payload: impl Into<Payload>) {
        let active = match self.current() {
            Some(a) if a.is_connected() => a,
            _ => {
                self.inner.emit_error(UserError::NotConnected.into());
                return;
            }
        };
        if let Err(e) = active.peer().send(payload.into()).await {
            self.inner.emit_error(e);
        }
    }

    /// Tears down the peer and closes the session on the server.
    ///
    /// Emits `closed`, or `error` when there is nothing to stop or the server
    /// call fails.
    pub async fn stop(&self) {
        let active = self.inner.active.lock().take();
        let Some(active) = active else {
            if let Err(e) = self.inner.signaling.close(None).await {
                self.inner.emit_error(e);
            }
            return;
        };

        let session = active.close();
        if let Err(e) = active.peer().close().await {
            warn!("peer close failed: {e}");
        }

        match session {
            Some(session) => match self.inner.signaling.close_session(&session).await {
                Ok(ack) => {
                    info!(
                        channel = %session.id,
                        ack = ?ack.0,
                        age_secs = session.age().num_seconds(),
                        "closed"
                    );
                    self.inner.emit(ClientEvent::Closed);
                }
                Err(e) => self.inner.emit_error(e),
            },
            None => {
                info!(attempt = %active.attempt(), "stopped before the server issued a channel");
                self.inner.emit(ClientEvent::Closed);
            }
        }
    }

    fn current(&self) -> Option<Arc<ActiveSession>> {
        self.inner.active.lock().clone()
    }
}

impl Inner {
    fn emit(&self, event: ClientEvent) {
        if self.events.send(event).is_err() {
            debug!("event receiver dropped");
        }
    }

    fn emit_error(&self, err: ClientError) {
        if matches!(err, ClientError::InvariantViolation(_)) {
            error!("{err}");
        }
        self.emit(ClientEvent::Error(err));
    }
}

/// Consumes one session's peer events until the session ends.
async fn pump(inner: Arc<Inner>, active: Arc<ActiveSession>, mut rx: PeerEventReceiver) {
    let closed = active.wait_closed();
    tokio::pin!(closed);

    loop {
        let event = tokio::select! {
            event = rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
            _ = &mut closed => break,
        };

        match event {
            PeerEvent::LocalCandidate(candidate) => {
                if let Err(e) = active.collector().on_candidate(candidate) {
                    inner.emit_error(e);
                }
            }
            PeerEvent::ChannelOpen => {
                if active.mark_channel_open() {
                    info!("connected");
                    inner.emit(ClientEvent::Connected);
                }
            }
            PeerEvent::Message(payload) => {
                let len = payload.len();
                match active.on_message(payload, |p| inner.emit(ClientEvent::Data(p))) {
                    Inbound::Delivered => {}
                    Inbound::Held => {
                        debug!(len, "holding message until the answer is acknowledged")
                    }
                    Inbound::Dropped => {
                        debug!(len, "dropping message received before the channel opened")
                    }
                }
            }
            PeerEvent::ChannelClosed => info!("data channel closed by transport"),
            PeerEvent::StateChanged(state) => debug!(%state, "transport state"),
        }
    }
    debug!("peer event pump finished");
}
