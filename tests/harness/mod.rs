//! In-memory doubles for the transport peer and the signaling server.
//!
//! Both record every call into one shared, ordered [`CallLog`] so tests can
//! assert on the relative order of peer and server operations.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use signal_client::{
    Ack, Candidate, Client, ClientError, ClientEvent, ClientEvents, Payload, PeerEvent,
    PeerEventSender, PeerFactory, Result, Session, SessionDescription, SignalingChannel,
    TransportPeer,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    OpenSession,
    SubmitAnswer(Vec<Candidate>),
    CloseSession(String),
    SetRemoteDescription,
    AddRemoteCandidate(String),
    CreateAnswer,
    SetLocalDescription,
    Send(Payload),
    ClosePeer,
}

#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    pub fn push(&self, call: Call) {
        self.0.lock().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.0.lock().iter().filter(|c| pred(c)).count()
    }

    pub fn position(&self, pred: impl Fn(&Call) -> bool) -> Option<usize> {
        self.0.lock().iter().position(|c| pred(c))
    }

    pub fn submitted(&self) -> Vec<Vec<Candidate>> {
        self.0
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::SubmitAnswer(cands) => Some(cands.clone()),
                _ => None,
            })
            .collect()
    }

    /// Any operation that negotiates the connection, as opposed to teardown.
    pub fn negotiated(&self) -> bool {
        self.count(|c| {
            matches!(
                c,
                Call::SetRemoteDescription
                    | Call::AddRemoteCandidate(_)
                    | Call::CreateAnswer
                    | Call::SetLocalDescription
            )
        }) > 0
    }
}

pub fn udp(n: u32) -> Candidate {
    Candidate::new(format!(
        "candidate:{n} 1 udp 2130706431 192.168.1.{n} 5{n:03} typ host"
    ))
}

pub fn tcp(n: u32) -> Candidate {
    Candidate::new(format!(
        "candidate:{n} 1 tcp 1518280447 192.168.1.{n} 9 typ host tcptype active"
    ))
}

/// Which peer operation should fail, if any
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Nowhere,
    SetRemote,
    CreateAnswer,
    SetLocal,
}

pub struct MockPeer {
    log: CallLog,
    events: PeerEventSender,
    /// Emitted once the local description is applied, as a real peer starts gathering then
    gathering: Vec<Option<Candidate>>,
    fail_at: FailAt,
}

#[async_trait]
impl TransportPeer for MockPeer {
    async fn set_remote_description(&self, _desc: SessionDescription) -> Result<()> {
        self.log.push(Call::SetRemoteDescription);
        if self.fail_at == FailAt::SetRemote {
            return Err(ClientError::protocol("remote description rejected"));
        }
        Ok(())
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        self.log.push(Call::CreateAnswer);
        if self.fail_at == FailAt::CreateAnswer {
            return Err(ClientError::protocol("no remote description"));
        }
        Ok(SessionDescription::answer("v=0\r\ns=answer\r\n"))
    }

    async fn set_local_description(&self, _desc: SessionDescription) -> Result<()> {
        self.log.push(Call::SetLocalDescription);
        if self.fail_at == FailAt::SetLocal {
            return Err(ClientError::protocol("local description rejected"));
        }
        for event in &self.gathering {
            let _ = self.events.send(PeerEvent::LocalCandidate(event.clone()));
        }
        Ok(())
    }

    async fn add_remote_candidate(&self, candidate: Candidate) -> Result<()> {
        self.log.push(Call::AddRemoteCandidate(candidate.candidate));
        Ok(())
    }

    async fn send(&self, payload: Payload) -> Result<()> {
        self.log.push(Call::Send(payload));
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.log.push(Call::ClosePeer);
        Ok(())
    }
}

pub struct MockPeerFactory {
    log: CallLog,
    gathering: Vec<Option<Candidate>>,
    fail_at: FailAt,
    events: Mutex<Option<PeerEventSender>>,
    created: Mutex<usize>,
}

impl MockPeerFactory {
    pub fn new(log: CallLog, gathering: Vec<Option<Candidate>>) -> Self {
        Self {
            log,
            gathering,
            fail_at: FailAt::Nowhere,
            events: Mutex::new(None),
            created: Mutex::new(0),
        }
    }

    pub fn failing_at(mut self, fail_at: FailAt) -> Self {
        self.fail_at = fail_at;
        self
    }

    /// Injects an event as if the last created peer produced it.
    pub fn emit(&self, event: PeerEvent) {
        let tx = self.events.lock().clone().expect("no peer created yet");
        let _ = tx.send(event);
    }

    pub fn created(&self) -> usize {
        *self.created.lock()
    }
}

#[async_trait]
impl PeerFactory for MockPeerFactory {
    async fn create(&self, events: PeerEventSender) -> Result<Arc<dyn TransportPeer>> {
        // Building a real peer suspends; let overlapping callers interleave here.
        tokio::task::yield_now().await;
        *self.events.lock() = Some(events.clone());
        *self.created.lock() += 1;
        Ok(Arc::new(MockPeer {
            log: self.log.clone(),
            events,
            gathering: self.gathering.clone(),
            fail_at: self.fail_at,
        }))
    }
}

pub enum OpenReply {
    Channel {
        id: String,
        remote_candidates: Vec<Candidate>,
    },
    Status(u16),
}

pub struct MockSignaling {
    log: CallLog,
    open: OpenReply,
    /// When set, `open_session` waits for a permit before replying
    hold_open: Option<Arc<Notify>>,
    submit_status: Option<u16>,
    close_status: Option<u16>,
}

impl MockSignaling {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            open: OpenReply::Channel {
                id: "c1".into(),
                remote_candidates: Vec::new(),
            },
            hold_open: None,
            submit_status: None,
            close_status: None,
        }
    }

    pub fn with_open(mut self, open: OpenReply) -> Self {
        self.open = open;
        self
    }

    pub fn holding_open(mut self, gate: Arc<Notify>) -> Self {
        self.hold_open = Some(gate);
        self
    }

    pub fn failing_submit(mut self, status: u16) -> Self {
        self.submit_status = Some(status);
        self
    }

    pub fn failing_close(mut self, status: u16) -> Self {
        self.close_status = Some(status);
        self
    }
}

#[async_trait]
impl SignalingChannel for MockSignaling {
    async fn open_session(&self) -> Result<Session> {
        self.log.push(Call::OpenSession);
        if let Some(gate) = &self.hold_open {
            gate.notified().await;
        }
        match &self.open {
            OpenReply::Channel {
                id,
                remote_candidates,
            } => Ok(Session {
                id: id.clone(),
                remote_offer: SessionDescription::offer("v=0\r\ns=offer\r\n"),
                remote_candidates: remote_candidates.clone(),
                opened_at: chrono::Utc::now(),
            }),
            OpenReply::Status(status) => Err(ClientError::Server {
                status: *status,
                message: "rejected".into(),
            }),
        }
    }

    async fn submit_answer(
        &self,
        _session: &Session,
        _answer: &SessionDescription,
        candidates: &[Candidate],
    ) -> Result<Ack> {
        self.log.push(Call::SubmitAnswer(candidates.to_vec()));
        match self.submit_status {
            Some(status) => Err(ClientError::Server {
                status,
                message: "answer rejected".into(),
            }),
            None => Ok(Ack(json!({"ok": true}))),
        }
    }

    async fn close_session(&self, session: &Session) -> Result<Ack> {
        self.log.push(Call::CloseSession(session.id.clone()));
        match self.close_status {
            Some(status) => Err(ClientError::Server {
                status,
                message: "close failed".into(),
            }),
            None => Ok(Ack(json!({"closed": true}))),
        }
    }
}

pub struct Fixture {
    pub client: Client,
    pub events: ClientEvents,
    pub peers: Arc<MockPeerFactory>,
    pub log: CallLog,
}

pub fn fixture(gathering: Vec<Option<Candidate>>) -> Fixture {
    let log = CallLog::default();
    let signaling = MockSignaling::new(log.clone());
    let peers = MockPeerFactory::new(log.clone(), gathering);
    fixture_with(log, signaling, peers, Duration::from_secs(5))
}

pub fn fixture_with(
    log: CallLog,
    signaling: MockSignaling,
    peers: MockPeerFactory,
    gathering_timeout: Duration,
) -> Fixture {
    let peers = Arc::new(peers);
    let (client, events) =
        Client::with_parts(Arc::new(signaling), peers.clone(), gathering_timeout);
    Fixture {
        client,
        events,
        peers,
        log,
    }
}

/// Initialize tracing for tests (safe to call repeatedly)
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("signal_client=debug")
        .with_test_writer()
        .try_init();
}

pub async fn next_event(events: &mut ClientEvents) -> ClientEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for client event")
        .expect("event stream closed")
}

/// Asserts nothing else is queued right now.
pub async fn assert_quiet(events: &mut ClientEvents) {
    tokio::time::sleep(Duration::from_millis(20)).await;
    if let Ok(event) = events.try_recv() {
        panic!("unexpected event: {event:?}");
    }
}

pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
