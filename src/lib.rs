//! Answer-side handshake client for a peer-to-peer data transport.
//!
//! A session is opened on an HTTP signaling server, which returns the remote
//! offer and candidates. The client applies them to a transport peer, creates
//! and applies the local answer, waits until local candidate gathering has
//! finished, then submits the answer with the gathered UDP candidates in a
//! single call.

pub mod client;
pub mod config;
pub mod error;
pub mod handshake;
pub mod logger;
pub mod peer;
pub mod session;
pub mod signaling;
pub mod utils;

pub use client::{Client, ClientEvent, ClientEvents};
pub use config::{ClientConfig, LogConfig};
pub use error::{ClientError, ErrorKind, Result, UserError};
pub use handshake::HandshakeState;
pub use peer::{
    Candidate, PeerEvent, PeerEventSender, PeerFactory, Payload, SdpType, ServerConfig,
    SessionDescription, TransportPeer, TransportProtocol,
};
pub use session::Session;
pub use signaling::{Ack, HttpSignaling, SignalingChannel};
