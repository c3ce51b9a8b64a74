pub mod candidates;
pub mod connection;
pub mod data_channel;
pub mod ice;
pub mod transport;
pub mod types;

pub use candidates::{CandidateCollector, Collected};
pub use connection::{WebRtcPeer, WebRtcPeerFactory};
pub use transport::{PeerEvent, PeerEventReceiver, PeerEventSender, PeerFactory, TransportPeer};
pub use types::{
    AnswerBundle, Candidate, ChannelData, Payload, SdpType, ServerConfig, SessionDescription,
    TransportProtocol,
};
