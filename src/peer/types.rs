use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Type of a session description
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

/// Offer/answer payload, wire-compatible with the browser `RTCSessionDescriptionInit`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Transport protocol a candidate was gathered for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportProtocol {
    Udp,
    Tcp,
    Unknown(String),
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportProtocol::Udp => f.write_str("UDP"),
            TransportProtocol::Tcp => f.write_str("TCP"),
            TransportProtocol::Unknown(s) => write!(f, "unknown({s})"),
        }
    }
}

/// ICE candidate, wire-compatible with the browser `RTCIceCandidateInit`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        default,
        rename = "sdpMLineIndex",
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl Candidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_mline_index: None,
            username_fragment: None,
        }
    }

    /// Reads the transport field of `candidate:<foundation> <component> <transport> ...`.
    pub fn transport_protocol(&self) -> TransportProtocol {
        let attr = self.candidate.trim();
        let attr = attr.strip_prefix("a=").unwrap_or(attr);
        let attr = attr.strip_prefix("candidate:").unwrap_or(attr);
        match attr.split_whitespace().nth(2) {
            Some(t) if t.eq_ignore_ascii_case("udp") => TransportProtocol::Udp,
            Some(t) if t.eq_ignore_ascii_case("tcp") => TransportProtocol::Tcp,
            Some(t) => TransportProtocol::Unknown(t.to_string()),
            None => TransportProtocol::Unknown(String::new()),
        }
    }

    pub fn is_udp(&self) -> bool {
        self.transport_protocol() == TransportProtocol::Udp
    }

    /// `typ` field of the candidate attribute (host, srflx, prflx, relay).
    pub fn candidate_type(&self) -> Option<&str> {
        let mut fields = self.candidate.split_whitespace();
        while let Some(f) = fields.next() {
            if f == "typ" {
                return fields.next();
            }
        }
        None
    }
}

/// Message carried over the data channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Bytes),
}

impl Payload {
    pub fn len(&self) -> usize {
        match self {
            Payload::Text(s) => s.len(),
            Payload::Binary(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Text(s)
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Text(s.to_string())
    }
}

impl From<Bytes> for Payload {
    fn from(b: Bytes) -> Self {
        Payload::Binary(b)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(b: Vec<u8>) -> Self {
        Payload::Binary(Bytes::from(b))
    }
}

/// `POST /channels` response
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ChannelData {
    pub channel_id: String,
    pub offer: SessionDescription,
    #[serde(default)]
    pub ice_candidates: Vec<Candidate>,
}

/// `POST /channels/{id}/answer` body
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AnswerBundle {
    pub answer: SessionDescription,
    pub ice_candidates: Vec<Candidate>,
}

/// ICE server configuration
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub id: String,
    pub r#type: String, // 'stun' or 'turn'
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub credential: Option<String>,
}
