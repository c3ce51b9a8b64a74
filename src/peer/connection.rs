use crate::error::{ClientError, Result};
use crate::peer::data_channel::attach_dc;
use crate::peer::transport::{forward, PeerEvent, PeerEventSender, PeerFactory, TransportPeer};
use crate::peer::types::{Candidate, Payload, SdpType, ServerConfig, SessionDescription};
use crate::utils::add_ice_url_scheme;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::{
    api::APIBuilder,
    data_channel::RTCDataChannel,
    ice_transport::ice_server::RTCIceServer,
    peer_connection::{
        configuration::RTCConfiguration, peer_connection_state::RTCPeerConnectionState,
        RTCPeerConnection,
    },
};

pub(crate) type DataChannelSlot = Arc<Mutex<Option<Arc<RTCDataChannel>>>>;

/// Builds a webrtc-rs peer per session
pub struct WebRtcPeerFactory {
    ice_servers: Vec<ServerConfig>,
    label: String,
}

impl WebRtcPeerFactory {
    pub fn new(ice_servers: Vec<ServerConfig>, label: impl Into<String>) -> Self {
        Self {
            ice_servers,
            label: label.into(),
        }
    }
}

#[async_trait]
impl PeerFactory for WebRtcPeerFactory {
    async fn create(&self, events: PeerEventSender) -> Result<Arc<dyn TransportPeer>> {
        let peer = WebRtcPeer::new(&self.ice_servers, &self.label, events).await?;
        Ok(Arc::new(peer))
    }
}

/// Answerer-side peer connection. The remote side opens the data channel.
pub struct WebRtcPeer {
    pc: Arc<RTCPeerConnection>,
    data_channel: DataChannelSlot,
}

impl WebRtcPeer {
    /// Creates the connection and registers every handler before returning.
    /// `label` is the data channel label the offerer is expected to open.
    pub async fn new(
        ice_servers: &[ServerConfig],
        label: &str,
        events: PeerEventSender,
    ) -> Result<Self> {
        let api = APIBuilder::new().build();
        let pc = Arc::new(api.new_peer_connection(rtc_config(ice_servers)).await?);
        let data_channel: DataChannelSlot = Arc::new(Mutex::new(None));

        let tx = events.clone();
        pc.on_ice_candidate(Box::new(move |cand: Option<RTCIceCandidate>| {
            let event = match cand {
                Some(c) => match c.to_json() {
                    Ok(init) => Some(PeerEvent::LocalCandidate(Some(Candidate {
                        candidate: init.candidate,
                        sdp_mid: init.sdp_mid,
                        sdp_mline_index: init.sdp_mline_index,
                        username_fragment: init.username_fragment,
                    }))),
                    Err(e) => {
                        warn!("failed to serialize local candidate: {e}");
                        None
                    }
                },
                // cand == None means gathering finished
                None => Some(PeerEvent::LocalCandidate(None)),
            };
            if let Some(event) = event {
                forward(&tx, event);
            }
            Box::pin(async {})
        }));

        pc.on_ice_gathering_state_change(Box::new(move |state| {
            debug!("ICE gathering state changed to: {state:?}");
            Box::pin(async {})
        }));

        pc.on_ice_connection_state_change(Box::new(move |st: RTCIceConnectionState| {
            debug!("ICE connection state changed to: {st:?}");
            Box::pin(async {})
        }));

        pc.on_signaling_state_change(Box::new(move |st: RTCSignalingState| {
            debug!("signaling state changed to: {st:?}");
            Box::pin(async {})
        }));

        let tx = events.clone();
        pc.on_peer_connection_state_change(Box::new(move |st: RTCPeerConnectionState| {
            info!("peer connection state changed to: {st:?}");
            forward(&tx, PeerEvent::StateChanged(st.to_string()));
            Box::pin(async {})
        }));

        let tx = events;
        let slot = data_channel.clone();
        let label = label.to_string();
        pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
            attach_dc(&dc, &label, &slot, tx.clone());
            Box::pin(async {})
        }));

        Ok(Self { pc, data_channel })
    }
}

#[async_trait]
impl TransportPeer for WebRtcPeer {
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        self.pc.set_remote_description(to_rtc_description(desc)?).await?;
        Ok(())
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self.pc.create_answer(None).await?;
        from_rtc_description(&answer)
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        self.pc.set_local_description(to_rtc_description(desc)?).await?;
        Ok(())
    }

    async fn add_remote_candidate(&self, candidate: Candidate) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment,
        };
        self.pc.add_ice_candidate(init).await?;
        Ok(())
    }

    async fn send(&self, payload: Payload) -> Result<()> {
        let dc = { self.data_channel.lock().as_ref().cloned() };
        let dc = dc.ok_or_else(|| ClientError::protocol("data channel not available"))?;
        match payload {
            Payload::Text(text) => dc.send_text(text).await?,
            Payload::Binary(bytes) => dc.send(&bytes).await?,
        };
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let dc = self.data_channel.lock().take();
        if let Some(dc) = dc {
            if let Err(e) = dc.close().await {
                debug!("data channel close failed: {e}");
            }
        }
        self.pc.close().await?;
        Ok(())
    }
}

fn to_rtc_description(desc: SessionDescription) -> Result<RTCSessionDescription> {
    let rtc = match desc.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(desc.sdp)?,
        SdpType::Answer => RTCSessionDescription::answer(desc.sdp)?,
        SdpType::Pranswer => RTCSessionDescription::pranswer(desc.sdp)?,
        SdpType::Rollback => {
            return Err(ClientError::protocol("rollback descriptions are not supported"))
        }
    };
    Ok(rtc)
}

fn from_rtc_description(desc: &RTCSessionDescription) -> Result<SessionDescription> {
    let sdp_type = match desc.sdp_type {
        RTCSdpType::Offer => SdpType::Offer,
        RTCSdpType::Answer => SdpType::Answer,
        RTCSdpType::Pranswer => SdpType::Pranswer,
        RTCSdpType::Rollback => SdpType::Rollback,
        RTCSdpType::Unspecified => {
            return Err(ClientError::protocol("transport produced an untyped description"))
        }
    };
    Ok(SessionDescription {
        sdp_type,
        sdp: desc.sdp.clone(),
    })
}

/// Peer connection configuration
fn rtc_config(servers: &[ServerConfig]) -> RTCConfiguration {
    RTCConfiguration {
        ice_servers: get_user_ice_servers(servers),
        bundle_policy: RTCBundlePolicy::MaxBundle,
        rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
        ..Default::default()
    }
}

pub fn get_user_ice_servers(servers: &[ServerConfig]) -> Vec<RTCIceServer> {
    servers
        .iter()
        .map(|config| RTCIceServer {
            urls: vec![add_ice_url_scheme(config)],
            username: config.username.clone().unwrap_or_default(),
            credential: config.credential.clone().unwrap_or_default(),
            ..Default::default()
        })
        .collect()
}
