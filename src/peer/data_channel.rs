use crate::peer::connection::DataChannelSlot;
use crate::peer::transport::{forward, PeerEvent, PeerEventSender};
use crate::peer::types::Payload;
use std::sync::Arc;
use tracing::{debug, info, warn};
use webrtc::data_channel::{data_channel_message::DataChannelMessage, RTCDataChannel};

/// Common handler for the data channel announced by the remote side
pub fn attach_dc(
    dc: &Arc<RTCDataChannel>,
    expected_label: &str,
    slot: &DataChannelSlot,
    events: PeerEventSender,
) {
    info!(label = dc.label(), "remote data channel announced");
    if dc.label() != expected_label {
        warn!(
            expected = expected_label,
            got = dc.label(),
            "unexpected data channel label, accepting anyway"
        );
    }

    if slot.lock().replace(dc.clone()).is_some() {
        debug!("replacing previously announced data channel");
    }

    let tx = events.clone();
    dc.on_open(Box::new(move || {
        info!("data channel open");
        forward(&tx, PeerEvent::ChannelOpen);
        Box::pin(async {})
    }));

    let tx = events.clone();
    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        debug!(len = msg.data.len(), is_string = msg.is_string, "data channel message");
        let payload = if msg.is_string {
            Payload::Text(String::from_utf8_lossy(&msg.data).into_owned())
        } else {
            Payload::Binary(msg.data)
        };
        forward(&tx, PeerEvent::Message(payload));
        Box::pin(async {})
    }));

    let tx = events;
    dc.on_close(Box::new(move || {
        info!("data channel closed");
        forward(&tx, PeerEvent::ChannelClosed);
        Box::pin(async {})
    }));
}
