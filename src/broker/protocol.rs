//! Signaling wire protocol for the relay broker.
//!
//! Messages are newline-delimited JSON. Commands (client → broker) carry a
//! `"cmd"` tag, events (broker → client) an `"event"` tag. NAT traversal,
//! media negotiation, and stream multiplexing all live behind the broker;
//! this protocol only surfaces connect/accept/close semantics plus the text
//! side-channel the caption pipeline rides on.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Commands sent to the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "kebab-case")]
pub enum SignalCommand {
    /// Register with the broker; it replies with an `open` event carrying the
    /// assigned address.
    Open,

    /// Start a media call to a peer, offering our stream.
    Call { to: String },

    /// Answer a peer's inbound call with our stream.
    Answer { to: String },

    /// Open the text data channel to a peer.
    Connect { to: String },

    /// Send a finalized transcript over the data channel.
    Send { to: String, text: String },

    /// Announce local mic/camera track toggles.
    TrackState { to: String, audio: bool, video: bool },

    /// Close the call and the data channel.
    Hangup { to: String },
}

/// Events delivered by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum SignalEvent {
    /// Broker-assigned local address, delivered once after registration.
    Open { address: String },

    /// A peer is calling us.
    IncomingCall { from: String },

    /// The peer's media stream is flowing; flags mirror its track states.
    Stream { from: String, audio: bool, video: bool },

    /// A peer opened the data channel to us.
    Connection { from: String },

    /// Our data channel to the peer is open.
    ChannelOpen { with: String },

    /// Text received on the data channel.
    Data { from: String, text: String },

    /// The peer toggled its mic or camera.
    TrackState { from: String, audio: bool, video: bool },

    /// The peer closed the call (or dropped off the broker).
    Closed { from: String },

    /// Broker-side failure (unknown peer, relay error).
    Error { message: String },
}

pub fn encode_command(command: &SignalCommand) -> Result<String> {
    serde_json::to_string(command).context("failed to encode signal command")
}

pub fn decode_event(line: &str) -> Result<SignalEvent> {
    serde_json::from_str(line).context("failed to decode signal event")
}
