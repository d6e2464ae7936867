//! Message agent seam: outbound TMF messages and inbound requests.

use crate::error::ResolverError;
use bytes::Bytes;
use mesh_wire::Uri;
use std::net::Ipv6Addr;
use tokio::sync::mpsc;
use tracing::debug;

/// Outbound resolution message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmfMessage {
    /// Resource path
    pub uri: Uri,
    /// Destination address
    pub destination: Ipv6Addr,
    /// Whether the message must be acknowledged
    pub confirmable: bool,
    /// TLV payload
    pub payload: Bytes,
}

impl TmfMessage {
    /// Create a message
    pub fn new(uri: Uri, destination: Ipv6Addr, confirmable: bool, payload: Bytes) -> Self {
        Self {
            uri,
            destination,
            confirmable,
            payload,
        }
    }
}

/// Inbound resolution request handed over by the message agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundRequest {
    /// Resource path
    pub uri: Uri,
    /// Sender address
    pub source: Ipv6Addr,
    /// Whether the request was sent to a multicast address
    pub multicast: bool,
    /// Whether the sender expects an acknowledgement
    pub confirmable: bool,
    /// TLV payload
    pub payload: Bytes,
}

/// Sends resolution messages on behalf of the resolver
pub trait MessageAgent: Send + Sync {
    /// Send a message
    fn send(&self, message: TmfMessage) -> Result<(), ResolverError>;

    /// Send an empty acknowledgement for a confirmable request
    fn send_ack(&self, request: &InboundRequest) -> Result<(), ResolverError>;
}

/// Output of a [`ChannelAgent`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentOutput {
    /// A message to transmit
    Message(TmfMessage),
    /// An acknowledgement to transmit
    Ack {
        /// Resource the acknowledged request was for
        uri: Uri,
        /// Address to acknowledge to
        destination: Ipv6Addr,
    },
}

/// Message agent that hands everything to a transmit task over a channel
#[derive(Debug, Clone)]
pub struct ChannelAgent {
    tx: mpsc::UnboundedSender<AgentOutput>,
}

impl ChannelAgent {
    /// Create an agent and the receiver its output goes to
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AgentOutput>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, output: AgentOutput) -> Result<(), ResolverError> {
        self.tx
            .send(output)
            .map_err(|e| ResolverError::Send(e.to_string()))
    }
}

impl MessageAgent for ChannelAgent {
    fn send(&self, message: TmfMessage) -> Result<(), ResolverError> {
        debug!("Queueing {} to {}", message.uri, message.destination);
        self.forward(AgentOutput::Message(message))
    }

    fn send_ack(&self, request: &InboundRequest) -> Result<(), ResolverError> {
        self.forward(AgentOutput::Ack {
            uri: request.uri,
            destination: request.source,
        })
    }
}
