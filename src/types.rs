//! Wire-level command/response types and the decoded message record.

use bytes::Bytes;

/// Operations a client may request from the node.
///
/// Carried in the tag byte of every outbound envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    Unspecified = 0,
    PublishData = 1,
    SubscribeToTopic = 2,
    UnsubscribeFromTopic = 3,
}

impl Command {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Unspecified),
            1 => Some(Self::PublishData),
            2 => Some(Self::SubscribeToTopic),
            3 => Some(Self::UnsubscribeFromTopic),
            _ => None,
        }
    }
}

/// Classification of an inbound envelope. Drives dispatch in the receive loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ResponseKind {
    Unspecified = 0,
    /// An application message; the payload is JSON per the codec schema.
    Message = 1,
    /// A router-internal trace event. Pass-through only, never decoded here.
    TraceRouter = 2,
    /// A gossip-layer trace event. Pass-through only, never decoded here.
    TraceGossip = 3,
}

impl ResponseKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Unspecified),
            1 => Some(Self::Message),
            2 => Some(Self::TraceRouter),
            3 => Some(Self::TraceGossip),
            _ => None,
        }
    }

    /// Human-readable label for trace kinds, used in preview strings.
    pub fn trace_label(self) -> Option<&'static str> {
        match self {
            Self::TraceRouter => Some("Router"),
            Self::TraceGossip => Some("Gossip"),
            _ => None,
        }
    }
}

/// One unit exchanged over the duplex channel.
///
/// The tag byte carries a [`Command`] on the write side and a
/// [`ResponseKind`] on the read side. Envelopes are transient; nothing in
/// this crate persists them.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub tag: u8,
    pub topic: String,
    pub data: Bytes,
}

impl Envelope {
    /// Build an outbound command envelope.
    pub fn command(command: Command, topic: impl Into<String>, data: Bytes) -> Self {
        Self {
            tag: command as u8,
            topic: topic.into(),
            data,
        }
    }

    /// Build an inbound response envelope (node side / tests).
    pub fn response(kind: ResponseKind, topic: impl Into<String>, data: Bytes) -> Self {
        Self {
            tag: kind as u8,
            topic: topic.into(),
            data,
        }
    }

    /// Interpret the tag byte as a response kind. Unknown tags map to
    /// [`ResponseKind::Unspecified`] and are ignored by the receive loop.
    pub fn kind(&self) -> ResponseKind {
        ResponseKind::from_u8(self.tag).unwrap_or(ResponseKind::Unspecified)
    }
}

/// The decoded, application-facing message record.
///
/// A value type: immutable once constructed, no identity beyond its fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PubSubMessage {
    pub message_id: String,
    pub topic: String,
    pub payload: Bytes,
    pub source_node_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_round_trips_through_u8() {
        for command in [
            Command::Unspecified,
            Command::PublishData,
            Command::SubscribeToTopic,
            Command::UnsubscribeFromTopic,
        ] {
            assert_eq!(Command::from_u8(command as u8), Some(command));
        }
        assert_eq!(Command::from_u8(42), None);
    }

    #[test]
    fn unknown_tag_reads_as_unspecified() {
        let envelope = Envelope {
            tag: 200,
            topic: String::new(),
            data: Bytes::new(),
        };
        assert_eq!(envelope.kind(), ResponseKind::Unspecified);
    }

    #[test]
    fn trace_labels() {
        assert_eq!(ResponseKind::TraceRouter.trace_label(), Some("Router"));
        assert_eq!(ResponseKind::TraceGossip.trace_label(), Some("Gossip"));
        assert_eq!(ResponseKind::Message.trace_label(), None);
    }
}
