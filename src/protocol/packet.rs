//! Decoded protocol frames

use crate::encoding::JsonData;

/// An application message carried by a data frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message<D = JsonData> {
    /// Caller-assigned sequence number, echoed by the server in replies
    pub seq: u32,
    /// Logical endpoint the message is addressed to
    pub route: u32,
    /// Payload as produced by the encoding
    pub data: D,
}

impl<D> Message<D> {
    pub fn new(seq: u32, route: u32, data: D) -> Self {
        Self { seq, route, data }
    }
}

/// A decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet<D = JsonData> {
    /// Keep-alive, optionally carrying the server time in milliseconds
    Heartbeat(Option<i64>),
    /// Application data
    Data(Message<D>),
}

impl<D> Packet<D> {
    pub fn is_heartbeat(&self) -> bool {
        matches!(self, Packet::Heartbeat(_))
    }

    /// The message, if this is a data frame
    pub fn message(&self) -> Option<&Message<D>> {
        match self {
            Packet::Data(message) => Some(message),
            Packet::Heartbeat(_) => None,
        }
    }

    pub fn into_message(self) -> Option<Message<D>> {
        match self {
            Packet::Data(message) => Some(message),
            Packet::Heartbeat(_) => None,
        }
    }
}
