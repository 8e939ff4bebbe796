//! Logical queue identifiers.

use core::fmt;

/// The four logical FIFO queues of a transport.
///
/// A2P-REQ and P2A-ACK always exist; P2A-REQ and A2P-ACK only when the
/// transport is configured with the server-initiated (P2A) channel.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueueType {
    /// Client requests, client-written.
    A2pRequest = 0,
    /// Acks for client requests, server-written.
    P2aAck = 1,
    /// Server-initiated requests, server-written.
    P2aRequest = 2,
    /// Acks for server requests, client-written.
    A2pAck = 3,
}

impl QueueType {
    pub fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            0 => QueueType::A2pRequest,
            1 => QueueType::P2aAck,
            2 => QueueType::P2aRequest,
            3 => QueueType::A2pAck,
            _ => return None,
        })
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Position of this queue's region within the transport layout.
    #[inline]
    pub fn index(self) -> usize {
        self as u32 as usize
    }

    /// True for the queues that only exist when the P2A channel is
    /// configured.
    pub fn requires_p2a_channel(self) -> bool {
        matches!(self, QueueType::P2aRequest | QueueType::A2pAck)
    }
}

impl fmt::Display for QueueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueType::A2pRequest => write!(f, "A2P-REQ"),
            QueueType::P2aAck => write!(f, "P2A-ACK"),
            QueueType::P2aRequest => write!(f, "P2A-REQ"),
            QueueType::A2pAck => write!(f, "A2P-ACK"),
        }
    }
}
