use std::net::SocketAddr;

#[derive(Debug, Clone)]
pub enum SessionEvent {
    PeerConnected {
        slot: usize,
        addr: SocketAddr,
        name: String,
    },
    PeerDisconnected {
        slot: usize,
        reason: DisconnectReason,
    },
    ConnectionDenied {
        addr: SocketAddr,
        reason: String,
    },
    /// The server accepted this client into `slot`.
    Joined {
        slot: usize,
    },
    Left {
        reason: DisconnectReason,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    Graceful,
    Timeout,
    Dropped,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::Graceful => "disconnected",
            DisconnectReason::Timeout => "timed out",
            DisconnectReason::Dropped => "dropped by server",
        }
    }
}
