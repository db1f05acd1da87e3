use thiserror::Error;

// ---

#[derive(Debug, Error)]
pub enum P2pError {
    // ---
    /// An acknowledgment or inbound frame matched no known session.
    #[error("no session matches correlation id {0}")]
    Correlation(u32),

    /// `send` targeted a session the bridge cannot carry.
    #[error("bridge {bridge} is not suitable for session {session}")]
    TransportUnsuitable { bridge: String, session: String },

    /// No presence link is available to request a relay channel.
    #[error("signaling unavailable: {0}")]
    SignalingUnavailable(String),

    /// The transport is not open.
    #[error("transport closed")]
    TransportClosed,

    #[error("session closed")]
    SessionClosed,

    #[error("transport error: {0}")]
    Transport(String),
}

// ---

pub type Result<T> = std::result::Result<T, P2pError>;
