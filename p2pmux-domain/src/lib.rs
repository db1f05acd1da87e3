//! Core traits and types for the p2pmux session multiplexer.
//!
//! This crate defines the vocabulary of the system. All other crates depend
//! on `p2pmux-domain` and speak its types. No queueing or registry logic
//! lives here.
//!
//! # Structure
//!
//! - `error`       — [`P2pError`] and [`Result<T>`] alias
//! - `peer`        — [`PeerAddr`] (account + endpoint routing hint)
//! - `frame`       — [`Frame`], [`FrameKey`], splitting
//! - `sequence`    — [`SequencePolicy`] (count-based vs size-based numbering)
//! - `session`     — [`SessionId`], [`SessionState`]
//! - `transport`   — [`PacketTransport`] trait and [`TransportEvent`]
//! - `presence`    — [`RelayChannel`], [`Presence`] traits and [`PresenceEvent`]

mod error;
mod frame;
mod peer;
mod presence;
mod sequence;
mod session;
mod transport;

// --- error
pub use error::{P2pError, Result};

// --- frame
pub use frame::{Frame, FrameFlags, FrameKey};

// --- peer
pub use peer::PeerAddr;

// --- presence
pub use presence::{
    // ---
    ChannelId,
    Presence,
    PresenceEvent,
    PresenceEventRx,
    PresenceEventTx,
    PresencePtr,
    RelayChannel,
    RelayChannelPtr,
};

// --- sequence
pub use sequence::SequencePolicy;

// --- session
pub use session::{SessionId, SessionState};

// --- transport
pub use transport::{
    // ---
    OutboundPacket,
    PacketTransport,
    PacketTransportPtr,
    TransportEvent,
    TransportEventRx,
    TransportEventTx,
};
