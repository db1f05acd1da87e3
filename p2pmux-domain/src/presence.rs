use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::error::Result;
use super::peer::PeerAddr;
use super::transport::{PacketTransportPtr, TransportEventRx};

// ---------------------------------------------------------------------------
// ChannelId
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// RelayChannel
// ---------------------------------------------------------------------------

/// A server-mediated conversation that can ferry session traffic.
pub trait RelayChannel: Send + Sync {
    // ---
    fn id(&self) -> ChannelId;

    /// `true` once the server has admitted us to the conversation.
    fn is_established(&self) -> bool;

    /// Everyone currently in the conversation, the local user included.
    fn occupants(&self) -> Vec<PeerAddr>;

    /// Carrier a bridge can be built on.
    fn transport(&self) -> PacketTransportPtr;

    /// Event stream for [`RelayChannel::transport`]. Yields `Some` exactly
    /// once; the bridge built on this channel owns the receiver.
    fn take_transport_events(&self) -> Option<TransportEventRx>;
}

/// Convenience type alias for a shared [`RelayChannel`].
pub type RelayChannelPtr = Arc<dyn RelayChannel>;

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

/// The presence/signaling link, consumed at its interface boundary.
#[async_trait]
pub trait Presence: Send + Sync {
    // ---
    async fn is_contact_online(&self, peer: &PeerAddr) -> bool;

    /// Ask the server for a new relay channel with `peer` invited.
    ///
    /// Completes once the request is on its way; the channel itself arrives
    /// later as [`PresenceEvent::RelayChannelAvailable`]. Fails with
    /// [`crate::P2pError::SignalingUnavailable`] when there is no link.
    async fn request_relay_channel(&self, peer: &PeerAddr) -> Result<()>;
}

/// Convenience type alias for a shared [`Presence`].
pub type PresencePtr = Arc<dyn Presence>;

// ---------------------------------------------------------------------------
// PresenceEvent
// ---------------------------------------------------------------------------

/// Relay-channel lifecycle and contact status changes.
#[derive(Clone)]
pub enum PresenceEvent {
    // ---
    RelayChannelAvailable(RelayChannelPtr),

    /// `peer` joined; `channel` occupancy already reflects the change.
    PeerJoinedChannel { channel: ChannelId, peer: PeerAddr },

    /// `peer` left; `channel` occupancy already reflects the change.
    PeerLeftChannel { channel: ChannelId, peer: PeerAddr },

    ChannelClosed(ChannelId),

    PeerWentOffline(PeerAddr),
}

pub type PresenceEventTx = mpsc::UnboundedSender<PresenceEvent>;
pub type PresenceEventRx = mpsc::UnboundedReceiver<PresenceEvent>;

// ---

impl fmt::Debug for PresenceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // ---
        match self {
            PresenceEvent::RelayChannelAvailable(ch) => {
                f.debug_tuple("RelayChannelAvailable").field(&ch.id()).finish()
            }
            PresenceEvent::PeerJoinedChannel { channel, peer } => f
                .debug_struct("PeerJoinedChannel")
                .field("channel", channel)
                .field("peer", peer)
                .finish(),
            PresenceEvent::PeerLeftChannel { channel, peer } => f
                .debug_struct("PeerLeftChannel")
                .field("channel", channel)
                .field("peer", peer)
                .finish(),
            PresenceEvent::ChannelClosed(id) => f.debug_tuple("ChannelClosed").field(id).finish(),
            PresenceEvent::PeerWentOffline(peer) => {
                f.debug_tuple("PeerWentOffline").field(peer).finish()
            }
        }
    }
}
