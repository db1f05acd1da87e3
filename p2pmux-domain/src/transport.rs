use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use super::error::Result;
use super::frame::Frame;
use super::peer::PeerAddr;
use super::session::SessionId;

// ---------------------------------------------------------------------------
// OutboundPacket
// ---------------------------------------------------------------------------

/// One physical frame handed to a transport.
#[derive(Debug, Clone)]
pub struct OutboundPacket {
    // ---
    /// Session the frame was queued for. `None` for unqueued control frames.
    pub session: Option<SessionId>,

    pub remote: PeerAddr,

    /// Endpoint of `remote` the frame should be delivered to, if any.
    pub routing_hint: Option<Uuid>,

    pub frame: Frame,
}

// ---------------------------------------------------------------------------
// TransportEvent
// ---------------------------------------------------------------------------

/// Completion and lifecycle events reported by a transport.
///
/// Delivered over an unbounded channel so a transport never blocks on the
/// bridge that consumes them.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    // ---
    /// The transport became usable.
    Opened,

    /// Round-trip reachability confirmed with the given sync id.
    Synced(u32),

    /// `frame` left the wire for `session`.
    Sent {
        session: Option<SessionId>,
        frame: Frame,
    },

    /// The transport closed. Terminal.
    Closed,
}

pub type TransportEventTx = mpsc::UnboundedSender<TransportEvent>;
pub type TransportEventRx = mpsc::UnboundedReceiver<TransportEvent>;

// ---------------------------------------------------------------------------
// PacketTransport
// ---------------------------------------------------------------------------

/// Capability set every physical carrier provides to a bridge.
///
/// The bridge's queueing, sequencing and migration logic is written once
/// against this trait; relay channels, direct connections and the link
/// simulator each implement it.
pub trait PacketTransport: Send + Sync {
    // ---
    /// Short name used in logs and in the bridge's display form.
    fn kind(&self) -> &'static str;

    fn is_open(&self) -> bool;

    /// Largest payload a single physical frame may carry.
    fn max_payload_size(&self) -> usize;

    /// The peer at the far end, once known.
    fn remote(&self) -> Option<PeerAddr>;

    /// Hand one frame to the wire.
    ///
    /// Must not block. Completion is reported later as
    /// [`TransportEvent::Sent`]; an `Err` here means the hand-off itself
    /// failed and the frame was not accepted.
    fn send_one_packet(&self, packet: OutboundPacket) -> Result<()>;
}

/// Convenience type alias for a shared [`PacketTransport`].
pub type PacketTransportPtr = Arc<dyn PacketTransport>;
