use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

// ---

use p2pmux_domain::{
    // ---
    ChannelId,
    PacketTransportPtr,
    PeerAddr,
    PresenceEvent,
    RelayChannel,
    TransportEventRx,
};

use super::config::LinkSimConfig;
use super::transport::SimTransport;

static CHANNEL_COUNT: AtomicU64 = AtomicU64::new(0);

// ---------------------------------------------------------------------------
// SimRelayChannel
// ---------------------------------------------------------------------------

/// Simulated server-mediated conversation between `local` and one remote.
///
/// Membership changes return the [`PresenceEvent`] a real server would
/// push, so the test decides when the handler observes them.
pub struct SimRelayChannel {
    // ---
    id: ChannelId,
    established: AtomicBool,
    occupants: Mutex<Vec<PeerAddr>>,
    transport: Arc<SimTransport>,
    events: Mutex<Option<TransportEventRx>>,
}

// ---

impl SimRelayChannel {
    // ---
    pub fn new(local: PeerAddr, remote: PeerAddr, config: LinkSimConfig) -> Arc<Self> {
        // ---
        let id = ChannelId(CHANNEL_COUNT.fetch_add(1, Ordering::Relaxed) + 1);
        let (transport, events) = SimTransport::new(remote.clone(), config);

        tracing::debug!(channel = %id, %local, %remote, "sim relay channel created");

        Arc::new(Self {
            id,
            established: AtomicBool::new(true),
            occupants: Mutex::new(vec![local, remote]),
            transport,
            events: Mutex::new(Some(events)),
        })
    }

    // ---

    pub fn sim_transport(&self) -> &Arc<SimTransport> {
        &self.transport
    }

    pub fn set_established(&self, established: bool) {
        self.established.store(established, Ordering::Release);
    }

    // ---

    pub fn join(&self, peer: PeerAddr) -> PresenceEvent {
        // ---
        self.lock_occupants().push(peer.clone());
        PresenceEvent::PeerJoinedChannel {
            channel: self.id,
            peer,
        }
    }

    // ---

    pub fn leave(&self, peer: &PeerAddr) -> PresenceEvent {
        // ---
        self.lock_occupants().retain(|p| p != peer);
        PresenceEvent::PeerLeftChannel {
            channel: self.id,
            peer: peer.clone(),
        }
    }

    // ---

    /// Tear the conversation down and close its transport.
    pub fn close(&self) -> PresenceEvent {
        // ---
        self.set_established(false);
        self.transport.close();
        PresenceEvent::ChannelClosed(self.id)
    }

    fn lock_occupants(&self) -> std::sync::MutexGuard<'_, Vec<PeerAddr>> {
        self.occupants.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---

impl RelayChannel for SimRelayChannel {
    // ---
    fn id(&self) -> ChannelId {
        self.id
    }

    fn is_established(&self) -> bool {
        self.established.load(Ordering::Acquire)
    }

    fn occupants(&self) -> Vec<PeerAddr> {
        self.lock_occupants().clone()
    }

    fn transport(&self) -> PacketTransportPtr {
        self.transport.clone()
    }

    fn take_transport_events(&self) -> Option<TransportEventRx> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}
