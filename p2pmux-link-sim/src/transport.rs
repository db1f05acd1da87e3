use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

// ---

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;

// ---

use p2pmux_domain::{
    // ---
    OutboundPacket,
    P2pError,
    PacketTransport,
    PeerAddr,
    Result,
    TransportEvent,
    TransportEventRx,
    TransportEventTx,
};

use super::config::LinkSimConfig;

// ---------------------------------------------------------------------------
// SimTransport
// ---------------------------------------------------------------------------

struct Wire {
    // ---
    /// Every packet accepted, in hand-off order.
    sent: Vec<OutboundPacket>,

    /// Accepted packets whose confirmation has not been reported yet.
    unconfirmed: VecDeque<OutboundPacket>,

    rng: StdRng,
}

/// In-process [`PacketTransport`]. Does not use real sockets.
///
/// Accepted packets are recorded so tests can inspect what reached the
/// wire and in which order. Lifecycle and completion are reported on the
/// event receiver returned by [`SimTransport::new`].
pub struct SimTransport {
    // ---
    remote: PeerAddr,
    config: LinkSimConfig,
    open: AtomicBool,
    failing: AtomicBool,
    events: TransportEventTx,
    wire: Mutex<Wire>,
}

// ---

impl SimTransport {
    // ---
    pub fn new(remote: PeerAddr, config: LinkSimConfig) -> (Arc<Self>, TransportEventRx) {
        // ---
        let (events, rx) = mpsc::unbounded_channel();
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let transport = Arc::new(Self {
            remote,
            open: AtomicBool::new(config.open_on_create),
            failing: AtomicBool::new(false),
            config,
            events,
            wire: Mutex::new(Wire {
                sent: Vec::new(),
                unconfirmed: VecDeque::new(),
                rng,
            }),
        });

        (transport, rx)
    }

    // ---

    /// Open the link. Reports [`TransportEvent::Opened`] on the transition.
    pub fn open(&self) {
        if !self.open.swap(true, Ordering::AcqRel) {
            tracing::debug!(remote = %self.remote, "sim transport opened");
            self.emit(TransportEvent::Opened);
        }
    }

    // ---

    /// Close the link. Reports [`TransportEvent::Closed`] on the transition.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            tracing::debug!(remote = %self.remote, "sim transport closed");
            self.emit(TransportEvent::Closed);
        }
    }

    /// Report round-trip reachability.
    pub fn sync(&self, sync_id: u32) {
        self.emit(TransportEvent::Synced(sync_id));
    }

    /// Make every hand-off fail until cleared.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }

    // ---

    /// Confirm the oldest unconfirmed packet. Returns `false` if none.
    pub fn confirm_next(&self) -> bool {
        // ---
        let packet = self.lock_wire().unconfirmed.pop_front();
        match packet {
            Some(packet) => {
                self.confirm(packet);
                true
            }
            None => false,
        }
    }

    /// Confirm every unconfirmed packet. Returns how many were confirmed.
    pub fn confirm_all(&self) -> usize {
        // ---
        let packets: Vec<OutboundPacket> = self.lock_wire().unconfirmed.drain(..).collect();
        let count = packets.len();
        for packet in packets {
            self.confirm(packet);
        }
        count
    }

    // --- inspection

    pub fn sent(&self) -> Vec<OutboundPacket> {
        self.lock_wire().sent.clone()
    }

    pub fn sent_len(&self) -> usize {
        self.lock_wire().sent.len()
    }

    pub fn unconfirmed_len(&self) -> usize {
        self.lock_wire().unconfirmed.len()
    }

    // --- internal

    fn confirm(&self, packet: OutboundPacket) {
        self.emit(TransportEvent::Sent {
            session: packet.session,
            frame: packet.frame,
        });
    }

    fn emit(&self, event: TransportEvent) {
        // Receiver gone means the bridge was dropped; nothing to report to.
        let _ = self.events.send(event);
    }

    fn lock_wire(&self) -> std::sync::MutexGuard<'_, Wire> {
        self.wire.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---

impl PacketTransport for SimTransport {
    // ---
    fn kind(&self) -> &'static str {
        "sim"
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn max_payload_size(&self) -> usize {
        self.config.max_payload_size
    }

    fn remote(&self) -> Option<PeerAddr> {
        Some(self.remote.clone())
    }

    fn send_one_packet(&self, packet: OutboundPacket) -> Result<()> {
        // ---
        if !self.is_open() {
            return Err(P2pError::TransportClosed);
        }
        if self.failing.load(Ordering::Acquire) {
            return Err(P2pError::Transport("simulated hand-off failure".into()));
        }

        let confirm_now = {
            let mut wire = self.lock_wire();
            wire.sent.push(packet.clone());

            let lost = self.config.drop_percent > 0.0 && wire.rng.gen_bool(self.config.drop_percent.min(1.0));
            if !self.config.auto_confirm || lost {
                if lost {
                    tracing::trace!(identifier = packet.frame.identifier, "sim: confirmation dropped");
                }
                wire.unconfirmed.push_back(packet.clone());
                false
            } else {
                true
            }
        };

        if confirm_now {
            self.confirm(packet);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    // ---
    use p2pmux_domain::Frame;

    use super::*;

    fn packet(id: u32) -> OutboundPacket {
        // ---
        let mut frame = Frame::data(7, vec![1, 2, 3]);
        frame.identifier = id;
        OutboundPacket {
            session: None,
            remote: PeerAddr::new("bob@example.com"),
            routing_hint: None,
            frame,
        }
    }

    // ---

    #[tokio::test]
    async fn manual_confirm_holds_completions() {
        // ---
        let (t, mut rx) = SimTransport::new(PeerAddr::new("bob@example.com"), LinkSimConfig::manual_confirm());

        t.send_one_packet(packet(1)).unwrap();
        t.send_one_packet(packet(2)).unwrap();
        assert_eq!(t.sent_len(), 2);
        assert!(rx.try_recv().is_err());

        assert!(t.confirm_next());
        match rx.try_recv() {
            Ok(TransportEvent::Sent { frame, .. }) => assert_eq!(frame.identifier, 1),
            other => panic!("expected Sent, got {other:?}"),
        }
        assert_eq!(t.unconfirmed_len(), 1);
    }

    // ---

    #[tokio::test]
    async fn closed_link_refuses_hand_off() {
        // ---
        let (t, mut rx) = SimTransport::new(PeerAddr::new("bob@example.com"), LinkSimConfig::closed());

        assert!(matches!(t.send_one_packet(packet(1)), Err(P2pError::TransportClosed)));

        t.open();
        t.open();
        assert!(matches!(rx.try_recv(), Ok(TransportEvent::Opened)));
        assert!(rx.try_recv().is_err(), "open is reported once");

        t.send_one_packet(packet(2)).unwrap();
        assert!(matches!(rx.try_recv(), Ok(TransportEvent::Sent { .. })));
    }

    // ---

    #[tokio::test]
    async fn lost_confirmations_can_be_recovered() {
        // ---
        let (t, _rx) = SimTransport::new(PeerAddr::new("bob@example.com"), LinkSimConfig::lossy(1.0, 42));

        for id in 1..=4 {
            t.send_one_packet(packet(id)).unwrap();
        }
        assert_eq!(t.unconfirmed_len(), 4);
        assert_eq!(t.confirm_all(), 4);
        assert_eq!(t.unconfirmed_len(), 0);
    }
}
