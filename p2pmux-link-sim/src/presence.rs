use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

// ---

use async_trait::async_trait;
use tokio::sync::mpsc;

// ---

use p2pmux_domain::{
    // ---
    P2pError,
    PeerAddr,
    Presence,
    PresenceEvent,
    PresenceEventRx,
    PresenceEventTx,
    RelayChannelPtr,
    Result,
};

use super::channel::SimRelayChannel;
use super::config::LinkSimConfig;

// ---------------------------------------------------------------------------
// SimPresence
// ---------------------------------------------------------------------------

/// Simulated presence server for one local user.
///
/// Tracks which contacts are online, whether signaling is up, and every
/// relay-channel request made. With auto channels on, each request is
/// answered with a fresh [`SimRelayChannel`] pushed as
/// [`PresenceEvent::RelayChannelAvailable`].
pub struct SimPresence {
    // ---
    local: PeerAddr,
    config: LinkSimConfig,
    online: Mutex<HashSet<String>>,
    signaling_up: AtomicBool,
    auto_channels: AtomicBool,
    requests: Mutex<Vec<PeerAddr>>,
    channels: Mutex<Vec<Arc<SimRelayChannel>>>,
    events: PresenceEventTx,
}

// ---

impl SimPresence {
    // ---
    /// `config` applies to every channel this presence creates.
    pub fn new(local: PeerAddr, config: LinkSimConfig) -> (Arc<Self>, PresenceEventRx) {
        // ---
        let (events, rx) = mpsc::unbounded_channel();
        let presence = Arc::new(Self {
            local,
            config,
            online: Mutex::new(HashSet::new()),
            signaling_up: AtomicBool::new(true),
            auto_channels: AtomicBool::new(false),
            requests: Mutex::new(Vec::new()),
            channels: Mutex::new(Vec::new()),
            events,
        });
        (presence, rx)
    }

    // ---

    /// Mark `peer` online or offline. Going offline is announced.
    pub fn set_online(&self, peer: &PeerAddr, online: bool) {
        // ---
        let changed = {
            let mut set = self.online.lock().unwrap_or_else(PoisonError::into_inner);
            if online {
                set.insert(peer.account_key())
            } else {
                set.remove(&peer.account_key())
            }
        };

        if changed && !online {
            self.emit(PresenceEvent::PeerWentOffline(peer.clone()));
        }
    }

    pub fn set_signaling(&self, up: bool) {
        self.signaling_up.store(up, Ordering::Release);
    }

    pub fn set_auto_channels(&self, on: bool) {
        self.auto_channels.store(on, Ordering::Release);
    }

    // ---

    /// Create a channel with `remote` and announce it.
    pub fn offer_channel(&self, remote: &PeerAddr) -> Arc<SimRelayChannel> {
        // ---
        let channel = SimRelayChannel::new(self.local.clone(), remote.clone(), self.config.clone());
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&channel));

        let ptr: RelayChannelPtr = channel.clone();
        self.emit(PresenceEvent::RelayChannelAvailable(ptr));
        channel
    }

    /// Push an event as if the server sent it.
    pub fn emit(&self, event: PresenceEvent) {
        // Receiver gone means the handler stopped; nothing to deliver to.
        let _ = self.events.send(event);
    }

    // --- inspection

    pub fn requests(&self) -> Vec<PeerAddr> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn channels(&self) -> Vec<Arc<SimRelayChannel>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

// ---

#[async_trait]
impl Presence for SimPresence {
    // ---
    async fn is_contact_online(&self, peer: &PeerAddr) -> bool {
        self.online
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&peer.account_key())
    }

    async fn request_relay_channel(&self, peer: &PeerAddr) -> Result<()> {
        // ---
        if !self.signaling_up.load(Ordering::Acquire) {
            return Err(P2pError::SignalingUnavailable(format!(
                "no signaling link to request a channel with {peer}"
            )));
        }

        tracing::debug!(%peer, "sim: relay channel requested");
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(peer.clone());

        if self.auto_channels.load(Ordering::Acquire) {
            self.offer_channel(peer);
        }
        Ok(())
    }
}
