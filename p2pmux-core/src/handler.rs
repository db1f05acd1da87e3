//! [`P2pHandler`] — session registry and transport selection.
//!
//! The handler owns every [`Session`] keyed by `(local, remote)` account,
//! the bridges built on relay channels announced by the presence server, and
//! an optional default bridge. It keeps each session bound to a bridge that
//! can carry it:
//!
//! - a relay channel with more than the expected occupancy is multi-party;
//!   every session on it is unbound and re-homed
//! - a relay channel at the expected occupancy rebinds invalid sessions for
//!   its peer, migrating their pending traffic in
//! - a peer leaving the channel its session is bound to invalidates the
//!   binding
//! - an invalid session is closed if its peer is offline, rebound if a
//!   suitable channel exists, otherwise a new channel is requested
//! - a peer going offline closes its sessions
//!
//! # Locks
//!
//! The registry and channel tables are only held long enough to clone
//! entries out. A session's route lock may be held while calling into a
//! bridge; a bridge never calls back into a session.

use std::collections::HashMap;
use std::sync::Arc;

// ---

use tokio::sync::{broadcast, mpsc, Mutex};

// ---

use p2pmux_domain::{
    // ---
    ChannelId,
    Frame,
    P2pError,
    PacketTransportPtr,
    PeerAddr,
    PresenceEvent,
    PresenceEventRx,
    PresencePtr,
    RelayChannelPtr,
    Result,
    SessionId,
    SessionState,
    TransportEventRx,
};

// ---

use super::ack::{AckCallback, AckRegistry};
use super::bridge::{Bridge, BridgeEvent, BridgeId, BridgeNotice, BridgeNoticeTx};
use super::config::HandlerConfig;
use super::session::{Detached, PendingSend, Session};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const EVENT_CHANNEL_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// HandlerEvent
// ---------------------------------------------------------------------------

/// Notifications broadcast to [`P2pHandler::subscribe`] receivers.
#[derive(Debug, Clone)]
pub enum HandlerEvent {
    // ---
    SessionCreated(Arc<Session>),
    SessionClosed(Arc<Session>),

    /// A bridge confirmed `frame` sent.
    FrameSent {
        session: Option<SessionId>,
        frame: Frame,
    },
}

// ---------------------------------------------------------------------------
// P2pHandler
// ---------------------------------------------------------------------------

type SessionKey = (String, String);

struct ChannelEntry {
    channel: RelayChannelPtr,
    bridge: Arc<Bridge>,
}

pub struct P2pHandler {
    // ---
    config: HandlerConfig,
    presence: PresencePtr,

    sessions: Mutex<HashMap<SessionKey, Arc<Session>>>,
    channels: Mutex<HashMap<ChannelId, ChannelEntry>>,
    default_bridge: Mutex<Option<Arc<Bridge>>>,

    acks: Arc<AckRegistry>,
    events: broadcast::Sender<HandlerEvent>,

    notice_tx: BridgeNoticeTx,
    notice_rx: Mutex<Option<mpsc::UnboundedReceiver<BridgeNotice>>>,
}

// ---

impl P2pHandler {
    // ---
    pub fn new(config: HandlerConfig, presence: PresencePtr) -> Arc<Self> {
        // ---
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();

        Arc::new(Self {
            config,
            presence,
            sessions: Mutex::new(HashMap::new()),
            channels: Mutex::new(HashMap::new()),
            default_bridge: Mutex::new(None),
            acks: Arc::new(AckRegistry::new()),
            events,
            notice_tx,
            notice_rx: Mutex::new(Some(notice_rx)),
        })
    }

    // ---

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HandlerEvent> {
        self.events.subscribe()
    }

    // ---

    /// Build a bridge on `transport` that reports to this handler, and start
    /// pumping `events` into it.
    pub fn create_bridge(&self, transport: PacketTransportPtr, events: TransportEventRx) -> Arc<Bridge> {
        // ---
        let bridge = Bridge::attached(
            transport,
            self.config.bridge,
            Arc::clone(&self.acks),
            Some(self.notice_tx.clone()),
        );
        bridge.spawn_event_pump(events);
        bridge
    }

    /// Bridge used when no relay channel suits a session.
    pub async fn set_default_bridge(&self, bridge: Arc<Bridge>) {
        tracing::info!(%bridge, "default bridge set");
        *self.default_bridge.lock().await = Some(bridge);
    }

    // -----------------------------------------------------------------------
    // Registry
    // -----------------------------------------------------------------------

    /// Return the session for `(local, remote)`, creating and binding one if
    /// none exists. Concurrent callers for the same pair get the same
    /// session.
    pub async fn get_or_create_session(&self, local: &PeerAddr, remote: &PeerAddr) -> Arc<Session> {
        // ---
        let session = {
            let mut sessions = self.sessions.lock().await;
            let key = Self::key(local, remote);
            if let Some(existing) = sessions.get(&key) {
                return Arc::clone(existing);
            }

            let session = Arc::new(Session::with_random_base(local.clone(), remote.clone()));
            sessions.insert(key, Arc::clone(&session));
            session
        };

        tracing::info!(%session, base = session.local_base(), "session created");
        self.emit(HandlerEvent::SessionCreated(Arc::clone(&session)));

        self.bind_initial(&session).await;
        session
    }

    // ---

    /// Find the session an inbound frame belongs to: by remote identity,
    /// then by remote running sequence. Creates one seeded from the frame's
    /// identifier if nothing matches.
    pub async fn resolve_by_remote_frame(&self, local: &PeerAddr, remote: &PeerAddr, frame: &Frame) -> Arc<Session> {
        // ---
        {
            let sessions = self.sessions.lock().await;
            if let Some(s) = sessions.get(&Self::key(local, remote)) {
                return Arc::clone(s);
            }
            if let Some(s) = sessions
                .values()
                .find(|s| s.remote_established() && s.remote_identifier() == frame.identifier)
            {
                return Arc::clone(s);
            }
        }

        tracing::debug!(%remote, identifier = frame.identifier, "inbound frame opens a new session");
        let session = self.get_or_create_session(local, remote).await;
        session.establish_remote(frame.identifier);
        session
    }

    // ---

    /// Complete the handshake of a locally initiated session from its first
    /// acknowledgment, matched by correlation id.
    pub async fn bind_acked_session(&self, frame: &Frame) -> Result<Arc<Session>> {
        // ---
        let correlation = frame.ack_session_id;
        let found = {
            let sessions = self.sessions.lock().await;
            sessions
                .values()
                .find(|s| {
                    !s.remote_established()
                        && correlation != 0
                        && (s.local_base() == correlation || s.local_identifier() == correlation)
                })
                .cloned()
        };

        let Some(session) = found else {
            tracing::warn!(correlation, "acknowledgment matches no pending session");
            return Err(P2pError::Correlation(correlation));
        };

        session.establish_remote(frame.identifier);
        tracing::info!(%session, remote_base = session.remote_base(), "session handshake acknowledged");
        Ok(session)
    }

    // ---

    /// Abort `session`, drop its traffic and acknowledgment callbacks, and
    /// remove it from the registry. Closing a closed session is a no-op.
    pub async fn close_session(&self, session: &Arc<Session>) {
        // ---
        if session.state() == SessionState::Closed {
            tracing::debug!(session = %session.id(), "session already closed");
            return;
        }

        session.transition(SessionState::Aborted);

        // A send already holding the route finishes first; its callback is
        // then discarded with the rest.
        let dropped_acks = {
            let mut route = session.route.lock().await;
            if let Some(bridge) = route.bridge.take() {
                bridge.migrate_queue(session, None).await;
            }
            route.detached = Detached::default();
            self.acks.discard_session(session.id())
        };

        let first = session.transition(SessionState::Closed);

        {
            let mut sessions = self.sessions.lock().await;
            let key = Self::key(session.local(), session.remote());
            if sessions.get(&key).is_some_and(|s| Arc::ptr_eq(s, session)) {
                sessions.remove(&key);
            }
        }

        if first {
            tracing::info!(session = %session.id(), dropped_acks, "session closed");
            self.emit(HandlerEvent::SessionClosed(Arc::clone(session)));
        }
    }

    // ---

    /// Close every session. Used on shutdown.
    pub async fn clear_all(&self) {
        // ---
        let sessions = self.sessions_snapshot().await;
        tracing::info!(count = sessions.len(), "closing all sessions");
        for session in &sessions {
            self.close_session(session).await;
        }
    }

    // ---

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn find_session(&self, local: &PeerAddr, remote: &PeerAddr) -> Option<Arc<Session>> {
        self.sessions.lock().await.get(&Self::key(local, remote)).cloned()
    }

    // -----------------------------------------------------------------------
    // Traffic
    // -----------------------------------------------------------------------

    /// Send `frame` on `session`. With no bridge bound the frame is parked
    /// and replayed on the next bind.
    pub async fn send(&self, session: &Session, frame: Frame, ack: Option<AckCallback>) -> Result<()> {
        // ---
        if !session.is_active() {
            return Err(P2pError::SessionClosed);
        }

        let routing_hint = session.remote().endpoint;
        let mut route = session.route.lock().await;
        if !session.is_active() {
            return Err(P2pError::SessionClosed);
        }

        match route.bridge.clone() {
            Some(bridge) => {
                bridge
                    .send(Some(session), session.remote(), routing_hint, frame, ack)
                    .await
            }
            None => {
                route.detached.unsent.push_back(PendingSend {
                    routing_hint,
                    frame,
                    ack,
                });
                tracing::debug!(
                    session = %session.id(),
                    parked = route.detached.len(),
                    "no bridge, send parked",
                );
                Ok(())
            }
        }
    }

    // ---

    /// Register `callback` to fire when the acknowledgment for `frame`
    /// arrives.
    pub fn register_ack_handler(&self, session: &Session, frame: &Frame, callback: AckCallback) {
        // ---
        let key = frame.ack_key(self.config.bridge.sequence_policy);
        self.acks.register(Some(session.id()), key, callback);
    }

    // ---

    /// Route an inbound frame. Acks complete their registered callback and
    /// may finish a pending handshake; anything else resolves (or opens) a
    /// session. Returns the session the frame belongs to, if any.
    pub async fn handle_inbound(&self, local: &PeerAddr, remote: &PeerAddr, frame: &Frame) -> Option<Arc<Session>> {
        // ---
        if !frame.is_ack() {
            let session = self.resolve_by_remote_frame(local, remote, frame).await;
            session.observe_remote_identifier(frame.identifier);
            return Some(session);
        }

        let completed = self.acks.complete(frame);

        if let Some(session) = self
            .find_session(local, remote)
            .await
            .filter(|s| s.remote_established())
        {
            if !completed {
                tracing::debug!(session = %session.id(), ack = frame.ack_identifier, "unknown or duplicate ack ignored");
            }
            session.observe_remote_identifier(frame.identifier);
            return Some(session);
        }

        // Failure is already logged.
        self.bind_acked_session(frame).await.ok()
    }

    // -----------------------------------------------------------------------
    // Event dispatch
    // -----------------------------------------------------------------------

    /// Dispatch presence events and bridge notices until the presence
    /// stream ends, then close every session.
    pub async fn run(self: Arc<Self>, mut presence_events: PresenceEventRx) {
        // ---
        let Some(mut notices) = self.notice_rx.lock().await.take() else {
            tracing::warn!("handler already running");
            return;
        };

        tracing::info!("handler running");

        loop {
            tokio::select! {
                event = presence_events.recv() => match event {
                    Some(event) => self.handle_presence_event(event).await,
                    None => break,
                },
                Some(notice) = notices.recv() => self.handle_bridge_notice(notice).await,
            }
        }

        self.clear_all().await;
        tracing::info!("handler stopped");
    }

    // ---

    /// Handle every bridge notice queued so far, including any raised while
    /// handling. For callers driving the handler without [`Self::run`].
    pub async fn process_bridge_notices(&self) -> usize {
        // ---
        let mut handled = 0;
        loop {
            let batch: Vec<BridgeNotice> = {
                let mut guard = self.notice_rx.lock().await;
                let Some(rx) = guard.as_mut() else {
                    return handled;
                };
                std::iter::from_fn(|| rx.try_recv().ok()).collect()
            };

            if batch.is_empty() {
                return handled;
            }
            for notice in batch {
                self.handle_bridge_notice(notice).await;
                handled += 1;
            }
        }
    }

    // ---

    pub async fn handle_presence_event(&self, event: PresenceEvent) {
        // ---
        tracing::debug!(?event, "presence event");

        match event {
            PresenceEvent::RelayChannelAvailable(channel) => self.on_channel_available(channel).await,
            PresenceEvent::PeerJoinedChannel { channel, peer } => self.on_peer_joined(channel, &peer).await,
            PresenceEvent::PeerLeftChannel { channel, peer } => self.on_peer_left(channel, &peer).await,
            PresenceEvent::ChannelClosed(id) => {
                let entry = self.channels.lock().await.remove(&id);
                if let Some(entry) = entry {
                    tracing::info!(channel = %id, bridge = %entry.bridge, "relay channel closed");
                    self.on_bridge_closed(entry.bridge.id()).await;
                    entry.bridge.dispose().await;
                }
            }
            PresenceEvent::PeerWentOffline(peer) => {
                for session in self.sessions_snapshot().await {
                    if session.remote().is_sibling(&peer) {
                        tracing::info!(session = %session.id(), %peer, "peer went offline");
                        self.close_session(&session).await;
                    }
                }
            }
        }
    }

    // ---

    async fn handle_bridge_notice(&self, notice: BridgeNotice) {
        // ---
        let BridgeNotice { bridge: id, event } = notice;

        match event {
            BridgeEvent::Opened => {
                if let Some((channel, bridge)) = self.bridge_by_id(id).await {
                    if channel.map_or(true, |c| self.channel_suitable(&c)) {
                        self.rebind_invalid_sessions(&bridge, None).await;
                    }
                }
            }
            BridgeEvent::Synced(sync_id) => {
                tracing::debug!(bridge = id, sync_id, "bridge synced");
            }
            BridgeEvent::Closed => {
                let bridge = self.bridge_by_id(id).await.map(|(_, b)| b);
                self.channels.lock().await.retain(|_, e| e.bridge.id() != id);
                {
                    let mut default = self.default_bridge.lock().await;
                    if default.as_ref().is_some_and(|b| b.id() == id) {
                        *default = None;
                    }
                }
                self.on_bridge_closed(id).await;
                if let Some(bridge) = bridge {
                    bridge.dispose().await;
                }
            }
            BridgeEvent::Sent { session, frame } => {
                self.emit(HandlerEvent::FrameSent { session, frame });
            }
            BridgeEvent::SendFailed { session } => {
                let Some(session) = self.session_by_id(session).await else {
                    return;
                };
                if session.bridge().await.is_some_and(|b| b.id() == id) {
                    tracing::warn!(session = %session.id(), bridge = id, "send failed, moving session");
                    self.unbind(&session).await;
                    self.on_transport_invalid(&session, Some(id)).await;
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Transport selection
    // -----------------------------------------------------------------------

    async fn on_channel_available(&self, channel: RelayChannelPtr) {
        // ---
        let Some(events) = channel.take_transport_events() else {
            tracing::warn!(channel = %channel.id(), "relay channel events already claimed");
            return;
        };

        let bridge = self.create_bridge(channel.transport(), events);
        tracing::info!(channel = %channel.id(), %bridge, "relay channel available");

        self.channels.lock().await.insert(
            channel.id(),
            ChannelEntry {
                channel: Arc::clone(&channel),
                bridge: Arc::clone(&bridge),
            },
        );

        if self.channel_suitable(&channel) {
            self.rebind_invalid_sessions(&bridge, None).await;
        }
    }

    // ---

    async fn on_peer_joined(&self, id: ChannelId, peer: &PeerAddr) {
        // ---
        let Some((channel, bridge)) = self.channel_entry(id).await else {
            tracing::debug!(channel = %id, "join on unknown channel");
            return;
        };

        let occupancy = channel.occupants().len();
        tracing::debug!(channel = %id, %peer, occupancy, "peer joined channel");

        if occupancy > self.config.expected_occupancy {
            tracing::warn!(channel = %id, occupancy, "relay channel is multi-party, unbinding its sessions");
            let bound = self.sessions_on(bridge.id()).await;
            for session in &bound {
                self.unbind(session).await;
            }
            for session in &bound {
                self.on_transport_invalid(session, Some(bridge.id())).await;
            }
        } else if self.channel_suitable(&channel) {
            self.rebind_invalid_sessions(&bridge, Some(peer)).await;
        }
    }

    // ---

    async fn on_peer_left(&self, id: ChannelId, peer: &PeerAddr) {
        // ---
        let Some((channel, bridge)) = self.channel_entry(id).await else {
            tracing::debug!(channel = %id, "leave on unknown channel");
            return;
        };

        tracing::debug!(channel = %id, %peer, occupancy = channel.occupants().len(), "peer left channel");

        for session in self.sessions_on(bridge.id()).await {
            if session.remote().is_sibling(peer) {
                self.unbind(&session).await;
                self.on_transport_invalid(&session, Some(bridge.id())).await;
            }
        }

        // Back to a two-party conversation.
        if self.channel_suitable(&channel) {
            self.rebind_invalid_sessions(&bridge, None).await;
        }
    }

    // ---

    async fn on_bridge_closed(&self, id: BridgeId) {
        // ---
        for session in self.sessions_on(id).await {
            self.unbind(&session).await;
            self.on_transport_invalid(&session, Some(id)).await;
        }
    }

    // ---

    /// Closed if the peer is offline; otherwise rebound to a suitable
    /// bridge other than `exclude`, or a new relay channel is requested.
    async fn on_transport_invalid(&self, session: &Arc<Session>, exclude: Option<BridgeId>) {
        // ---
        if !session.is_active() {
            return;
        }

        if !self.presence.is_contact_online(session.remote()).await {
            tracing::info!(session = %session.id(), "transport invalid and peer offline, closing");
            self.close_session(session).await;
            return;
        }

        match self.find_bridge_for(session, exclude).await {
            Some(bridge) => {
                if let Err(e) = self.bind(session, &bridge).await {
                    tracing::warn!(session = %session.id(), %bridge, "rebind failed: {e}");
                }
            }
            None => self.request_channel(session).await,
        }
    }

    // ---

    async fn bind_initial(&self, session: &Arc<Session>) {
        // ---
        match self.find_bridge_for(session, None).await {
            Some(bridge) => {
                if let Err(e) = self.bind(session, &bridge).await {
                    tracing::warn!(session = %session.id(), %bridge, "initial bind failed: {e}");
                }
            }
            None => self.request_channel(session).await,
        }
    }

    // ---

    async fn request_channel(&self, session: &Session) {
        // ---
        match self.presence.request_relay_channel(session.remote()).await {
            Ok(()) => {
                tracing::debug!(session = %session.id(), "relay channel requested");
            }
            Err(e) => {
                tracing::warn!(session = %session.id(), "{e}; session stays unbound");
            }
        }
    }

    // ---

    /// Bind unbound or invalid sessions that `bridge` can carry, optionally
    /// only those for `peer`.
    async fn rebind_invalid_sessions(&self, bridge: &Arc<Bridge>, peer: Option<&PeerAddr>) {
        // ---
        for session in self.sessions_snapshot().await {
            if peer.is_some_and(|p| !session.remote().is_sibling(p)) {
                continue;
            }
            if !session.is_active() || !bridge.suitable_for(&session) || session.has_valid_bridge().await {
                continue;
            }
            if !bridge.is_open() {
                tracing::debug!(session = %session.id(), %bridge, "bridge not open yet, binding deferred");
                continue;
            }
            if let Err(e) = self.bind(&session, bridge).await {
                tracing::warn!(session = %session.id(), %bridge, "bind failed: {e}");
            }
        }
    }

    // ---

    /// First open bridge that can carry `session`: a two-party relay
    /// channel, then the default bridge.
    async fn find_bridge_for(&self, session: &Session, exclude: Option<BridgeId>) -> Option<Arc<Bridge>> {
        // ---
        let candidates: Vec<(RelayChannelPtr, Arc<Bridge>)> = self
            .channels
            .lock()
            .await
            .values()
            .map(|e| (Arc::clone(&e.channel), Arc::clone(&e.bridge)))
            .collect();

        let usable = |bridge: &Arc<Bridge>| {
            exclude != Some(bridge.id()) && bridge.is_open() && bridge.suitable_for(session)
        };

        if let Some((_, bridge)) = candidates
            .into_iter()
            .find(|(channel, bridge)| self.channel_suitable(channel) && usable(bridge))
        {
            return Some(bridge);
        }

        self.default_bridge.lock().await.clone().filter(|b| usable(b))
    }

    // ---

    /// Attach `session` to `bridge`, moving over whatever it had queued on
    /// its previous bridge, then replaying detached traffic. The bridge must
    /// be open.
    async fn bind(&self, session: &Session, bridge: &Arc<Bridge>) -> Result<()> {
        // ---
        if !session.is_active() {
            return Err(P2pError::SessionClosed);
        }
        if !bridge.suitable_for(session) {
            return Err(P2pError::TransportUnsuitable {
                bridge: bridge.to_string(),
                session: session.id().to_string(),
            });
        }
        if !bridge.is_open() {
            return Err(P2pError::TransportClosed);
        }

        let mut route = session.route.lock().await;
        if !session.is_active() {
            return Err(P2pError::SessionClosed);
        }
        if route.bridge.as_ref().is_some_and(|b| Arc::ptr_eq(b, bridge)) {
            return Ok(());
        }

        if let Some(old) = route.bridge.take() {
            old.migrate_queue(session, Some(bridge)).await;
        }

        let recovered = std::mem::take(&mut route.detached.queue);
        if !recovered.is_empty() {
            bridge.add_queue(session, recovered).await;
        }

        route.bridge = Some(Arc::clone(bridge));
        tracing::info!(session = %session.id(), %bridge, "session bound");

        let unsent = std::mem::take(&mut route.detached.unsent);
        for pending in unsent {
            bridge
                .send(
                    Some(session),
                    session.remote(),
                    pending.routing_hint,
                    pending.frame,
                    pending.ack,
                )
                .await?;
        }
        Ok(())
    }

    // ---

    /// Detach `session` from its bridge, keeping its pending traffic on the
    /// session.
    async fn unbind(&self, session: &Session) -> Option<Arc<Bridge>> {
        // ---
        let mut route = session.route.lock().await;
        let bridge = route.bridge.take()?;

        let mut taken = bridge.take_queue(session).await;
        route.detached.queue.append(&mut taken);

        tracing::info!(
            session = %session.id(),
            %bridge,
            parked = route.detached.len(),
            "session unbound",
        );
        Some(bridge)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn key(local: &PeerAddr, remote: &PeerAddr) -> SessionKey {
        (local.account_key(), remote.account_key())
    }

    fn channel_suitable(&self, channel: &RelayChannelPtr) -> bool {
        channel.is_established() && channel.occupants().len() == self.config.expected_occupancy
    }

    fn emit(&self, event: HandlerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    async fn sessions_snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions.lock().await.values().cloned().collect()
    }

    async fn session_by_id(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.lock().await.values().find(|s| s.id() == id).cloned()
    }

    async fn sessions_on(&self, bridge: BridgeId) -> Vec<Arc<Session>> {
        // ---
        let mut bound = Vec::new();
        for session in self.sessions_snapshot().await {
            if session.bridge().await.is_some_and(|b| b.id() == bridge) {
                bound.push(session);
            }
        }
        bound
    }

    async fn channel_entry(&self, id: ChannelId) -> Option<(RelayChannelPtr, Arc<Bridge>)> {
        self.channels
            .lock()
            .await
            .get(&id)
            .map(|e| (Arc::clone(&e.channel), Arc::clone(&e.bridge)))
    }

    /// The bridge with `id` and the relay channel it runs on, if any.
    async fn bridge_by_id(&self, id: BridgeId) -> Option<(Option<RelayChannelPtr>, Arc<Bridge>)> {
        // ---
        let on_channel = self
            .channels
            .lock()
            .await
            .values()
            .find(|e| e.bridge.id() == id)
            .map(|e| (Some(Arc::clone(&e.channel)), Arc::clone(&e.bridge)));
        if on_channel.is_some() {
            return on_channel;
        }

        self.default_bridge
            .lock()
            .await
            .clone()
            .filter(|b| b.id() == id)
            .map(|b| (None, b))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
