//! [`Bridge`] — one physical transport carrying traffic for many sessions.
//!
//! # Queues
//!
//! Each session using the bridge gets a *lane*: a [`SendQueue`] of items
//! waiting for the transport, a [`SendingQueue`] of items handed over but
//! not yet confirmed, and a suspension flag. Every lane has its own lock, so
//! draining one session never waits on another.
//!
//! ```text
//! send() ──► SendQueue ──drain──► SendingQueue ──Sent event──► (removed)
//!                          │
//!                          └── PacketTransport::send_one_packet
//! ```
//!
//! # Draining
//!
//! Runs after every enqueue, resume, open, sent confirmation and incoming
//! migration. For each lane: while [`Bridge::ready`] holds, move the head of
//! the send queue into the sending queue and hand it to the transport.
//!
//! # Migration
//!
//! [`Bridge::migrate_queue`] moves a lane's sending queue followed by its send
//! queue onto another bridge, holding both lane locks (taken in bridge-id
//! order) so neither side can drain a half-moved lane.
//!
//! A lane that was migrated, taken or disposed is marked *retired* under its
//! lock and removed from the lane table. A writer that locks a retired lane
//! looks the session up again and writes to the live lane instead.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

// ---

use rand::Rng;
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use uuid::Uuid;

// ---

use p2pmux_domain::{
    // ---
    Frame,
    OutboundPacket,
    P2pError,
    PacketTransportPtr,
    PeerAddr,
    Result,
    SequencePolicy,
    SessionId,
    TransportEvent,
    TransportEventRx,
};

// ---

use super::ack::{AckCallback, AckRegistry};
use super::config::BridgeConfig;
use super::queue::{SendItem, SendQueue, SendingQueue};
use super::session::Session;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Range the local sequence counter of a new bridge starts in.
const TRACKER_START_MIN: u32 = 5_000;
const TRACKER_START_MAX: u32 = i32::MAX as u32;

/// Range correlation ids are drawn from under count-based numbering.
const CORRELATION_MIN: u32 = 50_000;
const CORRELATION_MAX: u32 = i32::MAX as u32;

static BRIDGE_COUNT: AtomicU32 = AtomicU32::new(0);

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

pub type BridgeId = u32;

/// Lifecycle and progress events a bridge reports to its observer.
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    // ---
    Opened,

    /// The transport confirmed round-trip reachability.
    Synced(u32),

    Closed,

    /// `frame` was confirmed sent and removed from the sending queue.
    Sent {
        session: Option<SessionId>,
        frame: Frame,
    },

    /// The transport refused a frame for `session`; the frame is back at
    /// the head of the session's send queue.
    SendFailed { session: SessionId },
}

#[derive(Debug, Clone)]
pub struct BridgeNotice {
    pub bridge: BridgeId,
    pub event: BridgeEvent,
}

pub type BridgeNoticeTx = mpsc::UnboundedSender<BridgeNotice>;

// ---------------------------------------------------------------------------
// Lane
// ---------------------------------------------------------------------------

struct Lane {
    // ---
    session: SessionId,
    remote: PeerAddr,
    queue: SendQueue,

    /// `None` until the session's first hand-off on this bridge.
    sending: Option<SendingQueue>,

    stopped: bool,

    /// Set once the lane's traffic has moved elsewhere or been dropped.
    retired: bool,
}

impl Lane {
    fn new(session: &Session) -> Self {
        Self {
            session: session.id(),
            remote: session.remote().clone(),
            queue: SendQueue::new(),
            sending: None,
            stopped: false,
            retired: false,
        }
    }

    fn in_flight(&self) -> usize {
        self.sending.as_ref().map_or(0, SendingQueue::len)
    }
}

type LanePtr = Arc<Mutex<Lane>>;

// ---------------------------------------------------------------------------
// Bridge
// ---------------------------------------------------------------------------

pub struct Bridge {
    // ---
    id: BridgeId,
    transport: PacketTransportPtr,
    config: BridgeConfig,

    /// Local sequence counter. Only ever moves forward.
    tracker: StdMutex<u32>,

    /// Non-zero once the transport confirmed reachability.
    sync_id: AtomicU32,

    lanes: Mutex<HashMap<SessionId, LanePtr>>,
    acks: Arc<AckRegistry>,
    notices: Option<BridgeNoticeTx>,
}

// ---

impl Bridge {
    // ---
    /// Standalone bridge with a private ack registry and no observer.
    pub fn new(transport: PacketTransportPtr, config: BridgeConfig) -> Arc<Self> {
        Self::attached(transport, config, Arc::new(AckRegistry::new()), None)
    }

    // ---

    /// Bridge that registers acks in `acks` and reports to `notices`.
    pub fn attached(
        transport: PacketTransportPtr,
        config: BridgeConfig,
        acks: Arc<AckRegistry>,
        notices: Option<BridgeNoticeTx>,
    ) -> Arc<Self> {
        // ---
        let id = BRIDGE_COUNT.fetch_add(1, Ordering::Relaxed) + 1;
        let tracker = rand::thread_rng().gen_range(TRACKER_START_MIN..TRACKER_START_MAX);

        let bridge = Arc::new(Self {
            id,
            transport,
            config,
            tracker: StdMutex::new(tracker),
            sync_id: AtomicU32::new(0),
            lanes: Mutex::new(HashMap::new()),
            acks,
            notices,
        });

        tracing::debug!(bridge = %bridge, ?config, "bridge created");
        bridge
    }

    // --- transport properties

    pub fn id(&self) -> BridgeId {
        self.id
    }

    pub fn config(&self) -> BridgeConfig {
        self.config
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    pub fn max_payload_size(&self) -> usize {
        self.transport.max_payload_size()
    }

    pub fn remote(&self) -> Option<PeerAddr> {
        self.transport.remote()
    }

    pub fn sync_id(&self) -> u32 {
        self.sync_id.load(Ordering::Acquire)
    }

    pub fn is_synced(&self) -> bool {
        self.sync_id() != 0
    }

    /// Next value the local sequence counter would hand out.
    pub fn local_tracker(&self) -> u32 {
        *self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ---

    /// Record the sync id. Fires [`BridgeEvent::Synced`] on the transition
    /// from zero to non-zero only.
    pub fn set_sync_id(&self, value: u32) {
        // ---
        let previous = self.sync_id.swap(value, Ordering::AcqRel);
        if previous == 0 && value != 0 {
            tracing::info!(bridge = %self, sync_id = value, "bridge synced");
            self.notify(BridgeEvent::Synced(value));
        }
    }

    // ---

    /// `true` iff the transport's remote is the session's peer (any
    /// endpoint of the same account).
    pub fn suitable_for(&self, session: &Session) -> bool {
        self.suitable_for_remote(session.remote())
    }

    fn suitable_for_remote(&self, remote: &PeerAddr) -> bool {
        self.remote().is_some_and(|r| remote.is_sibling(&r))
    }

    // ---

    /// Whether `session` may hand another item to the transport now.
    ///
    /// False while the transport is closed or the session is suspended.
    /// Under flow control the in-flight count must be below capacity; a
    /// session that never sent on this bridge is let through once.
    pub async fn ready(&self, session: &Session) -> bool {
        // ---
        match self.lane(session.id()).await {
            Some(lane) => self.lane_ready(&*lane.lock().await),
            None => self.lane_ready(&Lane::new(session)),
        }
    }

    fn lane_ready(&self, lane: &Lane) -> bool {
        // ---
        if !self.is_open() || lane.stopped {
            return false;
        }
        if self.config.queue_capacity == 0 {
            return true;
        }
        match lane.sending.as_ref() {
            None => self.suitable_for_remote(&lane.remote),
            Some(sending) => sending.len() < self.config.queue_capacity,
        }
    }

    // ---

    /// Number, split and queue `frame` for `session`, then drain.
    ///
    /// With `session == None` the pieces bypass the queues and go straight
    /// to the transport; on a closed transport they are dropped with a log.
    /// A session this bridge is not suitable for is rejected with
    /// [`P2pError::TransportUnsuitable`] before anything is numbered.
    pub async fn send(
        &self,
        session: Option<&Session>,
        remote: &PeerAddr,
        routing_hint: Option<Uuid>,
        frame: Frame,
        ack: Option<AckCallback>,
    ) -> Result<()> {
        // ---
        let Some(session) = session else {
            if !self.is_open() {
                tracing::warn!(bridge = %self, "send with no session on a closed bridge, dropped");
                return Ok(());
            }

            for piece in self.stamp(None, frame, ack) {
                let packet = OutboundPacket {
                    session: None,
                    remote: remote.clone(),
                    routing_hint,
                    frame: piece,
                };
                if let Err(e) = self.transport.send_one_packet(packet) {
                    tracing::warn!(bridge = %self, "unqueued send failed: {e}");
                }
            }
            return Ok(());
        };

        if !self.suitable_for(session) {
            tracing::warn!(bridge = %self, session = %session.id(), "send for a session this bridge cannot carry");
            return Err(P2pError::TransportUnsuitable {
                bridge: self.to_string(),
                session: session.id().to_string(),
            });
        }

        let pieces = self.stamp(Some(session), frame, ack);
        {
            let mut lane = self.live_lane(session).await;
            for piece in pieces {
                lane.queue
                    .enqueue(SendItem::new(remote.clone(), routing_hint, piece));
            }
        }

        self.process_send_queues().await;
        Ok(())
    }

    // ---

    /// Assign an identifier, stamp a correlation id where the policy needs
    /// one, split to the transport's payload size and register `ack`
    /// against the first piece.
    fn stamp(&self, session: Option<&Session>, mut frame: Frame, ack: Option<AckCallback>) -> Vec<Frame> {
        // ---
        let policy = self.config.sequence_policy;
        let mut tracker = self.tracker.lock().unwrap_or_else(PoisonError::into_inner);

        // A session that migrated here keeps counting from where it was.
        if let Some(session) = session {
            *tracker = (*tracker).max(session.local_identifier());
        }

        if frame.identifier == 0 {
            frame.identifier = match policy {
                SequencePolicy::CountBased => {
                    *tracker = tracker.wrapping_add(1);
                    *tracker
                }
                SequencePolicy::SizeBased => *tracker,
            };
        }

        if policy.stamps_correlation_id() && frame.ack_session_id == 0 {
            frame.ack_session_id = rand::thread_rng().gen_range(CORRELATION_MIN..CORRELATION_MAX);
        }

        let pieces = frame.split(self.max_payload_size(), policy);

        match policy {
            SequencePolicy::CountBased => *tracker = (*tracker).max(frame.identifier),
            SequencePolicy::SizeBased => {
                if let Some(last) = pieces.last() {
                    let next = last.identifier.wrapping_add(policy.advance(last.payload.len()));
                    *tracker = (*tracker).max(next);
                }
            }
        }

        if let Some(session) = session {
            session.advance_local_identifier(*tracker);
        }
        drop(tracker);

        if let (Some(callback), Some(first)) = (ack, pieces.first()) {
            self.acks
                .register(session.map(Session::id), first.ack_key(policy), callback);
        }

        pieces
    }

    // ---

    /// Drain every lane as far as flow control allows.
    pub async fn process_send_queues(&self) {
        // ---
        let lanes: Vec<LanePtr> = self.lanes.lock().await.values().cloned().collect();

        let mut more_queued = false;
        for lane in &lanes {
            more_queued |= self.drain_lane(lane).await;
        }

        if !more_queued {
            tracing::trace!(bridge = %self, "queues are all empty");
        }
    }

    // ---

    /// Returns `true` if items remain queued after the drain.
    async fn drain_lane(&self, lane: &LanePtr) -> bool {
        // ---
        let mut lane = lane.lock().await;

        while self.lane_ready(&lane) {
            let Some(item) = lane.queue.dequeue() else {
                break;
            };

            let packet = OutboundPacket {
                session: Some(lane.session),
                remote: item.remote.clone(),
                routing_hint: item.routing_hint,
                frame: item.frame.clone(),
            };
            lane.sending.get_or_insert_with(SendingQueue::new).add(item);

            if let Err(e) = self.transport.send_one_packet(packet) {
                tracing::warn!(bridge = %self, session = %lane.session, "send_one_packet failed: {e}");
                if let Some(item) = lane.sending.as_mut().and_then(SendingQueue::pop_last) {
                    lane.queue.requeue_front(item);
                }
                self.notify(BridgeEvent::SendFailed {
                    session: lane.session,
                });
                break;
            }
        }

        if lane.queue.is_empty() {
            return false;
        }
        tracing::debug!(
            bridge = %self,
            session = %lane.session,
            queued = lane.queue.len(),
            in_flight = lane.in_flight(),
            "queue holds items",
        );
        true
    }

    // ---

    /// Suspend sending for `session`. Already-suspended is a logged no-op.
    pub async fn stop_sending(&self, session: &Session) {
        // ---
        let mut lane = self.live_lane(session).await;
        if lane.stopped {
            tracing::debug!(bridge = %self, session = %session.id(), "session already stopped");
            return;
        }
        lane.stopped = true;
        tracing::debug!(bridge = %self, session = %session.id(), "stop sending");
    }

    // ---

    /// Lift a suspension and drain. Not-suspended is a logged no-op.
    pub async fn resume_sending(&self, session: &Session) {
        // ---
        let resumed = match self.lane(session.id()).await {
            Some(lane) => std::mem::replace(&mut lane.lock().await.stopped, false),
            None => false,
        };

        if !resumed {
            tracing::debug!(bridge = %self, session = %session.id(), "session was not stopped");
            return;
        }

        tracing::debug!(bridge = %self, session = %session.id(), "resume sending");
        self.process_send_queues().await;
    }

    // ---

    /// Move `session`'s sending queue, then its send queue, onto
    /// `new_bridge`, and forget the session here (suspension included).
    ///
    /// With `new_bridge == None` the traffic is dropped.
    pub async fn migrate_queue(&self, session: &Session, new_bridge: Option<&Arc<Bridge>>) {
        // ---
        tracing::info!(
            bridge = %self,
            session = %session.id(),
            to = %new_bridge.map_or_else(|| "null".to_string(), |b| b.to_string()),
            "migrating session queue",
        );

        if new_bridge.is_some_and(|b| b.id == self.id) {
            return;
        }

        let Some(src) = self.lane(session.id()).await else {
            return;
        };

        let Some(dst_bridge) = new_bridge else {
            let mut src_lane = src.lock().await;
            if src_lane.retired {
                return;
            }
            let dropped = src_lane.queue.len() + src_lane.in_flight();
            src_lane.queue.clear();
            src_lane.sending = None;
            src_lane.retired = true;
            self.forget_lane(session.id(), &src).await;
            tracing::info!(bridge = %self, session = %session.id(), dropped, "session queue discarded");
            return;
        };

        loop {
            let dst = dst_bridge.lane_or_insert(session).await;

            // Lock order: lower bridge id first.
            let (mut src_lane, mut dst_lane) = if self.id < dst_bridge.id {
                let s = src.lock().await;
                let d = dst.lock().await;
                (s, d)
            } else {
                let d = dst.lock().await;
                let s = src.lock().await;
                (s, d)
            };

            if src_lane.retired {
                tracing::debug!(bridge = %self, session = %session.id(), "session queue already moved");
                return;
            }
            if dst_lane.retired {
                continue;
            }

            let mut moved: SendQueue = src_lane
                .sending
                .take()
                .map(|s| s.into_iter().collect())
                .unwrap_or_default();
            moved.append(&mut src_lane.queue);

            if !dst_lane.queue.is_empty() {
                tracing::debug!(bridge = %dst_bridge, "queue already present for session, merging");
            }
            dst_lane.queue.append(&mut moved);

            src_lane.retired = true;
            self.forget_lane(session.id(), &src).await;
            break;
        }

        dst_bridge.process_send_queues().await;
    }

    // ---

    /// Accept a migrated queue for `session`, behind anything already
    /// queued, and drain.
    pub async fn add_queue(&self, session: &Session, mut queue: SendQueue) {
        // ---
        tracing::debug!(bridge = %self, session = %session.id(), items = queue.len(), "received queue");

        {
            let mut lane = self.live_lane(session).await;
            if !lane.queue.is_empty() {
                tracing::debug!(bridge = %self, "queue already present for session, merging");
            }
            lane.queue.append(&mut queue);
        }

        self.process_send_queues().await;
    }

    // ---

    /// Remove `session` from this bridge and return its traffic, sending
    /// queue first. Used when no replacement bridge exists yet.
    pub async fn take_queue(&self, session: &Session) -> SendQueue {
        // ---
        let Some(ptr) = self.lane(session.id()).await else {
            return SendQueue::new();
        };

        let mut lane = ptr.lock().await;
        if lane.retired {
            return SendQueue::new();
        }
        let mut taken: SendQueue = lane
            .sending
            .take()
            .map(|s| s.into_iter().collect())
            .unwrap_or_default();
        taken.append(&mut lane.queue);

        lane.retired = true;
        self.forget_lane(session.id(), &ptr).await;
        taken
    }

    // ---

    /// Feed one transport event into the bridge.
    pub async fn handle_transport_event(&self, event: TransportEvent) {
        // ---
        match event {
            TransportEvent::Opened => {
                tracing::info!(bridge = %self, "bridge opened");
                self.notify(BridgeEvent::Opened);
                self.process_send_queues().await;
            }
            TransportEvent::Synced(id) => self.set_sync_id(id),
            TransportEvent::Sent { session, frame } => self.on_sent(session, frame).await,
            TransportEvent::Closed => {
                tracing::info!(bridge = %self, "bridge closed");
                self.notify(BridgeEvent::Closed);
            }
        }
    }

    // ---

    /// Consume `events` on a background task until the transport closes.
    pub fn spawn_event_pump(self: &Arc<Self>, mut events: TransportEventRx) -> JoinHandle<()> {
        // ---
        let bridge = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let closed = matches!(event, TransportEvent::Closed);
                bridge.handle_transport_event(event).await;
                if closed {
                    break;
                }
            }
            tracing::debug!(bridge = %bridge, "event pump exiting");
        })
    }

    // ---

    async fn on_sent(&self, session: Option<SessionId>, frame: Frame) {
        // ---
        if frame.identifier != 0 {
            let next = frame
                .identifier
                .wrapping_add(self.config.sequence_policy.advance(frame.payload.len()));
            let mut tracker = self.tracker.lock().unwrap_or_else(PoisonError::into_inner);
            *tracker = (*tracker).max(next);
        }

        if let Some(id) = session {
            if let Some(lane) = self.lane(id).await {
                let removed = lane
                    .lock()
                    .await
                    .sending
                    .as_mut()
                    .and_then(|s| s.remove(frame.key()));
                if removed.is_none() {
                    tracing::warn!(bridge = %self, session = %id, identifier = frame.identifier, "sent frame not present in sending queue");
                }
            }
        }

        self.notify(BridgeEvent::Sent { session, frame });
        self.process_send_queues().await;
    }

    // ---

    /// Drop every lane. The bridge carries nothing afterwards.
    pub async fn dispose(&self) {
        // ---
        let lanes: Vec<LanePtr> = self.lanes.lock().await.drain().map(|(_, lane)| lane).collect();
        for lane in &lanes {
            lane.lock().await.retired = true;
        }
        tracing::debug!(bridge = %self, lanes = lanes.len(), "bridge disposed");
    }

    // --- diagnostics

    pub async fn queued_len(&self, session: SessionId) -> usize {
        match self.lane(session).await {
            Some(lane) => lane.lock().await.queue.len(),
            None => 0,
        }
    }

    pub async fn in_flight_len(&self, session: SessionId) -> usize {
        match self.lane(session).await {
            Some(lane) => lane.lock().await.in_flight(),
            None => 0,
        }
    }

    pub async fn is_suspended(&self, session: SessionId) -> bool {
        match self.lane(session).await {
            Some(lane) => lane.lock().await.stopped,
            None => false,
        }
    }

    /// `true` if the bridge holds any state for `session`.
    pub async fn carries(&self, session: SessionId) -> bool {
        self.lanes.lock().await.contains_key(&session)
    }

    /// Sending queue followed by send queue, in order.
    pub async fn pending_items(&self, session: SessionId) -> Vec<SendItem> {
        // ---
        let Some(lane) = self.lane(session).await else {
            return Vec::new();
        };
        let lane = lane.lock().await;
        lane.sending
            .iter()
            .flat_map(SendingQueue::iter)
            .chain(lane.queue.iter())
            .cloned()
            .collect()
    }

    // --- internal

    async fn lane(&self, session: SessionId) -> Option<LanePtr> {
        self.lanes.lock().await.get(&session).cloned()
    }

    async fn lane_or_insert(&self, session: &Session) -> LanePtr {
        // ---
        Arc::clone(
            self.lanes
                .lock()
                .await
                .entry(session.id())
                .or_insert_with(|| Arc::new(Mutex::new(Lane::new(session)))),
        )
    }

    /// Lock the session's live lane, creating it if needed.
    async fn live_lane(&self, session: &Session) -> OwnedMutexGuard<Lane> {
        // ---
        loop {
            let lane = self.lane_or_insert(session).await.lock_owned().await;
            if !lane.retired {
                return lane;
            }
            tracing::trace!(bridge = %self, session = %session.id(), "lane retired while waiting, retrying");
        }
    }

    /// Remove `session`'s entry if it still points at `lane`.
    async fn forget_lane(&self, session: SessionId, lane: &LanePtr) {
        // ---
        let mut lanes = self.lanes.lock().await;
        if lanes.get(&session).is_some_and(|l| Arc::ptr_eq(l, lane)) {
            lanes.remove(&session);
        }
    }

    fn notify(&self, event: BridgeEvent) {
        // ---
        if let Some(tx) = &self.notices {
            // Observer gone means nobody is listening; nothing to do.
            let _ = tx.send(BridgeNotice {
                bridge: self.id,
                event,
            });
        }
    }
}

// ---

impl fmt::Display for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.id, self.transport.kind())
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // ---
        f.debug_struct("Bridge")
            .field("id", &self.id)
            .field("kind", &self.transport.kind())
            .field("open", &self.is_open())
            .field("config", &self.config)
            .field("sync_id", &self.sync_id())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    // ---
    use std::sync::atomic::AtomicUsize;

    use p2pmux_link_sim::{LinkSimConfig, SimTransport};

    use super::*;

    fn alice() -> PeerAddr {
        PeerAddr::new("alice@example.com")
    }

    fn bob() -> PeerAddr {
        PeerAddr::new("bob@example.com")
    }

    fn session() -> Session {
        Session::with_random_base(alice(), bob())
    }

    fn bridge_on(config: BridgeConfig, sim: LinkSimConfig) -> (Arc<Bridge>, Arc<SimTransport>, TransportEventRx) {
        // ---
        let (transport, rx) = SimTransport::new(bob(), sim);
        let bridge = Bridge::new(transport.clone(), config);
        (bridge, transport, rx)
    }

    async fn pump(bridge: &Bridge, rx: &mut TransportEventRx) {
        while let Ok(event) = rx.try_recv() {
            bridge.handle_transport_event(event).await;
        }
    }

    fn data(tag: u8) -> Frame {
        Frame::data(1, vec![tag; 8])
    }

    fn tags(transport: &SimTransport) -> Vec<u8> {
        transport.sent().iter().map(|p| p.frame.payload[0]).collect()
    }

    fn item_tags(items: &[SendItem]) -> Vec<u8> {
        items.iter().map(|i| i.frame.payload[0]).collect()
    }

    /// Let spawned tasks run up to their next blocking point.
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    // ---

    #[tokio::test]
    async fn transmit_order_matches_enqueue_order() {
        // ---
        let (b, t, mut rx) = bridge_on(BridgeConfig::flow_controlled(3), LinkSimConfig::perfect());
        let s = session();

        for tag in 1..=20 {
            b.send(Some(&s), s.remote(), None, data(tag), None).await.unwrap();
            if tag % 4 == 0 {
                pump(&b, &mut rx).await;
            }
        }
        pump(&b, &mut rx).await;

        assert_eq!(tags(&t), (1..=20).collect::<Vec<u8>>());
    }

    // ---

    #[tokio::test]
    async fn capacity_two_holds_third_frame_until_sent() {
        // ---
        let (b, t, mut rx) = bridge_on(BridgeConfig::flow_controlled(2), LinkSimConfig::manual_confirm());
        let s = session();

        for tag in 1..=3 {
            b.send(Some(&s), s.remote(), None, data(tag), None).await.unwrap();
        }
        assert_eq!(tags(&t), vec![1, 2]);
        assert_eq!(b.in_flight_len(s.id()).await, 2);
        assert_eq!(b.queued_len(s.id()).await, 1);

        assert!(t.confirm_next());
        pump(&b, &mut rx).await;
        assert_eq!(tags(&t), vec![1, 2, 3]);

        t.confirm_all();
        pump(&b, &mut rx).await;
        assert_eq!(b.in_flight_len(s.id()).await, 0);
        assert_eq!(b.queued_len(s.id()).await, 0);
    }

    // ---

    #[tokio::test]
    async fn in_flight_never_exceeds_capacity() {
        // ---
        const CAPACITY: usize = 3;
        let (b, t, mut rx) = bridge_on(BridgeConfig::flow_controlled(CAPACITY), LinkSimConfig::manual_confirm());
        let s = session();
        let mut rng = rand::thread_rng();

        for step in 0..200u32 {
            if rng.gen_bool(0.6) {
                b.send(Some(&s), s.remote(), None, data(step as u8), None).await.unwrap();
            } else {
                t.confirm_next();
                pump(&b, &mut rx).await;
            }
            let in_flight = b.in_flight_len(s.id()).await;
            assert!(in_flight <= CAPACITY, "step {step}: {in_flight} in flight");
        }
    }

    // ---

    #[tokio::test]
    async fn first_send_is_permitted_under_flow_control() {
        // ---
        let (b, t, _rx) = bridge_on(BridgeConfig::flow_controlled(1), LinkSimConfig::manual_confirm());
        let s = session();

        assert!(b.ready(&s).await);
        b.send(Some(&s), s.remote(), None, data(1), None).await.unwrap();
        assert_eq!(t.sent_len(), 1);
        assert!(!b.ready(&s).await, "capacity reached");
    }

    // ---

    #[tokio::test]
    async fn suspended_session_is_never_ready() {
        // ---
        let (b, t, _rx) = bridge_on(BridgeConfig::unbounded(), LinkSimConfig::perfect());
        let s = session();

        b.stop_sending(&s).await;
        b.stop_sending(&s).await;
        assert!(b.is_open());
        assert!(!b.ready(&s).await);

        b.send(Some(&s), s.remote(), None, data(1), None).await.unwrap();
        b.send(Some(&s), s.remote(), None, data(2), None).await.unwrap();
        assert_eq!(t.sent_len(), 0);
        assert_eq!(b.queued_len(s.id()).await, 2);

        b.resume_sending(&s).await;
        b.resume_sending(&s).await;
        assert_eq!(tags(&t), vec![1, 2]);
        assert!(!b.is_suspended(s.id()).await);
    }

    // ---

    #[tokio::test]
    async fn closed_transport_queues_until_opened() {
        // ---
        let (b, t, mut rx) = bridge_on(BridgeConfig::unbounded(), LinkSimConfig::closed());
        let s = session();

        assert!(!b.ready(&s).await);
        b.send(Some(&s), s.remote(), None, data(1), None).await.unwrap();
        assert_eq!(b.queued_len(s.id()).await, 1);

        t.open();
        pump(&b, &mut rx).await;
        assert_eq!(tags(&t), vec![1]);
    }

    // ---

    #[tokio::test]
    async fn migration_moves_sending_then_queued_in_order() {
        // ---
        let (a, a_wire, _a_rx) = bridge_on(BridgeConfig::flow_controlled(2), LinkSimConfig::manual_confirm());
        let (b, b_wire, mut b_rx) = bridge_on(BridgeConfig::unbounded(), LinkSimConfig::closed());
        let s = session();

        // B already holds one entry for the session.
        b.send(Some(&s), s.remote(), None, data(100), None).await.unwrap();

        for tag in 1..=5 {
            a.send(Some(&s), s.remote(), None, data(tag), None).await.unwrap();
        }
        a.stop_sending(&s).await;
        assert_eq!(a.in_flight_len(s.id()).await, 2);
        let before = item_tags(&a.pending_items(s.id()).await);
        assert_eq!(before, vec![1, 2, 3, 4, 5]);

        a.migrate_queue(&s, Some(&b)).await;

        let after = item_tags(&b.pending_items(s.id()).await);
        assert_eq!(after, vec![100, 1, 2, 3, 4, 5]);
        assert!(!a.carries(s.id()).await);
        assert!(!a.is_suspended(s.id()).await);
        assert!(!b.is_suspended(s.id()).await);

        b_wire.open();
        pump(&b, &mut b_rx).await;
        assert_eq!(tags(&b_wire), vec![100, 1, 2, 3, 4, 5]);
        assert_eq!(a_wire.sent_len(), 2);
    }

    // ---

    #[tokio::test]
    async fn migration_to_nothing_discards() {
        // ---
        let (a, _wire, _rx) = bridge_on(BridgeConfig::flow_controlled(1), LinkSimConfig::manual_confirm());
        let s = session();

        for tag in 1..=3 {
            a.send(Some(&s), s.remote(), None, data(tag), None).await.unwrap();
        }
        a.migrate_queue(&s, None).await;

        assert!(!a.carries(s.id()).await);
        assert!(a.pending_items(s.id()).await.is_empty());
    }

    // ---

    #[tokio::test]
    async fn unsuitable_session_is_rejected_before_numbering() {
        // ---
        let (b, t, _rx) = bridge_on(BridgeConfig::unbounded(), LinkSimConfig::perfect());
        let s = Session::with_random_base(alice(), PeerAddr::new("carol@example.com"));
        let before = s.local_identifier();

        let err = b.send(Some(&s), s.remote(), None, data(1), None).await;
        assert!(matches!(err, Err(P2pError::TransportUnsuitable { .. })));
        assert_eq!(t.sent_len(), 0);
        assert_eq!(s.local_identifier(), before);

        let sibling = Session::with_random_base(alice(), PeerAddr::new("BOB@example.com"));
        assert!(b.suitable_for(&sibling));
    }

    // ---

    #[tokio::test]
    async fn unqueued_send_bypasses_queues() {
        // ---
        let (b, t, _rx) = bridge_on(BridgeConfig::flow_controlled(1), LinkSimConfig::manual_confirm());

        for tag in 1..=3 {
            b.send(None, &bob(), None, data(tag), None).await.unwrap();
        }
        assert_eq!(tags(&t), vec![1, 2, 3]);
        assert!(t.sent().iter().all(|p| p.session.is_none()));

        t.close();
        b.send(None, &bob(), None, data(4), None).await.unwrap();
        assert_eq!(t.sent_len(), 3, "dropped on a closed bridge");
    }

    // ---

    #[tokio::test]
    async fn count_based_numbering_is_strictly_increasing() {
        // ---
        let config = BridgeConfig::unbounded().with_policy(SequencePolicy::CountBased);
        let (b, t, _rx) = bridge_on(config, LinkSimConfig::perfect());
        let s = session();

        for tag in 1..=4 {
            b.send(Some(&s), s.remote(), None, data(tag), None).await.unwrap();
        }

        let sent = t.sent();
        let ids: Vec<u32> = sent.iter().map(|p| p.frame.identifier).collect();
        assert!(ids.windows(2).all(|w| w[1] == w[0] + 1), "{ids:?}");
        assert!(sent
            .iter()
            .all(|p| (CORRELATION_MIN..CORRELATION_MAX).contains(&p.frame.ack_session_id)));
        assert_eq!(s.local_identifier(), *ids.last().unwrap());
    }

    // ---

    #[tokio::test]
    async fn size_based_numbering_advances_by_length() {
        // ---
        let (b, t, _rx) = bridge_on(BridgeConfig::unbounded(), LinkSimConfig::perfect());
        let s = session();

        b.send(Some(&s), s.remote(), None, Frame::data(1, vec![0; 10]), None).await.unwrap();
        b.send(Some(&s), s.remote(), None, Frame::data(1, Vec::new()), None).await.unwrap();
        b.send(Some(&s), s.remote(), None, Frame::data(1, vec![0; 5]), None).await.unwrap();

        let ids: Vec<u32> = t.sent().iter().map(|p| p.frame.identifier).collect();
        let first = ids[0];
        assert_eq!(ids, vec![first, first + 10, first + 11]);
        assert_eq!(s.local_identifier(), first + 16);
        assert!(t.sent().iter().all(|p| p.frame.ack_session_id == 0));
    }

    // ---

    #[tokio::test]
    async fn oversized_frame_is_split_to_payload_size() {
        // ---
        let (b, t, _rx) = bridge_on(BridgeConfig::unbounded(), LinkSimConfig::perfect().with_max_payload_size(4));
        let s = session();

        b.send(Some(&s), s.remote(), None, Frame::data(1, vec![7; 10]), None).await.unwrap();

        let sent = t.sent();
        let first = sent[0].frame.identifier;
        let shape: Vec<(u32, u64, usize)> = sent
            .iter()
            .map(|p| (p.frame.identifier, p.frame.offset, p.frame.payload.len()))
            .collect();
        assert_eq!(shape, vec![(first, 0, 4), (first + 4, 4, 4), (first + 8, 8, 2)]);
        assert!(sent.iter().all(|p| p.frame.total_size == 10));
    }

    // ---

    #[tokio::test]
    async fn migrated_session_keeps_increasing_sequence() {
        // ---
        let (a, a_wire, _a_rx) = bridge_on(BridgeConfig::unbounded(), LinkSimConfig::perfect());
        let s = session();
        a.send(Some(&s), s.remote(), None, Frame::data(1, vec![0; 100]), None).await.unwrap();
        let last_on_a = a_wire.sent()[0].frame.identifier;

        for _ in 0..8 {
            let (b, b_wire, _b_rx) = bridge_on(BridgeConfig::unbounded(), LinkSimConfig::perfect());
            let floor = s.local_identifier();
            b.send(Some(&s), s.remote(), None, data(1), None).await.unwrap();
            let id = b_wire.sent()[0].frame.identifier;
            assert!(id > last_on_a);
            assert!(id >= floor);
        }
    }

    // ---

    #[tokio::test]
    async fn synced_fires_once_on_first_sync_id() {
        // ---
        let (transport, mut rx) = SimTransport::new(bob(), LinkSimConfig::perfect());
        let (tx, mut notices) = mpsc::unbounded_channel();
        let b = Bridge::attached(transport.clone(), BridgeConfig::default(), Arc::new(AckRegistry::new()), Some(tx));

        b.set_sync_id(0);
        assert!(notices.try_recv().is_err());

        transport.sync(7);
        pump(&b, &mut rx).await;
        b.set_sync_id(9);

        match notices.try_recv() {
            Ok(BridgeNotice {
                event: BridgeEvent::Synced(7),
                bridge,
            }) => assert_eq!(bridge, b.id()),
            other => panic!("expected Synced(7), got {other:?}"),
        }
        assert!(notices.try_recv().is_err(), "only the zero to non-zero transition notifies");
        assert!(b.is_synced());
    }

    // ---

    #[tokio::test]
    async fn ack_callback_is_keyed_on_the_first_piece() {
        // ---
        let (transport, _rx) = SimTransport::new(bob(), LinkSimConfig::perfect().with_max_payload_size(4));
        let acks = Arc::new(AckRegistry::new());
        let b = Bridge::attached(transport.clone(), BridgeConfig::default(), Arc::clone(&acks), None);
        let s = session();

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let callback: AckCallback = Box::new(move |_: &Frame| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        b.send(Some(&s), s.remote(), None, Frame::data(1, vec![1; 10]), Some(callback))
            .await
            .unwrap();
        assert_eq!(acks.len(), 1);

        // Remote acks the last piece; the key is the same for every piece.
        let sent = transport.sent();
        let ack = Frame::ack_for(&sent[2].frame, SequencePolicy::SizeBased);
        assert!(acks.complete(&ack));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    // ---

    #[tokio::test]
    async fn failed_hand_off_requeues_and_notifies() {
        // ---
        let (transport, _rx) = SimTransport::new(bob(), LinkSimConfig::manual_confirm());
        let (tx, mut notices) = mpsc::unbounded_channel();
        let b = Bridge::attached(transport.clone(), BridgeConfig::flow_controlled(2), Arc::new(AckRegistry::new()), Some(tx));
        let s = session();

        transport.set_failing(true);
        b.send(Some(&s), s.remote(), None, data(1), None).await.unwrap();

        assert!(matches!(
            notices.try_recv(),
            Ok(BridgeNotice {
                event: BridgeEvent::SendFailed { .. },
                ..
            })
        ));
        assert_eq!(b.queued_len(s.id()).await, 1);
        assert_eq!(b.in_flight_len(s.id()).await, 0);

        transport.set_failing(false);
        b.process_send_queues().await;
        assert_eq!(tags(&transport), vec![1]);
    }

    // ---

    #[tokio::test]
    async fn sent_event_for_unknown_frame_is_tolerated() {
        // ---
        let (b, _t, _rx) = bridge_on(BridgeConfig::flow_controlled(1), LinkSimConfig::manual_confirm());
        let s = session();
        b.send(Some(&s), s.remote(), None, data(1), None).await.unwrap();

        let mut stray = data(9);
        stray.identifier = 1;
        b.handle_transport_event(TransportEvent::Sent {
            session: Some(s.id()),
            frame: stray,
        })
        .await;

        assert_eq!(b.in_flight_len(s.id()).await, 1);
    }

    // ---

    #[tokio::test]
    async fn take_queue_returns_everything_in_order() {
        // ---
        let (b, _t, _rx) = bridge_on(BridgeConfig::flow_controlled(1), LinkSimConfig::manual_confirm());
        let s = session();
        for tag in 1..=3 {
            b.send(Some(&s), s.remote(), None, data(tag), None).await.unwrap();
        }

        let taken: Vec<u8> = b.take_queue(&s).await.iter().map(|i| i.frame.payload[0]).collect();
        assert_eq!(taken, vec![1, 2, 3]);
        assert!(!b.carries(s.id()).await);
    }

    // ---

    #[tokio::test]
    async fn send_racing_migration_loses_nothing() {
        // ---
        let (a, _a_wire, _a_rx) = bridge_on(BridgeConfig::unbounded(), LinkSimConfig::manual_confirm());
        let (b, _b_wire, _b_rx) = bridge_on(BridgeConfig::unbounded(), LinkSimConfig::manual_confirm());
        let s = Arc::new(session());
        a.send(Some(&s), s.remote(), None, data(1), None).await.unwrap();

        // Hold A's lane so the migration and the second send both queue on it.
        let lane = a.lane(s.id()).await.unwrap();
        let held = lane.lock().await;

        let migrate = tokio::spawn({
            let (a, b, s) = (Arc::clone(&a), Arc::clone(&b), Arc::clone(&s));
            async move { a.migrate_queue(&s, Some(&b)).await }
        });
        settle().await;

        let send = tokio::spawn({
            let (a, s) = (Arc::clone(&a), Arc::clone(&s));
            async move { a.send(Some(&s), s.remote(), None, data(2), None).await }
        });
        settle().await;

        drop(held);
        migrate.await.unwrap();
        send.await.unwrap().unwrap();

        let on_a = item_tags(&a.pending_items(s.id()).await);
        let on_b = item_tags(&b.pending_items(s.id()).await);
        assert_eq!(on_b.first(), Some(&1));

        let mut all = [on_a, on_b].concat();
        all.sort_unstable();
        assert_eq!(all, vec![1, 2], "every frame is on a live lane");
    }

    // ---

    #[tokio::test]
    async fn send_racing_take_queue_loses_nothing() {
        // ---
        let (a, _wire, _rx) = bridge_on(BridgeConfig::unbounded(), LinkSimConfig::manual_confirm());
        let s = Arc::new(session());
        a.send(Some(&s), s.remote(), None, data(1), None).await.unwrap();

        let lane = a.lane(s.id()).await.unwrap();
        let held = lane.lock().await;

        let take = tokio::spawn({
            let (a, s) = (Arc::clone(&a), Arc::clone(&s));
            async move { a.take_queue(&s).await }
        });
        settle().await;

        let send = tokio::spawn({
            let (a, s) = (Arc::clone(&a), Arc::clone(&s));
            async move { a.send(Some(&s), s.remote(), None, data(2), None).await }
        });
        settle().await;

        drop(held);
        let taken = take.await.unwrap();
        send.await.unwrap().unwrap();

        let taken: Vec<SendItem> = taken.iter().cloned().collect();
        let mut all = [item_tags(&taken), item_tags(&a.pending_items(s.id()).await)].concat();
        all.sort_unstable();
        assert_eq!(all, vec![1, 2]);
    }

    // ---

    #[tokio::test]
    async fn migration_holds_both_lanes_until_done() {
        // ---
        let (a, _a_wire, _a_rx) = bridge_on(BridgeConfig::flow_controlled(1), LinkSimConfig::manual_confirm());
        let (b, _b_wire, _b_rx) = bridge_on(BridgeConfig::unbounded(), LinkSimConfig::closed());
        let s = Arc::new(session());

        b.send(Some(&s), s.remote(), None, data(100), None).await.unwrap();
        for tag in 1..=3 {
            a.send(Some(&s), s.remote(), None, data(tag), None).await.unwrap();
        }

        // A has the lower id, so the migration takes A's lane and then waits
        // on B's.
        assert!(a.id() < b.id());
        let src = a.lane(s.id()).await.unwrap();
        let dst = b.lane(s.id()).await.unwrap();
        let held = dst.lock().await;

        let migrate = tokio::spawn({
            let (a, b, s) = (Arc::clone(&a), Arc::clone(&b), Arc::clone(&s));
            async move { a.migrate_queue(&s, Some(&b)).await }
        });
        settle().await;

        assert!(src.try_lock().is_err(), "source lane is held by the migration");
        assert!(a.carries(s.id()).await, "nothing moved while the target lane is held");

        drop(held);
        migrate.await.unwrap();

        assert!(!a.carries(s.id()).await);
        assert_eq!(item_tags(&b.pending_items(s.id()).await), vec![100, 1, 2, 3]);
    }

    // ---

    #[tokio::test]
    async fn dispose_forgets_every_session() {
        // ---
        let (b, _wire, _rx) = bridge_on(BridgeConfig::flow_controlled(1), LinkSimConfig::manual_confirm());
        let s = session();
        for tag in 1..=2 {
            b.send(Some(&s), s.remote(), None, data(tag), None).await.unwrap();
        }
        let lane = b.lane(s.id()).await.unwrap();

        b.dispose().await;

        assert!(!b.carries(s.id()).await);
        assert!(lane.lock().await.retired);
    }
}
