//! [`Session`] — one logical peer-to-peer exchange with a single remote peer.
//!
//! A session outlives any particular transport. Its route is either a bound
//! [`Bridge`] or, while no usable bridge exists, *detached traffic* parked on
//! the session itself:
//!
//! ```text
//! bound:     Session ──route──► Bridge ──► SendQueue / SendingQueue
//! detached:  Session ──route──► Detached { queue (numbered), unsent (raw) }
//! ```
//!
//! Detached traffic is replayed on the next bind: numbered entries recovered
//! from the previous bridge first, then the raw sends submitted while
//! unbound.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

// ---

use rand::Rng;
use tokio::sync::{watch, Mutex};
use uuid::Uuid;

// ---

use p2pmux_domain::{Frame, PeerAddr, SessionId, SessionState};

// ---

use super::ack::AckCallback;
use super::bridge::Bridge;
use super::queue::SendQueue;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Lower bound of a freshly drawn local base identifier.
pub const LOCAL_BASE_MIN: u32 = 10_000;

/// Upper bound (exclusive) of a freshly drawn local base identifier.
pub const LOCAL_BASE_MAX: u32 = i32::MAX as u32;

// ---------------------------------------------------------------------------
// Detached traffic
// ---------------------------------------------------------------------------

/// A send submitted while the session had no bridge. Numbered on replay.
pub(crate) struct PendingSend {
    pub(crate) routing_hint: Option<Uuid>,
    pub(crate) frame: Frame,
    pub(crate) ack: Option<AckCallback>,
}

#[derive(Default)]
pub(crate) struct Detached {
    /// Entries recovered from a bridge; already numbered.
    pub(crate) queue: SendQueue,

    /// Raw sends awaiting a bridge.
    pub(crate) unsent: VecDeque<PendingSend>,
}

impl Detached {
    pub(crate) fn len(&self) -> usize {
        self.queue.len() + self.unsent.len()
    }
}

pub(crate) struct Route {
    pub(crate) bridge: Option<Arc<Bridge>>,
    pub(crate) detached: Detached,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub struct Session {
    // ---
    id: SessionId,
    local: PeerAddr,
    remote: PeerAddr,

    local_base: u32,
    local_identifier: AtomicU32,
    remote_base: AtomicU32,
    remote_identifier: AtomicU32,

    state_tx: watch::Sender<SessionState>,

    /// Bound bridge plus detached traffic. Held across queue migration so
    /// no send can slip onto a bridge that is being replaced.
    pub(crate) route: Mutex<Route>,
}

// ---

impl Session {
    // ---
    /// Create an unbound session with an explicit local base identifier.
    pub fn new(local: PeerAddr, remote: PeerAddr, local_base: u32) -> Self {
        // ---
        let (state_tx, _) = watch::channel(SessionState::Active);
        Self {
            id: SessionId::next(),
            local,
            remote,
            local_base,
            local_identifier: AtomicU32::new(local_base),
            remote_base: AtomicU32::new(0),
            remote_identifier: AtomicU32::new(0),
            state_tx,
            route: Mutex::new(Route {
                bridge: None,
                detached: Detached::default(),
            }),
        }
    }

    // ---

    /// Create an unbound session with a random local base identifier.
    ///
    /// Drawn from a wide range so a new session is unlikely to reuse the
    /// numbers of one that just closed.
    pub fn with_random_base(local: PeerAddr, remote: PeerAddr) -> Self {
        // ---
        let base = rand::thread_rng().gen_range(LOCAL_BASE_MIN..LOCAL_BASE_MAX);
        Self::new(local, remote, base)
    }

    // --- identity

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn local(&self) -> &PeerAddr {
        &self.local
    }

    pub fn remote(&self) -> &PeerAddr {
        &self.remote
    }

    // --- sequence numbers

    pub fn local_base(&self) -> u32 {
        self.local_base
    }

    pub fn local_identifier(&self) -> u32 {
        self.local_identifier.load(Ordering::Acquire)
    }

    /// Raise the local running identifier. Never lowers it.
    pub fn advance_local_identifier(&self, value: u32) {
        self.local_identifier.fetch_max(value, Ordering::AcqRel);
    }

    pub fn remote_base(&self) -> u32 {
        self.remote_base.load(Ordering::Acquire)
    }

    pub fn remote_identifier(&self) -> u32 {
        self.remote_identifier.load(Ordering::Acquire)
    }

    /// `true` once the remote base identifier is known.
    pub fn remote_established(&self) -> bool {
        self.remote_base() != 0
    }

    /// Fix the remote base and running identifiers from the first frame
    /// the peer numbered. Later calls only ever raise the running value.
    pub fn establish_remote(&self, identifier: u32) {
        // ---
        if self
            .remote_base
            .compare_exchange(0, identifier, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.remote_identifier.store(identifier, Ordering::Release);
        } else {
            self.observe_remote_identifier(identifier);
        }
    }

    /// Record an identifier seen on inbound traffic.
    pub fn observe_remote_identifier(&self, identifier: u32) {
        self.remote_identifier.fetch_max(identifier, Ordering::AcqRel);
    }

    // --- lifecycle

    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    /// Subscribe to lifecycle changes.
    pub fn state_rx(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Move to `state`. Returns `false` if the session was already there or
    /// already closed.
    pub(crate) fn transition(&self, state: SessionState) -> bool {
        // ---
        self.state_tx.send_if_modified(|current| {
            if *current == state || *current == SessionState::Closed {
                return false;
            }
            *current = state;
            true
        })
    }

    // --- route

    /// Bridge currently carrying this session, if any.
    pub async fn bridge(&self) -> Option<Arc<Bridge>> {
        self.route.lock().await.bridge.clone()
    }

    /// `true` when bound to a bridge that is still open.
    pub async fn has_valid_bridge(&self) -> bool {
        // ---
        match self.route.lock().await.bridge.as_ref() {
            Some(bridge) => bridge.is_open(),
            None => false,
        }
    }

    /// Number of entries parked while the session had no bridge.
    pub async fn detached_len(&self) -> usize {
        self.route.lock().await.detached.len()
    }
}

// ---

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} -> {})", self.id, self.local, self.remote)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // ---
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("local", &self.local)
            .field("remote", &self.remote)
            .field("local_base", &self.local_base)
            .field("local_identifier", &self.local_identifier())
            .field("remote_base", &self.remote_base())
            .field("remote_identifier", &self.remote_identifier())
            .field("state", &self.state())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn session() -> Session {
        Session::with_random_base(PeerAddr::new("alice@example.com"), PeerAddr::new("bob@example.com"))
    }

    // ---

    #[test]
    fn random_base_is_in_range() {
        // ---
        for _ in 0..64 {
            let s = session();
            assert!((LOCAL_BASE_MIN..LOCAL_BASE_MAX).contains(&s.local_base()));
            assert_eq!(s.local_identifier(), s.local_base());
        }
    }

    // ---

    #[test]
    fn sequence_numbers_never_decrease() {
        // ---
        let s = Session::new(PeerAddr::new("a"), PeerAddr::new("b"), 20_000);

        s.advance_local_identifier(25_000);
        s.advance_local_identifier(21_000);
        assert_eq!(s.local_identifier(), 25_000);

        s.establish_remote(900);
        s.observe_remote_identifier(950);
        s.observe_remote_identifier(901);
        s.establish_remote(100);
        assert_eq!(s.remote_base(), 900);
        assert_eq!(s.remote_identifier(), 950);
    }

    // ---

    #[test]
    fn closed_is_terminal() {
        // ---
        let s = session();
        let rx = s.state_rx();

        assert!(s.transition(SessionState::Aborted));
        assert!(s.transition(SessionState::Closed));
        assert!(!s.transition(SessionState::Active));
        assert!(!s.transition(SessionState::Closed), "second close is a no-op");
        assert_eq!(*rx.borrow(), SessionState::Closed);
    }
}
