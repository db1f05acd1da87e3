//! Acknowledgment callbacks keyed by the ack key of the frame they await.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use p2pmux_domain::{Frame, SessionId};

// ---

/// Invoked with the acknowledgment frame once the remote confirms receipt.
pub type AckCallback = Box<dyn FnOnce(&Frame) + Send + 'static>;

struct AckEntry {
    session: Option<SessionId>,
    callback: AckCallback,
}

// ---------------------------------------------------------------------------
// AckRegistry
// ---------------------------------------------------------------------------

/// Shared between a handler and the bridges it builds.
///
/// Callbacks run outside the internal lock, at most once each. Cancelled
/// registrations are dropped without being called.
#[derive(Default)]
pub struct AckRegistry {
    // ---
    entries: Mutex<HashMap<u32, AckEntry>>,
}

// ---

impl AckRegistry {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    // ---

    /// Register `callback` for the acknowledgment carrying `ack_key`.
    ///
    /// A second registration under the same key replaces the first.
    pub fn register(&self, session: Option<SessionId>, ack_key: u32, callback: AckCallback) {
        // ---
        let replaced = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(ack_key, AckEntry { session, callback });

        if replaced.is_some() {
            tracing::debug!(ack_key, "ack handler replaced");
        }
    }

    // ---

    /// Run and remove the callback waiting on `ack.ack_identifier`.
    ///
    /// Returns `false` for unknown or duplicate acknowledgments.
    pub fn complete(&self, ack: &Frame) -> bool {
        // ---
        let entry = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&ack.ack_identifier);

        match entry {
            Some(entry) => {
                (entry.callback)(ack);
                true
            }
            None => false,
        }
    }

    // ---

    /// Drop every registration owned by `session` without calling it.
    pub fn discard_session(&self, session: SessionId) -> usize {
        // ---
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, e| e.session != Some(session));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    // ---
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    fn ack(key: u32) -> Frame {
        // ---
        Frame {
            ack_identifier: key,
            flags: p2pmux_domain::FrameFlags::ACK,
            ..Default::default()
        }
    }

    // ---

    #[test]
    fn callback_fires_once() {
        // ---
        let hits = Arc::new(AtomicUsize::new(0));
        let registry = AckRegistry::new();

        let h = Arc::clone(&hits);
        registry.register(
            None,
            77,
            Box::new(move |_: &Frame| {
                h.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert!(registry.complete(&ack(77)));
        assert!(!registry.complete(&ack(77)), "duplicate ack is ignored");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    // ---

    #[test]
    fn discarded_callbacks_never_fire() {
        // ---
        let hits = Arc::new(AtomicUsize::new(0));
        let registry = AckRegistry::new();
        let session = SessionId::next();
        let other = SessionId::next();

        for (key, owner) in [(1, session), (2, session), (3, other)] {
            let h = Arc::clone(&hits);
            registry.register(
                Some(owner),
                key,
                Box::new(move |_: &Frame| {
                    h.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }

        assert_eq!(registry.discard_session(session), 2);
        assert!(!registry.complete(&ack(1)));
        assert!(!registry.complete(&ack(2)));
        assert!(registry.complete(&ack(3)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
