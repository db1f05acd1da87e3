//! Per-session outbound queues held by a [`crate::Bridge`].
//!
//! [`SendQueue`] is FIFO of items not yet handed to the transport.
//! [`SendingQueue`] holds items handed over but not yet confirmed sent, in
//! hand-off order. Migration moves the sending queue ahead of the send
//! queue so relative order survives a transport swap.

use std::collections::VecDeque;

use uuid::Uuid;

use p2pmux_domain::{Frame, FrameKey, PeerAddr};

// ---------------------------------------------------------------------------
// SendItem
// ---------------------------------------------------------------------------

/// One outbound frame plus its destination and routing hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendItem {
    // ---
    pub remote: PeerAddr,
    pub routing_hint: Option<Uuid>,
    pub frame: Frame,
}

// ---

impl SendItem {
    pub fn new(remote: PeerAddr, routing_hint: Option<Uuid>, frame: Frame) -> Self {
        Self {
            remote,
            routing_hint,
            frame,
        }
    }
}

// ---------------------------------------------------------------------------
// SendQueue
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct SendQueue {
    // ---
    items: VecDeque<SendItem>,
}

// ---

impl SendQueue {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, item: SendItem) {
        self.items.push_back(item);
    }

    pub fn dequeue(&mut self) -> Option<SendItem> {
        self.items.pop_front()
    }

    /// Put an item back at the head, e.g. after a failed hand-off.
    pub(crate) fn requeue_front(&mut self, item: SendItem) {
        self.items.push_front(item);
    }

    /// Move every item of `other` to the tail of `self`, keeping order.
    pub fn append(&mut self, other: &mut SendQueue) {
        self.items.append(&mut other.items);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SendItem> {
        self.items.iter()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

// ---

impl FromIterator<SendItem> for SendQueue {
    fn from_iter<I: IntoIterator<Item = SendItem>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for SendQueue {
    type Item = SendItem;
    type IntoIter = std::collections::vec_deque::IntoIter<SendItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

// ---------------------------------------------------------------------------
// SendingQueue
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct SendingQueue {
    // ---
    items: Vec<SendItem>,
}

// ---

impl SendingQueue {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, item: SendItem) {
        self.items.push(item);
    }

    /// Remove the piece identified by `key`, if present.
    pub fn remove(&mut self, key: FrameKey) -> Option<SendItem> {
        // ---
        let pos = self.items.iter().position(|i| i.frame.key() == key)?;
        Some(self.items.remove(pos))
    }

    /// Remove the most recently added item.
    pub(crate) fn pop_last(&mut self) -> Option<SendItem> {
        self.items.pop()
    }

    pub fn contains(&self, key: FrameKey) -> bool {
        self.items.iter().any(|i| i.frame.key() == key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SendItem> {
        self.items.iter()
    }
}

impl IntoIterator for SendingQueue {
    type Item = SendItem;
    type IntoIter = std::vec::IntoIter<SendItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn item(id: u32) -> SendItem {
        // ---
        let mut frame = Frame::data(1, vec![0; 4]);
        frame.identifier = id;
        SendItem::new(PeerAddr::new("bob@example.com"), None, frame)
    }

    // ---

    #[test]
    fn send_queue_is_fifo() {
        // ---
        let mut q = SendQueue::new();
        for id in 1..=3 {
            q.enqueue(item(id));
        }

        let order: Vec<u32> = std::iter::from_fn(|| q.dequeue())
            .map(|i| i.frame.identifier)
            .collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    // ---

    #[test]
    fn append_keeps_existing_entries_first() {
        // ---
        let mut a: SendQueue = [item(1), item(2)].into_iter().collect();
        let mut b: SendQueue = [item(3)].into_iter().collect();

        a.append(&mut b);

        assert!(b.is_empty());
        let ids: Vec<u32> = a.iter().map(|i| i.frame.identifier).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    // ---

    #[test]
    fn sending_queue_removes_by_key() {
        // ---
        let mut s = SendingQueue::new();
        s.add(item(10));
        s.add(item(11));

        let key = item(10).frame.key();
        assert!(s.contains(key));
        assert!(s.remove(key).is_some());
        assert!(!s.contains(key));
        assert!(s.remove(key).is_none(), "second removal is a no-op");
        assert_eq!(s.len(), 1);
    }
}
