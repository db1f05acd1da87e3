//! The slice of the packet format the multiplexer reasons about.
//!
//! Only sequencing and acknowledgment fields are modelled; the byte-level
//! header layout belongs to the relay-channel codec.

use super::sequence::SequencePolicy;

// ---------------------------------------------------------------------------
// FrameFlags
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameFlags(u32);

// ---

impl FrameFlags {
    // ---
    pub const NONE: FrameFlags = FrameFlags(0);
    pub const ACK: FrameFlags = FrameFlags(0x02);

    pub fn contains(self, other: FrameFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

// ---------------------------------------------------------------------------
// FrameKey
// ---------------------------------------------------------------------------

/// Identifies one physical piece of a (possibly split) message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameKey {
    pub identifier: u32,
    pub offset: u64,
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    // ---
    /// Application session the frame belongs to. `0` for control traffic.
    pub session_id: u32,

    /// Sequence number. `0` means "not yet assigned"; the bridge stamps it.
    pub identifier: u32,

    /// Correlation id linking an acknowledgment back to what it confirms.
    pub ack_session_id: u32,

    /// For acknowledgments: the ack key of the frame being confirmed.
    pub ack_identifier: u32,

    pub flags: FrameFlags,

    /// Byte offset of this piece within the whole message.
    pub offset: u64,

    /// Size of the whole message, identical across all split pieces.
    pub total_size: u64,

    pub payload: Vec<u8>,
}

// ---

impl Frame {
    // ---
    /// Unnumbered data frame for `session_id`.
    pub fn data(session_id: u32, payload: Vec<u8>) -> Self {
        // ---
        Self {
            session_id,
            total_size: payload.len() as u64,
            payload,
            ..Default::default()
        }
    }

    // ---

    /// Acknowledgment confirming `original` under `policy`.
    pub fn ack_for(original: &Frame, policy: SequencePolicy) -> Self {
        // ---
        Self {
            session_id: original.session_id,
            ack_session_id: original.identifier,
            ack_identifier: original.ack_key(policy),
            flags: FrameFlags::ACK,
            total_size: original.total_size,
            ..Default::default()
        }
    }

    // ---

    pub fn is_ack(&self) -> bool {
        self.flags.contains(FrameFlags::ACK)
    }

    pub fn key(&self) -> FrameKey {
        FrameKey {
            identifier: self.identifier,
            offset: self.offset,
        }
    }

    // ---

    /// Value an acknowledgment for this message carries in `ack_identifier`.
    ///
    /// Computed from the first piece's identifier and the whole message
    /// size, so every piece of a split message maps to the same key.
    pub fn ack_key(&self, policy: SequencePolicy) -> u32 {
        // ---
        match policy {
            SequencePolicy::CountBased => self.identifier,
            SequencePolicy::SizeBased => self
                .identifier
                .wrapping_sub(self.offset as u32)
                .wrapping_add(self.total_size as u32),
        }
    }

    // ---

    /// Split into pieces whose payload fits in `max_payload` bytes.
    ///
    /// Pieces carry increasing offsets and the original `total_size`. Under
    /// [`SequencePolicy::CountBased`] every piece keeps the message
    /// identifier; under [`SequencePolicy::SizeBased`] each piece's
    /// identifier follows the previous piece by its payload length.
    /// A `max_payload` of zero disables splitting.
    pub fn split(&self, max_payload: usize, policy: SequencePolicy) -> Vec<Frame> {
        // ---
        if max_payload == 0 || self.payload.len() <= max_payload {
            return vec![self.clone()];
        }

        let total_size = if self.total_size == 0 {
            self.payload.len() as u64
        } else {
            self.total_size
        };

        let mut pieces = Vec::with_capacity(self.payload.len().div_ceil(max_payload));
        let mut identifier = self.identifier;
        let mut offset = self.offset;

        for chunk in self.payload.chunks(max_payload) {
            pieces.push(Frame {
                identifier,
                offset,
                total_size,
                payload: chunk.to_vec(),
                ..self.clone()
            });

            offset += chunk.len() as u64;
            if policy == SequencePolicy::SizeBased {
                identifier = identifier.wrapping_add(chunk.len() as u32);
            }
        }

        pieces
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn small_frame_is_not_split() {
        // ---
        let frame = Frame::data(7, vec![1, 2, 3]);
        let pieces = frame.split(1_202, SequencePolicy::SizeBased);
        assert_eq!(pieces, vec![frame]);
    }

    // ---

    #[test]
    fn size_based_split_advances_identifier_by_piece_length() {
        // ---
        let mut frame = Frame::data(7, vec![0xAB; 2_500]);
        frame.identifier = 1_000;

        let pieces = frame.split(1_000, SequencePolicy::SizeBased);
        let ids: Vec<u32> = pieces.iter().map(|p| p.identifier).collect();
        let offsets: Vec<u64> = pieces.iter().map(|p| p.offset).collect();

        assert_eq!(ids, vec![1_000, 2_000, 3_000]);
        assert_eq!(offsets, vec![0, 1_000, 2_000]);
        assert!(pieces.iter().all(|p| p.total_size == 2_500));
        assert_eq!(pieces[2].payload.len(), 500);

        // Every piece acknowledges as the whole message.
        assert!(pieces.iter().all(|p| p.ack_key(SequencePolicy::SizeBased) == 3_500));
    }

    // ---

    #[test]
    fn count_based_split_shares_identifier() {
        // ---
        let mut frame = Frame::data(7, vec![0; 25]);
        frame.identifier = 42;

        let pieces = frame.split(10, SequencePolicy::CountBased);
        assert_eq!(pieces.len(), 3);
        assert!(pieces.iter().all(|p| p.identifier == 42));

        // Distinct keys even though identifiers match.
        assert_ne!(pieces[0].key(), pieces[1].key());
    }

    // ---

    #[test]
    fn ack_for_carries_policy_key() {
        // ---
        let mut frame = Frame::data(3, vec![0; 100]);
        frame.identifier = 500;

        let ack = Frame::ack_for(&frame, SequencePolicy::SizeBased);
        assert!(ack.is_ack());
        assert_eq!(ack.ack_identifier, 600);
        assert_eq!(ack.ack_session_id, 500);

        let ack = Frame::ack_for(&frame, SequencePolicy::CountBased);
        assert_eq!(ack.ack_identifier, 500);
    }
}
