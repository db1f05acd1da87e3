/// How a bridge stamps and advances frame identifiers.
///
/// The two protocol generations disagree on numbering; the choice is an
/// explicit bridge configuration input.
///
/// | policy       | unassigned frame gets | after a frame is sent        |
/// |--------------|-----------------------|------------------------------|
/// | `CountBased` | `++counter`           | `identifier + 1`             |
/// | `SizeBased`  | `counter`             | `identifier + payload_len`   |
///
/// Size-based advances use `max(payload_len, 1)` so an empty frame still
/// consumes an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SequencePolicy {
    // ---
    /// Pre-increment by one per frame; split pieces share the identifier.
    CountBased,

    /// Identifiers are byte offsets into the session's outbound stream.
    #[default]
    SizeBased,
}

// ---

impl SequencePolicy {
    // ---
    /// Amount the counter advances past a sent frame carrying `len` bytes.
    pub fn advance(self, len: usize) -> u32 {
        // ---
        match self {
            SequencePolicy::CountBased => 1,
            SequencePolicy::SizeBased => u32::try_from(len.max(1)).unwrap_or(u32::MAX),
        }
    }

    // ---

    /// Whether frames under this policy need a correlation id stamped
    /// before they leave the bridge.
    pub fn stamps_correlation_id(self) -> bool {
        matches!(self, SequencePolicy::CountBased)
    }
}
