use p2pmux_domain::SequencePolicy;

// ---------------------------------------------------------------------------
// BridgeConfig
// ---------------------------------------------------------------------------

/// Per-bridge flow control and numbering settings.
///
/// Defaults to no flow control and size-based numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BridgeConfig {
    // ---
    /// Maximum in-flight items per session. `0` = unbounded.
    pub queue_capacity: usize,

    pub sequence_policy: SequencePolicy,
}

// ---

impl BridgeConfig {
    // ---
    pub fn unbounded() -> Self {
        Self::default()
    }

    // ---

    /// At most `capacity` unconfirmed items per session.
    pub fn flow_controlled(capacity: usize) -> Self {
        Self {
            queue_capacity: capacity,
            ..Default::default()
        }
    }

    // ---

    pub fn with_policy(mut self, policy: SequencePolicy) -> Self {
        self.sequence_policy = policy;
        self
    }
}

// ---------------------------------------------------------------------------
// HandlerConfig
// ---------------------------------------------------------------------------

/// Settings for [`crate::P2pHandler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerConfig {
    // ---
    /// Applied to every bridge the handler builds on a relay channel.
    pub bridge: BridgeConfig,

    /// Occupant count of a point-to-point relay channel, the local user
    /// included. Channels above this are conversations with several
    /// contacts and never carry session traffic.
    pub expected_occupancy: usize,
}

// ---

impl Default for HandlerConfig {
    fn default() -> Self {
        // ---
        Self {
            bridge: BridgeConfig::default(),
            expected_occupancy: 2,
        }
    }
}
