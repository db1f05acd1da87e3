// ---------------------------------------------------------------------------
// LinkSimConfig
// ---------------------------------------------------------------------------

/// Configuration for the in-process link simulator.
///
/// Defaults to a perfect link: open on creation, every hand-off confirmed
/// immediately, nothing lost.
#[derive(Debug, Clone)]
pub struct LinkSimConfig {
    // ---
    /// Largest payload one simulated physical frame may carry.
    pub max_payload_size: usize,

    /// Report [`p2pmux_domain::TransportEvent::Sent`] as soon as a frame is
    /// handed over. When `false` the test confirms frames explicitly.
    pub auto_confirm: bool,

    /// Start in the open state.
    pub open_on_create: bool,

    /// Probability `[0.0, 1.0]` that a confirmation is lost. The frame stays
    /// unconfirmed until confirmed by hand.
    pub drop_percent: f64,

    /// RNG seed for reproducible drop sequences. `None` = random.
    pub seed: Option<u64>,
}

// ---

impl Default for LinkSimConfig {
    fn default() -> Self {
        // ---
        Self {
            max_payload_size: 1202,
            auto_confirm: true,
            open_on_create: true,
            drop_percent: 0.0,
            seed: None,
        }
    }
}

// ---

impl LinkSimConfig {
    // ---
    /// Perfect link. Useful as a baseline.
    pub fn perfect() -> Self {
        Self::default()
    }

    // ---

    /// Open link whose confirmations are driven by the test.
    pub fn manual_confirm() -> Self {
        Self {
            auto_confirm: false,
            ..Default::default()
        }
    }

    // ---

    /// Link that stays closed until [`crate::SimTransport::open`].
    pub fn closed() -> Self {
        Self {
            open_on_create: false,
            ..Default::default()
        }
    }

    // ---

    /// Link that loses `drop_percent` of its confirmations.
    pub fn lossy(drop_percent: f64, seed: u64) -> Self {
        Self {
            drop_percent,
            seed: Some(seed),
            ..Default::default()
        }
    }

    // ---

    pub fn with_max_payload_size(mut self, size: usize) -> Self {
        self.max_payload_size = size;
        self
    }
}
