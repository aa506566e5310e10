//! Failed-attempt guard with destructive wipe
//!
//! The guard counts consecutive failed decrypts for the current session:
//!
//! - success: counter back to zero
//! - failure below the threshold: counter + 1
//! - failure reaching the threshold: `Wiped` (terminal until re-armed)
//!
//! Once `Wiped`, the custodian destroys the blob and refuses further
//! decrypts until a fresh `encrypt_state` re-arms the guard.

/// Guard state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuardState {
    /// Accepting attempts; holds the consecutive failure count
    Armed(u32),
    /// Threshold reached; the shard must be destroyed
    Wiped,
}

/// Session-scoped failure counter
#[derive(Clone, Debug)]
pub struct AttemptGuard {
    threshold: u32,
    state: GuardState,
}

impl AttemptGuard {
    /// Create a guard; a zero threshold is treated as 1
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            state: GuardState::Armed(0),
        }
    }

    /// Record the outcome of a decrypt attempt and return the new state
    pub fn record_result(&mut self, success: bool) -> GuardState {
        self.state = match (self.state, success) {
            (GuardState::Wiped, _) => GuardState::Wiped,
            (GuardState::Armed(_), true) => GuardState::Armed(0),
            (GuardState::Armed(n), false) if n + 1 < self.threshold => GuardState::Armed(n + 1),
            (GuardState::Armed(_), false) => GuardState::Wiped,
        };
        self.state
    }

    /// Whether the threshold has been reached
    pub fn should_wipe(&self) -> bool {
        self.state == GuardState::Wiped
    }

    /// Return to `Armed(0)` after the shard has been re-provisioned
    pub fn rearm(&mut self) {
        self.state = GuardState::Armed(0);
    }

    pub fn state(&self) -> GuardState {
        self.state
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Failures left before the wipe fires
    pub fn attempts_remaining(&self) -> u32 {
        match self.state {
            GuardState::Armed(n) => self.threshold.saturating_sub(n),
            GuardState::Wiped => 0,
        }
    }
}
