use std::time::Duration;

/// Wait budgets for the driver. Passed explicitly at construction; there is
/// no ambient/global timeout state.
#[derive(Debug, Clone)]
pub struct Timeouts {
    /// Full budget for presence and committed-state convergence waits.
    pub default_wait: Duration,
    /// Budget for the short absence polls between close attempts.
    pub short_wait: Duration,
    /// Budget for open-state marker waits before clicking the open target.
    pub state_wait: Duration,
    /// Delay between predicate re-evaluations.
    pub poll_interval: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            default_wait: Duration::from_secs(5),
            short_wait: Duration::from_secs(1),
            state_wait: Duration::from_secs(3),
            poll_interval: Duration::from_millis(100),
        }
    }
}
