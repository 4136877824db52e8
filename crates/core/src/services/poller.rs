use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// The poller's timer. At most one fetch is ever scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Polling {
        next_fetch: Instant,
        /// The first cycle after a (re)start was caused by the user and
        /// reports failures on the form; later cycles only log.
        foreground: bool,
    },
}

/// A cycle that is due now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueCycle {
    pub foreground: bool,
}

/// Re-fetches the quote of whichever tab is active, while that tab has
/// auto-pricing on and a symbol.
#[derive(Debug)]
pub struct ActiveTabPoller {
    state: PollerState,
    interval: Duration,
}

impl ActiveTabPoller {
    pub fn new(interval: Duration) -> Self {
        Self {
            state: PollerState::Idle,
            interval,
        }
    }

    pub fn state(&self) -> PollerState {
        self.state
    }

    pub fn is_polling(&self) -> bool {
        matches!(self.state, PollerState::Polling { .. })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Apply the transition rule after anything that may have changed the
    /// active tab or its wish for auto-pricing.
    ///
    /// Wanted → start, or restart from scratch if already polling, with the
    /// first fetch due immediately. Not wanted → stop.
    pub fn reevaluate(&mut self, wants_auto_price: bool, now: Instant) {
        if wants_auto_price {
            if self.is_polling() {
                debug!("restarting quote poller");
            } else {
                debug!("starting quote poller");
            }
            self.state = PollerState::Polling {
                next_fetch: now,
                foreground: true,
            };
        } else {
            self.stop();
        }
    }

    pub fn stop(&mut self) {
        if self.is_polling() {
            debug!("stopping quote poller");
        }
        self.state = PollerState::Idle;
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match self.state {
            PollerState::Idle => None,
            PollerState::Polling { next_fetch, .. } => Some(next_fetch),
        }
    }

    /// The cycle due at `now`, if any. Does not change state.
    pub fn due(&self, now: Instant) -> Option<DueCycle> {
        match self.state {
            PollerState::Polling {
                next_fetch,
                foreground,
            } if next_fetch <= now => Some(DueCycle { foreground }),
            _ => None,
        }
    }

    /// Schedule the next background cycle one interval after `now`.
    /// Ignored if the poller was stopped meanwhile.
    pub fn complete_cycle(&mut self, now: Instant) {
        if self.is_polling() {
            self.state = PollerState::Polling {
                next_fetch: now + self.interval,
                foreground: false,
            };
        }
    }
}
