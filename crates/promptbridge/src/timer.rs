use std::time::Duration;
use tokio::time::Instant;

/// State of the debounce timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Nothing scheduled
    Idle,
    /// Will fire once `fire_at` is reached
    Armed { fire_at: Instant },
}

/// Single-shot timer that can be rearmed after it fires.
///
/// Arming an armed timer keeps the original deadline, so a burst of arms
/// fires once, one interval after the first of them.
#[derive(Debug, Clone)]
pub struct Debounce {
    interval: Duration,
    state: State,
}

impl Debounce {
    /// Create an idle timer
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            state: State::Idle,
        }
    }

    /// Arm the timer. Returns false if it was already armed.
    pub fn arm(&mut self, now: Instant) -> bool {
        match self.state {
            State::Armed { .. } => false,
            State::Idle => {
                self.state = State::Armed {
                    fire_at: now + self.interval,
                };
                true
            }
        }
    }

    /// Disarm the timer. Returns false if it was idle.
    pub fn cancel(&mut self) -> bool {
        let was_armed = self.is_armed();
        self.state = State::Idle;
        was_armed
    }

    /// Fire if the deadline has passed, returning to idle.
    pub fn tick(&mut self, now: Instant) -> bool {
        match self.state {
            State::Armed { fire_at } if now >= fire_at => {
                self.state = State::Idle;
                true
            }
            _ => false,
        }
    }

    /// When the timer will fire, if armed
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            State::Armed { fire_at } => Some(fire_at),
            State::Idle => None,
        }
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state, State::Armed { .. })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}
