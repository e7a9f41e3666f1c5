/// Outcome of a single countdown tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Running { remaining_seconds: u32 },
    /// Reported once, on the tick that reaches zero.
    Expired,
    /// The countdown already expired or was cancelled.
    Halted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CountdownState {
    Running,
    Expired,
    Cancelled,
}

/// One-second resolution countdown. Drift is the caller's problem: each
/// `tick()` is one second regardless of wall-clock time.
#[derive(Debug, Clone)]
pub struct Countdown {
    total_seconds: u32,
    remaining_seconds: u32,
    state: CountdownState,
}

impl Countdown {
    pub fn new(total_seconds: u32) -> Self {
        Self {
            total_seconds,
            remaining_seconds: total_seconds,
            state: CountdownState::Running,
        }
    }

    pub fn tick(&mut self) -> TickOutcome {
        if self.state != CountdownState::Running {
            return TickOutcome::Halted;
        }

        self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
        if self.remaining_seconds == 0 {
            self.state = CountdownState::Expired;
            return TickOutcome::Expired;
        }

        TickOutcome::Running {
            remaining_seconds: self.remaining_seconds,
        }
    }

    /// Stops the countdown; a cancelled countdown never reports `Expired`.
    pub fn cancel(&mut self) {
        if self.state == CountdownState::Running {
            self.state = CountdownState::Cancelled;
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == CountdownState::Running
    }

    pub fn is_expired(&self) -> bool {
        self.state == CountdownState::Expired
    }

    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    pub fn total_seconds(&self) -> u32 {
        self.total_seconds
    }

    pub fn elapsed_seconds(&self) -> u32 {
        self.total_seconds - self.remaining_seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_down_and_expires_once() {
        let mut countdown = Countdown::new(3);

        assert_eq!(
            countdown.tick(),
            TickOutcome::Running {
                remaining_seconds: 2
            }
        );
        assert_eq!(
            countdown.tick(),
            TickOutcome::Running {
                remaining_seconds: 1
            }
        );
        assert_eq!(countdown.tick(), TickOutcome::Expired);
        assert_eq!(countdown.tick(), TickOutcome::Halted);
        assert_eq!(countdown.tick(), TickOutcome::Halted);
        assert!(countdown.is_expired());
        assert_eq!(countdown.remaining_seconds(), 0);
        assert_eq!(countdown.elapsed_seconds(), 3);
    }

    #[test]
    fn cancel_suppresses_expiry() {
        let mut countdown = Countdown::new(2);
        countdown.tick();
        countdown.cancel();

        assert_eq!(countdown.tick(), TickOutcome::Halted);
        assert!(!countdown.is_expired());
        assert!(!countdown.is_running());
        assert_eq!(countdown.remaining_seconds(), 1);
    }

    #[test]
    fn cancel_after_expiry_keeps_expired_state() {
        let mut countdown = Countdown::new(1);
        assert_eq!(countdown.tick(), TickOutcome::Expired);
        countdown.cancel();
        assert!(countdown.is_expired());
    }

    #[test]
    fn zero_length_countdown_expires_on_first_tick() {
        let mut countdown = Countdown::new(0);
        assert_eq!(countdown.tick(), TickOutcome::Expired);
    }
}
