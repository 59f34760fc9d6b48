//! Timing state for one transit between gate A and gate B
//!
//! ```text
//! Idle --gate A--> Armed --gate B--> Completed --reset()--> Idle
//! ```
//!
//! Every other trigger is ignored. `t_stop` is only ever set after `t_start`,
//! and both come from the monotonic clock, so elapsed time is never negative.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    Idle,
    Armed,
    Completed,
}

impl PassState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassState::Idle => "idle",
            PassState::Armed => "armed",
            PassState::Completed => "completed",
        }
    }
}

#[derive(Debug, Default)]
pub struct PassTimer {
    t_start: Option<Instant>,
    t_stop: Option<Instant>,
}

impl PassTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PassState {
        match (self.t_start, self.t_stop) {
            (None, _) => PassState::Idle,
            (Some(_), None) => PassState::Armed,
            (Some(_), Some(_)) => PassState::Completed,
        }
    }

    /// Gate A fired. Starts a pass when idle; returns whether it did.
    pub fn start(&mut self, now: Instant) -> bool {
        if self.state() != PassState::Idle {
            return false;
        }
        self.t_start = Some(now);
        true
    }

    /// Gate B fired. Completes an armed pass; returns whether it did.
    pub fn stop(&mut self, now: Instant) -> bool {
        let Some(t_start) = self.t_start else {
            return false;
        };
        if self.t_stop.is_some() {
            return false;
        }
        // Instant is monotonic; clamp anyway so stop never precedes start
        self.t_stop = Some(now.max(t_start));
        true
    }

    /// `t_stop - t_start`, only once the pass is completed
    pub fn elapsed(&self) -> Option<Duration> {
        match (self.t_start, self.t_stop) {
            (Some(start), Some(stop)) => Some(stop.duration_since(start)),
            _ => None,
        }
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.t_start
    }

    pub fn reset(&mut self) {
        self.t_start = None;
        self.t_stop = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_idle() {
        let timer = PassTimer::new();
        assert_eq!(timer.state(), PassState::Idle);
        assert_eq!(timer.elapsed(), None);
    }

    #[test]
    fn test_full_cycle() {
        let mut timer = PassTimer::new();
        let t0 = Instant::now();

        assert!(timer.start(t0));
        assert_eq!(timer.state(), PassState::Armed);
        assert_eq!(timer.elapsed(), None);

        assert!(timer.stop(t0 + Duration::from_millis(30)));
        assert_eq!(timer.state(), PassState::Completed);
        assert_eq!(timer.elapsed(), Some(Duration::from_millis(30)));

        timer.reset();
        assert_eq!(timer.state(), PassState::Idle);
        assert_eq!(timer.started_at(), None);
    }

    #[test]
    fn test_stop_while_idle_is_ignored() {
        let mut timer = PassTimer::new();
        assert!(!timer.stop(Instant::now()));
        assert_eq!(timer.state(), PassState::Idle);
    }

    #[test]
    fn test_second_start_while_armed_is_ignored() {
        let mut timer = PassTimer::new();
        let t0 = Instant::now();
        timer.start(t0);
        assert!(!timer.start(t0 + Duration::from_millis(10)));
        assert_eq!(timer.started_at(), Some(t0));
    }

    #[test]
    fn test_completed_ignores_further_triggers() {
        let mut timer = PassTimer::new();
        let t0 = Instant::now();
        timer.start(t0);
        timer.stop(t0 + Duration::from_millis(40));

        assert!(!timer.start(t0 + Duration::from_millis(50)));
        assert!(!timer.stop(t0 + Duration::from_millis(60)));
        assert_eq!(timer.elapsed(), Some(Duration::from_millis(40)));
    }

    #[test]
    fn test_same_instant_gives_zero_elapsed() {
        let mut timer = PassTimer::new();
        let t0 = Instant::now();
        timer.start(t0);
        timer.stop(t0);
        assert_eq!(timer.elapsed(), Some(Duration::ZERO));
    }
}
