//! Tick-driven timers for the live session loop.
//!
//! Both timers advance by whole seconds: the driver owns the 1 Hz clock and
//! calls `tick()` once per second. Keeping them free of wall-clock reads makes
//! the phase machine deterministic under test.

/// Seconds-remaining marks at which a countdown emits an audible cue.
pub const CUE_SECONDS: [u32; 4] = [5, 3, 2, 1];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Running,
    Done,
    Cancelled,
}

/// What a single `tick()` produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// Cue marks crossed on this tick, highest first.
    pub cues: Vec<u32>,
    pub completed: bool,
}

/// One-second countdown with cue marks and a fire-once completion.
///
/// The owner holds at most one countdown per kind; replacing the `Option`
/// it lives in is how a new run supersedes the old one.
#[derive(Debug, Clone)]
pub struct Countdown {
    remaining: u32,
    planned: u32,
    paused: bool,
    state: State,
    pending_cues: Vec<u32>,
}

impl Countdown {
    /// Begin a countdown. The second element is true when `duration_seconds`
    /// was zero or negative-equivalent and the run completed on the spot.
    pub fn start(duration_seconds: u32) -> (Self, bool) {
        let done = duration_seconds == 0;
        let timer = Countdown {
            remaining: duration_seconds,
            planned: duration_seconds,
            paused: false,
            state: if done { State::Done } else { State::Running },
            // Marks at or above the starting value can never be crossed.
            pending_cues: CUE_SECONDS
                .iter()
                .copied()
                .filter(|&c| c < duration_seconds)
                .collect(),
        };
        (timer, done)
    }

    /// Advance one second. No-op while paused or after completion/cancel.
    pub fn tick(&mut self) -> TickOutcome {
        if self.paused || self.state != State::Running {
            return TickOutcome::default();
        }

        self.remaining = self.remaining.saturating_sub(1);

        let cues: Vec<u32> = self
            .pending_cues
            .iter()
            .copied()
            .filter(|&c| c >= self.remaining)
            .collect();
        self.pending_cues.retain(|&c| c < self.remaining);

        let completed = self.remaining == 0;
        if completed {
            self.state = State::Done;
        }

        TickOutcome { cues, completed }
    }

    /// Finish immediately. Returns true when the completion actually fired
    /// now; a second call, or a call after cancel, is a no-op.
    pub fn skip(&mut self) -> bool {
        if self.state != State::Running {
            return false;
        }
        self.remaining = 0;
        self.state = State::Done;
        true
    }

    /// Stop the run without firing completion.
    pub fn cancel(&mut self) {
        if self.state == State::Running {
            self.state = State::Cancelled;
        }
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn planned(&self) -> u32 {
        self.planned
    }

    pub fn is_running(&self) -> bool {
        self.state == State::Running
    }
}

/// One-second count-up tracking total session time.
#[derive(Debug, Clone, Default)]
pub struct Elapsed {
    seconds: u64,
    paused: bool,
}

impl Elapsed {
    pub fn new() -> Self {
        Elapsed::default()
    }

    pub fn tick(&mut self) -> u64 {
        if !self.paused {
            self.seconds += 1;
        }
        self.seconds
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn seconds(&self) -> u64 {
        self.seconds
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(timer: &mut Countdown, secs: u32) -> Vec<TickOutcome> {
        (0..secs).map(|_| timer.tick()).collect()
    }

    #[test]
    fn counts_down_and_completes_once() {
        let (mut t, done) = Countdown::start(3);
        assert!(!done);

        let outcomes = drain(&mut t, 3);
        assert!(!outcomes[0].completed);
        assert!(!outcomes[1].completed);
        assert!(outcomes[2].completed);

        // Further ticks are inert.
        assert_eq!(t.tick(), TickOutcome::default());
        assert_eq!(t.remaining(), 0);
    }

    #[test]
    fn cues_fire_at_most_once_each() {
        let (mut t, _) = Countdown::start(7);
        let outcomes = drain(&mut t, 7);

        let fired: Vec<u32> = outcomes.iter().flat_map(|o| o.cues.clone()).collect();
        assert_eq!(fired, vec![5, 3, 2, 1]);
    }

    #[test]
    fn cues_above_start_value_never_fire() {
        let (mut t, _) = Countdown::start(3);
        let fired: Vec<u32> = drain(&mut t, 3)
            .iter()
            .flat_map(|o| o.cues.clone())
            .collect();
        assert_eq!(fired, vec![2, 1]);
    }

    #[test]
    fn zero_duration_completes_on_start() {
        let (mut t, done) = Countdown::start(0);
        assert!(done);
        assert!(!t.is_running());
        // The completion already fired; skip must not fire it again.
        assert!(!t.skip());
    }

    #[test]
    fn skip_is_idempotent() {
        let (mut t, _) = Countdown::start(60);
        assert!(t.skip());
        assert!(!t.skip());
        assert_eq!(t.tick(), TickOutcome::default());
    }

    #[test]
    fn skip_after_cancel_is_inert() {
        let (mut t, _) = Countdown::start(60);
        t.cancel();
        assert!(!t.skip());
        assert_eq!(t.tick(), TickOutcome::default());
    }

    #[test]
    fn pause_freezes_remaining() {
        let (mut t, _) = Countdown::start(10);
        t.tick();
        t.pause();
        drain(&mut t, 5);
        assert_eq!(t.remaining(), 9);
        t.resume();
        t.tick();
        assert_eq!(t.remaining(), 8);
    }

    #[test]
    fn elapsed_pause_freezes_count() {
        let mut e = Elapsed::new();
        for _ in 0..4 {
            e.tick();
        }
        e.pause();
        for _ in 0..100 {
            e.tick();
        }
        e.resume();
        e.tick();
        assert_eq!(e.seconds(), 5);
    }
}
