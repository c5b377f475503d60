//! Real-time pacing.
//!
//! The emulated CPU runs far faster than the hardware it models, so after
//! each instruction the run loop asks [`ClockSync`] to hold it back until wall
//! time has caught up with emulated time. The mapping restarts from zero on
//! every speed change or reset.

use std::fmt;
use std::str::FromStr;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::info;

/// Emulated seconds per wall second at [`Speed::Fast`].
pub const FAST_MULTIPLIER: f64 = 2.0;

/// How long a paused run loop sleeps before checking back.
pub const PAUSED_SLEEP: Duration = Duration::from_millis(100);

/// Upper bound on a single pacing wait.
const MAX_WAIT: Duration = Duration::from_millis(100);

/// Below this the wait spins instead of sleeping.
const SPIN_THRESHOLD: Duration = Duration::from_millis(1);

/// Emulation speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Speed {
    /// Real hardware speed.
    #[default]
    Actual,
    /// [`FAST_MULTIPLIER`] times hardware speed.
    Fast,
    /// No pacing at all.
    Maximum,
    /// No instructions execute.
    Paused,
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Speed::Actual => "actual",
            Speed::Fast => "fast",
            Speed::Maximum => "maximum",
            Speed::Paused => "paused",
        };
        f.write_str(name)
    }
}

impl FromStr for Speed {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "actual" => Ok(Speed::Actual),
            "fast" => Ok(Speed::Fast),
            "maximum" | "max" => Ok(Speed::Maximum),
            "paused" => Ok(Speed::Paused),
            other => Err(format!("unknown speed '{other}' (expected actual, fast, maximum or paused)")),
        }
    }
}

/// A stopwatch that can be stopped and resumed without losing time.
#[derive(Debug)]
struct Stopwatch {
    accumulated: Duration,
    started: Option<Instant>,
}

impl Stopwatch {
    fn started() -> Self {
        Self {
            accumulated: Duration::ZERO,
            started: Some(Instant::now()),
        }
    }

    fn elapsed(&self) -> Duration {
        self.accumulated + self.started.map_or(Duration::ZERO, |t| t.elapsed())
    }

    fn stop(&mut self) {
        if let Some(t) = self.started.take() {
            self.accumulated += t.elapsed();
        }
    }

    fn start(&mut self) {
        if self.started.is_none() {
            self.started = Some(Instant::now());
        }
    }

    /// Zero the count, keeping the running/stopped state.
    fn restart(&mut self) {
        self.accumulated = Duration::ZERO;
        if self.started.is_some() {
            self.started = Some(Instant::now());
        }
    }
}

#[derive(Debug)]
struct SyncState {
    speed: Speed,
    t_states_at_speed_change: u64,
    stopwatch: Stopwatch,
    pause_depth: u32,
}

/// Paces emulated T-states against wall time.
#[derive(Debug)]
pub struct ClockSync {
    t_states_per_second: f64,
    state: Mutex<SyncState>,
}

impl ClockSync {
    #[must_use]
    pub fn new(t_states_per_second: f64) -> Self {
        Self {
            t_states_per_second,
            state: Mutex::new(SyncState {
                speed: Speed::default(),
                t_states_at_speed_change: 0,
                stopwatch: Stopwatch::started(),
                pause_depth: 0,
            }),
        }
    }

    #[must_use]
    pub fn t_states_per_second(&self) -> f64 {
        self.t_states_per_second
    }

    #[must_use]
    pub fn speed(&self) -> Speed {
        self.state.lock().speed
    }

    /// Change speed. Pacing restarts from `t_states`.
    pub fn set_speed(&self, speed: Speed, t_states: u64) {
        let mut state = self.state.lock();
        if state.speed != speed {
            info!(%speed, "emulation speed changed");
        }
        state.speed = speed;
        state.t_states_at_speed_change = t_states;
        state.stopwatch.restart();
    }

    /// Restart pacing from `t_states` at the current speed.
    pub fn reset(&self, t_states: u64) {
        let mut state = self.state.lock();
        state.t_states_at_speed_change = t_states;
        state.stopwatch.restart();
    }

    /// How far emulated time at `t_states` runs ahead of wall time.
    ///
    /// Zero when wall time has caught up, or when the speed does not pace.
    #[must_use]
    pub fn time_ahead(&self, t_states: u64) -> Duration {
        let state = self.state.lock();
        let multiplier = match state.speed {
            Speed::Actual => 1.0,
            Speed::Fast => FAST_MULTIPLIER,
            Speed::Maximum | Speed::Paused => return Duration::ZERO,
        };

        let emulated_t_states = t_states.saturating_sub(state.t_states_at_speed_change);
        let emulated =
            Duration::from_secs_f64(emulated_t_states as f64 / (self.t_states_per_second * multiplier));
        emulated.saturating_sub(state.stopwatch.elapsed())
    }

    /// Block until wall time has caught up with `t_states`.
    ///
    /// Returns `true` when the caller may execute the next instruction. A
    /// `false` return means the clock is paused or the bounded wait expired;
    /// the caller should re-check its shutdown flag and call again.
    pub fn sync_with_real_time(&self, t_states: u64) -> bool {
        let deadline = Instant::now() + MAX_WAIT;
        loop {
            match self.speed() {
                Speed::Maximum => return true,
                Speed::Paused => {
                    thread::sleep(PAUSED_SLEEP);
                    return false;
                }
                Speed::Actual | Speed::Fast => {}
            }

            let ahead = self.time_ahead(t_states);
            if ahead.is_zero() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            if ahead > SPIN_THRESHOLD {
                thread::sleep(SPIN_THRESHOLD);
            } else {
                std::hint::spin_loop();
            }
        }
    }

    /// Freeze the pacing stopwatch until the returned guard drops.
    ///
    /// Used around anything that holds the CPU for a while (snapshot loads,
    /// state saves) so the loop doesn't sprint to catch up afterwards.
    /// Guards nest.
    #[must_use]
    pub fn pause(&self) -> ClockPause<'_> {
        let mut state = self.state.lock();
        state.pause_depth += 1;
        if state.pause_depth == 1 {
            state.stopwatch.stop();
        }
        ClockPause { clock: self }
    }
}

/// Scoped stopwatch freeze returned by [`ClockSync::pause`].
#[derive(Debug)]
pub struct ClockPause<'a> {
    clock: &'a ClockSync,
}

impl Drop for ClockPause<'_> {
    fn drop(&mut self) {
        let mut state = self.clock.state.lock();
        state.pause_depth = state.pause_depth.saturating_sub(1);
        if state.pause_depth == 0 {
            state.stopwatch.start();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPECTRUM_HZ: f64 = 3_500_000.0;

    #[test]
    fn maximum_speed_never_waits() {
        let clock = ClockSync::new(SPECTRUM_HZ);
        clock.set_speed(Speed::Maximum, 0);
        let start = Instant::now();
        assert!(clock.sync_with_real_time(350_000_000));
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn actual_speed_waits_for_wall_time() {
        let clock = ClockSync::new(SPECTRUM_HZ);
        clock.set_speed(Speed::Actual, 0);
        // 35,000 T-states is 10 ms of emulated time.
        let start = Instant::now();
        assert!(clock.sync_with_real_time(35_000));
        assert!(start.elapsed() >= Duration::from_millis(9));
    }

    #[test]
    fn fast_speed_halves_the_wait() {
        let clock = ClockSync::new(SPECTRUM_HZ);
        clock.set_speed(Speed::Fast, 0);
        let ahead = clock.time_ahead(70_000);
        assert!(ahead <= Duration::from_millis(10));
        assert!(ahead > Duration::from_millis(5));
    }

    #[test]
    fn speed_change_rebases_the_mapping() {
        let clock = ClockSync::new(SPECTRUM_HZ);
        clock.set_speed(Speed::Actual, 7_000_000);
        assert_eq!(clock.time_ahead(7_000_000), Duration::ZERO);
        assert!(clock.time_ahead(7_035_000) > Duration::from_millis(5));
    }

    #[test]
    fn paused_speed_refuses_to_proceed() {
        let clock = ClockSync::new(SPECTRUM_HZ);
        clock.set_speed(Speed::Paused, 0);
        assert!(!clock.sync_with_real_time(0));
        assert_eq!(clock.time_ahead(1_000_000), Duration::ZERO);
    }

    #[test]
    fn pause_guard_freezes_elapsed_time() {
        let clock = ClockSync::new(SPECTRUM_HZ);
        clock.set_speed(Speed::Actual, 0);
        let before = {
            let _outer = clock.pause();
            let _inner = clock.pause();
            let before = clock.time_ahead(350_000);
            thread::sleep(Duration::from_millis(20));
            assert_eq!(clock.time_ahead(350_000), before);
            before
        };
        thread::sleep(Duration::from_millis(20));
        assert!(clock.time_ahead(350_000) < before);
    }

    #[test]
    fn speed_parses_from_cli_names() {
        assert_eq!("Maximum".parse::<Speed>(), Ok(Speed::Maximum));
        assert_eq!("max".parse::<Speed>(), Ok(Speed::Maximum));
        assert_eq!(Speed::Fast.to_string(), "fast");
        assert!("warp".parse::<Speed>().is_err());
    }
}
