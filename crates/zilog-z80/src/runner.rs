//! Threaded execution.
//!
//! [`CpuRunner`] owns a [`Z80`] behind the step lock and drives it from a
//! dedicated thread, pacing against wall time with [`ClockSync`]. Shutdown
//! is cooperative: every wait in the loop is bounded and re-checks the
//! shutdown flag, so [`CpuRunner::power_off`] always returns.

use std::io;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use emu_core::{ClockPause, ClockSync, Speed};
use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{error, info};

use crate::cpu::Z80;
use crate::debugger::DebugSwitch;
use crate::error::CpuError;
use crate::log::LogSink;

/// Bound on the debugger step wait.
const STEP_WAIT: Duration = Duration::from_millis(100);

/// What the CPU thread is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuState {
    Idle,
    Running,
    Halted,
    DebugStepping,
}

/// Auto-reset event used to single-step.
#[derive(Debug, Default)]
struct StepSignal {
    pending: Mutex<bool>,
    cond: Condvar,
}

impl StepSignal {
    fn signal(&self) {
        *self.pending.lock() = true;
        self.cond.notify_one();
    }

    fn clear(&self) {
        *self.pending.lock() = false;
    }

    /// Wait up to `timeout`; true if a step was signalled.
    fn wait(&self, timeout: Duration) -> bool {
        let mut pending = self.pending.lock();
        if !*pending {
            self.cond.wait_for(&mut pending, timeout);
        }
        std::mem::take(&mut *pending)
    }
}

struct Shared {
    core: Mutex<Z80>,
    clock: ClockSync,
    /// Mirror of the core's T-state count for pacing without the lock.
    t_states: AtomicU64,
    shutdown: AtomicBool,
    reset_requested: AtomicBool,
    running: AtomicBool,
    halted: AtomicBool,
    debug: DebugSwitch,
    step_signal: StepSignal,
    error: Mutex<Option<CpuError>>,
    log: LogSink,
    thread_id: Mutex<Option<ThreadId>>,
}

/// Power, reset, speed and debugger control for a CPU on its own thread.
pub struct CpuRunner {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl CpuRunner {
    /// Wrap `core`. Nothing runs until [`CpuRunner::power_on`].
    #[must_use]
    pub fn new(core: Z80) -> Self {
        let clock = ClockSync::new(core.config().t_states_per_second);
        let log = core.log_sink().clone();
        Self {
            shared: Arc::new(Shared {
                core: Mutex::new(core),
                clock,
                t_states: AtomicU64::new(0),
                shutdown: AtomicBool::new(false),
                reset_requested: AtomicBool::new(false),
                running: AtomicBool::new(false),
                halted: AtomicBool::new(false),
                debug: DebugSwitch::new(),
                step_signal: StepSignal::default(),
                error: Mutex::new(None),
                log,
                thread_id: Mutex::new(None),
            }),
            thread: Mutex::new(None),
        }
    }

    /// Clear the registers and start the CPU thread. Does nothing if it is
    /// already running.
    ///
    /// # Errors
    ///
    /// Fails if the thread can't be spawned.
    pub fn power_on(&self) -> io::Result<()> {
        let mut thread = self.thread.lock();
        if self.shared.running.load(Ordering::Acquire) {
            return Ok(());
        }
        if let Some(stale) = thread.take()
            && stale.join().is_err()
        {
            // Finished on its own, but not cleanly.
            self.shared.log.in_scope(|| error!("previous CPU thread panicked"));
        }

        self.shared.core.lock().reset();
        self.shared.t_states.store(0, Ordering::Release);
        self.shared.clock.reset(0);
        self.shared.shutdown.store(false, Ordering::Release);
        self.shared.reset_requested.store(false, Ordering::Release);
        self.shared.running.store(true, Ordering::Release);

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("z80-cpu".into())
            .spawn(move || run(&shared));
        match spawned {
            Ok(handle) => *thread = Some(handle),
            Err(err) => {
                self.shared.running.store(false, Ordering::Release);
                return Err(err);
            }
        }
        self.shared.log.in_scope(|| info!("CPU powered on"));
        Ok(())
    }

    /// Stop the CPU thread and wait for it to finish.
    ///
    /// Safe to call from an observer on the CPU thread itself; the thread
    /// then stops after the current step and is not joined.
    pub fn power_off(&self) {
        self.shared.reset_requested.store(false, Ordering::Release);
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.step_signal.signal();

        if *self.shared.thread_id.lock() == Some(thread::current().id()) {
            return;
        }
        let handle = self.thread.lock().take();
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            self.shared.log.in_scope(|| error!("CPU thread panicked"));
        }
    }

    /// Reset the CPU. When running, the loop restarts from a cleared
    /// register file without waiting here.
    pub fn reset(&self) {
        if self.shared.running.load(Ordering::Acquire) {
            self.shared.reset_requested.store(true, Ordering::Release);
            self.shared.shutdown.store(true, Ordering::Release);
            self.shared.step_signal.signal();
        } else {
            self.shared.core.lock().reset();
            self.shared.t_states.store(0, Ordering::Release);
        }
    }

    pub fn set_speed(&self, speed: Speed) {
        let t_states = self.shared.t_states.load(Ordering::Acquire);
        self.shared.log.in_scope(|| self.shared.clock.set_speed(speed, t_states));
    }

    #[must_use]
    pub fn speed(&self) -> Speed {
        self.shared.clock.speed()
    }

    /// Execute one instruction while debugging.
    pub fn debugger_step(&self) {
        self.shared.step_signal.signal();
    }

    pub fn set_debugging(&self, on: bool) {
        if on {
            self.shared.step_signal.clear();
            self.shared.debug.set(true);
        } else {
            self.shared.debug.set(false);
            // Free-running again; resync so the loop doesn't sprint.
            let t_states = self.shared.t_states.load(Ordering::Acquire);
            self.shared.clock.reset(t_states);
            self.shared.step_signal.signal();
        }
    }

    #[must_use]
    pub fn is_debugging(&self) -> bool {
        self.shared.debug.is_on()
    }

    /// The switch breakpoints flip, shared with this runner.
    #[must_use]
    pub fn debug_switch(&self) -> DebugSwitch {
        self.shared.debug.clone()
    }

    #[must_use]
    pub fn state(&self) -> CpuState {
        if !self.shared.running.load(Ordering::Acquire) {
            CpuState::Idle
        } else if self.shared.debug.is_on() {
            CpuState::DebugStepping
        } else if self.shared.halted.load(Ordering::Acquire) {
            CpuState::Halted
        } else {
            CpuState::Running
        }
    }

    /// Take the step lock. The CPU thread blocks until the guard drops.
    pub fn lock(&self) -> MutexGuard<'_, Z80> {
        self.shared.core.lock()
    }

    /// Take the step lock and freeze pacing, for longer external work such
    /// as loading a snapshot.
    ///
    /// If the work moves the core's T-state count, pacing restarts from the
    /// new count when the guard drops.
    pub fn pause(&self) -> CpuPause<'_> {
        let clock = self.shared.clock.pause();
        CpuPause {
            core: self.shared.core.lock(),
            shared: &self.shared,
            _clock: clock,
        }
    }

    /// The error that stopped the CPU thread, if any.
    pub fn take_error(&self) -> Option<CpuError> {
        self.shared.error.lock().take()
    }
}

impl Drop for CpuRunner {
    fn drop(&mut self) {
        self.power_off();
    }
}

/// Exclusive access to the CPU with pacing frozen. Derefs to [`Z80`].
pub struct CpuPause<'a> {
    core: MutexGuard<'a, Z80>,
    shared: &'a Shared,
    _clock: ClockPause<'a>,
}

impl Drop for CpuPause<'_> {
    fn drop(&mut self) {
        let t_states = self.core.t_states();
        if self.shared.t_states.swap(t_states, Ordering::AcqRel) != t_states {
            self.shared.clock.reset(t_states);
        }
    }
}

impl Deref for CpuPause<'_> {
    type Target = Z80;

    fn deref(&self) -> &Z80 {
        &self.core
    }
}

impl DerefMut for CpuPause<'_> {
    fn deref_mut(&mut self) -> &mut Z80 {
        &mut self.core
    }
}

fn run(shared: &Shared) {
    *shared.thread_id.lock() = Some(thread::current().id());
    shared.log.in_scope(|| run_loop(shared));
    *shared.thread_id.lock() = None;
}

fn run_loop(shared: &Shared) {
    loop {
        if shared.shutdown.load(Ordering::Acquire) {
            if shared.reset_requested.swap(false, Ordering::AcqRel) {
                shared.shutdown.store(false, Ordering::Release);
                shared.core.lock().reset();
                shared.t_states.store(0, Ordering::Release);
                shared.clock.reset(0);
                info!("CPU reset");
                continue;
            }
            break;
        }

        if shared.debug.is_on() {
            if !shared.step_signal.wait(STEP_WAIT) {
                continue;
            }
            if shared.shutdown.load(Ordering::Acquire) {
                continue;
            }
        } else if !shared.clock.sync_with_real_time(shared.t_states.load(Ordering::Acquire)) {
            continue;
        }

        let result = {
            let mut core = shared.core.lock();
            let result = core.step();
            shared.t_states.store(core.t_states(), Ordering::Release);
            shared.halted.store(core.is_halted(), Ordering::Release);
            result
        };

        if let Err(err) = result {
            error!(%err, "CPU stopped");
            *shared.error.lock() = Some(err);
            shared.reset_requested.store(false, Ordering::Release);
            shared.shutdown.store(true, Ordering::Release);
        }
    }

    shared.running.store(false, Ordering::Release);
    shared.core.lock().notify_powered_off();
    info!("CPU powered off");
}
