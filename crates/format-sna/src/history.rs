//! Rolling snapshot history.
//!
//! One snapshot per emulated second, oldest dropped past the capacity, so a
//! host can wind the machine back a few minutes.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info};
use zilog_z80::{CpuEvent, Observer, Z80};

use crate::{SnaError, SnaInfo, load_sna, save_sna};

/// Snapshots kept by [`CpuHistory::new`]: four minutes at one a second.
pub const HISTORY_CAPACITY: usize = 240;

/// Emulated seconds before the first snapshot after power-on or a clear.
const FIRST_SAMPLE_SECONDS: i64 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    #[error("no snapshot at index {index}, history holds {len}")]
    OutOfRange { index: usize, len: usize },
    #[error("stored snapshot rejected")]
    Snapshot(#[from] SnaError),
}

#[derive(Debug)]
struct Sample {
    t_states: u64,
    data: Vec<u8>,
}

#[derive(Debug)]
struct Shared {
    samples: Mutex<VecDeque<Sample>>,
    capacity: usize,
    t_states_per_sample: i64,
    until_next: AtomicI64,
    due: AtomicBool,
}

/// Bounded ring of 48K snapshots taken every emulated second.
///
/// Subscribe [`CpuHistory::observer`] to the CPU. It counts T-states and
/// marks a sample due once a second's worth has run. Observers only see
/// memory, so the host takes the snapshot itself with
/// [`CpuHistory::record_if_due`] while holding the CPU, typically from the
/// observer's callback via a channel.
#[derive(Debug, Clone)]
pub struct CpuHistory {
    shared: Arc<Shared>,
}

impl CpuHistory {
    #[must_use]
    pub fn new(t_states_per_second: f64) -> Self {
        Self::with_capacity(t_states_per_second, HISTORY_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(t_states_per_second: f64, capacity: usize) -> Self {
        let t_states_per_sample = (t_states_per_second as i64).max(1);
        Self {
            shared: Arc::new(Shared {
                samples: Mutex::new(VecDeque::with_capacity(capacity)),
                capacity,
                t_states_per_sample,
                until_next: AtomicI64::new(t_states_per_sample * FIRST_SAMPLE_SECONDS),
                due: AtomicBool::new(false),
            }),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.samples.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.samples.lock().is_empty()
    }

    /// Whether a second has passed since the last sample.
    #[must_use]
    pub fn is_due(&self) -> bool {
        self.shared.due.load(Ordering::Acquire)
    }

    /// CPU T-state count when sample `index` was taken, oldest first.
    #[must_use]
    pub fn t_states_at(&self, index: usize) -> Option<u64> {
        self.shared.samples.lock().get(index).map(|s| s.t_states)
    }

    /// Observer that marks a sample due every emulated second and calls
    /// `on_due` when it does.
    #[must_use]
    pub fn observer(&self, mut on_due: impl FnMut() + Send + 'static) -> Observer {
        let shared = Arc::clone(&self.shared);
        Box::new(move |event, _| {
            let CpuEvent::Ticked { elapsed, .. } = event else {
                return;
            };
            let elapsed = i64::from(*elapsed);
            if shared.until_next.fetch_sub(elapsed, Ordering::AcqRel) - elapsed > 0 {
                return;
            }
            shared
                .until_next
                .fetch_add(shared.t_states_per_sample, Ordering::AcqRel);
            shared.due.store(true, Ordering::Release);
            on_due();
        })
    }

    /// Snapshot `cpu` now, dropping the oldest sample if the ring is full.
    pub fn record(&self, cpu: &mut Z80, border: u8) {
        let t_states = cpu.t_states();
        let data = save_sna(cpu, border);
        let mut samples = self.shared.samples.lock();
        samples.push_back(Sample { t_states, data });
        while samples.len() > self.shared.capacity {
            samples.pop_front();
        }
        self.shared.due.store(false, Ordering::Release);
        let held = samples.len();
        cpu.log_sink().in_scope(|| debug!(t_states, held, "history sample"));
    }

    /// [`record`](Self::record) if a sample is due. Returns whether one was
    /// taken.
    pub fn record_if_due(&self, cpu: &mut Z80, border: u8) -> bool {
        if !self.shared.due.swap(false, Ordering::AcqRel) {
            return false;
        }
        self.record(cpu, border);
        true
    }

    /// Load sample `index` (0 is the oldest) into `cpu` and discard it and
    /// everything newer. Sampling restarts one second later.
    ///
    /// The CPU's T-state count restarts from zero, as with any snapshot load.
    ///
    /// # Errors
    ///
    /// Fails if there is no such sample or it no longer loads. The history is
    /// unchanged in both cases.
    pub fn restore(&self, cpu: &mut Z80, index: usize) -> Result<SnaInfo, HistoryError> {
        let mut samples = self.shared.samples.lock();
        let len = samples.len();
        let sample = samples
            .get(index)
            .ok_or(HistoryError::OutOfRange { index, len })?;
        let sna = load_sna(cpu, &sample.data)?;
        let t_states = sample.t_states;

        samples.truncate(index);
        self.restart_countdown();
        cpu.log_sink()
            .in_scope(|| info!(index, t_states, dropped = len - index, "history restored"));
        Ok(sna)
    }

    /// Wind back roughly `seconds` of emulated time. The oldest sample is
    /// used if the history is shorter than that.
    ///
    /// # Errors
    ///
    /// Fails if the history is empty or the sample no longer loads.
    pub fn restore_seconds_ago(
        &self,
        cpu: &mut Z80,
        seconds: usize,
    ) -> Result<SnaInfo, HistoryError> {
        let index = self.len().saturating_sub(seconds);
        self.restore(cpu, index)
    }

    /// Drop every sample, as after a new program is loaded.
    pub fn clear(&self) {
        self.shared.samples.lock().clear();
        self.restart_countdown();
    }

    fn restart_countdown(&self) {
        self.shared
            .until_next
            .store(self.shared.t_states_per_sample, Ordering::Release);
        self.shared.due.store(false, Ordering::Release);
    }
}
