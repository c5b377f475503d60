//! Notifications emitted by the CPU.

use std::sync::Arc;

use emu_core::Memory;
use parking_lot::Mutex;

/// Something a host may want to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CpuEvent {
    /// One instruction executed.
    Ticked { elapsed: u32, prev_pc: u16, pc: u16 },
    /// A maskable interrupt was accepted.
    InterruptFired,
    /// The beam moved onto a new line of the frame.
    RenderScanline { scanline: u16 },
    /// PC reached the configured load trap.
    LoadRequested,
    /// The runner's thread has stopped.
    PoweredOff,
}

/// Callback registered with [`Z80::subscribe`](crate::Z80::subscribe).
///
/// Called synchronously on the CPU thread, inside the step lock, with a
/// read view of memory.
pub type Observer = Box<dyn FnMut(&CpuEvent, &Memory) + Send>;

/// Registered observers.
#[derive(Default)]
pub(crate) struct Observers {
    list: Vec<Observer>,
}

impl Observers {
    pub(crate) fn push(&mut self, observer: Observer) {
        self.list.push(observer);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub(crate) fn emit(&mut self, event: &CpuEvent, memory: &Memory) {
        for observer in &mut self.list {
            observer(event, memory);
        }
    }
}

impl std::fmt::Debug for Observers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Observers({})", self.list.len())
    }
}

/// Records events for a host to drain between steps.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<CpuEvent>>>,
    skip_ticks: bool,
}

impl EventLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A log that ignores `Ticked`, which otherwise dominates.
    #[must_use]
    pub fn without_ticks() -> Self {
        Self {
            skip_ticks: true,
            ..Self::default()
        }
    }

    /// An observer feeding this log.
    #[must_use]
    pub fn observer(&self) -> Observer {
        let events = Arc::clone(&self.events);
        let skip_ticks = self.skip_ticks;
        Box::new(move |event, _| {
            if skip_ticks && matches!(event, CpuEvent::Ticked { .. }) {
                return;
            }
            events.lock().push(event.clone());
        })
    }

    /// Take everything recorded so far.
    pub fn drain(&self) -> Vec<CpuEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
