//! Debugger hooks: the single-step switch and a breakpoint set.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::info;

use crate::events::{CpuEvent, Observer};

/// Shared flag that puts the runner into single-step mode.
#[derive(Debug, Clone, Default)]
pub struct DebugSwitch(Arc<AtomicBool>);

impl DebugSwitch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_on(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn set(&self, on: bool) {
        self.0.store(on, Ordering::Release);
    }
}

/// Addresses that stop free-running execution.
///
/// Subscribe [`Breakpoints::observer`] to the CPU. When an instruction lands
/// on a breakpoint the debug switch is turned on and the runner waits for
/// [`CpuRunner::debugger_step`](crate::CpuRunner::debugger_step).
#[derive(Debug, Clone)]
pub struct Breakpoints {
    addresses: Arc<Mutex<BTreeSet<u16>>>,
    switch: DebugSwitch,
}

impl Breakpoints {
    #[must_use]
    pub fn new(switch: DebugSwitch) -> Self {
        Self {
            addresses: Arc::default(),
            switch,
        }
    }

    /// Returns false if the breakpoint already existed.
    pub fn add(&self, addr: u16) -> bool {
        self.addresses.lock().insert(addr)
    }

    pub fn remove(&self, addr: u16) -> bool {
        self.addresses.lock().remove(&addr)
    }

    #[must_use]
    pub fn contains(&self, addr: u16) -> bool {
        self.addresses.lock().contains(&addr)
    }

    pub fn clear(&self) {
        self.addresses.lock().clear();
    }

    /// Breakpoints in address order.
    #[must_use]
    pub fn list(&self) -> Vec<u16> {
        self.addresses.lock().iter().copied().collect()
    }

    #[must_use]
    pub fn observer(&self) -> Observer {
        let addresses = Arc::clone(&self.addresses);
        let switch = self.switch.clone();
        Box::new(move |event, _| {
            let CpuEvent::Ticked { pc, .. } = event else {
                return;
            };
            if !switch.is_on() && addresses.lock().contains(pc) {
                switch.set(true);
                info!(pc = format_args!("{pc:04X}"), "breakpoint hit");
            }
        })
    }
}
