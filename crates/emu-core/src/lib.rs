//! Core types shared by the emulator crates.
//!
//! A flat 64K memory with a protected ROM region, the port interface the CPU
//! drives on IN/OUT, real-time pacing against emulated T-states, and the
//! observability interface every component exposes for debugging.

mod clock;
mod memory;
mod observable;
mod ports;

pub use clock::{ClockPause, ClockSync, FAST_MULTIPLIER, PAUSED_SLEEP, Speed};
pub use memory::{MEMORY_SIZE, Memory, MemoryError};
pub use observable::{Observable, Value};
pub use ports::{NullPorts, PortHandler};
