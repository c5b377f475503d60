//! ULA port decoding.
//!
//! The ULA answers any port with A0 low. Writes set the border (bits 0-2),
//! MIC (bit 3) and the beeper (bit 4). Reads return the keyboard half-rows
//! selected by the high address byte, with EAR in bit 6. Nothing else is
//! attached, so every other port floats high.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use emu_core::PortHandler;
use parking_lot::{Mutex, MutexGuard};

use crate::keyboard::KeyboardState;

const BORDER_MASK: u8 = 0x07;
const MIC_BIT: u8 = 0x08;
const BEEPER_BIT: u8 = 0x10;
const EAR_BIT: u8 = 0x40;

/// Port handler for the 48K ULA.
///
/// Clones share state: install one in the CPU and keep another to watch the
/// border and drive the keyboard from the host.
#[derive(Debug, Clone, Default)]
pub struct UlaPorts {
    last_write: Arc<AtomicU8>,
    keyboard: Arc<Mutex<KeyboardState>>,
}

impl UlaPorts {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current border colour, 0-7.
    #[must_use]
    pub fn border(&self) -> u8 {
        self.last_write.load(Ordering::Acquire) & BORDER_MASK
    }

    /// Set the border without an `OUT`, as a snapshot load does.
    pub fn set_border(&self, colour: u8) {
        self.last_write
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                Some((last & !BORDER_MASK) | (colour & BORDER_MASK))
            })
            .ok();
    }

    /// Whether the last `OUT` left the speaker cone pushed out.
    #[must_use]
    pub fn beeper(&self) -> bool {
        self.last_write.load(Ordering::Acquire) & BEEPER_BIT != 0
    }

    pub fn keyboard(&self) -> MutexGuard<'_, KeyboardState> {
        self.keyboard.lock()
    }
}

impl PortHandler for UlaPorts {
    fn read_port(&mut self, port: u16) -> u8 {
        if port & 0x0001 != 0 {
            return 0xFF;
        }
        let keys = self.keyboard.lock().read((port >> 8) as u8);
        // With no tape playing, EAR follows the MIC output.
        let ear = if self.last_write.load(Ordering::Acquire) & MIC_BIT != 0 {
            EAR_BIT
        } else {
            0
        };
        (keys & !EAR_BIT) | ear
    }

    fn write_port(&mut self, port: u8, value: u8) {
        if port & 0x01 == 0 {
            self.last_write.store(value, Ordering::Release);
        }
    }
}
