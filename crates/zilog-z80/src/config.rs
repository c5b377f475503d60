//! Timing environment for a [`Z80`](crate::Z80).

/// Default clock rate: the ZX Spectrum 48K's 3.5 MHz.
pub const DEFAULT_T_STATES_PER_SECOND: f64 = 3_494_400.0;

/// A ROM routine whose entry the host wants to intercept.
///
/// Fires when PC reaches `pc` and the bytes there equal `signature`, so a
/// different ROM at the same address doesn't trigger it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTrap {
    pub pc: u16,
    pub signature: Vec<u8>,
}

/// CPU timing and hook configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct CpuConfig {
    pub t_states_per_second: f64,
    /// Frame interrupt period. 0 disables the frame interrupt.
    pub t_states_per_interrupt: u32,
    /// Scanline period. 0 disables scanline notifications.
    pub t_states_per_scanline: u32,
    pub load_trap: Option<LoadTrap>,
}

impl CpuConfig {
    /// Spectrum 48K: 69,888 T-states per frame, 224 per line, and the tape
    /// loader's `LD-BYTES` entry at 0x0556.
    #[must_use]
    pub fn spectrum_48k() -> Self {
        Self {
            t_states_per_second: DEFAULT_T_STATES_PER_SECOND,
            t_states_per_interrupt: 69_888,
            t_states_per_scanline: 224,
            load_trap: Some(LoadTrap {
                pc: 0x0556,
                // INC D; EX AF,AF'; DEC D
                signature: vec![0x14, 0x08, 0x15],
            }),
        }
    }

    /// Number of scanlines in a frame, if both periods are set.
    #[must_use]
    pub fn scanlines_per_frame(&self) -> Option<u32> {
        (self.t_states_per_scanline > 0 && self.t_states_per_interrupt > 0)
            .then(|| self.t_states_per_interrupt / self.t_states_per_scanline)
    }
}

impl Default for CpuConfig {
    /// A bare CPU: no frame interrupt, no scanlines, no traps.
    fn default() -> Self {
        Self {
            t_states_per_second: DEFAULT_T_STATES_PER_SECOND,
            t_states_per_interrupt: 0,
            t_states_per_scanline: 0,
            load_trap: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spectrum_frame_has_312_lines() {
        assert_eq!(CpuConfig::spectrum_48k().scanlines_per_frame(), Some(312));
        assert_eq!(CpuConfig::default().scanlines_per_frame(), None);
    }
}
