//! Headless ZX Spectrum 48K.
//!
//! Wires the Z80 core to a 16K ROM, the ULA's port $FE (border and
//! keyboard) and the 48K frame timing: 69,888 T-states per frame, 224 per
//! scanline. There is no display or sound; the host reports through logs.

mod config;
mod keyboard;
mod machine;
mod ports;

pub use config::{Program, SpectrumConfig, parse_address};
pub use keyboard::KeyboardState;
pub use machine::{Spectrum, SpectrumError};
pub use ports::UlaPorts;
