//! Machine configuration.

use emu_core::Speed;

/// Code to put in memory once the CPU is powered on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Program {
    /// A 48K `.sna` snapshot.
    Snapshot(Vec<u8>),
    /// Raw bytes loaded at `addr`; execution starts there.
    Binary { data: Vec<u8>, addr: u16 },
}

/// Configuration for creating a [`Spectrum`](crate::Spectrum).
#[derive(Debug, Clone)]
pub struct SpectrumConfig {
    /// ROM image, at most 16,384 bytes for the 48K.
    pub rom: Vec<u8>,
    pub program: Option<Program>,
    pub speed: Speed,
}

impl SpectrumConfig {
    /// Boot `rom` at hardware speed with nothing else loaded.
    #[must_use]
    pub fn new(rom: Vec<u8>) -> Self {
        Self {
            rom,
            program: None,
            speed: Speed::Actual,
        }
    }
}

/// Parse an address given as `0x8000`, `$8000`, `8000h` or decimal.
///
/// # Errors
///
/// Returns a message naming the input if it isn't a 16-bit number.
pub fn parse_address(raw: &str) -> Result<u16, String> {
    let trimmed = raw.trim();
    let parsed = if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .or_else(|| trimmed.strip_prefix('$'))
    {
        u16::from_str_radix(hex, 16)
    } else if let Some(hex) = trimmed
        .strip_suffix('h')
        .or_else(|| trimmed.strip_suffix('H'))
    {
        u16::from_str_radix(hex, 16)
    } else {
        trimmed.parse()
    };
    parsed.map_err(|err| format!("invalid address {raw:?}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_forms() {
        assert_eq!(parse_address("0x8000"), Ok(0x8000));
        assert_eq!(parse_address("$5CCB"), Ok(0x5CCB));
        assert_eq!(parse_address("0556h"), Ok(0x0556));
        assert_eq!(parse_address("32768"), Ok(0x8000));
        assert!(parse_address("0x10000").is_err());
        assert!(parse_address("start").is_err());
    }
}
