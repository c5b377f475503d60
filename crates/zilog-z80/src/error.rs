//! CPU errors.

use thiserror::Error;

/// Conditions that stop a step.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CpuError {
    /// Nothing in the opcode tables, and no fallback, matches the bytes at `pc`.
    #[error("unsupported instruction {bytes} at {pc:04X}h{}", closest_suffix(.closest))]
    UnsupportedInstruction {
        pc: u16,
        /// Hex dump of the bytes that failed to decode.
        bytes: String,
        /// Mnemonic of the nearest table entry, if any.
        closest: Option<String>,
    },

    /// IM holds something other than 0, 1 or 2 when an interrupt is accepted.
    #[error("invalid interrupt mode {0}")]
    InvalidInterruptMode(u8),
}

fn closest_suffix(closest: &Option<String>) -> String {
    closest
        .as_deref()
        .map(|m| format!(" (closest match: {m})"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages() {
        let err = CpuError::UnsupportedInstruction {
            pc: 0x8000,
            bytes: "DD CB 00 00".into(),
            closest: Some("RLC (IX+d)".into()),
        };
        assert_eq!(
            err.to_string(),
            "unsupported instruction DD CB 00 00 at 8000h (closest match: RLC (IX+d))"
        );
        assert_eq!(CpuError::InvalidInterruptMode(3).to_string(), "invalid interrupt mode 3");
    }
}
