//! Address to [`Instruction`] resolution.

use emu_core::Memory;
use tracing::warn;

use crate::error::CpuError;
use crate::instruction::Instruction;
use crate::log::LogSink;
use crate::table::{InstructionTable, Resolved};

/// Longest Z80 instruction, used for error dumps.
const MAX_INSTRUCTION_LEN: usize = 4;

/// Decoder bound to the shared table and a log sink.
///
/// Warns once, the first time a prefix has to fall back to its no-op
/// behaviour, then stays quiet for the rest of the run.
#[derive(Debug)]
pub struct Decoder {
    table: &'static InstructionTable,
    log: LogSink,
    warned: bool,
}

impl Decoder {
    #[must_use]
    pub fn new(log: LogSink) -> Self {
        Self {
            table: InstructionTable::global(),
            log,
            warned: false,
        }
    }

    #[must_use]
    pub fn table(&self) -> &'static InstructionTable {
        self.table
    }

    pub fn set_log_sink(&mut self, log: LogSink) {
        self.log = log;
    }

    /// Whether the one-time fallback warning has been issued.
    #[must_use]
    pub fn has_warned(&self) -> bool {
        self.warned
    }

    /// The instruction at `addr`.
    ///
    /// # Errors
    ///
    /// [`CpuError::UnsupportedInstruction`] if neither the tables nor the
    /// prefix fallbacks match.
    pub fn decode(&mut self, memory: &Memory, addr: u16) -> Result<&'static Instruction, CpuError> {
        match self.table.resolve(memory, addr) {
            Resolved::Exact(instruction) => Ok(instruction),
            Resolved::Fallback(instruction) => {
                if !self.warned {
                    self.warned = true;
                    let bytes = hex_dump(memory, addr, 2);
                    self.log.in_scope(|| {
                        warn!(
                            pc = format_args!("{addr:04X}"),
                            bytes = %bytes,
                            "unsupported prefix combination, executing as {}; further occurrences are not reported",
                            instruction.mnemonic()
                        );
                    });
                }
                Ok(instruction)
            }
            Resolved::Missing => Err(CpuError::UnsupportedInstruction {
                pc: addr,
                bytes: hex_dump(memory, addr, MAX_INSTRUCTION_LEN),
                closest: self
                    .table
                    .closest(memory, addr)
                    .map(|i| i.mnemonic().to_string()),
            }),
        }
    }
}

/// `len` bytes at `addr` as space-separated hex.
pub(crate) fn hex_dump(memory: &Memory, addr: u16, len: usize) -> String {
    memory
        .read_range(addr, len)
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}
