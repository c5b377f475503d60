//! Instruction-level Zilog Z80 interpreter.
//!
//! Each [`Z80::step`] executes one whole instruction and reports the
//! T-states it took, including the taken/not-taken split for conditional
//! branches and repeating block instructions. Opcodes are decoded through
//! tables generated once for the unprefixed, CB, ED, DD, FD, DDCB and FDCB
//! spaces.
//!
//! [`CpuRunner`] runs a core on its own thread in real time.

mod alu;
mod config;
mod cpu;
mod debugger;
mod decoder;
mod disasm;
mod error;
mod events;
mod flags;
mod instruction;
mod log;
mod registers;
mod runner;
mod table;

pub use alu::{AluOp, AluResult, ShiftOp};
pub use config::{CpuConfig, DEFAULT_T_STATES_PER_SECOND, LoadTrap};
pub use cpu::Z80;
pub use debugger::{Breakpoints, DebugSwitch};
pub use decoder::Decoder;
pub use disasm::{Disassembly, disassemble, disassemble_range};
pub use error::CpuError;
pub use events::{CpuEvent, EventLog, Observer};
pub use flags::{CF, HF, NF, PF, SF, XF, YF, ZF, parity, sz53, sz53p};
pub use instruction::{
    Action, BlockOp, Condition, HexTemplate, Instruction, Op, OpcodePattern, Operand, RunFn,
    TemplateByte, TemplateError,
};
pub use log::LogSink;
pub use registers::{Bank, Reg8, Reg16, Registers};
pub use runner::{CpuPause, CpuRunner, CpuState};
pub use table::{InstructionTable, Resolved};

/// Flag computations, exposed for tests and tools that check flag tables.
pub mod arith {
    pub use crate::alu::{
        adc16, add8, add16, alu8, and8, bit, ccf, cp8, cpl, daa, dec8, inc8, neg, or8, rla, rlca,
        rra, rrca, sbc16, scf, shift8, sub8, xor8,
    };
}
