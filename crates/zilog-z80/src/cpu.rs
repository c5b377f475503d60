//! The Z80 core: register file, memory, ports and the step loop.
//!
//! [`Z80::step`] runs one instruction to completion and then does the
//! per-step bookkeeping a machine needs: T-state accounting, scanline and
//! tape-trap notifications, and the frame interrupt. Everything is
//! synchronous; [`CpuRunner`](crate::CpuRunner) puts it on a thread.

mod block;
mod execute;

use std::sync::OnceLock;

use emu_core::{Memory, NullPorts, Observable, PortHandler, Value};
use tracing::debug;

use crate::config::CpuConfig;
use crate::decoder::Decoder;
use crate::error::CpuError;
use crate::events::{CpuEvent, Observers};
use crate::instruction::{Action, Instruction};
use crate::log::LogSink;
use crate::registers::{self, Registers};

/// T-states to accept an interrupt in IM 0 or IM 1.
const IM1_T_STATES: u32 = 17;
/// T-states to accept an interrupt in IM 2.
const IM2_T_STATES: u32 = 19;
/// Restart address used by IM 0 and IM 1.
const IM1_VECTOR: u16 = 0x0038;

/// Where an instruction sits in memory while it runs.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Fetch {
    /// Address of the first byte.
    pub(crate) start: u16,
    /// Address of the following instruction. Immediate operands always end
    /// here.
    pub(crate) next: u16,
}

/// Zilog Z80 CPU.
pub struct Z80 {
    regs: Registers,
    memory: Memory,
    ports: Box<dyn PortHandler>,
    decoder: Decoder,
    config: CpuConfig,
    observers: Observers,
    log: LogSink,

    /// T-states since reset.
    t_states: u64,
    /// T-states since the last frame interrupt.
    frame_t_states: u32,
    scanline: Option<u16>,

    halted: bool,
    /// EI was the last instruction; interrupts wait one more instruction.
    ei_just_executed: bool,
}

impl Z80 {
    /// A bare CPU with empty memory and no frame interrupt.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(CpuConfig::default())
    }

    #[must_use]
    pub fn with_config(config: CpuConfig) -> Self {
        let log = LogSink::global();
        Self {
            regs: Registers::new(),
            memory: Memory::new(),
            ports: Box::new(NullPorts),
            decoder: Decoder::new(log.clone()),
            config,
            observers: Observers::default(),
            log,
            t_states: 0,
            frame_t_states: 0,
            scanline: None,
            halted: false,
            ei_just_executed: false,
        }
    }

    #[must_use]
    pub fn config(&self) -> &CpuConfig {
        &self.config
    }

    /// Attach the I/O port handler.
    pub fn set_ports(&mut self, ports: impl PortHandler + 'static) {
        self.ports = Box::new(ports);
    }

    /// Route CPU and decoder log records to `log`.
    pub fn set_log_sink(&mut self, log: LogSink) {
        self.decoder.set_log_sink(log.clone());
        self.log = log;
    }

    #[must_use]
    pub fn log_sink(&self) -> &LogSink {
        &self.log
    }

    /// Register a notification callback.
    pub fn subscribe(&mut self, observer: impl FnMut(&CpuEvent, &Memory) + Send + 'static) {
        self.observers.push(Box::new(observer));
    }

    #[must_use]
    pub fn registers(&self) -> &Registers {
        &self.regs
    }

    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.regs
    }

    #[must_use]
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    #[must_use]
    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    /// T-states executed since reset.
    #[must_use]
    pub fn t_states(&self) -> u64 {
        self.t_states
    }

    /// T-states into the current frame.
    #[must_use]
    pub fn frame_t_states(&self) -> u32 {
        self.frame_t_states
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Registers back to their power-on state and counters zeroed. Memory
    /// is left alone.
    pub fn reset(&mut self) {
        self.regs.clear();
        self.t_states = 0;
        self.frame_t_states = 0;
        self.scanline = None;
        self.halted = false;
        self.ei_just_executed = false;
        self.log.in_scope(|| debug!("CPU reset"));
    }

    /// Execute one instruction plus any interrupt that falls due after it.
    /// Returns the T-states consumed.
    ///
    /// # Errors
    ///
    /// Fails if the bytes at PC don't decode, or an interrupt is accepted
    /// with an invalid IM.
    pub fn step(&mut self) -> Result<u32, CpuError> {
        self.ei_just_executed = false;
        let prev_pc = self.regs.pc;

        let mut elapsed = self.execute_at_pc()?;
        self.advance(elapsed);
        self.emit(CpuEvent::Ticked {
            elapsed,
            prev_pc,
            pc: self.regs.pc,
        });

        self.update_scanline();
        self.check_load_trap();

        let budget = self.config.t_states_per_interrupt;
        if budget > 0 && self.frame_t_states >= budget && !self.ei_just_executed {
            self.frame_t_states -= budget;
            elapsed += self.interrupt()?;
        }
        Ok(elapsed)
    }

    /// Decode and execute the instruction at PC without any per-step
    /// bookkeeping. A DD/FD prefix that modifies nothing runs as a NOP and
    /// the following opcode executes in the same call.
    ///
    /// # Errors
    ///
    /// [`CpuError::UnsupportedInstruction`] if nothing matches.
    pub fn execute_at_pc(&mut self) -> Result<u32, CpuError> {
        let instruction = self.decoder.decode(&self.memory, self.regs.pc)?;
        let mut t_states = self.execute(instruction);
        if instruction.is_ignored_prefix() {
            let next = self.decoder.decode(&self.memory, self.regs.pc)?;
            t_states += self.execute(next);
        }
        Ok(t_states)
    }

    /// Execute `instruction`, assumed to sit at PC. Returns T-states used.
    pub fn execute(&mut self, instruction: &Instruction) -> u32 {
        let start = self.regs.pc;
        let next = start.wrapping_add(instruction.byte_count() as u16);
        self.regs.pc = next;

        if instruction.is_prefixed() {
            self.regs.inc_r();
        }
        self.regs.inc_r();

        match instruction.action() {
            Action::Run(run) => {
                let offset = instruction.value_byte_offset().unwrap_or(0);
                run(self, start.wrapping_add(offset as u16))
            }
            Action::Op(op) => {
                if self.execute_op(*op, Fetch { start, next }) {
                    instruction.t_states_long()
                } else {
                    instruction.t_states()
                }
            }
        }
    }

    /// Accept a maskable interrupt if IFF1 allows it. Returns the T-states
    /// used, 0 if interrupts are disabled.
    ///
    /// # Errors
    ///
    /// [`CpuError::InvalidInterruptMode`] if IM is not 0, 1 or 2.
    pub fn interrupt(&mut self) -> Result<u32, CpuError> {
        if !self.regs.iff1 {
            return Ok(0);
        }
        let (target, t_states) = match self.regs.im {
            0 | 1 => (IM1_VECTOR, IM1_T_STATES),
            2 => {
                let table = (u16::from(self.regs.i) << 8) | 0xFF;
                (self.memory.peek_word(table), IM2_T_STATES)
            }
            mode => return Err(CpuError::InvalidInterruptMode(mode)),
        };

        if self.halted {
            self.halted = false;
            self.regs.pc = self.regs.pc.wrapping_add(1);
        }
        self.regs.iff1 = false;
        self.regs.iff2 = false;
        self.push_word(self.regs.pc);
        self.regs.pc = target;

        self.advance(t_states);
        self.emit(CpuEvent::InterruptFired);
        Ok(t_states)
    }

    /// Return from a non-maskable interrupt: pop PC and copy IFF2 into IFF1.
    pub fn retn(&mut self) {
        self.regs.pc = self.pop_word();
        self.regs.iff1 = self.regs.iff2;
    }

    pub fn push_word(&mut self, value: u16) {
        self.regs.sp = self.regs.sp.wrapping_sub(2);
        self.memory.poke_word(self.regs.sp, value);
    }

    pub fn pop_word(&mut self) -> u16 {
        let value = self.memory.peek_word(self.regs.sp);
        self.regs.sp = self.regs.sp.wrapping_add(2);
        value
    }

    /// Tell observers the CPU has stopped.
    pub fn notify_powered_off(&mut self) {
        self.emit(CpuEvent::PoweredOff);
    }

    fn advance(&mut self, t_states: u32) {
        self.t_states += u64::from(t_states);
        self.frame_t_states += t_states;
    }

    fn emit(&mut self, event: CpuEvent) {
        if !self.observers.is_empty() {
            self.observers.emit(&event, &self.memory);
        }
    }

    fn update_scanline(&mut self) {
        let per_line = self.config.t_states_per_scanline;
        let budget = self.config.t_states_per_interrupt;
        if per_line == 0 || (budget > 0 && self.frame_t_states >= budget) {
            return;
        }
        let line = u16::try_from(self.frame_t_states / per_line).unwrap_or(u16::MAX);
        if self.scanline != Some(line) {
            self.scanline = Some(line);
            self.emit(CpuEvent::RenderScanline { scanline: line });
        }
    }

    fn check_load_trap(&mut self) {
        let hit = self.config.load_trap.as_ref().is_some_and(|trap| {
            self.regs.pc == trap.pc
                && self.memory.read_range(trap.pc, trap.signature.len()) == trap.signature
        });
        if hit {
            self.emit(CpuEvent::LoadRequested);
        }
    }
}

impl Default for Z80 {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Z80 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Z80")
            .field("regs", &self.regs)
            .field("t_states", &self.t_states)
            .field("halted", &self.halted)
            .finish_non_exhaustive()
    }
}

fn core_paths() -> &'static [&'static str] {
    static PATHS: OnceLock<Vec<&'static str>> = OnceLock::new();
    PATHS.get_or_init(|| {
        let mut paths = registers::QUERY_PATHS.to_vec();
        paths.extend(["halted", "t_states", "(hl)"]);
        paths
    })
}

impl Observable for Z80 {
    fn query(&self, path: &str) -> Option<Value> {
        match path.to_ascii_lowercase().as_str() {
            "halted" => Some(self.halted.into()),
            "t_states" => Some(self.t_states.into()),
            "(hl)" => Some(self.memory.peek(self.regs.hl()).into()),
            _ => self.regs.query(path),
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        core_paths()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cpu_with(program: &[u8]) -> Z80 {
        let mut cpu = Z80::new();
        cpu.memory_mut().load_data(program, 0);
        cpu
    }

    #[test]
    fn ld_then_add() {
        // LD A,2; ADD A,3
        let mut cpu = cpu_with(&[0x3E, 0x02, 0xC6, 0x03]);
        let t = cpu.step().unwrap() + cpu.step().unwrap();
        assert_eq!(t, 14);
        assert_eq!(cpu.registers().a(), 5);
        assert_eq!(cpu.registers().pc, 4);
        assert!(!cpu.registers().carry());
        assert!(!cpu.registers().zero());
        assert!(!cpu.registers().sign());
    }

    #[test]
    fn halt_spins_in_place() {
        let mut cpu = cpu_with(&[0x76]);
        assert_eq!(cpu.step().unwrap(), 4);
        assert!(cpu.is_halted());
        assert_eq!(cpu.registers().pc, 0);
        assert_eq!(cpu.step().unwrap(), 4);
        assert_eq!(cpu.registers().pc, 0);
        assert_eq!(cpu.t_states(), 8);
    }

    #[test]
    fn ignored_prefix_runs_following_opcode() {
        // DD; LD A,7
        let mut cpu = cpu_with(&[0xDD, 0x3E, 0x07]);
        let r = cpu.registers().r;
        assert_eq!(cpu.step().unwrap(), 4 + 7);
        assert_eq!(cpu.registers().a(), 7);
        assert_eq!(cpu.registers().pc, 3);
        assert_eq!(cpu.registers().r & 0x7F, r.wrapping_add(2) & 0x7F);
    }

    #[test]
    fn core_paths_extend_registers() {
        let mut cpu = cpu_with(&[]);
        cpu.registers_mut().set_hl(0x4000);
        cpu.memory_mut().poke(0x4000, 0x99);
        assert_eq!(cpu.query("(HL)"), Some(Value::U8(0x99)));
        assert_eq!(cpu.query("halted"), Some(Value::Bool(false)));
        assert_eq!(cpu.query("pc"), Some(Value::U16(0)));
        assert!(cpu.query_paths().contains(&"t_states"));
        assert!(cpu.query_paths().contains(&"hl'"));
        assert_eq!(cpu.query("nonsense"), None);
    }
}
