//! Instruction descriptors.
//!
//! Every opcode the decoder knows about is an immutable [`Instruction`]: the
//! assembler text, a byte template such as `DD 36 d n`, its T-state counts,
//! and what it does. Most instructions carry an [`Op`] that the CPU's big
//! `match` interprets; generated families that would otherwise multiply
//! near-identical enum variants carry a closure instead.

use std::fmt;
use std::str::FromStr;

use emu_core::Memory;

use crate::alu::{AluOp, ShiftOp};
use crate::cpu::Z80;
use crate::flags::{CF, PF, SF, ZF};
use crate::registers::{Reg8, Reg16};

/// Effect of a generated instruction. Receives the CPU and the address of
/// the instruction's first operand byte; returns T-states used.
pub type RunFn = Box<dyn Fn(&mut Z80, u16) -> u32 + Send + Sync>;

/// Branch conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    NZ,
    Z,
    NC,
    C,
    PO,
    PE,
    P,
    M,
}

impl Condition {
    pub(crate) const ALL: [Condition; 8] = [
        Condition::NZ,
        Condition::Z,
        Condition::NC,
        Condition::C,
        Condition::PO,
        Condition::PE,
        Condition::P,
        Condition::M,
    ];

    /// Evaluate against an F value.
    #[must_use]
    pub const fn holds(self, f: u8) -> bool {
        match self {
            Condition::NZ => f & ZF == 0,
            Condition::Z => f & ZF != 0,
            Condition::NC => f & CF == 0,
            Condition::C => f & CF != 0,
            Condition::PO => f & PF == 0,
            Condition::PE => f & PF != 0,
            Condition::P => f & SF == 0,
            Condition::M => f & SF != 0,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Condition::NZ => "NZ",
            Condition::Z => "Z",
            Condition::NC => "NC",
            Condition::C => "C",
            Condition::PO => "PO",
            Condition::PE => "PE",
            Condition::P => "P",
            Condition::M => "M",
        }
    }
}

/// An 8-bit operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    Reg(Reg8),
    /// `(BC)`, `(DE)` or `(HL)`.
    Indirect(Reg16),
    /// `(IX+d)` or `(IY+d)`.
    Indexed(Reg16),
    /// `(nn)`.
    Absolute,
    /// `n`.
    Immediate,
}

impl Operand {
    /// Assembler text, using the template placeholders `d`, `n` and `nn`.
    #[must_use]
    pub fn text(self) -> String {
        match self {
            Operand::Reg(r) => r.name().to_string(),
            Operand::Indirect(rr) => format!("({})", rr.name()),
            Operand::Indexed(rr) => format!("({}+d)", rr.name()),
            Operand::Absolute => "(nn)".to_string(),
            Operand::Immediate => "n".to_string(),
        }
    }
}

/// The eight block instructions, before the repeat variant is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockOp {
    Ldi,
    Ldd,
    Cpi,
    Cpd,
    Ini,
    Ind,
    Outi,
    Outd,
}

impl BlockOp {
    #[must_use]
    pub const fn name(self, repeat: bool) -> &'static str {
        match (self, repeat) {
            (BlockOp::Ldi, false) => "LDI",
            (BlockOp::Ldd, false) => "LDD",
            (BlockOp::Cpi, false) => "CPI",
            (BlockOp::Cpd, false) => "CPD",
            (BlockOp::Ini, false) => "INI",
            (BlockOp::Ind, false) => "IND",
            (BlockOp::Outi, false) => "OUTI",
            (BlockOp::Outd, false) => "OUTD",
            (BlockOp::Ldi, true) => "LDIR",
            (BlockOp::Ldd, true) => "LDDR",
            (BlockOp::Cpi, true) => "CPIR",
            (BlockOp::Cpd, true) => "CPDR",
            (BlockOp::Ini, true) => "INIR",
            (BlockOp::Ind, true) => "INDR",
            (BlockOp::Outi, true) => "OTIR",
            (BlockOp::Outd, true) => "OTDR",
        }
    }

    /// True for the variants that step HL upward.
    #[must_use]
    pub const fn increments(self) -> bool {
        matches!(self, BlockOp::Ldi | BlockOp::Cpi | BlockOp::Ini | BlockOp::Outi)
    }
}

/// Instruction kinds interpreted directly by the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Nop,
    /// Unrecognised ED opcode: two wasted M1 cycles.
    NopNop,
    /// DD/FD prefix with nothing to modify; the next opcode runs unprefixed.
    IgnoredPrefix,
    Halt,

    /// `LD dst,src` for every 8-bit form.
    Ld8(Operand, Operand),
    LdAI,
    LdAR,
    LdIA,
    LdRA,
    /// `LD rr,nn`
    Ld16Imm(Reg16),
    /// `LD rr,(nn)`
    Ld16Load(Reg16),
    /// `LD (nn),rr`
    Ld16Store(Reg16),
    /// `LD SP,rr`
    LdSp(Reg16),
    Push(Reg16),
    Pop(Reg16),

    ExAfAf,
    Exx,
    ExDeHl,
    /// `EX (SP),rr`
    ExSp(Reg16),

    Alu(AluOp, Operand),
    Inc8(Operand),
    Dec8(Operand),
    Inc16(Reg16),
    Dec16(Reg16),
    Add16(Reg16, Reg16),
    Adc16(Reg16),
    Sbc16(Reg16),
    Daa,
    Cpl,
    Neg,
    Ccf,
    Scf,

    Rlca,
    Rrca,
    Rla,
    Rra,
    Rld,
    Rrd,
    Shift(ShiftOp, Operand),
    Bit(u8, Operand),
    Res(u8, Operand),
    Set(u8, Operand),

    Jp(Option<Condition>),
    /// `JP (HL)`, `JP (IX)`, `JP (IY)`
    JpInd(Reg16),
    Jr(Option<Condition>),
    Djnz,
    Call(Option<Condition>),
    Ret(Option<Condition>),
    Reti,
    Retn,
    Rst(u8),

    Di,
    Ei,
    Im(u8),

    /// `IN A,(n)`
    InAN,
    /// `OUT (n),A`
    OutNA,
    /// `IN r,(C)`; `None` is `IN F,(C)`, which only sets flags.
    InC(Option<Reg8>),
    /// `OUT (C),r`; `None` is the undocumented `OUT (C),0`.
    OutC(Option<Reg8>),
    /// Block transfer/compare/IO; `true` for the repeating form.
    Block(BlockOp, bool),
}

/// What executing an instruction does.
pub enum Action {
    Op(Op),
    Run(RunFn),
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Op(op) => f.debug_tuple("Op").field(op).finish(),
            Action::Run(_) => f.write_str("Run(..)"),
        }
    }
}

/// One position in an instruction's byte template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateByte {
    Fixed(u8),
    /// `n`: immediate data byte (two in a row form a little-endian word).
    Immediate,
    /// `d`: signed displacement or relative jump offset.
    Displacement,
}

/// Byte layout of an instruction, written like `DD CB d 06`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HexTemplate {
    bytes: Vec<TemplateByte>,
}

/// A template string that doesn't parse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("bad template token '{0}'")]
pub struct TemplateError(pub String);

impl HexTemplate {
    #[must_use]
    pub fn new(bytes: Vec<TemplateByte>) -> Self {
        Self { bytes }
    }

    #[must_use]
    pub fn bytes(&self) -> &[TemplateByte] {
        &self.bytes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Index of the first `n` or `d` placeholder.
    #[must_use]
    pub fn value_byte_offset(&self) -> Option<usize> {
        self.bytes
            .iter()
            .position(|b| !matches!(b, TemplateByte::Fixed(_)))
    }

    #[must_use]
    pub fn immediate_offset(&self) -> Option<usize> {
        self.bytes
            .iter()
            .position(|b| *b == TemplateByte::Immediate)
    }

    #[must_use]
    pub fn displacement_offset(&self) -> Option<usize> {
        self.bytes
            .iter()
            .position(|b| *b == TemplateByte::Displacement)
    }

    /// First byte, if it is fixed.
    #[must_use]
    pub fn first_fixed(&self) -> Option<u8> {
        match self.bytes.first() {
            Some(TemplateByte::Fixed(b)) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for HexTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.bytes.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            match byte {
                TemplateByte::Fixed(b) => write!(f, "{b:02X}")?,
                TemplateByte::Immediate => f.write_str("n")?,
                TemplateByte::Displacement => f.write_str("d")?,
            }
        }
        Ok(())
    }
}

impl FromStr for HexTemplate {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s
            .split_whitespace()
            .map(|token| match token {
                "n" => Ok(TemplateByte::Immediate),
                "d" => Ok(TemplateByte::Displacement),
                hex => u8::from_str_radix(hex, 16)
                    .map(TemplateByte::Fixed)
                    .map_err(|_| TemplateError(hex.to_string())),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { bytes })
    }
}

/// Precompiled matcher for a template: the fixed run before the first
/// placeholder compared as one slice, then any fixed bytes after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpcodePattern {
    leading: Vec<u8>,
    scattered: Vec<(usize, u8)>,
}

impl OpcodePattern {
    #[must_use]
    pub fn new(template: &HexTemplate) -> Self {
        let split = template.value_byte_offset().unwrap_or(template.len());
        let bytes = template.bytes();
        let leading = bytes[..split]
            .iter()
            .filter_map(|b| match b {
                TemplateByte::Fixed(v) => Some(*v),
                _ => None,
            })
            .collect();
        let scattered = bytes
            .iter()
            .enumerate()
            .skip(split)
            .filter_map(|(i, b)| match b {
                TemplateByte::Fixed(v) => Some((i, *v)),
                _ => None,
            })
            .collect();
        Self { leading, scattered }
    }

    /// True if the bytes at `addr` fit this pattern.
    #[must_use]
    pub fn matches(&self, memory: &Memory, addr: u16) -> bool {
        let start = addr as usize;
        let leading_ok = match memory.as_slice().get(start..start + self.leading.len()) {
            Some(window) => window == self.leading.as_slice(),
            None => memory.read_range(addr, self.leading.len()) == self.leading,
        };
        leading_ok
            && self
                .scattered
                .iter()
                .all(|&(i, b)| memory.peek(addr.wrapping_add(i as u16)) == b)
    }
}

/// An immutable opcode descriptor.
#[derive(Debug)]
pub struct Instruction {
    mnemonic: String,
    template: HexTemplate,
    pattern: OpcodePattern,
    t_states: u32,
    t_states_long: u32,
    action: Action,
}

impl Instruction {
    /// Instruction with a single timing.
    #[must_use]
    pub fn new(mnemonic: impl Into<String>, template: HexTemplate, t_states: u32, op: Op) -> Self {
        Self::with_action(mnemonic.into(), template, t_states, Action::Op(op))
    }

    /// Instruction whose effect is a closure rather than an [`Op`].
    #[must_use]
    pub fn with_run(
        mnemonic: impl Into<String>,
        template: HexTemplate,
        t_states: u32,
        run: RunFn,
    ) -> Self {
        Self::with_action(mnemonic.into(), template, t_states, Action::Run(run))
    }

    fn with_action(mnemonic: String, template: HexTemplate, t_states: u32, action: Action) -> Self {
        let pattern = OpcodePattern::new(&template);
        Self {
            mnemonic,
            template,
            pattern,
            t_states,
            t_states_long: t_states,
            action,
        }
    }

    /// Set the timing used when a branch is taken or a block repeats.
    #[must_use]
    pub fn long_t_states(mut self, t_states: u32) -> Self {
        self.t_states_long = t_states;
        self
    }

    #[must_use]
    pub fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    #[must_use]
    pub fn template(&self) -> &HexTemplate {
        &self.template
    }

    /// Base T-states (branch not taken, block finished).
    #[must_use]
    pub fn t_states(&self) -> u32 {
        self.t_states
    }

    /// T-states when a branch is taken or a block repeats.
    #[must_use]
    pub fn t_states_long(&self) -> u32 {
        self.t_states_long
    }

    #[must_use]
    pub fn byte_count(&self) -> usize {
        self.template.len()
    }

    #[must_use]
    pub fn value_byte_offset(&self) -> Option<usize> {
        self.template.value_byte_offset()
    }

    #[must_use]
    pub fn action(&self) -> &Action {
        &self.action
    }

    #[must_use]
    pub fn op(&self) -> Option<Op> {
        match self.action {
            Action::Op(op) => Some(op),
            Action::Run(_) => None,
        }
    }

    /// True for CB/DD/ED/FD instructions, which cost an extra R increment.
    #[must_use]
    pub fn is_prefixed(&self) -> bool {
        self.byte_count() > 1 && matches!(self.template.first_fixed(), Some(0xCB | 0xDD | 0xED | 0xFD))
    }

    #[must_use]
    pub fn is_ignored_prefix(&self) -> bool {
        self.op() == Some(Op::IgnoredPrefix)
    }

    /// True if the bytes at `addr` fit this instruction's template.
    #[must_use]
    pub fn matches(&self, memory: &Memory, addr: u16) -> bool {
        self.pattern.matches(memory, addr)
    }

    /// Mnemonic with placeholders filled in from the bytes at `addr`.
    ///
    /// `nn` becomes a word, `n` a byte, `+d` a signed offset, and a bare `d`
    /// (relative jumps) the jump target.
    #[must_use]
    pub fn render(&self, memory: &Memory, addr: u16) -> String {
        let at = |offset: Option<usize>| offset.map(|o| addr.wrapping_add(o as u16));
        let immediate = at(self.template.immediate_offset());
        let displacement = at(self.template.displacement_offset())
            .map_or(0, |a| memory.peek(a) as i8);

        let mut out = String::with_capacity(self.mnemonic.len() + 4);
        let mut chars = self.mnemonic.chars().peekable();
        while let Some(ch) = chars.next() {
            match ch {
                'n' if chars.peek() == Some(&'n') => {
                    chars.next();
                    let word = immediate.map_or(0, |a| memory.peek_word(a));
                    out.push_str(&format!("{word:04X}h"));
                }
                'n' => {
                    let byte = immediate.map_or(0, |a| memory.peek(a));
                    out.push_str(&format!("{byte:02X}h"));
                }
                'd' if out.ends_with('+') => {
                    out.pop();
                    let sign = if displacement < 0 { '-' } else { '+' };
                    out.push_str(&format!("{sign}{:02X}h", displacement.unsigned_abs()));
                }
                'd' => {
                    let next = addr.wrapping_add(self.byte_count() as u16);
                    let target = next.wrapping_add_signed(i16::from(displacement));
                    out.push_str(&format!("{target:04X}h"));
                }
                other => out.push(other),
            }
        }
        out
    }
}

/// Build a template from a prefix, an opcode and trailing placeholders.
pub(crate) fn template(prefix: &[u8], opcode: u8, tail: &[TemplateByte]) -> HexTemplate {
    let mut bytes: Vec<TemplateByte> = prefix.iter().copied().map(TemplateByte::Fixed).collect();
    bytes.push(TemplateByte::Fixed(opcode));
    bytes.extend_from_slice(tail);
    HexTemplate::new(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use TemplateByte::{Displacement as D, Fixed, Immediate as N};

    #[test]
    fn template_parses_and_prints() {
        let t: HexTemplate = "DD CB d 06".parse().expect("valid template");
        assert_eq!(t.bytes(), &[Fixed(0xDD), Fixed(0xCB), D, Fixed(0x06)]);
        assert_eq!(t.to_string(), "DD CB d 06");
        assert_eq!(t.value_byte_offset(), Some(2));
        assert!("DD XY".parse::<HexTemplate>().is_err());
    }

    #[test]
    fn byte_count_and_value_offset() {
        let ld = Instruction::new("LD (IX+d),n", template(&[0xDD], 0x36, &[D, N]), 19, Op::Nop);
        assert_eq!(ld.byte_count(), 4);
        assert_eq!(ld.value_byte_offset(), Some(2));
        assert_eq!(ld.template().immediate_offset(), Some(3));

        let nop = Instruction::new("NOP", template(&[], 0x00, &[]), 4, Op::Nop);
        assert_eq!(nop.value_byte_offset(), None);
        assert!(!nop.is_prefixed());
    }

    #[test]
    fn pattern_checks_leading_and_scattered_bytes() {
        let t: HexTemplate = "FD CB d 46".parse().expect("valid template");
        let pattern = OpcodePattern::new(&t);

        let mut mem = Memory::new();
        mem.load_data(&[0xFD, 0xCB, 0x05, 0x46], 0x8000);
        assert!(pattern.matches(&mem, 0x8000));
        mem.poke(0x8003, 0x4E);
        assert!(!pattern.matches(&mem, 0x8000));
    }

    #[test]
    fn pattern_wraps_at_top_of_memory() {
        let t: HexTemplate = "ED B0".parse().expect("valid template");
        let pattern = OpcodePattern::new(&t);
        let mut mem = Memory::new();
        mem.poke(0xFFFF, 0xED);
        mem.poke(0x0000, 0xB0);
        assert!(pattern.matches(&mem, 0xFFFF));
    }

    #[test]
    fn render_fills_placeholders() {
        let mut mem = Memory::new();
        mem.load_data(&[0xDD, 0x36, 0xFE, 0x42], 0x0000);
        let ld = Instruction::new("LD (IX+d),n", template(&[0xDD], 0x36, &[D, N]), 19, Op::Nop);
        assert_eq!(ld.render(&mem, 0), "LD (IX-02h),42h");

        mem.load_data(&[0x21, 0x34, 0x12], 0x0010);
        let ld = Instruction::new("LD HL,nn", template(&[], 0x21, &[N, N]), 10, Op::Nop);
        assert_eq!(ld.render(&mem, 0x0010), "LD HL,1234h");

        mem.load_data(&[0x18, 0xFE], 0x0020);
        let jr = Instruction::new("JR d", template(&[], 0x18, &[D]), 12, Op::Jr(None));
        assert_eq!(jr.render(&mem, 0x0020), "JR 0020h");
    }

    #[test]
    fn conditions() {
        assert!(Condition::NZ.holds(0));
        assert!(Condition::M.holds(SF));
        assert!(!Condition::PE.holds(ZF));
    }
}
