//! The Z80 opcode space.
//!
//! Tables are generated from the octal structure of the opcodes (`x y z`
//! fields, `p q` within `y`), once per process. The unprefixed generator is
//! parameterised on the index register so the DD and FD spaces fall out of
//! it: any opcode that touches H, L, HL or (HL) gets an IX/IY twin, and
//! anything else is left empty so the prefix is ignored at run time.

use std::sync::OnceLock;

use emu_core::Memory;

use crate::alu::{AluOp, ShiftOp};
use crate::cpu::Z80;
use crate::instruction::{
    BlockOp, Condition, HexTemplate, Instruction, Op, Operand, TemplateByte, template,
};
use crate::registers::{Reg8, Reg16};

use TemplateByte::{Displacement as D, Fixed, Immediate as N};

type Space = Vec<Option<Instruction>>;

/// Read-modify-write operations of the DDCB/FDCB family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BitAction {
    Shift(ShiftOp),
    Res(u8),
    Set(u8),
}

impl BitAction {
    fn text(self, operand: Operand) -> String {
        match self {
            BitAction::Shift(op) => format!("{} {}", op.name(), operand.text()),
            BitAction::Res(bit) => format!("RES {bit},{}", operand.text()),
            BitAction::Set(bit) => format!("SET {bit},{}", operand.text()),
        }
    }

    fn op(self, operand: Operand) -> Op {
        match self {
            BitAction::Shift(op) => Op::Shift(op, operand),
            BitAction::Res(bit) => Op::Res(bit, operand),
            BitAction::Set(bit) => Op::Set(bit, operand),
        }
    }
}

/// Register an unprefixed opcode's H/L/HL references resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Index {
    Hl,
    Ix,
    Iy,
}

impl Index {
    fn prefix(self) -> &'static [u8] {
        match self {
            Index::Hl => &[],
            Index::Ix => &[0xDD],
            Index::Iy => &[0xFD],
        }
    }

    fn pair(self) -> Reg16 {
        match self {
            Index::Hl => Reg16::HL,
            Index::Ix => Reg16::IX,
            Index::Iy => Reg16::IY,
        }
    }

    fn high(self) -> Reg8 {
        match self {
            Index::Hl => Reg8::H,
            Index::Ix => Reg8::Ixh,
            Index::Iy => Reg8::Iyh,
        }
    }

    fn low(self) -> Reg8 {
        match self {
            Index::Hl => Reg8::L,
            Index::Ix => Reg8::Ixl,
            Index::Iy => Reg8::Iyl,
        }
    }
}

/// `r[z]` for every code except 6, which is the memory operand.
fn plain_reg(code: u8) -> Reg8 {
    match code {
        0 => Reg8::B,
        1 => Reg8::C,
        2 => Reg8::D,
        3 => Reg8::E,
        4 => Reg8::H,
        5 => Reg8::L,
        _ => Reg8::A,
    }
}

const PAIRS_SP: [Reg16; 4] = [Reg16::BC, Reg16::DE, Reg16::HL, Reg16::SP];
const PAIRS_AF: [Reg16; 4] = [Reg16::BC, Reg16::DE, Reg16::HL, Reg16::AF];

/// The decomposed fields of an opcode byte.
#[derive(Clone, Copy)]
struct Fields {
    x: u8,
    y: u8,
    z: u8,
    p: u8,
    q: u8,
}

impl Fields {
    fn of(opcode: u8) -> Self {
        let y = (opcode >> 3) & 7;
        Self {
            x: opcode >> 6,
            y,
            z: opcode & 7,
            p: y >> 1,
            q: y & 1,
        }
    }
}

fn empty_space() -> Space {
    (0..256).map(|_| None).collect()
}

/// Builder for the unprefixed space or one of its DD/FD twins.
struct Builder {
    index: Index,
    entries: Space,
}

impl Builder {
    fn new(index: Index) -> Self {
        Self {
            index,
            entries: empty_space(),
        }
    }

    /// Keep `instruction` if this is the unprefixed space, or if it involves
    /// the index register.
    fn put(&mut self, opcode: u8, uses_index: bool, instruction: Instruction) {
        if self.index == Index::Hl || uses_index {
            self.entries[opcode as usize] = Some(instruction);
        }
    }

    fn tpl(&self, opcode: u8, tail: &[TemplateByte]) -> HexTemplate {
        template(self.index.prefix(), opcode, tail)
    }

    /// Unprefixed timing, or the indexed one.
    fn t(&self, plain: u32, indexed: u32) -> u32 {
        if self.index == Index::Hl { plain } else { indexed }
    }

    fn mem(&self) -> Operand {
        match self.index {
            Index::Hl => Operand::Indirect(Reg16::HL),
            _ => Operand::Indexed(self.index.pair()),
        }
    }

    fn mem_tail(&self) -> &'static [TemplateByte] {
        match self.index {
            Index::Hl => &[],
            _ => &[D],
        }
    }

    /// `r[code]`, and whether it refers to H, L or (HL).
    fn reg(&self, code: u8) -> (Operand, bool) {
        match code {
            4 => (Operand::Reg(self.index.high()), true),
            5 => (Operand::Reg(self.index.low()), true),
            6 => (self.mem(), true),
            c => (Operand::Reg(plain_reg(c)), false),
        }
    }

    /// `rp[p]` or `rp2[p]`, and whether it is the HL slot.
    fn pair(&self, table: &[Reg16; 4], p: u8) -> (Reg16, bool) {
        match table[p as usize] {
            Reg16::HL => (self.index.pair(), true),
            rr => (rr, false),
        }
    }

    fn build(mut self) -> Space {
        for opcode in 0..=255u8 {
            match opcode {
                0xCB | 0xDD | 0xED | 0xFD => {}
                _ => self.opcode(opcode),
            }
        }
        self.entries
    }

    fn opcode(&mut self, opcode: u8) {
        let Fields { x, y, z, p, q } = Fields::of(opcode);
        let hl = self.index.pair();
        let hl_name = hl.name();

        match (x, z) {
            (0, 0) => {
                let instruction = match y {
                    0 => Instruction::new("NOP", self.tpl(opcode, &[]), 4, Op::Nop),
                    1 => Instruction::new("EX AF,AF'", self.tpl(opcode, &[]), 4, Op::ExAfAf),
                    2 => Instruction::new("DJNZ d", self.tpl(opcode, &[D]), 8, Op::Djnz)
                        .long_t_states(13),
                    3 => Instruction::new("JR d", self.tpl(opcode, &[D]), 12, Op::Jr(None)),
                    _ => {
                        let cc = Condition::ALL[(y - 4) as usize];
                        Instruction::new(
                            format!("JR {},d", cc.name()),
                            self.tpl(opcode, &[D]),
                            7,
                            Op::Jr(Some(cc)),
                        )
                        .long_t_states(12)
                    }
                };
                self.put(opcode, false, instruction);
            }
            (0, 1) => {
                let (rr, uses) = self.pair(&PAIRS_SP, p);
                let instruction = if q == 0 {
                    Instruction::new(
                        format!("LD {},nn", rr.name()),
                        self.tpl(opcode, &[N, N]),
                        self.t(10, 14),
                        Op::Ld16Imm(rr),
                    )
                } else {
                    Instruction::new(
                        format!("ADD {hl_name},{}", rr.name()),
                        self.tpl(opcode, &[]),
                        self.t(11, 15),
                        Op::Add16(hl, rr),
                    )
                };
                self.put(opcode, uses || q == 1, instruction);
            }
            (0, 2) => {
                let a = Operand::Reg(Reg8::A);
                let (text, tail, t, op, uses): (String, &[TemplateByte], u32, Op, bool) =
                    match (q, p) {
                        (0, 0) => ("LD (BC),A".into(), &[], 7, Op::Ld8(Operand::Indirect(Reg16::BC), a), false),
                        (0, 1) => ("LD (DE),A".into(), &[], 7, Op::Ld8(Operand::Indirect(Reg16::DE), a), false),
                        (0, 2) => (format!("LD (nn),{hl_name}"), &[N, N], self.t(16, 20), Op::Ld16Store(hl), true),
                        (0, _) => ("LD (nn),A".into(), &[N, N], 13, Op::Ld8(Operand::Absolute, a), false),
                        (_, 0) => ("LD A,(BC)".into(), &[], 7, Op::Ld8(a, Operand::Indirect(Reg16::BC)), false),
                        (_, 1) => ("LD A,(DE)".into(), &[], 7, Op::Ld8(a, Operand::Indirect(Reg16::DE)), false),
                        (_, 2) => (format!("LD {hl_name},(nn)"), &[N, N], self.t(16, 20), Op::Ld16Load(hl), true),
                        (_, _) => ("LD A,(nn)".into(), &[N, N], 13, Op::Ld8(a, Operand::Absolute), false),
                    };
                let instruction = Instruction::new(text, self.tpl(opcode, tail), t, op);
                self.put(opcode, uses, instruction);
            }
            (0, 3) => {
                let (rr, uses) = self.pair(&PAIRS_SP, p);
                let (name, op) = if q == 0 {
                    ("INC", Op::Inc16(rr))
                } else {
                    ("DEC", Op::Dec16(rr))
                };
                let instruction = Instruction::new(
                    format!("{name} {}", rr.name()),
                    self.tpl(opcode, &[]),
                    self.t(6, 10),
                    op,
                );
                self.put(opcode, uses, instruction);
            }
            (0, 4 | 5) => {
                let (target, uses) = self.reg(y);
                let (name, op) = if z == 4 {
                    ("INC", Op::Inc8(target))
                } else {
                    ("DEC", Op::Dec8(target))
                };
                let (tail, t) = if y == 6 {
                    (self.mem_tail(), self.t(11, 23))
                } else {
                    (&[][..], self.t(4, 8))
                };
                let instruction =
                    Instruction::new(format!("{name} {}", target.text()), self.tpl(opcode, tail), t, op);
                self.put(opcode, uses, instruction);
            }
            (0, 6) => {
                let (target, uses) = self.reg(y);
                let (tail, t): (&[TemplateByte], u32) = match (y, self.index) {
                    (6, Index::Hl) => (&[N], 10),
                    (6, _) => (&[D, N], 19),
                    _ => (&[N], self.t(7, 11)),
                };
                let instruction = Instruction::new(
                    format!("LD {},n", target.text()),
                    self.tpl(opcode, tail),
                    t,
                    Op::Ld8(target, Operand::Immediate),
                );
                self.put(opcode, uses, instruction);
            }
            (0, _) => {
                let (text, op) = match y {
                    0 => ("RLCA", Op::Rlca),
                    1 => ("RRCA", Op::Rrca),
                    2 => ("RLA", Op::Rla),
                    3 => ("RRA", Op::Rra),
                    4 => ("DAA", Op::Daa),
                    5 => ("CPL", Op::Cpl),
                    6 => ("SCF", Op::Scf),
                    _ => ("CCF", Op::Ccf),
                };
                self.put(opcode, false, Instruction::new(text, self.tpl(opcode, &[]), 4, op));
            }
            (1, _) if y == 6 && z == 6 => {
                self.put(opcode, false, Instruction::new("HALT", self.tpl(opcode, &[]), 4, Op::Halt));
            }
            (1, _) if y == 6 || z == 6 => {
                // (HL) moves keep plain H and L on the other side, even under DD/FD.
                let mem = self.mem();
                let (dst, src) = if y == 6 {
                    (mem, Operand::Reg(plain_reg(z)))
                } else {
                    (Operand::Reg(plain_reg(y)), mem)
                };
                let instruction = Instruction::new(
                    format!("LD {},{}", dst.text(), src.text()),
                    self.tpl(opcode, self.mem_tail()),
                    self.t(7, 19),
                    Op::Ld8(dst, src),
                );
                self.put(opcode, true, instruction);
            }
            (1, _) => {
                let (dst, dst_uses) = self.reg(y);
                let (src, src_uses) = self.reg(z);
                let instruction = Instruction::new(
                    format!("LD {},{}", dst.text(), src.text()),
                    self.tpl(opcode, &[]),
                    self.t(4, 8),
                    Op::Ld8(dst, src),
                );
                self.put(opcode, dst_uses || src_uses, instruction);
            }
            (2, _) => {
                let op = AluOp::ALL[y as usize];
                let (src, uses) = self.reg(z);
                let (tail, t) = if z == 6 {
                    (self.mem_tail(), self.t(7, 19))
                } else {
                    (&[][..], self.t(4, 8))
                };
                let instruction = Instruction::new(
                    format!("{}{}", op.prefix(), src.text()),
                    self.tpl(opcode, tail),
                    t,
                    Op::Alu(op, src),
                );
                self.put(opcode, uses, instruction);
            }
            (_, 0) => {
                let cc = Condition::ALL[y as usize];
                let instruction = Instruction::new(
                    format!("RET {}", cc.name()),
                    self.tpl(opcode, &[]),
                    5,
                    Op::Ret(Some(cc)),
                )
                .long_t_states(11);
                self.put(opcode, false, instruction);
            }
            (_, 1) => {
                if q == 0 {
                    let (rr, uses) = self.pair(&PAIRS_AF, p);
                    let instruction = Instruction::new(
                        format!("POP {}", rr.name()),
                        self.tpl(opcode, &[]),
                        self.t(10, 14),
                        Op::Pop(rr),
                    );
                    self.put(opcode, uses, instruction);
                } else {
                    let (text, t, op, uses) = match p {
                        0 => ("RET".to_string(), 10, Op::Ret(None), false),
                        1 => ("EXX".to_string(), 4, Op::Exx, false),
                        2 => (format!("JP ({hl_name})"), self.t(4, 8), Op::JpInd(hl), true),
                        _ => (format!("LD SP,{hl_name}"), self.t(6, 10), Op::LdSp(hl), true),
                    };
                    self.put(opcode, uses, Instruction::new(text, self.tpl(opcode, &[]), t, op));
                }
            }
            (_, 2) => {
                let cc = Condition::ALL[y as usize];
                let instruction = Instruction::new(
                    format!("JP {},nn", cc.name()),
                    self.tpl(opcode, &[N, N]),
                    10,
                    Op::Jp(Some(cc)),
                );
                self.put(opcode, false, instruction);
            }
            (_, 3) => {
                let (text, tail, t, op, uses): (String, &[TemplateByte], u32, Op, bool) = match y {
                    0 => ("JP nn".into(), &[N, N], 10, Op::Jp(None), false),
                    2 => ("OUT (n),A".into(), &[N], 11, Op::OutNA, false),
                    3 => ("IN A,(n)".into(), &[N], 11, Op::InAN, false),
                    4 => (format!("EX (SP),{hl_name}"), &[], self.t(19, 23), Op::ExSp(hl), true),
                    5 => ("EX DE,HL".into(), &[], 4, Op::ExDeHl, false),
                    6 => ("DI".into(), &[], 4, Op::Di, false),
                    7 => ("EI".into(), &[], 4, Op::Ei, false),
                    // 0xCB is a prefix
                    _ => return,
                };
                self.put(opcode, uses, Instruction::new(text, self.tpl(opcode, tail), t, op));
            }
            (_, 4) => {
                let cc = Condition::ALL[y as usize];
                let instruction = Instruction::new(
                    format!("CALL {},nn", cc.name()),
                    self.tpl(opcode, &[N, N]),
                    10,
                    Op::Call(Some(cc)),
                )
                .long_t_states(17);
                self.put(opcode, false, instruction);
            }
            (_, 5) => {
                if q == 0 {
                    let (rr, uses) = self.pair(&PAIRS_AF, p);
                    let instruction = Instruction::new(
                        format!("PUSH {}", rr.name()),
                        self.tpl(opcode, &[]),
                        self.t(11, 15),
                        Op::Push(rr),
                    );
                    self.put(opcode, uses, instruction);
                } else if p == 0 {
                    let instruction =
                        Instruction::new("CALL nn", self.tpl(opcode, &[N, N]), 17, Op::Call(None));
                    self.put(opcode, false, instruction);
                }
            }
            (_, 6) => {
                let op = AluOp::ALL[y as usize];
                let instruction = Instruction::new(
                    format!("{}n", op.prefix()),
                    self.tpl(opcode, &[N]),
                    7,
                    Op::Alu(op, Operand::Immediate),
                );
                self.put(opcode, false, instruction);
            }
            (_, _) => {
                let vector = y * 8;
                let instruction = Instruction::new(
                    format!("RST {vector:02X}H"),
                    self.tpl(opcode, &[]),
                    11,
                    Op::Rst(vector),
                );
                self.put(opcode, false, instruction);
            }
        }
    }
}

fn bit_space() -> Space {
    let mut entries = empty_space();
    for opcode in 0..=255u8 {
        let Fields { x, y, z, .. } = Fields::of(opcode);
        let target = if z == 6 {
            Operand::Indirect(Reg16::HL)
        } else {
            Operand::Reg(plain_reg(z))
        };
        let memory = z == 6;
        let (text, t, op) = match x {
            0 => {
                let shift = ShiftOp::ALL[y as usize];
                (
                    format!("{} {}", shift.name(), target.text()),
                    if memory { 15 } else { 8 },
                    Op::Shift(shift, target),
                )
            }
            1 => (
                format!("BIT {y},{}", target.text()),
                if memory { 12 } else { 8 },
                Op::Bit(y, target),
            ),
            2 => (
                format!("RES {y},{}", target.text()),
                if memory { 15 } else { 8 },
                Op::Res(y, target),
            ),
            _ => (
                format!("SET {y},{}", target.text()),
                if memory { 15 } else { 8 },
                Op::Set(y, target),
            ),
        };
        entries[opcode as usize] = Some(Instruction::new(text, template(&[0xCB], opcode, &[]), t, op));
    }
    entries
}

/// DDCB/FDCB: `prefix CB d op`, keyed by the final byte.
///
/// Forms that don't address plain `(IX+d)` also copy the result into a
/// register; those run as closures rather than widening [`Op`].
fn indexed_bit_space(index: Index) -> Space {
    let pair = index.pair();
    let prefix = index.prefix()[0];
    let mem = Operand::Indexed(pair);
    let mut entries = empty_space();

    for opcode in 0..=255u8 {
        let Fields { x, y, z, .. } = Fields::of(opcode);
        let tpl = HexTemplate::new(vec![Fixed(prefix), Fixed(0xCB), D, Fixed(opcode)]);

        let instruction = if x == 1 {
            Instruction::new(format!("BIT {y},{}", mem.text()), tpl, 20, Op::Bit(y, mem))
        } else {
            let action = match x {
                0 => BitAction::Shift(ShiftOp::ALL[y as usize]),
                2 => BitAction::Res(y),
                _ => BitAction::Set(y),
            };
            if z == 6 {
                Instruction::new(action.text(mem), tpl, 23, action.op(mem))
            } else {
                let target = plain_reg(z);
                Instruction::with_run(
                    format!("{},{}", action.text(mem), target.name()),
                    tpl,
                    23,
                    Box::new(move |cpu: &mut Z80, value_addr: u16| {
                        cpu.indexed_bit_copy(pair, action, target, value_addr);
                        23
                    }),
                )
            }
        };
        entries[opcode as usize] = Some(instruction);
    }
    entries
}

fn extended_space() -> Space {
    let mut entries = empty_space();

    for opcode in 0x40..=0x7Fu8 {
        let Fields { y, z, p, q, .. } = Fields::of(opcode);
        let reg = plain_reg(y);
        let rr = PAIRS_SP[p as usize];
        let (text, tail, t, op): (String, &[TemplateByte], u32, Op) = match z {
            0 if y == 6 => ("IN F,(C)".into(), &[], 12, Op::InC(None)),
            0 => (format!("IN {},(C)", reg.name()), &[], 12, Op::InC(Some(reg))),
            1 if y == 6 => ("OUT (C),0".into(), &[], 12, Op::OutC(None)),
            1 => (format!("OUT (C),{}", reg.name()), &[], 12, Op::OutC(Some(reg))),
            2 if q == 0 => (format!("SBC HL,{}", rr.name()), &[], 15, Op::Sbc16(rr)),
            2 => (format!("ADC HL,{}", rr.name()), &[], 15, Op::Adc16(rr)),
            3 if q == 0 => (format!("LD (nn),{}", rr.name()), &[N, N], 20, Op::Ld16Store(rr)),
            3 => (format!("LD {},(nn)", rr.name()), &[N, N], 20, Op::Ld16Load(rr)),
            4 => ("NEG".into(), &[], 8, Op::Neg),
            5 if y == 1 => ("RETI".into(), &[], 14, Op::Reti),
            5 => ("RETN".into(), &[], 14, Op::Retn),
            6 => {
                let mode = [0, 0, 1, 2][(y & 3) as usize];
                (format!("IM {mode}"), &[], 8, Op::Im(mode))
            }
            _ => match y {
                0 => ("LD I,A".into(), &[], 9, Op::LdIA),
                1 => ("LD R,A".into(), &[], 9, Op::LdRA),
                2 => ("LD A,I".into(), &[], 9, Op::LdAI),
                3 => ("LD A,R".into(), &[], 9, Op::LdAR),
                4 => ("RRD".into(), &[], 18, Op::Rrd),
                5 => ("RLD".into(), &[], 18, Op::Rld),
                // ED 77 and ED 7F fall back to NOP NOP
                _ => continue,
            },
        };
        entries[opcode as usize] = Some(Instruction::new(text, template(&[0xED], opcode, tail), t, op));
    }

    for y in 4..=7u8 {
        for z in 0..=3u8 {
            let opcode = 0x80 | (y << 3) | z;
            let block = match (z, y & 1) {
                (0, 0) => BlockOp::Ldi,
                (0, _) => BlockOp::Ldd,
                (1, 0) => BlockOp::Cpi,
                (1, _) => BlockOp::Cpd,
                (2, 0) => BlockOp::Ini,
                (2, _) => BlockOp::Ind,
                (_, 0) => BlockOp::Outi,
                (_, _) => BlockOp::Outd,
            };
            let repeat = y >= 6;
            let instruction = Instruction::new(
                block.name(repeat),
                template(&[0xED], opcode, &[]),
                16,
                Op::Block(block, repeat),
            )
            .long_t_states(if repeat { 21 } else { 16 });
            entries[opcode as usize] = Some(instruction);
        }
    }
    entries
}

/// How an address resolved against the tables.
#[derive(Debug, Clone, Copy)]
pub enum Resolved<'a> {
    /// A real table entry.
    Exact(&'a Instruction),
    /// No entry; an unused ED opcode or an ignored DD/FD prefix.
    Fallback(&'a Instruction),
    /// Nothing matched at all.
    Missing,
}

/// Every opcode space, built once.
#[derive(Debug)]
pub struct InstructionTable {
    unprefixed: Space,
    cb: Space,
    ed: Space,
    dd: Space,
    fd: Space,
    ddcb: Space,
    fdcb: Space,
    nop_nop: Instruction,
    ignored_dd: Instruction,
    ignored_fd: Instruction,
}

impl InstructionTable {
    /// Generate every table. Prefer [`InstructionTable::global`].
    #[must_use]
    pub fn build() -> Self {
        Self {
            unprefixed: Builder::new(Index::Hl).build(),
            cb: bit_space(),
            ed: extended_space(),
            dd: Builder::new(Index::Ix).build(),
            fd: Builder::new(Index::Iy).build(),
            ddcb: indexed_bit_space(Index::Ix),
            fdcb: indexed_bit_space(Index::Iy),
            nop_nop: Instruction::new(
                "NOP NOP",
                HexTemplate::new(vec![Fixed(0xED), N]),
                8,
                Op::NopNop,
            ),
            ignored_dd: Instruction::new("NOP*", template(&[], 0xDD, &[]), 4, Op::IgnoredPrefix),
            ignored_fd: Instruction::new("NOP*", template(&[], 0xFD, &[]), 4, Op::IgnoredPrefix),
        }
    }

    /// The process-wide table.
    pub fn global() -> &'static Self {
        static TABLE: OnceLock<InstructionTable> = OnceLock::new();
        TABLE.get_or_init(Self::build)
    }

    /// Find the instruction at `addr`, applying the ED and DD/FD fallbacks.
    #[must_use]
    pub fn resolve(&self, memory: &Memory, addr: u16) -> Resolved<'_> {
        let first = memory.peek(addr);
        let second = memory.peek(addr.wrapping_add(1));
        fn exact(slot: &Option<Instruction>) -> Resolved<'_> {
            match slot {
                Some(instruction) => Resolved::Exact(instruction),
                None => Resolved::Missing,
            }
        }

        match first {
            0xCB => exact(&self.cb[second as usize]),
            0xED => match &self.ed[second as usize] {
                Some(instruction) => Resolved::Exact(instruction),
                None => Resolved::Fallback(&self.nop_nop),
            },
            0xDD | 0xFD => {
                let (plain, bits, ignored) = if first == 0xDD {
                    (&self.dd, &self.ddcb, &self.ignored_dd)
                } else {
                    (&self.fd, &self.fdcb, &self.ignored_fd)
                };
                if second == 0xCB {
                    let last = memory.peek(addr.wrapping_add(3));
                    match &bits[last as usize] {
                        Some(instruction) if instruction.matches(memory, addr) => {
                            Resolved::Exact(instruction)
                        }
                        _ => Resolved::Missing,
                    }
                } else {
                    match &plain[second as usize] {
                        Some(instruction) => Resolved::Exact(instruction),
                        None => Resolved::Fallback(ignored),
                    }
                }
            }
            _ => exact(&self.unprefixed[first as usize]),
        }
    }

    /// Table entry at `addr`, without fallbacks.
    #[must_use]
    pub fn lookup(&self, memory: &Memory, addr: u16) -> Option<&Instruction> {
        match self.resolve(memory, addr) {
            Resolved::Exact(instruction) => Some(instruction),
            Resolved::Fallback(_) | Resolved::Missing => None,
        }
    }

    /// The unprefixed entry for the first byte at `addr`, if any. Used to
    /// name a candidate when decoding fails.
    #[must_use]
    pub fn closest(&self, memory: &Memory, addr: u16) -> Option<&Instruction> {
        self.unprefixed[memory.peek(addr) as usize].as_ref()
    }

    /// Every table entry (fallbacks excluded).
    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        [
            &self.unprefixed,
            &self.cb,
            &self.ed,
            &self.dd,
            &self.fd,
            &self.ddcb,
            &self.fdcb,
        ]
        .into_iter()
        .flat_map(|space| space.iter().flatten())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(bytes: &[u8]) -> Memory {
        let mut memory = Memory::new();
        memory.load_data(bytes, 0x8000);
        memory
    }

    fn exact(bytes: &[u8]) -> &'static Instruction {
        match InstructionTable::global().resolve(&at(bytes), 0x8000) {
            Resolved::Exact(instruction) => instruction,
            other => panic!("{bytes:02X?} resolved to {other:?}"),
        }
    }

    #[test]
    fn space_sizes() {
        let table = InstructionTable::global();
        assert_eq!(table.unprefixed.iter().flatten().count(), 252);
        assert_eq!(table.cb.iter().flatten().count(), 256);
        assert_eq!(table.ed.iter().flatten().count(), 78);
        assert_eq!(table.ddcb.iter().flatten().count(), 256);
        assert_eq!(table.fdcb.iter().flatten().count(), 256);
        assert_eq!(
            table.dd.iter().flatten().count(),
            table.fd.iter().flatten().count()
        );
        assert!(table.len() > 1200);
    }

    #[test]
    fn every_entry_matches_its_own_template() {
        let table = InstructionTable::global();
        for instruction in table.iter() {
            let bytes: Vec<u8> = instruction
                .template()
                .bytes()
                .iter()
                .map(|b| match b {
                    Fixed(v) => *v,
                    _ => 0x05,
                })
                .collect();
            let memory = at(&bytes);
            assert!(instruction.matches(&memory, 0x8000), "{}", instruction.mnemonic());
            let found = table
                .lookup(&memory, 0x8000)
                .unwrap_or_else(|| panic!("{} not found", instruction.mnemonic()));
            assert_eq!(found.template(), instruction.template());
        }
    }

    #[test]
    fn unprefixed_timings() {
        assert_eq!(exact(&[0x3E, 0x02]).t_states(), 7);
        assert_eq!(exact(&[0x76]).mnemonic(), "HALT");
        let djnz = exact(&[0x10, 0xFE]);
        assert_eq!((djnz.t_states(), djnz.t_states_long()), (8, 13));
        let call = exact(&[0xC4, 0x00, 0x00]);
        assert_eq!(call.mnemonic(), "CALL NZ,nn");
        assert_eq!((call.t_states(), call.t_states_long()), (10, 17));
        assert_eq!(exact(&[0xFF]).mnemonic(), "RST 38H");
        assert_eq!(exact(&[0x34]).t_states(), 11);
        assert_eq!(exact(&[0x36, 0x00]).t_states(), 10);
    }

    #[test]
    fn index_forms() {
        let ld = exact(&[0xDD, 0x7E, 0x05]);
        assert_eq!(ld.mnemonic(), "LD A,(IX+d)");
        assert_eq!(ld.t_states(), 19);
        assert_eq!(ld.op(), Some(Op::Ld8(Operand::Reg(Reg8::A), Operand::Indexed(Reg16::IX))));

        let ld = exact(&[0xDD, 0x66, 0x05]);
        assert_eq!(ld.mnemonic(), "LD H,(IX+d)");

        let ld = exact(&[0xFD, 0x36, 0x01, 0x02]);
        assert_eq!(ld.mnemonic(), "LD (IY+d),n");
        assert_eq!(ld.t_states(), 19);
        assert_eq!(ld.byte_count(), 4);

        assert_eq!(exact(&[0xDD, 0x65]).mnemonic(), "LD IXH,IXL");
        assert_eq!(exact(&[0xFD, 0x26, 0x00]).t_states(), 11);
        assert_eq!(exact(&[0xDD, 0x34, 0x00]).t_states(), 23);
        assert_eq!(exact(&[0xDD, 0x29]).mnemonic(), "ADD IX,IX");
        assert_eq!(exact(&[0xDD, 0xE3]).t_states(), 23);
        assert_eq!(exact(&[0xFD, 0xE9]).mnemonic(), "JP (IY)");
        assert_eq!(exact(&[0xDD, 0x21, 0, 0]).t_states(), 14);
    }

    #[test]
    fn indexed_bit_family() {
        let set = exact(&[0xDD, 0xCB, 0x05, 0xC6]);
        assert_eq!(set.mnemonic(), "SET 0,(IX+d)");
        assert_eq!(set.t_states(), 23);
        assert!(set.op().is_some());

        let copy = exact(&[0xFD, 0xCB, 0x05, 0x00]);
        assert_eq!(copy.mnemonic(), "RLC (IY+d),B");
        assert!(copy.op().is_none());

        let bit = exact(&[0xDD, 0xCB, 0x05, 0x7E]);
        assert_eq!(bit.mnemonic(), "BIT 7,(IX+d)");
        assert_eq!(bit.t_states(), 20);
    }

    #[test]
    fn extended_forms() {
        assert_eq!(exact(&[0xED, 0x44]).mnemonic(), "NEG");
        assert_eq!(exact(&[0xED, 0x4C]).mnemonic(), "NEG");
        assert_eq!(exact(&[0xED, 0x4D]).mnemonic(), "RETI");
        assert_eq!(exact(&[0xED, 0x55]).mnemonic(), "RETN");
        assert_eq!(exact(&[0xED, 0x5E]).op(), Some(Op::Im(2)));
        assert_eq!(exact(&[0xED, 0x6E]).op(), Some(Op::Im(0)));
        assert_eq!(exact(&[0xED, 0x70]).mnemonic(), "IN F,(C)");
        let ldir = exact(&[0xED, 0xB0]);
        assert_eq!(ldir.mnemonic(), "LDIR");
        assert_eq!((ldir.t_states(), ldir.t_states_long()), (16, 21));
        assert_eq!(exact(&[0xED, 0xBB]).mnemonic(), "OTDR");
    }

    #[test]
    fn bit_space_resolves_by_second_byte() {
        let bit = exact(&[0xCB, 0x7C]);
        assert_eq!(bit.mnemonic(), "BIT 7,H");
        assert_eq!(bit.op(), Some(Op::Bit(7, Operand::Reg(Reg8::H))));
        assert_eq!(exact(&[0xCB, 0x7E]).t_states(), 12);
        assert_eq!(exact(&[0xCB, 0x06]).t_states(), 15);
        assert_eq!(exact(&[0xCB, 0xFF]).mnemonic(), "SET 7,A");
    }

    #[test]
    fn fallbacks() {
        let table = InstructionTable::global();
        match table.resolve(&at(&[0xED, 0x77]), 0x8000) {
            Resolved::Fallback(i) => {
                assert_eq!(i.op(), Some(Op::NopNop));
                assert_eq!((i.byte_count(), i.t_states()), (2, 8));
            }
            other => panic!("{other:?}"),
        }
        match table.resolve(&at(&[0xFD, 0x00]), 0x8000) {
            Resolved::Fallback(i) => {
                assert!(i.is_ignored_prefix());
                assert_eq!((i.byte_count(), i.t_states()), (1, 4));
            }
            other => panic!("{other:?}"),
        }
        // EX DE,HL has no IX form
        assert!(table.lookup(&at(&[0xDD, 0xEB]), 0x8000).is_none());
    }
}
