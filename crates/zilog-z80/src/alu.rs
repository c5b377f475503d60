//! ALU operations for the Z80.
//!
//! Pure functions. Each returns the result together with the complete new F
//! value; operations that leave some flags alone take the current F as input.

#![allow(clippy::verbose_bit_mask)] // Clearer to read mask comparisons.

use crate::flags::{CF, HF, NF, PF, SF, XF, YF, ZF, parity, sz53, sz53p};

/// Result of an ALU operation with flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AluResult {
    pub value: u8,
    pub flags: u8,
}

/// The eight accumulator operations (`ADD A,r` ... `CP r`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AluOp {
    Add,
    Adc,
    Sub,
    Sbc,
    And,
    Xor,
    Or,
    Cp,
}

impl AluOp {
    pub(crate) const ALL: [AluOp; 8] = [
        AluOp::Add,
        AluOp::Adc,
        AluOp::Sub,
        AluOp::Sbc,
        AluOp::And,
        AluOp::Xor,
        AluOp::Or,
        AluOp::Cp,
    ];

    /// Mnemonic prefix including the implied `A,` where the assembler
    /// syntax has one.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            AluOp::Add => "ADD A,",
            AluOp::Adc => "ADC A,",
            AluOp::Sub => "SUB ",
            AluOp::Sbc => "SBC A,",
            AluOp::And => "AND ",
            AluOp::Xor => "XOR ",
            AluOp::Or => "OR ",
            AluOp::Cp => "CP ",
        }
    }
}

/// CB-prefixed rotates and shifts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShiftOp {
    Rlc,
    Rrc,
    Rl,
    Rr,
    Sla,
    Sra,
    Sll,
    Srl,
}

impl ShiftOp {
    pub(crate) const ALL: [ShiftOp; 8] = [
        ShiftOp::Rlc,
        ShiftOp::Rrc,
        ShiftOp::Rl,
        ShiftOp::Rr,
        ShiftOp::Sla,
        ShiftOp::Sra,
        ShiftOp::Sll,
        ShiftOp::Srl,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            ShiftOp::Rlc => "RLC",
            ShiftOp::Rrc => "RRC",
            ShiftOp::Rl => "RL",
            ShiftOp::Rr => "RR",
            ShiftOp::Sla => "SLA",
            ShiftOp::Sra => "SRA",
            ShiftOp::Sll => "SLL",
            ShiftOp::Srl => "SRL",
        }
    }
}

/// Dispatch one of the eight accumulator operations.
#[must_use]
pub fn alu8(op: AluOp, a: u8, b: u8, carry: bool) -> AluResult {
    match op {
        AluOp::Add => add8(a, b, false),
        AluOp::Adc => add8(a, b, carry),
        AluOp::Sub => sub8(a, b, false),
        AluOp::Sbc => sub8(a, b, carry),
        AluOp::And => and8(a, b),
        AluOp::Xor => xor8(a, b),
        AluOp::Or => or8(a, b),
        AluOp::Cp => cp8(a, b),
    }
}

/// Add two bytes with optional carry.
#[must_use]
pub fn add8(a: u8, b: u8, carry: bool) -> AluResult {
    let c = u8::from(carry);
    let wide = u16::from(a) + u16::from(b) + u16::from(c);
    let value = wide as u8;

    let mut flags = sz53(value);
    if (a & 0x0F) + (b & 0x0F) + c > 0x0F {
        flags |= HF;
    }
    // Both operands same sign, result different sign
    if (a ^ b) & 0x80 == 0 && (a ^ value) & 0x80 != 0 {
        flags |= PF;
    }
    if wide > 0xFF {
        flags |= CF;
    }
    AluResult { value, flags }
}

/// Subtract with optional borrow.
#[must_use]
pub fn sub8(a: u8, b: u8, carry: bool) -> AluResult {
    let c = u8::from(carry);
    let value = a.wrapping_sub(b).wrapping_sub(c);

    let mut flags = sz53(value) | NF;
    if (a & 0x0F) < (b & 0x0F) + c {
        flags |= HF;
    }
    // Operands of different sign, result sign differs from minuend
    if (a ^ b) & 0x80 != 0 && (a ^ value) & 0x80 != 0 {
        flags |= PF;
    }
    if u16::from(a) < u16::from(b) + u16::from(c) {
        flags |= CF;
    }
    AluResult { value, flags }
}

/// Compare. Bits 3 and 5 come from the operand, not the result.
#[must_use]
pub fn cp8(a: u8, b: u8) -> AluResult {
    let result = sub8(a, b, false);
    AluResult {
        value: a,
        flags: (result.flags & !(YF | XF)) | (b & (YF | XF)),
    }
}

#[must_use]
pub fn and8(a: u8, b: u8) -> AluResult {
    let value = a & b;
    AluResult {
        value,
        flags: sz53p(value) | HF,
    }
}

#[must_use]
pub fn or8(a: u8, b: u8) -> AluResult {
    let value = a | b;
    AluResult {
        value,
        flags: sz53p(value),
    }
}

#[must_use]
pub fn xor8(a: u8, b: u8) -> AluResult {
    let value = a ^ b;
    AluResult {
        value,
        flags: sz53p(value),
    }
}

/// INC r. Carry is preserved.
#[must_use]
pub fn inc8(v: u8, flags: u8) -> AluResult {
    let value = v.wrapping_add(1);
    let mut f = sz53(value) | (flags & CF);
    if v & 0x0F == 0x0F {
        f |= HF;
    }
    if v == 0x7F {
        f |= PF;
    }
    AluResult { value, flags: f }
}

/// DEC r. Carry is preserved.
#[must_use]
pub fn dec8(v: u8, flags: u8) -> AluResult {
    let value = v.wrapping_sub(1);
    let mut f = sz53(value) | NF | (flags & CF);
    if v & 0x0F == 0x00 {
        f |= HF;
    }
    if v == 0x80 {
        f |= PF;
    }
    AluResult { value, flags: f }
}

/// CB-prefixed rotate/shift. Flags are SZ53P of the result plus the bit
/// shifted out as carry.
#[must_use]
pub fn shift8(op: ShiftOp, v: u8, carry: bool) -> AluResult {
    let c = u8::from(carry);
    let (value, out) = match op {
        ShiftOp::Rlc => (v.rotate_left(1), v >> 7),
        ShiftOp::Rrc => (v.rotate_right(1), v & 1),
        ShiftOp::Rl => ((v << 1) | c, v >> 7),
        ShiftOp::Rr => ((v >> 1) | (c << 7), v & 1),
        ShiftOp::Sla => (v << 1, v >> 7),
        ShiftOp::Sra => ((v >> 1) | (v & 0x80), v & 1),
        ShiftOp::Sll => ((v << 1) | 1, v >> 7),
        ShiftOp::Srl => (v >> 1, v & 1),
    };
    AluResult {
        value,
        flags: sz53p(value) | out,
    }
}

/// Shared tail of RLCA/RRCA/RLA/RRA: S, Z and P/V survive, H and N clear.
fn accumulator_rotate(value: u8, carry_out: u8, flags: u8) -> AluResult {
    AluResult {
        value,
        flags: (flags & (SF | ZF | PF)) | (value & (YF | XF)) | carry_out,
    }
}

#[must_use]
pub fn rlca(a: u8, flags: u8) -> AluResult {
    accumulator_rotate(a.rotate_left(1), a >> 7, flags)
}

#[must_use]
pub fn rrca(a: u8, flags: u8) -> AluResult {
    accumulator_rotate(a.rotate_right(1), a & 1, flags)
}

#[must_use]
pub fn rla(a: u8, flags: u8) -> AluResult {
    accumulator_rotate((a << 1) | (flags & CF), a >> 7, flags)
}

#[must_use]
pub fn rra(a: u8, flags: u8) -> AluResult {
    accumulator_rotate((a >> 1) | ((flags & CF) << 7), a & 1, flags)
}

/// Decimal adjust after an addition or subtraction.
#[must_use]
pub fn daa(a: u8, flags: u8) -> AluResult {
    let subtract = flags & NF != 0;
    let low = a & 0x0F;

    let mut correction = 0;
    let mut carry = flags & CF != 0;
    if flags & HF != 0 || low > 9 {
        correction |= 0x06;
    }
    if carry || a > 0x99 {
        correction |= 0x60;
        carry = true;
    }

    let (value, half) = if subtract {
        (a.wrapping_sub(correction), flags & HF != 0 && low < 6)
    } else {
        (a.wrapping_add(correction), low > 9)
    };

    let mut f = sz53p(value) | (flags & NF);
    if half {
        f |= HF;
    }
    if carry {
        f |= CF;
    }
    AluResult { value, flags: f }
}

/// CPL: invert A. H and N set; S, Z, P/V and C unchanged.
#[must_use]
pub fn cpl(a: u8, flags: u8) -> AluResult {
    let value = !a;
    AluResult {
        value,
        flags: (flags & (SF | ZF | PF | CF)) | HF | NF | (value & (YF | XF)),
    }
}

/// NEG: `0 - A`. Overflow only for 0x80, carry for anything but zero.
#[must_use]
pub fn neg(a: u8) -> AluResult {
    sub8(0, a, false)
}

/// SCF. Returns the new F.
#[must_use]
pub fn scf(a: u8, flags: u8) -> u8 {
    (flags & (SF | ZF | PF)) | (a & (YF | XF)) | CF
}

/// CCF. H takes the old carry. Returns the new F.
#[must_use]
pub fn ccf(a: u8, flags: u8) -> u8 {
    let old_carry = flags & CF;
    let mut f = (flags & (SF | ZF | PF)) | (a & (YF | XF)) | (old_carry ^ CF);
    if old_carry != 0 {
        f |= HF;
    }
    f
}

/// BIT n: Z and P/V report a clear bit, S only for bit 7. Bits 3 and 5
/// come from `xy`, which the caller picks per addressing mode.
#[must_use]
pub fn bit(n: u8, v: u8, xy: u8, flags: u8) -> u8 {
    let set = v & (1 << n) != 0;
    let mut f = HF | (flags & CF) | (xy & (YF | XF));
    if !set {
        f |= ZF | PF;
    }
    if set && n == 7 {
        f |= SF;
    }
    f
}

/// 16-bit add for HL/IX/IY. S, Z and P/V are preserved.
#[must_use]
pub fn add16(a: u16, b: u16, flags: u8) -> (u16, u8) {
    let wide = u32::from(a) + u32::from(b);
    let result = wide as u16;

    let mut f = (flags & (SF | ZF | PF)) | (((result >> 8) as u8) & (YF | XF));
    if (a & 0x0FFF) + (b & 0x0FFF) > 0x0FFF {
        f |= HF;
    }
    if wide > 0xFFFF {
        f |= CF;
    }
    (result, f)
}

/// 16-bit add with carry for HL.
#[must_use]
pub fn adc16(a: u16, b: u16, carry: bool) -> (u16, u8) {
    let c = u16::from(carry);
    let wide = u32::from(a) + u32::from(b) + u32::from(c);
    let result = wide as u16;

    let mut f = word_sz53(result);
    if (a & 0x0FFF) + (b & 0x0FFF) + c > 0x0FFF {
        f |= HF;
    }
    if (a ^ b) & 0x8000 == 0 && (a ^ result) & 0x8000 != 0 {
        f |= PF;
    }
    if wide > 0xFFFF {
        f |= CF;
    }
    (result, f)
}

/// 16-bit subtract with borrow for HL.
#[must_use]
pub fn sbc16(a: u16, b: u16, carry: bool) -> (u16, u8) {
    let c = u16::from(carry);
    let result = a.wrapping_sub(b).wrapping_sub(c);

    let mut f = word_sz53(result) | NF;
    if (a & 0x0FFF) < (b & 0x0FFF) + c {
        f |= HF;
    }
    if (a ^ b) & 0x8000 != 0 && (a ^ result) & 0x8000 != 0 {
        f |= PF;
    }
    if u32::from(a) < u32::from(b) + u32::from(c) {
        f |= CF;
    }
    (result, f)
}

/// Sign and the undocumented bits from the high byte, zero from the word.
fn word_sz53(value: u16) -> u8 {
    let hi = (value >> 8) as u8;
    let mut f = hi & (SF | YF | XF);
    if value == 0 {
        f |= ZF;
    }
    f
}

/// Parity flag for a byte, as the block I/O instructions compute it.
#[must_use]
pub(crate) fn parity_flag(value: u8) -> u8 {
    if parity(value) { PF } else { 0 }
}
