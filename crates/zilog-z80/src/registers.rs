//! Z80 register file.
//!
//! The eight general-purpose registers exist twice. Instead of copying values
//! on EXX, the file keeps both banks and an index saying which one is main.

use std::fmt;

use emu_core::{Observable, Value};

use crate::flags::{CF, FLAG_LETTERS, HF, NF, PF, SF, XF, YF, ZF};

/// One bank of general-purpose registers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bank {
    pub a: u8,
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,
}

impl Bank {
    const POWER_ON: Self = Self {
        a: 0xFF,
        f: 0xFF,
        b: 0xFF,
        c: 0xFF,
        d: 0xFF,
        e: 0xFF,
        h: 0xFF,
        l: 0xFF,
    };
}

/// 8-bit registers addressable by instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg8 {
    A,
    B,
    C,
    D,
    E,
    H,
    L,
    Ixh,
    Ixl,
    Iyh,
    Iyl,
}

impl Reg8 {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Reg8::A => "A",
            Reg8::B => "B",
            Reg8::C => "C",
            Reg8::D => "D",
            Reg8::E => "E",
            Reg8::H => "H",
            Reg8::L => "L",
            Reg8::Ixh => "IXH",
            Reg8::Ixl => "IXL",
            Reg8::Iyh => "IYH",
            Reg8::Iyl => "IYL",
        }
    }
}

/// 16-bit register pairs addressable by instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg16 {
    AF,
    BC,
    DE,
    HL,
    SP,
    IX,
    IY,
}

impl Reg16 {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Reg16::AF => "AF",
            Reg16::BC => "BC",
            Reg16::DE => "DE",
            Reg16::HL => "HL",
            Reg16::SP => "SP",
            Reg16::IX => "IX",
            Reg16::IY => "IY",
        }
    }
}

/// The complete Z80 register file.
#[derive(Debug, Clone)]
pub struct Registers {
    banks: [Bank; 2],
    main: usize,

    pub ix: u16,
    pub iy: u16,
    pub sp: u16,
    pub pc: u16,
    pub i: u8,
    pub r: u8,

    pub iff1: bool,
    pub iff2: bool,
    pub im: u8,
}

impl Registers {
    /// Registers in their post-reset state.
    #[must_use]
    pub fn new() -> Self {
        let mut regs = Self {
            banks: [Bank::default(); 2],
            main: 0,
            ix: 0,
            iy: 0,
            sp: 0,
            pc: 0,
            i: 0,
            r: 0,
            iff1: false,
            iff2: false,
            im: 0,
        };
        regs.clear();
        regs
    }

    /// Reset to the documented power-on state.
    pub fn clear(&mut self) {
        self.banks = [Bank::POWER_ON; 2];
        self.main = 0;
        self.ix = 0xFFFF;
        self.iy = 0xFFFF;
        self.sp = 0xFFFF;
        self.pc = 0;
        self.i = 0;
        self.r = 0;
        self.iff1 = false;
        self.iff2 = false;
        self.im = 0;
    }

    #[must_use]
    pub fn main(&self) -> &Bank {
        &self.banks[self.main]
    }

    pub fn main_mut(&mut self) -> &mut Bank {
        &mut self.banks[self.main]
    }

    #[must_use]
    pub fn alt(&self) -> &Bank {
        &self.banks[self.main ^ 1]
    }

    pub fn alt_mut(&mut self) -> &mut Bank {
        &mut self.banks[self.main ^ 1]
    }

    /// EXX: swap BC, DE and HL with their shadows. AF stays put.
    pub fn exx(&mut self) {
        let (a, f) = (self.main().a, self.main().f);
        let (a_alt, f_alt) = (self.alt().a, self.alt().f);
        self.main ^= 1;
        let main = self.main_mut();
        main.a = a;
        main.f = f;
        let alt = self.alt_mut();
        alt.a = a_alt;
        alt.f = f_alt;
    }

    /// EX AF,AF'.
    pub fn ex_af(&mut self) {
        let [first, second] = &mut self.banks;
        std::mem::swap(&mut first.a, &mut second.a);
        std::mem::swap(&mut first.f, &mut second.f);
    }

    /// Increment the refresh register. Bit 7 is left alone.
    pub fn inc_r(&mut self) {
        self.r = (self.r & 0x80) | (self.r.wrapping_add(1) & 0x7F);
    }

    #[must_use]
    pub fn a(&self) -> u8 {
        self.main().a
    }

    pub fn set_a(&mut self, value: u8) {
        self.main_mut().a = value;
    }

    #[must_use]
    pub fn f(&self) -> u8 {
        self.main().f
    }

    pub fn set_f(&mut self, value: u8) {
        self.main_mut().f = value;
    }

    #[must_use]
    pub fn af(&self) -> u16 {
        pair(self.main().a, self.main().f)
    }

    #[must_use]
    pub fn bc(&self) -> u16 {
        pair(self.main().b, self.main().c)
    }

    #[must_use]
    pub fn de(&self) -> u16 {
        pair(self.main().d, self.main().e)
    }

    #[must_use]
    pub fn hl(&self) -> u16 {
        pair(self.main().h, self.main().l)
    }

    pub fn set_af(&mut self, value: u16) {
        let [hi, lo] = value.to_be_bytes();
        let main = self.main_mut();
        main.a = hi;
        main.f = lo;
    }

    pub fn set_bc(&mut self, value: u16) {
        let [hi, lo] = value.to_be_bytes();
        let main = self.main_mut();
        main.b = hi;
        main.c = lo;
    }

    pub fn set_de(&mut self, value: u16) {
        let [hi, lo] = value.to_be_bytes();
        let main = self.main_mut();
        main.d = hi;
        main.e = lo;
    }

    pub fn set_hl(&mut self, value: u16) {
        let [hi, lo] = value.to_be_bytes();
        let main = self.main_mut();
        main.h = hi;
        main.l = lo;
    }

    /// Read an 8-bit register.
    #[must_use]
    pub fn get8(&self, reg: Reg8) -> u8 {
        let main = self.main();
        match reg {
            Reg8::A => main.a,
            Reg8::B => main.b,
            Reg8::C => main.c,
            Reg8::D => main.d,
            Reg8::E => main.e,
            Reg8::H => main.h,
            Reg8::L => main.l,
            Reg8::Ixh => (self.ix >> 8) as u8,
            Reg8::Ixl => self.ix as u8,
            Reg8::Iyh => (self.iy >> 8) as u8,
            Reg8::Iyl => self.iy as u8,
        }
    }

    /// Write an 8-bit register.
    pub fn set8(&mut self, reg: Reg8, value: u8) {
        match reg {
            Reg8::A => self.main_mut().a = value,
            Reg8::B => self.main_mut().b = value,
            Reg8::C => self.main_mut().c = value,
            Reg8::D => self.main_mut().d = value,
            Reg8::E => self.main_mut().e = value,
            Reg8::H => self.main_mut().h = value,
            Reg8::L => self.main_mut().l = value,
            Reg8::Ixh => self.ix = (self.ix & 0x00FF) | (u16::from(value) << 8),
            Reg8::Ixl => self.ix = (self.ix & 0xFF00) | u16::from(value),
            Reg8::Iyh => self.iy = (self.iy & 0x00FF) | (u16::from(value) << 8),
            Reg8::Iyl => self.iy = (self.iy & 0xFF00) | u16::from(value),
        }
    }

    /// Read a register pair.
    #[must_use]
    pub fn get16(&self, reg: Reg16) -> u16 {
        match reg {
            Reg16::AF => self.af(),
            Reg16::BC => self.bc(),
            Reg16::DE => self.de(),
            Reg16::HL => self.hl(),
            Reg16::SP => self.sp,
            Reg16::IX => self.ix,
            Reg16::IY => self.iy,
        }
    }

    /// Write a register pair.
    pub fn set16(&mut self, reg: Reg16, value: u16) {
        match reg {
            Reg16::AF => self.set_af(value),
            Reg16::BC => self.set_bc(value),
            Reg16::DE => self.set_de(value),
            Reg16::HL => self.set_hl(value),
            Reg16::SP => self.sp = value,
            Reg16::IX => self.ix = value,
            Reg16::IY => self.iy = value,
        }
    }

    /// True if every bit in `mask` is set in F.
    #[must_use]
    pub fn flag(&self, mask: u8) -> bool {
        self.f() & mask == mask
    }

    pub fn set_flag(&mut self, mask: u8, on: bool) {
        let f = self.f();
        self.set_f(if on { f | mask } else { f & !mask });
    }

    #[must_use]
    pub fn sign(&self) -> bool {
        self.flag(SF)
    }

    #[must_use]
    pub fn zero(&self) -> bool {
        self.flag(ZF)
    }

    #[must_use]
    pub fn flag5(&self) -> bool {
        self.flag(YF)
    }

    #[must_use]
    pub fn half_carry(&self) -> bool {
        self.flag(HF)
    }

    #[must_use]
    pub fn flag3(&self) -> bool {
        self.flag(XF)
    }

    #[must_use]
    pub fn parity_overflow(&self) -> bool {
        self.flag(PF)
    }

    #[must_use]
    pub fn subtract(&self) -> bool {
        self.flag(NF)
    }

    #[must_use]
    pub fn carry(&self) -> bool {
        self.flag(CF)
    }

    /// F rendered as `SZ5H3PNC`, with `-` for clear bits.
    #[must_use]
    pub fn flags_string(&self) -> String {
        let f = self.f();
        FLAG_LETTERS
            .iter()
            .map(|&(mask, letter)| if f & mask != 0 { letter } else { '-' })
            .collect()
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

/// Registers compare by what software can see, not by which bank is main.
impl PartialEq for Registers {
    fn eq(&self, other: &Self) -> bool {
        self.main() == other.main()
            && self.alt() == other.alt()
            && self.ix == other.ix
            && self.iy == other.iy
            && self.sp == other.sp
            && self.pc == other.pc
            && self.i == other.i
            && self.r == other.r
            && self.iff1 == other.iff1
            && self.iff2 == other.iff2
            && self.im == other.im
    }
}

impl Eq for Registers {}

impl fmt::Display for Registers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AF={:04X} BC={:04X} DE={:04X} HL={:04X} IX={:04X} IY={:04X} SP={:04X} PC={:04X} I={:02X} R={:02X} IM{} IFF1={} [{}]",
            self.af(),
            self.bc(),
            self.de(),
            self.hl(),
            self.ix,
            self.iy,
            self.sp,
            self.pc,
            self.i,
            self.r,
            self.im,
            u8::from(self.iff1),
            self.flags_string()
        )
    }
}

const fn pair(hi: u8, lo: u8) -> u16 {
    (hi as u16) << 8 | lo as u16
}

pub(crate) const QUERY_PATHS: &[&str] = &[
    "a", "f", "b", "c", "d", "e", "h", "l", "af", "bc", "de", "hl", "af'", "bc'", "de'", "hl'",
    "ix", "iy", "ixh", "ixl", "iyh", "iyl", "sp", "pc", "i", "r", "iff1", "iff2", "im", "flags.s",
    "flags.z", "flags.5", "flags.h", "flags.3", "flags.p", "flags.n", "flags.c",
];

impl Observable for Registers {
    fn query(&self, path: &str) -> Option<Value> {
        let alt = self.alt();
        let value = match path.to_ascii_lowercase().as_str() {
            "a" => self.a().into(),
            "f" => self.f().into(),
            "b" => self.main().b.into(),
            "c" => self.main().c.into(),
            "d" => self.main().d.into(),
            "e" => self.main().e.into(),
            "h" => self.main().h.into(),
            "l" => self.main().l.into(),
            "af" => self.af().into(),
            "bc" => self.bc().into(),
            "de" => self.de().into(),
            "hl" => self.hl().into(),
            "af'" => pair(alt.a, alt.f).into(),
            "bc'" => pair(alt.b, alt.c).into(),
            "de'" => pair(alt.d, alt.e).into(),
            "hl'" => pair(alt.h, alt.l).into(),
            "ix" => self.ix.into(),
            "iy" => self.iy.into(),
            "ixh" => self.get8(Reg8::Ixh).into(),
            "ixl" => self.get8(Reg8::Ixl).into(),
            "iyh" => self.get8(Reg8::Iyh).into(),
            "iyl" => self.get8(Reg8::Iyl).into(),
            "sp" => self.sp.into(),
            "pc" => self.pc.into(),
            "i" => self.i.into(),
            "r" => self.r.into(),
            "iff1" => self.iff1.into(),
            "iff2" => self.iff2.into(),
            "im" => self.im.into(),
            "flags.s" => self.sign().into(),
            "flags.z" => self.zero().into(),
            "flags.5" => self.flag5().into(),
            "flags.h" => self.half_carry().into(),
            "flags.3" => self.flag3().into(),
            "flags.p" => self.parity_overflow().into(),
            "flags.n" => self.subtract().into(),
            "flags.c" => self.carry().into(),
            _ => return None,
        };
        Some(value)
    }

    fn query_paths(&self) -> &'static [&'static str] {
        QUERY_PATHS
    }
}
