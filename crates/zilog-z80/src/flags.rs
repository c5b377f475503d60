//! Z80 flag register bits.

/// Bit 7: result negative.
pub const SF: u8 = 0x80;
/// Bit 6: result zero.
pub const ZF: u8 = 0x40;
/// Bit 5, undocumented. Usually bit 5 of the result.
pub const YF: u8 = 0x20;
/// Bit 4: carry or borrow between the nibbles.
pub const HF: u8 = 0x10;
/// Bit 3, undocumented. Usually bit 3 of the result.
pub const XF: u8 = 0x08;
/// Bit 2: parity for logic ops, overflow for arithmetic.
pub const PF: u8 = 0x04;
/// Bit 1: last op subtracted. Read by DAA.
pub const NF: u8 = 0x02;
/// Bit 0.
pub const CF: u8 = 0x01;

/// Flag letters from bit 7 down to bit 0.
pub(crate) const FLAG_LETTERS: [(u8, char); 8] = [
    (SF, 'S'),
    (ZF, 'Z'),
    (YF, '5'),
    (HF, 'H'),
    (XF, '3'),
    (PF, 'P'),
    (NF, 'N'),
    (CF, 'C'),
];

/// Even parity: true when the byte has an even number of set bits.
#[must_use]
pub const fn parity(value: u8) -> bool {
    value.count_ones().is_multiple_of(2)
}

/// Sign, zero and the two undocumented bits for a result byte.
#[must_use]
pub const fn sz53(value: u8) -> u8 {
    let mut f = value & (SF | YF | XF);
    if value == 0 {
        f |= ZF;
    }
    f
}

/// [`sz53`] plus parity.
#[must_use]
pub const fn sz53p(value: u8) -> u8 {
    let mut f = sz53(value);
    if parity(value) {
        f |= PF;
    }
    f
}
