//! Disassembly.

use std::fmt;

use emu_core::Memory;

use crate::table::{InstructionTable, Resolved};

/// One disassembled instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disassembly {
    pub address: u16,
    pub bytes: Vec<u8>,
    pub mnemonic: String,
}

impl Disassembly {
    /// Address of the following instruction.
    #[must_use]
    pub fn next_address(&self) -> u16 {
        self.address.wrapping_add(self.bytes.len() as u16)
    }
}

impl fmt::Display for Disassembly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self
            .bytes
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(" ");
        write!(f, "{:04X}  {bytes:<12}{}", self.address, self.mnemonic)
    }
}

/// Disassemble the instruction at `addr`.
///
/// Unused ED opcodes and ignored DD/FD prefixes disassemble as the
/// fallbacks the CPU executes; anything else undecodable becomes `DB`.
#[must_use]
pub fn disassemble(memory: &Memory, addr: u16) -> Disassembly {
    match InstructionTable::global().resolve(memory, addr) {
        Resolved::Exact(instruction) | Resolved::Fallback(instruction) => Disassembly {
            address: addr,
            bytes: memory.read_range(addr, instruction.byte_count()),
            mnemonic: instruction.render(memory, addr),
        },
        Resolved::Missing => Disassembly {
            address: addr,
            bytes: vec![memory.peek(addr)],
            mnemonic: format!("DB {:02X}h", memory.peek(addr)),
        },
    }
}

/// Disassemble `count` consecutive instructions starting at `addr`.
#[must_use]
pub fn disassemble_range(memory: &Memory, addr: u16, count: usize) -> Vec<Disassembly> {
    let mut out = Vec::with_capacity(count);
    let mut addr = addr;
    for _ in 0..count {
        let line = disassemble(memory, addr);
        addr = line.next_address();
        out.push(line);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing() {
        let mut memory = Memory::new();
        // LD A,2; JR -2; DD 36 05 7F; ED 77
        memory.load_data(&[0x3E, 0x02, 0x18, 0xFC, 0xDD, 0x36, 0x05, 0x7F, 0xED, 0x77], 0x8000);
        let lines = disassemble_range(&memory, 0x8000, 4);
        let text: Vec<String> = lines.iter().map(|l| l.mnemonic.clone()).collect();
        assert_eq!(text, ["LD A,02h", "JR 8000h", "LD (IX+05h),7Fh", "NOP NOP"]);
        assert_eq!(lines[2].bytes, vec![0xDD, 0x36, 0x05, 0x7F]);
        assert_eq!(lines[3].next_address(), 0x800A);
        assert_eq!(lines[0].to_string(), "8000  3E 02       LD A,02h");
    }
}
