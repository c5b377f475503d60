//! Block transfer, compare and I/O instructions.
//!
//! The repeating forms run one iteration per step and wind PC back over
//! themselves while the counter is non-zero, so interrupts can land between
//! iterations just as on the real chip.

use crate::alu::parity_flag;
use crate::flags::{CF, HF, NF, PF, SF, XF, YF, ZF, sz53};
use crate::instruction::BlockOp;
use crate::registers::Reg8;

use super::Z80;

/// Bits 3 and 5 from the undocumented `n` value of LDx/CPx: bit 3 of `n`
/// goes to bit 3 and bit 1 of `n` goes to bit 5.
fn block_xy(n: u8) -> u8 {
    (n & XF) | ((n << 4) & YF)
}

/// Flags after INI/IND/OUTI/OUTD.
fn block_io_flags(value: u8, k: u16, b: u8) -> u8 {
    let mut f = sz53(b) | parity_flag(((k & 7) as u8) ^ b);
    if value & 0x80 != 0 {
        f |= NF;
    }
    if k > 0xFF {
        f |= HF | CF;
    }
    f
}

impl Z80 {
    /// One iteration of a block instruction. Returns true if it repeats.
    pub(super) fn block(&mut self, op: BlockOp, repeat: bool) -> bool {
        let delta: i16 = if op.increments() { 1 } else { -1 };
        let hl = self.regs.hl();
        let next_hl = hl.wrapping_add_signed(delta);

        let again = match op {
            BlockOp::Ldi | BlockOp::Ldd => {
                let de = self.regs.de();
                let value = self.memory.peek(hl);
                self.memory.poke(de, value);
                self.regs.set_hl(next_hl);
                self.regs.set_de(de.wrapping_add_signed(delta));
                let bc = self.regs.bc().wrapping_sub(1);
                self.regs.set_bc(bc);

                let n = value.wrapping_add(self.regs.a());
                let mut f = (self.regs.f() & (SF | ZF | CF)) | block_xy(n);
                if bc != 0 {
                    f |= PF;
                }
                self.regs.set_f(f);
                bc != 0
            }
            BlockOp::Cpi | BlockOp::Cpd => {
                let a = self.regs.a();
                let value = self.memory.peek(hl);
                let result = a.wrapping_sub(value);
                let half = (a & 0x0F) < (value & 0x0F);
                self.regs.set_hl(next_hl);
                let bc = self.regs.bc().wrapping_sub(1);
                self.regs.set_bc(bc);

                let n = result.wrapping_sub(u8::from(half));
                let mut f = (self.regs.f() & CF) | NF | (sz53(result) & (SF | ZF)) | block_xy(n);
                if half {
                    f |= HF;
                }
                if bc != 0 {
                    f |= PF;
                }
                self.regs.set_f(f);
                bc != 0 && result != 0
            }
            BlockOp::Ini | BlockOp::Ind => {
                let value = self.ports.read_port(self.regs.bc());
                self.memory.poke(hl, value);
                let b = self.regs.get8(Reg8::B).wrapping_sub(1);
                self.regs.set8(Reg8::B, b);
                self.regs.set_hl(next_hl);

                let c = self.regs.get8(Reg8::C).wrapping_add_signed(delta as i8);
                let k = u16::from(value) + u16::from(c);
                self.regs.set_f(block_io_flags(value, k, b));
                b != 0
            }
            BlockOp::Outi | BlockOp::Outd => {
                let value = self.memory.peek(hl);
                let b = self.regs.get8(Reg8::B).wrapping_sub(1);
                self.regs.set8(Reg8::B, b);
                let port = self.regs.get8(Reg8::C);
                self.ports.write_port(port, value);
                self.regs.set_hl(next_hl);

                let k = u16::from(value) + u16::from(next_hl as u8);
                self.regs.set_f(block_io_flags(value, k, b));
                b != 0
            }
        };

        if repeat && again {
            self.regs.pc = self.regs.pc.wrapping_sub(2);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use emu_core::PortHandler;
    use parking_lot::Mutex;

    use super::*;

    #[derive(Default, Clone)]
    struct Recorder {
        written: Arc<Mutex<Vec<(u8, u8)>>>,
    }

    impl PortHandler for Recorder {
        fn read_port(&mut self, port: u16) -> u8 {
            (port >> 8) as u8 ^ 0xA0
        }

        fn write_port(&mut self, port: u8, value: u8) {
            self.written.lock().push((port, value));
        }
    }

    fn cpu_with(program: &[u8]) -> Z80 {
        let mut cpu = Z80::new();
        cpu.memory_mut().load_data(program, 0);
        cpu
    }

    #[test]
    fn ldir_copies_and_repeats() {
        // LD HL,4000h; LD DE,5000h; LD BC,3; LDIR
        let mut cpu = cpu_with(&[0x21, 0x00, 0x40, 0x11, 0x00, 0x50, 0x01, 0x03, 0x00, 0xED, 0xB0]);
        cpu.memory_mut().load_data(&[1, 2, 3], 0x4000);
        for _ in 0..3 {
            cpu.step().unwrap();
        }
        assert_eq!(cpu.step().unwrap(), 21);
        assert_eq!(cpu.registers().pc, 9);
        assert_eq!(cpu.step().unwrap(), 21);
        assert_eq!(cpu.step().unwrap(), 16);
        assert_eq!(cpu.registers().pc, 11);
        assert_eq!(cpu.memory().read_range(0x5000, 3), vec![1, 2, 3]);
        assert_eq!(cpu.registers().bc(), 0);
        assert_eq!(cpu.registers().hl(), 0x4003);
        assert_eq!(cpu.registers().de(), 0x5003);
        assert!(!cpu.registers().parity_overflow());
    }

    #[test]
    fn lddr_walks_down() {
        // LD HL,4002h; LD DE,5002h; LD BC,3; LDDR
        let mut cpu = cpu_with(&[0x21, 0x02, 0x40, 0x11, 0x02, 0x50, 0x01, 0x03, 0x00, 0xED, 0xB8]);
        cpu.memory_mut().load_data(&[7, 8, 9], 0x4000);
        for _ in 0..6 {
            cpu.step().unwrap();
        }
        assert_eq!(cpu.memory().read_range(0x5000, 3), vec![7, 8, 9]);
        assert_eq!(cpu.registers().hl(), 0x3FFF);
    }

    #[test]
    fn cpir_stops_on_match() {
        // LD HL,4000h; LD BC,10; LD A,3; CPIR
        let mut cpu = cpu_with(&[0x21, 0x00, 0x40, 0x01, 0x0A, 0x00, 0x3E, 0x03, 0xED, 0xB1]);
        cpu.memory_mut().load_data(&[1, 2, 3, 4], 0x4000);
        for _ in 0..3 {
            cpu.step().unwrap();
        }
        let t: u32 = (0..3).map(|_| cpu.step().unwrap()).sum();
        assert_eq!(t, 21 + 21 + 16);
        assert_eq!(cpu.registers().pc, 10);
        assert_eq!(cpu.registers().hl(), 0x4003);
        assert_eq!(cpu.registers().bc(), 7);
        assert!(cpu.registers().zero());
        assert!(cpu.registers().parity_overflow());
        assert!(cpu.registers().subtract());
    }

    #[test]
    fn otir_writes_every_byte() {
        // LD HL,4000h; LD BC,02FEh; OTIR
        let mut cpu = cpu_with(&[0x21, 0x00, 0x40, 0x01, 0xFE, 0x02, 0xED, 0xB3]);
        let ports = Recorder::default();
        cpu.set_ports(ports.clone());
        cpu.memory_mut().load_data(&[0x11, 0x22], 0x4000);
        for _ in 0..4 {
            cpu.step().unwrap();
        }
        assert_eq!(*ports.written.lock(), vec![(0xFE, 0x11), (0xFE, 0x22)]);
        assert_eq!(cpu.registers().get8(Reg8::B), 0);
        assert!(cpu.registers().zero());
        assert_eq!(cpu.registers().pc, 8);
    }

    #[test]
    fn ini_reads_with_full_port_address() {
        // LD HL,4000h; LD BC,0510h; INI
        let mut cpu = cpu_with(&[0x21, 0x00, 0x40, 0x01, 0x10, 0x05, 0xED, 0xA2]);
        cpu.set_ports(Recorder::default());
        for _ in 0..3 {
            cpu.step().unwrap();
        }
        assert_eq!(cpu.memory().peek(0x4000), 0xA5);
        assert_eq!(cpu.registers().get8(Reg8::B), 4);
        assert_eq!(cpu.registers().hl(), 0x4001);
        // 0xA5 has bit 7 set; 0xA5 + 0x11 doesn't carry
        let f = cpu.registers().f();
        assert_ne!(f & NF, 0);
        assert_eq!(f & (HF | CF), 0);
    }
}
