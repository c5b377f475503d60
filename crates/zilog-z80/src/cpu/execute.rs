//! Instruction semantics.

use crate::alu::{self, AluOp};
use crate::flags::{CF, PF, sz53, sz53p};
use crate::instruction::{Op, Operand};
use crate::registers::{Reg8, Reg16};
use crate::table::BitAction;

use super::{Fetch, Z80};

impl Z80 {
    /// Run `op`. Returns true when the long timing applies (branch taken,
    /// block instruction repeating).
    pub(super) fn execute_op(&mut self, op: Op, at: Fetch) -> bool {
        match op {
            Op::Nop | Op::NopNop | Op::IgnoredPrefix => {}
            Op::Halt => {
                self.regs.pc = at.start;
                self.halted = true;
            }

            Op::Ld8(dst, src) => {
                let value = self.read(src, at);
                self.write(dst, at, value);
            }
            Op::LdAI => self.ld_a_special(self.regs.i),
            Op::LdAR => self.ld_a_special(self.regs.r),
            Op::LdIA => self.regs.i = self.regs.a(),
            Op::LdRA => self.regs.r = self.regs.a(),
            Op::Ld16Imm(rr) => {
                let value = self.imm16(at);
                self.regs.set16(rr, value);
            }
            Op::Ld16Load(rr) => {
                let value = self.memory.peek_word(self.imm16(at));
                self.regs.set16(rr, value);
            }
            Op::Ld16Store(rr) => {
                let addr = self.imm16(at);
                self.memory.poke_word(addr, self.regs.get16(rr));
            }
            Op::LdSp(rr) => self.regs.sp = self.regs.get16(rr),
            Op::Push(rr) => self.push_word(self.regs.get16(rr)),
            Op::Pop(rr) => {
                let value = self.pop_word();
                self.regs.set16(rr, value);
            }

            Op::ExAfAf => self.regs.ex_af(),
            Op::Exx => self.regs.exx(),
            Op::ExDeHl => {
                let (de, hl) = (self.regs.de(), self.regs.hl());
                self.regs.set_de(hl);
                self.regs.set_hl(de);
            }
            Op::ExSp(rr) => {
                let sp = self.regs.sp;
                let top = self.memory.peek_word(sp);
                self.memory.poke_word(sp, self.regs.get16(rr));
                self.regs.set16(rr, top);
            }

            Op::Alu(alu_op, src) => {
                let value = self.read(src, at);
                let result = alu::alu8(alu_op, self.regs.a(), value, self.regs.carry());
                if alu_op != AluOp::Cp {
                    self.regs.set_a(result.value);
                }
                self.regs.set_f(result.flags);
            }
            Op::Inc8(target) => {
                let result = alu::inc8(self.read(target, at), self.regs.f());
                self.write(target, at, result.value);
                self.regs.set_f(result.flags);
            }
            Op::Dec8(target) => {
                let result = alu::dec8(self.read(target, at), self.regs.f());
                self.write(target, at, result.value);
                self.regs.set_f(result.flags);
            }
            Op::Inc16(rr) => self.regs.set16(rr, self.regs.get16(rr).wrapping_add(1)),
            Op::Dec16(rr) => self.regs.set16(rr, self.regs.get16(rr).wrapping_sub(1)),
            Op::Add16(dst, src) => {
                let (value, flags) =
                    alu::add16(self.regs.get16(dst), self.regs.get16(src), self.regs.f());
                self.regs.set16(dst, value);
                self.regs.set_f(flags);
            }
            Op::Adc16(rr) => {
                let (value, flags) = alu::adc16(self.regs.hl(), self.regs.get16(rr), self.regs.carry());
                self.regs.set_hl(value);
                self.regs.set_f(flags);
            }
            Op::Sbc16(rr) => {
                let (value, flags) = alu::sbc16(self.regs.hl(), self.regs.get16(rr), self.regs.carry());
                self.regs.set_hl(value);
                self.regs.set_f(flags);
            }
            Op::Daa => self.accumulate(alu::daa),
            Op::Cpl => self.accumulate(alu::cpl),
            Op::Neg => self.accumulate(|a, _| alu::neg(a)),
            Op::Ccf => self.regs.set_f(alu::ccf(self.regs.a(), self.regs.f())),
            Op::Scf => self.regs.set_f(alu::scf(self.regs.a(), self.regs.f())),

            Op::Rlca => self.accumulate(alu::rlca),
            Op::Rrca => self.accumulate(alu::rrca),
            Op::Rla => self.accumulate(alu::rla),
            Op::Rra => self.accumulate(alu::rra),
            Op::Rld => self.rotate_digit(true),
            Op::Rrd => self.rotate_digit(false),
            Op::Shift(shift, target) => {
                let result = alu::shift8(shift, self.read(target, at), self.regs.carry());
                self.write(target, at, result.value);
                self.regs.set_f(result.flags);
            }
            Op::Bit(bit, target) => {
                let value = self.read(target, at);
                // Bits 3 and 5 leak from the high byte of the effective
                // address for (IX+d); registers and (HL) use the value.
                let xy = match target {
                    Operand::Indexed(_) => (self.indexed_addr(target, at) >> 8) as u8,
                    _ => value,
                };
                self.regs.set_f(alu::bit(bit, value, xy, self.regs.f()));
            }
            Op::Res(bit, target) => {
                let value = self.read(target, at) & !(1 << bit);
                self.write(target, at, value);
            }
            Op::Set(bit, target) => {
                let value = self.read(target, at) | (1 << bit);
                self.write(target, at, value);
            }

            Op::Jp(cc) => {
                if cc.is_none_or(|cc| cc.holds(self.regs.f())) {
                    self.regs.pc = self.imm16(at);
                }
            }
            Op::JpInd(rr) => self.regs.pc = self.regs.get16(rr),
            Op::Jr(cc) => {
                if cc.is_none_or(|cc| cc.holds(self.regs.f())) {
                    self.jump_relative(at);
                    return true;
                }
            }
            Op::Djnz => {
                let b = self.regs.get8(Reg8::B).wrapping_sub(1);
                self.regs.set8(Reg8::B, b);
                if b != 0 {
                    self.jump_relative(at);
                    return true;
                }
            }
            Op::Call(cc) => {
                if cc.is_none_or(|cc| cc.holds(self.regs.f())) {
                    self.push_word(at.next);
                    self.regs.pc = self.imm16(at);
                    return true;
                }
            }
            Op::Ret(cc) => {
                if cc.is_none_or(|cc| cc.holds(self.regs.f())) {
                    self.regs.pc = self.pop_word();
                    return true;
                }
            }
            Op::Reti | Op::Retn => self.retn(),
            Op::Rst(vector) => {
                self.push_word(at.next);
                self.regs.pc = u16::from(vector);
            }

            Op::Di => {
                self.regs.iff1 = false;
                self.regs.iff2 = false;
            }
            Op::Ei => {
                self.regs.iff1 = true;
                self.regs.iff2 = true;
                self.ei_just_executed = true;
            }
            Op::Im(mode) => self.regs.im = mode,

            Op::InAN => {
                let port = (u16::from(self.regs.a()) << 8) | u16::from(self.imm8(at));
                let value = self.ports.read_port(port);
                self.regs.set_a(value);
            }
            Op::OutNA => {
                let port = self.imm8(at);
                let value = self.regs.a();
                self.ports.write_port(port, value);
            }
            Op::InC(target) => {
                let port = self.regs.bc();
                let value = self.ports.read_port(port);
                if let Some(reg) = target {
                    self.regs.set8(reg, value);
                }
                self.regs.set_f(sz53p(value) | (self.regs.f() & CF));
            }
            Op::OutC(source) => {
                let value = source.map_or(0, |reg| self.regs.get8(reg));
                let port = self.regs.get8(Reg8::C);
                self.ports.write_port(port, value);
            }
            Op::Block(block, repeat) => return self.block(block, repeat),
        }
        false
    }

    /// `RLC (IX+d),r` and friends: modify memory, then copy the result into
    /// `target` as well.
    pub(crate) fn indexed_bit_copy(&mut self, pair: Reg16, action: BitAction, target: Reg8, value_addr: u16) {
        let offset = self.memory.peek(value_addr) as i8;
        let addr = self.regs.get16(pair).wrapping_add_signed(i16::from(offset));
        let value = self.memory.peek(addr);
        let result = match action {
            BitAction::Shift(shift) => {
                let result = alu::shift8(shift, value, self.regs.carry());
                self.regs.set_f(result.flags);
                result.value
            }
            BitAction::Res(bit) => value & !(1 << bit),
            BitAction::Set(bit) => value | (1 << bit),
        };
        self.memory.poke(addr, result);
        self.regs.set8(target, result);
    }

    fn imm8(&self, at: Fetch) -> u8 {
        self.memory.peek(at.next.wrapping_sub(1))
    }

    fn imm16(&self, at: Fetch) -> u16 {
        self.memory.peek_word(at.next.wrapping_sub(2))
    }

    /// Effective address of a memory operand.
    fn indexed_addr(&self, operand: Operand, at: Fetch) -> u16 {
        match operand {
            Operand::Indirect(rr) => self.regs.get16(rr),
            Operand::Indexed(rr) => {
                // The displacement always follows the prefix and opcode.
                let offset = self.memory.peek(at.start.wrapping_add(2)) as i8;
                self.regs.get16(rr).wrapping_add_signed(i16::from(offset))
            }
            Operand::Absolute => self.imm16(at),
            Operand::Reg(_) | Operand::Immediate => 0,
        }
    }

    fn read(&self, operand: Operand, at: Fetch) -> u8 {
        match operand {
            Operand::Reg(reg) => self.regs.get8(reg),
            Operand::Immediate => self.imm8(at),
            memory => self.memory.peek(self.indexed_addr(memory, at)),
        }
    }

    fn write(&mut self, operand: Operand, at: Fetch, value: u8) {
        match operand {
            Operand::Reg(reg) => self.regs.set8(reg, value),
            // Never a destination.
            Operand::Immediate => {}
            memory => {
                let addr = self.indexed_addr(memory, at);
                self.memory.poke(addr, value);
            }
        }
    }

    fn jump_relative(&mut self, at: Fetch) {
        let offset = self.imm8(at) as i8;
        self.regs.pc = at.next.wrapping_add_signed(i16::from(offset));
    }

    /// Apply an accumulator-only ALU function.
    fn accumulate(&mut self, f: impl FnOnce(u8, u8) -> alu::AluResult) {
        let result = f(self.regs.a(), self.regs.f());
        self.regs.set_a(result.value);
        self.regs.set_f(result.flags);
    }

    /// `LD A,I` / `LD A,R`: P/V reports IFF2.
    fn ld_a_special(&mut self, value: u8) {
        self.regs.set_a(value);
        let mut f = sz53(value) | (self.regs.f() & CF);
        if self.regs.iff2 {
            f |= PF;
        }
        self.regs.set_f(f);
    }

    /// RLD (`left`) or RRD: rotate BCD digits between A and (HL).
    fn rotate_digit(&mut self, left: bool) {
        let addr = self.regs.hl();
        let m = self.memory.peek(addr);
        let a = self.regs.a();
        let (new_m, new_a) = if left {
            ((m << 4) | (a & 0x0F), (a & 0xF0) | (m >> 4))
        } else {
            ((a << 4) | (m >> 4), (a & 0xF0) | (m & 0x0F))
        };
        self.memory.poke(addr, new_m);
        self.regs.set_a(new_a);
        self.regs.set_f(sz53p(new_a) | (self.regs.f() & CF));
    }
}
