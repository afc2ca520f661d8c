//! SM83 interpreter: primary opcode table, CB-prefixed table, flag
//! semantics, HALT/EI/interrupt dispatch.

use crate::bus::Bus;
use crate::error::{EmuError, EmuResult};
use log::warn;

const FLAG_Z: u8 = 0x80;
const FLAG_N: u8 = 0x40;
const FLAG_H: u8 = 0x20;
const FLAG_C: u8 = 0x10;

#[derive(Debug, Default)]
pub struct Registers {
    pub a: u8,
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,
    pub pc: u16,
    pub sp: u16,
}

impl Registers {
    pub fn af(&self) -> u16 {
        (self.a as u16) << 8 | self.f as u16
    }
    pub fn set_af(&mut self, val: u16) {
        self.a = (val >> 8) as u8;
        self.f = (val as u8) & 0xF0;
    }
    pub fn bc(&self) -> u16 {
        (self.b as u16) << 8 | self.c as u16
    }
    pub fn set_bc(&mut self, val: u16) {
        self.b = (val >> 8) as u8;
        self.c = val as u8;
    }
    pub fn de(&self) -> u16 {
        (self.d as u16) << 8 | self.e as u16
    }
    pub fn set_de(&mut self, val: u16) {
        self.d = (val >> 8) as u8;
        self.e = val as u8;
    }
    pub fn hl(&self) -> u16 {
        (self.h as u16) << 8 | self.l as u16
    }
    pub fn set_hl(&mut self, val: u16) {
        self.h = (val >> 8) as u8;
        self.l = val as u8;
    }
}

/// Post-boot-ROM register state. There is no boot ROM execution (spec
/// Non-goals), so the CPU starts directly at these DMG post-boot values.
impl Registers {
    fn post_boot() -> Self {
        Self {
            a: 0x01,
            f: 0xB0,
            b: 0x00,
            c: 0x13,
            d: 0x00,
            e: 0xD8,
            h: 0x01,
            l: 0x4D,
            sp: 0xFFFE,
            pc: 0x0100,
        }
    }
}

pub struct Cpu {
    pub registers: Registers,
    pub bus: Bus,
    pub ime: bool,
    pub halted: bool,
    /// Counts down from 2 after EI; IME is latched true when it reaches 0,
    /// so the instruction immediately following EI still runs with
    /// interrupts disabled.
    ei_delay: u8,
}

impl Cpu {
    pub fn new(bus: Bus) -> Self {
        Self {
            registers: Registers::post_boot(),
            bus,
            ime: false,
            halted: false,
            ei_delay: 0,
        }
    }

    /// Executes one instruction (or services one pending interrupt, or idles
    /// one step while halted) and returns the T-cycles it consumed.
    pub fn step(&mut self) -> EmuResult<u32> {
        if self.halted {
            if self.bus.interrupts.pending() != 0 {
                self.halted = false;
            } else {
                return Ok(4);
            }
        }

        let result = if self.ime && self.bus.interrupts.pending() != 0 {
            Ok(self.dispatch_interrupt())
        } else {
            let opcode = self.fetch8();
            self.execute(opcode)
        };

        // EI's effect is delayed until the instruction following it has
        // finished, so the countdown is applied after execution rather than
        // before the next fetch.
        if self.ei_delay > 0 {
            self.ei_delay -= 1;
            if self.ei_delay == 0 {
                self.ime = true;
            }
        }

        result
    }

    fn dispatch_interrupt(&mut self) -> u32 {
        self.ime = false;
        let vector = self
            .bus
            .interrupts
            .take_highest_priority()
            .expect("pending() was checked nonzero by the caller");
        self.push16(self.registers.pc);
        self.registers.pc = vector;
        20
    }

    fn fetch8(&mut self) -> u8 {
        let val = self.bus.read8(self.registers.pc);
        self.registers.pc = self.registers.pc.wrapping_add(1);
        val
    }

    fn fetch16(&mut self) -> u16 {
        let lo = self.fetch8();
        let hi = self.fetch8();
        (hi as u16) << 8 | lo as u16
    }

    fn push16(&mut self, val: u16) {
        self.registers.sp = self.registers.sp.wrapping_sub(1);
        self.bus.write8(self.registers.sp, (val >> 8) as u8);
        self.registers.sp = self.registers.sp.wrapping_sub(1);
        self.bus.write8(self.registers.sp, val as u8);
    }

    fn pop16(&mut self) -> u16 {
        let lo = self.bus.read8(self.registers.sp);
        self.registers.sp = self.registers.sp.wrapping_add(1);
        let hi = self.bus.read8(self.registers.sp);
        self.registers.sp = self.registers.sp.wrapping_add(1);
        (hi as u16) << 8 | lo as u16
    }

    fn get_r8(&mut self, idx: u8) -> u8 {
        match idx {
            0 => self.registers.b,
            1 => self.registers.c,
            2 => self.registers.d,
            3 => self.registers.e,
            4 => self.registers.h,
            5 => self.registers.l,
            6 => self.bus.read8(self.registers.hl()),
            7 => self.registers.a,
            _ => unreachable!(),
        }
    }

    fn set_r8(&mut self, idx: u8, val: u8) {
        match idx {
            0 => self.registers.b = val,
            1 => self.registers.c = val,
            2 => self.registers.d = val,
            3 => self.registers.e = val,
            4 => self.registers.h = val,
            5 => self.registers.l = val,
            6 => {
                let addr = self.registers.hl();
                self.bus.write8(addr, val);
            }
            7 => self.registers.a = val,
            _ => unreachable!(),
        }
    }

    fn get_rp(&self, idx: u8) -> u16 {
        match idx {
            0 => self.registers.bc(),
            1 => self.registers.de(),
            2 => self.registers.hl(),
            3 => self.registers.sp,
            _ => unreachable!(),
        }
    }

    fn set_rp(&mut self, idx: u8, val: u16) {
        match idx {
            0 => self.registers.set_bc(val),
            1 => self.registers.set_de(val),
            2 => self.registers.set_hl(val),
            3 => self.registers.sp = val,
            _ => unreachable!(),
        }
    }

    fn get_rp2(&self, idx: u8) -> u16 {
        match idx {
            0 => self.registers.bc(),
            1 => self.registers.de(),
            2 => self.registers.hl(),
            3 => self.registers.af(),
            _ => unreachable!(),
        }
    }

    fn set_rp2(&mut self, idx: u8, val: u16) {
        match idx {
            0 => self.registers.set_bc(val),
            1 => self.registers.set_de(val),
            2 => self.registers.set_hl(val),
            3 => self.registers.set_af(val),
            _ => unreachable!(),
        }
    }

    fn test_cc(&self, idx: u8) -> bool {
        match idx {
            0 => self.registers.f & FLAG_Z == 0,
            1 => self.registers.f & FLAG_Z != 0,
            2 => self.registers.f & FLAG_C == 0,
            3 => self.registers.f & FLAG_C != 0,
            _ => unreachable!(),
        }
    }

    fn add8(&mut self, val: u8) {
        let a = self.registers.a;
        let (res, carry) = a.overflowing_add(val);
        let half = (a & 0x0F) + (val & 0x0F) > 0x0F;
        self.registers.f = z(res) | h(half) | c(carry);
        self.registers.a = res;
    }

    fn adc8(&mut self, val: u8) {
        let a = self.registers.a;
        let carry_in = (self.registers.f & FLAG_C != 0) as u8;
        let res = a.wrapping_add(val).wrapping_add(carry_in);
        let half = (a & 0x0F) + (val & 0x0F) + carry_in > 0x0F;
        let carry = a as u16 + val as u16 + carry_in as u16 > 0xFF;
        self.registers.f = z(res) | h(half) | c(carry);
        self.registers.a = res;
    }

    fn sub8(&mut self, val: u8) -> u8 {
        let a = self.registers.a;
        let (res, carry) = a.overflowing_sub(val);
        let half = (a & 0x0F) < (val & 0x0F);
        self.registers.f = FLAG_N | z(res) | h(half) | c(carry);
        res
    }

    fn sbc8(&mut self, val: u8) {
        let a = self.registers.a;
        let carry_in = (self.registers.f & FLAG_C != 0) as i16;
        let res = a.wrapping_sub(val).wrapping_sub(carry_in as u8);
        let half = (a as i16 & 0x0F) - (val as i16 & 0x0F) - carry_in < 0;
        let carry = a as i16 - val as i16 - carry_in < 0;
        self.registers.f = FLAG_N | z(res) | h(half) | c(carry);
        self.registers.a = res;
    }

    fn and8(&mut self, val: u8) {
        self.registers.a &= val;
        self.registers.f = FLAG_H | z(self.registers.a);
    }

    fn xor8(&mut self, val: u8) {
        self.registers.a ^= val;
        self.registers.f = z(self.registers.a);
    }

    fn or8(&mut self, val: u8) {
        self.registers.a |= val;
        self.registers.f = z(self.registers.a);
    }

    fn alu(&mut self, op: u8, val: u8) {
        match op {
            0 => self.add8(val),
            1 => self.adc8(val),
            2 => self.registers.a = self.sub8(val),
            3 => self.sbc8(val),
            4 => self.and8(val),
            5 => self.xor8(val),
            6 => self.or8(val),
            7 => {
                self.sub8(val);
            }
            _ => unreachable!(),
        }
    }

    fn inc8(&mut self, val: u8) -> u8 {
        let res = val.wrapping_add(1);
        let half = val & 0x0F == 0x0F;
        self.registers.f = (self.registers.f & FLAG_C) | z(res) | h(half);
        res
    }

    fn dec8(&mut self, val: u8) -> u8 {
        let res = val.wrapping_sub(1);
        let half = val & 0x0F == 0;
        self.registers.f = (self.registers.f & FLAG_C) | FLAG_N | z(res) | h(half);
        res
    }

    fn add_hl(&mut self, val: u16) {
        let hl = self.registers.hl();
        let (res, carry) = hl.overflowing_add(val);
        let half = (hl & 0x0FFF) + (val & 0x0FFF) > 0x0FFF;
        self.registers.f = (self.registers.f & FLAG_Z) | h(half) | c(carry);
        self.registers.set_hl(res);
    }

    /// Shared flag logic for `ADD SP,s8` and `LD HL,SP+s8`: both compute the
    /// carries from an unsigned byte-wise addition of the signed offset.
    fn add_sp_signed(&mut self, offset: i8) -> u16 {
        let sp = self.registers.sp;
        let offset16 = offset as i16 as u16;
        let res = sp.wrapping_add(offset16);
        let half = (sp & 0x000F) + (offset16 & 0x000F) > 0x000F;
        let carry = (sp & 0x00FF) + (offset16 & 0x00FF) > 0x00FF;
        self.registers.f = h(half) | c(carry);
        res
    }

    fn rlca(&mut self) {
        let a = self.registers.a;
        let carry = a & 0x80 != 0;
        self.registers.a = (a << 1) | carry as u8;
        self.registers.f = c(carry);
    }

    fn rrca(&mut self) {
        let a = self.registers.a;
        let carry = a & 0x01 != 0;
        self.registers.a = (a >> 1) | ((carry as u8) << 7);
        self.registers.f = c(carry);
    }

    fn rla(&mut self) {
        let a = self.registers.a;
        let carry_in = (self.registers.f & FLAG_C != 0) as u8;
        let carry = a & 0x80 != 0;
        self.registers.a = (a << 1) | carry_in;
        self.registers.f = c(carry);
    }

    fn rra(&mut self) {
        let a = self.registers.a;
        let carry_in = if self.registers.f & FLAG_C != 0 { 0x80 } else { 0 };
        let carry = a & 0x01 != 0;
        self.registers.a = (a >> 1) | carry_in;
        self.registers.f = c(carry);
    }

    fn set_flags_rot(&mut self, res: u8, carry: bool) {
        self.registers.f = z(res) | c(carry);
    }

    fn rlc(&mut self, val: u8) -> u8 {
        let carry = val & 0x80 != 0;
        let res = (val << 1) | carry as u8;
        self.set_flags_rot(res, carry);
        res
    }

    fn rrc(&mut self, val: u8) -> u8 {
        let carry = val & 0x01 != 0;
        let res = (val >> 1) | ((carry as u8) << 7);
        self.set_flags_rot(res, carry);
        res
    }

    fn rl(&mut self, val: u8) -> u8 {
        let carry_in = (self.registers.f & FLAG_C != 0) as u8;
        let carry = val & 0x80 != 0;
        let res = (val << 1) | carry_in;
        self.set_flags_rot(res, carry);
        res
    }

    fn rr(&mut self, val: u8) -> u8 {
        let carry_in = if self.registers.f & FLAG_C != 0 { 0x80 } else { 0 };
        let carry = val & 0x01 != 0;
        let res = (val >> 1) | carry_in;
        self.set_flags_rot(res, carry);
        res
    }

    fn sla(&mut self, val: u8) -> u8 {
        let carry = val & 0x80 != 0;
        let res = val << 1;
        self.set_flags_rot(res, carry);
        res
    }

    fn sra(&mut self, val: u8) -> u8 {
        let carry = val & 0x01 != 0;
        let res = (val >> 1) | (val & 0x80);
        self.set_flags_rot(res, carry);
        res
    }

    fn srl(&mut self, val: u8) -> u8 {
        let carry = val & 0x01 != 0;
        let res = val >> 1;
        self.set_flags_rot(res, carry);
        res
    }

    fn swap(&mut self, val: u8) -> u8 {
        let res = (val << 4) | (val >> 4);
        self.registers.f = z(res);
        res
    }

    fn bit(&mut self, b: u8, val: u8) {
        let is_set = (val >> b) & 1 != 0;
        self.registers.f = (self.registers.f & FLAG_C) | FLAG_H | z(!is_set as u8);
    }

    fn daa(&mut self) {
        let mut a = self.registers.a;
        let n = self.registers.f & FLAG_N != 0;
        let h = self.registers.f & FLAG_H != 0;
        let mut carry = self.registers.f & FLAG_C != 0;

        if !n {
            if carry || a > 0x99 {
                a = a.wrapping_add(0x60);
                carry = true;
            }
            if h || (a & 0x0F) > 0x09 {
                a = a.wrapping_add(0x06);
            }
        } else {
            if carry {
                a = a.wrapping_sub(0x60);
            }
            if h {
                a = a.wrapping_sub(0x06);
            }
        }

        self.registers.f = (self.registers.f & FLAG_N) | z(a) | c(carry);
        self.registers.a = a;
    }

    fn execute(&mut self, opcode: u8) -> EmuResult<u32> {
        match opcode {
            0x00 => Ok(4),

            0x01 | 0x11 | 0x21 | 0x31 => {
                let idx = (opcode >> 4) & 0x03;
                let val = self.fetch16();
                self.set_rp(idx, val);
                Ok(12)
            }
            0x02 => {
                self.bus.write8(self.registers.bc(), self.registers.a);
                Ok(8)
            }
            0x12 => {
                self.bus.write8(self.registers.de(), self.registers.a);
                Ok(8)
            }
            0x22 => {
                let addr = self.registers.hl();
                self.bus.write8(addr, self.registers.a);
                self.registers.set_hl(addr.wrapping_add(1));
                Ok(8)
            }
            0x32 => {
                let addr = self.registers.hl();
                self.bus.write8(addr, self.registers.a);
                self.registers.set_hl(addr.wrapping_sub(1));
                Ok(8)
            }
            0x0A => {
                self.registers.a = self.bus.read8(self.registers.bc());
                Ok(8)
            }
            0x1A => {
                self.registers.a = self.bus.read8(self.registers.de());
                Ok(8)
            }
            0x2A => {
                let addr = self.registers.hl();
                self.registers.a = self.bus.read8(addr);
                self.registers.set_hl(addr.wrapping_add(1));
                Ok(8)
            }
            0x3A => {
                let addr = self.registers.hl();
                self.registers.a = self.bus.read8(addr);
                self.registers.set_hl(addr.wrapping_sub(1));
                Ok(8)
            }
            0x03 | 0x13 | 0x23 | 0x33 => {
                let idx = (opcode >> 4) & 0x03;
                let val = self.get_rp(idx).wrapping_add(1);
                self.set_rp(idx, val);
                Ok(8)
            }
            0x0B | 0x1B | 0x2B | 0x3B => {
                let idx = (opcode >> 4) & 0x03;
                let val = self.get_rp(idx).wrapping_sub(1);
                self.set_rp(idx, val);
                Ok(8)
            }
            0x09 | 0x19 | 0x29 | 0x39 => {
                let idx = (opcode >> 4) & 0x03;
                let val = self.get_rp(idx);
                self.add_hl(val);
                Ok(8)
            }
            0x08 => {
                let addr = self.fetch16();
                let sp = self.registers.sp;
                self.bus.write8(addr, sp as u8);
                self.bus.write8(addr.wrapping_add(1), (sp >> 8) as u8);
                Ok(20)
            }

            0x07 => {
                self.rlca();
                Ok(4)
            }
            0x0F => {
                self.rrca();
                Ok(4)
            }
            0x17 => {
                self.rla();
                Ok(4)
            }
            0x1F => {
                self.rra();
                Ok(4)
            }

            0x10 => {
                self.fetch8(); // STOP's mandatory second byte; low-power mode not modeled
                Ok(4)
            }
            0x18 => {
                let off = self.fetch8() as i8;
                self.registers.pc = self.registers.pc.wrapping_add(off as i16 as u16);
                Ok(12)
            }
            0x20 | 0x28 | 0x30 | 0x38 => {
                let cc = (opcode >> 3) & 0x03;
                let off = self.fetch8() as i8;
                if self.test_cc(cc) {
                    self.registers.pc = self.registers.pc.wrapping_add(off as i16 as u16);
                    Ok(12)
                } else {
                    Ok(8)
                }
            }

            0x76 => {
                self.halted = true;
                Ok(4)
            }
            0x40..=0x7F => {
                let dst = (opcode >> 3) & 0x07;
                let src = opcode & 0x07;
                let val = self.get_r8(src);
                self.set_r8(dst, val);
                Ok(if dst == 6 || src == 6 { 8 } else { 4 })
            }

            0x04 | 0x0C | 0x14 | 0x1C | 0x24 | 0x2C | 0x34 | 0x3C => {
                let r = (opcode >> 3) & 0x07;
                let val = self.get_r8(r);
                let res = self.inc8(val);
                self.set_r8(r, res);
                Ok(if r == 6 { 12 } else { 4 })
            }
            0x05 | 0x0D | 0x15 | 0x1D | 0x25 | 0x2D | 0x35 | 0x3D => {
                let r = (opcode >> 3) & 0x07;
                let val = self.get_r8(r);
                let res = self.dec8(val);
                self.set_r8(r, res);
                Ok(if r == 6 { 12 } else { 4 })
            }
            0x06 | 0x0E | 0x16 | 0x1E | 0x26 | 0x2E | 0x36 | 0x3E => {
                let r = (opcode >> 3) & 0x07;
                let val = self.fetch8();
                self.set_r8(r, val);
                Ok(if r == 6 { 12 } else { 8 })
            }

            0x80..=0xBF => {
                let op = (opcode >> 3) & 0x07;
                let r = opcode & 0x07;
                let val = self.get_r8(r);
                self.alu(op, val);
                Ok(if r == 6 { 8 } else { 4 })
            }
            0xC6 | 0xCE | 0xD6 | 0xDE | 0xE6 | 0xEE | 0xF6 | 0xFE => {
                let op = (opcode >> 3) & 0x07;
                let val = self.fetch8();
                self.alu(op, val);
                Ok(8)
            }

            0xC0 | 0xC8 | 0xD0 | 0xD8 => {
                let cc = (opcode >> 3) & 0x03;
                if self.test_cc(cc) {
                    self.registers.pc = self.pop16();
                    Ok(20)
                } else {
                    Ok(8)
                }
            }
            0xC9 => {
                self.registers.pc = self.pop16();
                Ok(16)
            }
            0xD9 => {
                self.registers.pc = self.pop16();
                self.ime = true;
                Ok(16)
            }
            0xC1 | 0xD1 | 0xE1 | 0xF1 => {
                let idx = (opcode >> 4) & 0x03;
                let val = self.pop16();
                self.set_rp2(idx, val);
                Ok(12)
            }
            0xC5 | 0xD5 | 0xE5 | 0xF5 => {
                let idx = (opcode >> 4) & 0x03;
                let val = self.get_rp2(idx);
                self.push16(val);
                Ok(16)
            }
            0xC2 | 0xCA | 0xD2 | 0xDA => {
                let cc = (opcode >> 3) & 0x03;
                let addr = self.fetch16();
                if self.test_cc(cc) {
                    self.registers.pc = addr;
                    Ok(16)
                } else {
                    Ok(12)
                }
            }
            0xC3 => {
                self.registers.pc = self.fetch16();
                Ok(16)
            }
            0xE9 => {
                self.registers.pc = self.registers.hl();
                Ok(4)
            }
            0xC4 | 0xCC | 0xD4 | 0xDC => {
                let cc = (opcode >> 3) & 0x03;
                let addr = self.fetch16();
                if self.test_cc(cc) {
                    self.push16(self.registers.pc);
                    self.registers.pc = addr;
                    Ok(24)
                } else {
                    Ok(12)
                }
            }
            0xCD => {
                let addr = self.fetch16();
                self.push16(self.registers.pc);
                self.registers.pc = addr;
                Ok(24)
            }
            0xC7 | 0xCF | 0xD7 | 0xDF | 0xE7 | 0xEF | 0xF7 | 0xFF => {
                let target = (opcode & 0x38) as u16;
                self.push16(self.registers.pc);
                self.registers.pc = target;
                Ok(16)
            }

            0xE0 => {
                let off = self.fetch8();
                self.bus.write8(0xFF00 + off as u16, self.registers.a);
                Ok(12)
            }
            0xF0 => {
                let off = self.fetch8();
                self.registers.a = self.bus.read8(0xFF00 + off as u16);
                Ok(12)
            }
            0xE2 => {
                self.bus
                    .write8(0xFF00 + self.registers.c as u16, self.registers.a);
                Ok(8)
            }
            0xF2 => {
                self.registers.a = self.bus.read8(0xFF00 + self.registers.c as u16);
                Ok(8)
            }
            0xEA => {
                let addr = self.fetch16();
                self.bus.write8(addr, self.registers.a);
                Ok(16)
            }
            0xFA => {
                let addr = self.fetch16();
                self.registers.a = self.bus.read8(addr);
                Ok(16)
            }

            0xE8 => {
                let off = self.fetch8() as i8;
                let res = self.add_sp_signed(off);
                self.registers.sp = res;
                Ok(16)
            }
            0xF8 => {
                let off = self.fetch8() as i8;
                let res = self.add_sp_signed(off);
                self.registers.set_hl(res);
                Ok(12)
            }
            0xF9 => {
                self.registers.sp = self.registers.hl();
                Ok(8)
            }

            0xF3 => {
                self.ime = false;
                self.ei_delay = 0;
                Ok(4)
            }
            0xFB => {
                self.ei_delay = 2;
                Ok(4)
            }

            0x27 => {
                self.daa();
                Ok(4)
            }
            0x2F => {
                self.registers.a = !self.registers.a;
                self.registers.f |= FLAG_N | FLAG_H;
                Ok(4)
            }
            0x37 => {
                self.registers.f = (self.registers.f & FLAG_Z) | FLAG_C;
                Ok(4)
            }
            0x3F => {
                let carry = self.registers.f & FLAG_C != 0;
                self.registers.f = (self.registers.f & FLAG_Z) | c(!carry);
                Ok(4)
            }

            0xCB => {
                let cb = self.fetch8();
                self.execute_cb(cb)
            }

            0xD3 | 0xDB | 0xDD | 0xE3 | 0xE4 | 0xEB | 0xEC | 0xED | 0xF4 | 0xFC | 0xFD => {
                let pc = self.registers.pc.wrapping_sub(1);
                warn!("illegal opcode {:#04X} at PC={:#06X}", opcode, pc);
                Err(EmuError::IllegalOpcode { pc, byte: opcode })
            }

            // every byte 0x00-0xFF is covered by an arm above
            _ => unreachable!("opcode {:#04X} not covered by decode table", opcode),
        }
    }

    fn execute_cb(&mut self, opcode: u8) -> EmuResult<u32> {
        let group = opcode >> 6;
        let op = (opcode >> 3) & 0x07;
        let r = opcode & 0x07;

        match group {
            0 => {
                let val = self.get_r8(r);
                let res = match op {
                    0 => self.rlc(val),
                    1 => self.rrc(val),
                    2 => self.rl(val),
                    3 => self.rr(val),
                    4 => self.sla(val),
                    5 => self.sra(val),
                    6 => self.swap(val),
                    7 => self.srl(val),
                    _ => unreachable!(),
                };
                self.set_r8(r, res);
                Ok(if r == 6 { 16 } else { 8 })
            }
            1 => {
                let val = self.get_r8(r);
                self.bit(op, val);
                Ok(if r == 6 { 12 } else { 8 })
            }
            2 => {
                let val = self.get_r8(r) & !(1 << op);
                self.set_r8(r, val);
                Ok(if r == 6 { 16 } else { 8 })
            }
            3 => {
                let val = self.get_r8(r) | (1 << op);
                self.set_r8(r, val);
                Ok(if r == 6 { 16 } else { 8 })
            }
            _ => unreachable!(),
        }
    }
}

fn z(res: u8) -> u8 {
    if res == 0 {
        FLAG_Z
    } else {
        0
    }
}

fn h(set: bool) -> u8 {
    if set {
        FLAG_H
    } else {
        0
    }
}

fn c(set: bool) -> u8 {
    if set {
        FLAG_C
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::Cartridge;

    fn test_cpu_with_rom(rom: Vec<u8>) -> Cpu {
        let cart = Cartridge::load(rom).unwrap();
        Cpu::new(Bus::new(cart))
    }

    fn blank_rom_at(pc: u16, bytes: &[u8]) -> Vec<u8> {
        let mut rom = vec![0u8; 0x8000];
        for (i, b) in bytes.iter().enumerate() {
            rom[pc as usize + i] = *b;
        }
        rom
    }

    #[test]
    fn add_sets_half_and_full_carry() {
        let mut cpu = test_cpu_with_rom(blank_rom_at(0x0100, &[0x80])); // ADD A,B
        cpu.registers.pc = 0x0100;
        cpu.registers.a = 0x3A;
        cpu.registers.b = 0xC6;
        let cycles = cpu.step().unwrap();
        assert_eq!(cpu.registers.a, 0x00);
        assert_eq!(cycles, 4);
        assert_eq!(cpu.registers.f, FLAG_Z | FLAG_H | FLAG_C);
    }

    #[test]
    fn daa_after_bcd_add_matches_known_vector() {
        let mut cpu = test_cpu_with_rom(blank_rom_at(0x0100, &[0x80, 0x27])); // ADD A,B; DAA
        cpu.registers.pc = 0x0100;
        cpu.registers.a = 0x45;
        cpu.registers.b = 0x38;
        cpu.step().unwrap();
        cpu.step().unwrap();
        assert_eq!(cpu.registers.a, 0x83);
        assert_eq!(cpu.registers.f, 0);
    }

    #[test]
    fn jr_cc_costs_more_cycles_when_taken() {
        let mut cpu = test_cpu_with_rom(blank_rom_at(0x0100, &[0x20, 0x05])); // JR NZ,+5
        cpu.registers.pc = 0x0100;
        cpu.registers.f = 0; // Z clear, so NZ is taken
        let cycles = cpu.step().unwrap();
        assert_eq!(cycles, 12);
        assert_eq!(cpu.registers.pc, 0x0107);

        let mut cpu2 = test_cpu_with_rom(blank_rom_at(0x0100, &[0x20, 0x05]));
        cpu2.registers.pc = 0x0100;
        cpu2.registers.f = FLAG_Z; // NZ not taken
        let cycles2 = cpu2.step().unwrap();
        assert_eq!(cycles2, 8);
        assert_eq!(cpu2.registers.pc, 0x0102);
    }

    #[test]
    fn illegal_opcode_returns_error_instead_of_panicking() {
        let mut cpu = test_cpu_with_rom(blank_rom_at(0x0100, &[0xD3]));
        cpu.registers.pc = 0x0100;
        let err = cpu.step().unwrap_err();
        assert!(matches!(err, EmuError::IllegalOpcode { byte: 0xD3, .. }));
    }

    #[test]
    fn halt_wakes_on_pending_interrupt_and_dispatches_when_ime_set() {
        let mut cpu = test_cpu_with_rom(blank_rom_at(0x0100, &[0x76])); // HALT
        cpu.registers.pc = 0x0100;
        cpu.registers.sp = 0xFFFE;
        cpu.ime = true;
        cpu.bus.interrupts.enable = crate::interrupts::VBLANK;

        cpu.step().unwrap(); // executes HALT
        assert!(cpu.halted);

        cpu.bus.interrupts.request(crate::interrupts::VBLANK);
        let cycles = cpu.step().unwrap();
        assert!(!cpu.halted);
        assert_eq!(cycles, 20);
        assert_eq!(cpu.registers.pc, 0x0040);
        assert!(!cpu.ime);
    }

    #[test]
    fn ei_takes_effect_after_the_following_instruction() {
        let mut cpu = test_cpu_with_rom(blank_rom_at(0x0100, &[0xFB, 0x00, 0x00]));
        cpu.registers.pc = 0x0100;
        cpu.step().unwrap(); // EI
        assert!(!cpu.ime);
        cpu.step().unwrap(); // NOP immediately after EI: still not yet enabled
        assert!(cpu.ime);
    }

    #[test]
    fn cb_bit_sets_zero_flag_without_touching_register() {
        let mut cpu = test_cpu_with_rom(blank_rom_at(0x0100, &[0xCB, 0x47])); // BIT 0,A
        cpu.registers.pc = 0x0100;
        cpu.registers.a = 0b1111_1110;
        cpu.step().unwrap();
        assert_eq!(cpu.registers.f & FLAG_Z, FLAG_Z);
        assert_eq!(cpu.registers.a, 0b1111_1110);
    }
}
