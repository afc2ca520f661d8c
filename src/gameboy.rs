//! Top-level wiring: CPU, bus and PPU stepped together in lockstep.

use crate::bus::Bus;
use crate::cartridge::Cartridge;
use crate::config::RunConfig;
use crate::cpu::Cpu;
use crate::error::EmuResult;
use crate::joypad::Button;
use crate::ppu::Ppu;

/// Owns the whole DMG core and drives one instruction at a time, applying
/// its cycle cost to the timer, OAM DMA and PPU in that order — the only
/// ordering the bus's single-mutation-path design depends on.
pub struct GameBoy {
    cpu: Cpu,
    ppu: Ppu,
}

impl GameBoy {
    pub fn new(cartridge: Cartridge) -> Self {
        Self {
            cpu: Cpu::new(Bus::new(cartridge)),
            ppu: Ppu::new(),
        }
    }

    /// Builds a `GameBoy` from a launch configuration, reading the ROM from
    /// disk and applying any register overrides before the first step.
    pub fn from_config(config: &RunConfig) -> EmuResult<Self> {
        let rom = std::fs::read(&config.rom_path)?;
        let cartridge = Cartridge::load(rom)?;
        let mut gb = Self::new(cartridge);

        let regs = &config.registers;
        if let Some(a) = regs.a {
            gb.cpu.registers.a = a;
        }
        if let Some(f) = regs.f {
            gb.cpu.registers.f = f & 0xF0;
        }
        if let Some(bc) = regs.bc {
            gb.cpu.registers.set_bc(bc);
        }
        if let Some(de) = regs.de {
            gb.cpu.registers.set_de(de);
        }
        if let Some(hl) = regs.hl {
            gb.cpu.registers.set_hl(hl);
        }
        if let Some(sp) = regs.sp {
            gb.cpu.registers.sp = sp;
        }
        if let Some(pc) = regs.pc {
            gb.cpu.registers.pc = pc;
        }

        Ok(gb)
    }

    /// Executes exactly one CPU instruction (or interrupt dispatch, or one
    /// HALT-idle step) and advances every other subsystem by the same
    /// number of T-cycles.
    pub fn step_instruction(&mut self) -> EmuResult<u32> {
        let cycles = self.cpu.step()?;
        self.cpu.bus.timer.step(cycles, &mut self.cpu.bus.interrupts);
        self.cpu.bus.tick_dma(cycles);
        self.ppu.step(&mut self.cpu.bus, cycles);
        Ok(cycles)
    }

    pub fn framebuffer(&self) -> &[u32; 160 * 144] {
        &self.ppu.framebuffer
    }

    pub fn set_button(&mut self, button: Button, pressed: bool) {
        self.cpu.bus.set_button(button, pressed);
    }

    pub fn take_serial_output(&mut self) -> Vec<u8> {
        self.cpu.bus.take_serial_output()
    }

    pub fn registers(&self) -> &crate::cpu::Registers {
        &self.cpu.registers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_rom() -> Vec<u8> {
        vec![0u8; 0x8000]
    }

    #[test]
    fn stepping_advances_pc_past_the_post_boot_entry_point() {
        let mut gb = GameBoy::new(Cartridge::load(blank_rom()).unwrap());
        assert_eq!(gb.registers().pc, 0x0100);
        gb.step_instruction().unwrap();
        assert_eq!(gb.registers().pc, 0x0101);
    }

    #[test]
    fn serial_output_drains_what_was_written_through_sc() {
        let mut rom = blank_rom();
        // LD A,0x41 ; LD (0xFF01),A ; LD A,0x81 ; LD (0xFF02),A
        rom[0x0100..0x0108].copy_from_slice(&[0x3E, 0x41, 0xEA, 0x01, 0xFF, 0x3E, 0x81, 0xEA]);
        rom[0x0108..0x010A].copy_from_slice(&[0x02, 0xFF]);
        let mut gb = GameBoy::new(Cartridge::load(rom).unwrap());
        for _ in 0..4 {
            gb.step_instruction().unwrap();
        }
        assert_eq!(gb.take_serial_output(), vec![0x41]);
    }
}
