//! Cartridge image and the MBC1 mapper, ROM-mode only.

use crate::error::{EmuError, EmuResult};
use log::{debug, info};

const ROM_BANK_SIZE: usize = 0x4000;

/// An immutable ROM image plus the mutable MBC1 bank-select state.
///
/// Only ROM banking mode is modeled — RAM-select mode is accepted as a
/// guest write but has no observable effect, since this core implements no
/// cartridge RAM (0xA000-0xBFFF always reads 0).
pub struct Cartridge {
    rom: Vec<u8>,
    bank_count: u16,
    bank_low: u8,
    bank_high: u8,
    ram_mode: bool,
}

impl Cartridge {
    /// Loads a cartridge image. A zero-length image is rejected outright; an
    /// image whose length is not an exact multiple of 16 KiB is padded with
    /// `0xFF` up to the next bank boundary.
    pub fn load(mut rom: Vec<u8>) -> EmuResult<Self> {
        if rom.is_empty() {
            return Err(EmuError::EmptyRom);
        }

        if rom.len() % ROM_BANK_SIZE != 0 {
            let padded_len = rom.len().div_ceil(ROM_BANK_SIZE) * ROM_BANK_SIZE;
            rom.resize(padded_len, 0xFF);
        }

        let bank_count = (rom.len() / ROM_BANK_SIZE) as u16;
        info!(
            "loaded cartridge: {} bytes, {} ROM banks",
            rom.len(),
            bank_count
        );

        Ok(Self {
            rom,
            bank_count,
            bank_low: 1,
            bank_high: 0,
            ram_mode: false,
        })
    }

    pub fn bank_count(&self) -> u16 {
        self.bank_count
    }

    /// Effective bank selected for the 0x4000-0x7FFF window.
    fn effective_bank(&self) -> u16 {
        let mut bank = ((self.bank_high as u16) << 5) | (self.bank_low as u16);
        if (bank & 0x1F) == 0 && self.bank_count > 1 {
            bank |= 1;
        }
        bank % self.bank_count.max(1)
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x3FFF => self.rom.get(addr as usize).copied().unwrap_or(0xFF),
            0x4000..=0x7FFF => {
                let bank = self.effective_bank() as usize;
                let offset = (addr - 0x4000) as usize;
                self.rom
                    .get(bank * ROM_BANK_SIZE + offset)
                    .copied()
                    .unwrap_or(0xFF)
            }
            _ => 0xFF,
        }
    }

    /// Handles a guest write into ROM space — these are mapper commands,
    /// never actual memory writes.
    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x1FFF => {
                // RAM enable: no cartridge RAM is implemented, nothing to gate.
            }
            0x2000..=0x3FFF => {
                let mut low = val & 0x1F;
                if low == 0 {
                    low = 1;
                }
                self.bank_low = low;
                debug!("MBC1 low bank select -> {:#04X}", low);
            }
            0x4000..=0x5FFF => {
                self.bank_high = val & 0x03;
                debug!("MBC1 high bank select -> {:#04X}", self.bank_high);
            }
            0x6000..=0x7FFF => {
                self.ram_mode = (val & 0x01) != 0;
            }
            _ => {}
        }
    }
}
