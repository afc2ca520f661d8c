//! Fatal error conditions for the core.

use thiserror::Error;

/// Errors that can terminate emulation or cartridge loading.
///
/// `RomIoError` and `EmptyRom` surface at load time; the rest are fatal
/// runtime errors raised from inside the CPU step loop. The core never
/// recovers from these internally — it halts and reports.
#[derive(Debug, Error)]
pub enum EmuError {
    #[error("failed to read cartridge image: {0}")]
    RomIoError(#[from] std::io::Error),

    #[error("cartridge image is empty")]
    EmptyRom,

    #[error("illegal opcode {byte:#04X} at PC={pc:#06X}")]
    IllegalOpcode { pc: u16, byte: u8 },

    #[error("illegal CB opcode {byte:#04X} at PC={pc:#06X}")]
    IllegalCbOpcode { pc: u16, byte: u8 },

    #[error("MBC1 bank index {bank} out of range (bank count {bank_count})")]
    BankOutOfRange { bank: u16, bank_count: u16 },
}

pub type EmuResult<T> = Result<T, EmuError>;
