//! Launch-time configuration. Not a save state — persistence stays out of
//! the core entirely; this is only what the front end needs to boot a ROM
//! the same way twice.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Register overrides applied after the post-boot state is built, mainly
/// useful for test ROMs that expect a particular entry state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterOverrides {
    pub a: Option<u8>,
    pub f: Option<u8>,
    pub bc: Option<u16>,
    pub de: Option<u16>,
    pub hl: Option<u16>,
    pub sp: Option<u16>,
    pub pc: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub rom_path: PathBuf,
    #[serde(default)]
    pub registers: RegisterOverrides,
    #[serde(default)]
    pub log_level: Option<String>,
}

impl RunConfig {
    pub fn new(rom_path: impl Into<PathBuf>) -> Self {
        Self {
            rom_path: rom_path.into(),
            registers: RegisterOverrides::default(),
            log_level: None,
        }
    }

    /// Loads a config from a JSON sidecar file, e.g. `roms/tetris.gb.json`.
    pub fn load_json(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let cfg = RunConfig::new("game.gb");
        let json = serde_json::to_string(&cfg).unwrap();
        let back: RunConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.rom_path, cfg.rom_path);
    }
}
