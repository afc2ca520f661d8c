use dmg_core::config::RunConfig;
use dmg_core::GameBoy;
use log::{error, info};
use std::env;
use std::io::{self, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::init();

    let config = match load_config() {
        Ok(config) => config,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let mut gb = match GameBoy::from_config(&config) {
        Ok(gb) => gb,
        Err(err) => {
            error!("failed to start: {err}");
            return ExitCode::FAILURE;
        }
    };

    info!("starting core at PC={:#06X}", gb.registers().pc);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    loop {
        if let Err(err) = gb.step_instruction() {
            error!("core halted: {err}");
            return ExitCode::FAILURE;
        }
        let bytes = gb.take_serial_output();
        if !bytes.is_empty() {
            let _ = out.write_all(&bytes);
            let _ = out.flush();
        }
    }
}

/// Reads the ROM path (and optional JSON sidecar config) from argv. This
/// core has no windowing front end (spec Non-goals) — it is driven purely
/// by the serial port, which is how Blargg-style test ROMs report results.
fn load_config() -> Result<RunConfig, String> {
    let mut args = env::args().skip(1);
    let path = args
        .next()
        .ok_or_else(|| "usage: dmg_core <rom-path> [config.json]".to_string())?;

    if let Some(config_path) = args.next() {
        return RunConfig::load_json(&config_path)
            .map_err(|e| format!("failed to read config {config_path}: {e}"));
    }

    Ok(RunConfig::new(path))
}
