//! Environment readiness check.

use crate::config::{resolve_data_dir, AppConfig, DataLayout};
use crate::renderer::chromium::find_chromium;
use anyhow::Result;
use std::path::{Path, PathBuf};

fn writable(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let probe = dir.join(".paywire-doctor");
    std::fs::write(&probe, b"ok")?;
    std::fs::remove_file(&probe)
}

/// Check Chromium, the data directory and the config file.
pub fn run(data_dir: Option<PathBuf>) -> Result<()> {
    println!("Paywire Doctor");
    println!("==============");
    println!();
    println!("OS:   {}", std::env::consts::OS);
    println!("Arch: {}", std::env::consts::ARCH);
    println!();

    let mut ready = true;

    match find_chromium() {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => {
            ready = false;
            println!("[!!] Chromium NOT found. Install Chrome or set PAYWIRE_CHROMIUM_PATH.");
        }
    }

    let layout = DataLayout::new(resolve_data_dir(data_dir.as_deref()));
    match writable(layout.root()) {
        Ok(()) => println!("[OK] Data directory {} is writable", layout.root().display()),
        Err(e) => {
            ready = false;
            println!("[!!] Data directory {}: {e}", layout.root().display());
        }
    }

    let config_path = layout.config_path();
    if !config_path.exists() {
        println!("[??] No config at {}, defaults apply", config_path.display());
    }
    match AppConfig::load(&config_path) {
        Ok(mut config) => {
            config.apply_env();
            match config.validate() {
                Ok(()) => println!(
                    "[OK] Config valid, enabled sites: {}",
                    config.enabled_sites.join(", ")
                ),
                Err(e) => {
                    ready = false;
                    println!("[!!] {e:#}");
                }
            }
        }
        Err(e) => {
            ready = false;
            println!("[!!] {e:#}");
        }
    }

    println!();
    println!("Status: {}", if ready { "READY" } else { "NOT READY" });
    Ok(())
}
