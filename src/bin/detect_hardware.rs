//! Prints the host's OS version, catalog strategy, and hardware capability
//! profile as one JSON object.
//!
//! Takes no arguments; timeouts come from the usual `AUTHSURFACE_*`
//! environment overrides.

use anyhow::{Result, bail};
use authsurface::catalog::{PaneDiscoverer, VersionStrategy};
use authsurface::config::Config;
use authsurface::hardware::HardwareCapabilitySet;
use authsurface::host::SystemHost;
use serde::Serialize;
use std::env;
use std::sync::Arc;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    if let Some(arg) = env::args().nth(1) {
        if matches!(arg.as_str(), "-h" | "--help") {
            println!("Usage: detect-hardware");
            return Ok(());
        }
        bail!("unexpected argument '{arg}'; detect-hardware takes no arguments");
    }

    let config = Config::load(None)?;
    let host = Arc::new(SystemHost::new(config.command_timeout()));
    let discoverer = PaneDiscoverer::new(host, config.discovery_settings());
    let version = discoverer.detect_version();

    let info = HostInfo {
        os_version: version.raw.clone(),
        strategy: VersionStrategy::select(&version).as_str(),
        hardware: discoverer.profile_hardware(),
    };
    println!("{}", serde_json::to_string(&info)?);
    Ok(())
}

#[derive(Serialize)]
struct HostInfo {
    os_version: String,
    strategy: &'static str,
    hardware: HardwareCapabilitySet,
}
