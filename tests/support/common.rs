#![allow(dead_code)]

// Canned hosts shared by the integration tests. Nothing here touches the
// real machine: every command, plist, and directory listing is replayed from
// a MemoryHost.

use authsurface::catalog::{
    DiscoverySettings, ExtraRequirements, StaticFallbackReader, VisibilityPolicy,
};
use authsurface::host::{CommandOutput, MemoryHost};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::time::Duration;

pub const MANIFEST_PATH: &str = "/fixture/Sidebar.plist";
pub const LEGACY_DIR: &str = "/fixture/PreferencePanes";
pub const BLUETOOTH_ID: &str = "com.apple.Bluetooth-Settings.extension";
pub const CD_DVD_ID: &str = "com.apple.CD-DVD-Settings.extension";

/// Sidebar identifiers on a stock Sonoma install.
pub const MANIFEST_IDS: [&str; 39] = [
    "com.apple.systempreferences.AppleIDSettings",
    "com.apple.Family-Settings.extension",
    "com.apple.wifi-settings-extension",
    BLUETOOTH_ID,
    "com.apple.Network-Settings.extension",
    "com.apple.NetworkExtensionSettingsUI.NESettingsUIExtension",
    "com.apple.Notifications-Settings.extension",
    "com.apple.Sound-Settings.extension",
    "com.apple.Focus-Settings.extension",
    "com.apple.Screen-Time-Settings.extension",
    "com.apple.systempreferences.GeneralSettings",
    "com.apple.Appearance-Settings.extension",
    "com.apple.Accessibility-Settings.extension",
    "com.apple.ControlCenter-Settings.extension",
    "com.apple.Siri-Settings.extension",
    "com.apple.settings.PrivacySecurity.extension",
    "com.apple.Desktop-Settings.extension",
    "com.apple.Displays-Settings.extension",
    "com.apple.Wallpaper-Settings.extension",
    "com.apple.ScreenSaver-Settings.extension",
    "com.apple.Battery-Settings.extension",
    "com.apple.Lock-Screen-Settings.extension",
    "com.apple.Touch-ID-Settings.extension",
    "com.apple.Users-Groups-Settings.extension",
    "com.apple.Passwords-Settings.extension",
    "com.apple.Internet-Accounts-Settings.extension",
    "com.apple.Game-Center-Settings.extension",
    "com.apple.WalletSettingsExtension",
    "com.apple.Keyboard-Settings.extension",
    "com.apple.Mouse-Settings.extension",
    "com.apple.Trackpad-Settings.extension",
    "com.apple.Print-Scan-Settings.extension",
    "com.apple.Spotlight-Settings.extension",
    "com.apple.Date-Time-Settings.extension",
    "com.apple.Sharing-Settings.extension",
    "com.apple.Software-Update-Settings.extension",
    "com.apple.Startup-Disk-Settings.extension",
    "com.apple.Time-Machine-Settings.extension",
    CD_DVD_ID,
];

/// Third-party and leftover bundles; none share an identifier with the
/// manifest.
pub const LEGACY_BUNDLES: [&str; 7] = [
    "Flash Player.prefPane",
    "Java.prefPane",
    "MySQL.prefPane",
    "GPGPreferences.prefPane",
    "FUSE.prefPane",
    "Tuxera NTFS.prefPane",
    "Perian.prefPane",
];

/// A manifest nested the way the real sidebar plist groups sections.
pub fn manifest_value(ids: &[&str]) -> Value {
    let (first, rest) = ids.split_at(ids.len() / 2);
    json!({
        "locale": "en_US",
        "sections": [
            { "title": "General", "items": first },
            { "title": "Other", "items": rest, "version": 2 },
        ],
    })
}

pub const LAPTOP_PORTS: &str = "\
Hardware Port: Wi-Fi
Device: en0
Ethernet Address: 3c:22:fb:00:00:01

Hardware Port: Thunderbolt Bridge
Device: bridge0
Ethernet Address: 36:8d:a2:00:00:02
";

/// Apple Silicon laptop with Touch ID, a battery, Wi-Fi and Bluetooth, and
/// neither an optical drive nor an Ethernet port.
pub fn laptop_hardware(host: MemoryHost) -> MemoryHost {
    host.with_command("sysctl -n hw.model", CommandOutput::success("Mac15,3"))
        .with_command("sysctl -n hw.optional.arm64", CommandOutput::success("1"))
        .with_command(
            "pmset -g batt",
            CommandOutput::success(" -InternalBattery-0 (id=4653155)\t91%; charged;"),
        )
        .with_command(
            "bioutil -r",
            CommandOutput::success("System biometric configuration:\n\tBiometrics for unlock: 1"),
        )
        .with_command(
            "system_profiler SPDiscBurningDataType -json",
            CommandOutput::success(json!({ "SPDiscBurningDataType": [] }).to_string()),
        )
        .with_command(
            "system_profiler SPThunderboltDataType -json",
            CommandOutput::success(
                json!({ "SPThunderboltDataType": [{ "_name": "thunderbolt_bus_0" }] }).to_string(),
            ),
        )
        .with_command(
            "networksetup -listallhardwareports",
            CommandOutput::success(LAPTOP_PORTS),
        )
        .with_command(
            "system_profiler SPBluetoothDataType -json",
            CommandOutput::success(
                json!({ "SPBluetoothDataType": [{ "controller_properties": { "controller_chipset": "BCM_4388" } }] })
                    .to_string(),
            ),
        )
}

pub fn with_version(host: MemoryHost, version: &str) -> MemoryHost {
    host.with_command("sw_vers -productVersion", CommandOutput::success(version))
}

/// Sonoma laptop with the 39-entry manifest and seven unrelated bundles.
pub fn modern_host() -> MemoryHost {
    let host = with_version(laptop_hardware(MemoryHost::new()), "14.5")
        .with_plist(MANIFEST_PATH, manifest_value(&MANIFEST_IDS))
        .with_dir(LEGACY_DIR, LEGACY_BUNDLES);
    LEGACY_BUNDLES.iter().fold(host, |host, bundle| {
        let stem = bundle.trim_end_matches(".prefPane");
        host.with_plist(
            format!("{LEGACY_DIR}/{bundle}/Contents/Info.plist"),
            json!({
                "CFBundleIdentifier": format!("org.thirdparty.{}", stem.replace(' ', "")),
                "CFBundleName": stem,
            }),
        )
    })
}

pub fn settings() -> DiscoverySettings {
    DiscoverySettings {
        manifest_path: PathBuf::from(MANIFEST_PATH),
        legacy_dirs: vec![PathBuf::from(LEGACY_DIR)],
        reader_timeout: Duration::from_secs(2),
        hardware_timeout: Duration::from_secs(2),
        extra_requirements: ExtraRequirements::default(),
        visibility: VisibilityPolicy::default(),
        fallback: StaticFallbackReader::embedded(),
    }
}
