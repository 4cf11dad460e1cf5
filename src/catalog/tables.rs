//! Embedded lookup tables: friendly names, hardware requirements, and the
//! static fallback sidebar.
//!
//! Tables are immutable constants. Nothing here is consulted implicitly; the
//! readers and the reconciler receive what they need through their
//! constructors.

use crate::catalog::{CapabilityTag, PaneCandidate, SourceKind};

/// System Settings extension identifiers with their sidebar names.
const EXTENSION_NAMES: &[(&str, &str)] = &[
    ("com.apple.systempreferences.AppleIDSettings", "Apple ID"),
    ("com.apple.Family-Settings.extension", "Family"),
    ("com.apple.FollowUpSettings.FollowUpSettingsExtension", "Follow Up"),
    ("com.apple.wifi-settings-extension", "Wi-Fi"),
    ("com.apple.Bluetooth-Settings.extension", "Bluetooth"),
    ("com.apple.BluetoothSettings", "Bluetooth"),
    ("com.apple.Network-Settings.extension", "Network"),
    ("com.apple.NetworkExtensionSettingsUI.NESettingsUIExtension", "VPN"),
    ("com.apple.ClassroomSettings", "Classroom"),
    ("com.apple.Classroom-Settings.extension", "Classroom Settings"),
    ("com.apple.Notifications-Settings.extension", "Notifications"),
    ("com.apple.Sound-Settings.extension", "Sound"),
    ("com.apple.Focus-Settings.extension", "Focus"),
    ("com.apple.Screen-Time-Settings.extension", "Screen Time"),
    ("com.apple.systempreferences.GeneralSettings", "General"),
    ("com.apple.Appearance-Settings.extension", "Appearance"),
    ("com.apple.Accessibility-Settings.extension", "Accessibility"),
    ("com.apple.ControlCenter-Settings.extension", "Control Center"),
    ("com.apple.Siri-Settings.extension", "Siri & Spotlight"),
    ("com.apple.settings.PrivacySecurity.extension", "Privacy & Security"),
    ("com.apple.Desktop-Settings.extension", "Desktop & Dock"),
    ("com.apple.Displays-Settings.extension", "Displays"),
    ("com.apple.Wallpaper-Settings.extension", "Wallpaper"),
    ("com.apple.ScreenSaver-Settings.extension", "Screen Saver"),
    ("com.apple.Battery-Settings.extension", "Battery"),
    ("com.apple.EnergySaver-Settings.extension", "Energy Saver"),
    ("com.apple.Keyboard-Settings.extension", "Keyboard"),
    ("com.apple.Mouse-Settings.extension", "Mouse"),
    ("com.apple.Trackpad-Settings.extension", "Trackpad"),
    ("com.apple.Print-Scan-Settings.extension", "Printers & Scanners"),
    ("com.apple.Game-Center-Settings.extension", "Game Center"),
    ("com.apple.Game-Controller-Settings.extension", "Game Controller"),
    ("com.apple.Internet-Accounts-Settings.extension", "Internet Accounts"),
    ("com.apple.Passwords", "Passwords"),
    ("com.apple.Passwords-Settings.extension", "Passwords"),
    ("com.apple.WalletSettingsExtension", "Wallet & Apple Pay"),
    ("com.apple.Users-Groups-Settings.extension", "Users & Groups"),
    ("com.apple.Touch-ID-Settings.extension", "Touch ID & Passcode"),
    ("com.apple.Lock-Screen-Settings.extension", "Lock Screen"),
    ("com.apple.LoginItems-Settings.extension", "Login Items"),
    ("com.apple.Date-Time-Settings.extension", "Date & Time"),
    ("com.apple.Sharing-Settings.extension", "Sharing"),
    ("com.apple.Time-Machine-Settings.extension", "Time Machine"),
    ("com.apple.Transfer-Reset-Settings.extension", "Transfer or Reset"),
    ("com.apple.Software-Update-Settings.extension", "Software Update"),
    ("com.apple.Startup-Disk-Settings.extension", "Startup Disk"),
    ("com.apple.Storage-Settings.extension", "Storage"),
    ("com.apple.HeadphoneSettings", "Headphones"),
    ("com.apple.CD-DVD-Settings.extension", "CDs & DVDs"),
    ("com.apple.Spotlight-Settings.extension", "Spotlight"),
];

/// Legacy `.prefPane` bundle stems with their System Preferences names.
const PREFPANE_NAMES: &[(&str, &str)] = &[
    ("Accounts", "Internet Accounts"),
    ("Appearance", "Appearance"),
    ("AppleIDPrefPane", "Apple ID"),
    ("Battery", "Battery"),
    ("Bluetooth", "Bluetooth"),
    ("ClassKitPreferencePane", "ClassKit"),
    ("ClassroomSettings", "Classroom"),
    ("DateAndTime", "Date & Time"),
    ("DesktopScreenEffectsPref", "Desktop & Screen Saver"),
    ("DigiHubDiscs", "CDs & DVDs"),
    ("Displays", "Displays"),
    ("Dock", "Dock"),
    ("EnergySaver", "Energy Saver"),
    ("EnergySaverPref", "Energy Saver"),
    ("Expose", "Mission Control"),
    ("Extensions", "Extensions"),
    ("FamilySharingPrefPane", "Family"),
    ("InternetAccounts", "Internet Accounts"),
    ("Keyboard", "Keyboard"),
    ("Localization", "Language & Region"),
    ("Mouse", "Mouse"),
    ("Network", "Network"),
    ("Notifications", "Notifications"),
    ("Passwords", "Passwords"),
    ("PrintAndFax", "Printers & Scanners"),
    ("PrintAndScan", "Printers & Scanners"),
    ("Profiles", "Profiles"),
    ("ScreenTime", "Screen Time"),
    ("Security", "Security & Privacy"),
    ("SharingPref", "Sharing"),
    ("SoftwareUpdate", "Software Update"),
    ("Sound", "Sound"),
    ("Speech", "Speech"),
    ("Spotlight", "Spotlight"),
    ("StartupDisk", "Startup Disk"),
    ("TimeMachine", "Time Machine"),
    ("TouchID", "Touch ID"),
    ("Trackpad", "Trackpad"),
    ("UniversalAccessPref", "Accessibility"),
    ("Wallet", "Wallet & Apple Pay"),
];

const EXTENSION_REQUIREMENTS: &[(&str, &[&str])] = &[
    ("com.apple.wifi-settings-extension", &["wifi"]),
    ("com.apple.Bluetooth-Settings.extension", &["bluetooth"]),
    ("com.apple.BluetoothSettings", &["bluetooth"]),
    ("com.apple.Battery-Settings.extension", &["battery"]),
    ("com.apple.Touch-ID-Settings.extension", &["biometric"]),
    ("com.apple.CD-DVD-Settings.extension", &["opticalDrive"]),
];

const PREFPANE_REQUIREMENTS: &[(&str, &[&str])] = &[
    ("Battery", &["battery"]),
    ("Bluetooth", &["bluetooth"]),
    ("TouchID", &["biometric"]),
    ("DigiHubDiscs", &["opticalDrive"]),
];

/// One row of the stock sidebar used when dynamic discovery yields nothing.
#[derive(Clone, Copy, Debug)]
pub struct StaticPane {
    pub identifier: &'static str,
    pub display_name: &'static str,
    pub requires: &'static [&'static str],
}

const fn pane(identifier: &'static str, display_name: &'static str) -> StaticPane {
    StaticPane {
        identifier,
        display_name,
        requires: &[],
    }
}

const fn gated(
    identifier: &'static str,
    display_name: &'static str,
    requires: &'static [&'static str],
) -> StaticPane {
    StaticPane {
        identifier,
        display_name,
        requires,
    }
}

pub const STATIC_FALLBACK_PANES: &[StaticPane] = &[
    gated("com.apple.wifi-settings-extension", "Wi-Fi", &["wifi"]),
    gated("com.apple.Bluetooth-Settings.extension", "Bluetooth", &["bluetooth"]),
    pane("com.apple.Network-Settings.extension", "Network"),
    pane("com.apple.NetworkExtensionSettingsUI.NESettingsUIExtension", "VPN"),
    pane("com.apple.Notifications-Settings.extension", "Notifications"),
    pane("com.apple.Sound-Settings.extension", "Sound"),
    pane("com.apple.Focus-Settings.extension", "Focus"),
    pane("com.apple.Screen-Time-Settings.extension", "Screen Time"),
    pane("com.apple.systempreferences.GeneralSettings", "General"),
    pane("com.apple.Appearance-Settings.extension", "Appearance"),
    pane("com.apple.Accessibility-Settings.extension", "Accessibility"),
    pane("com.apple.ControlCenter-Settings.extension", "Control Center"),
    pane("com.apple.Siri-Settings.extension", "Siri & Spotlight"),
    pane("com.apple.settings.PrivacySecurity.extension", "Privacy & Security"),
    pane("com.apple.Desktop-Settings.extension", "Desktop & Dock"),
    pane("com.apple.Displays-Settings.extension", "Displays"),
    pane("com.apple.Wallpaper-Settings.extension", "Wallpaper"),
    pane("com.apple.ScreenSaver-Settings.extension", "Screen Saver"),
    gated("com.apple.Battery-Settings.extension", "Battery", &["battery"]),
    pane("com.apple.EnergySaver-Settings.extension", "Energy Saver"),
    pane("com.apple.Keyboard-Settings.extension", "Keyboard"),
    pane("com.apple.Mouse-Settings.extension", "Mouse"),
    pane("com.apple.Trackpad-Settings.extension", "Trackpad"),
    pane("com.apple.Print-Scan-Settings.extension", "Printers & Scanners"),
    pane("com.apple.Game-Center-Settings.extension", "Game Center"),
    pane("com.apple.Internet-Accounts-Settings.extension", "Internet Accounts"),
    pane("com.apple.Passwords-Settings.extension", "Passwords"),
    pane("com.apple.WalletSettingsExtension", "Wallet & Apple Pay"),
    pane("com.apple.Users-Groups-Settings.extension", "Users & Groups"),
    gated(
        "com.apple.Touch-ID-Settings.extension",
        "Touch ID & Passcode",
        &["biometric"],
    ),
    pane("com.apple.LoginItems-Settings.extension", "Login Items"),
    pane("com.apple.Date-Time-Settings.extension", "Date & Time"),
    pane("com.apple.Sharing-Settings.extension", "Sharing"),
    pane("com.apple.Time-Machine-Settings.extension", "Time Machine"),
    pane("com.apple.Transfer-Reset-Settings.extension", "Transfer or Reset"),
    pane("com.apple.Software-Update-Settings.extension", "Software Update"),
    pane("com.apple.Storage-Settings.extension", "Storage"),
];

fn lookup<'a, T: Copy>(table: &'a [(&'a str, T)], key: &str, fold_case: bool) -> Option<T> {
    table.iter().find_map(|(k, v)| {
        let hit = if fold_case {
            k.eq_ignore_ascii_case(key.trim())
        } else {
            *k == key.trim()
        };
        hit.then_some(*v)
    })
}

pub fn extension_display_name(identifier: &str) -> Option<&'static str> {
    lookup(EXTENSION_NAMES, identifier, true)
}

pub fn prefpane_display_name(stem: &str) -> Option<&'static str> {
    lookup(PREFPANE_NAMES, stem, false)
}

pub fn extension_requirements(identifier: &str) -> Vec<CapabilityTag> {
    lookup(EXTENSION_REQUIREMENTS, identifier, true)
        .map(|tags| tags.iter().map(|tag| CapabilityTag::from(*tag)).collect())
        .unwrap_or_default()
}

pub fn prefpane_requirements(stem: &str) -> Vec<CapabilityTag> {
    lookup(PREFPANE_REQUIREMENTS, stem, false)
        .map(|tags| tags.iter().map(|tag| CapabilityTag::from(*tag)).collect())
        .unwrap_or_default()
}

/// The static fallback table as candidates.
pub fn static_fallback_candidates() -> Vec<PaneCandidate> {
    STATIC_FALLBACK_PANES
        .iter()
        .map(|row| {
            PaneCandidate::new(row.identifier, row.display_name, SourceKind::StaticFallback)
                .requiring(row.requires.iter().map(|tag| CapabilityTag::from(*tag)))
        })
        .collect()
}

/// Identifiers shown in the stock sidebar under normal conditions.
pub fn default_known_visible() -> Vec<String> {
    STATIC_FALLBACK_PANES
        .iter()
        .map(|row| row.identifier.to_string())
        .chain(EXTENSION_NAMES.iter().filter_map(|(id, _)| {
            // The manifest also lists context-gated panes that the stock
            // sidebar hides until a device or account is present.
            (!HIDDEN_UNTIL_NEEDED.contains(id)).then(|| id.to_string())
        }))
        .collect()
}

const HIDDEN_UNTIL_NEEDED: &[&str] = &[
    "com.apple.FollowUpSettings.FollowUpSettingsExtension",
    "com.apple.ClassroomSettings",
    "com.apple.Classroom-Settings.extension",
    "com.apple.Game-Controller-Settings.extension",
    "com.apple.HeadphoneSettings",
    "com.apple.CD-DVD-Settings.extension",
    "com.apple.Passwords",
];

/// Best-effort readable name for an identifier with no known name, e.g.
/// `com.apple.Foo-Bar-Settings.extension` becomes `Foo Bar`.
pub fn humanize_identifier(identifier: &str) -> String {
    let trimmed = identifier.trim();
    let without_vendor = trimmed
        .strip_prefix("com.apple.")
        .unwrap_or(trimmed)
        .trim_end_matches(".extension");
    let segment = without_vendor
        .rsplit('.')
        .find(|part| !part.is_empty())
        .unwrap_or(without_vendor);
    let core = strip_suffixes(segment, &["-Settings", "SettingsExtension", "Settings", "-settings-extension"]);
    let words = split_words(core);
    if words.is_empty() {
        trimmed.to_string()
    } else {
        words
    }
}

/// Readable name for a `.prefPane` stem, e.g. `SharingPref` becomes `Sharing`.
pub fn humanize_prefpane(stem: &str) -> String {
    let core = strip_suffixes(stem.trim(), &["PrefPane", "PreferencePane", "Pref"]);
    let words = split_words(core);
    if words.is_empty() {
        stem.trim().to_string()
    } else {
        words
    }
}

fn strip_suffixes<'a>(value: &'a str, suffixes: &[&str]) -> &'a str {
    for suffix in suffixes {
        if let Some(stripped) = value.strip_suffix(suffix) {
            if !stripped.is_empty() {
                return stripped;
            }
        }
    }
    value
}

/// Split on `-`/`_` and lower-to-upper camel-case boundaries.
fn split_words(value: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for ch in value.chars() {
        if ch == '-' || ch == '_' || ch == ' ' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if ch.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        current.push(ch);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn static_fallback_identifiers_are_unique() {
        let keys: BTreeSet<String> = STATIC_FALLBACK_PANES
            .iter()
            .map(|row| row.identifier.to_ascii_lowercase())
            .collect();
        assert_eq!(keys.len(), STATIC_FALLBACK_PANES.len());
    }

    #[test]
    fn known_extensions_resolve_case_insensitively() {
        assert_eq!(
            extension_display_name("COM.APPLE.CD-DVD-Settings.extension"),
            Some("CDs & DVDs")
        );
        assert_eq!(extension_display_name("com.apple.Unknown-Settings.extension"), None);
    }

    #[test]
    fn requirements_cover_hardware_gated_panes() {
        assert_eq!(
            extension_requirements("com.apple.CD-DVD-Settings.extension"),
            vec![CapabilityTag::OpticalDrive]
        );
        assert_eq!(prefpane_requirements("TouchID"), vec![CapabilityTag::Biometric]);
        assert_eq!(
            extension_requirements("com.apple.Bluetooth-Settings.extension"),
            vec![CapabilityTag::Bluetooth]
        );
        assert_eq!(
            extension_requirements("com.apple.wifi-settings-extension"),
            vec![CapabilityTag::Wifi]
        );
        assert!(extension_requirements("com.apple.Sound-Settings.extension").is_empty());
    }

    #[test]
    fn fallback_rows_agree_with_the_name_and_requirement_tables() {
        for row in STATIC_FALLBACK_PANES {
            assert_eq!(
                extension_display_name(row.identifier),
                Some(row.display_name),
                "{} has no matching name",
                row.identifier
            );
            let required: Vec<CapabilityTag> =
                row.requires.iter().map(|tag| CapabilityTag::from(*tag)).collect();
            assert_eq!(extension_requirements(row.identifier), required, "{}", row.identifier);
        }
        for (id, _) in EXTENSION_REQUIREMENTS {
            assert!(extension_display_name(id).is_some(), "{id} has requirements but no name");
        }
    }

    #[test]
    fn sonoma_bluetooth_identifier_resolves() {
        let id = "com.apple.Bluetooth-Settings.extension";
        assert_eq!(extension_display_name(id), Some("Bluetooth"));
        assert!(default_known_visible().iter().any(|known| known == id));
    }

    #[test]
    fn humanizes_unknown_identifiers() {
        assert_eq!(
            humanize_identifier("com.apple.Login-Items-Settings.extension"),
            "Login Items"
        );
        assert_eq!(humanize_identifier("com.apple.HeadphoneSettings"), "Headphone");
        assert_eq!(humanize_identifier("org.example.tool"), "tool");
    }

    #[test]
    fn humanizes_prefpane_stems() {
        assert_eq!(humanize_prefpane("SharingPref"), "Sharing");
        assert_eq!(humanize_prefpane("DateAndTime"), "Date And Time");
        assert_eq!(humanize_prefpane("FamilySharingPrefPane"), "Family Sharing");
    }

    #[test]
    fn hidden_panes_are_not_known_visible() {
        let visible = default_known_visible();
        assert!(!visible.iter().any(|id| id == "com.apple.CD-DVD-Settings.extension"));
        assert!(visible.iter().any(|id| id == "com.apple.BluetoothSettings"));
    }
}
