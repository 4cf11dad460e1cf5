//! Identifiers shared across the pane catalog: pane ids, source kinds, and
//! hardware capability tags.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Vendor-qualified pane identifier as reported by its source, e.g.
/// `com.apple.Bluetooth-Settings.extension`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaneId(pub String);

impl PaneId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Dedup key: trimmed and lowercased. Empty keys mark malformed candidates.
    pub fn key(&self) -> String {
        self.0.trim().to_ascii_lowercase()
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for PaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a pane candidate came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    ExtensionManifest,
    LegacyDirectory,
    StaticFallback,
}

impl SourceKind {
    pub const ALL: [SourceKind; 3] = [
        SourceKind::ExtensionManifest,
        SourceKind::LegacyDirectory,
        SourceKind::StaticFallback,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::ExtensionManifest => "extension_manifest",
            SourceKind::LegacyDirectory => "legacy_directory",
            SourceKind::StaticFallback => "static_fallback",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Symbolic hardware requirement gating a pane.
///
/// Unrecognized tags survive as `Other` so a mismatched table or config is
/// reported instead of silently dropped.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CapabilityTag {
    Biometric,
    HighSpeedBus,
    Battery,
    OpticalDrive,
    Wifi,
    Bluetooth,
    Ethernet,
    Display,
    Audio,
    AppleSilicon,
    Other(String),
}

impl CapabilityTag {
    pub fn as_str(&self) -> &str {
        match self {
            CapabilityTag::Biometric => "biometric",
            CapabilityTag::HighSpeedBus => "highSpeedBus",
            CapabilityTag::Battery => "battery",
            CapabilityTag::OpticalDrive => "opticalDrive",
            CapabilityTag::Wifi => "wifi",
            CapabilityTag::Bluetooth => "bluetooth",
            CapabilityTag::Ethernet => "ethernet",
            CapabilityTag::Display => "display",
            CapabilityTag::Audio => "audio",
            CapabilityTag::AppleSilicon => "appleSilicon",
            CapabilityTag::Other(value) => value.as_str(),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, CapabilityTag::Other(_))
    }
}

impl From<&str> for CapabilityTag {
    fn from(value: &str) -> Self {
        match value.trim() {
            "biometric" => CapabilityTag::Biometric,
            "highSpeedBus" => CapabilityTag::HighSpeedBus,
            "battery" => CapabilityTag::Battery,
            "opticalDrive" => CapabilityTag::OpticalDrive,
            "wifi" => CapabilityTag::Wifi,
            "bluetooth" => CapabilityTag::Bluetooth,
            "ethernet" => CapabilityTag::Ethernet,
            "display" => CapabilityTag::Display,
            "audio" => CapabilityTag::Audio,
            "appleSilicon" => CapabilityTag::AppleSilicon,
            other => CapabilityTag::Other(other.to_string()),
        }
    }
}

impl From<String> for CapabilityTag {
    fn from(value: String) -> Self {
        CapabilityTag::from(value.as_str())
    }
}

impl From<CapabilityTag> for String {
    fn from(tag: CapabilityTag) -> Self {
        tag.as_str().to_string()
    }
}

impl fmt::Display for CapabilityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pane_key_is_case_and_whitespace_insensitive() {
        let a = PaneId::new("  com.apple.Battery-Settings.extension ");
        let b = PaneId::new("COM.APPLE.battery-settings.EXTENSION");
        assert_eq!(a.key(), b.key());
        assert!(PaneId::new("   ").is_blank());
    }

    #[test]
    fn capability_tags_parse_and_print() {
        for tag in [
            CapabilityTag::Biometric,
            CapabilityTag::HighSpeedBus,
            CapabilityTag::OpticalDrive,
            CapabilityTag::Wifi,
            CapabilityTag::Bluetooth,
            CapabilityTag::Ethernet,
        ] {
            assert_eq!(CapabilityTag::from(tag.as_str()), tag);
        }
        let unknown = CapabilityTag::from("faceId");
        assert!(!unknown.is_known());
        assert_eq!(unknown.to_string(), "faceId");
    }

    #[test]
    fn source_kind_serializes_snake_case() {
        let value = serde_json::to_value(SourceKind::LegacyDirectory).unwrap();
        assert_eq!(value, serde_json::json!("legacy_directory"));
    }
}
