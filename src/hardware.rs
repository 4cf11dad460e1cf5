//! Hardware profiling used to gate pane availability.
//!
//! Every capability comes from a fixed local query through [`Host`]. A
//! query that fails degrades only its own field to the conservative
//! default (`false`, `0`, `unknown`); profiling as a whole never fails.
//! Once the cancel token fires, the remaining queries are skipped.

use crate::catalog::CapabilityTag;
use crate::host::{CancelToken, Host};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

pub const UNKNOWN_MODEL: &str = "unknown";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Architecture {
    AppleSilicon,
    Intel,
    Unknown,
}

/// Snapshot of the machine's hardware, taken once per discovery run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareCapabilitySet {
    pub architecture: Architecture,
    pub biometric: bool,
    pub high_speed_bus: bool,
    pub battery: bool,
    pub optical_drive: bool,
    // Reports written before the network queries existed lack these.
    #[serde(default)]
    pub wifi: bool,
    #[serde(default)]
    pub bluetooth: bool,
    #[serde(default)]
    pub ethernet: bool,
    pub display_count: u32,
    pub audio_device_count: u32,
    pub model: String,
}

impl HardwareCapabilitySet {
    /// Snapshot used when nothing could be queried.
    pub fn unknown() -> Self {
        Self {
            architecture: Architecture::Unknown,
            biometric: false,
            high_speed_bus: false,
            battery: false,
            optical_drive: false,
            wifi: false,
            bluetooth: false,
            ethernet: false,
            display_count: 0,
            audio_device_count: 0,
            model: UNKNOWN_MODEL.to_string(),
        }
    }

    /// Whether this machine satisfies `tag`. Unknown tags are never satisfied.
    pub fn satisfies(&self, tag: &CapabilityTag) -> bool {
        match tag {
            CapabilityTag::Biometric => self.biometric,
            CapabilityTag::HighSpeedBus => self.high_speed_bus,
            CapabilityTag::Battery => self.battery,
            CapabilityTag::OpticalDrive => self.optical_drive,
            CapabilityTag::Wifi => self.wifi,
            CapabilityTag::Bluetooth => self.bluetooth,
            CapabilityTag::Ethernet => self.ethernet,
            CapabilityTag::Display => self.display_count > 0,
            CapabilityTag::Audio => self.audio_device_count > 0,
            CapabilityTag::AppleSilicon => self.architecture == Architecture::AppleSilicon,
            CapabilityTag::Other(_) => false,
        }
    }
}

/// Profile the host. Side-effect free beyond read-only system queries.
pub fn profile(host: &dyn Host) -> HardwareCapabilitySet {
    profile_with(host, &CancelToken::new())
}

/// Profile the host, skipping whatever is left once `cancel` fires.
pub fn profile_with(host: &dyn Host, cancel: &CancelToken) -> HardwareCapabilitySet {
    let query = Queries { host, cancel };
    let ports = query.stdout("networksetup", &["-listallhardwareports"]);
    let set = HardwareCapabilitySet {
        architecture: query.architecture(),
        biometric: query
            .stdout("bioutil", &["-r"])
            .is_some_and(|out| parse_bioutil(&out)),
        high_speed_bus: query.has_items("SPThunderboltDataType"),
        battery: query
            .stdout("pmset", &["-g", "batt"])
            .is_some_and(|out| out.contains("InternalBattery")),
        optical_drive: query.has_items("SPDiscBurningDataType"),
        wifi: ports.as_deref().is_some_and(|out| has_port(out, "Wi-Fi")),
        bluetooth: query.has_items("SPBluetoothDataType"),
        ethernet: ports.as_deref().is_some_and(|out| has_port(out, "Ethernet")),
        display_count: query
            .system_profiler_items("SPDisplaysDataType")
            .map(|items| count_displays(&items))
            .unwrap_or(0),
        audio_device_count: query
            .system_profiler_items("SPAudioDataType")
            .map(|items| count_audio_devices(&items))
            .unwrap_or(0),
        model: query
            .stdout("sysctl", &["-n", "hw.model"])
            .unwrap_or_else(|| UNKNOWN_MODEL.to_string()),
    };
    if cancel.is_cancelled() {
        debug!("hardware profiling cancelled");
    } else {
        info!(
            model = %set.model,
            architecture = ?set.architecture,
            battery = set.battery,
            biometric = set.biometric,
            wifi = set.wifi,
            "hardware profile detected"
        );
    }
    set
}

struct Queries<'a> {
    host: &'a dyn Host,
    cancel: &'a CancelToken,
}

impl Queries<'_> {
    fn stdout(&self, program: &str, args: &[&str]) -> Option<String> {
        match self.host.run_until(program, args, self.cancel) {
            Ok(output) => output.trimmed_stdout().map(str::to_string),
            Err(err) => {
                debug!(program, error = %err, "hardware query failed");
                None
            }
        }
    }

    fn architecture(&self) -> Architecture {
        // hw.optional.arm64 stays 1 under Rosetta, where uname reports x86_64.
        if self.stdout("sysctl", &["-n", "hw.optional.arm64"]).as_deref() == Some("1") {
            return Architecture::AppleSilicon;
        }
        match self.stdout("uname", &["-m"]).as_deref() {
            Some("arm64") => Architecture::AppleSilicon,
            Some("x86_64") | Some("i386") => Architecture::Intel,
            _ => Architecture::Unknown,
        }
    }

    /// Items under `data_type` from `system_profiler <data_type> -json`.
    fn system_profiler_items(&self, data_type: &str) -> Option<Vec<Value>> {
        let raw = self.stdout("system_profiler", &[data_type, "-json"])?;
        let parsed: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(err) => {
                debug!(data_type, error = %err, "system_profiler returned invalid JSON");
                return None;
            }
        };
        parsed.get(data_type).and_then(Value::as_array).cloned()
    }

    fn has_items(&self, data_type: &str) -> bool {
        self.system_profiler_items(data_type)
            .is_some_and(|items| !items.is_empty())
    }
}

/// Whether `networksetup -listallhardwareports` names a port containing
/// `kind`. Only `Hardware Port:` lines count.
pub(crate) fn has_port(output: &str, kind: &str) -> bool {
    output
        .lines()
        .filter_map(|line| line.strip_prefix("Hardware Port:"))
        .any(|port| port.contains(kind))
}

pub(crate) fn parse_bioutil(output: &str) -> bool {
    if output.contains("Touch ID") {
        return true;
    }
    output.lines().any(|line| {
        let lower = line.to_ascii_lowercase();
        lower.contains("biometric")
            && line
                .rsplit_once(':')
                .is_some_and(|(_, value)| value.trim() == "1")
    })
}

/// Attached displays per GPU; a GPU without a display list counts as one.
pub(crate) fn count_displays(gpus: &[Value]) -> u32 {
    gpus.iter()
        .map(|gpu| {
            gpu.get("spdisplays_ndrvs")
                .and_then(Value::as_array)
                .map_or(1, |displays| displays.len() as u32)
        })
        .sum()
}

pub(crate) fn count_audio_devices(sections: &[Value]) -> u32 {
    sections
        .iter()
        .filter_map(|section| section.get("_items").and_then(Value::as_array))
        .map(|items| items.len() as u32)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{CommandOutput, MemoryHost};
    use serde_json::json;

    fn laptop_host() -> MemoryHost {
        MemoryHost::new()
            .with_command("sysctl -n hw.model", CommandOutput::success("Mac15,3\n"))
            .with_command("sysctl -n hw.optional.arm64", CommandOutput::success("1\n"))
            .with_command(
                "pmset -g batt",
                CommandOutput::success(" -InternalBattery-0 (id=123)\t88%; discharging"),
            )
            .with_command(
                "bioutil -r",
                CommandOutput::success("System biometric configuration:\n\tBiometrics for unlock: 1\n"),
            )
            .with_command(
                "system_profiler SPThunderboltDataType -json",
                CommandOutput::success(json!({"SPThunderboltDataType": [{"_name": "bus0"}]}).to_string()),
            )
            .with_command(
                "system_profiler SPDisplaysDataType -json",
                CommandOutput::success(
                    json!({"SPDisplaysDataType": [{"spdisplays_ndrvs": [{"_name": "Built-in"}, {"_name": "LG"}]}]})
                        .to_string(),
                ),
            )
            .with_command(
                "system_profiler SPAudioDataType -json",
                CommandOutput::success(
                    json!({"SPAudioDataType": [{"_items": [{"_name": "Speakers"}, {"_name": "Mic"}]}]}).to_string(),
                ),
            )
            .with_command(
                "networksetup -listallhardwareports",
                CommandOutput::success(PORTS_WITHOUT_ETHERNET),
            )
            .with_command(
                "system_profiler SPBluetoothDataType -json",
                CommandOutput::success(
                    json!({"SPBluetoothDataType": [{"controller_properties": {"controller_state": "attrib_on"}}]})
                        .to_string(),
                ),
            )
    }

    const PORTS_WITHOUT_ETHERNET: &str = "\
Hardware Port: Wi-Fi
Device: en0
Ethernet Address: 3c:22:fb:00:00:01

Hardware Port: Thunderbolt Bridge
Device: bridge0
Ethernet Address: N/A
";

    #[test]
    fn profiles_apple_silicon_laptop() {
        let set = profile(&laptop_host());
        assert_eq!(set.architecture, Architecture::AppleSilicon);
        assert_eq!(set.model, "Mac15,3");
        assert!(set.battery);
        assert!(set.biometric);
        assert!(set.high_speed_bus);
        assert!(!set.optical_drive);
        assert_eq!(set.display_count, 2);
        assert_eq!(set.audio_device_count, 2);
        assert!(set.wifi);
        assert!(set.bluetooth);
        assert!(!set.ethernet);
    }

    #[test]
    fn failed_queries_degrade_to_conservative_defaults() {
        let set = profile(&MemoryHost::new());
        assert_eq!(set, HardwareCapabilitySet::unknown());
    }

    #[test]
    fn intel_detected_from_uname_when_arm64_flag_absent() {
        let host = MemoryHost::new()
            .with_command("sysctl -n hw.optional.arm64", CommandOutput::failure(1, "unknown oid"))
            .with_command("uname -m", CommandOutput::success("x86_64\n"));
        assert_eq!(profile(&host).architecture, Architecture::Intel);
    }

    #[test]
    fn malformed_system_profiler_output_is_ignored() {
        let host = MemoryHost::new().with_command(
            "system_profiler SPDisplaysDataType -json",
            CommandOutput::success("not json"),
        );
        assert_eq!(profile(&host).display_count, 0);
    }

    #[test]
    fn satisfies_respects_each_tag() {
        let mut set = HardwareCapabilitySet::unknown();
        assert!(!set.satisfies(&CapabilityTag::Biometric));
        set.biometric = true;
        assert!(set.satisfies(&CapabilityTag::Biometric));
        assert!(!set.satisfies(&CapabilityTag::Other("faceId".into())));
        assert!(!set.satisfies(&CapabilityTag::Ethernet));
        set.ethernet = true;
        assert!(set.satisfies(&CapabilityTag::Ethernet));
    }

    #[test]
    fn ports_match_only_hardware_port_lines() {
        // Every port lists an "Ethernet Address", which is not an Ethernet port.
        assert!(!has_port(PORTS_WITHOUT_ETHERNET, "Ethernet"));
        assert!(has_port(PORTS_WITHOUT_ETHERNET, "Wi-Fi"));
        assert!(has_port("Hardware Port: Ethernet\nDevice: en1\n", "Ethernet"));
    }

    #[test]
    fn cancelled_profile_runs_no_queries() {
        let token = CancelToken::new();
        token.cancel();
        assert_eq!(profile_with(&laptop_host(), &token), HardwareCapabilitySet::unknown());
    }

    #[test]
    fn bioutil_disabled_output_is_not_biometric() {
        assert!(!parse_bioutil("Biometrics for unlock: 0\n"));
        assert!(parse_bioutil("Touch ID is configured"));
    }
}
