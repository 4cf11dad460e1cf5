//! Command-based authorization checks.
//!
//! Each [`AuthCheck`] runs one fixed OS utility through the [`Host`] and turns
//! its output into zero or more [`AuthorizationFinding`]s. A check never
//! fails: when its utility is missing or refuses to answer, the check either
//! reports nothing or reports the surface with an `unknown` status.

use crate::host::{CancelToken, Host};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const SYSTEM_TCC_DB: &str = "/Library/Application Support/com.apple.TCC/TCC.db";
pub const USER_TCC_DB: &str = "Library/Application Support/com.apple.TCC/TCC.db";
pub const FIRMWAREPASSWD: &str = "/usr/sbin/firmwarepasswd";
pub const SOCKETFILTERFW: &str = "/usr/libexec/ApplicationFirewall/socketfilterfw";

const TCC_QUERY: &str = "SELECT client,service FROM access";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthCategory {
    Security,
    System,
    Network,
    Privacy,
}

impl AuthCategory {
    pub const ALL: [AuthCategory; 4] = [
        AuthCategory::Security,
        AuthCategory::System,
        AuthCategory::Network,
        AuthCategory::Privacy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthCategory::Security => "security",
            AuthCategory::System => "system",
            AuthCategory::Network => "network",
            AuthCategory::Privacy => "privacy",
        }
    }
}

impl fmt::Display for AuthCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who has to authenticate to change the surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    Admin,
    User,
    FirmwarePassword,
    UserConsent,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationFinding {
    pub category: AuthCategory,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub requires_auth: bool,
    pub auth_type: AuthType,
    pub description: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub detail: BTreeMap<String, String>,
}

impl AuthorizationFinding {
    fn new(check: AuthCheck, auth_type: AuthType, description: &str) -> Self {
        Self {
            category: check.category(),
            name: check.label().to_string(),
            status: None,
            requires_auth: true,
            auth_type,
            description: description.to_string(),
            detail: BTreeMap::new(),
        }
    }

    /// What the finding is about beyond its check, e.g. the client and
    /// service of a privacy grant. Empty for single-surface checks.
    pub fn subject(&self) -> String {
        ["client", "service"]
            .iter()
            .filter_map(|key| self.detail.get(*key).map(String::as_str))
            .collect::<Vec<_>>()
            .join(" / ")
    }

    fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    fn with_detail(mut self, key: &str, value: impl Into<String>) -> Self {
        self.detail.insert(key.to_string(), value.into());
        self
    }
}

/// Inputs shared by every check in one scan.
pub struct CheckContext<'a> {
    pub host: &'a dyn Host,
    /// Effective uid 0; some utilities only answer to root.
    pub privileged: bool,
    pub home: Option<PathBuf>,
    /// Fired when the session is stopped; interrupts the running utility.
    pub cancel: CancelToken,
}

impl<'a> CheckContext<'a> {
    pub fn new(host: &'a dyn Host) -> Self {
        Self {
            host,
            privileged: running_as_root(),
            home: std::env::var_os("HOME").map(PathBuf::from),
            cancel: CancelToken::new(),
        }
    }

    fn stdout(&self, program: &str, args: &[&str]) -> Option<String> {
        match self.host.run_until(program, args, &self.cancel) {
            Ok(output) if output.is_success() => Some(output.stdout),
            Ok(output) => {
                debug!(program, code = ?output.code, "check command returned non-zero");
                None
            }
            Err(err) => {
                debug!(program, error = %err, "check command failed");
                None
            }
        }
    }
}

pub fn running_as_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthCheck {
    FileVault,
    FirmwarePassword,
    SystemIntegrity,
    Gatekeeper,
    SoftwareUpdate,
    TimeMachine,
    Firewall,
    NetworkSettings,
    SystemPrivacyGrants,
    UserPrivacyGrants,
}

impl AuthCheck {
    pub const ALL: [AuthCheck; 10] = [
        AuthCheck::FileVault,
        AuthCheck::FirmwarePassword,
        AuthCheck::SystemIntegrity,
        AuthCheck::Gatekeeper,
        AuthCheck::SoftwareUpdate,
        AuthCheck::TimeMachine,
        AuthCheck::Firewall,
        AuthCheck::NetworkSettings,
        AuthCheck::SystemPrivacyGrants,
        AuthCheck::UserPrivacyGrants,
    ];

    pub fn category(&self) -> AuthCategory {
        match self {
            AuthCheck::FileVault
            | AuthCheck::FirmwarePassword
            | AuthCheck::SystemIntegrity
            | AuthCheck::Gatekeeper => AuthCategory::Security,
            AuthCheck::SoftwareUpdate | AuthCheck::TimeMachine => AuthCategory::System,
            AuthCheck::Firewall | AuthCheck::NetworkSettings => AuthCategory::Network,
            AuthCheck::SystemPrivacyGrants | AuthCheck::UserPrivacyGrants => AuthCategory::Privacy,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AuthCheck::FileVault => "FileVault",
            AuthCheck::FirmwarePassword => "Firmware Password",
            AuthCheck::SystemIntegrity => "System Integrity Protection",
            AuthCheck::Gatekeeper => "Gatekeeper",
            AuthCheck::SoftwareUpdate => "Software Update",
            AuthCheck::TimeMachine => "Time Machine",
            AuthCheck::Firewall => "Firewall",
            AuthCheck::NetworkSettings => "Network Settings",
            AuthCheck::SystemPrivacyGrants | AuthCheck::UserPrivacyGrants => "TCC Permission",
        }
    }

    pub fn run(&self, ctx: &CheckContext<'_>) -> Vec<AuthorizationFinding> {
        let check = *self;
        match check {
            AuthCheck::FileVault => ctx
                .stdout("fdesetup", &["status"])
                .map(|out| {
                    AuthorizationFinding::new(
                        check,
                        AuthType::Admin,
                        "Full disk encryption requires authentication for setup and recovery",
                    )
                    .with_status(on_off(out.contains("FileVault is On")))
                })
                .into_iter()
                .collect(),
            AuthCheck::FirmwarePassword => {
                if !ctx.privileged {
                    debug!("skipping firmware password check without root");
                    return Vec::new();
                }
                ctx.stdout(FIRMWAREPASSWD, &["-check"])
                    .map(|out| {
                        AuthorizationFinding::new(
                            check,
                            AuthType::FirmwarePassword,
                            "Firmware password protects against unauthorized system access",
                        )
                        .with_status(on_off(out.contains("Yes")))
                    })
                    .into_iter()
                    .collect()
            }
            AuthCheck::SystemIntegrity => ctx
                .stdout("csrutil", &["status"])
                .map(|out| {
                    AuthorizationFinding::new(
                        check,
                        AuthType::Admin,
                        "Changing System Integrity Protection requires booting into Recovery",
                    )
                    .with_status(parse_csrutil(&out))
                })
                .into_iter()
                .collect(),
            AuthCheck::Gatekeeper => ctx
                .stdout("spctl", &["--status"])
                .map(|out| {
                    AuthorizationFinding::new(
                        check,
                        AuthType::Admin,
                        "Allowing apps from unidentified developers requires administrator authentication",
                    )
                    .with_status(parse_spctl(&out))
                })
                .into_iter()
                .collect(),
            AuthCheck::SoftwareUpdate => {
                let status = ctx
                    .stdout("softwareupdate", &["--schedule"])
                    .map(|out| parse_update_schedule(&out))
                    .unwrap_or("unknown");
                vec![
                    AuthorizationFinding::new(
                        check,
                        AuthType::Admin,
                        "Installing system updates requires administrator authentication",
                    )
                    .with_status(status),
                ]
            }
            AuthCheck::TimeMachine => ctx
                .stdout("tmutil", &["destinationinfo"])
                .filter(|out| out.to_ascii_lowercase().contains("encrypted"))
                .map(|_| {
                    AuthorizationFinding::new(
                        check,
                        AuthType::User,
                        "Time Machine backup encryption requires password for access",
                    )
                    .with_status("encrypted")
                })
                .into_iter()
                .collect(),
            AuthCheck::Firewall => {
                let status = ctx
                    .stdout(SOCKETFILTERFW, &["--getglobalstate"])
                    .map(|out| parse_firewall(&out))
                    .unwrap_or("unknown");
                vec![
                    AuthorizationFinding::new(
                        check,
                        AuthType::Admin,
                        "Modifying firewall settings requires administrator authentication",
                    )
                    .with_status(status),
                ]
            }
            AuthCheck::NetworkSettings => vec![AuthorizationFinding::new(
                check,
                AuthType::Admin,
                "Modifying network services requires administrator authentication",
            )],
            AuthCheck::SystemPrivacyGrants => tcc_grants(ctx, Path::new(SYSTEM_TCC_DB)),
            AuthCheck::UserPrivacyGrants => match &ctx.home {
                Some(home) => tcc_grants(ctx, &home.join(USER_TCC_DB)),
                None => Vec::new(),
            },
        }
    }
}

/// Run every check, grouped by category. Every category is present.
pub fn run_all(ctx: &CheckContext<'_>) -> BTreeMap<AuthCategory, Vec<AuthorizationFinding>> {
    let mut results: BTreeMap<AuthCategory, Vec<AuthorizationFinding>> = AuthCategory::ALL
        .iter()
        .map(|category| (*category, Vec::new()))
        .collect();
    for check in AuthCheck::ALL {
        results
            .entry(check.category())
            .or_default()
            .extend(check.run(ctx));
    }
    results
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "enabled" } else { "disabled" }
}

/// Reads only the `status:` line; the per-protection lines that follow a
/// custom configuration mix `enabled` and `disabled`.
pub(crate) fn parse_csrutil(output: &str) -> &'static str {
    let Some(status) = output.lines().find_map(|line| {
        let lower = line.to_lowercase();
        lower
            .split_once("status:")
            .map(|(_, value)| value.trim().to_string())
    }) else {
        return "unknown";
    };
    if status.contains("custom configuration") {
        "custom"
    } else if status.starts_with("enabled") {
        "enabled"
    } else if status.starts_with("disabled") {
        "disabled"
    } else {
        "unknown"
    }
}

pub(crate) fn parse_spctl(output: &str) -> &'static str {
    let lower = output.to_lowercase();
    if lower.contains("assessments enabled") {
        "enabled"
    } else if lower.contains("assessments disabled") {
        "disabled"
    } else {
        "unknown"
    }
}

pub(crate) fn parse_update_schedule(output: &str) -> &'static str {
    let lower = output.to_lowercase();
    if lower.contains("turned on") {
        "automatic"
    } else if lower.contains("turned off") {
        "manual"
    } else {
        "unknown"
    }
}

pub(crate) fn parse_firewall(output: &str) -> &'static str {
    let lower = output.to_lowercase();
    if lower.contains("state = 0") || lower.contains("disabled") {
        "disabled"
    } else if lower.contains("enabled") || lower.contains("block all") {
        "enabled"
    } else {
        "unknown"
    }
}

fn tcc_grants(ctx: &CheckContext<'_>, db: &Path) -> Vec<AuthorizationFinding> {
    let db_arg = db.to_string_lossy();
    let Some(out) = ctx.stdout("sqlite3", &[&*db_arg, TCC_QUERY]) else {
        return Vec::new();
    };
    let check = if db == Path::new(SYSTEM_TCC_DB) {
        AuthCheck::SystemPrivacyGrants
    } else {
        AuthCheck::UserPrivacyGrants
    };
    parse_tcc_rows(&out)
        .into_iter()
        .map(|(client, service)| {
            AuthorizationFinding::new(
                check,
                AuthType::UserConsent,
                "Privacy permission granted through Transparency, Consent, and Control",
            )
            .with_status("granted")
            .with_detail("client", client)
            .with_detail("service", service)
            .with_detail("source", db_arg.to_string())
        })
        .collect()
}

/// `client|service` rows; anything else is skipped.
pub(crate) fn parse_tcc_rows(output: &str) -> Vec<(String, String)> {
    output
        .lines()
        .filter_map(|line| {
            let (client, service) = line.trim().split_once('|')?;
            let (client, service) = (client.trim(), service.trim());
            if client.is_empty() || service.is_empty() || service.contains('|') {
                return None;
            }
            Some((client.to_string(), service.to_string()))
        })
        .collect()
}
