//! Version-dependent discovery strategy.
//!
//! The strategy is chosen once per run from the detected OS version and then
//! passed by value to everything that needs it. Readers and the reconciler
//! ask the strategy questions (`dynamic_sources`, `rank`) instead of
//! branching on the version themselves.

use crate::catalog::SourceKind;
use anyhow::{Result, bail};
use std::fmt;

/// First major release whose System Settings ships a sidebar manifest.
pub const MODERN_MAJOR: u32 = 13;

/// Version assumed when `sw_vers` cannot be queried.
pub const ASSUMED_VERSION: (u32, u32, u32) = (15, 0, 0);

pub const UNKNOWN_VERSION: &str = "unknown";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OsVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    /// Version string as reported, or `unknown` for an assumed version.
    pub raw: String,
}

impl OsVersion {
    /// Parse `14`, `14.5`, or `14.5.1`. Surrounding whitespace is ignored.
    pub fn parse(value: &str) -> Result<Self> {
        let raw = value.trim();
        if raw.is_empty() {
            bail!("empty OS version string");
        }
        let mut parts = raw.split('.');
        let mut next = |label: &str, required: bool| -> Result<u32> {
            match parts.next() {
                Some(part) => part
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| anyhow::anyhow!("invalid {label} component in OS version '{raw}'")),
                None if required => bail!("missing {label} component in OS version '{raw}'"),
                None => Ok(0),
            }
        };
        let major = next("major", true)?;
        let minor = next("minor", false)?;
        let patch = next("patch", false)?;
        Ok(Self {
            major,
            minor,
            patch,
            raw: raw.to_string(),
        })
    }

    pub fn assumed() -> Self {
        let (major, minor, patch) = ASSUMED_VERSION;
        Self {
            major,
            minor,
            patch,
            raw: UNKNOWN_VERSION.to_string(),
        }
    }

    pub fn is_assumed(&self) -> bool {
        self.raw == UNKNOWN_VERSION
    }
}

impl fmt::Display for OsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VersionStrategy {
    Modern,
    Legacy,
}

struct StrategySpec {
    strategy: VersionStrategy,
    name: &'static str,
    /// Dynamic readers invoked for this strategy, in preference order.
    dynamic: &'static [SourceKind],
    /// Name-resolution priority, best first.
    priority: [SourceKind; 3],
}

const STRATEGY_SPECS: &[StrategySpec] = &[
    StrategySpec {
        strategy: VersionStrategy::Modern,
        name: "modern",
        dynamic: &[SourceKind::ExtensionManifest, SourceKind::LegacyDirectory],
        priority: [
            SourceKind::ExtensionManifest,
            SourceKind::LegacyDirectory,
            SourceKind::StaticFallback,
        ],
    },
    StrategySpec {
        strategy: VersionStrategy::Legacy,
        name: "legacy",
        dynamic: &[SourceKind::LegacyDirectory],
        priority: [
            SourceKind::LegacyDirectory,
            SourceKind::ExtensionManifest,
            SourceKind::StaticFallback,
        ],
    },
];

impl VersionStrategy {
    pub fn select(version: &OsVersion) -> Self {
        if version.major >= MODERN_MAJOR {
            VersionStrategy::Modern
        } else {
            VersionStrategy::Legacy
        }
    }

    fn spec(&self) -> &'static StrategySpec {
        STRATEGY_SPECS
            .iter()
            .find(|spec| spec.strategy == *self)
            .unwrap_or(&STRATEGY_SPECS[0])
    }

    pub fn as_str(&self) -> &'static str {
        self.spec().name
    }

    /// Readers to invoke before considering the static fallback.
    pub fn dynamic_sources(&self) -> &'static [SourceKind] {
        self.spec().dynamic
    }

    pub fn priority(&self) -> [SourceKind; 3] {
        self.spec().priority
    }

    /// Position of `kind` in the name-resolution order; lower wins.
    pub fn rank(&self, kind: SourceKind) -> usize {
        self.priority()
            .iter()
            .position(|candidate| *candidate == kind)
            .unwrap_or(usize::MAX)
    }
}

impl TryFrom<&str> for VersionStrategy {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self> {
        match STRATEGY_SPECS.iter().find(|spec| spec.name == value) {
            Some(spec) => Ok(spec.strategy),
            None => bail!("Unknown strategy: {value}"),
        }
    }
}

impl fmt::Display for VersionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
