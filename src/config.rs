//! Runtime configuration.
//!
//! Values come from built-in defaults, then an optional JSON file (`--config`
//! or `AUTHSURFACE_CONFIG`), then `AUTHSURFACE_*` environment overrides.
//! Every field is optional in the file.

use crate::catalog::sources::{self, ExtraRequirements};
use crate::catalog::{DiscoverySettings, StaticFallbackReader, VisibilityPolicy};
use crate::catalog::tables;
use crate::logging::{LogFormat, LogLevel};
use crate::split_list;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_CONFIG: &str = "AUTHSURFACE_CONFIG";
pub const ENV_DATA_DIR: &str = "AUTHSURFACE_DATA_DIR";
pub const ENV_MANIFEST_PATH: &str = "AUTHSURFACE_MANIFEST_PATH";
pub const ENV_LEGACY_DIRS: &str = "AUTHSURFACE_LEGACY_DIRS";
pub const ENV_READER_TIMEOUT_MS: &str = "AUTHSURFACE_READER_TIMEOUT_MS";
pub const ENV_COMMAND_TIMEOUT_MS: &str = "AUTHSURFACE_COMMAND_TIMEOUT_MS";

pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_DATA_DIR: &str = "data";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub manifest_path: PathBuf,
    pub legacy_dirs: Vec<PathBuf>,
    pub reader_timeout_ms: u64,
    pub hardware_timeout_ms: u64,
    pub command_timeout_ms: u64,
    pub data_dir: PathBuf,
    /// Identifiers treated as visible on top of the built-in allowlist.
    pub known_visible: Vec<String>,
    pub legacy_implies_visible: bool,
    /// Pane identifier to capability tags, on top of the built-in table.
    pub extra_requirements: BTreeMap<String, Vec<String>>,
    pub bind: String,
    pub port: u16,
    pub log_level: LogLevel,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        let home = std::env::var_os("HOME").map(PathBuf::from);
        Self {
            manifest_path: PathBuf::from(sources::DEFAULT_MANIFEST_PATH),
            legacy_dirs: sources::default_legacy_dirs(home.as_deref()),
            reader_timeout_ms: 5_000,
            hardware_timeout_ms: 30_000,
            command_timeout_ms: 10_000,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            known_visible: Vec::new(),
            legacy_implies_visible: true,
            extra_requirements: BTreeMap::new(),
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
            log_level: LogLevel::default(),
            log_format: LogFormat::default(),
        }
    }
}

impl Config {
    /// Parse a JSON config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Defaults, then the file named by `explicit` or `AUTHSURFACE_CONFIG`,
    /// then environment overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::load_with(explicit, |key| std::env::var(key).ok())
    }

    pub fn load_with<F>(explicit: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let from_env = non_empty(&lookup, ENV_CONFIG).map(PathBuf::from);
        let mut config = match explicit.map(Path::to_path_buf).or(from_env) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env_from(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `AUTHSURFACE_*` overrides read through `lookup`.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = non_empty(&lookup, ENV_DATA_DIR) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(path) = non_empty(&lookup, ENV_MANIFEST_PATH) {
            self.manifest_path = PathBuf::from(path);
        }
        if let Some(raw) = non_empty(&lookup, ENV_LEGACY_DIRS) {
            self.legacy_dirs = split_list(&raw).into_iter().map(PathBuf::from).collect();
        }
        if let Some(raw) = non_empty(&lookup, ENV_READER_TIMEOUT_MS) {
            self.reader_timeout_ms = parse_millis(ENV_READER_TIMEOUT_MS, &raw)?;
        }
        if let Some(raw) = non_empty(&lookup, ENV_COMMAND_TIMEOUT_MS) {
            self.command_timeout_ms = parse_millis(ENV_COMMAND_TIMEOUT_MS, &raw)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("reader_timeout_ms", self.reader_timeout_ms),
            ("hardware_timeout_ms", self.hardware_timeout_ms),
            ("command_timeout_ms", self.command_timeout_ms),
        ] {
            if value == 0 {
                bail!("{field} must be greater than zero");
            }
        }
        if self.bind.trim().is_empty() {
            bail!("bind must not be empty");
        }
        if self.data_dir.as_os_str().is_empty() {
            bail!("data_dir must not be empty");
        }
        for (identifier, tags) in &self.extra_requirements {
            if identifier.trim().is_empty() {
                bail!("extra_requirements must not contain empty identifiers");
            }
            if tags.iter().any(|tag| tag.trim().is_empty()) {
                bail!("extra_requirements.{identifier} contains an empty capability tag");
            }
        }
        if self.known_visible.iter().any(|id| id.trim().is_empty()) {
            bail!("known_visible must not contain empty identifiers");
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    /// Pane discovery settings derived from this config.
    pub fn discovery_settings(&self) -> DiscoverySettings {
        let extra: ExtraRequirements = self
            .extra_requirements
            .iter()
            .map(|(id, tags)| (id.as_str(), tags.clone()))
            .collect();
        let visibility = VisibilityPolicy::new(
            tables::default_known_visible(),
            self.legacy_implies_visible,
        )
        .allow(&self.known_visible);
        DiscoverySettings {
            manifest_path: self.manifest_path.clone(),
            legacy_dirs: self.legacy_dirs.clone(),
            reader_timeout: Duration::from_millis(self.reader_timeout_ms),
            hardware_timeout: Duration::from_millis(self.hardware_timeout_ms),
            extra_requirements: extra,
            visibility,
            fallback: StaticFallbackReader::embedded(),
        }
    }
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_millis(key: &str, raw: &str) -> Result<u64> {
    let value: u64 = raw
        .parse()
        .with_context(|| format!("{key} must be a whole number of milliseconds, got '{raw}'"))?;
    if value == 0 {
        bail!("{key} must be greater than zero");
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CapabilityTag;
    use crate::catalog::PaneId;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn defaults_bind_localhost_5000() {
        let config = Config::load_with(None, env(&[])).unwrap();
        assert_eq!(config.bind_addr(), "127.0.0.1:5000");
        assert_eq!(config.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn env_overrides_apply_after_file() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        write!(file, r#"{{"data_dir": "/from/file", "port": 8080}}"#)?;
        let path = file.path().to_string_lossy().into_owned();
        let vars = [
            (ENV_CONFIG, path.as_str()),
            (ENV_DATA_DIR, "/from/env"),
            (ENV_LEGACY_DIRS, "/a, /b"),
            (ENV_READER_TIMEOUT_MS, "250"),
        ];
        let config = Config::load_with(None, env(&vars))?;
        assert_eq!(config.data_dir, PathBuf::from("/from/env"));
        assert_eq!(config.port, 8080);
        assert_eq!(config.legacy_dirs, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
        assert_eq!(config.reader_timeout_ms, 250);
        Ok(())
    }

    #[test]
    fn rejects_bad_values_naming_the_field() {
        let err = Config::load_with(None, env(&[(ENV_COMMAND_TIMEOUT_MS, "soon")])).unwrap_err();
        assert!(format!("{err:#}").contains(ENV_COMMAND_TIMEOUT_MS));

        let config = Config {
            reader_timeout_ms: 0,
            ..Config::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("reader_timeout_ms"));
    }

    #[test]
    fn unknown_file_fields_are_rejected() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        write!(file, r#"{{"colour": "blue"}}"#)?;
        assert!(Config::load_with(Some(file.path()), env(&[])).is_err());
        Ok(())
    }

    #[test]
    fn discovery_settings_carry_extra_requirements_and_visibility() {
        let mut config = Config::default();
        config
            .extra_requirements
            .insert("com.apple.Foo".to_string(), vec!["audio".to_string()]);
        config.known_visible.push("com.apple.Foo".to_string());
        let settings = config.discovery_settings();
        assert_eq!(
            settings.extra_requirements.for_id(&PaneId::new("com.apple.foo")),
            vec![CapabilityTag::Audio]
        );
        assert!(
            settings
                .visibility
                .is_visible("com.apple.foo", &Default::default())
        );
    }
}
