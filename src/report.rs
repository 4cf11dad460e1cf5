//! Discovery reports: assembly and flat-file storage.
//!
//! A report pairs one pane discovery snapshot with the authorization check
//! results gathered in the same session. Reports are schema-checked and then
//! written as `auth_discovery_report_<timestamp>.json` into the data
//! directory; nothing else is persisted. A report can also be flattened to
//! CSV, one row per finding.

use crate::catalog::{DiscoverySummary, PaneCatalogEntry, PaneDiscovery};
use crate::checks::{AuthCategory, AuthType, AuthorizationFinding};
use crate::compare::{self, ReportComparison};
use crate::hardware::HardwareCapabilitySet;
use crate::report_schema::{REPORT_SCHEMA_VERSION, ReportSchema};
use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::info;

pub const REPORT_PREFIX: &str = "auth_discovery_report_";
pub const REPORT_SUFFIX: &str = ".json";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_seconds: f64,
}

impl SessionInfo {
    pub fn between(started_at: DateTime<Utc>, finished_at: DateTime<Utc>) -> Self {
        let millis = (finished_at - started_at).num_milliseconds().max(0);
        Self {
            started_at,
            finished_at,
            duration_seconds: millis as f64 / 1000.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryReport {
    pub schema_version: String,
    pub session: SessionInfo,
    pub hardware: HardwareCapabilitySet,
    pub panes: Vec<PaneCatalogEntry>,
    pub summary: DiscoverySummary,
    pub authorization_results: BTreeMap<AuthCategory, Vec<AuthorizationFinding>>,
}

impl DiscoveryReport {
    pub fn finding_count(&self) -> usize {
        self.authorization_results.values().map(Vec::len).sum()
    }

    pub fn findings(&self) -> impl Iterator<Item = &AuthorizationFinding> {
        self.authorization_results.values().flatten()
    }

    /// One CSV row per finding, with a header row.
    pub fn to_csv(&self) -> Result<String> {
        let finished_at = self.session.finished_at.to_rfc3339();
        let mut writer = csv::Writer::from_writer(Vec::new());
        for finding in self.findings() {
            writer
                .serialize(CsvRow {
                    category: finding.category,
                    name: &finding.name,
                    status: finding.status.as_deref().unwrap_or(""),
                    requires_auth: finding.requires_auth,
                    auth_type: finding.auth_type,
                    description: &finding.description,
                    subject: finding.subject(),
                    hardware_model: &self.hardware.model,
                    finished_at: &finished_at,
                })
                .context("writing CSV row")?;
        }
        if self.finding_count() == 0 {
            writer.write_record(CSV_HEADER).context("writing CSV header")?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|err| anyhow!("flushing CSV: {}", err.error()))?;
        String::from_utf8(bytes).context("CSV is not UTF-8")
    }
}

const CSV_HEADER: [&str; 9] = [
    "category",
    "name",
    "status",
    "requires_auth",
    "auth_type",
    "description",
    "subject",
    "hardware_model",
    "finished_at",
];

#[derive(Serialize)]
struct CsvRow<'a> {
    category: AuthCategory,
    name: &'a str,
    status: &'a str,
    requires_auth: bool,
    auth_type: AuthType,
    description: &'a str,
    subject: String,
    hardware_model: &'a str,
    finished_at: &'a str,
}

/// Combines a pane snapshot with check results. Pure.
pub struct ReportAssembler;

impl ReportAssembler {
    pub fn assemble(
        session: SessionInfo,
        discovery: PaneDiscovery,
        authorization_results: BTreeMap<AuthCategory, Vec<AuthorizationFinding>>,
    ) -> DiscoveryReport {
        let mut results = authorization_results;
        for category in AuthCategory::ALL {
            results.entry(category).or_default();
        }
        DiscoveryReport {
            schema_version: REPORT_SCHEMA_VERSION.to_string(),
            session,
            hardware: discovery.hardware,
            panes: discovery.panes,
            summary: discovery.summary,
            authorization_results: results,
        }
    }
}

/// A stored report, as listed by [`ReportStore::list`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StoredReport {
    pub file_name: String,
    pub size_bytes: u64,
}

/// Flat directory of report files.
#[derive(Clone)]
pub struct ReportStore {
    dir: PathBuf,
    schema: Arc<ReportSchema>,
}

impl ReportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            dir: dir.into(),
            schema: Arc::new(ReportSchema::embedded()?),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Validate and atomically write `report`, returning its path.
    pub fn write(&self, report: &DiscoveryReport) -> Result<PathBuf> {
        let value = serde_json::to_value(report).context("serializing report")?;
        self.schema.validate(&value)?;
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating report directory {}", self.dir.display()))?;

        let mut tmp = NamedTempFile::new_in(&self.dir)
            .with_context(|| format!("creating temp file in {}", self.dir.display()))?;
        serde_json::to_writer_pretty(&mut tmp, &value).context("writing report")?;
        tmp.write_all(b"\n").context("writing report")?;
        tmp.flush().context("flushing report")?;

        let stamp = report.session.finished_at.format("%Y%m%d_%H%M%S").to_string();
        let mut attempt = 1;
        loop {
            let name = if attempt == 1 {
                format!("{REPORT_PREFIX}{stamp}{REPORT_SUFFIX}")
            } else {
                format!("{REPORT_PREFIX}{stamp}_{attempt}{REPORT_SUFFIX}")
            };
            let path = self.dir.join(&name);
            match tmp.persist_noclobber(&path) {
                Ok(_) => {
                    info!(path = %path.display(), "discovery report saved");
                    return Ok(path);
                }
                Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => {
                    tmp = err.file;
                    attempt += 1;
                }
                Err(err) => {
                    return Err(err.error)
                        .with_context(|| format!("persisting report {}", path.display()));
                }
            }
        }
    }

    /// Stored reports, newest first. A missing directory lists as empty.
    pub fn list(&self) -> Result<Vec<StoredReport>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("reading report directory {}", self.dir.display()));
            }
        };
        let mut reports = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| format!("reading {}", self.dir.display()))?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if !is_report_name(&file_name) {
                continue;
            }
            let size_bytes = entry.metadata().map(|meta| meta.len()).unwrap_or(0);
            reports.push(StoredReport {
                file_name,
                size_bytes,
            });
        }
        reports.sort_by_cached_key(|stored| std::cmp::Reverse(report_order(&stored.file_name)));
        Ok(reports)
    }

    /// Load a report by bare file name. Paths and foreign names are refused.
    pub fn load(&self, file_name: &str) -> Result<DiscoveryReport> {
        if !is_report_name(file_name) {
            bail!("invalid report name '{file_name}'");
        }
        let path = self.dir.join(file_name);
        let raw =
            fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn latest(&self) -> Result<Option<DiscoveryReport>> {
        match self.list()?.first() {
            Some(stored) => self.load(&stored.file_name).map(Some),
            None => Ok(None),
        }
    }

    /// Load two stored reports and diff them, `first` being the baseline.
    pub fn compare(&self, first: &str, second: &str) -> Result<ReportComparison> {
        let baseline = self.load(first)?;
        let current = self.load(second)?;
        Ok(compare::compare_reports(
            (first, &baseline),
            (second, &current),
        ))
    }
}

/// Sort key for `<date>_<time>[_<n>]`. The first save in a second has no
/// suffix and sorts as `n = 1`.
fn report_order(file_name: &str) -> (String, u64) {
    let core = file_name
        .strip_prefix(REPORT_PREFIX)
        .and_then(|rest| rest.strip_suffix(REPORT_SUFFIX))
        .unwrap_or(file_name);
    let parts: Vec<&str> = core.split('_').collect();
    if let [stamp @ .., last] = parts.as_slice() {
        if stamp.len() >= 2 {
            if let Ok(attempt) = last.parse::<u64>() {
                return (stamp.join("_"), attempt);
            }
        }
    }
    (core.to_string(), 1)
}

fn is_report_name(name: &str) -> bool {
    let Some(core) = name
        .strip_prefix(REPORT_PREFIX)
        .and_then(|rest| rest.strip_suffix(REPORT_SUFFIX))
    else {
        return false;
    };
    !core.is_empty() && core.chars().all(|c| c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_names_are_strict() {
        assert!(is_report_name("auth_discovery_report_20240101_120000.json"));
        assert!(is_report_name("auth_discovery_report_20240101_120000_2.json"));
        assert!(!is_report_name("auth_discovery_report_.json"));
        assert!(!is_report_name("../auth_discovery_report_1.json"));
        assert!(!is_report_name("auth_discovery_report_1/../../x.json"));
        assert!(!is_report_name("notes.json"));
    }

    #[test]
    fn session_duration_never_negative() {
        let now = Utc::now();
        let session = SessionInfo::between(now, now - chrono::Duration::seconds(5));
        assert_eq!(session.duration_seconds, 0.0);
        let session = SessionInfo::between(now, now + chrono::Duration::milliseconds(1500));
        assert_eq!(session.duration_seconds, 1.5);
    }

    #[test]
    fn repeated_saves_in_one_second_list_by_attempt_number() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "auth_discovery_report_20240101_120000.json",
            "auth_discovery_report_20240101_120000_2.json",
            "auth_discovery_report_20240101_120000_10.json",
            "auth_discovery_report_20231231_235959_3.json",
            "auth_discovery_report_20240102_080000.json",
        ] {
            fs::write(dir.path().join(name), "{}").unwrap();
        }
        let store = ReportStore::new(dir.path()).unwrap();
        let names: Vec<String> = store
            .list()
            .unwrap()
            .into_iter()
            .map(|stored| stored.file_name)
            .collect();
        assert_eq!(
            names,
            vec![
                "auth_discovery_report_20240102_080000.json",
                "auth_discovery_report_20240101_120000_10.json",
                "auth_discovery_report_20240101_120000_2.json",
                "auth_discovery_report_20240101_120000.json",
                "auth_discovery_report_20231231_235959_3.json",
            ]
        );
    }

    #[test]
    fn missing_directory_lists_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(dir.path().join("absent")).unwrap();
        assert!(store.list().unwrap().is_empty());
        assert!(store.latest().unwrap().is_none());
    }
}
