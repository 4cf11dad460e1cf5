//! Pane source readers.
//!
//! Each reader turns one backing data source into `PaneCandidate`s tagged
//! with its `SourceKind`. Readers hold only immutable configuration, so
//! calling `read` again re-reads the source from scratch. A reader never
//! returns an error: a missing or undecodable source yields an empty
//! `SourceRead` carrying a `SourceFailure`.

use crate::catalog::tables;
use crate::catalog::{CapabilityTag, FailureReason, PaneCandidate, PaneId, SourceKind, SourceRead};
use crate::host::{CancelToken, Host, HostError};
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_MANIFEST_PATH: &str =
    "/System/Applications/System Settings.app/Contents/Resources/Sidebar.plist";
pub const SYSTEM_PREFPANE_DIR: &str = "/System/Library/PreferencePanes";
pub const USER_PREFPANE_DIR: &str = "Library/PreferencePanes";
pub const PREFPANE_SUFFIX: &str = ".prefPane";

const MANIFEST_ID_PATTERN: &str = r"^com\.apple\.[A-Za-z0-9._-]+$";

/// A source of raw pane candidates.
pub trait PaneSource: Send + Sync {
    fn kind(&self) -> SourceKind;
    fn read(&self) -> SourceRead;

    /// Read, stopping early once `cancel` fires. A cancelled read is
    /// incomplete and must be discarded by the caller.
    fn read_until(&self, _cancel: &CancelToken) -> SourceRead {
        self.read()
    }
}

/// Hardware requirements supplied on top of the embedded tables, keyed by
/// canonical pane key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtraRequirements {
    by_key: BTreeMap<String, BTreeSet<CapabilityTag>>,
}

impl ExtraRequirements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<I>(&mut self, identifier: &str, tags: I)
    where
        I: IntoIterator<Item = CapabilityTag>,
    {
        let key = PaneId::new(identifier).key();
        if key.is_empty() {
            return;
        }
        self.by_key.entry(key).or_default().extend(tags);
    }

    pub fn for_id(&self, identifier: &PaneId) -> Vec<CapabilityTag> {
        self.by_key
            .get(&identifier.key())
            .map(|tags| tags.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<(S, Vec<String>)> for ExtraRequirements {
    fn from_iter<T: IntoIterator<Item = (S, Vec<String>)>>(iter: T) -> Self {
        let mut extra = ExtraRequirements::new();
        for (id, tags) in iter {
            extra.insert(id.as_ref(), tags.into_iter().map(CapabilityTag::from));
        }
        extra
    }
}

fn failure_reason(err: &HostError) -> FailureReason {
    match err {
        HostError::Parse { .. } => FailureReason::ParseError,
        HostError::Timeout { .. } => FailureReason::Timeout,
        _ => FailureReason::SourceUnavailable,
    }
}

/// Reads the System Settings sidebar manifest.
pub struct ExtensionManifestReader {
    host: Arc<dyn Host>,
    path: PathBuf,
    extra: ExtraRequirements,
    pattern: Regex,
}

impl ExtensionManifestReader {
    pub fn new(host: Arc<dyn Host>, path: impl Into<PathBuf>) -> Self {
        Self {
            host,
            path: path.into(),
            extra: ExtraRequirements::default(),
            pattern: Regex::new(MANIFEST_ID_PATTERN).expect("manifest identifier pattern"),
        }
    }

    pub fn with_extra_requirements(mut self, extra: ExtraRequirements) -> Self {
        self.extra = extra;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn candidate(&self, raw: &str) -> PaneCandidate {
        let name = tables::extension_display_name(raw).unwrap_or_default();
        let candidate = PaneCandidate::new(raw, name, SourceKind::ExtensionManifest)
            .requiring(tables::extension_requirements(raw));
        let extra = self.extra.for_id(&candidate.identifier);
        candidate.requiring(extra)
    }
}

impl PaneSource for ExtensionManifestReader {
    fn kind(&self) -> SourceKind {
        SourceKind::ExtensionManifest
    }

    fn read(&self) -> SourceRead {
        let manifest = match self.host.read_plist(&self.path) {
            Ok(value) => value,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "sidebar manifest unavailable");
                return SourceRead::failed(self.kind(), failure_reason(&err), err.to_string());
            }
        };
        let mut identifiers = Vec::new();
        collect_identifiers(&manifest, &self.pattern, &mut identifiers);
        let candidates: Vec<PaneCandidate> = identifiers
            .iter()
            .map(|raw| self.candidate(raw))
            .collect();
        debug!(count = candidates.len(), "read sidebar manifest");
        SourceRead::ok(self.kind(), candidates)
    }
}

/// Every string (and map key) in `value` that looks like an Apple bundle id,
/// in document order.
fn collect_identifiers(value: &Value, pattern: &Regex, out: &mut Vec<String>) {
    match value {
        Value::String(text) => {
            if pattern.is_match(text.trim()) {
                out.push(text.trim().to_string());
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_identifiers(item, pattern, out);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                if pattern.is_match(key) {
                    out.push(key.clone());
                }
                collect_identifiers(item, pattern, out);
            }
        }
        _ => {}
    }
}

/// Scans preference-pane directories for `.prefPane` bundles.
pub struct LegacyDirectoryReader {
    host: Arc<dyn Host>,
    dirs: Vec<PathBuf>,
    extra: ExtraRequirements,
}

impl LegacyDirectoryReader {
    pub fn new(host: Arc<dyn Host>, dirs: Vec<PathBuf>) -> Self {
        Self {
            host,
            dirs,
            extra: ExtraRequirements::default(),
        }
    }

    pub fn with_extra_requirements(mut self, extra: ExtraRequirements) -> Self {
        self.extra = extra;
        self
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    fn candidate(&self, dir: &Path, bundle: &str) -> PaneCandidate {
        let stem = bundle.strip_suffix(PREFPANE_SUFFIX).unwrap_or(bundle).trim();
        let info = self
            .host
            .read_plist(&dir.join(bundle).join("Contents").join("Info.plist"))
            .ok();
        let info_str = |field: &str| {
            info.as_ref()
                .and_then(|value| value.get(field))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        // A bundle with an empty stem stays empty so the reconciler counts it
        // as malformed.
        let identifier = if stem.is_empty() {
            String::new()
        } else {
            info_str("CFBundleIdentifier").unwrap_or_else(|| stem.to_string())
        };
        let display_name = info_str("CFBundleDisplayName")
            .or_else(|| info_str("CFBundleName"))
            .or_else(|| tables::prefpane_display_name(stem).map(str::to_string))
            .unwrap_or_else(|| {
                if stem.is_empty() {
                    String::new()
                } else {
                    tables::humanize_prefpane(stem)
                }
            });
        let candidate = PaneCandidate::new(identifier, display_name, SourceKind::LegacyDirectory)
            .requiring(tables::prefpane_requirements(stem));
        let mut extra = self.extra.for_id(&candidate.identifier);
        extra.extend(self.extra.for_id(&PaneId::new(stem)));
        candidate.requiring(extra)
    }
}

impl PaneSource for LegacyDirectoryReader {
    fn kind(&self) -> SourceKind {
        SourceKind::LegacyDirectory
    }

    fn read(&self) -> SourceRead {
        self.read_until(&CancelToken::new())
    }

    fn read_until(&self, cancel: &CancelToken) -> SourceRead {
        let mut candidates = Vec::new();
        let mut errors = Vec::new();
        let mut worst = FailureReason::SourceUnavailable;
        let mut listed_any = false;
        for dir in &self.dirs {
            if cancel.is_cancelled() {
                return cancelled_read(self.kind());
            }
            let entries = match self.host.list_dir(dir) {
                Ok(entries) => entries,
                Err(err) => {
                    debug!(dir = %dir.display(), error = %err, "preference pane directory unavailable");
                    if matches!(err, HostError::Timeout { .. }) {
                        worst = FailureReason::Timeout;
                    }
                    errors.push(err.to_string());
                    continue;
                }
            };
            listed_any = true;
            for bundle in entries.iter().filter(|name| name.ends_with(PREFPANE_SUFFIX)) {
                if cancel.is_cancelled() {
                    return cancelled_read(self.kind());
                }
                candidates.push(self.candidate(dir, bundle));
            }
        }
        if !listed_any {
            let detail = if errors.is_empty() {
                "no preference pane directories configured".to_string()
            } else {
                errors.join("; ")
            };
            warn!(%detail, "no preference pane directory readable");
            return SourceRead::failed(self.kind(), worst, detail);
        }
        debug!(count = candidates.len(), "read preference pane directories");
        SourceRead::ok(self.kind(), candidates)
    }
}

fn cancelled_read(kind: SourceKind) -> SourceRead {
    debug!(source = %kind, "pane read cancelled");
    SourceRead::failed(kind, FailureReason::SourceUnavailable, "read cancelled")
}

/// Replays a fixed candidate list, normally the embedded stock sidebar.
#[derive(Clone, Debug)]
pub struct StaticFallbackReader {
    candidates: Vec<PaneCandidate>,
}

impl StaticFallbackReader {
    pub fn new(candidates: Vec<PaneCandidate>) -> Self {
        Self { candidates }
    }

    pub fn embedded() -> Self {
        Self::new(tables::static_fallback_candidates())
    }

    pub fn candidates(&self) -> &[PaneCandidate] {
        &self.candidates
    }
}

impl PaneSource for StaticFallbackReader {
    fn kind(&self) -> SourceKind {
        SourceKind::StaticFallback
    }

    fn read(&self) -> SourceRead {
        SourceRead::ok(self.kind(), self.candidates.clone())
    }
}

/// Default legacy directories: the system one plus `$HOME`'s when known.
pub fn default_legacy_dirs(home: Option<&Path>) -> Vec<PathBuf> {
    let mut dirs = vec![PathBuf::from(SYSTEM_PREFPANE_DIR)];
    if let Some(home) = home {
        dirs.push(home.join(USER_PREFPANE_DIR));
    }
    dirs
}
