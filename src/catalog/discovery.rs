//! One pane discovery run.
//!
//! `PaneDiscoverer` picks the version strategy, runs the selected readers and
//! the hardware profiler on their own threads, waits for them on a channel,
//! and hands everything that arrived in time to the reconciler. A reader that
//! misses its deadline becomes a `timeout` failure; a profiler that misses its
//! deadline yields the unknown snapshot. Cancellation discards everything.
//! Workers share a token that fires on cancel and when the run returns, so
//! stragglers stop issuing new commands.

use crate::catalog::reconcile::{PaneReconciler, VisibilityPolicy};
use crate::catalog::sources::{
    self, ExtensionManifestReader, ExtraRequirements, LegacyDirectoryReader, PaneSource,
    StaticFallbackReader,
};
use crate::catalog::strategy::{OsVersion, VersionStrategy};
use crate::catalog::{
    DiscoverySummary, FailureReason, PaneCatalogEntry, SourceKind, SourceRead,
};
use crate::hardware::{self, HardwareCapabilitySet};
use crate::host::Host;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_READER_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_HARDWARE_TIMEOUT: Duration = Duration::from_secs(30);

const CANCEL_POLL: Duration = Duration::from_millis(20);

pub use crate::host::CancelToken;

/// Fires the workers' token when a run ends, however it ends.
struct StopWorkers(CancelToken);

impl Drop for StopWorkers {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiscoveryError {
    #[error("pane discovery cancelled")]
    Cancelled,
}

#[derive(Clone, Debug)]
pub struct DiscoverySettings {
    pub manifest_path: PathBuf,
    pub legacy_dirs: Vec<PathBuf>,
    pub reader_timeout: Duration,
    pub hardware_timeout: Duration,
    pub extra_requirements: ExtraRequirements,
    pub visibility: VisibilityPolicy,
    pub fallback: StaticFallbackReader,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        let home = std::env::var_os("HOME").map(PathBuf::from);
        Self {
            manifest_path: PathBuf::from(sources::DEFAULT_MANIFEST_PATH),
            legacy_dirs: sources::default_legacy_dirs(home.as_deref()),
            reader_timeout: DEFAULT_READER_TIMEOUT,
            hardware_timeout: DEFAULT_HARDWARE_TIMEOUT,
            extra_requirements: ExtraRequirements::default(),
            visibility: VisibilityPolicy::default(),
            fallback: StaticFallbackReader::embedded(),
        }
    }
}

/// Snapshot returned to callers; never a live view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaneDiscovery {
    pub panes: Vec<PaneCatalogEntry>,
    pub summary: DiscoverySummary,
    pub hardware: HardwareCapabilitySet,
}

enum Message {
    Read(usize, SourceRead),
    Hardware(HardwareCapabilitySet),
}

pub struct PaneDiscoverer {
    host: Arc<dyn Host>,
    settings: DiscoverySettings,
}

impl PaneDiscoverer {
    pub fn new(host: Arc<dyn Host>, settings: DiscoverySettings) -> Self {
        Self { host, settings }
    }

    pub fn settings(&self) -> &DiscoverySettings {
        &self.settings
    }

    /// Query `sw_vers`; assume the newest known release when that fails.
    pub fn detect_version(&self) -> OsVersion {
        let reported = self
            .host
            .run("sw_vers", &["-productVersion"])
            .ok()
            .and_then(|output| output.trimmed_stdout().map(str::to_string));
        match reported.as_deref().map(OsVersion::parse) {
            Some(Ok(version)) => version,
            Some(Err(err)) => {
                warn!(error = %err, "unparseable OS version; assuming current release");
                OsVersion::assumed()
            }
            None => {
                warn!("OS version unavailable; assuming current release");
                OsVersion::assumed()
            }
        }
    }

    pub fn profile_hardware(&self) -> HardwareCapabilitySet {
        hardware::profile(self.host.as_ref())
    }

    fn readers(&self, strategy: VersionStrategy) -> Vec<Arc<dyn PaneSource>> {
        strategy
            .dynamic_sources()
            .iter()
            .filter_map(|kind| -> Option<Arc<dyn PaneSource>> {
                match kind {
                    SourceKind::ExtensionManifest => Some(Arc::new(
                        ExtensionManifestReader::new(
                            Arc::clone(&self.host),
                            self.settings.manifest_path.clone(),
                        )
                        .with_extra_requirements(self.settings.extra_requirements.clone()),
                    )),
                    SourceKind::LegacyDirectory => Some(Arc::new(
                        LegacyDirectoryReader::new(
                            Arc::clone(&self.host),
                            self.settings.legacy_dirs.clone(),
                        )
                        .with_extra_requirements(self.settings.extra_requirements.clone()),
                    )),
                    SourceKind::StaticFallback => None,
                }
            })
            .collect()
    }

    /// Run discovery to completion.
    pub fn discover_panes(&self) -> PaneDiscovery {
        match self.discover_panes_with(&CancelToken::new()) {
            Ok(found) => found,
            Err(DiscoveryError::Cancelled) => unreachable!("a fresh token is never cancelled"),
        }
    }

    /// Run discovery, aborting with `Cancelled` as soon as `cancel` fires.
    pub fn discover_panes_with(&self, cancel: &CancelToken) -> Result<PaneDiscovery, DiscoveryError> {
        if cancel.is_cancelled() {
            return Err(DiscoveryError::Cancelled);
        }
        let version = self.detect_version();
        if cancel.is_cancelled() {
            return Err(DiscoveryError::Cancelled);
        }
        let strategy = VersionStrategy::select(&version);
        info!(os_version = %version, strategy = %strategy, "starting pane discovery");

        let workers = StopWorkers(CancelToken::new());
        let readers = self.readers(strategy);
        let (tx, rx) = mpsc::channel();
        for (slot, reader) in readers.iter().enumerate() {
            let reader = Arc::clone(reader);
            let tx = tx.clone();
            let stop = workers.0.clone();
            spawn_worker(format!("pane-reader-{}", reader.kind()), move || {
                let _ = tx.send(Message::Read(slot, reader.read_until(&stop)));
            });
        }
        {
            let host = Arc::clone(&self.host);
            let tx = tx.clone();
            let stop = workers.0.clone();
            spawn_worker("hardware-profiler".to_string(), move || {
                let set = hardware::profile_with(host.as_ref(), &stop);
                let _ = tx.send(Message::Hardware(set));
            });
        }
        drop(tx);

        let started = Instant::now();
        let reader_deadline = started + self.settings.reader_timeout;
        let hardware_deadline = started + self.settings.hardware_timeout;
        let mut reads: Vec<Option<SourceRead>> = vec![None; readers.len()];
        let mut hardware: Option<HardwareCapabilitySet> = None;

        loop {
            if cancel.is_cancelled() {
                info!("pane discovery cancelled; discarding partial results");
                workers.0.cancel();
                return Err(DiscoveryError::Cancelled);
            }
            let now = Instant::now();
            let readers_settled = reads.iter().all(Option::is_some) || now >= reader_deadline;
            let hardware_settled = hardware.is_some() || now >= hardware_deadline;
            if readers_settled && hardware_settled {
                break;
            }
            match rx.recv_timeout(CANCEL_POLL) {
                Ok(Message::Read(slot, read)) => {
                    if Instant::now() <= reader_deadline {
                        reads[slot] = Some(read);
                    }
                }
                Ok(Message::Hardware(set)) => {
                    if Instant::now() <= hardware_deadline {
                        hardware = Some(set);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        if cancel.is_cancelled() {
            return Err(DiscoveryError::Cancelled);
        }
        drop(workers);

        let reads: Vec<SourceRead> = reads
            .into_iter()
            .zip(&readers)
            .map(|(read, reader)| {
                read.unwrap_or_else(|| {
                    warn!(source = %reader.kind(), "pane reader missed its deadline");
                    SourceRead::failed(
                        reader.kind(),
                        FailureReason::Timeout,
                        format!(
                            "no result within {}ms",
                            self.settings.reader_timeout.as_millis()
                        ),
                    )
                })
            })
            .collect();
        let hardware = hardware.unwrap_or_else(|| {
            warn!("hardware profiler missed its deadline; using unknown snapshot");
            HardwareCapabilitySet::unknown()
        });
        debug!(elapsed_ms = started.elapsed().as_millis(), "pane sources settled");

        let reconciler = PaneReconciler::new(strategy, version.raw.clone())
            .with_visibility(self.settings.visibility.clone())
            .with_fallback(self.settings.fallback.read().candidates);
        let (panes, summary) = reconciler.reconcile(&reads, &hardware);
        Ok(PaneDiscovery {
            panes,
            summary,
            hardware,
        })
    }
}

/// Detached worker. A worker outliving its deadline sees the stop token,
/// skips its remaining work, and its late result is dropped with the channel.
fn spawn_worker<F>(name: String, work: F)
where
    F: FnOnce() + Send + 'static,
{
    if let Err(err) = thread::Builder::new().name(name.clone()).spawn(work) {
        warn!(worker = %name, error = %err, "failed to spawn discovery worker");
    }
}
