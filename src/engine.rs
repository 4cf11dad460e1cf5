//! Full discovery session: pane catalog plus authorization checks.

use crate::catalog::{CancelToken, DiscoveryError, DiscoverySettings, PaneDiscoverer};
use crate::checks::{AuthCategory, AuthCheck, AuthorizationFinding, CheckContext, running_as_root};
use crate::host::Host;
use crate::report::{DiscoveryReport, ReportAssembler, SessionInfo};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

pub const PANE_STEP: &str = "System Settings panes";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProgressUpdate {
    pub completed: usize,
    pub total: usize,
    pub current: String,
}

impl ProgressUpdate {
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.completed * 100) / self.total).min(100) as u8
    }
}

pub struct DiscoveryEngine {
    host: Arc<dyn Host>,
    settings: DiscoverySettings,
    privileged: bool,
    home: Option<PathBuf>,
}

impl DiscoveryEngine {
    pub fn new(host: Arc<dyn Host>, settings: DiscoverySettings) -> Self {
        Self {
            host,
            settings,
            privileged: running_as_root(),
            home: std::env::var_os("HOME").map(PathBuf::from),
        }
    }

    pub fn with_privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    pub fn with_home(mut self, home: Option<PathBuf>) -> Self {
        self.home = home;
        self
    }

    /// Number of progress steps one run reports.
    pub fn total_steps() -> usize {
        1 + AuthCheck::ALL.len()
    }

    pub fn pane_discoverer(&self) -> PaneDiscoverer {
        PaneDiscoverer::new(Arc::clone(&self.host), self.settings.clone())
    }

    /// Run every step, reporting progress before each one. Cancellation is
    /// observed between checks, inside pane discovery, and by the utility a
    /// check is waiting on.
    pub fn run(
        &self,
        cancel: &CancelToken,
        progress: &dyn Fn(&ProgressUpdate),
    ) -> Result<DiscoveryReport, DiscoveryError> {
        let started_at = Utc::now();
        let total = Self::total_steps();
        info!(total, "starting discovery session");

        progress(&ProgressUpdate {
            completed: 0,
            total,
            current: PANE_STEP.to_string(),
        });
        let panes = self.pane_discoverer().discover_panes_with(cancel)?;

        let ctx = CheckContext {
            host: self.host.as_ref(),
            privileged: self.privileged,
            home: self.home.clone(),
            cancel: cancel.clone(),
        };
        let mut results: BTreeMap<AuthCategory, Vec<AuthorizationFinding>> = BTreeMap::new();
        for (index, check) in AuthCheck::ALL.iter().enumerate() {
            if cancel.is_cancelled() {
                info!("discovery session cancelled");
                return Err(DiscoveryError::Cancelled);
            }
            progress(&ProgressUpdate {
                completed: index + 1,
                total,
                current: check.label().to_string(),
            });
            results
                .entry(check.category())
                .or_default()
                .extend(check.run(&ctx));
        }
        if cancel.is_cancelled() {
            return Err(DiscoveryError::Cancelled);
        }
        progress(&ProgressUpdate {
            completed: total,
            total,
            current: String::new(),
        });

        let session = SessionInfo::between(started_at, Utc::now());
        let report = ReportAssembler::assemble(session, panes, results);
        info!(
            panes = report.panes.len(),
            findings = report.finding_count(),
            "discovery session finished"
        );
        Ok(report)
    }
}
