//! Merge raw pane candidates into the catalog.
//!
//! The reconciler is the only place uniqueness is enforced. It groups every
//! candidate by canonical key, resolves one display name per group, applies
//! the hardware filter, infers default visibility, and tallies the summary.
//! When no dynamic source produced a usable candidate it rebuilds the catalog
//! from the static fallback it was handed.

use crate::catalog::strategy::VersionStrategy;
use crate::catalog::tables;
use crate::catalog::{
    DiscoveryIssue, DiscoverySummary, IssueKind, PaneCandidate, PaneCatalogEntry, PaneId,
    SourceKind, SourceRead,
};
use crate::hardware::HardwareCapabilitySet;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

pub const HARDWARE_UNAVAILABLE_PREFIX: &str = "hardware-unavailable:";

/// Heuristic deciding whether a pane shows in the stock sidebar.
///
/// Manifest-only entries are hidden unless allowlisted; the manifest lists
/// many context-gated panes. Not authoritative for security decisions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VisibilityPolicy {
    known_visible: BTreeSet<String>,
    legacy_implies_visible: bool,
}

impl Default for VisibilityPolicy {
    fn default() -> Self {
        Self::new(tables::default_known_visible(), true)
    }
}

impl VisibilityPolicy {
    pub fn new<I, S>(known_visible: I, legacy_implies_visible: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            known_visible: known_visible
                .into_iter()
                .map(|id| PaneId::new(id.as_ref()).key())
                .filter(|key| !key.is_empty())
                .collect(),
            legacy_implies_visible,
        }
    }

    /// Add identifiers to the allowlist.
    pub fn allow<I, S>(mut self, identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.known_visible.extend(
            identifiers
                .into_iter()
                .map(|id| PaneId::new(id.as_ref()).key())
                .filter(|key| !key.is_empty()),
        );
        self
    }

    pub fn is_visible(&self, key: &str, kinds: &BTreeSet<SourceKind>) -> bool {
        (self.legacy_implies_visible && kinds.contains(&SourceKind::LegacyDirectory))
            || self.known_visible.contains(key)
    }
}

#[derive(Clone, Debug)]
pub struct PaneReconciler {
    strategy: VersionStrategy,
    os_version: String,
    visibility: VisibilityPolicy,
    fallback: Vec<PaneCandidate>,
}

/// Result of merging one batch of candidates.
struct Merge {
    entries: Vec<PaneCatalogEntry>,
    malformed: usize,
    issues: Vec<DiscoveryIssue>,
}

impl PaneReconciler {
    pub fn new(strategy: VersionStrategy, os_version: impl Into<String>) -> Self {
        Self {
            strategy,
            os_version: os_version.into(),
            visibility: VisibilityPolicy::default(),
            fallback: tables::static_fallback_candidates(),
        }
    }

    pub fn with_visibility(mut self, visibility: VisibilityPolicy) -> Self {
        self.visibility = visibility;
        self
    }

    /// Replace the candidates used when dynamic discovery yields nothing.
    pub fn with_fallback(mut self, fallback: Vec<PaneCandidate>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn strategy(&self) -> VersionStrategy {
        self.strategy
    }

    /// Merge `reads` against `hardware`. Never fails; an empty input yields
    /// the fallback catalog.
    pub fn reconcile(
        &self,
        reads: &[SourceRead],
        hardware: &HardwareCapabilitySet,
    ) -> (Vec<PaneCatalogEntry>, DiscoverySummary) {
        let mut sources_consulted: Vec<SourceKind> = Vec::new();
        for read in reads {
            if !sources_consulted.contains(&read.kind) {
                sources_consulted.push(read.kind);
            }
        }
        let source_failures = reads
            .iter()
            .filter_map(|read| read.failure.clone())
            .collect();

        let mut merge = self.merge(reads.iter().flat_map(|read| read.iter()), hardware);
        let mut fallback_used = false;
        if merge.entries.is_empty() {
            warn!(
                strategy = %self.strategy,
                "dynamic pane discovery produced nothing; using static fallback"
            );
            let fallback = self.merge(self.fallback.iter(), hardware);
            merge = Merge {
                entries: fallback.entries,
                malformed: merge.malformed + fallback.malformed,
                issues: merge.issues.into_iter().chain(fallback.issues).collect(),
            };
            fallback_used = true;
            if !sources_consulted.contains(&SourceKind::StaticFallback) {
                sources_consulted.push(SourceKind::StaticFallback);
            }
        }

        let mut by_source: BTreeMap<SourceKind, usize> =
            SourceKind::ALL.iter().map(|kind| (*kind, 0)).collect();
        for entry in &merge.entries {
            for kind in &entry.source_kinds {
                *by_source.entry(*kind).or_default() += 1;
            }
        }
        let hardware_filtered = merge.entries.iter().filter(|entry| !entry.available).count();

        let summary = DiscoverySummary {
            total_discovered: merge.entries.len(),
            by_source,
            hardware_filtered,
            malformed: merge.malformed,
            os_version: self.os_version.clone(),
            strategy: self.strategy.as_str().to_string(),
            fallback_used,
            sources_consulted,
            source_failures,
            issues: merge.issues,
        };
        info!(
            total = summary.total_discovered,
            hardware_filtered = summary.hardware_filtered,
            malformed = summary.malformed,
            fallback_used,
            "reconciled pane catalog"
        );
        (merge.entries, summary)
    }

    fn merge<'a, I>(&self, candidates: I, hardware: &HardwareCapabilitySet) -> Merge
    where
        I: IntoIterator<Item = &'a PaneCandidate>,
    {
        let mut malformed = 0;
        let mut groups: BTreeMap<String, Vec<&'a PaneCandidate>> = BTreeMap::new();
        for candidate in candidates {
            if candidate.identifier.is_blank() {
                malformed += 1;
                continue;
            }
            groups
                .entry(candidate.identifier.key())
                .or_default()
                .push(candidate);
        }
        if malformed > 0 {
            debug!(malformed, "dropped candidates without identifier");
        }

        let mut issues = Vec::new();
        let entries = groups
            .into_iter()
            .map(|(key, members)| self.entry(&key, &members, hardware, &mut issues))
            .collect();
        Merge {
            entries,
            malformed,
            issues,
        }
    }

    fn entry(
        &self,
        key: &str,
        members: &[&PaneCandidate],
        hardware: &HardwareCapabilitySet,
        issues: &mut Vec<DiscoveryIssue>,
    ) -> PaneCatalogEntry {
        let rank = |kind: SourceKind| self.strategy.rank(kind);

        // Groups are never empty; the key is a usable identifier regardless.
        let identifier = members
            .iter()
            .min_by_key(|candidate| rank(candidate.source_kind))
            .map(|best| PaneId::new(best.identifier.as_str().trim()))
            .unwrap_or_else(|| PaneId::new(key));

        let display_name = members
            .iter()
            .filter(|candidate| !candidate.display_name.trim().is_empty())
            .min_by_key(|candidate| {
                let name = candidate.display_name.trim();
                (rank(candidate.source_kind), Reverse(name.chars().count()), name.to_string())
            })
            .map(|candidate| candidate.display_name.trim().to_string())
            .unwrap_or_else(|| tables::humanize_identifier(identifier.as_str()));

        let source_kinds: BTreeSet<SourceKind> =
            members.iter().map(|candidate| candidate.source_kind).collect();
        let required: BTreeSet<_> = members
            .iter()
            .flat_map(|candidate| candidate.requires_hardware.iter().cloned())
            .collect();

        for tag in required.iter().filter(|tag| !tag.is_known()) {
            issues.push(DiscoveryIssue {
                kind: IssueKind::UnknownCapabilityTag,
                identifier: identifier.clone(),
                detail: format!("unknown capability tag '{tag}'"),
            });
        }
        let missing = required.iter().find(|tag| !hardware.satisfies(tag));
        let filtered_reason = missing.map(|tag| format!("{HARDWARE_UNAVAILABLE_PREFIX}{tag}"));

        PaneCatalogEntry {
            visible_by_default: self.visibility.is_visible(key, &source_kinds),
            identifier,
            display_name,
            available: filtered_reason.is_none(),
            source_kinds,
            filtered_reason,
        }
    }
}
