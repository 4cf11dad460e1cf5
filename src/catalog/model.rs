//! Records produced and consumed by pane discovery.

use crate::catalog::{CapabilityTag, PaneId, SourceKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Raw pane as emitted by one source. Readers may emit duplicates and
/// conflicting names; the reconciler owns uniqueness.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaneCandidate {
    pub identifier: PaneId,
    /// Empty when the source only knows a technical key.
    pub display_name: String,
    pub source_kind: SourceKind,
    #[serde(default)]
    pub requires_hardware: BTreeSet<CapabilityTag>,
}

impl PaneCandidate {
    pub fn new(
        identifier: impl Into<String>,
        display_name: impl Into<String>,
        source_kind: SourceKind,
    ) -> Self {
        Self {
            identifier: PaneId::new(identifier),
            display_name: display_name.into(),
            source_kind,
            requires_hardware: BTreeSet::new(),
        }
    }

    pub fn requiring<I>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = CapabilityTag>,
    {
        self.requires_hardware.extend(tags);
        self
    }
}

/// Reconciled, externally visible pane.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaneCatalogEntry {
    pub identifier: PaneId,
    pub display_name: String,
    /// Survived hardware filtering.
    pub available: bool,
    /// Would appear in the stock sidebar; independent of availability.
    pub visible_by_default: bool,
    pub source_kinds: BTreeSet<SourceKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filtered_reason: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    SourceUnavailable,
    ParseError,
    Timeout,
}

/// Source-level failure. Recorded in the summary, never raised.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub source: SourceKind,
    pub reason: FailureReason,
    pub detail: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    UnknownCapabilityTag,
}

/// Unexpected internal fault attached to the summary instead of aborting.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryIssue {
    pub kind: IssueKind,
    pub identifier: PaneId,
    pub detail: String,
}

/// Output of one reader invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceRead {
    pub kind: SourceKind,
    pub candidates: Vec<PaneCandidate>,
    pub failure: Option<SourceFailure>,
}

impl SourceRead {
    pub fn ok(kind: SourceKind, candidates: Vec<PaneCandidate>) -> Self {
        Self {
            kind,
            candidates,
            failure: None,
        }
    }

    pub fn failed(kind: SourceKind, reason: FailureReason, detail: impl Into<String>) -> Self {
        Self {
            kind,
            candidates: Vec::new(),
            failure: Some(SourceFailure {
                source: kind,
                reason,
                detail: detail.into(),
            }),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PaneCandidate> {
        self.candidates.iter()
    }
}

impl IntoIterator for SourceRead {
    type Item = PaneCandidate;
    type IntoIter = std::vec::IntoIter<PaneCandidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.candidates.into_iter()
    }
}

impl<'a> IntoIterator for &'a SourceRead {
    type Item = &'a PaneCandidate;
    type IntoIter = std::slice::Iter<'a, PaneCandidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.candidates.iter()
    }
}

/// Aggregate counters for one run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoverySummary {
    pub total_discovered: usize,
    /// Every source kind is present; an entry counts toward each kind it
    /// appeared under.
    pub by_source: BTreeMap<SourceKind, usize>,
    pub hardware_filtered: usize,
    pub malformed: usize,
    pub os_version: String,
    pub strategy: String,
    /// True when the catalog was built from the static fallback alone.
    pub fallback_used: bool,
    #[serde(default)]
    pub sources_consulted: Vec<SourceKind>,
    #[serde(default)]
    pub source_failures: Vec<SourceFailure>,
    #[serde(default)]
    pub issues: Vec<DiscoveryIssue>,
}

impl DiscoverySummary {
    pub fn count_for(&self, kind: SourceKind) -> usize {
        self.by_source.get(&kind).copied().unwrap_or(0)
    }
}
