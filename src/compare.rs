//! Differences between two discovery reports.
//!
//! Findings are matched by category, check name and subject, so two privacy
//! grants for different clients never collapse into one. Panes are matched by
//! their canonical key.

use crate::checks::{AuthCategory, AuthorizationFinding};
use crate::report::DiscoveryReport;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct FindingKey {
    pub category: AuthCategory,
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub subject: String,
}

impl From<&AuthorizationFinding> for FindingKey {
    fn from(finding: &AuthorizationFinding) -> Self {
        Self {
            category: finding.category,
            name: finding.name.clone(),
            subject: finding.subject(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReportInfo {
    pub file_name: String,
    pub finished_at: DateTime<Utc>,
    pub total_findings: usize,
    pub total_panes: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ComparisonSummary {
    pub common: usize,
    pub only_in_first: usize,
    pub only_in_second: usize,
    pub total_unique: usize,
}

/// A finding present in both reports whose status moved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StatusChange {
    #[serde(flatten)]
    pub key: FindingKey,
    pub before: Option<String>,
    pub after: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReportComparison {
    pub first: ReportInfo,
    pub second: ReportInfo,
    pub summary: ComparisonSummary,
    pub removed_findings: Vec<FindingKey>,
    pub new_findings: Vec<FindingKey>,
    pub common_findings: Vec<FindingKey>,
    pub status_changes: Vec<StatusChange>,
    pub removed_panes: Vec<String>,
    pub new_panes: Vec<String>,
}

/// Diff `first` (the baseline) against `second`. Pure; each side is named by
/// the file it was loaded from.
pub fn compare_reports(
    first: (&str, &DiscoveryReport),
    second: (&str, &DiscoveryReport),
) -> ReportComparison {
    let (first_name, baseline) = first;
    let (second_name, current) = second;
    let before = statuses(baseline);
    let after = statuses(current);

    let removed_findings: Vec<FindingKey> = before
        .keys()
        .filter(|key| !after.contains_key(*key))
        .cloned()
        .collect();
    let new_findings: Vec<FindingKey> = after
        .keys()
        .filter(|key| !before.contains_key(*key))
        .cloned()
        .collect();
    let common_findings: Vec<FindingKey> = before
        .keys()
        .filter(|key| after.contains_key(*key))
        .cloned()
        .collect();
    let status_changes = common_findings
        .iter()
        .filter_map(|key| {
            let was = before.get(key).cloned().flatten();
            let now = after.get(key).cloned().flatten();
            (was != now).then(|| StatusChange {
                key: key.clone(),
                before: was,
                after: now,
            })
        })
        .collect();

    let panes_before = pane_ids(baseline);
    let panes_after = pane_ids(current);

    ReportComparison {
        first: info(first_name, baseline),
        second: info(second_name, current),
        summary: ComparisonSummary {
            common: common_findings.len(),
            only_in_first: removed_findings.len(),
            only_in_second: new_findings.len(),
            total_unique: common_findings.len() + removed_findings.len() + new_findings.len(),
        },
        removed_panes: only_in(&panes_before, &panes_after),
        new_panes: only_in(&panes_after, &panes_before),
        removed_findings,
        new_findings,
        common_findings,
        status_changes,
    }
}

fn statuses(report: &DiscoveryReport) -> BTreeMap<FindingKey, Option<String>> {
    report
        .findings()
        .map(|finding| (FindingKey::from(finding), finding.status.clone()))
        .collect()
}

/// Identifiers as written, keyed case-insensitively.
fn pane_ids(report: &DiscoveryReport) -> BTreeMap<String, String> {
    let mut ids = BTreeMap::new();
    for pane in &report.panes {
        ids.entry(pane.identifier.key())
            .or_insert_with(|| pane.identifier.as_str().to_string());
    }
    ids
}

fn only_in(side: &BTreeMap<String, String>, other: &BTreeMap<String, String>) -> Vec<String> {
    side.iter()
        .filter(|(key, _)| !other.contains_key(*key))
        .map(|(_, id)| id.clone())
        .collect()
}

fn info(file_name: &str, report: &DiscoveryReport) -> ReportInfo {
    ReportInfo {
        file_name: file_name.to_string(),
        finished_at: report.session.finished_at,
        total_findings: report.finding_count(),
        total_panes: report.panes.len(),
    }
}
