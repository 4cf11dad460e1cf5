// Report assembly, storage, and schema checks.
#[path = "support/common.rs"]
mod common;

use anyhow::Result;
use authsurface::catalog::CancelToken;
use authsurface::checks::{AuthCategory, AuthType, AuthorizationFinding};
use authsurface::engine::DiscoveryEngine;
use authsurface::report::{DiscoveryReport, REPORT_PREFIX, ReportStore};
use authsurface::report_schema::{REPORT_SCHEMA_VERSION, ReportSchema};
use serde_json::json;
use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

use common::{modern_host, settings};

fn report() -> Result<DiscoveryReport> {
    let engine = DiscoveryEngine::new(Arc::new(modern_host()), settings())
        .with_privileged(false)
        .with_home(None);
    Ok(engine.run(&CancelToken::new(), &|_| {})?)
}

#[test]
fn session_report_carries_panes_and_every_category() -> Result<()> {
    let report = report()?;
    assert_eq!(report.schema_version, REPORT_SCHEMA_VERSION);
    assert_eq!(report.panes.len(), 46);
    assert_eq!(report.hardware.model, "Mac15,3");
    for category in AuthCategory::ALL {
        assert!(report.authorization_results.contains_key(&category));
    }
    assert!(report.session.finished_at >= report.session.started_at);

    let value = serde_json::to_value(&report)?;
    ReportSchema::embedded()?.validate(&value)?;
    Ok(())
}

#[test]
fn stored_reports_round_trip_newest_first() -> Result<()> {
    let dir = TempDir::new()?;
    let store = ReportStore::new(dir.path().join("data"))?;
    let report = report()?;

    let first = store.write(&report)?;
    let second = store.write(&report)?;
    assert_ne!(first, second);
    assert!(
        second
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(REPORT_PREFIX) && name.ends_with("_2.json"))
    );

    let listed = store.list()?;
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().all(|stored| stored.size_bytes > 0));

    let loaded = store.load(&listed[0].file_name)?;
    assert_eq!(loaded.panes, report.panes);
    assert_eq!(loaded.summary, report.summary);
    assert!(store.latest()?.is_some());
    Ok(())
}

#[test]
fn foreign_files_are_ignored_and_paths_refused() -> Result<()> {
    let dir = TempDir::new()?;
    fs::write(dir.path().join("notes.json"), "{}")?;
    fs::write(dir.path().join("secret.txt"), "x")?;
    let store = ReportStore::new(dir.path())?;

    assert!(store.list()?.is_empty());
    assert!(store.load("notes.json").is_err());
    assert!(store.load("../secret.txt").is_err());
    assert!(
        store
            .load("auth_discovery_report_1/../../secret.txt")
            .is_err()
    );
    Ok(())
}

#[test]
fn schema_rejects_malformed_reports() -> Result<()> {
    let schema = ReportSchema::embedded()?;
    let mut value = serde_json::to_value(report()?)?;
    value["panes"] = json!([{ "identifier": "", "display_name": "x" }]);
    let err = schema.validate(&value).unwrap_err();
    assert!(format!("{err:#}").contains("panes"));

    let mut value = serde_json::to_value(report()?)?;
    value["schema_version"] = json!("something_else");
    assert!(schema.validate(&value).is_err());
    Ok(())
}

fn file_name(path: &std::path::Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default()
        .to_string()
}

#[test]
fn comparison_reports_moved_findings_and_panes() -> Result<()> {
    let dir = TempDir::new()?;
    let store = ReportStore::new(dir.path())?;
    let baseline = report()?;

    let mut current = baseline.clone();
    current
        .panes
        .retain(|pane| pane.identifier.as_str() != "com.apple.Sound-Settings.extension");
    let network = current
        .authorization_results
        .get_mut(&AuthCategory::Network)
        .expect("network findings");
    assert_eq!(network.len(), 2);
    let dropped = network.remove(0);
    network[0].status = Some("changed".to_string());
    current
        .authorization_results
        .entry(AuthCategory::Privacy)
        .or_default()
        .push(AuthorizationFinding {
            category: AuthCategory::Privacy,
            name: "User privacy grants".to_string(),
            status: None,
            requires_auth: true,
            auth_type: AuthType::UserConsent,
            description: "Camera access".to_string(),
            detail: BTreeMap::from([
                ("client".to_string(), "com.example.app".to_string()),
                ("service".to_string(), "kTCCServiceCamera".to_string()),
            ]),
        });

    let first = file_name(&store.write(&baseline)?);
    let second = file_name(&store.write(&current)?);
    let diff = store.compare(&first, &second)?;

    assert_eq!(diff.first.file_name, first);
    assert_eq!(diff.removed_findings.len(), 1);
    assert_eq!(diff.removed_findings[0].name, dropped.name);
    assert_eq!(diff.new_findings.len(), 1);
    assert_eq!(diff.new_findings[0].subject, "com.example.app / kTCCServiceCamera");
    assert_eq!(diff.status_changes.len(), 1);
    assert_eq!(diff.status_changes[0].after.as_deref(), Some("changed"));
    assert_eq!(diff.removed_panes, vec!["com.apple.Sound-Settings.extension".to_string()]);
    assert!(diff.new_panes.is_empty());
    assert_eq!(diff.summary.total_unique, diff.summary.common + 2);

    let csv = current.to_csv()?;
    assert!(csv.contains("com.example.app / kTCCServiceCamera"));
    assert_eq!(csv.lines().count(), current.finding_count() + 1);

    assert!(store.compare(&first, "auth_discovery_report_19700101_000000.json").is_err());
    Ok(())
}
