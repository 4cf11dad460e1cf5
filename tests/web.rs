// Dashboard routing and background sessions, plus one check over a real
// socket that slow endpoints do not block status polls.
#[path = "support/common.rs"]
mod common;

use anyhow::Result;
use authsurface::engine::DiscoveryEngine;
use authsurface::host::MemoryHost;
use authsurface::report::ReportStore;
use authsurface::web::{Dashboard, serve_on};
use serde_json::{Value, json};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

use common::{MANIFEST_IDS, MANIFEST_PATH, manifest_value, modern_host, settings, with_version};

fn dashboard(host: MemoryHost, dir: &TempDir) -> Result<Dashboard> {
    let engine = DiscoveryEngine::new(Arc::new(host), settings())
        .with_privileged(false)
        .with_home(None);
    Ok(Dashboard::new(engine, ReportStore::new(dir.path())?))
}

fn json_body(body: &str) -> Result<Value> {
    Ok(serde_json::from_str(body)?)
}

#[test]
fn session_runs_saves_and_serves_results() -> Result<()> {
    let dir = TempDir::new()?;
    let dash = dashboard(modern_host(), &dir)?;

    let started = dash.route("POST", "/api/discovery/start", "");
    assert_eq!(started.status, 202);
    assert!(dash.wait_idle(Duration::from_secs(10)));

    let status = json_body(&dash.route("GET", "/api/discovery/status", "").body)?;
    assert_eq!(status["is_running"], false);
    assert_eq!(status["progress_percent"], 100);
    assert_eq!(status["last_error"], Value::Null);

    let results = json_body(&dash.route("GET", "/api/discovery/results", "").body)?;
    assert_eq!(results["panes"].as_array().map(Vec::len), Some(46));

    let listing = json_body(&dash.route("GET", "/api/reports/list", "").body)?;
    let reports = listing["reports"].as_array().cloned().unwrap_or_default();
    assert_eq!(reports.len(), 1);
    let name = reports[0]["file_name"].as_str().unwrap_or_default().to_string();

    let stored = dash.route("GET", &format!("/api/reports/{name}"), "");
    assert_eq!(stored.status, 200);
    assert_eq!(json_body(&stored.body)?["summary"], results["summary"]);
    Ok(())
}

#[test]
fn second_start_while_running_conflicts() -> Result<()> {
    let dir = TempDir::new()?;
    let host = with_version(MemoryHost::new(), "14.5")
        .with_plist(MANIFEST_PATH, manifest_value(&MANIFEST_IDS))
        .with_delay(Duration::from_millis(300));
    let dash = dashboard(host, &dir)?;

    assert_eq!(dash.route("POST", "/api/discovery/start", "").status, 202);
    assert_eq!(dash.route("POST", "/api/discovery/start", "").status, 409);
    assert!(dash.status().is_running);

    let stopped = json_body(&dash.route("POST", "/api/discovery/stop", "").body)?;
    assert_eq!(stopped["status"], "stopping");
    assert!(dash.wait_idle(Duration::from_secs(10)));

    let status = dash.status();
    assert!(!status.is_running);
    assert!(status.last_error.is_some());
    assert!(ReportStore::new(dir.path())?.list()?.is_empty());
    Ok(())
}

#[test]
fn unsaved_sessions_leave_the_data_dir_empty() -> Result<()> {
    let dir = TempDir::new()?;
    let dash = dashboard(modern_host(), &dir)?.with_save_reports(false);
    dash.start()?;
    assert!(dash.wait_idle(Duration::from_secs(10)));
    let results = json_body(&dash.route("GET", "/api/discovery/results", "").body)?;
    assert_eq!(results["panes"].as_array().map(Vec::len), Some(46));
    assert!(ReportStore::new(dir.path())?.list()?.is_empty());
    Ok(())
}

#[test]
fn pane_and_hardware_endpoints_answer_synchronously() -> Result<()> {
    let dir = TempDir::new()?;
    let dash = dashboard(modern_host(), &dir)?;

    let panes = json_body(&dash.route("GET", "/api/panes", "").body)?;
    assert_eq!(panes["summary"]["total_discovered"], 46);

    let hardware = json_body(&dash.route("GET", "/api/hardware-profile", "").body)?;
    assert_eq!(hardware["battery"], true);
    assert_eq!(hardware["optical_drive"], false);
    Ok(())
}

#[test]
fn stop_without_a_session_is_harmless() -> Result<()> {
    let dir = TempDir::new()?;
    let dash = dashboard(modern_host(), &dir)?;
    let reply = json_body(&dash.route("POST", "/api/discovery/stop", "").body)?;
    assert_eq!(reply["status"], "idle");
    assert_eq!(dash.route("GET", "/api/reports/missing.json", "").status, 404);
    Ok(())
}

#[test]
fn export_serves_the_latest_report_as_json_and_csv() -> Result<()> {
    let dir = TempDir::new()?;
    let dash = dashboard(modern_host(), &dir)?;
    assert_eq!(dash.route("GET", "/api/discovery/export/csv", "").status, 404);

    dash.start()?;
    assert!(dash.wait_idle(Duration::from_secs(10)));

    let exported = dash.route("GET", "/api/discovery/export/json", "");
    assert_eq!(exported.status, 200);
    assert_eq!(json_body(&exported.body)?["panes"].as_array().map(Vec::len), Some(46));

    let csv = dash.route("GET", "/api/discovery/export/csv", "");
    assert_eq!(csv.status, 200);
    assert!(csv.content_type.starts_with("text/csv"));
    let mut lines = csv.body.lines();
    assert_eq!(
        lines.next(),
        Some("category,name,status,requires_auth,auth_type,description,subject,hardware_model,finished_at")
    );
    let rows: Vec<&str> = lines.collect();
    assert!(!rows.is_empty());
    // The model contains a comma, so the writer quotes it.
    assert!(rows.iter().all(|row| row.contains("\"Mac15,3\"")));
    Ok(())
}

#[test]
fn comparison_diffs_two_stored_reports() -> Result<()> {
    let dir = TempDir::new()?;
    let dash = dashboard(modern_host(), &dir)?;
    for _ in 0..2 {
        dash.start()?;
        assert!(dash.wait_idle(Duration::from_secs(10)));
    }
    let store = ReportStore::new(dir.path())?;
    let listed = store.list()?;
    assert_eq!(listed.len(), 2);

    let body = json!({ "report1": listed[1].file_name, "report2": listed[0].file_name }).to_string();
    let reply = dash.route("POST", "/api/comparison/reports", &body);
    assert_eq!(reply.status, 200);
    let comparison = json_body(&reply.body)?;
    assert_eq!(comparison["summary"]["only_in_first"], 0);
    assert_eq!(comparison["summary"]["only_in_second"], 0);
    assert_eq!(comparison["removed_panes"], json!([]));
    assert_eq!(comparison["first"]["file_name"], listed[1].file_name.as_str());

    let missing = json!({ "report1": listed[0].file_name }).to_string();
    assert_eq!(dash.route("POST", "/api/comparison/reports", &missing).status, 400);
    Ok(())
}

fn http_get(addr: SocketAddr, path: &str) -> Result<String> {
    let mut stream = TcpStream::connect(addr)?;
    stream.set_read_timeout(Some(Duration::from_secs(10)))?;
    write!(
        stream,
        "GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"
    )?;
    let mut reply = String::new();
    stream.read_to_string(&mut reply)?;
    Ok(reply)
}

#[test]
fn slow_hardware_queries_do_not_block_status_polls() -> Result<()> {
    let dir = TempDir::new()?;
    // Every profiler command takes 200ms, so a hardware query takes seconds.
    let host = modern_host().with_command_delay(Duration::from_millis(200));
    let dash = Arc::new(dashboard(host, &dir)?);

    let server = tiny_http::Server::http("127.0.0.1:0")
        .map_err(|err| anyhow::anyhow!("binding test server: {err}"))?;
    let addr = server
        .server_addr()
        .to_ip()
        .ok_or_else(|| anyhow::anyhow!("test server has no IP address"))?;
    let shutdown = Arc::new(AtomicBool::new(false));
    let server_thread = {
        let dash = Arc::clone(&dash);
        let shutdown = Arc::clone(&shutdown);
        thread::spawn(move || serve_on(dash, server, shutdown))
    };

    let slow = thread::spawn(move || http_get(addr, "/api/hardware-profile"));
    thread::sleep(Duration::from_millis(200));

    let started = Instant::now();
    let status = http_get(addr, "/api/discovery/status")?;
    assert!(started.elapsed() < Duration::from_secs(1), "status waited {:?}", started.elapsed());
    assert!(status.starts_with("HTTP/1.1 200"));
    assert!(status.contains("\"is_running\":false"));

    let hardware = slow.join().expect("slow request thread")?;
    assert!(hardware.starts_with("HTTP/1.1 200"));
    assert!(hardware.contains("\"battery\":true"));

    shutdown.store(true, Ordering::SeqCst);
    server_thread.join().expect("server thread")?;
    Ok(())
}
