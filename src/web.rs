//! Local dashboard and JSON API.
//!
//! [`Dashboard::route`] maps a method, URL and body to an [`ApiResponse`]
//! without touching a socket; [`serve`] is the `tiny_http` accept loop around
//! it, answering each request on its own thread. Discovery sessions run on a
//! background thread, one at a time.

use crate::catalog::{CancelToken, DiscoveryError};
use crate::engine::{DiscoveryEngine, ProgressUpdate};
use crate::report::{DiscoveryReport, ReportStore};
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const ACCEPT_TIMEOUT: Duration = Duration::from_secs(1);
const MAX_BODY_BYTES: u64 = 64 * 1024;
const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";

const DASHBOARD_HTML: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Authorization Surface Discovery</title>
<style>
body { font-family: -apple-system, sans-serif; margin: 2rem; max-width: 60rem; }
progress { width: 100%; }
pre { background: #f4f4f4; padding: 1rem; overflow: auto; max-height: 30rem; }
</style>
</head>
<body>
<h1>Authorization Surface Discovery</h1>
<p>
  <button id="start">Start discovery</button>
  <button id="stop">Stop</button>
  Export: <a href="/api/discovery/export/json">JSON</a> | <a href="/api/discovery/export/csv">CSV</a>
</p>
<progress id="progress" max="100" value="0"></progress>
<p id="status">Idle</p>
<pre id="results"></pre>
<script>
async function refresh() {
  const status = await (await fetch('/api/discovery/status')).json();
  document.getElementById('progress').value = status.progress_percent;
  document.getElementById('status').textContent = status.is_running
    ? `Running: ${status.current_check} (${status.completed_checks}/${status.total_checks})`
    : (status.last_error ? `Last run failed: ${status.last_error}` : `Idle, ${status.results_count} findings`);
  if (!status.is_running) {
    const results = await (await fetch('/api/discovery/results')).json();
    document.getElementById('results').textContent = JSON.stringify(results, null, 2);
  }
}
document.getElementById('start').onclick = () => fetch('/api/discovery/start', {method: 'POST'}).then(refresh);
document.getElementById('stop').onclick = () => fetch('/api/discovery/stop', {method: 'POST'}).then(refresh);
setInterval(refresh, 1000);
refresh();
</script>
</body>
</html>
"#;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl ApiResponse {
    pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(body) => Self {
                status,
                content_type: "application/json",
                body,
            },
            Err(err) => Self::error(500, &format!("serializing response: {err}")),
        }
    }

    pub fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: json!({ "error": message }).to_string(),
        }
    }

    fn html(body: &str) -> Self {
        Self {
            status: 200,
            content_type: "text/html; charset=utf-8",
            body: body.to_string(),
        }
    }

    fn csv(body: String) -> Self {
        Self {
            status: 200,
            content_type: CSV_CONTENT_TYPE,
            body,
        }
    }
}

/// Body of `POST /api/comparison/reports`: two stored report file names,
/// baseline first.
#[derive(Debug, Deserialize)]
struct CompareRequest {
    report1: Option<String>,
    report2: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DiscoveryStatus {
    pub is_running: bool,
    pub progress_percent: u8,
    pub current_check: String,
    pub total_checks: usize,
    pub completed_checks: usize,
    pub results_count: usize,
    pub last_error: Option<String>,
}

#[derive(Default)]
struct JobState {
    running: bool,
    progress: Option<ProgressUpdate>,
    cancel: Option<CancelToken>,
    last_report: Option<DiscoveryReport>,
    last_error: Option<String>,
}

pub struct Dashboard {
    engine: Arc<DiscoveryEngine>,
    store: ReportStore,
    save_reports: bool,
    state: Arc<Mutex<JobState>>,
}

fn lock(state: &Mutex<JobState>) -> MutexGuard<'_, JobState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Dashboard {
    pub fn new(engine: DiscoveryEngine, store: ReportStore) -> Self {
        Self {
            engine: Arc::new(engine),
            store,
            save_reports: true,
            state: Arc::new(Mutex::new(JobState::default())),
        }
    }

    pub fn with_save_reports(mut self, save: bool) -> Self {
        self.save_reports = save;
        self
    }

    pub fn status(&self) -> DiscoveryStatus {
        let state = lock(&self.state);
        let total = DiscoveryEngine::total_steps();
        let (completed, current, percent) = match (&state.progress, state.running) {
            (Some(update), true) => (update.completed, update.current.clone(), update.percent()),
            (_, true) => (0, String::new(), 0),
            (_, false) if state.last_report.is_some() => (total, String::new(), 100),
            (_, false) => (0, String::new(), 0),
        };
        DiscoveryStatus {
            is_running: state.running,
            progress_percent: percent,
            current_check: current,
            total_checks: total,
            completed_checks: completed,
            results_count: state
                .last_report
                .as_ref()
                .map(DiscoveryReport::finding_count)
                .unwrap_or(0),
            last_error: state.last_error.clone(),
        }
    }

    /// Start a background session. Returns `false` when one is running.
    pub fn start(&self) -> Result<bool> {
        let cancel = CancelToken::new();
        {
            let mut state = lock(&self.state);
            if state.running {
                return Ok(false);
            }
            state.running = true;
            state.progress = None;
            state.last_error = None;
            state.cancel = Some(cancel.clone());
        }

        let engine = Arc::clone(&self.engine);
        let store = self.store.clone();
        let save = self.save_reports;
        let state = Arc::clone(&self.state);
        let spawned = thread::Builder::new()
            .name("discovery-session".to_string())
            .spawn(move || {
                let progress_state = Arc::clone(&state);
                let outcome = engine.run(&cancel, &|update: &ProgressUpdate| {
                    lock(&progress_state).progress = Some(update.clone());
                });
                let mut finished = lock(&state);
                finished.running = false;
                finished.cancel = None;
                match outcome {
                    Ok(report) => {
                        if save {
                            if let Err(err) = store.write(&report) {
                                error!(error = %format!("{err:#}"), "failed to save report");
                                finished.last_error = Some(format!("{err:#}"));
                            }
                        }
                        finished.last_report = Some(report);
                    }
                    Err(DiscoveryError::Cancelled) => {
                        finished.last_error = Some(DiscoveryError::Cancelled.to_string());
                    }
                }
            });
        if let Err(err) = spawned {
            let mut state = lock(&self.state);
            state.running = false;
            state.cancel = None;
            return Err(anyhow!("spawning discovery session: {err}"));
        }
        info!("discovery session started");
        Ok(true)
    }

    /// Cancel the running session. Returns `false` when nothing was running.
    pub fn stop(&self) -> bool {
        let state = lock(&self.state);
        match &state.cancel {
            Some(cancel) if state.running => {
                cancel.cancel();
                info!("discovery session stop requested");
                true
            }
            _ => false,
        }
    }

    /// Block until no session is running or `timeout` passes.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if !lock(&self.state).running {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    /// The report of this process's last session, else the newest stored one.
    fn latest_report(&self) -> Result<Option<DiscoveryReport>> {
        if let Some(report) = lock(&self.state).last_report.clone() {
            return Ok(Some(report));
        }
        self.store.latest()
    }

    fn latest_results(&self) -> ApiResponse {
        match self.latest_report() {
            Ok(Some(report)) => ApiResponse::json(200, &report),
            Ok(None) => ApiResponse::json(200, &json!({})),
            Err(err) => ApiResponse::error(500, &format!("{err:#}")),
        }
    }

    fn export(&self, format: &str) -> ApiResponse {
        if !matches!(format, "json" | "csv") {
            return ApiResponse::error(400, &format!("unsupported export format '{format}'"));
        }
        let report = match self.latest_report() {
            Ok(Some(report)) => report,
            Ok(None) => return ApiResponse::error(404, "no discovery data available"),
            Err(err) => return ApiResponse::error(500, &format!("{err:#}")),
        };
        if format == "json" {
            return ApiResponse::json(200, &report);
        }
        match report.to_csv() {
            Ok(body) => ApiResponse::csv(body),
            Err(err) => ApiResponse::error(500, &format!("{err:#}")),
        }
    }

    fn compare(&self, body: &str) -> ApiResponse {
        let request: CompareRequest = match serde_json::from_str(body) {
            Ok(request) => request,
            Err(err) => return ApiResponse::error(400, &format!("invalid request body: {err}")),
        };
        let (Some(first), Some(second)) = (request.report1, request.report2) else {
            return ApiResponse::error(400, "both report1 and report2 are required");
        };
        match self.store.compare(&first, &second) {
            Ok(comparison) => ApiResponse::json(200, &comparison),
            Err(err) => ApiResponse::error(404, &format!("{err:#}")),
        }
    }

    pub fn route(&self, method: &str, url: &str, body: &str) -> ApiResponse {
        let path = url.split('?').next().unwrap_or(url);
        let get = method.eq_ignore_ascii_case("GET");
        let post = method.eq_ignore_ascii_case("POST");
        match path {
            "/" | "/index.html" if get => ApiResponse::html(DASHBOARD_HTML),
            "/api/discovery/status" if get => ApiResponse::json(200, &self.status()),
            "/api/discovery/start" if post => match self.start() {
                Ok(true) => ApiResponse::json(202, &json!({ "status": "started" })),
                Ok(false) => ApiResponse::error(409, "discovery already running"),
                Err(err) => ApiResponse::error(500, &format!("{err:#}")),
            },
            "/api/discovery/stop" if post => {
                if self.stop() {
                    ApiResponse::json(200, &json!({ "status": "stopping" }))
                } else {
                    ApiResponse::json(200, &json!({ "status": "idle" }))
                }
            }
            "/api/discovery/results" if get => self.latest_results(),
            "/api/panes" if get => {
                ApiResponse::json(200, &self.engine.pane_discoverer().discover_panes())
            }
            "/api/hardware-profile" if get => {
                ApiResponse::json(200, &self.engine.pane_discoverer().profile_hardware())
            }
            "/api/reports/list" if get => match self.store.list() {
                Ok(reports) => ApiResponse::json(200, &json!({ "reports": reports })),
                Err(err) => ApiResponse::error(500, &format!("{err:#}")),
            },
            "/api/comparison/reports" if post => self.compare(body),
            _ if get && path.starts_with("/api/discovery/export/") => {
                self.export(&path["/api/discovery/export/".len()..])
            }
            _ if get && path.starts_with("/api/reports/") => {
                let name = &path["/api/reports/".len()..];
                match self.store.load(name) {
                    Ok(report) => ApiResponse::json(200, &report),
                    Err(err) => ApiResponse::error(404, &format!("{err:#}")),
                }
            }
            "/" | "/index.html" | "/api/discovery/status" | "/api/discovery/start"
            | "/api/discovery/stop" | "/api/discovery/results" | "/api/panes"
            | "/api/hardware-profile" | "/api/reports/list" | "/api/comparison/reports" => {
                ApiResponse::error(405, "method not allowed")
            }
            _ => ApiResponse::error(404, "not found"),
        }
    }
}

/// Serve `dashboard` on `addr` until `shutdown` is set.
pub fn serve(dashboard: Arc<Dashboard>, addr: &str, shutdown: Arc<AtomicBool>) -> Result<()> {
    let server = tiny_http::Server::http(addr)
        .map_err(|err| anyhow!("failed to start server on {addr}: {err}"))?;
    info!(%addr, "dashboard listening");
    serve_on(dashboard, server, shutdown)
}

/// Accept loop over an already bound server. Each request is answered on its
/// own thread, so a slow pane or hardware query never blocks status polls.
pub fn serve_on(
    dashboard: Arc<Dashboard>,
    server: tiny_http::Server,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        let request = match server.recv_timeout(ACCEPT_TIMEOUT) {
            Ok(Some(request)) => request,
            Ok(None) => continue,
            Err(err) => {
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
                return Err(err).context("accepting request");
            }
        };
        let dashboard = Arc::clone(&dashboard);
        let spawned = thread::Builder::new()
            .name("dashboard-request".to_string())
            .spawn(move || respond(&dashboard, request));
        if let Err(err) = spawned {
            warn!(error = %err, "failed to spawn request handler");
        }
    }
    dashboard.stop();
    info!("dashboard stopped");
    Ok(())
}

fn respond(dashboard: &Dashboard, mut request: tiny_http::Request) {
    let method = request.method().to_string();
    let url = request.url().to_string();
    debug!(%method, %url, "request");

    let mut body = String::new();
    let reply = match request
        .as_reader()
        .take(MAX_BODY_BYTES)
        .read_to_string(&mut body)
    {
        Ok(_) => dashboard.route(&method, &url, &body),
        Err(err) => ApiResponse::error(400, &format!("reading request body: {err}")),
    };

    let mut response =
        tiny_http::Response::from_string(reply.body).with_status_code(reply.status);
    match format!("Content-Type: {}", reply.content_type).parse::<tiny_http::Header>() {
        Ok(header) => response = response.with_header(header),
        Err(_) => warn!(content_type = reply.content_type, "invalid content type header"),
    }
    if let Err(err) = request.respond(response) {
        warn!(error = %err, %url, "failed to send response");
    }
}
