//! Command-line front end.
//!
//! Usage:
//!   authsurface panes                 # pane catalog as JSON
//!   authsurface hardware              # hardware capability profile
//!   authsurface discover [--no-save]  # full report, saved under data_dir
//!   authsurface serve [--bind ADDR] [--port N]
//!   authsurface reports [NAME]        # list stored reports or print one
//!   authsurface export [--csv] [NAME] # latest (or named) report as JSON or CSV
//!   authsurface compare FIRST SECOND  # diff two stored reports
//!   authsurface validate --file FILE  # check a report against the schema
//!
//! JSON goes to stdout; logs go to stderr.

use anyhow::{Context, Result, bail};
use authsurface::catalog::CancelToken;
use authsurface::config::Config;
use authsurface::engine::{DiscoveryEngine, ProgressUpdate};
use authsurface::host::SystemHost;
use authsurface::logging::{LogConfig, LogFormat, LogLevel, init_logging};
use authsurface::report::ReportStore;
use authsurface::report_schema::ReportSchema;
use authsurface::web::{Dashboard, serve};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use std::fs::File;
use std::io::{Read, stdin};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "authsurface")]
#[command(about = "Discover macOS authorization surfaces and System Settings panes")]
struct Cli {
    /// JSON config file.
    #[arg(long, global = true, env = "AUTHSURFACE_CONFIG")]
    config: Option<PathBuf>,
    /// Log level: trace, debug, info, warn, error, off.
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,
    /// Log format: human or json.
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Discover the System Settings pane catalog.
    Panes,
    /// Profile the host's hardware capabilities.
    Hardware,
    /// Run a full discovery session and print the report.
    Discover {
        /// Print the report without writing it to the data directory.
        #[arg(long)]
        no_save: bool,
    },
    /// Serve the dashboard and JSON API.
    Serve {
        #[arg(long)]
        bind: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// List stored reports, or print one by file name.
    Reports { name: Option<String> },
    /// Print the newest (or named) stored report.
    Export {
        /// One CSV row per finding instead of JSON.
        #[arg(long)]
        csv: bool,
        name: Option<String>,
    },
    /// Compare two stored reports; FIRST is the baseline.
    Compare { first: String, second: String },
    /// Validate a report file (or stdin) against the report schema.
    Validate {
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    let log = LogConfig {
        format: cli.log_format.unwrap_or(config.log_format),
        level: cli.log_level.unwrap_or(config.log_level),
    };
    init_logging(&log)?;
    debug!(?config, "configuration loaded");

    let host = Arc::new(SystemHost::new(config.command_timeout()));
    let engine = DiscoveryEngine::new(host, config.discovery_settings());

    match cli.command {
        Command::Panes => print_json(&engine.pane_discoverer().discover_panes()),
        Command::Hardware => print_json(&engine.pane_discoverer().profile_hardware()),
        Command::Discover { no_save } => {
            let report = engine
                .run(&CancelToken::new(), &|update: &ProgressUpdate| {
                    info!(
                        step = %update.current,
                        completed = update.completed,
                        total = update.total,
                        "progress"
                    );
                })
                .context("running discovery")?;
            if !no_save {
                let store = ReportStore::new(&config.data_dir)?;
                let path = store.write(&report)?;
                info!(path = %path.display(), "report written");
            }
            print_json(&report)
        }
        Command::Serve { bind, port } => {
            if let Some(bind) = bind {
                config.bind = bind;
            }
            if let Some(port) = port {
                config.port = port;
            }
            config.validate()?;
            let store = ReportStore::new(&config.data_dir)?;
            let dashboard = Arc::new(Dashboard::new(engine, store));
            serve(dashboard, &config.bind_addr(), Arc::new(AtomicBool::new(false)))
        }
        Command::Reports { name } => {
            let store = ReportStore::new(&config.data_dir)?;
            match name {
                Some(name) => print_json(&store.load(&name)?),
                None => print_json(&store.list()?),
            }
        }
        Command::Export { csv, name } => {
            let store = ReportStore::new(&config.data_dir)?;
            let report = match name {
                Some(name) => store.load(&name)?,
                None => match store.latest()? {
                    Some(report) => report,
                    None => bail!("no stored reports in {}", config.data_dir.display()),
                },
            };
            if csv {
                print!("{}", report.to_csv()?);
                Ok(())
            } else {
                print_json(&report)
            }
        }
        Command::Compare { first, second } => {
            let store = ReportStore::new(&config.data_dir)?;
            print_json(&store.compare(&first, &second)?)
        }
        Command::Validate { file } => {
            let value = read_input(file)?;
            let schema = ReportSchema::embedded()?;
            schema.validate(&value)?;
            println!("ok ({})", schema.schema_version());
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_input(file: Option<PathBuf>) -> Result<Value> {
    let mut buf = String::new();
    match file {
        Some(path) => {
            File::open(&path)
                .with_context(|| format!("opening input file {}", path.display()))?
                .read_to_string(&mut buf)
                .with_context(|| format!("reading input file {}", path.display()))?;
        }
        None => {
            stdin()
                .read_to_string(&mut buf)
                .context("reading stdin for report JSON")?;
        }
    }
    if buf.trim().is_empty() {
        bail!("no report JSON provided");
    }
    serde_json::from_str(&buf).context("parsing report JSON")
}
