//! Host capabilities consumed by discovery.
//!
//! Everything the crate learns about the machine flows through [`Host`]:
//! running a fixed OS utility, decoding a property list, and listing a
//! directory. `SystemHost` talks to the real machine; `MemoryHost` replays
//! canned answers so fixtures and tests never need macOS.

use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Default per-command timeout; these are fast local queries.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Shared flag that aborts a run. Clones observe the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Error)]
pub enum HostError {
    #[error("{} not found", .0.display())]
    NotFound(PathBuf),
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} timed out after {timeout_ms}ms")]
    Timeout { program: String, timeout_ms: u128 },
    #[error("{program} cancelled")]
    Cancelled { program: String },
    #[error("{program} exited with {code:?}: {stderr}")]
    CommandFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("unable to decode {}: {detail}", .path.display())]
    Parse { path: PathBuf, detail: String },
}

impl HostError {
    /// True when the backing file, directory, or utility does not exist.
    pub fn is_unavailable(&self) -> bool {
        match self {
            HostError::NotFound(_) => true,
            HostError::Spawn { source, .. } => source.kind() == io::ErrorKind::NotFound,
            HostError::Io { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
            ),
            _ => false,
        }
    }
}

/// Captured output of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    /// Trimmed stdout, or `None` when the command failed or printed nothing.
    pub fn trimmed_stdout(&self) -> Option<&str> {
        if !self.is_success() {
            return None;
        }
        let trimmed = self.stdout.trim();
        if trimmed.is_empty() { None } else { Some(trimmed) }
    }
}

/// Read-only view of the machine.
///
/// Implementations must be safe to share between the reader threads of one
/// discovery run and between independent runs.
pub trait Host: Send + Sync {
    /// Run `program` with `args` and capture its output. A non-zero exit is
    /// not an error here; callers inspect [`CommandOutput::code`].
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, HostError>;

    /// Like [`Host::run`], but gives up once `cancel` fires. Hosts that can
    /// interrupt a running command should override this.
    fn run_until(
        &self,
        program: &str,
        args: &[&str],
        cancel: &CancelToken,
    ) -> Result<CommandOutput, HostError> {
        if cancel.is_cancelled() {
            return Err(HostError::Cancelled {
                program: program.to_string(),
            });
        }
        self.run(program, args)
    }

    /// Decode a property list (XML, binary, or JSON) into a JSON value.
    fn read_plist(&self, path: &Path) -> Result<Value, HostError>;

    /// File names directly under `path`, sorted.
    fn list_dir(&self, path: &Path) -> Result<Vec<String>, HostError>;

    fn exists(&self, path: &Path) -> bool;
}

/// Host backed by `std::process::Command` and the local filesystem.
#[derive(Debug, Clone)]
pub struct SystemHost {
    command_timeout: Duration,
}

impl Default for SystemHost {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_TIMEOUT)
    }
}

impl SystemHost {
    pub fn new(command_timeout: Duration) -> Self {
        Self { command_timeout }
    }

    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }
}

impl SystemHost {
    fn spawn_and_wait(
        &self,
        program: &str,
        args: &[&str],
        cancel: Option<&CancelToken>,
    ) -> Result<CommandOutput, HostError> {
        if cancel.is_some_and(CancelToken::is_cancelled) {
            return Err(HostError::Cancelled {
                program: program.to_string(),
            });
        }
        trace!(program, ?args, "running command");
        let mut child = Command::new(program)
            .args(args)
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| HostError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let stdout_reader = child.stdout.take().map(spawn_drain);
        let stderr_reader = child.stderr.take().map(spawn_drain);

        let deadline = Instant::now() + self.command_timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if cancel.is_some_and(CancelToken::is_cancelled) => {
                    debug!(program, "command cancelled, killing");
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(HostError::Cancelled {
                        program: program.to_string(),
                    });
                }
                Ok(None) if Instant::now() >= deadline => {
                    warn!(program, "command timed out, killing");
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(HostError::Timeout {
                        program: program.to_string(),
                        timeout_ms: self.command_timeout.as_millis(),
                    });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(source) => {
                    let _ = child.kill();
                    return Err(HostError::Io {
                        path: PathBuf::from(program),
                        source,
                    });
                }
            }
        };

        let stdout = stdout_reader.map(join_drain).unwrap_or_default();
        let stderr = stderr_reader.map(join_drain).unwrap_or_default();
        debug!(program, code = ?status.code(), "command finished");
        Ok(CommandOutput {
            code: status.code(),
            stdout,
            stderr,
        })
    }
}

impl Host for SystemHost {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, HostError> {
        self.spawn_and_wait(program, args, None)
    }

    fn run_until(
        &self,
        program: &str,
        args: &[&str],
        cancel: &CancelToken,
    ) -> Result<CommandOutput, HostError> {
        self.spawn_and_wait(program, args, Some(cancel))
    }

    fn read_plist(&self, path: &Path) -> Result<Value, HostError> {
        if !path.exists() {
            return Err(HostError::NotFound(path.to_path_buf()));
        }
        let path_arg = path.to_string_lossy();
        let output = self.run(
            "plutil",
            &["-convert", "json", "-o", "-", "--", path_arg.as_ref()],
        )?;
        if !output.is_success() {
            return Err(HostError::Parse {
                path: path.to_path_buf(),
                detail: output.stderr.trim().to_string(),
            });
        }
        serde_json::from_str(&output.stdout).map_err(|err| HostError::Parse {
            path: path.to_path_buf(),
            detail: err.to_string(),
        })
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<String>, HostError> {
        let entries = fs::read_dir(path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                HostError::NotFound(path.to_path_buf())
            } else {
                HostError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| HostError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

fn spawn_drain<R: Read + Send + 'static>(mut reader: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_drain(handle: thread::JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

/// In-memory host that replays canned command output, plists, and
/// directory listings. Unknown commands fail to spawn and unknown paths are
/// reported missing, matching what a bare machine would answer.
#[derive(Debug, Clone, Default)]
pub struct MemoryHost {
    commands: BTreeMap<String, CommandOutput>,
    plists: BTreeMap<PathBuf, Result<Value, String>>,
    dirs: BTreeMap<PathBuf, Vec<String>>,
    delay: Option<Duration>,
    command_delay: Option<Duration>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the output for `program args...` (joined by single spaces).
    pub fn with_command(mut self, command_line: &str, output: CommandOutput) -> Self {
        self.commands.insert(command_line.to_string(), output);
        self
    }

    pub fn with_plist(mut self, path: impl Into<PathBuf>, value: Value) -> Self {
        self.plists.insert(path.into(), Ok(value));
        self
    }

    /// Register a file that exists but cannot be decoded.
    pub fn with_corrupt_plist(mut self, path: impl Into<PathBuf>, detail: &str) -> Self {
        self.plists.insert(path.into(), Err(detail.to_string()));
        self
    }

    pub fn with_dir<I, S>(mut self, path: impl Into<PathBuf>, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = entries.into_iter().map(Into::into).collect();
        names.sort();
        self.dirs.insert(path.into(), names);
        self
    }

    /// Sleep before answering any plist or directory query.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Sleep before answering any command.
    pub fn with_command_delay(mut self, delay: Duration) -> Self {
        self.command_delay = Some(delay);
        self
    }

    fn pause(&self) {
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
    }
}

impl Host for MemoryHost {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, HostError> {
        if let Some(delay) = self.command_delay {
            thread::sleep(delay);
        }
        let mut key = program.to_string();
        for arg in args {
            key.push(' ');
            key.push_str(arg);
        }
        self.commands
            .get(&key)
            .cloned()
            .ok_or_else(|| HostError::Spawn {
                program: program.to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "not registered"),
            })
    }

    fn read_plist(&self, path: &Path) -> Result<Value, HostError> {
        self.pause();
        match self.plists.get(path) {
            Some(Ok(value)) => Ok(value.clone()),
            Some(Err(detail)) => Err(HostError::Parse {
                path: path.to_path_buf(),
                detail: detail.clone(),
            }),
            None => Err(HostError::NotFound(path.to_path_buf())),
        }
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<String>, HostError> {
        self.pause();
        self.dirs
            .get(path)
            .cloned()
            .ok_or_else(|| HostError::NotFound(path.to_path_buf()))
    }

    fn exists(&self, path: &Path) -> bool {
        self.plists.contains_key(path) || self.dirs.contains_key(path)
    }
}
