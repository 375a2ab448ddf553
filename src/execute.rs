//! Execution adapter
//!
//! Runs the target either under the call-graph driver or as a plain child
//! process timed from the outside. Output is captured into files inside a
//! per-run scratch directory; the directory (driver, sample artifact and
//! captured output) is removed when the run's `TempDir` drops, on every
//! return path.

use crate::command::Command as TargetCommand;
use crate::normalize::{whole_process_key, TimingRecord};
use crate::resolve::ResolvedTarget;
use crate::samples::{self, RawSample};
use serde::Serialize;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Call-graph driver executed by the target interpreter
const DRIVER_SOURCE: &str = include_str!("driver.py");

/// Default limit on a profiled command's wall time
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Exit code reported when the process produced none
const NO_EXIT_CODE: i32 = -1;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("Failed to create scratch directory: {0}")]
    Scratch(#[source] io::Error),

    #[error("Failed to write profiling driver: {0}")]
    Driver(#[source] io::Error),

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to wait for child process: {0}")]
    Wait(#[source] io::Error),

    #[error("Failed to capture output: {0}")]
    Capture(#[source] io::Error),
}

/// Managed-code invocation to run under the call-graph driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedTarget {
    pub interpreter: String,
    /// Options for the interpreter itself (`-u`, `-X dev`)
    pub interpreter_args: Vec<String>,
    /// What the driver runs: `-c CODE`, `-m MODULE` or `SCRIPT`, plus arguments
    pub program_args: Vec<String>,
}

impl ManagedTarget {
    /// `python [opts] target...` run as-is under the driver
    pub fn from_interpreter_command(command: &TargetCommand) -> Self {
        let (interpreter_args, program_args) = split_interpreter_args(command.args());
        Self {
            interpreter: command.program().to_string(),
            interpreter_args,
            program_args,
        }
    }

    /// A bare script run with the default interpreter
    pub fn from_script(interpreter: &str, command: &TargetCommand) -> Self {
        Self {
            interpreter: interpreter.to_string(),
            interpreter_args: Vec::new(),
            program_args: command.tokens().to_vec(),
        }
    }

    /// A located tool launcher run with the interpreter its directive names
    pub fn from_resolved(target: ResolvedTarget) -> Self {
        let mut program_args = Vec::with_capacity(target.args.len() + 1);
        program_args.push(target.script.to_string_lossy().into_owned());
        program_args.extend(target.args);
        Self {
            interpreter: target.interpreter,
            interpreter_args: Vec::new(),
            program_args,
        }
    }
}

/// Split interpreter options from the program the interpreter should run
///
/// Options stop at `-c`, `-m`, `-`, `--` or the first non-option token.
/// Attached values (`-mpytest`, `-c'code'`) and clustered flags ending in
/// a selector (`-uc CODE`) are split apart the way the interpreter reads them.
pub fn split_interpreter_args(args: &[String]) -> (Vec<String>, Vec<String>) {
    let mut opts = Vec::new();
    let mut i = 0;
    while i < args.len() {
        let arg = args[i].as_str();
        if arg == "-" {
            break;
        }
        if arg == "--" {
            i += 1;
            break;
        }
        if arg.starts_with("--") {
            opts.push(arg.to_string());
            i += 1;
            continue;
        }
        let Some(cluster) = arg.strip_prefix('-') else {
            break;
        };

        let mut consumed = 1;
        for (pos, flag) in cluster.char_indices() {
            let rest = &cluster[pos + flag.len_utf8()..];
            match flag {
                'c' | 'm' => {
                    if pos > 0 {
                        opts.push(format!("-{}", &cluster[..pos]));
                    }
                    let mut program = vec![format!("-{}", flag)];
                    if !rest.is_empty() {
                        program.push(rest.to_string());
                    }
                    program.extend(args[i + 1..].iter().cloned());
                    return (opts, program);
                }
                // the value is the rest of the token or the next token
                'X' | 'W' => {
                    if rest.is_empty() && i + 1 < args.len() {
                        consumed = 2;
                    }
                    break;
                }
                _ => {}
            }
        }
        opts.extend(args[i..i + consumed].iter().cloned());
        i += consumed;
    }
    (opts, args[i..].to_vec())
}

/// How the target is run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// Under call-graph instrumentation
    CallGraph(ManagedTarget),
    /// As an opaque process timed from outside
    WallClock(TargetCommand),
}

impl Strategy {
    pub fn label(&self) -> &'static str {
        match self {
            Self::CallGraph(_) => "call-graph",
            Self::WallClock(_) => "wall-clock",
        }
    }
}

/// Result of one run of the target
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    /// Profiler-side diagnostic (spawn failure, timeout, missing samples)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Seconds from spawn to exit
    pub wall_time: f64,
}

impl ExecutionOutcome {
    /// Outcome of a run that never produced a process result
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            exit_code: NO_EXIT_CODE,
            stdout: String::new(),
            stderr: String::new(),
            timed_out: false,
            message: Some(message.into()),
            wall_time: 0.0,
        }
    }

    /// Textual execution summary
    pub fn summary(&self) -> String {
        let mut out = format!(
            "Exit code: {}\nSTDOUT:\n{}\nSTDERR:\n{}",
            self.exit_code, self.stdout, self.stderr
        );
        if let Some(message) = &self.message {
            if !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(message);
        }
        out
    }
}

/// Timing data gathered by a run
#[derive(Debug, Clone, PartialEq)]
pub enum Collected {
    /// Raw call-graph samples, still to be normalized
    Samples(Vec<RawSample>),
    /// The single record of an opaque run
    WallClock { key: String, record: TimingRecord },
    /// No usable timing data
    Nothing,
}

/// Child process result with captured output
struct Finished {
    status: Option<ExitStatus>,
    stdout: String,
    stderr: String,
    elapsed: Duration,
}

impl Finished {
    fn timed_out(&self) -> bool {
        self.status.is_none()
    }

    fn into_outcome(self, timeout: Duration) -> ExecutionOutcome {
        let timed_out = self.timed_out();
        ExecutionOutcome {
            exit_code: self.status.map(exit_code).unwrap_or(NO_EXIT_CODE),
            stdout: self.stdout,
            stderr: self.stderr,
            timed_out,
            message: timed_out.then(|| {
                format!("Command execution timed out after {}s", timeout.as_secs())
            }),
            wall_time: self.elapsed.as_secs_f64(),
        }
    }
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(NO_EXIT_CODE)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(NO_EXIT_CODE)
}

/// Runs targets with a fixed timeout
#[derive(Debug, Clone)]
pub struct Executor {
    timeout: Duration,
    /// Parent of the per-run scratch directories (system temp dir if unset)
    scratch_root: Option<PathBuf>,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl Executor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            scratch_root: None,
        }
    }

    /// Create scratch directories under `root` instead of the system temp dir
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run the target; failures are folded into the outcome, never returned
    pub fn execute(&self, strategy: &Strategy) -> (ExecutionOutcome, Collected) {
        let result = match strategy {
            Strategy::CallGraph(target) => self.run_call_graph(target),
            Strategy::WallClock(command) => self.run_wall_clock(command),
        };
        result.unwrap_or_else(|e| {
            warn!(error = %e, "execution failed");
            (
                ExecutionOutcome::failed(format!("Error executing command: {}", e)),
                Collected::Nothing,
            )
        })
    }

    fn run_call_graph(&self, target: &ManagedTarget) -> Result<(ExecutionOutcome, Collected), ExecError> {
        let scratch = self.scratch_dir()?;
        let driver = scratch.path().join("driver.py");
        let artifact = scratch.path().join("samples.json");
        fs::write(&driver, DRIVER_SOURCE).map_err(ExecError::Driver)?;

        let mut args: Vec<OsString> = target.interpreter_args.iter().map(OsString::from).collect();
        args.push(driver.into_os_string());
        args.push(artifact.clone().into_os_string());
        args.push("--".into());
        args.extend(target.program_args.iter().map(OsString::from));

        info!(interpreter = %target.interpreter, program = ?target.program_args, "running under call-graph driver");
        let finished = self.run_captured(&target.interpreter, &args, scratch.path())?;

        if finished.timed_out() {
            return Ok((finished.into_outcome(self.timeout), Collected::Nothing));
        }

        let mut outcome = finished.into_outcome(self.timeout);
        let collected = match samples::read_samples(&artifact) {
            Ok(samples) => {
                debug!(count = samples.len(), "read call-graph samples");
                Collected::Samples(samples)
            }
            Err(e) => {
                warn!(error = %e, "no call-graph samples");
                outcome.message = Some(format!("No call-graph samples available: {}", e));
                Collected::Nothing
            }
        };
        Ok((outcome, collected))
    }

    fn run_wall_clock(&self, command: &TargetCommand) -> Result<(ExecutionOutcome, Collected), ExecError> {
        let scratch = self.scratch_dir()?;
        let args: Vec<OsString> = command.args().iter().map(OsString::from).collect();

        info!(command = %command, "running with whole-process timing");
        let finished = self.run_captured(command.program(), &args, scratch.path())?;

        let collected = if finished.timed_out() {
            Collected::Nothing
        } else {
            Collected::WallClock {
                key: whole_process_key(&command.to_string()),
                record: TimingRecord::whole_process(finished.elapsed),
            }
        };
        Ok((finished.into_outcome(self.timeout), collected))
    }

    fn scratch_dir(&self) -> Result<TempDir, ExecError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("cmdprof-");
        let dir = match &self.scratch_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        };
        dir.map_err(ExecError::Scratch)
    }

    fn run_captured(&self, program: &str, args: &[OsString], scratch: &Path) -> Result<Finished, ExecError> {
        let stdout_path = scratch.join("stdout");
        let stderr_path = scratch.join("stderr");
        let stdout = File::create(&stdout_path).map_err(ExecError::Capture)?;
        let stderr = File::create(&stderr_path).map_err(ExecError::Capture)?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));

        // a background group reading the terminal would be stopped by SIGTTIN
        let grouped = cfg!(unix) && !io::stdin().is_terminal();
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            if grouped {
                cmd.process_group(0);
            }
        }

        let start = Instant::now();
        let child = cmd.spawn().map_err(|source| ExecError::Spawn {
            program: program.to_string(),
            source,
        })?;
        debug!(pid = child.id(), program, grouped, "spawned child");

        let (status, elapsed) = match self.wait(child, start, grouped)? {
            Some((status, ended)) => (Some(status), ended.duration_since(start)),
            None => (None, start.elapsed()),
        };

        Ok(Finished {
            status,
            stdout: read_lossy(&stdout_path)?,
            stderr: read_lossy(&stderr_path)?,
            elapsed,
        })
    }

    /// Block until exit or timeout; `None` means the child was killed
    ///
    /// A waiter thread owns the child and stamps the exit instant as soon as
    /// `wait` returns.
    fn wait(
        &self,
        mut child: Child,
        start: Instant,
        grouped: bool,
    ) -> Result<Option<(ExitStatus, Instant)>, ExecError> {
        let pid = child.id();
        let (tx, rx) = mpsc::channel();
        let waiter = thread::spawn(move || {
            let status = child.wait();
            let _ = tx.send((status, Instant::now()));
        });

        let remaining = self.timeout.saturating_sub(start.elapsed());
        let result = match rx.recv_timeout(remaining) {
            Ok((status, ended)) => Ok(Some((status.map_err(ExecError::Wait)?, ended))),
            Err(RecvTimeoutError::Timeout) => {
                warn!(pid, timeout_secs = self.timeout.as_secs(), "timeout, killing child");
                terminate(pid, grouped);
                // reap before the scratch directory goes away
                if let Ok((Err(e), _)) = rx.recv() {
                    debug!(error = %e, "reaping killed child failed");
                }
                Ok(None)
            }
            Err(RecvTimeoutError::Disconnected) => Err(ExecError::Wait(io::Error::other(
                "waiter thread exited without a status",
            ))),
        };
        let _ = waiter.join();
        result
    }
}

fn read_lossy(path: &Path) -> Result<String, ExecError> {
    let bytes = fs::read(path).map_err(ExecError::Capture)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Kill the child, and its whole process group when it has one
#[cfg(unix)]
fn terminate(pid: u32, grouped: bool) {
    use nix::sys::signal::{kill, killpg, Signal};
    use nix::unistd::Pid;

    let pid = Pid::from_raw(pid as i32);
    if grouped {
        if let Err(e) = killpg(pid, Signal::SIGKILL) {
            debug!(error = %e, "killpg failed, killing child only");
        } else {
            return;
        }
    }
    if let Err(e) = kill(pid, Signal::SIGKILL) {
        debug!(error = %e, "kill failed");
    }
}

#[cfg(not(unix))]
fn terminate(pid: u32, _grouped: bool) {
    let status = Command::new("taskkill")
        .args(["/F", "/T", "/PID", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    if let Err(e) = status {
        debug!(error = %e, "taskkill failed");
    }
}
