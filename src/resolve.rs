//! Resolution of managed-tool entry points
//!
//! A tool such as `pytest` is usually a small launcher script whose first
//! line names an interpreter. When that launcher can be located and read,
//! the command can be profiled at call-site granularity; every other outcome
//! degrades to whole-process timing. Nothing in this module returns an
//! error: failures become [`Resolution::Fallback`] with the reason attached.

use crate::command::Command;
use crate::config::ProfilerConfig;
use crate::origin::file_name;
use std::env;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Longest first line inspected for an interpreter directive
const MAX_DIRECTIVE_LEN: u64 = 4096;

/// A managed-code entry point located for a tool command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// Interpreter named by the directive line (or the configured default)
    pub interpreter: String,
    /// Located launcher script
    pub script: PathBuf,
    /// Arguments following the program token
    pub args: Vec<String>,
}

/// Why resolution gave up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// Program not found on the search path
    NotFound,
    /// File exists but its first line could not be read or decoded
    Unreadable(String),
    /// First line is not a managed-language interpreter directive
    NotManaged,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found on search path"),
            Self::Unreadable(e) => write!(f, "unreadable: {}", e),
            Self::NotManaged => write!(f, "no managed interpreter directive"),
        }
    }
}

/// Outcome of the resolution chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(ResolvedTarget),
    Fallback(FallbackReason),
}

/// Filesystem facility used by the resolver
pub trait ProgramLocator {
    /// Find the executable a program token refers to
    fn locate(&self, program: &str) -> Option<PathBuf>;

    /// Read the first line of a located file
    fn first_line(&self, path: &Path) -> io::Result<String>;
}

/// Locator over a list of search directories (`PATH` by default)
#[derive(Debug, Clone, Default)]
pub struct SearchPath {
    dirs: Vec<PathBuf>,
}

impl SearchPath {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    /// Search directories taken from the `PATH` environment variable
    pub fn from_env() -> Self {
        let dirs = env::var_os("PATH")
            .map(|path| env::split_paths(&path).collect())
            .unwrap_or_default();
        Self { dirs }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

impl ProgramLocator for SearchPath {
    fn locate(&self, program: &str) -> Option<PathBuf> {
        // tokens with a separator are paths, not search-path names
        if program.contains(['/', '\\']) {
            let path = PathBuf::from(program);
            return is_executable(&path).then_some(path);
        }
        self.dirs
            .iter()
            .map(|dir| dir.join(program))
            .find(|candidate| is_executable(candidate))
    }

    fn first_line(&self, path: &Path) -> io::Result<String> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file.take(MAX_DIRECTIVE_LEN));
        let mut bytes = Vec::new();
        reader.read_until(b'\n', &mut bytes)?;
        String::from_utf8(bytes)
            .map(|line| line.trim_end().to_string())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

/// Resolution chain for tool commands
#[derive(Debug, Clone)]
pub struct Resolver<L = SearchPath> {
    locator: L,
    markers: Vec<String>,
    default_interpreter: String,
}

impl Resolver<SearchPath> {
    /// Resolver over the process `PATH`
    pub fn from_config(config: &ProfilerConfig) -> Self {
        Self::with_locator(SearchPath::from_env(), config)
    }
}

impl<L: ProgramLocator> Resolver<L> {
    pub fn with_locator(locator: L, config: &ProfilerConfig) -> Self {
        Self {
            locator,
            markers: config.directive_markers.clone(),
            default_interpreter: config.default_interpreter.clone(),
        }
    }

    pub fn resolve(&self, command: &Command) -> Resolution {
        let program = command.program();

        let Some(path) = self.locator.locate(program) else {
            debug!(program, "resolution fallback: not found");
            return Resolution::Fallback(FallbackReason::NotFound);
        };

        let line = match self.locator.first_line(&path) {
            Ok(line) => line,
            Err(e) => {
                debug!(program, path = %path.display(), error = %e, "resolution fallback: unreadable");
                return Resolution::Fallback(FallbackReason::Unreadable(e.to_string()));
            }
        };

        if !self.is_managed_directive(&line) {
            debug!(program, path = %path.display(), "resolution fallback: not managed");
            return Resolution::Fallback(FallbackReason::NotManaged);
        }

        let interpreter = directive_interpreter(&line)
            .unwrap_or_else(|| self.default_interpreter.clone());
        debug!(program, path = %path.display(), %interpreter, "resolved managed entry point");

        Resolution::Resolved(ResolvedTarget {
            interpreter,
            script: path,
            args: command.args().to_vec(),
        })
    }

    fn is_managed_directive(&self, line: &str) -> bool {
        line.starts_with("#!") && self.markers.iter().any(|m| line.contains(m.as_str()))
    }
}

/// Interpreter program named by a `#!` line
///
/// `#!/usr/bin/env -S python3 -u` yields `python3`;
/// `#!/opt/venv/bin/python` yields the full path.
pub fn directive_interpreter(line: &str) -> Option<String> {
    let body = line.strip_prefix("#!")?.trim();
    let mut parts = body.split_whitespace();
    let first = parts.next()?;

    if file_name(first) == "env" {
        parts
            .find(|p| !p.starts_with('-') && !p.contains('='))
            .map(str::to_string)
    } else {
        Some(first.to_string())
    }
}
