//! cmdprof - profile a command with call-graph or wall-clock timing
//!
//! Commands that run Python code (an interpreter invocation, a bare `.py`
//! script, or a known tool whose launcher carries a Python `#!` line) are
//! run under a cProfile driver and reported per call site. Everything else
//! is timed as a single opaque process.
//!
//! ```no_run
//! use cmdprof::{Command, NormalizeMode, Profiler, ProfilerConfig};
//!
//! let command = Command::parse("python3 -c print(42)").unwrap();
//! let run = Profiler::new(&ProfilerConfig::default(), NormalizeMode::Detailed).profile(&command);
//! println!("{}", run.render(20));
//! ```

pub mod classify;
pub mod cli;
pub mod command;
pub mod config;
pub mod execute;
pub mod normalize;
pub mod origin;
pub mod profiler;
pub mod report;
pub mod resolve;
pub mod samples;

pub use classify::{Classification, CommandClassifier};
pub use command::{Command, CommandError};
pub use config::{ConfigError, ProfilerConfig};
pub use execute::{ExecutionOutcome, Executor, Strategy};
pub use normalize::{NormalizeMode, Normalizer, TimingMap, TimingRecord};
pub use profiler::{profile_command, ProfileRun, Profiler};
pub use report::{render, SortCriterion};
