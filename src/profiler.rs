//! Orchestrator: classify, plan, execute, normalize
//!
//! A run never fails as a whole. Spawn errors, timeouts and missing samples
//! all surface in the [`ExecutionOutcome`] summary next to whatever timing
//! data was gathered, which may be none.

use crate::classify::{Classification, CommandClassifier};
use crate::command::{Command, CommandError};
use crate::config::ProfilerConfig;
use crate::execute::{Collected, ExecutionOutcome, Executor, ManagedTarget, Strategy};
use crate::normalize::{NormalizeMode, Normalizer, TimingMap};
use crate::origin::OriginClassifier;
use crate::report;
use crate::resolve::{FallbackReason, ProgramLocator, Resolution, Resolver, SearchPath};
use tracing::{debug, info};

/// Chosen strategy for one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub classification: Classification,
    pub strategy: Strategy,
    /// Set when a resolution attempt fell back to wall-clock timing
    pub fallback: Option<FallbackReason>,
}

/// Everything one profiling run produced
#[derive(Debug, Clone)]
pub struct ProfileRun {
    pub command: String,
    pub classification: Classification,
    /// `call-graph` or `wall-clock`
    pub strategy: &'static str,
    pub fallback: Option<String>,
    pub outcome: ExecutionOutcome,
    pub timings: TimingMap,
}

impl ProfileRun {
    /// Text report of this run
    pub fn render(&self, top_n: usize) -> String {
        report::render(&self.timings, &self.outcome, top_n)
    }
}

/// Command profiler
#[derive(Debug)]
pub struct Profiler<L = SearchPath> {
    classifier: CommandClassifier,
    resolver: Resolver<L>,
    executor: Executor,
    normalizer: Normalizer,
    default_interpreter: String,
    resolve_unknown: bool,
}

impl Profiler<SearchPath> {
    /// Build a profiler that locates tools on `PATH`
    pub fn new(config: &ProfilerConfig, mode: NormalizeMode) -> Self {
        Self::with_locator(config, mode, SearchPath::from_env())
    }
}

impl Default for Profiler<SearchPath> {
    fn default() -> Self {
        Self::new(&ProfilerConfig::default(), NormalizeMode::default())
    }
}

fn executor(config: &ProfilerConfig) -> Executor {
    let executor = Executor::new(config.timeout());
    match &config.scratch_dir {
        Some(root) => executor.with_scratch_root(root),
        None => executor,
    }
}

impl<L: ProgramLocator> Profiler<L> {
    pub fn with_locator(config: &ProfilerConfig, mode: NormalizeMode, locator: L) -> Self {
        Self {
            classifier: CommandClassifier::from_config(config),
            resolver: Resolver::with_locator(locator, config),
            executor: executor(config),
            normalizer: Normalizer::new(mode, config),
            default_interpreter: config.default_interpreter.clone(),
            resolve_unknown: config.resolve_unknown,
        }
    }

    pub fn mode(&self) -> NormalizeMode {
        self.normalizer.mode()
    }

    /// Recognize an additional managed tool by program name
    pub fn add_managed_tool(&mut self, name: impl Into<String>) {
        self.classifier.add_managed_tool(name);
    }

    /// Register an extra origin classifier after the configured rules
    pub fn register_origin(&mut self, classifier: Box<dyn OriginClassifier>) {
        self.normalizer.origins_mut().register(classifier);
    }

    /// Pick the execution strategy for a command without running it
    pub fn plan(&self, command: &Command) -> Plan {
        let classification = self.classifier.classify(command);
        debug!(%command, ?classification, "classified command");

        let (strategy, fallback) = match classification {
            Classification::DirectInterpreter => (
                Strategy::CallGraph(ManagedTarget::from_interpreter_command(command)),
                None,
            ),
            Classification::ExplicitScript => (
                Strategy::CallGraph(ManagedTarget::from_script(&self.default_interpreter, command)),
                None,
            ),
            Classification::KnownManagedTool => self.resolve(command),
            Classification::Opaque if self.resolve_unknown => self.resolve(command),
            Classification::Opaque => (Strategy::WallClock(command.clone()), None),
        };

        Plan {
            classification,
            strategy,
            fallback,
        }
    }

    fn resolve(&self, command: &Command) -> (Strategy, Option<FallbackReason>) {
        match self.resolver.resolve(command) {
            Resolution::Resolved(target) => {
                (Strategy::CallGraph(ManagedTarget::from_resolved(target)), None)
            }
            Resolution::Fallback(reason) => {
                info!(%command, %reason, "falling back to wall-clock timing");
                (Strategy::WallClock(command.clone()), Some(reason))
            }
        }
    }

    /// Profile one command
    pub fn profile(&self, command: &Command) -> ProfileRun {
        let plan = self.plan(command);
        info!(
            %command,
            classification = ?plan.classification,
            strategy = plan.strategy.label(),
            "profiling"
        );

        let (outcome, collected) = self.executor.execute(&plan.strategy);
        let timings = match collected {
            Collected::Samples(samples) => self.normalizer.normalize(&samples),
            Collected::WallClock { key, record } => std::iter::once((key, record)).collect(),
            Collected::Nothing => TimingMap::new(),
        };
        debug!(call_sites = timings.len(), exit_code = outcome.exit_code, "run complete");

        ProfileRun {
            command: command.to_string(),
            classification: plan.classification,
            strategy: plan.strategy.label(),
            fallback: plan.fallback.map(|r| r.to_string()),
            outcome,
            timings,
        }
    }
}

/// Profile a whitespace-separated command line with default settings,
/// print the text report to stdout and return the timing map
pub fn profile_command(command_line: &str, top_n: usize) -> Result<TimingMap, CommandError> {
    let command = Command::parse(command_line)?;
    let run = Profiler::default().profile(&command);
    println!("{}", run.render(top_n));
    Ok(run.timings)
}
