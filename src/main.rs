use anyhow::{bail, Context, Result};
use clap::Parser;
use cmdprof::cli::{Cli, OutputFormat};
use cmdprof::command::Command;
use cmdprof::config::ProfilerConfig;
use cmdprof::normalize::NormalizeMode;
use cmdprof::profiler::Profiler;
use cmdprof::report;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

fn load_config(args: &Cli) -> Result<ProfilerConfig> {
    let mut config = match &args.config {
        Some(path) => ProfilerConfig::from_toml(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ProfilerConfig::default(),
    };
    if let Some(secs) = args.timeout {
        config.timeout_secs = secs;
    }
    config.validate().context("Invalid profiler configuration")?;
    Ok(config)
}

fn target_command(tokens: Vec<String>) -> Result<Command> {
    let command = if let [line] = tokens.as_slice() {
        Command::parse(line)
    } else {
        Command::new(tokens)
    };
    command.context("Invalid command")
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.debug);

    let config = load_config(&args)?;
    let mode = if args.basic {
        NormalizeMode::Basic
    } else {
        NormalizeMode::Detailed
    };
    let top_n = args.top.unwrap_or_else(|| mode.default_top_n());
    if top_n == 0 {
        bail!("--top must be at least 1");
    }

    let command = target_command(args.command)?;
    let profiler = Profiler::new(&config, mode);
    let run = profiler.profile(&command);

    match args.format {
        OutputFormat::Text => print!("{}", run.render(top_n)),
        OutputFormat::Json => println!(
            "{}",
            report::render_json(&run, top_n).context("Failed to serialize report")?
        ),
    }

    Ok(())
}
