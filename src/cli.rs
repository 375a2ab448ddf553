//! CLI argument parsing for cmdprof

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Report output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable tables (default)
    Text,
    /// JSON document for machine parsing
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "cmdprof")]
#[command(version)]
#[command(about = "Profile a command: call-graph timing for Python targets, wall-clock for the rest", long_about = None)]
pub struct Cli {
    /// Rows per report view (default: 20, or 10 with --basic)
    #[arg(short = 'n', long = "top", value_name = "N")]
    pub top: Option<usize>,

    /// Kill the command after this many seconds (overrides the config file)
    #[arg(short = 't', long = "timeout", value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Load profiler configuration from a TOML file
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Basic normalization: file-name keys, no library tiers or noise filtering
    #[arg(long = "basic")]
    pub basic: bool,

    /// Output format (text or json)
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Enable debug tracing output to stderr
    #[arg(long = "debug")]
    pub debug: bool,

    /// Command to profile; a single quoted argument is split on whitespace
    #[arg(value_name = "COMMAND", required = true, trailing_var_arg = true)]
    pub command: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_command() {
        let cli = Cli::parse_from(["cmdprof", "--", "echo", "hello"]);
        assert_eq!(cli.command, vec!["echo", "hello"]);
    }

    #[test]
    fn test_cli_requires_command() {
        assert!(Cli::try_parse_from(["cmdprof"]).is_err());
    }

    #[test]
    fn test_cli_interpreter_flags_belong_to_command() {
        let cli = Cli::parse_from(["cmdprof", "python3", "-c", "print(42)"]);
        assert_eq!(cli.command, vec!["python3", "-c", "print(42)"]);
        assert!(!cli.debug);
    }

    #[test]
    fn test_cli_top_and_timeout() {
        let cli = Cli::parse_from(["cmdprof", "-n", "5", "--timeout", "30", "yolo", "predict"]);
        assert_eq!(cli.top, Some(5));
        assert_eq!(cli.timeout, Some(30));
        assert_eq!(cli.command, vec!["yolo", "predict"]);
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["cmdprof", "ls"]);
        assert_eq!(cli.top, None);
        assert_eq!(cli.timeout, None);
        assert!(cli.config.is_none());
        assert!(!cli.basic);
        assert_eq!(cli.format, OutputFormat::Text);
    }

    #[test]
    fn test_cli_format_json() {
        let cli = Cli::parse_from(["cmdprof", "--format", "json", "--basic", "--", "ls", "-la"]);
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(cli.basic);
        assert_eq!(cli.command, vec!["ls", "-la"]);
    }

    #[test]
    fn test_cli_rejects_unknown_format() {
        assert!(Cli::try_parse_from(["cmdprof", "--format", "csv", "ls"]).is_err());
    }

    #[test]
    fn test_cli_debug_flag() {
        let cli = Cli::parse_from(["cmdprof", "--debug", "--config", "p.toml", "ls"]);
        assert!(cli.debug);
        assert_eq!(cli.config, Some(PathBuf::from("p.toml")));
    }
}
