//! Command classification
//!
//! Decides whether a command runs managed code that can be instrumented at
//! call-site granularity, or an opaque program that can only be timed whole.

use crate::command::Command;
use crate::config::ProfilerConfig;
use crate::origin::file_name;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;

/// How a command relates to managed code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// The program token is an interpreter (`python3 train.py`)
    DirectInterpreter,
    /// A lone managed-language source file (`train.py`)
    ExplicitScript,
    /// A registered tool that launches managed code (`yolo predict`)
    KnownManagedTool,
    /// Anything else; only whole-process timing is possible
    Opaque,
}

/// Pure classifier over the configured name sets
#[derive(Debug, Clone)]
pub struct CommandClassifier {
    interpreter_names: BTreeSet<String>,
    interpreter_suffixes: Vec<String>,
    script_extensions: BTreeSet<String>,
    managed_tools: BTreeSet<String>,
}

impl Default for CommandClassifier {
    fn default() -> Self {
        Self::from_config(&ProfilerConfig::default())
    }
}

impl CommandClassifier {
    pub fn from_config(config: &ProfilerConfig) -> Self {
        Self {
            interpreter_names: config.interpreter_names.clone(),
            interpreter_suffixes: config.interpreter_suffixes.clone(),
            script_extensions: config.script_extensions.clone(),
            managed_tools: config.managed_tools.clone(),
        }
    }

    /// Register another managed-ecosystem tool name
    pub fn add_managed_tool(&mut self, name: impl Into<String>) {
        self.managed_tools.insert(name.into());
    }

    pub fn classify(&self, command: &Command) -> Classification {
        let program = command.program();

        if self.is_interpreter(program) {
            Classification::DirectInterpreter
        } else if command.len() == 1 && self.is_script(program) {
            Classification::ExplicitScript
        } else if self.managed_tools.contains(program) {
            Classification::KnownManagedTool
        } else {
            Classification::Opaque
        }
    }

    /// Interpreter check on the final path component of the program token
    pub fn is_interpreter(&self, program: &str) -> bool {
        let name = file_name(program);
        self.interpreter_names.contains(name)
            || self
                .interpreter_suffixes
                .iter()
                .any(|suffix| name.ends_with(suffix.as_str()))
    }

    fn is_script(&self, token: &str) -> bool {
        Path::new(token)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.script_extensions.contains(ext))
    }
}
