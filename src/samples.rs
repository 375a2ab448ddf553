//! Raw call-graph samples as written by the instrumentation driver

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SampleError {
    #[error("Failed to read sample artifact: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse sample artifact: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One call site as reported by the call-graph engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    /// Defining file, or a synthetic marker such as `~` or `<string>`
    pub origin: String,
    pub line: u32,
    pub symbol: String,
    /// Total calls, recursive ones included
    pub call_count: u64,
    /// Non-recursive calls
    #[serde(default)]
    pub primitive_calls: u64,
    /// Seconds spent in the call site itself
    pub self_time: f64,
    /// Seconds spent in the call site and its callees
    pub cumulative_time: f64,
}

impl RawSample {
    /// Synthetic origins are interpreter internals, not files on disk
    pub fn is_synthetic(&self) -> bool {
        self.origin.starts_with('<') || self.origin.starts_with('~')
    }
}

#[derive(Debug, Deserialize)]
struct SampleArtifact {
    samples: Vec<RawSample>,
}

/// Parse a sample artifact document
pub fn parse_samples(json: &str) -> Result<Vec<RawSample>, SampleError> {
    let artifact: SampleArtifact = serde_json::from_str(json)?;
    Ok(artifact.samples)
}

/// Read a sample artifact from disk
pub fn read_samples(path: &Path) -> Result<Vec<RawSample>, SampleError> {
    let content = fs::read_to_string(path)?;
    parse_samples(&content)
}
