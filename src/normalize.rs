//! Sample normalization
//!
//! Turns raw per-call-site samples into a [`TimingMap`] keyed by a readable
//! call-site identifier, dropping bootstrap noise along the way.
//!
//! Filters applied in [`NormalizeMode::Detailed`], in order:
//! 1. synthetic origins at or below `synthetic_epsilon`
//! 2. symbols or origins matching a noise pattern
//! 3. cumulative time below `min_cumulative`
//! 4. origin-rule floors and symbol keywords for recognized libraries
//!
//! Two samples that normalize to the same key overwrite each other
//! (last write wins). Keys embed origin stem, symbol and line, which the
//! call-graph engine guarantees unique per call site, so a collision means
//! two files in different directories share a stem and define the same
//! symbol on the same line; the earlier entry is lost.

use crate::config::{NormalizeConfig, ProfilerConfig};
use crate::origin::{file_name, file_stem, OriginRegistry, Tier};
use crate::samples::RawSample;
use serde::Serialize;
use std::collections::hash_map::{self, HashMap};
use std::time::Duration;
use tracing::debug;

/// Origin tag of the single record synthesized for opaque commands
pub const WHOLE_PROCESS_ORIGIN: &str = "opaque/whole-process";

/// Symbol of the single record synthesized for opaque commands
pub const WHOLE_PROCESS_SYMBOL: &str = "total_execution";

/// Normalizer flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizeMode {
    /// Package-aware filtering with priority tagging
    #[default]
    Detailed,
    /// Legacy mode: synthetic-origin filter only, `file.ext:symbol:line` keys
    Basic,
}

impl NormalizeMode {
    /// Rows per report view when the caller gives no limit
    pub fn default_top_n(self) -> usize {
        match self {
            Self::Detailed => 20,
            Self::Basic => 10,
        }
    }
}

/// Timing for one call site
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimingRecord {
    pub origin: String,
    pub symbol: String,
    pub line: u32,
    /// Seconds including callees
    pub cumulative_time: f64,
    /// Seconds excluding callees
    pub self_time: f64,
    pub call_count: u64,
    /// `cumulative_time / call_count`, or 0 without calls
    pub avg_time: f64,
    /// Defined in the primary package under study
    pub is_priority: bool,
}

impl TimingRecord {
    pub fn new(
        origin: impl Into<String>,
        symbol: impl Into<String>,
        line: u32,
        call_count: u64,
        self_time: f64,
        cumulative_time: f64,
    ) -> Self {
        let avg_time = if call_count > 0 {
            cumulative_time / call_count as f64
        } else {
            0.0
        };
        Self {
            origin: origin.into(),
            symbol: symbol.into(),
            line,
            cumulative_time,
            self_time,
            call_count,
            avg_time,
            is_priority: false,
        }
    }

    fn from_sample(sample: &RawSample) -> Self {
        Self::new(
            sample.origin.clone(),
            sample.symbol.clone(),
            sample.line,
            sample.call_count,
            sample.self_time,
            sample.cumulative_time,
        )
    }

    /// Single record standing for a whole opaque process
    pub fn whole_process(wall: Duration) -> Self {
        let secs = wall.as_secs_f64();
        Self::new(WHOLE_PROCESS_ORIGIN, WHOLE_PROCESS_SYMBOL, 0, 1, secs, secs)
    }

    /// Self time as a share of cumulative time, in percent
    pub fn self_percent(&self) -> f64 {
        if self.cumulative_time > 0.0 {
            self.self_time / self.cumulative_time * 100.0
        } else {
            0.0
        }
    }
}

/// Display key of the whole-process record for a command line
pub fn whole_process_key(command_text: &str) -> String {
    format!("{}:{}:0", command_text, WHOLE_PROCESS_SYMBOL)
}

/// Call-site key to timing record; iteration order carries no meaning
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TimingMap {
    records: HashMap<String, TimingRecord>,
}

impl TimingMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, returning the one it replaced
    pub fn insert(&mut self, key: String, record: TimingRecord) -> Option<TimingRecord> {
        self.records.insert(key, record)
    }

    pub fn get(&self, key: &str) -> Option<&TimingRecord> {
        self.records.get(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> hash_map::Iter<'_, String, TimingRecord> {
        self.records.iter()
    }

    pub fn keys(&self) -> hash_map::Keys<'_, String, TimingRecord> {
        self.records.keys()
    }
}

impl<'a> IntoIterator for &'a TimingMap {
    type Item = (&'a String, &'a TimingRecord);
    type IntoIter = hash_map::Iter<'a, String, TimingRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl IntoIterator for TimingMap {
    type Item = (String, TimingRecord);
    type IntoIter = hash_map::IntoIter<String, TimingRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl FromIterator<(String, TimingRecord)> for TimingMap {
    fn from_iter<I: IntoIterator<Item = (String, TimingRecord)>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

/// Why a sample was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DropReason {
    Synthetic,
    Noise,
    Floor,
    Library,
}

#[derive(Debug, Default)]
struct DropCounts {
    synthetic: usize,
    noise: usize,
    floor: usize,
    library: usize,
}

impl DropCounts {
    fn record(&mut self, reason: DropReason) {
        match reason {
            DropReason::Synthetic => self.synthetic += 1,
            DropReason::Noise => self.noise += 1,
            DropReason::Floor => self.floor += 1,
            DropReason::Library => self.library += 1,
        }
    }
}

/// Sample normalizer
#[derive(Debug)]
pub struct Normalizer {
    mode: NormalizeMode,
    config: NormalizeConfig,
    origins: OriginRegistry,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(NormalizeMode::default(), &ProfilerConfig::default())
    }
}

impl Normalizer {
    pub fn new(mode: NormalizeMode, config: &ProfilerConfig) -> Self {
        Self::with_registry(
            mode,
            config.normalize.clone(),
            OriginRegistry::from_rules(&config.origins),
        )
    }

    pub fn with_registry(mode: NormalizeMode, config: NormalizeConfig, origins: OriginRegistry) -> Self {
        Self {
            mode,
            config,
            origins,
        }
    }

    pub fn mode(&self) -> NormalizeMode {
        self.mode
    }

    /// Origin classifiers, for registering additional strategies
    pub fn origins_mut(&mut self) -> &mut OriginRegistry {
        &mut self.origins
    }

    pub fn normalize(&self, samples: &[RawSample]) -> TimingMap {
        let mut timings = TimingMap::new();
        let mut dropped = DropCounts::default();

        for sample in samples {
            let entry = match self.mode {
                NormalizeMode::Detailed => self.detailed(sample),
                NormalizeMode::Basic => self.basic(sample),
            };
            match entry {
                Ok((key, record)) => {
                    if timings.insert(key.clone(), record).is_some() {
                        debug!(%key, "call-site key collision, keeping later sample");
                    }
                }
                Err(reason) => dropped.record(reason),
            }
        }

        debug!(
            mode = ?self.mode,
            kept = timings.len(),
            synthetic = dropped.synthetic,
            noise = dropped.noise,
            floor = dropped.floor,
            library = dropped.library,
            "normalized samples"
        );
        timings
    }

    fn basic(&self, sample: &RawSample) -> Result<(String, TimingRecord), DropReason> {
        // only `<...>` pseudo-files; `~` builtins stay in the legacy report
        if sample.origin.starts_with('<') && sample.cumulative_time < self.config.synthetic_epsilon {
            return Err(DropReason::Synthetic);
        }
        let key = format!(
            "{}:{}:{}",
            file_name(&sample.origin),
            sample.symbol,
            sample.line
        );
        Ok((key, TimingRecord::from_sample(sample)))
    }

    fn detailed(&self, sample: &RawSample) -> Result<(String, TimingRecord), DropReason> {
        let cumulative = sample.cumulative_time;

        if sample.is_synthetic() && cumulative <= self.config.synthetic_epsilon {
            return Err(DropReason::Synthetic);
        }

        let noisy = self.config.noise_patterns.iter().any(|p| {
            sample.symbol.contains(p.as_str()) || sample.origin.contains(p.as_str())
        });
        if noisy {
            return Err(DropReason::Noise);
        }

        if cumulative < self.config.min_cumulative {
            return Err(DropReason::Floor);
        }

        let stem = file_stem(&sample.origin);
        let mut record = TimingRecord::from_sample(sample);

        let key = match self.origins.classify(&sample.origin) {
            Some(m) => {
                if m.min_cumulative.is_some_and(|min| cumulative < min)
                    || !m.accepts_symbol(&sample.symbol)
                {
                    return Err(DropReason::Library);
                }
                record.is_priority = m.tier == Tier::Primary;
                format!("{}.{}:{}:{}", m.namespace, stem, sample.symbol, sample.line)
            }
            None => format!("{}:{}:{}", stem, sample.symbol, sample.line),
        };

        Ok((key, record))
    }
}
