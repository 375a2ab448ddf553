//! Ranked report views and rendering
//!
//! Three views are computed independently from the same [`TimingMap`]:
//! by cumulative time (primary-package call sites first), by call count,
//! and by self time.

use crate::execute::ExecutionOutcome;
use crate::normalize::{TimingMap, TimingRecord};
use crate::profiler::ProfileRun;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt::Write;

/// Width of the call-site column; longer keys are cut with an ellipsis
pub const KEY_WIDTH: usize = 60;

/// Ordering of a report view, always descending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortCriterion {
    CumulativeTime,
    CallCount,
    SelfTime,
}

/// One ranked, truncated view over a timing map
#[derive(Debug, Clone, PartialEq)]
pub struct ReportView<'a> {
    pub criterion: SortCriterion,
    pub rows: Vec<(&'a str, &'a TimingRecord)>,
}

fn compare(criterion: SortCriterion, a: &TimingRecord, b: &TimingRecord) -> Ordering {
    match criterion {
        SortCriterion::CumulativeTime => b
            .is_priority
            .cmp(&a.is_priority)
            .then(b.cumulative_time.total_cmp(&a.cumulative_time)),
        SortCriterion::CallCount => b.call_count.cmp(&a.call_count),
        SortCriterion::SelfTime => b.self_time.total_cmp(&a.self_time),
    }
}

impl<'a> ReportView<'a> {
    /// Rank `timings` by `criterion`, keeping at most `top_n` rows
    ///
    /// Ties fall back to key order so repeated runs print identically.
    pub fn rank(timings: &'a TimingMap, criterion: SortCriterion, top_n: usize) -> Self {
        let mut rows: Vec<(&'a str, &'a TimingRecord)> =
            timings.iter().map(|(k, r)| (k.as_str(), r)).collect();
        rows.sort_by(|(ka, a), (kb, b)| compare(criterion, a, b).then_with(|| ka.cmp(kb)));
        rows.truncate(top_n);
        Self { criterion, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Shorten a key to the display width, marking the cut with `...`
pub fn truncate_key(key: &str, width: usize) -> String {
    if key.chars().count() <= width {
        return key.to_string();
    }
    let keep = width.saturating_sub(3);
    let mut out: String = key.chars().take(keep).collect();
    out.push_str("...");
    out
}

/// Render the execution summary and the three ranked views as text
pub fn render(timings: &TimingMap, outcome: &ExecutionOutcome, top_n: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Execution Results ===\n{}\n", outcome.summary());

    if timings.is_empty() {
        out.push_str("No timing data available\n");
        return out;
    }

    out.push_str("=== Performance Analysis ===\n\n");
    render_cumulative(&mut out, &ReportView::rank(timings, SortCriterion::CumulativeTime, top_n), top_n);
    render_most_called(&mut out, &ReportView::rank(timings, SortCriterion::CallCount, top_n));
    render_self_time(&mut out, &ReportView::rank(timings, SortCriterion::SelfTime, top_n), top_n);
    out
}

fn render_cumulative(out: &mut String, view: &ReportView<'_>, top_n: usize) {
    let _ = writeln!(out, "TOP {} SLOWEST FUNCTIONS (Cumulative Time):", top_n);
    let _ = writeln!(
        out,
        "{:<60} {:<8} {:<9} {:<6} {:<8}",
        "Function", "Cum Time", "Self Time", "Calls", "Avg"
    );
    let _ = writeln!(out, "{}", "-".repeat(95));
    for (key, r) in &view.rows {
        let _ = writeln!(
            out,
            "{:<60} {:<8.3} {:<9.3} {:<6} {:<8.5}",
            truncate_key(key, KEY_WIDTH),
            r.cumulative_time,
            r.self_time,
            r.call_count,
            r.avg_time
        );
    }
}

fn render_most_called(out: &mut String, view: &ReportView<'_>) {
    let _ = writeln!(out, "\nMOST CALLED FUNCTIONS:");
    let _ = writeln!(
        out,
        "{:<60} {:<6} {:<8} {:<9} {:<8}",
        "Function", "Calls", "Cum Time", "Self Time", "Avg"
    );
    let _ = writeln!(out, "{}", "-".repeat(95));
    for (key, r) in &view.rows {
        let _ = writeln!(
            out,
            "{:<60} {:<6} {:<8.3} {:<9.3} {:<8.5}",
            truncate_key(key, KEY_WIDTH),
            r.call_count,
            r.cumulative_time,
            r.self_time,
            r.avg_time
        );
    }
}

fn render_self_time(out: &mut String, view: &ReportView<'_>, top_n: usize) {
    let _ = writeln!(out, "\nTOP {} BY SELF TIME (Excluding Subfunctions):", top_n);
    let _ = writeln!(
        out,
        "{:<60} {:<9} {:<8} {:<6} {:<6}",
        "Function", "Self Time", "Cum Time", "Calls", "Self %"
    );
    let _ = writeln!(out, "{}", "-".repeat(95));
    for (key, r) in &view.rows {
        let _ = writeln!(
            out,
            "{:<60} {:<9.3} {:<8.3} {:<6} {:<6.1}",
            truncate_key(key, KEY_WIDTH),
            r.self_time,
            r.cumulative_time,
            r.call_count,
            r.self_percent()
        );
    }
}

/// A ranked row in JSON output
#[derive(Debug, Clone, Serialize)]
pub struct JsonRow<'a> {
    pub key: &'a str,
    #[serde(flatten)]
    pub record: &'a TimingRecord,
    pub self_percent: f64,
}

/// The three ranked views in JSON output
#[derive(Debug, Clone, Serialize)]
pub struct JsonViews<'a> {
    pub by_cumulative_time: Vec<JsonRow<'a>>,
    pub by_call_count: Vec<JsonRow<'a>>,
    pub by_self_time: Vec<JsonRow<'a>>,
}

/// Root JSON output structure
#[derive(Debug, Clone, Serialize)]
pub struct JsonReport<'a> {
    /// Format version identifier
    pub version: &'static str,
    pub format: &'static str,
    pub command: &'a str,
    pub classification: crate::classify::Classification,
    pub strategy: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<&'a str>,
    pub outcome: &'a ExecutionOutcome,
    pub total_call_sites: usize,
    pub views: JsonViews<'a>,
}

fn json_rows<'a>(view: ReportView<'a>) -> Vec<JsonRow<'a>> {
    view.rows
        .into_iter()
        .map(|(key, record)| JsonRow {
            key,
            record,
            self_percent: record.self_percent(),
        })
        .collect()
}

/// Render a profile run as pretty-printed JSON
pub fn render_json(run: &ProfileRun, top_n: usize) -> serde_json::Result<String> {
    let timings = &run.timings;
    let report = JsonReport {
        version: "1.0",
        format: "cmdprof-json-v1",
        command: &run.command,
        classification: run.classification,
        strategy: run.strategy,
        fallback: run.fallback.as_deref(),
        outcome: &run.outcome,
        total_call_sites: timings.len(),
        views: JsonViews {
            by_cumulative_time: json_rows(ReportView::rank(timings, SortCriterion::CumulativeTime, top_n)),
            by_call_count: json_rows(ReportView::rank(timings, SortCriterion::CallCount, top_n)),
            by_self_time: json_rows(ReportView::rank(timings, SortCriterion::SelfTime, top_n)),
        },
    };
    serde_json::to_string_pretty(&report)
}
