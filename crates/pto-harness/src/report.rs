//! Sweep verdicts and the printed summary roster.

use chrono::{DateTime, Utc};
use serde::Serialize;

const RULE_WIDTH: usize = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExampleStatus {
    Passed,
    Failed { reason: String },
    TimedOut { limit_secs: u64 },
}

impl ExampleStatus {
    pub fn passed(&self) -> bool {
        matches!(self, ExampleStatus::Passed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExampleResult {
    /// `runtime/example`
    pub name: String,
    pub status: ExampleStatus,
    pub duration_ms: u64,
}

/// Outcome of one batch sweep.
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub results: Vec<ExampleResult>,
    pub duration_ms: u64,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.status.passed()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.total() - self.passed_count()
    }

    /// True iff at least one example ran and none failed.
    pub fn success(&self) -> bool {
        self.total() > 0 && self.failed_count() == 0
    }

    /// Human-readable summary with the passed and failed rosters.
    pub fn render(&self) -> String {
        let rule = "=".repeat(RULE_WIDTH);
        let mut out = Vec::new();
        out.push(rule.clone());
        out.push("SUMMARY".to_string());
        out.push(rule.clone());
        out.push(format!("Total: {}", self.total()));
        out.push(format!("Passed: {}", self.passed_count()));
        out.push(format!("Failed: {}", self.failed_count()));

        let passed: Vec<_> = self.results.iter().filter(|r| r.status.passed()).collect();
        if !passed.is_empty() {
            out.push(String::new());
            out.push("Passed examples:".to_string());
            for r in passed {
                out.push(format!("  ✓ {} ({})", r.name, format_duration(r.duration_ms)));
            }
        }

        let failed: Vec<_> = self.results.iter().filter(|r| !r.status.passed()).collect();
        if !failed.is_empty() {
            out.push(String::new());
            out.push("Failed examples:".to_string());
            for r in failed {
                let note = match &r.status {
                    ExampleStatus::TimedOut { limit_secs } => format!("timed out after {}s", limit_secs),
                    _ => format_duration(r.duration_ms),
                };
                out.push(format!("  ✗ {} ({})", r.name, note));
            }
        } else if self.success() {
            out.push(String::new());
            out.push(rule.clone());
            out.push("ALL EXAMPLES PASSED!".to_string());
            out.push(rule);
        }

        out.join("\n")
    }
}

fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else {
        format!("{:.1}s", ms as f64 / 1000.0)
    }
}
