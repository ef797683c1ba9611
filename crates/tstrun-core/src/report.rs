use std::path::Path;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::executor::{Mode, Outcome};
use crate::REPORT_SCHEMA_VERSION;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixtureResult {
    pub path: String,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub ok: usize,
    pub updated: usize,
    pub compile_errors: usize,
    pub diff_mismatches: usize,
    pub malformed: usize,
}

/// Aggregate of one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub mode: Mode,
    pub fixtures: Vec<FixtureResult>,
    /// Fixtures whose artifacts were removed by a clean-only pass.
    pub cleaned: usize,
}

#[derive(Debug, Serialize)]
struct ToolInfo {
    name: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
struct ReportDoc<'a> {
    schema_version: &'static str,
    tool: ToolInfo,
    mode: Mode,
    summary: Summary,
    cleaned: usize,
    fixtures: &'a [FixtureResult],
}

impl RunReport {
    pub fn new(mode: Mode) -> Self {
        RunReport {
            mode,
            fixtures: Vec::new(),
            cleaned: 0,
        }
    }

    pub fn record(&mut self, path: impl Into<String>, outcome: Outcome) {
        self.fixtures.push(FixtureResult {
            path: path.into(),
            outcome,
        });
    }

    pub fn summary(&self) -> Summary {
        let mut s = Summary {
            total: self.fixtures.len(),
            ..Summary::default()
        };
        for f in &self.fixtures {
            match f.outcome {
                Outcome::Ok => s.ok += 1,
                Outcome::Updated => s.updated += 1,
                Outcome::CompileError => s.compile_errors += 1,
                Outcome::DiffMismatch => s.diff_mismatches += 1,
                Outcome::Malformed => s.malformed += 1,
            }
        }
        s.failed = s.compile_errors + s.diff_mismatches + s.malformed;
        s.passed = s.total - s.failed;
        s
    }

    pub fn failed(&self) -> usize {
        self.summary().failed
    }

    /// The console summary line, e.g. `3 / 4 tests passed`.
    pub fn summary_line(&self) -> String {
        let s = self.summary();
        format!("{} / {} tests passed", s.passed, s.total)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let doc = ReportDoc {
            schema_version: REPORT_SCHEMA_VERSION,
            tool: ToolInfo {
                name: "tstrun",
                version: env!("CARGO_PKG_VERSION"),
            },
            mode: self.mode,
            summary: self.summary(),
            cleaned: self.cleaned,
            fixtures: &self.fixtures,
        };
        Ok(serde_json::to_string(&doc)? + "\n")
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = self.to_json().map_err(|e| Error::io(path, e.into()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        std::fs::write(path, json.as_bytes()).map_err(|e| Error::io(path, e))
    }
}
