//! Per-fixture pipeline (split, compile, normalize, diff, classify) and the
//! batch loop around it.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::RunnerConfig;
use crate::discover::relative_name;
use crate::error::{Error, Result};
use crate::fixture::{self, Artifacts, Split};
use crate::process::ProcessOutput;
use crate::report::RunReport;

/// Operating mode of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Run every fixture and purge artifacts of the ones that pass.
    RunClean,
    /// Purge artifacts without running anything.
    CleanOnly,
    /// Run, and rewrite the expectation of every mismatching fixture.
    RunUpdate,
    /// Run and keep all artifacts for inspection.
    RunDump,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::RunClean => "run-clean",
            Mode::CleanOnly => "clean-only",
            Mode::RunUpdate => "run-update",
            Mode::RunDump => "run-dump",
        }
    }

    fn purges_on_success(self) -> bool {
        matches!(self, Mode::RunClean | Mode::RunUpdate)
    }

    fn updates(self) -> bool {
        matches!(self, Mode::RunUpdate)
    }
}

/// Terminal classification of one fixture in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    Ok,
    CompileError,
    DiffMismatch,
    Updated,
    Malformed,
}

impl Outcome {
    pub fn label(self) -> &'static str {
        match self {
            Outcome::Ok => "[ok]",
            Outcome::CompileError => "[compile error]",
            Outcome::DiffMismatch => "[output differs]",
            Outcome::Updated => "[updated]",
            Outcome::Malformed => "[missing section]",
        }
    }

    pub fn is_failure(self) -> bool {
        matches!(
            self,
            Outcome::CompileError | Outcome::DiffMismatch | Outcome::Malformed
        )
    }
}

/// Left-aligns fixture names to the longest name in the batch.
#[derive(Debug, Clone, Copy)]
struct StatusColumn {
    width: usize,
}

impl StatusColumn {
    fn for_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let width = names.into_iter().map(|n| n.chars().count()).max().unwrap_or(0);
        StatusColumn { width }
    }

    fn line(self, name: &str, outcome: Outcome) -> String {
        format!("{name:<width$} = {}", outcome.label(), width = self.width)
    }
}

/// Processes `fixtures` one at a time in order and prints a status line per
/// fixture plus a summary to `out`.
///
/// Per-fixture failures are classified and counted; an [`Error`] (a
/// collaborator that cannot be launched, an unwritable artifact) aborts the
/// batch.
pub fn run_batch<W: Write>(
    root: &Path,
    fixtures: &[PathBuf],
    config: &RunnerConfig,
    mode: Mode,
    out: &mut W,
) -> Result<RunReport> {
    let mut report = RunReport::new(mode);
    tracing::info!(mode = mode.as_str(), fixtures = fixtures.len(), "batch start");

    if mode == Mode::CleanOnly {
        for path in fixtures {
            fixture::purge(&Artifacts::for_fixture(path))?;
        }
        report.cleaned = fixtures.len();
        emit(out, &format!("cleaned {} fixtures", fixtures.len()))?;
        return Ok(report);
    }

    if fixtures.is_empty() {
        return Ok(report);
    }

    let names: Vec<String> = fixtures.iter().map(|p| relative_name(root, p)).collect();
    let column = StatusColumn::for_names(names.iter().map(String::as_str));

    for (path, name) in fixtures.iter().zip(names) {
        let outcome = run_fixture(path, config, mode)?;
        emit(out, &column.line(&name, outcome))?;
        report.record(name, outcome);
    }

    emit(out, &report.summary_line())?;
    let summary = report.summary();
    tracing::info!(
        passed = summary.passed,
        failed = summary.failed,
        "batch finished"
    );
    Ok(report)
}

/// Runs one fixture through the whole pipeline.
pub fn run_fixture(path: &Path, config: &RunnerConfig, mode: Mode) -> Result<Outcome> {
    let artifacts = Artifacts::for_fixture(path);
    let outcome = classify(&artifacts, config, mode)?;
    tracing::debug!(fixture = %path.display(), outcome = outcome.label(), "classified");

    if mode.purges_on_success() && !outcome.is_failure() {
        fixture::purge(&artifacts)?;
    }
    Ok(outcome)
}

fn classify(artifacts: &Artifacts, config: &RunnerConfig, mode: Mode) -> Result<Outcome> {
    if let Split::Malformed { .. } = fixture::split(artifacts)? {
        return Ok(Outcome::Malformed);
    }

    fixture::discard_generated(artifacts)?;
    let compiled = config.compile_invocation(&artifacts.source).run()?;
    if !compiled.success() {
        fixture::write_error_log(artifacts, &compiled)?;
        return Ok(Outcome::CompileError);
    }
    if !artifacts.generated.is_file() {
        let missing = missing_output_log(&compiled, &artifacts.generated);
        fixture::write_error_log(artifacts, &missing)?;
        return Ok(Outcome::CompileError);
    }

    config.normalizer.normalize_file(&artifacts.generated)?;

    let diffed = config
        .diff_invocation(&artifacts.expected, &artifacts.generated)
        .run()?;
    if diffed.success() {
        return Ok(Outcome::Ok);
    }
    if mode.updates() {
        fixture::rebuild(artifacts)?;
        return Ok(Outcome::Updated);
    }
    fixture::write_error_log(artifacts, &diffed)?;
    Ok(Outcome::DiffMismatch)
}

/// The compiler exited zero without writing its output file.
fn missing_output_log(compiled: &ProcessOutput, generated: &Path) -> ProcessOutput {
    let mut out = compiled.clone();
    out.stderr
        .push_str(&format!("compiler did not produce {}\n", generated.display()));
    out
}

fn emit<W: Write>(out: &mut W, line: &str) -> Result<()> {
    writeln!(out, "{line}").map_err(|e| Error::io("<stdout>", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_lines_share_one_column() {
        let column = StatusColumn::for_names(["add.tst", "ops/longer.tst"]);
        assert_eq!(column.line("add.tst", Outcome::Ok), "add.tst        = [ok]");
        assert_eq!(
            column.line("ops/longer.tst", Outcome::Malformed),
            "ops/longer.tst = [missing section]"
        );
    }

    #[test]
    fn only_failures_count_as_failed() {
        assert!(!Outcome::Ok.is_failure());
        assert!(!Outcome::Updated.is_failure());
        assert!(Outcome::CompileError.is_failure());
        assert!(Outcome::DiffMismatch.is_failure());
        assert!(Outcome::Malformed.is_failure());
    }

    #[test]
    fn dump_mode_keeps_artifacts() {
        assert!(Mode::RunClean.purges_on_success());
        assert!(Mode::RunUpdate.purges_on_success());
        assert!(!Mode::RunDump.purges_on_success());
        assert!(Mode::RunUpdate.updates());
        assert!(!Mode::RunDump.updates());
    }

    #[test]
    fn malformed_fixture_skips_collaborators() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.tst");
        std::fs::write(&path, "no delimiter here\n").unwrap();

        let config = RunnerConfig {
            compiler: "/nonexistent/compiler".into(),
            ..RunnerConfig::default()
        };
        let mut out = Vec::new();
        let report = run_batch(tmp.path(), &[path.clone()], &config, Mode::RunClean, &mut out)
            .unwrap();

        assert_eq!(report.failed(), 1);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "bad.tst = [missing section]\n0 / 1 tests passed\n"
        );
        assert!(!path.with_extension("syp").exists());
        assert!(!path.with_extension("exp").exists());
    }

    #[test]
    fn unlaunchable_compiler_aborts_batch() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a.tst");
        std::fs::write(&path, "x\n========\ny\n").unwrap();

        let config = RunnerConfig {
            compiler: "/nonexistent/compiler".into(),
            ..RunnerConfig::default()
        };
        let err = run_batch(tmp.path(), &[path], &config, Mode::RunClean, &mut Vec::new())
            .unwrap_err();
        assert!(matches!(err, Error::Launch { .. }), "got {err:?}");
    }

    #[test]
    fn empty_batch_prints_nothing() {
        let mut out = Vec::new();
        let report = run_batch(
            Path::new("."),
            &[],
            &RunnerConfig::default(),
            Mode::RunClean,
            &mut out,
        )
        .unwrap();
        assert!(out.is_empty());
        assert_eq!(report.summary().total, 0);
    }

    #[test]
    fn clean_only_purges_without_running() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("c.tst");
        std::fs::write(&path, "x\n========\ny\n").unwrap();
        let a = Artifacts::for_fixture(&path);
        for p in [&a.source, &a.expected, &a.generated, &a.error_log] {
            std::fs::write(p, "stale").unwrap();
        }

        let config = RunnerConfig {
            compiler: "/nonexistent/compiler".into(),
            ..RunnerConfig::default()
        };
        let mut out = Vec::new();
        let report =
            run_batch(tmp.path(), &[path.clone()], &config, Mode::CleanOnly, &mut out).unwrap();

        assert_eq!(report.cleaned, 1);
        assert_eq!(String::from_utf8(out).unwrap(), "cleaned 1 fixtures\n");
        assert!(path.exists());
        assert!(!a.source.exists() && !a.error_log.exists());
    }
}
