//! Fixture files and the artifacts derived from them.
//!
//! A fixture `add.tst` owns four sibling artifacts sharing its base name:
//! `add.syp` (source section), `add.exp` (expected section), `add.ll`
//! (written by the compiler), and `add.err` (written on failure).

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::process::ProcessOutput;

/// Separates the source section from the expected-output section.
pub const DELIMITER: &str = "========";

pub const FIXTURE_EXT: &str = "tst";
pub const SOURCE_EXT: &str = "syp";
pub const EXPECTED_EXT: &str = "exp";
pub const GENERATED_EXT: &str = "ll";
pub const ERROR_LOG_EXT: &str = "err";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifacts {
    pub fixture: PathBuf,
    pub source: PathBuf,
    pub expected: PathBuf,
    pub generated: PathBuf,
    pub error_log: PathBuf,
}

impl Artifacts {
    pub fn for_fixture(fixture: &Path) -> Self {
        Artifacts {
            fixture: fixture.to_path_buf(),
            source: fixture.with_extension(SOURCE_EXT),
            expected: fixture.with_extension(EXPECTED_EXT),
            generated: fixture.with_extension(GENERATED_EXT),
            error_log: fixture.with_extension(ERROR_LOG_EXT),
        }
    }

    /// Artifacts removed by [`purge`], in deletion order.
    fn derived(&self) -> [&Path; 4] {
        [
            &self.source,
            &self.generated,
            &self.expected,
            &self.error_log,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Written,
    /// The fixture does not hold exactly two sections; nothing was written.
    Malformed { sections: usize },
}

/// Splits a fixture into its source and expected artifacts.
pub fn split(artifacts: &Artifacts) -> Result<Split> {
    let text = read_text(&artifacts.fixture)?;
    let sections: Vec<&str> = text.split(DELIMITER).collect();
    let [source, expected] = sections.as_slice() else {
        tracing::debug!(
            fixture = %artifacts.fixture.display(),
            sections = sections.len(),
            "malformed fixture"
        );
        return Ok(Split::Malformed {
            sections: sections.len(),
        });
    };

    write_text(&artifacts.source, source)?;
    write_text(&artifacts.expected, expected)?;
    tracing::debug!(fixture = %artifacts.fixture.display(), "split fixture");
    Ok(Split::Written)
}

/// Rewrites the fixture from its source artifact and the compiler's output.
pub fn rebuild(artifacts: &Artifacts) -> Result<()> {
    let source = read_text(&artifacts.source)?;
    let generated = read_text(&artifacts.generated)?;

    let mut out = String::with_capacity(source.len() + DELIMITER.len() + 2 + generated.len());
    out.push_str(&source);
    out.push_str(DELIMITER);
    out.push_str("\n\n");
    out.push_str(&generated);

    write_text(&artifacts.fixture, &out)?;
    tracing::debug!(fixture = %artifacts.fixture.display(), "rebuilt fixture");
    Ok(())
}

/// Deletes every derived artifact. Missing files are skipped.
pub fn purge(artifacts: &Artifacts) -> Result<()> {
    for path in artifacts.derived() {
        remove_if_present(path)?;
    }
    tracing::debug!(fixture = %artifacts.fixture.display(), "purged artifacts");
    Ok(())
}

/// Deletes compiler output left over from an earlier run, so only output
/// written by the next compile is ever diffed.
pub fn discard_generated(artifacts: &Artifacts) -> Result<()> {
    remove_if_present(&artifacts.generated)
}

/// Records a failed step: captured stderr, then stdout.
pub fn write_error_log(artifacts: &Artifacts, out: &ProcessOutput) -> Result<()> {
    let mut log = String::with_capacity(out.stderr.len() + out.stdout.len());
    log.push_str(&out.stderr);
    log.push_str(&out.stdout);
    if out.timed_out {
        log.push_str("\n[tstrun] process killed after timeout\n");
    }
    if out.stderr_truncated || out.stdout_truncated {
        log.push_str("\n[tstrun] captured output truncated\n");
    }
    write_text(&artifacts.error_log, &log)
}

fn remove_if_present(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(Error::io(path, err)),
    }
}

/// Invalid UTF-8 is replaced rather than failing the batch.
fn read_text(path: &Path) -> Result<String> {
    let raw = std::fs::read(path).map_err(|e| Error::io(path, e))?;
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

fn write_text(path: &Path, text: &str) -> Result<()> {
    std::fs::write(path, text.as_bytes()).map_err(|e| Error::io(path, e))
}
