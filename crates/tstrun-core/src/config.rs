use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::normalize::Normalizer;
use crate::process::{Invocation, DEFAULT_MAX_OUTPUT_BYTES};
use crate::CONFIG_SCHEMA_VERSION;

pub const CONFIG_FILE_NAME: &str = "tstrun.json";
pub const DEFAULT_COMPILER: &str = "../saphyr";
pub const DEFAULT_DIFF: &str = "diff";
/// Unified output, ignoring all whitespace and blank-line-only changes.
pub const DEFAULT_DIFF_ARGS: &[&str] = &["-uwB"];

pub const ENV_COMPILER: &str = "TSTRUN_COMPILER";
pub const ENV_DIFF: &str = "TSTRUN_DIFF";

/// On-disk `tstrun.json`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub schema_version: String,
    #[serde(default)]
    pub compiler: Option<PathBuf>,
    #[serde(default)]
    pub compiler_args: Option<Vec<String>>,
    #[serde(default)]
    pub diff: Option<PathBuf>,
    #[serde(default)]
    pub diff_args: Option<Vec<String>>,
    #[serde(default)]
    pub normalize: Option<Vec<String>>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub max_output_bytes: Option<usize>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| Error::io(path, e))?;
        let file: ConfigFile = serde_json::from_slice(&bytes).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            message: format!("parse JSON: {e}"),
        })?;
        if file.schema_version.trim() != CONFIG_SCHEMA_VERSION {
            return Err(Error::Config {
                path: path.to_path_buf(),
                message: format!(
                    "schema_version mismatch: expected {CONFIG_SCHEMA_VERSION} got {:?}",
                    file.schema_version
                ),
            });
        }
        Ok(file)
    }
}

/// Looks for `tstrun.json` in `start` and then each parent directory.
pub fn find_config_upwards(start: &Path) -> Option<PathBuf> {
    let start = std::fs::canonicalize(start).unwrap_or_else(|_| start.to_path_buf());
    let mut dir: Option<&Path> = Some(start.as_path());
    while let Some(d) = dir {
        let cand = d.join(CONFIG_FILE_NAME);
        if cand.is_file() {
            return Some(cand);
        }
        dir = d.parent();
    }
    None
}

/// Everything the executor needs to know about the external collaborators.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub compiler: OsString,
    pub compiler_args: Vec<String>,
    pub diff: OsString,
    pub diff_args: Vec<String>,
    pub normalizer: Normalizer,
    pub timeout_ms: Option<u64>,
    pub max_output_bytes: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig {
            compiler: OsString::from(DEFAULT_COMPILER),
            compiler_args: Vec::new(),
            diff: OsString::from(DEFAULT_DIFF),
            diff_args: DEFAULT_DIFF_ARGS.iter().map(|s| s.to_string()).collect(),
            normalizer: Normalizer::default(),
            timeout_ms: None,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

impl RunnerConfig {
    /// Defaults overlaid with a config file loaded from `path`.
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = ConfigFile::load(path)?;
        let mut cfg = RunnerConfig::default();

        if let Some(compiler) = file.compiler {
            cfg.compiler = resolve_relative_to(path, compiler).into_os_string();
        }
        if let Some(args) = file.compiler_args {
            cfg.compiler_args = args;
        }
        if let Some(diff) = file.diff {
            cfg.diff = diff.into_os_string();
        }
        if let Some(args) = file.diff_args {
            cfg.diff_args = args;
        }
        if let Some(patterns) = file.normalize {
            cfg.normalizer = Normalizer::new(&patterns).map_err(|e| Error::Config {
                path: path.to_path_buf(),
                message: format!("invalid normalize pattern: {e}"),
            })?;
        }
        cfg.timeout_ms = file.timeout_ms.or(cfg.timeout_ms);
        if let Some(cap) = file.max_output_bytes {
            cfg.max_output_bytes = cap;
        }
        Ok(cfg)
    }

    /// Applies `TSTRUN_COMPILER` / `TSTRUN_DIFF` from `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<OsString>) {
        if let Some(v) = lookup(ENV_COMPILER).filter(|v| !v.is_empty()) {
            self.compiler = v;
        }
        if let Some(v) = lookup(ENV_DIFF).filter(|v| !v.is_empty()) {
            self.diff = v;
        }
    }

    pub fn compile_invocation(&self, source: &Path) -> Invocation {
        Invocation::new(&self.compiler)
            .args(&self.compiler_args)
            .arg(source)
            .timeout_ms(self.timeout_ms)
            .max_output_bytes(self.max_output_bytes)
    }

    pub fn diff_invocation(&self, expected: &Path, generated: &Path) -> Invocation {
        Invocation::new(&self.diff)
            .args(&self.diff_args)
            .arg(expected)
            .arg(generated)
            .timeout_ms(self.timeout_ms)
            .max_output_bytes(self.max_output_bytes)
    }
}

/// A compiler path containing a separator is taken relative to the config file.
fn resolve_relative_to(config_path: &Path, program: PathBuf) -> PathBuf {
    if program.is_absolute() || program.components().count() == 1 {
        return program;
    }
    match config_path.parent() {
        Some(dir) => dir.join(program),
        None => program,
    }
}
