use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tracing_subscriber::EnvFilter;
use tstrun_core::config::find_config_upwards;
use tstrun_core::{discover, Mode, RunnerConfig};

#[derive(Parser, Debug)]
#[command(name = "tstrun")]
#[command(about = "Fixture-driven regression runner for the compiler.", long_about = None)]
#[command(version)]
struct Cli {
    /// Remove derived artifacts of the selected fixtures without running them.
    #[arg(short = 'c', long, group = "mode")]
    clean: bool,

    /// Run, and replace the expectation of every mismatching fixture.
    #[arg(short = 'u', long, group = "mode")]
    update: bool,

    /// Run, and keep every derived artifact for inspection.
    #[arg(short = 'd', long, group = "mode")]
    dump: bool,

    /// Directory searched recursively for `*.tst` fixtures.
    #[arg(long, value_name = "DIR", default_value = ".")]
    root: PathBuf,

    /// Config file (default: `tstrun.json` found upwards from --root).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Compiler under test (overrides config and TSTRUN_COMPILER).
    #[arg(long, value_name = "PATH")]
    compiler: Option<PathBuf>,

    /// Kill a compiler or diff run after this many milliseconds.
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Write a JSON run report.
    #[arg(long, value_name = "PATH")]
    report_out: Option<PathBuf>,

    /// Increase logging verbosity (-v: debug, -vv+: trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Name fragments selecting fixtures; a trailing extension is ignored.
    /// Fragments starting with `-` go after `--`.
    #[arg(value_name = "FRAGMENT")]
    fragments: Vec<String>,
}

impl Cli {
    fn mode(&self) -> Mode {
        if self.clean {
            Mode::CleanOnly
        } else if self.update {
            Mode::RunUpdate
        } else if self.dump {
            Mode::RunDump
        } else {
            Mode::RunClean
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match try_main(&cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(2)
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_directive = match verbose {
        0 => "tstrun=warn,tstrun_core=warn",
        1 => "tstrun=debug,tstrun_core=debug",
        _ => "tstrun=trace,tstrun_core=trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive)),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn try_main(cli: &Cli) -> Result<ExitCode> {
    let mode = cli.mode();
    let config = load_config(cli)?;

    let fixtures = discover::discover(&cli.root, &cli.fragments)
        .with_context(|| format!("discover fixtures under {}", cli.root.display()))?;
    tracing::debug!(count = fixtures.len(), mode = mode.as_str(), "selected fixtures");

    let stdout = std::io::stdout();
    let report = tstrun_core::run_batch(&cli.root, &fixtures, &config, mode, &mut stdout.lock())?;

    if let Some(path) = &cli.report_out {
        report
            .write_json(path)
            .with_context(|| format!("write report: {}", path.display()))?;
    }

    if report.failed() > 0 {
        return Ok(ExitCode::from(1));
    }
    Ok(ExitCode::SUCCESS)
}

fn load_config(cli: &Cli) -> Result<RunnerConfig> {
    let config_path = match &cli.config {
        Some(path) => Some(path.clone()),
        None => find_config_upwards(&cli.root),
    };
    let mut config = match &config_path {
        Some(path) => RunnerConfig::from_file(path)
            .with_context(|| format!("load config: {}", path.display()))?,
        None => RunnerConfig::default(),
    };
    if let Some(path) = &config_path {
        tracing::debug!(config = %path.display(), "loaded config");
    }

    config.apply_env(|key| std::env::var_os(key));
    if let Some(compiler) = &cli.compiler {
        config.compiler = resolve_cli_path(compiler).into_os_string();
    }
    if cli.timeout_ms.is_some() {
        config.timeout_ms = cli.timeout_ms;
    }
    Ok(config)
}

/// Bare program names are left for PATH lookup.
fn resolve_cli_path(path: &Path) -> PathBuf {
    if path.components().count() > 1 && !path.is_absolute() {
        if let Ok(cwd) = std::env::current_dir() {
            return cwd.join(path);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("tstrun").chain(args.iter().copied()))
            .expect("parse args")
    }

    #[test]
    fn leading_flag_selects_mode() {
        assert_eq!(parse(&[]).mode(), Mode::RunClean);
        assert_eq!(parse(&["-c"]).mode(), Mode::CleanOnly);
        assert_eq!(parse(&["--update"]).mode(), Mode::RunUpdate);
        assert_eq!(parse(&["-d", "add"]).mode(), Mode::RunDump);
    }

    #[test]
    fn bare_arguments_are_fragments_for_default_mode() {
        let cli = parse(&["add", "ops/sub.tst"]);
        assert_eq!(cli.mode(), Mode::RunClean);
        assert_eq!(cli.fragments, vec!["add", "ops/sub.tst"]);
    }

    #[test]
    fn unknown_flags_are_rejected_but_dashed_fragments_pass_after_separator() {
        assert!(Cli::try_parse_from(["tstrun", "--foo"]).is_err());

        let cli = parse(&["--", "--foo", "-neg"]);
        assert_eq!(cli.mode(), Mode::RunClean);
        assert_eq!(cli.fragments, vec!["--foo", "-neg"]);
    }

    #[test]
    fn modes_are_mutually_exclusive() {
        assert!(Cli::try_parse_from(["tstrun", "-c", "-u"]).is_err());
    }
}
