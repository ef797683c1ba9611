use std::ffi::{OsStr, OsString};
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Default cap on each captured stream.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 16 * 1024 * 1024;

/// A program plus its arguments, run synchronously to completion.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: OsString,
    pub args: Vec<OsString>,
    /// Wall-clock bound; the child is killed once it elapses.
    pub timeout_ms: Option<u64>,
    pub max_output_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_status: i32,
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_status == 0 && !self.timed_out
    }
}

impl Invocation {
    pub fn new(program: impl Into<OsString>) -> Self {
        Invocation {
            program: program.into(),
            args: Vec::new(),
            timeout_ms: None,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: Option<u64>) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn max_output_bytes(mut self, cap: usize) -> Self {
        self.max_output_bytes = cap;
        self
    }

    /// Renders the command line for logs and error logs.
    pub fn display(&self) -> String {
        let mut out = self.program.to_string_lossy().into_owned();
        for a in &self.args {
            out.push(' ');
            out.push_str(&a.to_string_lossy());
        }
        out
    }

    /// Launches the program and blocks until it exits.
    ///
    /// A program that cannot be started is an [`Error::Launch`]; a program that
    /// starts and fails is reported through [`ProcessOutput::exit_status`].
    pub fn run(&self) -> Result<ProcessOutput> {
        let program = self.program.to_string_lossy().into_owned();
        tracing::debug!(command = %self.display(), "invoking");

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt as _;
            // Own group, so a timeout also reaches whatever the child spawned.
            if self.timeout_ms.is_some() {
                cmd.process_group(0);
            }
        }

        let child = cmd.spawn().map_err(|source| Error::Launch {
            program: program.clone(),
            source,
        })?;
        let out = wait_child_output_capped(child, self.timeout_ms, self.max_output_bytes)
            .map_err(|source| Error::Wait { program, source })?;

        if out.timed_out {
            tracing::warn!(command = %self.display(), "killed after timeout");
        }
        if out.stdout_truncated || out.stderr_truncated {
            tracing::warn!(command = %self.display(), "captured output truncated");
        }
        tracing::debug!(command = %self.display(), exit_status = out.exit_status, "exited");
        Ok(out)
    }
}

fn wait_child_output_capped(
    mut child: Child,
    timeout_ms: Option<u64>,
    cap: usize,
) -> std::io::Result<ProcessOutput> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("child stdout not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| std::io::Error::other("child stderr not captured"))?;

    let stdout_thread = std::thread::spawn(move || read_to_end_capped(stdout, cap));
    let stderr_thread = std::thread::spawn(move || read_to_end_capped(stderr, cap));

    let (status, timed_out) = wait_child_with_wall_timeout(&mut child, timeout_ms)?;
    let (stdout_bytes, stdout_truncated) = stdout_thread
        .join()
        .unwrap_or_else(|_| Ok((Vec::new(), false)))?;
    let (stderr_bytes, stderr_truncated) = stderr_thread
        .join()
        .unwrap_or_else(|_| Ok((Vec::new(), false)))?;

    Ok(ProcessOutput {
        exit_status: exit_code(status),
        timed_out,
        stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
        stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
        stdout_truncated,
        stderr_truncated,
    })
}

fn wait_child_with_wall_timeout(
    child: &mut Child,
    timeout_ms: Option<u64>,
) -> std::io::Result<(ExitStatus, bool)> {
    let Some(ms) = timeout_ms else {
        return Ok((child.wait()?, false));
    };
    let deadline = Instant::now().checked_add(Duration::from_millis(ms.max(1)));

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok((status, false));
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            hard_kill_child_and_group(child);
            let status = child.wait()?;
            return Ok((status, true));
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// Reader threads only finish once every holder of the pipes is gone, so
/// the whole group goes down with the child.
fn hard_kill_child_and_group(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Ok(pid) = i32::try_from(child.id()) {
            // SAFETY: plain kill(2); `pid` leads the group created at spawn.
            unsafe {
                let _ = libc::kill(-pid, libc::SIGKILL);
            }
        }
    }
    let _ = child.kill();
}

fn exit_code(status: ExitStatus) -> i32 {
    #[cfg(unix)]
    let exit_signal = {
        use std::os::unix::process::ExitStatusExt as _;
        status.signal()
    };
    #[cfg(not(unix))]
    let exit_signal: Option<i32> = None;

    match status.code() {
        Some(code) => code,
        None => exit_signal.map(|s| 128 + s).unwrap_or(1),
    }
}

fn read_to_end_capped<R: Read>(mut reader: R, cap: usize) -> std::io::Result<(Vec<u8>, bool)> {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 8192];
    let mut truncated = false;

    loop {
        let n = reader.read(&mut tmp)?;
        if n == 0 {
            break;
        }
        if truncated {
            continue;
        }
        let remaining = cap.saturating_sub(buf.len());
        if n <= remaining {
            buf.extend_from_slice(&tmp[..n]);
        } else {
            buf.extend_from_slice(&tmp[..remaining]);
            truncated = true;
        }
    }

    Ok((buf, truncated))
}
