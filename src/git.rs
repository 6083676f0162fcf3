//! Git subprocess execution with wall-clock timeouts.
//!
//! The provisioner never links a git library; it drives the `git` binary the
//! same way the rest of the tool drives external processes: spawn, poll with
//! `try_wait` under a deadline, kill on timeout, and collect the output.

use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Ceiling for a single network-facing git operation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Captured result of one git invocation.
#[derive(Debug)]
pub struct GitOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl GitOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// First non-empty stderr line, for compact failure reporting.
    pub fn error_line(&self) -> &str {
        self.stderr
            .lines()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("no diagnostic output")
    }
}

/// Run `git <args>` in `cwd` (or the inherited directory) under `timeout`.
pub fn run_git(args: &[&str], cwd: Option<&Path>, timeout: Duration) -> Result<GitOutput> {
    run_command("git", args, cwd, timeout)
}

fn run_command(
    program: &str,
    args: &[&str],
    cwd: Option<&Path>,
    timeout: Duration,
) -> Result<GitOutput> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(cwd) = cwd {
        cmd.current_dir(cwd);
    }

    let start = Instant::now();
    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawn {program} {}", args.first().copied().unwrap_or("")))?;

    // Both pipes must be drained while the child runs; a clone emitting more
    // than a pipe buffer of progress output would otherwise block and ride
    // out the whole timeout.
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());
    let mut timed_out = false;

    loop {
        if child.try_wait().context("check child status")?.is_some() {
            break;
        }
        if start.elapsed() > timeout {
            timed_out = true;
            let _ = child.kill();
            break;
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    let status = child.wait().context("collect exit status")?;
    let stdout = stdout.join().unwrap_or_default();
    let stderr = stderr.join().unwrap_or_default();
    Ok(GitOutput {
        exit_code: status.code(),
        stdout: String::from_utf8_lossy(&stdout).to_string(),
        stderr: String::from_utf8_lossy(&stderr).to_string(),
        timed_out,
    })
}

fn drain(pipe: Option<impl Read + Send + 'static>) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

/// Clone `url` at `branch` into `dest`. Shallow when no commit is pinned;
/// a pinned commit needs full branch history for the later checkout.
pub fn clone(url: &str, branch: &str, dest: &Path, shallow: bool) -> Result<GitOutput> {
    let dest_str = dest.to_str().context("clone destination is not UTF-8")?;
    let mut args = vec!["clone", "--recursive", "--branch", branch];
    if shallow {
        args.extend(["--depth", "1"]);
    }
    args.extend([url, dest_str]);
    tracing::debug!(url, branch, shallow, "git clone");
    run_git(&args, None, DEFAULT_TIMEOUT)
}

/// Check out a pinned commit inside an existing clone.
pub fn checkout(repo: &Path, commit: &str) -> Result<GitOutput> {
    tracing::debug!(repo = %repo.display(), commit, "git checkout");
    run_git(&["checkout", commit], Some(repo), DEFAULT_TIMEOUT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn git_output_success_semantics() {
        let ok = GitOutput {
            exit_code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
            timed_out: false,
        };
        assert!(ok.success());

        let timed_out = GitOutput {
            exit_code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
            timed_out: true,
        };
        assert!(!timed_out.success());

        let failed = GitOutput {
            exit_code: Some(128),
            stdout: String::new(),
            stderr: "fatal: repository not found\nhint: ...\n".to_string(),
            timed_out: false,
        };
        assert!(!failed.success());
        assert_eq!(failed.error_line(), "fatal: repository not found");
    }

    #[test]
    fn large_output_does_not_stall_the_poll_loop() {
        // 256 KiB of stdout, several pipe buffers worth. A child this
        // chatty must still finish inside a short timeout.
        let Ok(output) = run_command(
            "sh",
            &["-c", "i=0; while [ $i -lt 4096 ]; do printf '%064d\\n' $i; i=$((i+1)); done"],
            None,
            Duration::from_secs(20),
        ) else {
            // Guard: environments without a POSIX shell skip silently.
            return;
        };
        assert!(output.success(), "stderr: {}", output.stderr);
        assert!(!output.timed_out);
        assert!(output.stdout.len() >= 4096 * 65);
    }

    #[test]
    fn run_git_version_if_available() {
        // Guard: environments without git skip this test silently.
        let Ok(output) = run_git(&["--version"], None, Duration::from_secs(10)) else {
            return;
        };
        assert!(output.success());
        assert!(output.stdout.contains("git version"));
    }
}
