//! Helpers for running child processes with timeouts and bounded output.

use std::io::{Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// How long to wait for output readers after the child has exited or been killed.
/// Readers can block past exit when a grandchild inherited the pipes.
const READER_GRACE: Duration = Duration::from_millis(500);

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    pub fn stderr_truncated_notice(&self, label: &str) -> String {
        if self.stderr_truncated > 0 {
            format!(
                "\n[{label} stderr truncated {} bytes]\n",
                self.stderr_truncated
            )
        } else {
            String::new()
        }
    }
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
///
/// On Unix the child leads its own process group, and a timeout kills the whole group so
/// that helpers spawned by the child do not outlive it. With `kill_group` set the group is
/// also killed after a normal exit, before output is collected, so background descendants
/// release the pipes instead of being abandoned. The call returns within `timeout` plus a
/// short reader grace period even if a stray descendant keeps the pipes open.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes, kill_group))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
    kill_group: bool,
) -> Result<CommandOutput> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    isolate_process_group(&mut cmd);

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdin_handle = match stdin {
        Some(input) => {
            let mut child_stdin = child
                .stdin
                .take()
                .ok_or_else(|| anyhow!("stdin was not piped"))?;
            let input = input.to_vec();
            // A child that exits without draining stdin yields a broken pipe; not an error here.
            Some(thread::spawn(move || {
                if let Err(e) = child_stdin.write_all(&input) {
                    debug!(err = %e, "stdin write ended early");
                }
            }))
        }
        None => None,
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_rx = spawn_reader(stdout, output_limit_bytes);
    let stderr_rx = spawn_reader(stderr, output_limit_bytes);

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => {
            if kill_group {
                kill_process_group(child.id());
            }
            status
        }
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            kill_process_group(child.id());
            if let Err(e) = child.kill() {
                // Already reaped by the group kill.
                debug!(err = %e, "kill after group kill");
            }
            child.wait().context("wait command after kill")?
        }
    };

    let deadline = Instant::now() + READER_GRACE;
    let (stdout, stdout_truncated) = collect_output(&stdout_rx, deadline, "stdout");
    let (stderr, stderr_truncated) = collect_output(&stderr_rx, deadline, "stderr");
    if let Some(handle) = stdin_handle
        && handle.is_finished()
        && handle.join().is_err()
    {
        warn!("stdin writer thread panicked");
    }

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

type ReaderResult = Result<(Vec<u8>, usize)>;

fn spawn_reader<R: Read + Send + 'static>(reader: R, limit: usize) -> mpsc::Receiver<ReaderResult> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        // The receiver may have given up already.
        let _ = tx.send(read_stream_limited(reader, limit));
    });
    rx
}

fn collect_output(
    rx: &mpsc::Receiver<ReaderResult>,
    deadline: Instant,
    label: &'static str,
) -> (Vec<u8>, usize) {
    let wait = deadline.saturating_duration_since(Instant::now());
    match rx.recv_timeout(wait) {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            warn!(stream = label, err = %e, "failed to read output");
            (Vec::new(), 0)
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            warn!(stream = label, "output reader still blocked, abandoning");
            (Vec::new(), 0)
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            warn!(stream = label, "output reader thread panicked");
            (Vec::new(), 0)
        }
    }
}

#[cfg(unix)]
fn isolate_process_group(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn isolate_process_group(_cmd: &mut Command) {}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        warn!(pid, "pid out of range for a process group");
        return;
    };
    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) => debug!(pid, "killed process group"),
        // Every member has already exited.
        Err(Errno::ESRCH) => debug!(pid, "process group already gone"),
        Err(e) => warn!(pid, err = %e, "process group kill failed"),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> ReaderResult {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}
