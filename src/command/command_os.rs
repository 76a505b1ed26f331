use std::{
    io::Read,
    process::{Child, ChildStderr, ChildStdout, Command, ExitStatus, Stdio},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use tracing::{debug, warn};

use super::{CommandError, CommandExecutor, CommandSpec, ExecutionOutcome};
use crate::context::Context;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

type StreamReader = JoinHandle<std::io::Result<Vec<u8>>>;

/// [`CommandExecutor`] spawning real OS processes.
///
/// Each process leads its own process group. The group is supervised until the process exits
/// and every holder of its output pipes closed them, the [`Context`] is cancelled or the
/// optional timeout elapses. In the last two cases the group receives a SIGTERM and, if it is
/// still running after the shutdown timeout, a SIGKILL.
#[derive(Debug, Clone)]
pub struct OsCommandExecutor {
    timeout: Option<Duration>,
    shutdown_timeout: Duration,
}

impl Default for OsCommandExecutor {
    fn default() -> Self {
        Self {
            timeout: None,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl OsCommandExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_shutdown_timeout(mut self, shutdown_timeout: Duration) -> Self {
        self.shutdown_timeout = shutdown_timeout;
        self
    }

    /// Blocks for up to one poll interval. Returns the error to report if the run must stop.
    fn interrupted(&self, ctx: &Context, started: Instant) -> Option<CommandError> {
        if ctx.is_cancelled_with_timeout(POLL_INTERVAL) {
            return Some(CommandError::Cancelled);
        }
        self.timeout
            .filter(|t| started.elapsed() >= *t)
            .map(CommandError::Timeout)
    }

    fn wait(&self, child: &mut Child, ctx: &Context, started: Instant) -> Result<ExitStatus, CommandError> {
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if let Some(err) = self.interrupted(ctx, started) {
                self.shutdown(child);
                return Err(err);
            }
        }
    }

    /// Collects the captured output once the process exited. Background processes it started
    /// inherit the pipes, so the readers may outlive it; they are left detached when the run is
    /// interrupted.
    fn drain(
        &self,
        pid: u32,
        (stdout, stderr): (StreamReader, StreamReader),
        ctx: &Context,
        started: Instant,
    ) -> Result<(Vec<u8>, Vec<u8>), CommandError> {
        loop {
            if stdout.is_finished() && stderr.is_finished() {
                return Ok((join_reader("stdout", stdout)?, join_reader("stderr", stderr)?));
            }
            if let Some(err) = self.interrupted(ctx, started) {
                self.shutdown_group(pid, || stdout.is_finished() && stderr.is_finished());
                return Err(err);
            }
        }
    }

    fn shutdown(&self, child: &mut Child) {
        let pid = child.id();
        self.shutdown_group(pid, || child.try_wait().is_ok_and(|status| status.is_some()));
        if let Err(err) = child.kill() {
            debug!(pid, "could not kill process: {err}");
        }
        // reap it so no zombie is left behind
        _ = child.wait();
    }

    /// Sends SIGTERM to the process group led by `pid` and SIGKILL if `is_done` does not hold
    /// within the shutdown timeout.
    fn shutdown_group(&self, pid: u32, mut is_done: impl FnMut() -> bool) {
        match signal_group(pid, GroupSignal::Terminate) {
            Ok(()) if wait_until(&mut is_done, self.shutdown_timeout) => return,
            Ok(()) => debug!(pid, "process group still running after SIGTERM, killing it"),
            Err(err) => warn!(pid, "graceful shutdown failed: {err}"),
        }
        if let Err(err) = signal_group(pid, GroupSignal::Kill) {
            debug!(pid, "could not kill process group: {err}");
        }
    }
}

impl CommandExecutor for OsCommandExecutor {
    fn run(&self, spec: &CommandSpec, ctx: &Context) -> Result<ExecutionOutcome, CommandError> {
        if ctx.is_cancelled() {
            return Err(CommandError::Cancelled);
        }

        debug!(command = %spec, "running command");
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(target_family = "unix")]
        std::os::unix::process::CommandExt::process_group(&mut command, 0);

        let started = Instant::now();
        let mut child = command.spawn()?;

        let readers = match capture_output(&mut child) {
            Ok(readers) => readers,
            Err(err) => {
                self.shutdown(&mut child);
                return Err(err);
            }
        };

        let status = self.wait(&mut child, ctx, started)?;
        let (stdout, stderr) = self.drain(child.id(), readers, ctx, started)?;

        let outcome = ExecutionOutcome {
            stdout,
            stderr,
            exit_code: status.code(),
        };
        debug!(command = %spec, exit_code = ?outcome.exit_code, "command finished");
        Ok(outcome)
    }
}

fn capture_output(child: &mut Child) -> Result<(StreamReader, StreamReader), CommandError> {
    let stdout: ChildStdout = child
        .stdout
        .take()
        .ok_or(CommandError::StreamPipeError("stdout".to_string()))?;
    let stderr: ChildStderr = child
        .stderr
        .take()
        .ok_or(CommandError::StreamPipeError("stderr".to_string()))?;

    Ok((spawn_reader("stdout", stdout)?, spawn_reader("stderr", stderr)?))
}

fn spawn_reader<R>(name: &str, mut stream: R) -> std::io::Result<StreamReader>
where
    R: Read + Send + 'static,
{
    thread::Builder::new()
        .name(format!("{name} reader"))
        .spawn(move || {
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf)?;
            Ok(buf)
        })
}

fn join_reader(name: &str, reader: StreamReader) -> Result<Vec<u8>, CommandError> {
    reader
        .join()
        .map_err(|_| CommandError::StreamReaderError(name.to_string()))?
        .map_err(CommandError::from)
}

fn wait_until(is_done: &mut impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;

    while Instant::now() < deadline {
        if is_done() {
            return true;
        }
        thread::sleep(POLL_INTERVAL);
    }
    is_done()
}

#[derive(Debug, Clone, Copy)]
enum GroupSignal {
    Terminate,
    Kill,
}

#[cfg(target_family = "unix")]
fn signal_group(pid: u32, signal: GroupSignal) -> Result<(), CommandError> {
    use nix::{sys::signal, unistd::Pid};

    let signal = match signal {
        GroupSignal::Terminate => signal::SIGTERM,
        GroupSignal::Kill => signal::SIGKILL,
    };
    signal::killpg(Pid::from_raw(pid as i32), signal)
        .map_err(|e| CommandError::from(std::io::Error::from(e)))
}

#[cfg(not(target_family = "unix"))]
fn signal_group(_pid: u32, _signal: GroupSignal) -> Result<(), CommandError> {
    Err(CommandError::from(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "no process group signals on this platform",
    )))
}
