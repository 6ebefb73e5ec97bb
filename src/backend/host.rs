//! Host backend: plain child processes, no OS-level isolation.
//!
//! Supervises the child with a deadline raced against "stdin written, both
//! pipes drained, process exited". Whichever finishes first decides the
//! outcome; on expiry the child is SIGKILLed and reaped.
//!
//! On unix the child leads its own process group. Anything it forks is
//! killed with the group once the child exits or the deadline passes, so no
//! background process outlives the run or keeps its pipes open.

use std::io;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tracing::{debug, instrument, warn};

use super::{IsolationBackend, ProcessOutcome, ProcessSpec};
use crate::error::SandboxError;

const READ_CHUNK: usize = 8 * 1024;

/// Backend that runs toolchains directly on the host.
#[derive(Debug, Default, Clone)]
pub struct HostBackend {}

impl HostBackend {
    /// Create a new host backend.
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }
}

#[async_trait]
impl IsolationBackend for HostBackend {
    #[instrument(
        skip(self, spec),
        fields(program = %spec.argv.first().map_or("", String::as_str), timeout_ms = spec.timeout.as_millis())
    )]
    async fn run(&self, spec: ProcessSpec) -> Result<ProcessOutcome, SandboxError> {
        let (program, args) = spec.argv.split_first().ok_or_else(|| {
            SandboxError::environment(
                "empty command line",
                io::Error::new(io::ErrorKind::InvalidInput, "no program to run"),
            )
        })?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(&spec.cwd)
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Any early return below still takes the child down with it.
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let started = Instant::now();
        let mut child = cmd.spawn().map_err(|e| SandboxError::spawn(program, e))?;
        debug!(pid = child.id(), "Spawned process");
        let mut group = ProcessGroup::led_by(&child);

        let stdin_pipe = child.stdin.take();
        let mut stdout_pipe = child
            .stdout
            .take()
            .ok_or_else(|| missing_pipe("stdout"))?;
        let mut stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| missing_pipe("stderr"))?;

        let input = spec.stdin.unwrap_or_default();
        let mut stdout = Captured::new(spec.max_output_bytes);
        let mut stderr = Captured::new(spec.max_output_bytes);

        // Borrows `child` and the buffers but moves neither, so both are
        // still usable after the timeout drops this future.
        let supervise = async {
            let write_stdin = async move {
                if let Some(mut pipe) = stdin_pipe {
                    if let Err(e) = pipe.write_all(input.as_bytes()).await {
                        // The child may exit without reading its input.
                        if e.kind() != io::ErrorKind::BrokenPipe {
                            debug!(error = %e, "Failed to write stdin");
                        }
                    }
                    // Dropping the pipe closes stdin.
                }
            };
            // Leftover background processes would hold the pipes open.
            let wait = async {
                let status = child.wait().await;
                group.kill();
                status
            };
            let ((), out, err, status) = tokio::join!(
                write_stdin,
                drain(&mut stdout_pipe, &mut stdout),
                drain(&mut stderr_pipe, &mut stderr),
                wait,
            );
            out?;
            err?;
            Ok::<_, io::Error>(status?)
        };

        let waited = tokio::time::timeout(spec.timeout, supervise).await;
        let elapsed = started.elapsed();

        match waited {
            Ok(Ok(status)) => {
                let outcome = ProcessOutcome {
                    exit_code: status.code(),
                    truncated: stdout.truncated || stderr.truncated,
                    stdout: stdout.into_string(),
                    stderr: stderr.into_string(),
                    timed_out: false,
                    elapsed,
                };
                debug!(
                    exit_code = ?outcome.exit_code,
                    elapsed_ms = elapsed.as_millis(),
                    "Process completed"
                );
                Ok(outcome)
            }
            Ok(Err(e)) => {
                group.kill();
                terminate(&mut child).await;
                Err(SandboxError::environment("failed to supervise process", e))
            }
            Err(_) => {
                group.kill();
                terminate(&mut child).await;
                warn!(elapsed_ms = elapsed.as_millis(), "Process timed out, killed");
                Ok(ProcessOutcome {
                    exit_code: None,
                    truncated: stdout.truncated || stderr.truncated,
                    stdout: stdout.into_string(),
                    stderr: stderr.into_string(),
                    timed_out: true,
                    elapsed,
                })
            }
        }
    }
}

fn missing_pipe(name: &str) -> SandboxError {
    SandboxError::environment(
        format!("failed to open child {name}"),
        io::Error::new(io::ErrorKind::BrokenPipe, "pipe not captured"),
    )
}

/// Process group led by a spawned child. Killed on drop unless already
/// killed, so a cancelled run leaves nothing behind either.
#[derive(Debug)]
struct ProcessGroup {
    pgid: Option<i32>,
}

impl ProcessGroup {
    fn led_by(child: &Child) -> Self {
        Self {
            pgid: child.id().and_then(|id| i32::try_from(id).ok()),
        }
    }

    /// SIGKILL every member. An empty group is not an error.
    #[cfg(unix)]
    fn kill(&mut self) {
        use nix::errno::Errno;
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Some(pgid) = self.pgid.take() {
            match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(e) => warn!(pgid, error = %e, "Failed to kill process group"),
            }
        }
    }

    #[cfg(not(unix))]
    fn kill(&mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

/// SIGKILL and reap. An already-exited child is not an error.
async fn terminate(child: &mut Child) {
    if let Err(e) = child.kill().await {
        debug!(error = %e, "Kill failed, process already gone");
    }
}

/// Output buffer that keeps at most `limit` bytes.
#[derive(Debug)]
struct Captured {
    buf: Vec<u8>,
    limit: usize,
    truncated: bool,
}

impl Captured {
    const fn new(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            limit,
            truncated: false,
        }
    }

    fn push(&mut self, chunk: &[u8]) {
        let room = self.limit.saturating_sub(self.buf.len());
        let take = room.min(chunk.len());
        self.buf.extend_from_slice(&chunk[..take]);
        if take < chunk.len() {
            self.truncated = true;
        }
    }

    fn into_string(self) -> String {
        String::from_utf8_lossy(&self.buf).into_owned()
    }
}

/// Read to EOF. Bytes past the cap are discarded, not left in the pipe, so a
/// chatty child never blocks on a full pipe.
async fn drain<R: AsyncRead + Unpin>(reader: &mut R, sink: &mut Captured) -> io::Result<()> {
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        sink.push(&chunk[..n]);
    }
}
