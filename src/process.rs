//! Synchronous subprocess invocation
//!
//! Runs an external tool to completion, feeding stdin and capturing
//! stdout/stderr on helper threads so large outputs cannot deadlock the
//! pipes. A deadline kills the child when it is exceeded.

use std::ffi::OsStr;
use std::io::{self, Read, Write};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// Poll interval while waiting for a child
const WAIT_POLL: Duration = Duration::from_millis(10);

/// Captured result of a finished process
#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    /// Exit code, or -1 when killed by a signal
    pub fn code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }

    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

/// Why a process could not produce an output
#[derive(Debug)]
pub enum ProcessFailure {
    Io(io::Error),
    Timeout,
}

impl From<io::Error> for ProcessFailure {
    fn from(err: io::Error) -> Self {
        ProcessFailure::Io(err)
    }
}

/// Run `program` with `args`, optionally in `cwd`, writing `input` to stdin
pub fn run<I, S>(
    program: &Path,
    args: I,
    cwd: Option<&Path>,
    input: Option<&[u8]>,
    timeout: Duration,
) -> std::result::Result<ProcessOutput, ProcessFailure>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    debug!("Running {:?}", program);
    let mut child = command.spawn()?;

    let writer = match (input, child.stdin.take()) {
        (Some(data), Some(mut stdin)) => {
            let data = data.to_vec();
            Some(thread::spawn(move || {
                // A child that exits early closes the pipe; that shows up in its status instead.
                let _ = stdin.write_all(&data);
            }))
        }
        _ => None,
    };
    let stdout = child.stdout.take().map(spawn_reader);
    let stderr = child.stderr.take().map(spawn_reader);

    let status = wait_with_deadline(&mut child, timeout)?;

    if let Some(handle) = writer {
        let _ = handle.join();
    }
    let stdout = collect(stdout)?;
    let stderr = collect(stderr)?;

    match status {
        Some(status) => Ok(ProcessOutput {
            status,
            stdout,
            stderr,
        }),
        None => Err(ProcessFailure::Timeout),
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf)?;
        Ok(buf)
    })
}

fn collect(handle: Option<thread::JoinHandle<io::Result<Vec<u8>>>>) -> io::Result<Vec<u8>> {
    match handle {
        Some(h) => h
            .join()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "pipe reader panicked"))?,
        None => Ok(Vec::new()),
    }
}

/// Returns `None` when the deadline passed and the child was killed
fn wait_with_deadline(child: &mut Child, timeout: Duration) -> io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            child.kill()?;
            child.wait()?;
            return Ok(None);
        }
        thread::sleep(WAIT_POLL);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_run_captures_stdout_from_stdin() {
        let out = run(
            Path::new("cat"),
            Vec::<&str>::new(),
            None,
            Some(b"hello".as_slice()),
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, b"hello");
    }

    #[test]
    fn test_run_reports_exit_code() {
        let out = run(
            Path::new("sh"),
            ["-c", "echo oops >&2; exit 3"],
            None,
            None,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(out.code(), 3);
        assert_eq!(out.stderr_lossy(), "oops");
    }

    #[test]
    fn test_run_times_out() {
        let result = run(
            Path::new("sleep"),
            ["5"],
            None,
            None,
            Duration::from_millis(50),
        );
        assert!(matches!(result, Err(ProcessFailure::Timeout)));
    }

    #[test]
    fn test_missing_program_is_io_error() {
        let result = run(
            Path::new("/nonexistent/definitely-not-here"),
            Vec::<&str>::new(),
            None,
            None,
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(ProcessFailure::Io(_))));
    }
}
