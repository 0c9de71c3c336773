//! Driving an interactive subject process over its standard streams.
//!
//! The subject gives no completion signal, so every read is a bounded poll:
//! stdout and stderr are switched to non-blocking mode and drained for a
//! fixed window. The only call that waits on the subject itself is the
//! final join, and that is time-boxed too; on expiry the subject is killed
//! rather than retried, since a second spawn could collide with resources
//! (listening ports) the first one still holds.
//!
//! A [`Session`] owns exactly one subject. Dropping it kills and reaps the
//! subject if it is still running, so no exit path leaks a process.
use crate::errors::DriverError;
use std::io::{self, ErrorKind, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// How long to keep draining after the subject exits; a background job can
/// hold the pipes open well past that.
const EXIT_DRAIN_GRACE: Duration = Duration::from_millis(100);
const READ_CHUNK: usize = 4096;

/// Resolved subject command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    command: String,
}

impl Subject {
    /// Split `command` with shell quoting rules and resolve the program.
    ///
    /// Paths containing `/` are taken relative to `cwd`; bare names are
    /// looked up on `PATH`.
    pub fn parse(command: &str, cwd: Option<&Path>) -> Result<Self, DriverError> {
        let words = shell_words::split(command).map_err(|err| DriverError::BadCommand {
            command: command.to_string(),
            message: err.to_string(),
        })?;
        let (program, args) = words.split_first().ok_or(DriverError::EmptyCommand)?;
        let program_path = if program.contains('/') {
            let path = PathBuf::from(program);
            let resolved = match cwd {
                Some(dir) if path.is_relative() => dir.join(&path),
                _ => path,
            };
            if !resolved.is_file() {
                return Err(DriverError::NotFound(program.clone()));
            }
            resolved
        } else {
            which::which(program).map_err(|_| DriverError::NotFound(program.clone()))?
        };
        Ok(Self {
            program: program_path,
            args: args.to_vec(),
            cwd: cwd.map(Path::to_path_buf),
            command: command.to_string(),
        })
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    /// Hard cap on the whole session; the join never waits past it.
    pub session_limit: Duration,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            session_limit: Duration::from_secs(60),
        }
    }
}

/// Bytes read from the subject.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capture {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl Capture {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }

    pub fn is_empty(&self) -> bool {
        self.stdout.is_empty() && self.stderr.is_empty()
    }

    pub fn append(&mut self, other: &Capture) {
        self.stdout.extend_from_slice(&other.stdout);
        self.stderr.extend_from_slice(&other.stderr);
    }
}

/// Result of the final join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub exit_code: Option<i32>,
    /// The join window elapsed and the subject was killed.
    pub timed_out: bool,
    pub output: Capture,
    pub duration_ms: u128,
}

/// One running subject and its pipes.
pub struct Session {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    started: Instant,
    deadline: Instant,
    reaped: bool,
}

impl Session {
    pub fn spawn(subject: &Subject, limits: SessionLimits) -> Result<Self, DriverError> {
        let mut cmd = Command::new(&subject.program);
        cmd.args(&subject.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &subject.cwd {
            cmd.current_dir(cwd);
        }
        let mut child = cmd.spawn().map_err(|source| DriverError::Spawn {
            program: subject.program.display().to_string(),
            source,
        })?;
        let started = Instant::now();
        let session = Self {
            stdin: child.stdin.take(),
            stdout: child.stdout.take(),
            stderr: child.stderr.take(),
            child,
            started,
            deadline: started + limits.session_limit,
            reaped: false,
        };
        // From here on the subject is owned by `session`; an early return drops it.
        if let Some(stdout) = &session.stdout {
            set_nonblocking(stdout.as_raw_fd())?;
        }
        if let Some(stderr) = &session.stderr {
            set_nonblocking(stderr.as_raw_fd())?;
        }
        tracing::debug!(pid = session.pid(), command = %subject.command(), "spawned subject");
        Ok(session)
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Write `line` plus a newline and flush. Does not wait for a response.
    pub fn send(&mut self, line: &str) -> Result<(), DriverError> {
        if Instant::now() >= self.deadline {
            return Err(DriverError::DeadlineExceeded);
        }
        let stdin = self.stdin.as_mut().ok_or(DriverError::StdinClosed)?;
        stdin.write_all(line.as_bytes())?;
        stdin.write_all(b"\n")?;
        stdin.flush()?;
        tracing::debug!(pid = self.child.id(), line, "sent to subject");
        Ok(())
    }

    /// Deliver `signal` to the subject process (not its process group).
    pub fn signal(&mut self, signal: libc::c_int) -> Result<(), DriverError> {
        if self.reaped {
            return Err(DriverError::Reaped);
        }
        let pid = libc::pid_t::try_from(self.child.id())
            .map_err(|_| io::Error::new(ErrorKind::InvalidInput, "pid out of range"))?;
        // SAFETY: plain kill(2) on a child we have not reaped yet.
        if unsafe { libc::kill(pid, signal) } == -1 {
            return Err(io::Error::last_os_error().into());
        }
        tracing::debug!(pid, signal, "signalled subject");
        Ok(())
    }

    /// Accumulate output for the whole `window`.
    ///
    /// The window is always consumed in full: output arrives in bursts and a
    /// quiet moment says nothing about whether more is coming.
    pub fn read_available(&mut self, window: Duration) -> Result<Capture, DriverError> {
        let started = Instant::now();
        let mut capture = Capture::default();
        loop {
            let got_out = pump(&mut self.stdout, &mut capture.stdout)?;
            let got_err = pump(&mut self.stderr, &mut capture.stderr)?;
            let elapsed = started.elapsed();
            if elapsed >= window {
                break;
            }
            if !got_out && !got_err {
                std::thread::sleep(POLL_INTERVAL.min(window - elapsed));
            }
        }
        tracing::debug!(
            pid = self.child.id(),
            window_ms = window.as_millis(),
            stdout_bytes = capture.stdout.len(),
            stderr_bytes = capture.stderr.len(),
            "read available output"
        );
        Ok(capture)
    }

    /// Close stdin and wait up to `timeout` for the subject to exit.
    ///
    /// On expiry the subject is killed and the completion is marked
    /// `timed_out`; whatever output was collected is still returned.
    pub fn communicate(mut self, timeout: Duration) -> Result<Completion, DriverError> {
        self.stdin = None;
        let deadline = (Instant::now() + timeout).min(self.deadline);
        let mut output = Capture::default();

        let status = loop {
            let got_out = pump(&mut self.stdout, &mut output.stdout)?;
            let got_err = pump(&mut self.stderr, &mut output.stderr)?;
            if let Some(status) = self.child.try_wait()? {
                break Some(status);
            }
            if Instant::now() >= deadline {
                break None;
            }
            if !got_out && !got_err {
                std::thread::sleep(POLL_INTERVAL);
            }
        };

        let completion = match status {
            Some(status) => {
                self.reaped = true;
                let grace = Instant::now() + EXIT_DRAIN_GRACE;
                while (self.stdout.is_some() || self.stderr.is_some()) && Instant::now() < grace {
                    let got_out = pump(&mut self.stdout, &mut output.stdout)?;
                    let got_err = pump(&mut self.stderr, &mut output.stderr)?;
                    if !got_out && !got_err {
                        std::thread::sleep(POLL_INTERVAL);
                    }
                }
                Completion {
                    exit_code: status.code(),
                    timed_out: false,
                    output,
                    duration_ms: self.started.elapsed().as_millis(),
                }
            }
            None => {
                tracing::warn!(
                    pid = self.child.id(),
                    timeout_ms = timeout.as_millis(),
                    "subject did not exit in time; killing"
                );
                self.terminate();
                pump(&mut self.stdout, &mut output.stdout)?;
                pump(&mut self.stderr, &mut output.stderr)?;
                Completion {
                    exit_code: None,
                    timed_out: true,
                    output,
                    duration_ms: self.started.elapsed().as_millis(),
                }
            }
        };
        tracing::debug!(
            exit_code = ?completion.exit_code,
            timed_out = completion.timed_out,
            duration_ms = completion.duration_ms,
            "subject joined"
        );
        Ok(completion)
    }

    /// Kill and reap the subject. Safe to call more than once.
    pub fn terminate(&mut self) {
        if self.reaped {
            return;
        }
        self.stdin = None;
        if let Err(err) = self.child.kill() {
            // Already exited on its own; the wait below still reaps it.
            tracing::debug!(pid = self.child.id(), error = %err, "kill failed");
        }
        if let Err(err) = self.child.wait() {
            tracing::warn!(pid = self.child.id(), error = %err, "reap failed");
        }
        self.reaped = true;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    // SAFETY: `fd` belongs to a pipe owned by the session for its whole
    // lifetime; F_GETFL/F_SETFL do not touch memory.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: as above.
    let rc = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Read everything currently available from `stream` into `sink`.
///
/// Returns whether any bytes arrived. At end of file the stream is dropped.
fn pump<R: Read>(stream: &mut Option<R>, sink: &mut Vec<u8>) -> io::Result<bool> {
    let Some(reader) = stream.as_mut() else {
        return Ok(false);
    };
    let mut buf = [0u8; READ_CHUNK];
    let mut progressed = false;
    loop {
        match reader.read(&mut buf) {
            Ok(0) => {
                *stream = None;
                return Ok(progressed);
            }
            Ok(n) => {
                sink.extend_from_slice(&buf[..n]);
                progressed = true;
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(progressed),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
}
