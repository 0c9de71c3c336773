//! Scripted conversations with the subject.
//!
//! An [`Interaction`] is a fixed list of steps run against a fresh session
//! and always ends in a time-boxed join. Output from intermediate reads and
//! from the join is concatenated in arrival order.
use crate::driver::{Capture, Session, SessionLimits, Subject};
use crate::errors::DriverError;
use serde::Serialize;
use std::io::ErrorKind;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Send(String),
    Wait(Duration),
    Read(Duration),
    /// Deliver a signal to the subject process.
    Signal(libc::c_int),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Completed,
    /// The join timed out and the subject was killed.
    Inconclusive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TranscriptEntry {
    Sent { line: String },
    Received { stdout: String, stderr: String },
    Signalled { signal: i32 },
    /// The subject stopped accepting input before the script finished.
    InputClosed,
    Joined { exit_code: Option<i32>, timed_out: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InteractionResult {
    pub transcript: Vec<TranscriptEntry>,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub verdict: Verdict,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interaction {
    steps: Vec<Step>,
    join_timeout: Duration,
}

impl Interaction {
    pub fn new(join_timeout: Duration) -> Self {
        Self {
            steps: Vec::new(),
            join_timeout,
        }
    }

    pub fn send(mut self, line: impl Into<String>) -> Self {
        self.steps.push(Step::Send(line.into()));
        self
    }

    pub fn wait(mut self, duration: Duration) -> Self {
        self.steps.push(Step::Wait(duration));
        self
    }

    pub fn read(mut self, window: Duration) -> Self {
        self.steps.push(Step::Read(window));
        self
    }

    pub fn signal(mut self, signal: libc::c_int) -> Self {
        self.steps.push(Step::Signal(signal));
        self
    }

    #[cfg(test)]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Spawn the subject, play the steps, then join.
    ///
    /// A subject that exits early (closing its stdin) ends the script; the
    /// remaining steps are skipped and the join still runs.
    pub fn run(&self, subject: &Subject, limits: SessionLimits) -> Result<InteractionResult, DriverError> {
        let mut session = Session::spawn(subject, limits)?;
        let mut transcript = Vec::new();
        let mut output = Capture::default();

        for step in &self.steps {
            match step {
                Step::Send(line) => match session.send(line) {
                    Ok(()) => transcript.push(TranscriptEntry::Sent { line: line.clone() }),
                    Err(DriverError::Io(err)) if err.kind() == ErrorKind::BrokenPipe => {
                        tracing::debug!(line = %line, "subject closed stdin; skipping remaining steps");
                        transcript.push(TranscriptEntry::InputClosed);
                        break;
                    }
                    Err(err) => return Err(err),
                },
                Step::Wait(duration) => std::thread::sleep(*duration),
                Step::Signal(signal) => {
                    session.signal(*signal)?;
                    transcript.push(TranscriptEntry::Signalled { signal: *signal });
                }
                Step::Read(window) => {
                    let capture = session.read_available(*window)?;
                    if !capture.is_empty() {
                        transcript.push(received(&capture));
                    }
                    output.append(&capture);
                }
            }
        }

        let completion = session.communicate(self.join_timeout)?;
        if !completion.output.is_empty() {
            transcript.push(received(&completion.output));
        }
        output.append(&completion.output);
        transcript.push(TranscriptEntry::Joined {
            exit_code: completion.exit_code,
            timed_out: completion.timed_out,
        });

        Ok(InteractionResult {
            transcript,
            stdout: output.stdout_text(),
            stderr: output.stderr_text(),
            exit_code: completion.exit_code,
            verdict: if completion.timed_out {
                Verdict::Inconclusive
            } else {
                Verdict::Completed
            },
        })
    }
}

fn received(capture: &Capture) -> TranscriptEntry {
    TranscriptEntry::Received {
        stdout: capture.stdout_text(),
        stderr: capture.stderr_text(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject(command: &str) -> Option<Subject> {
        Subject::parse(command, None).ok()
    }

    #[test]
    fn builder_keeps_step_order() {
        let interaction = Interaction::new(Duration::from_secs(1))
            .read(Duration::from_millis(5))
            .send("ls")
            .wait(Duration::from_millis(1));
        assert_eq!(
            interaction.steps(),
            &[
                Step::Read(Duration::from_millis(5)),
                Step::Send("ls".to_string()),
                Step::Wait(Duration::from_millis(1)),
            ]
        );
    }

    #[test]
    fn reads_and_join_output_are_concatenated() {
        let Some(sh) = subject("sh") else {
            return;
        };
        let result = Interaction::new(Duration::from_secs(3))
            .send("echo one")
            .read(Duration::from_millis(300))
            .send("echo two")
            .run(&sh, SessionLimits::default())
            .unwrap();
        assert_eq!(result.verdict, Verdict::Completed);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.stdout, "one\ntwo\n");
        assert!(matches!(
            result.transcript.last(),
            Some(TranscriptEntry::Joined { timed_out: false, .. })
        ));
        assert_eq!(
            result.transcript[0],
            TranscriptEntry::Sent {
                line: "echo one".to_string()
            }
        );
    }

    #[test]
    fn join_timeout_is_inconclusive() {
        let Some(sleeper) = subject("sleep 5") else {
            return;
        };
        let result = Interaction::new(Duration::from_millis(200))
            .run(&sleeper, SessionLimits::default())
            .unwrap();
        assert_eq!(result.verdict, Verdict::Inconclusive);
        assert_eq!(result.exit_code, None);
    }

    #[test]
    fn subject_ignoring_sigint_keeps_answering() {
        let Some(sh) = subject("sh -c \"trap '' INT; exec sh\"") else {
            return;
        };
        let result = Interaction::new(Duration::from_secs(3))
            .wait(Duration::from_millis(200))
            .signal(libc::SIGINT)
            .wait(Duration::from_millis(200))
            .send("echo after_signal")
            .run(&sh, SessionLimits::default())
            .unwrap();
        assert_eq!(result.verdict, Verdict::Completed);
        assert_eq!(result.stdout, "after_signal\n");
        assert!(result.transcript.contains(&TranscriptEntry::Signalled {
            signal: libc::SIGINT
        }));
    }

    #[test]
    fn early_exit_skips_remaining_steps() {
        let Some(sh) = subject("sh") else {
            return;
        };
        let result = Interaction::new(Duration::from_secs(3))
            .send("exit 3")
            .wait(Duration::from_millis(300))
            .send("echo never")
            .run(&sh, SessionLimits::default())
            .unwrap();
        assert_eq!(result.verdict, Verdict::Completed);
        assert_eq!(result.exit_code, Some(3));
        assert!(!result.stdout.contains("never"));
        assert!(result.transcript.contains(&TranscriptEntry::InputClosed));
    }
}
