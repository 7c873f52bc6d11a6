use crate::process::ProbeProcess;
use crate::types::StreamKind;
use crate::wirelog::{Direction, WireLog};
use anyhow::Result;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_stream::wrappers::LinesStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub timeout: Duration,
    pub interval: Duration,
}

#[derive(Debug, Default)]
pub struct PollOutcome {
    pub stdout_lines: Vec<String>,
    pub stderr_lines: Vec<String>,
    pub timed_out: bool,
    pub elapsed: Duration,
}

struct Recorder<'a> {
    outcome: PollOutcome,
    wire: &'a mut WireLog,
    activity: bool,
}

impl Recorder<'_> {
    fn line(&mut self, kind: StreamKind, line: String) -> Result<()> {
        println!("{}: {}", kind.label(), line.trim());
        let dir = match kind {
            StreamKind::Stdout => Direction::Stdout,
            StreamKind::Stderr => Direction::Stderr,
        };
        self.wire.record(dir, &line)?;
        match kind {
            StreamKind::Stdout => self.outcome.stdout_lines.push(line),
            StreamKind::Stderr => self.outcome.stderr_lines.push(line),
        }
        self.activity = true;
        Ok(())
    }
}

/// Echoes the child's stdout and stderr line by line until the child is
/// done or the timeout expires, killing it in the latter case.
///
/// The loop stops once the child has exited and stdout is at EOF, after
/// stderr is closed too or a full tick passed with no new line. Lines that
/// arrive after that are not read.
pub async fn poll_output(
    process: &mut ProbeProcess,
    settings: PollSettings,
    wire: &mut WireLog,
) -> Result<PollOutcome> {
    let (stdout, stderr) = process.take_output()?;
    // A closed stream is dropped so the child sees a broken pipe instead of
    // blocking on a full one.
    let mut stdout = Some(LinesStream::new(BufReader::new(stdout).lines()));
    let mut stderr = Some(LinesStream::new(BufReader::new(stderr).lines()));

    let start = Instant::now();
    let deadline = time::sleep_until(start + settings.timeout);
    tokio::pin!(deadline);
    let mut tick = time::interval_at(start + settings.interval, settings.interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut rec = Recorder {
        outcome: PollOutcome::default(),
        wire,
        activity: false,
    };

    loop {
        tokio::select! {
            // Pending output is always drained before a tick can end the loop.
            biased;

            _ = &mut deadline => {
                println!("Timeout: Killing process due to hang");
                rec.wire.record(Direction::Meta, "timeout: killing process")?;
                if let Err(err) = process.kill() {
                    warn!("{err:#}");
                    rec.wire.record(Direction::Meta, &format!("kill failed: {err:#}"))?;
                }
                rec.outcome.timed_out = true;
                break;
            }
            next = next_line(&mut stdout), if stdout.is_some() => {
                if let Some(line) = open_line(StreamKind::Stdout, next) {
                    rec.line(StreamKind::Stdout, line)?;
                } else {
                    stdout = None;
                }
            }
            next = next_line(&mut stderr), if stderr.is_some() => {
                if let Some(line) = open_line(StreamKind::Stderr, next) {
                    rec.line(StreamKind::Stderr, line)?;
                } else {
                    stderr = None;
                }
            }
            _ = tick.tick() => {
                let quiet = !rec.activity;
                rec.activity = false;
                if stdout.is_none() && (stderr.is_none() || quiet) && process.has_exited()? {
                    break;
                }
            }
        }
    }

    rec.outcome.elapsed = start.elapsed();
    debug!(
        stdout = rec.outcome.stdout_lines.len(),
        stderr = rec.outcome.stderr_lines.len(),
        timed_out = rec.outcome.timed_out,
        elapsed_ms = u64::try_from(rec.outcome.elapsed.as_millis()).unwrap_or(u64::MAX),
        "poll finished"
    );
    Ok(rec.outcome)
}

async fn next_line<S>(lines: &mut Option<S>) -> Option<io::Result<String>>
where
    S: Stream<Item = io::Result<String>> + Unpin,
{
    match lines {
        Some(lines) => lines.next().await,
        None => None,
    }
}

// `None` means the stream is finished, either at EOF or after a read error.
fn open_line(kind: StreamKind, next: Option<io::Result<String>>) -> Option<String> {
    match next {
        Some(Ok(line)) => Some(line),
        Some(Err(err)) => {
            warn!(stream = kind.label(), "closing stream after read error: {err}");
            None
        }
        None => {
            debug!(stream = kind.label(), "stream reached EOF");
            None
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::process::{exit_code, ProbeCommand};
    use crate::types::OutboundMessage;

    fn sh(script: &str) -> ProbeCommand {
        ProbeCommand {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            env_remove: Vec::new(),
            cwd: None,
        }
    }

    fn settings(timeout_ms: u64) -> PollSettings {
        PollSettings {
            timeout: Duration::from_millis(timeout_ms),
            interval: Duration::from_millis(20),
        }
    }

    #[tokio::test]
    async fn echoed_message_is_read_back() {
        let mut proc = sh("cat").spawn().unwrap();
        let sent = proc
            .send_message(&OutboundMessage::default())
            .await
            .unwrap();
        let mut wire = WireLog::disabled();
        let outcome = poll_output(&mut proc, settings(5_000), &mut wire)
            .await
            .unwrap();

        assert!(!outcome.timed_out);
        assert_eq!(outcome.stdout_lines, vec![sent]);
        assert!(outcome.stderr_lines.is_empty());
        assert_eq!(exit_code(&proc.wait().await.unwrap()), 0);
    }

    #[tokio::test]
    async fn stderr_lines_are_kept_separate() {
        let mut proc = sh("echo out; echo err1 >&2; echo err2 >&2; exit 3")
            .spawn()
            .unwrap();
        let mut wire = WireLog::disabled();
        let outcome = poll_output(&mut proc, settings(5_000), &mut wire)
            .await
            .unwrap();

        assert!(!outcome.timed_out);
        assert_eq!(outcome.stdout_lines, vec!["out".to_string()]);
        assert_eq!(
            outcome.stderr_lines,
            vec!["err1".to_string(), "err2".to_string()]
        );
        assert_eq!(exit_code(&proc.wait().await.unwrap()), 3);
    }

    #[tokio::test]
    async fn hung_child_is_killed_at_the_deadline() {
        let mut proc = sh("echo started; exec sleep 30").spawn().unwrap();
        let mut wire = WireLog::disabled();
        let outcome = poll_output(&mut proc, settings(300), &mut wire)
            .await
            .unwrap();

        assert!(outcome.timed_out);
        assert_eq!(outcome.stdout_lines, vec!["started".to_string()]);
        assert!(outcome.elapsed >= Duration::from_millis(300));
        assert!(outcome.elapsed < Duration::from_secs(10));
        assert_eq!(exit_code(&proc.wait().await.unwrap()), -9);
    }

    #[tokio::test]
    async fn silent_child_finishes_without_timeout() {
        let mut proc = sh("exit 0").spawn().unwrap();
        let mut wire = WireLog::disabled();
        let outcome = poll_output(&mut proc, settings(5_000), &mut wire)
            .await
            .unwrap();

        assert!(!outcome.timed_out);
        assert!(outcome.stdout_lines.is_empty());
        assert!(outcome.stderr_lines.is_empty());
    }

    #[tokio::test]
    async fn child_closing_stdout_early_is_still_awaited() {
        let mut proc = sh("echo first; exec 1>&-; sleep 0.2; echo late >&2")
            .spawn()
            .unwrap();
        let mut wire = WireLog::disabled();
        let outcome = poll_output(&mut proc, settings(5_000), &mut wire)
            .await
            .unwrap();

        assert!(!outcome.timed_out);
        assert_eq!(outcome.stdout_lines, vec!["first".to_string()]);
        assert_eq!(outcome.stderr_lines, vec!["late".to_string()]);
    }

    #[tokio::test]
    async fn empty_lines_are_kept() {
        let mut proc = sh("echo; echo x").spawn().unwrap();
        let mut wire = WireLog::disabled();
        let outcome = poll_output(&mut proc, settings(5_000), &mut wire)
            .await
            .unwrap();

        assert!(!outcome.timed_out);
        assert_eq!(outcome.stdout_lines, vec![String::new(), "x".to_string()]);
    }

    #[tokio::test]
    async fn invalid_utf8_closes_stdout_without_stalling_the_child() {
        // More than a pipe buffer follows the bad line, so an unread pipe would block the writer.
        let mut proc = sh(r"printf 'ok\n\377\376bad\n'; head -c 300000 /dev/zero; echo done >&2")
            .spawn()
            .unwrap();
        let mut wire = WireLog::disabled();
        let outcome = poll_output(&mut proc, settings(10_000), &mut wire)
            .await
            .unwrap();

        assert!(!outcome.timed_out);
        assert_eq!(outcome.stdout_lines, vec!["ok".to_string()]);
        assert_eq!(outcome.stderr_lines, vec!["done".to_string()]);
    }

    #[tokio::test]
    async fn wire_log_captures_both_streams() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wire.jsonl");
        let mut wire = WireLog::create(&path).unwrap();

        let mut proc = sh("echo '{\"type\":\"system\"}'; echo oops >&2")
            .spawn()
            .unwrap();
        poll_output(&mut proc, settings(5_000), &mut wire)
            .await
            .unwrap();
        drop(wire);

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains(r#""dir":"stdout""#));
        assert!(content.contains(r#""dir":"stderr","line":"oops""#));
    }
}
