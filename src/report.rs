use crate::poll::PollOutcome;
use crate::process::{exit_code, ProbeProcess};
use crate::wirelog::{Direction, WireLog};
use anyhow::Result;
use tracing::info;

pub const NO_STDOUT_HINT: &str = "No stdout produced — likely CLI hang. Check if --input-format stream-json works in interactive mode.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub exit_code: i32,
    pub timed_out: bool,
    pub stdout_lines: usize,
    pub stderr_lines: usize,
}

impl ProbeReport {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == 0
    }

    pub fn lines(&self) -> Vec<String> {
        let mut out = vec![format!("Exit code: {}", self.exit_code)];
        if self.stdout_lines == 0 {
            out.push(NO_STDOUT_HINT.to_string());
        }
        out
    }
}

/// Reaps the child and prints the closing lines.
pub async fn finish(
    process: &mut ProbeProcess,
    outcome: &PollOutcome,
    wire: &mut WireLog,
) -> Result<ProbeReport> {
    let status = process.wait().await?;
    let report = ProbeReport {
        exit_code: exit_code(&status),
        timed_out: outcome.timed_out,
        stdout_lines: outcome.stdout_lines.len(),
        stderr_lines: outcome.stderr_lines.len(),
    };
    wire.record(Direction::Meta, &format!("exit code {}", report.exit_code))?;
    wire.flush()?;

    for line in report.lines() {
        println!("{line}");
    }
    info!(
        exit_code = report.exit_code,
        timed_out = report.timed_out,
        stdout_lines = report.stdout_lines,
        stderr_lines = report.stderr_lines,
        elapsed_ms = u64::try_from(outcome.elapsed.as_millis()).unwrap_or(u64::MAX),
        "probe finished"
    );
    Ok(report)
}
