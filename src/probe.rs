use crate::config::ProbeConfig;
use crate::poll::{poll_output, PollSettings};
use crate::process::{ensure_command_available, ProbeCommand};
use crate::report::{self, ProbeReport};
use crate::stream::StreamSummary;
use crate::types::OutboundMessage;
use crate::wirelog::{Direction, WireLog};
use anyhow::Result;
use tracing::{info, warn};

/// Launch, send one message, poll until done or hung, tear down.
pub async fn run(cfg: &ProbeConfig, show_summary: bool) -> Result<ProbeReport> {
    let command = ProbeCommand::from_config(&cfg.command);
    ensure_command_available(&command.program)?;

    let mut wire = match &cfg.log.wire_log {
        Some(path) => {
            info!(path = %path.display(), "writing wire log");
            WireLog::create(path)?
        }
        None => WireLog::disabled(),
    };
    wire.record(Direction::Meta, &command.display())?;

    let mut process = command.spawn()?;

    let message = OutboundMessage::user_text(cfg.message.text.as_str());
    match process.send_message(&message).await {
        Ok(line) => wire.record(Direction::Stdin, &line)?,
        // The child may have died on startup; keep polling so its stderr is shown.
        Err(err) => {
            warn!("{err:#}");
            wire.record(Direction::Meta, &format!("stdin write failed: {err:#}"))?;
        }
    }

    let settings = PollSettings {
        timeout: cfg.poll.timeout(),
        interval: cfg.poll.interval(),
    };
    let outcome = poll_output(&mut process, settings, &mut wire).await?;
    let report = report::finish(&mut process, &outcome, &mut wire).await?;

    if show_summary {
        let summary = StreamSummary::from_lines(outcome.stdout_lines.iter().map(String::as_str));
        print!("{}", summary.render());
    }
    Ok(report)
}
