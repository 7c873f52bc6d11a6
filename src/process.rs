use crate::config::CommandConfig;
use crate::types::OutboundMessage;
use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env_remove: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl ProbeCommand {
    pub fn from_config(cfg: &CommandConfig) -> Self {
        let mut args = cfg.args.clone();
        if !cfg.prompt.is_empty() {
            args.push(cfg.prompt.clone());
        }
        Self {
            program: cfg.program.clone(),
            args,
            env_remove: cfg.env_remove.clone(),
            cwd: cfg.cwd.clone(),
        }
    }

    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(|part| {
                if part.is_empty() || part.contains(char::is_whitespace) {
                    format!("{part:?}")
                } else {
                    part.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn spawn(&self) -> Result<ProbeProcess> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for key in &self.env_remove {
            cmd.env_remove(key);
        }
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.program))?;
        info!(pid = ?child.id(), command = %self.display(), "spawned child");

        let stdin = child.stdin.take().context("child stdin was not piped")?;
        let stdout = child.stdout.take().context("child stdout was not piped")?;
        let stderr = child.stderr.take().context("child stderr was not piped")?;

        Ok(ProbeProcess {
            child,
            stdin: Some(stdin),
            stdout: Some(stdout),
            stderr: Some(stderr),
        })
    }
}

pub struct ProbeProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
}

impl ProbeProcess {
    /// Writes the message as one JSON line, then closes stdin so the child
    /// sees end of input. Returns the line that was written.
    pub async fn send_message(&mut self, message: &OutboundMessage) -> Result<String> {
        let line = message.to_line()?;
        let mut stdin = self.stdin.take().context("stdin already closed")?;
        stdin
            .write_all(line.as_bytes())
            .await
            .context("failed to write message to child stdin")?;
        stdin
            .write_all(b"\n")
            .await
            .context("failed to write message to child stdin")?;
        stdin.flush().await.context("failed to flush child stdin")?;
        drop(stdin);
        debug!(bytes = line.len() + 1, "message sent, stdin closed");
        Ok(line)
    }

    pub fn take_output(&mut self) -> Result<(ChildStdout, ChildStderr)> {
        let stdout = self.stdout.take().context("stdout already taken")?;
        let stderr = self.stderr.take().context("stderr already taken")?;
        Ok((stdout, stderr))
    }

    pub fn has_exited(&mut self) -> Result<bool> {
        let status = self
            .child
            .try_wait()
            .context("failed to poll child status")?;
        Ok(status.is_some())
    }

    pub fn kill(&mut self) -> Result<()> {
        match self.child.start_kill() {
            Ok(()) => {
                warn!(pid = ?self.child.id(), "killed child");
                Ok(())
            }
            // Already reaped; nothing left to kill.
            Err(err) if err.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(err) => Err(err).context("failed to kill child"),
        }
    }

    pub async fn wait(&mut self) -> Result<ExitStatus> {
        let status = self.child.wait().await.context("failed to wait for child")?;
        debug!(%status, "child reaped");
        Ok(status)
    }
}

pub fn ensure_command_available(program: &str) -> Result<PathBuf> {
    if program.trim().is_empty() {
        bail!("command is empty");
    }
    let resolved =
        which::which(program).with_context(|| format!("command not found: {program}"))?;
    debug!(path = %resolved.display(), "resolved command");
    Ok(resolved)
}

/// Exit code as a subprocess return code: signal terminations are negative.
pub fn exit_code(status: &ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}
