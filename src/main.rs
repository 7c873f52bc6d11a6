mod config;
mod poll;
mod probe;
mod process;
mod report;
mod stream;
mod types;
mod wirelog;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use config::ProbeConfig;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use types::OutboundMessage;

#[derive(Parser)]
#[command(name = "ccprobe")]
#[command(about = "Smoke test for a CLI's stream-json stdin/stdout mode")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Spawn the CLI, send one message and echo its output (default)
    Run(RunArgs),
    /// Print the JSON line that would be written to stdin.
    ///
    /// Only `[message]` is read from `--config`; the command and poll
    /// settings are not validated here, unlike `run`.
    Message {
        /// Message text
        #[arg(long)]
        text: Option<String>,
        #[arg(long, env = "CCPROBE_CONFIG")]
        config: Option<PathBuf>,
    },
}

#[derive(Args, Default)]
struct RunArgs {
    /// TOML file overriding the built-in defaults
    #[arg(long, env = "CCPROBE_CONFIG")]
    config: Option<PathBuf>,
    #[arg(long)]
    claude_cmd: Option<String>,
    /// Prompt passed as the final positional argument
    #[arg(long)]
    prompt: Option<String>,
    /// Text of the message written to stdin
    #[arg(long)]
    text: Option<String>,
    /// Hang timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
    #[arg(long)]
    interval_ms: Option<u64>,
    /// Write every stdio line to this JSONL file
    #[arg(long)]
    wire_log: Option<PathBuf>,
    /// Print a digest of the stream-json events after the run
    #[arg(long)]
    summary: bool,
}

impl RunArgs {
    fn resolve(&self) -> Result<ProbeConfig> {
        let mut cfg = load_config(self.config.as_deref())?;
        if let Some(cmd) = &self.claude_cmd {
            cfg.command.program = cmd.clone();
        }
        if let Some(prompt) = &self.prompt {
            cfg.command.prompt = prompt.clone();
        }
        if let Some(text) = &self.text {
            cfg.message.text = text.clone();
        }
        if let Some(timeout) = self.timeout {
            cfg.poll.timeout_secs = timeout;
        }
        if let Some(interval) = self.interval_ms {
            cfg.poll.interval_ms = interval;
        }
        if let Some(path) = &self.wire_log {
            cfg.log.wire_log = Some(path.clone());
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<ProbeConfig> {
    match path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading config");
            ProbeConfig::load(path)
        }
        None => Ok(ProbeConfig::default()),
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ccprobe=info")))
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command.unwrap_or_else(|| Commands::Run(RunArgs::default())) {
        Commands::Run(args) => {
            let cfg = args.resolve()?;
            let report = probe::run(&cfg, args.summary).await?;
            Ok(if report.success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Message { text, config } => {
            let cfg = load_config(config.as_deref())?;
            let text = text.unwrap_or(cfg.message.text);
            println!("{}", OutboundMessage::user_text(text).to_line()?);
            Ok(ExitCode::SUCCESS)
        }
    }
}
