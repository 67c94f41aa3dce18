//! Line based console for a daemon running in the foreground. Every line is parsed as a small
//! command with clap and executed against [Core].

use std::{io::Write, num::NonZeroU32};

use anyhow::Result;
use chrono::{Duration, Local};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use tokio::io::{stdin, AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::LinesStream;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{
    daemon::control::Core,
    ledger::UsageLedger,
    utils::time::format_duration,
};

#[derive(Parser, Debug)]
#[command(no_binary_name = true, name = "console", disable_version_flag = true)]
struct ConsoleLine {
    #[command(subcommand)]
    command: ConsoleCommand,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    #[command(about = "Start tracking the active window")]
    Start,
    #[command(about = "Stop tracking and save the current session")]
    Stop,
    #[command(about = "Show tracking state, active blocks and today's usage")]
    Status,
    #[command(about = "Block processes containing KEY for MINUTES")]
    Block { key: String, minutes: NonZeroU32 },
    #[command(about = "Remove a block")]
    Unblock { key: String },
    #[command(about = "Add MINUTES of usage of an application ending now")]
    Add {
        minutes: u32,
        #[arg(required = true, num_args = 1..)]
        app: Vec<String>,
    },
    #[command(about = "Show the category of an application")]
    Classify {
        #[arg(required = true, num_args = 1..)]
        name: Vec<String>,
    },
    #[command(about = "Check today's usage of an application against the limit")]
    Check {
        #[arg(required = true, num_args = 1..)]
        app: Vec<String>,
    },
    #[command(about = "Stop the daemon", visible_alias = "exit")]
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Blank lines produce [None].
pub fn parse_line(line: &str) -> Result<Option<ConsoleCommand>, clap::Error> {
    let words = line.split_whitespace().collect::<Vec<_>>();
    if words.is_empty() {
        return Ok(None);
    }
    ConsoleLine::try_parse_from(words).map(|v| Some(v.command))
}

pub async fn execute<L: UsageLedger>(
    core: &Core<L>,
    command: ConsoleCommand,
    out: &mut impl Write,
) -> Result<Flow> {
    match command {
        ConsoleCommand::Start => {
            if core.start_tracking().await {
                writeln!(out, "Tracking started")?;
            } else {
                writeln!(out, "Tracking isn't available on this system")?;
            }
        }
        ConsoleCommand::Stop => {
            core.stop_tracking().await;
            writeln!(out, "Tracking stopped")?;
        }
        ConsoleCommand::Status => print_status(core, out).await?,
        ConsoleCommand::Block { key, minutes } => {
            let until = core.manual_block(&key, minutes.get())?;
            writeln!(
                out,
                "{} blocked until {}",
                key.trim().to_lowercase(),
                until.with_timezone(&Local).format("%H:%M")
            )?;
        }
        ConsoleCommand::Unblock { key } => {
            if core.unblock(&key) {
                writeln!(out, "Unblocked {key}")?;
            } else {
                writeln!(out, "{key} wasn't blocked")?;
            }
        }
        ConsoleCommand::Add { minutes, app } => {
            let app = app.join(" ");
            let directive = core
                .manual_add_usage(&app, minutes.saturating_mul(60))
                .await?;
            writeln!(out, "Added {minutes} minutes of {app}")?;
            if let Some(directive) = directive {
                writeln!(
                    out,
                    "Usage limit reached, {} is blocked for {} minutes",
                    directive.key, directive.duration_minutes
                )?;
            }
        }
        ConsoleCommand::Classify { name } => {
            let name = name.join(" ");
            writeln!(out, "{name}: {}", core.classify(&name))?;
        }
        ConsoleCommand::Check { app } => {
            let app = app.join(" ");
            match core.evaluate_and_maybe_block(&app).await? {
                Some(directive) => writeln!(
                    out,
                    "{app} is over the limit, {} is blocked for {} minutes",
                    directive.key, directive.duration_minutes
                )?,
                None => writeln!(out, "{app} is within its limit")?,
            }
        }
        ConsoleCommand::Quit => return Ok(Flow::Quit),
    }
    Ok(Flow::Continue)
}

async fn print_status<L: UsageLedger>(core: &Core<L>, out: &mut impl Write) -> Result<()> {
    let tracking = if core.is_tracking() { "on" } else { "off" };
    writeln!(out, "Tracking: {tracking}")?;

    let blocked = core.blocked_snapshot();
    if blocked.is_empty() {
        writeln!(out, "Nothing is blocked")?;
    } else {
        writeln!(out, "Blocked:")?;
        for status in blocked {
            writeln!(
                out,
                "  {} for {} more minutes",
                status.key, status.minutes_remaining
            )?;
        }
    }

    let mut totals = core.today_totals().await?.into_iter().collect::<Vec<_>>();
    totals.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    if totals.is_empty() {
        writeln!(out, "No usage today")?;
    } else {
        writeln!(out, "Today:")?;
        for (app, seconds) in totals {
            writeln!(
                out,
                "  {app} {} ({})",
                format_duration(Duration::seconds(seconds)),
                core.classify(&app)
            )?;
        }
    }
    Ok(())
}

/// Reads commands from stdin until `quit`, end of input or shutdown.
pub async fn run_console<L: UsageLedger>(core: &Core<L>, shutdown: CancellationToken) -> Result<()> {
    let mut lines = LinesStream::new(BufReader::new(stdin()).lines());
    let mut stdout = std::io::stdout();
    writeln!(stdout, "Type `help` to see available commands")?;

    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;

        let line = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            line = lines.next() => line,
        };
        let Some(line) = line else {
            return Ok(());
        };

        let command = match parse_line(&line?) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                write!(stdout, "{}", e.render())?;
                continue;
            }
        };

        match execute(core, command, &mut stdout).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => return Ok(()),
            Err(e) => {
                warn!("Console command failed {e:?}");
                writeln!(stdout, "Error: {e}")?;
            }
        }
    }
}
