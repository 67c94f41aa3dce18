pub mod configure;
pub mod console;
pub mod daemon_path;
pub mod process;
pub mod report;

use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use configure::{
    process_goals_command, process_rules_command, process_settings_command, GoalsCommand,
    RulesCommand, SettingsCommand,
};
use process::{restart_server, stop_servers, DaemonLaunch};
use report::{process_report_command, ReportCommand};
use tracing::level_filters::LevelFilter;

use crate::{
    config::{ConfigStore, JsonConfigStore},
    daemon::{start_daemon, DaemonOptions},
    ledger::{file_ledger::FileLedger, UsageLedger},
    rules::classify,
    utils::{
        dir::resolve_application_path,
        logging::{enable_logging, LogSource},
    },
};

#[derive(Parser, Debug)]
#[command(name = "Timewarden", version, long_about = None)]
#[command(about = "Tracks application usage and enforces self-imposed limits", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
    #[arg(long, global = true, help = "Enable logging")]
    log: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Starts a daemon for the application")]
    Init {
        #[arg(long, help = "Don't track the active window, only manual usage is checked")]
        no_track: bool,
        #[arg(long, help = "Show desktop notifications through notify-send")]
        desktop_notifications: bool,
    },
    #[command(
        about = "Run a daemon directly in current console. Used for debugging and on systems without a daemon binary"
    )]
    Serve {
        #[arg(long)]
        no_track: bool,
        #[arg(long)]
        desktop_notifications: bool,
    },
    #[command(about = "Run a daemon in the foreground and control it with typed commands")]
    Console {
        #[arg(long, help = "Start tracking the active window right away")]
        track: bool,
        #[arg(long)]
        desktop_notifications: bool,
    },
    #[command(about = "Stop currently running daemon.")]
    Stop {},
    #[command(about = "Display usage of a day and the days before it")]
    Report {
        #[command(flatten)]
        command: ReportCommand,
    },
    #[command(about = "Record usage that happened away from the tracker, ending now")]
    AddUsage {
        app: String,
        #[arg(long, short)]
        minutes: u32,
    },
    #[command(about = "Show the category of an application")]
    Classify { name: String },
    #[command(about = "Show or change classification keywords")]
    Rules {
        #[command(subcommand)]
        command: RulesCommand,
    },
    #[command(about = "Show or change limits")]
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },
    #[command(about = "Manage daily goals")]
    Goals {
        #[command(subcommand)]
        command: GoalsCommand,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();
    let dir = resolve_application_path(args.dir.clone())?;

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    let source = match args.commands {
        Commands::Serve { .. } => LogSource::Daemon,
        Commands::Console { .. } => LogSource::Console,
        _ => LogSource::Cli,
    };
    enable_logging(source, &dir.join("logs"), logging_level, args.log)?;

    let mut stdout = std::io::stdout();
    match args.commands {
        Commands::Init {
            no_track,
            desktop_notifications,
        } => restart_server(&DaemonLaunch {
            dir: args.dir,
            no_track,
            desktop_notifications,
        }),
        Commands::Stop {} => {
            let stopped = stop_servers()?;
            println!("Stopped {stopped} processes");
            Ok(())
        }
        Commands::Serve {
            no_track,
            desktop_notifications,
        } => {
            start_daemon(
                dir,
                DaemonOptions {
                    track: !no_track,
                    interactive: false,
                    desktop_notifications,
                },
            )
            .await
        }
        Commands::Console {
            track,
            desktop_notifications,
        } => {
            start_daemon(
                dir,
                DaemonOptions {
                    track,
                    interactive: true,
                    desktop_notifications,
                },
            )
            .await
        }
        Commands::Report { command } => process_report_command(command, &dir).await,
        Commands::AddUsage { app, minutes } => {
            let ledger = FileLedger::new(dir.join("sessions"))?;
            let end = Utc::now();
            let start = end - chrono::Duration::minutes(i64::from(minutes));
            match ledger.append(&app, start, end).await? {
                Some(session) => println!(
                    "Added {minutes} minutes of {}. A running daemon checks the limit within 30 seconds",
                    session.app_name
                ),
                None => println!("Nothing to add"),
            }
            Ok(())
        }
        Commands::Classify { name } => {
            let rules = JsonConfigStore::new(dir)?.load_rules();
            println!("{name}: {}", classify(&name, &rules));
            Ok(())
        }
        Commands::Rules { command } => {
            process_rules_command(command, &JsonConfigStore::new(dir)?, &mut stdout)
        }
        Commands::Settings { command } => {
            process_settings_command(command, &JsonConfigStore::new(dir)?, &mut stdout)
        }
        Commands::Goals { command } => {
            process_goals_command(command, &JsonConfigStore::new(dir)?, &mut stdout)
        }
    }
}
