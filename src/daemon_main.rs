use std::env::args;

use anyhow::Result;
use clap::Parser;
use timewarden::{
    daemon::{args::DaemonArgs, start_daemon, DaemonOptions},
    utils::{
        dir::resolve_application_path,
        logging::{enable_logging, LogSource},
        runtime::single_thread_runtime,
    },
};

fn main() -> Result<()> {
    run_service(args().collect::<Vec<_>>())
}

fn run_service(command_args: Vec<String>) -> Result<()> {
    let args = DaemonArgs::parse_from(&command_args);

    // Detaching changes the working directory, so the path has to be absolute by then.
    let app_dir = std::fs::canonicalize(resolve_application_path(args.dir.clone())?)?;

    #[cfg(unix)]
    {
        if !args.force {
            use daemonize::Daemonize;

            let daemonize = Daemonize::new()
                .stdout(daemonize::Stdio::devnull())
                .stderr(daemonize::Stdio::devnull())
                .execute();
            match daemonize {
                daemonize::Outcome::Parent(parent) => {
                    parent.inspect_err(|e| {
                        eprintln!("Failed to create daemon on parent side {e:?}")
                    })?;
                    println!("Created daemon");
                    return Ok(());
                }
                daemonize::Outcome::Child(child) => {
                    child?;
                }
            }
        }
    }

    enable_logging(LogSource::Daemon, &app_dir.join("logs"), args.log, args.log_console)?;
    single_thread_runtime()?.block_on(start_daemon(
        app_dir,
        DaemonOptions {
            track: !args.no_track,
            interactive: false,
            desktop_notifications: args.desktop_notifications,
        },
    ))
}
