use std::{
    env,
    path::{Path, PathBuf},
    process::Stdio,
};

use anyhow::Result;
use sysinfo::{get_current_pid, Signal, System};
use tracing::info;

use super::daemon_path::to_daemon_path;

/// Terminates every other process started from the executable at `name`. Returns how many were
/// found.
pub fn kill_previous_servers(name: &Path) -> usize {
    let system = System::new_all();
    let current_id = get_current_pid().ok();
    let mut killed = 0;
    for (pid, process) in system.processes().iter() {
        if Some(*pid) == current_id {
            continue;
        }
        if current_id.is_some() && process.parent() == current_id {
            continue;
        }

        if process
            .exe()
            .filter(|v| v.exists())
            .filter(|v| name == *v)
            .is_some()
        {
            // This will forcefully terminate the process on Windows. Anything better will require a
            // lot more work.
            if process.kill_with(Signal::Term).is_none() {
                process.kill();
            }
            process.wait();
            info!("Stopped {name:?} ({pid})");
            killed += 1;
        }
    }
    killed
}

/// Stops the daemon and every foreground `serve` or `console` instance.
pub fn stop_servers() -> Result<usize> {
    let cli = env::current_exe()?;
    Ok(kill_previous_servers(&to_daemon_path(cli.clone())) + kill_previous_servers(&cli))
}

/// Arguments passed to the daemon binary on start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DaemonLaunch {
    pub dir: Option<PathBuf>,
    pub no_track: bool,
    pub desktop_notifications: bool,
}

impl DaemonLaunch {
    fn args(&self) -> Vec<String> {
        let mut args = vec![];
        if let Some(dir) = &self.dir {
            args.push("--dir".to_string());
            args.push(dir.to_string_lossy().into_owned());
        }
        if self.no_track {
            args.push("--no-track".into());
        }
        if self.desktop_notifications {
            args.push("--desktop-notifications".into());
        }
        args
    }
}

/// Shuts down the previous daemon and starts a new one. The daemon binary detaches by itself.
pub fn restart_server(launch: &DaemonLaunch) -> Result<()> {
    let daemon = to_daemon_path(env::current_exe()?);
    kill_previous_servers(&daemon);

    let mut command = std::process::Command::new(&daemon);
    command.args(launch.args());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    command.stdin(Stdio::null());
    command.stdout(Stdio::null());

    info!("Spawning {daemon:?}");
    #[allow(clippy::zombie_processes)]
    let _ = command.spawn()?;
    println!("Started timewarden daemon");
    Ok(())
}
