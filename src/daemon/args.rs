use std::path::PathBuf;

use clap::Parser;
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "timewarden-daemon", version, about = "Background tracker and enforcer of usage limits")]
pub struct DaemonArgs {
    /// Run in the foreground instead of detaching.
    #[arg(long)]
    pub force: bool,
    #[arg(long)]
    pub dir: Option<PathBuf>,
    /// This option is for debugging purposes only.
    #[arg(long = "log-console")]
    pub log_console: bool,
    #[arg(long = "log-filter")]
    pub log: Option<LevelFilter>,
    /// Don't start tracking the active window automatically.
    #[arg(long = "no-track")]
    pub no_track: bool,
    #[arg(long = "desktop-notifications")]
    pub desktop_notifications: bool,
}
