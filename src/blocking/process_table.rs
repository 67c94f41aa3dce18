use sysinfo::{Pid, ProcessesToUpdate, Signal, System};

use crate::error::ProcessAccessError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveProcess {
    pub pid: u32,
    pub name: String,
}

/// View of the live processes of the machine.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessTable {
    fn list_processes(&mut self) -> Vec<LiveProcess>;

    fn terminate(&mut self, pid: u32) -> Result<(), ProcessAccessError>;
}

/// [ProcessTable] backed by [sysinfo]. The process list is refreshed on every listing.
pub struct SysinfoProcessTable {
    system: System,
}

impl SysinfoProcessTable {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for SysinfoProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SysinfoProcessTable {
    fn list_processes(&mut self) -> Vec<LiveProcess> {
        self.system.refresh_processes(ProcessesToUpdate::All, true);
        self.system
            .processes()
            .iter()
            .map(|(pid, process)| LiveProcess {
                pid: pid.as_u32(),
                name: process.name().to_string_lossy().to_string(),
            })
            .collect()
    }

    fn terminate(&mut self, pid: u32) -> Result<(), ProcessAccessError> {
        let Some(process) = self.system.process(Pid::from_u32(pid)) else {
            return Err(ProcessAccessError::NotFound { pid });
        };

        // Term gives the application a chance to save its state. Platforms without signals only
        // support a forceful kill.
        match process.kill_with(Signal::Term) {
            Some(true) => Ok(()),
            Some(false) => Err(ProcessAccessError::PermissionDenied { pid }),
            None if process.kill() => Ok(()),
            None => Err(ProcessAccessError::Other {
                pid,
                reason: "kill request was rejected".into(),
            }),
        }
    }
}
