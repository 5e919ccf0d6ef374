use std::fmt::Write as _;
use std::io::Write as _;
use std::path::PathBuf;
use std::process::Command;

use tracing::{debug, info};

use crate::check_site;
use crate::error::{BootstrapError, BootstrapResult};

pub const SUPERVISOR_CONF: &str = "supervisord.conf";
pub const SUPERVISOR_PID_FILE: &str = "supervisord.pid";

/// One supervised program, rendered as a supervisord `[program:..]` stanza.
#[derive(Debug, Clone)]
pub struct ProgramEntry {
    pub name: String,
    pub command: String,
    pub stdout_logfile: PathBuf,
    pub stderr_logfile: PathBuf,
    pub autostart: bool,
}

impl ProgramEntry {
    pub fn render(&self) -> String {
        let mut stanza = String::new();
        let _ = writeln!(stanza, "[program:{}]", self.name);
        let _ = writeln!(stanza, "command={}", self.command);
        let _ = writeln!(stanza, "stdout_logfile={}", self.stdout_logfile.display());
        let _ = writeln!(stanza, "stderr_logfile={}", self.stderr_logfile.display());
        let _ = writeln!(stanza, "autostart={}", self.autostart);
        let _ = writeln!(stanza, "autorestart=false");
        stanza
    }
}

/// Handle on the supervisord instance owning one state directory.
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    state_dir: PathBuf,
}

impl SupervisorHandle {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self { state_dir: state_dir.into() }
    }

    pub fn conf_path(&self) -> PathBuf {
        self.state_dir.join(SUPERVISOR_CONF)
    }

    pub fn pid_file(&self) -> PathBuf {
        self.state_dir.join(SUPERVISOR_PID_FILE)
    }

    /// The pid file doubles as the cluster's mutual-exclusion guard. Its
    /// presence means another bootstrap owns the state directory; nothing may
    /// be touched until that cluster is stopped.
    pub fn ensure_not_running(&self) -> BootstrapResult<()> {
        let pid_file = self.pid_file();
        if pid_file.exists() {
            return Err(BootstrapError::ClusterAlreadyRunning { pid_file, site: check_site!() });
        }
        Ok(())
    }

    /// Appends a program stanza to the generated conf.
    pub fn append_program(&self, entry: &ProgramEntry) -> BootstrapResult<()> {
        let conf = self.conf_path();
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&conf)
            .map_err(BootstrapError::io(format!("opening {}", conf.display())))?;
        writeln!(file, "\n{}", entry.render().trim_end())
            .map_err(BootstrapError::io(format!("appending [program:{}] to {}", entry.name, conf.display())))?;
        debug!(program = %entry.name, autostart = entry.autostart, "appended supervisor stanza");
        Ok(())
    }

    /// Starts the supervisord daemon against the generated conf. Autostart
    /// programs (the relay) come up with it.
    pub fn start_daemon(&self) -> BootstrapResult<()> {
        let conf = self.conf_path();
        info!(conf = %conf.display(), "starting supervisord");
        run_checked(Command::new("supervisord").arg("-c").arg(&conf))
    }

    /// Starts one non-autostart program by name via supervisorctl.
    pub fn start_program(&self, name: &str) -> BootstrapResult<()> {
        info!(program = name, "starting supervised program");
        run_checked(Command::new("supervisorctl").arg("-c").arg(self.conf_path()).arg("start").arg(name))
    }

    /// Terminates the daemon via the pid recorded in its pid file and removes
    /// the file, releasing the state directory.
    pub fn stop_daemon(&self) -> BootstrapResult<()> {
        let pid_file = self.pid_file();
        let raw = std::fs::read_to_string(&pid_file)
            .map_err(BootstrapError::io(format!("reading {}", pid_file.display())))?;
        let pid = raw.trim();
        info!(pid, "stopping supervisord");
        run_checked(Command::new("kill").args(["-s", "TERM", pid]))?;
        std::fs::remove_file(&pid_file)
            .map_err(BootstrapError::io(format!("removing {}", pid_file.display())))?;
        Ok(())
    }
}

fn run_checked(command: &mut Command) -> BootstrapResult<()> {
    let output = command
        .output()
        .map_err(|e| BootstrapError::Supervisor(format!("failed to run {:?}: {e}", command.get_program())))?;
    if !output.status.success() {
        return Err(BootstrapError::Supervisor(format!(
            "{:?} exited with {}: {}",
            command.get_program(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}
