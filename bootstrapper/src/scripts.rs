//! Operator-facing helper scripts.
//!
//! Generated rather than shipped so they embed the resolved state directory;
//! the `stop` CLI subcommand performs the same teardown as `cluster-stop`.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::error::{BootstrapError, BootstrapResult};
use crate::supervisor::{SUPERVISOR_CONF, SUPERVISOR_PID_FILE};

pub const START_SCRIPT: &str = "cluster-start";
pub const SUPERVISOR_START_SCRIPT: &str = "supervisord-start";
pub const STOP_SCRIPT: &str = "cluster-stop";

/// Writes the start/stop helpers into the state directory and marks them
/// executable.
pub fn write_helper_scripts(state_dir: &Path) -> BootstrapResult<()> {
    let conf = state_dir.join(SUPERVISOR_CONF);
    let pid_file = state_dir.join(SUPERVISOR_PID_FILE);

    write_script(
        &state_dir.join(SUPERVISOR_START_SCRIPT),
        &format!("#!/usr/bin/env bash\nset -euo pipefail\nsupervisord -c \"{}\"\n", conf.display()),
    )?;
    write_script(
        &state_dir.join(START_SCRIPT),
        &format!("#!/usr/bin/env bash\nset -euo pipefail\nsupervisorctl -c \"{}\" start all\n", conf.display()),
    )?;
    write_script(
        &state_dir.join(STOP_SCRIPT),
        &format!(
            "#!/usr/bin/env bash\nset -euo pipefail\nkill \"$(cat \"{pid}\")\"\nrm -f \"{pid}\"\n",
            pid = pid_file.display()
        ),
    )?;
    Ok(())
}

pub fn stop_script_path(state_dir: &Path) -> PathBuf {
    state_dir.join(STOP_SCRIPT)
}

fn write_script(path: &Path, contents: &str) -> BootstrapResult<()> {
    std::fs::write(path, contents)
        .map_err(BootstrapError::io(format!("writing {}", path.display())))?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .map_err(BootstrapError::io(format!("chmod {}", path.display())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripts_are_executable_and_embed_the_state_dir() {
        let dir = tempfile::tempdir().unwrap();
        write_helper_scripts(dir.path()).unwrap();

        for name in [START_SCRIPT, SUPERVISOR_START_SCRIPT, STOP_SCRIPT] {
            let path = dir.path().join(name);
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o755, 0o755, "{name} should be executable");
            let body = std::fs::read_to_string(&path).unwrap();
            assert!(body.contains(dir.path().to_str().unwrap()), "{name} should embed the state dir");
        }

        let stop = std::fs::read_to_string(dir.path().join(STOP_SCRIPT)).unwrap();
        assert!(stop.contains(SUPERVISOR_PID_FILE));
        assert!(stop.contains("rm -f"));
    }
}
