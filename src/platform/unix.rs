use tokio::process::Command;
use tracing::{debug, warn};

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;

/// No-op handle on Unix; process group cleanup uses killpg with the child PID.
pub struct ProcessGroupHandle;

pub fn shell_name() -> String {
    "sh -c".to_string()
}

pub fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

pub fn configure_process_group(cmd: &mut Command) {
    cmd.process_group(0);
}

pub fn post_spawn_setup(_child_pid: Option<u32>) -> Option<ProcessGroupHandle> {
    // On Unix, process group is configured before spawn via process_group(0).
    None
}

pub fn request_termination(
    child: &mut tokio::process::Child,
    child_pid: Option<u32>,
    _group_handle: Option<&ProcessGroupHandle>,
) -> std::io::Result<()> {
    let Some(pid) = child_pid else {
        // Already reaped.
        return Ok(());
    };

    match killpg(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) => {
            debug!(pid, "sent SIGTERM to process group");
            Ok(())
        }
        Err(nix::errno::Errno::ESRCH) => {
            debug!(pid, "process group already exited");
            Ok(())
        }
        Err(e) => {
            warn!(pid, error = %e, "killpg(SIGTERM) failed, falling back to kill");
            child.start_kill()
        }
    }
}

pub fn force_kill(
    child: &mut tokio::process::Child,
    child_pid: Option<u32>,
    _group_handle: Option<&ProcessGroupHandle>,
) {
    if let Some(pid) = child_pid {
        if killpg(Pid::from_raw(pid as i32), Signal::SIGKILL).is_ok() {
            debug!(pid, "sent SIGKILL to process group");
            return;
        }
    }
    let _ = child.start_kill();
}
