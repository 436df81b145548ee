use std::time::Duration;
use tokio::process::Child;

/// Terminate a child and its process group: SIGTERM, grace period, SIGKILL.
///
/// The child must lead its own process group (see `spawn_tool`), otherwise
/// the signal is delivered to the caller's group. Safe to call on a child
/// that already exited.
pub async fn terminate_process_group(child: &mut Child, grace: Duration) {
    if matches!(child.try_wait(), Ok(Some(_))) {
        return;
    }

    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // SAFETY: kill() is async-signal-safe. Negative PID targets process group.
        unsafe {
            libc::kill(-(pid as i32), libc::SIGTERM);
        }
        if tokio::time::timeout(grace, child.wait()).await.is_ok() {
            return;
        }
        tracing::debug!(pid, "Grace period elapsed, sending SIGKILL");
        // SAFETY: as above.
        unsafe {
            libc::kill(-(pid as i32), libc::SIGKILL);
        }
    }

    #[cfg(not(unix))]
    let _ = grace;

    let _ = child.start_kill();
}

/// Whether a process with this PID currently exists.
pub fn is_process_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        // SAFETY: signal 0 performs only the existence/permission check.
        let ret = unsafe { libc::kill(pid as i32, 0) };
        ret == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}
