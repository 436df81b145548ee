//! Host platform detection and the attach-capability probe.
//!
//! Attaching a debugger-style tool to another process needs OS permission:
//! - Linux: Yama `ptrace_scope` must be 0 (or we are root and it is not 3),
//!   and SELinux `deny_ptrace` must be off
//! - macOS: root
//! - Other: assumed allowed

use std::path::Path;
use std::process::Command;
use std::sync::OnceLock;

const PTRACE_SCOPE_PATH: &str = "/proc/sys/kernel/yama/ptrace_scope";
const GETSEBOOL: &str = "/usr/sbin/getsebool";

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HostOs {
    Linux,
    MacOs,
    Windows,
    Other,
}

impl HostOs {
    pub fn current() -> Self {
        match std::env::consts::OS {
            "linux" => Self::Linux,
            "macos" => Self::MacOs,
            "windows" => Self::Windows,
            _ => Self::Other,
        }
    }
}

impl std::fmt::Display for HostOs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Linux => write!(f, "Linux"),
            Self::MacOs => write!(f, "macOS"),
            Self::Windows => write!(f, "Windows"),
            Self::Other => write!(f, "{}", std::env::consts::OS),
        }
    }
}

/// Whether this host lets us attach to another process.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum AttachCapability {
    Allowed,
    Denied(String),
}

impl AttachCapability {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Allowed => None,
            Self::Denied(reason) => Some(reason),
        }
    }
}

/// Facts about the host the harness branches on.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct HostPlatform {
    pub os: HostOs,
    pub attach: AttachCapability,
}

impl HostPlatform {
    /// Probe the real host. The attach probe runs at most once per process.
    pub fn detect() -> Self {
        Self {
            os: HostOs::current(),
            attach: detect_attach_capability().clone(),
        }
    }

    /// Real OS, attach capability forced to allowed.
    pub fn assume_attach() -> Self {
        Self {
            os: HostOs::current(),
            attach: AttachCapability::Allowed,
        }
    }

    pub fn can_attach(&self) -> bool {
        self.attach.is_allowed()
    }
}

static ATTACH: OnceLock<AttachCapability> = OnceLock::new();

pub fn detect_attach_capability() -> &'static AttachCapability {
    ATTACH.get_or_init(probe_attach_capability)
}

fn probe_attach_capability() -> AttachCapability {
    match HostOs::current() {
        HostOs::Linux => {
            let scope = std::fs::read_to_string(PTRACE_SCOPE_PATH).ok();
            linux_attach_capability(scope.as_deref(), is_root(), selinux_denies_ptrace())
        }
        HostOs::MacOs => {
            if is_root() {
                AttachCapability::Allowed
            } else {
                AttachCapability::Denied("attaching on macOS requires root".into())
            }
        }
        HostOs::Windows | HostOs::Other => AttachCapability::Allowed,
    }
}

/// Decide Linux attach permission from the raw probe inputs.
pub(crate) fn linux_attach_capability(
    ptrace_scope: Option<&str>,
    is_root: bool,
    selinux_denies: bool,
) -> AttachCapability {
    if selinux_denies {
        return AttachCapability::Denied("SELinux deny_ptrace is on".into());
    }
    let Some(scope) = ptrace_scope.map(str::trim) else {
        // No Yama module: classic ptrace rules apply.
        return AttachCapability::Allowed;
    };
    if scope.starts_with('3') {
        return AttachCapability::Denied("ptrace_scope is 3 (attach disabled)".into());
    }
    if !is_root && !scope.starts_with('0') {
        return AttachCapability::Denied(format!(
            "ptrace_scope is {scope}; only child processes can be attached without root"
        ));
    }
    AttachCapability::Allowed
}

fn selinux_denies_ptrace() -> bool {
    if !Path::new(GETSEBOOL).exists() {
        return false;
    }
    Command::new(GETSEBOOL)
        .arg("deny_ptrace")
        .stdin(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .output()
        .is_ok_and(|out| {
            out.status.success() && String::from_utf8_lossy(&out.stdout).contains("--> on")
        })
}

fn is_root() -> bool {
    #[cfg(unix)]
    {
        // SAFETY: `geteuid` has no preconditions and returns caller effective UID.
        unsafe { libc::geteuid() == 0 }
    }
    #[cfg(not(unix))]
    {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_zero_allows_non_root() {
        assert_eq!(
            linux_attach_capability(Some("0\n"), false, false),
            AttachCapability::Allowed
        );
    }

    #[test]
    fn test_scope_one_denies_non_root_allows_root() {
        assert!(!linux_attach_capability(Some("1\n"), false, false).is_allowed());
        assert!(linux_attach_capability(Some("1\n"), true, false).is_allowed());
    }

    #[test]
    fn test_scope_three_denies_everyone() {
        let cap = linux_attach_capability(Some("3"), true, false);
        assert!(matches!(cap, AttachCapability::Denied(reason) if reason.contains("3")));
    }

    #[test]
    fn test_missing_yama_allows() {
        assert!(linux_attach_capability(None, false, false).is_allowed());
    }

    #[test]
    fn test_selinux_deny_wins() {
        let cap = linux_attach_capability(Some("0"), true, true);
        assert!(matches!(cap, AttachCapability::Denied(reason) if reason.contains("SELinux")));
    }

    #[test]
    fn test_detect_is_cached() {
        let first = detect_attach_capability() as *const AttachCapability;
        let second = detect_attach_capability() as *const AttachCapability;
        assert_eq!(first, second);
    }

    #[test]
    fn test_assume_attach_keeps_real_os() {
        let platform = HostPlatform::assume_attach();
        assert_eq!(platform.os, HostOs::current());
        assert!(platform.can_attach());
    }
}
