use std::path::{Path, PathBuf};

/// XDG app name used for the user-level config directory.
pub const APP_NAME: &str = "attach-probe";
/// Project-local config file name, looked up in the working directory.
pub const PROJECT_CONFIG_FILE: &str = ".aprobe.toml";
const USER_CONFIG_FILE: &str = "config.toml";

/// User-level config directory (`~/.config/attach-probe` on Linux).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// User-level config file path.
pub fn user_config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join(USER_CONFIG_FILE))
}

/// Resolve which config file to read.
///
/// Lookup order: explicit path, `{cwd}/.aprobe.toml`, user config. Only the
/// explicit path is returned without an existence check, so a typo in
/// `--config` surfaces as a read error instead of silently using defaults.
pub fn resolve_config_path(explicit: Option<&Path>, cwd: &Path) -> Option<PathBuf> {
    resolve_with_user_path(explicit, cwd, user_config_path())
}

pub(crate) fn resolve_with_user_path(
    explicit: Option<&Path>,
    cwd: &Path,
    user_path: Option<PathBuf>,
) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let project = cwd.join(PROJECT_CONFIG_FILE);
    if project.is_file() {
        return Some(project);
    }
    user_path.filter(|p| p.is_file())
}
