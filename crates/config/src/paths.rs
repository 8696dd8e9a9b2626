//! State-directory path resolution.
//!
//! Everything the runtime persists lives under one state directory,
//! `~/.picoclaw` by default, overridable via `PICOCLAW_HOME`.

use std::path::PathBuf;

/// The PicoClaw state directory. Checks the `PICOCLAW_HOME` env var first
/// (with `~` expansion), then defaults to `~/.picoclaw`.
pub fn state_dir() -> PathBuf {
    if let Ok(home) = std::env::var("PICOCLAW_HOME") {
        if !home.is_empty() {
            return PathBuf::from(expand_home(&home));
        }
    }
    home_dir().join(".picoclaw")
}

/// Path to `config.json`.
pub fn config_path() -> PathBuf {
    state_dir().join("config.json")
}

/// Path to `auth.json` (provider credential store, opaque to the core).
pub fn auth_path() -> PathBuf {
    state_dir().join("auth.json")
}

/// Path to the global skills directory.
pub fn global_skills_path() -> PathBuf {
    state_dir().join("skills")
}

/// Path to the builtin skills directory shipped with the install.
pub fn builtin_skills_path(state_dir: &std::path::Path) -> PathBuf {
    state_dir.join("picoclaw").join("skills")
}

/// The default workspace path: `<state-dir>/workspace`.
pub fn default_workspace() -> PathBuf {
    state_dir().join("workspace")
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> String {
    if path.is_empty() || !path.starts_with('~') {
        return path.to_string();
    }
    let home = home_dir();
    match path.strip_prefix("~/") {
        Some(rest) => home.join(rest).to_string_lossy().to_string(),
        None if path == "~" => home.to_string_lossy().to_string(),
        None => path.to_string(),
    }
}

/// The user's home directory.
pub fn home_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_home_replaces_tilde() {
        let home = home_dir();
        let expanded = expand_home("~/notes");
        assert_eq!(expanded, home.join("notes").to_string_lossy());
    }

    #[test]
    fn expand_home_bare_tilde() {
        let home = home_dir();
        assert_eq!(expand_home("~"), home.to_string_lossy());
    }

    #[test]
    fn expand_home_leaves_plain_paths() {
        assert_eq!(expand_home("/var/lib/picoclaw"), "/var/lib/picoclaw");
        assert_eq!(expand_home(""), "");
    }

    #[test]
    fn derived_paths_hang_off_state_dir() {
        let state = state_dir();
        assert_eq!(config_path(), state.join("config.json"));
        assert_eq!(auth_path(), state.join("auth.json"));
        assert_eq!(global_skills_path(), state.join("skills"));
        assert_eq!(default_workspace(), state.join("workspace"));
    }
}
