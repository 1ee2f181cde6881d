use std::path::PathBuf;

pub const PROGRAM_NAME: &str = "ferry";
pub const PROGRAM_LOG_LEVEL: &str = "FERRY_LOG_LEVEL";
pub const SETTINGS_FILE_NAME: &str = "settings.json";

/// Default number of items per batch before it closes.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 10;
/// Default batch age in milliseconds before it closes.
pub const DEFAULT_MAX_BATCH_AGE_MS: i64 = 250;

pub fn xdg_or_home(xdg_var: &str, home_suffix: &str) -> PathBuf {
    if let Some(dir) = std::env::var_os(xdg_var) {
        PathBuf::from(dir)
    } else {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(home_suffix)
    }
}

/// Directory holding ferry's configuration.
///
/// `XDG_CONFIG_HOME` wins when set and non-empty, then the platform config
/// dir, then `~/.config`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME")
        && !xdg.is_empty()
    {
        return PathBuf::from(xdg).join(PROGRAM_NAME);
    }

    dirs::config_dir()
        .map(|p| p.join(PROGRAM_NAME))
        .unwrap_or_else(|| xdg_or_home("XDG_CONFIG_HOME", ".config").join(PROGRAM_NAME))
}

/// Default settings file path
pub fn default_settings_path() -> PathBuf {
    config_dir().join(SETTINGS_FILE_NAME)
}
