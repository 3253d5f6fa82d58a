//! Settings location

use crate::{AppError, AppResult};
use hotkey::JsonFileStore;
use std::ffi::OsString;
use std::path::PathBuf;
use tracing::debug;

/// Overrides the settings directory
pub const CONFIG_DIR_ENV: &str = "LIVEPIP_CONFIG_DIR";
pub const SETTINGS_FILE: &str = "settings.json";

const APP_DIR: &str = "livepip";

/// A non-empty override wins, otherwise `<base>/livepip`.
pub fn resolve_config_dir(
    override_dir: Option<OsString>,
    base: Option<PathBuf>,
) -> Option<PathBuf> {
    match override_dir {
        Some(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => base.map(|base| base.join(APP_DIR)),
    }
}

pub fn config_dir() -> AppResult<PathBuf> {
    resolve_config_dir(std::env::var_os(CONFIG_DIR_ENV), dirs::config_dir())
        .ok_or(AppError::NoConfigDir)
}

pub fn settings_path() -> AppResult<PathBuf> {
    Ok(config_dir()?.join(SETTINGS_FILE))
}

pub fn hotkey_store() -> AppResult<JsonFileStore> {
    let path = settings_path()?;
    debug!(event = "app.config.settings_path", path = %path.display());
    Ok(JsonFileStore::new(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotkey::{load_or_default, HotkeyConfig, HotkeyStore, Modifiers};

    #[test]
    fn override_takes_precedence() {
        let dir = resolve_config_dir(
            Some(OsString::from("/tmp/pip")),
            Some(PathBuf::from("/home/u/.config")),
        );
        assert_eq!(dir, Some(PathBuf::from("/tmp/pip")));
    }

    #[test]
    fn empty_override_falls_back_to_base() {
        let dir = resolve_config_dir(Some(OsString::new()), Some(PathBuf::from("/cfg")));
        assert_eq!(dir, Some(PathBuf::from("/cfg").join("livepip")));
        assert_eq!(resolve_config_dir(None, None), None);
    }

    #[test]
    fn chord_survives_restart() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = resolve_config_dir(None, Some(tmp.path().to_path_buf())).unwrap();
        let path = dir.join(SETTINGS_FILE);

        let chord = HotkeyConfig::new(0x4C, Modifiers::CONTROL | Modifiers::SHIFT);
        JsonFileStore::new(&path).save(&chord).unwrap();

        let reopened = JsonFileStore::new(&path);
        assert_eq!(load_or_default(&reopened), chord);
    }
}
