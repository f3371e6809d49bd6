//! The two file sources behind [`crate::load_and_apply`]: project `.env` and the XDG
//! `config.toml` `[env]` table. Both return plain key/value maps; precedence is decided in lib.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::LoadError;

/// `$XDG_CONFIG_HOME/<app>/config.toml`, falling back to the platform config dir.
/// Returns the path whether or not the file exists.
pub(crate) fn xdg_config_file(app_name: &str) -> Result<PathBuf, LoadError> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(dirs::config_dir)
        .ok_or_else(|| LoadError::XdgPath("no config directory for this platform".into()))?;
    Ok(base.join(app_name).join("config.toml"))
}

/// `.env` in `override_dir`, or in the current directory.
pub(crate) fn dotenv_file(override_dir: Option<&Path>) -> Option<PathBuf> {
    let dir = override_dir
        .map(Path::to_path_buf)
        .or_else(|| std::env::current_dir().ok())?;
    Some(dir.join(".env"))
}

#[derive(serde::Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    env: HashMap<String, String>,
}

/// Reads the `[env]` table. Missing file or missing section yields an empty map.
pub(crate) fn read_xdg_env(path: &Path) -> Result<HashMap<String, String>, LoadError> {
    if !path.is_file() {
        return Ok(HashMap::new());
    }
    let content = std::fs::read_to_string(path).map_err(LoadError::XdgRead)?;
    let config: ConfigFile = toml::from_str(&content)?;
    Ok(config.env)
}

/// Parses a `.env` file with the `dotenv` crate (quotes, escapes, `export` prefixes).
/// Missing file yields an empty map.
pub(crate) fn read_dotenv(path: &Path) -> Result<HashMap<String, String>, LoadError> {
    if !path.is_file() {
        return Ok(HashMap::new());
    }
    let iter = dotenv::from_path_iter(path).map_err(|e| LoadError::Dotenv(e.to_string()))?;
    let mut out = HashMap::new();
    for item in iter {
        let (key, value) = item.map_err(|e| LoadError::Dotenv(e.to_string()))?;
        out.insert(key, value);
    }
    Ok(out)
}
