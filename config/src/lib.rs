//! Configuration for Cove: layered environment loading and typed client settings.
//!
//! - [`load_and_apply`] reads the project `.env` and `$XDG_CONFIG_HOME/<app>/config.toml`
//!   (`[env]` table) and applies them to the process environment with priority
//!   **existing env > .env > XDG**.
//! - [`Settings::from_env`] then reads the `COVE_*` variables into one typed struct.
//! - With feature `tracing-init`, [`init_tracing`] installs the shared log subscriber.

mod settings;
mod sources;

#[cfg(feature = "tracing-init")]
mod logging;

use std::collections::{HashMap, HashSet};
use std::path::Path;
use thiserror::Error;

#[cfg(feature = "tracing-init")]
pub use logging::{init_tracing, log_dir, LogGuard};
pub use settings::{Settings, SettingsError};

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("xdg config path: {0}")]
    XdgPath(String),
    #[error("read xdg config: {0}")]
    XdgRead(std::io::Error),
    #[error("parse xdg toml: {0}")]
    XdgParse(#[from] toml::de::Error),
    #[error("read .env: {0}")]
    Dotenv(String),
    #[error("logging: {0}")]
    Logging(String),
}

/// Loads `.env` and XDG `config.toml`, then sets environment variables only for keys that
/// are **not** already set.
///
/// * `app_name`: e.g. `"cove"`, used for the XDG path `~/.config/<app_name>/config.toml`.
/// * `override_dir`: if `Some`, look for `.env` there instead of the current directory.
pub fn load_and_apply(app_name: &str, override_dir: Option<&Path>) -> Result<(), LoadError> {
    let xdg = sources::read_xdg_env(&sources::xdg_config_file(app_name)?)?;
    let dotenv = match sources::dotenv_file(override_dir) {
        Some(path) => sources::read_dotenv(&path)?,
        None => HashMap::new(),
    };
    for (key, value) in merge_layers(&dotenv, &xdg, |k| std::env::var_os(k).is_some()) {
        std::env::set_var(key, value);
    }
    Ok(())
}

/// Picks the value to apply for every key missing from the environment: `.env` first, then XDG.
fn merge_layers(
    dotenv: &HashMap<String, String>,
    xdg: &HashMap<String, String>,
    is_set: impl Fn(&str) -> bool,
) -> Vec<(String, String)> {
    let keys: HashSet<&String> = dotenv.keys().chain(xdg.keys()).collect();
    let mut out: Vec<(String, String)> = keys
        .into_iter()
        .filter(|k| !is_set(k.as_str()))
        .filter_map(|k| {
            dotenv
                .get(k)
                .or_else(|| xdg.get(k))
                .map(|v| (k.clone(), v.clone()))
        })
        .collect();
    out.sort();
    out
}
