//! Locating and loading the TOML files the guard is configured from.

use std::path::{Path, PathBuf};
use std::{env, fs, io};

use anyhow::{bail, Context, Result};
use log::{debug, warn};
use serde::de::DeserializeOwned;

/// Environment variable naming the config directory.
pub const CONFIG_DIR_ENV: &str = "ACLGUARD_CONFIG";

/// Where the `<component>.toml` files live.
pub struct PathSet {
    pub config_dir: PathBuf,
}

impl PathSet {
    /// An explicit `dir` wins over the default lookup: `$ACLGUARD_CONFIG`,
    /// then `$XDG_CONFIG_HOME/aclguard`, then `~/.config/aclguard`.
    ///
    /// `~` and environment references in the directory are expanded.
    pub fn new(dir: Option<PathBuf>) -> Result<Self> {
        let config_dir = match dir {
            Some(dir) => dir,
            None => default_config_dir()?,
        };
        let config_dir = match config_dir.to_str() {
            Some(s) => PathBuf::from(expandenv("config_dir", s)?),
            None => config_dir,
        };
        Ok(Self { config_dir })
    }

    pub fn config_file(&self, name: &str) -> PathBuf {
        self.config_dir.join(format!("{name}.toml"))
    }

    /// Loads `<name>.toml`, or `default_func()` when the file does not exist,
    /// and completes it.
    pub fn load_config<T, F>(&self, name: &str, default_func: F) -> Result<T>
    where
        T: CommonConfig + DeserializeOwned,
        F: FnOnce() -> T,
    {
        let path = self.config_file(name);
        let mut cfg: T = match read_optional(&path)? {
            Some(s) => {
                debug!("Load {name} config from {}", path.display());
                toml::from_str(&s).with_context(|| format!("parse toml {}", path.display()))?
            }
            None => {
                warn!("Config file {} not found, using defaults", path.display());
                default_func()
            }
        };

        cfg.complete(self)
            .with_context(|| format!("validate {name} config"))?;
        Ok(cfg)
    }
}

fn default_config_dir() -> Result<PathBuf> {
    let non_empty = |key: &str| env::var_os(key).filter(|value| !value.is_empty());

    if let Some(dir) = non_empty(CONFIG_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }
    if let Some(dir) = non_empty("XDG_CONFIG_HOME") {
        return Ok(PathBuf::from(dir).join("aclguard"));
    }
    match non_empty("HOME").or_else(|| non_empty("USERPROFILE")) {
        Some(home) => Ok(PathBuf::from(home).join(".config").join("aclguard")),
        None => bail!("cannot locate config directory, use --config-dir or ${CONFIG_DIR_ENV}"),
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(Some(s)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("read config file {}", path.display())),
    }
}

/// A config section that can be built without a file and validated after
/// loading.
pub trait CommonConfig {
    fn default() -> Self;

    /// Validates and normalizes the loaded values.
    fn complete(&mut self, ps: &PathSet) -> Result<()>;
}

/// Expands `~` and `$VAR` references in a config value; an unset variable is
/// an error naming the field.
pub fn expandenv(name: &str, s: impl AsRef<str>) -> Result<String> {
    let s =
        shellexpand::full(s.as_ref()).with_context(|| format!("expand env value for '{name}'"))?;
    Ok(s.to_string())
}
