use super::Config;
use anyhow::{Context, Result};
use directories::UserDirs;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_DIR: &str = ".otel-rollout";
const CONFIG_FILE: &str = "config.toml";

impl Config {
    /// `~/.otel-rollout/config.toml`, if a home directory can be found.
    pub fn default_path() -> Option<PathBuf> {
        UserDirs::new().map(|u| u.home_dir().join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Load config from `path`, or from the default location when `None`.
    ///
    /// A missing default file yields built-in defaults; a missing explicit
    /// path is an error. Environment overrides and `~` expansion are applied
    /// afterwards, validation is left to the caller so CLI flags can still
    /// be layered on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(default) if default.exists() => Self::from_file(&default)?,
                _ => Self::default(),
            },
        };

        config.apply_env_overrides();
        config.expand_paths();
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    fn expand_paths(&mut self) {
        for file in &mut self.chart.values_files {
            *file = expand_tilde(file);
        }
        self.backend.compose_file = expand_tilde(&self.backend.compose_file);
        self.sample_app.manifest = expand_tilde(&self.sample_app.manifest);
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&raw).into_owned())
}
