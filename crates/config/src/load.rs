use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use std::path::{Path, PathBuf};
use tracing::instrument;

use crate::error::{ErrorKind, Result};
use crate::models::{Background, Config};

const ENV_PREFIX: &str = "QUILL_";
const USER_CONFIG_STEM: &str = "config";

/// Folder holding the user's configuration files (`~/.config/quill` on
/// Linux).
pub fn user_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "quill").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Builds a [`Config`] from layered sources.
///
/// Later layers override earlier ones:
/// 1. built-in defaults,
/// 2. `config.{toml,yaml,json}` in the [user config folder](user_config_dir),
/// 3. explicitly added files, in order,
/// 4. `QUILL_*` environment variables, where `__` separates nested keys
///    (`QUILL_IMPORT__BATCH_SIZE=10`).
#[derive(Debug, Clone)]
pub struct Loader {
    user: bool,
    env: bool,
    files: Vec<PathBuf>,
}

impl Default for Loader {
    fn default() -> Self {
        Self { user: true, env: true, files: Vec::new() }
    }
}

impl Loader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file layer. Unlike the user config files, this file must
    /// exist.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.push(path.into());
        self
    }

    pub fn without_user_config(mut self) -> Self {
        self.user = false;
        self
    }

    pub fn without_env(mut self) -> Self {
        self.env = false;
        self
    }

    pub fn figment(&self) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if self.user
            && let Some(dir) = user_config_dir()
        {
            figment = figment
                .merge(Toml::file(dir.join(format!("{USER_CONFIG_STEM}.toml"))))
                .merge(Yaml::file(dir.join(format!("{USER_CONFIG_STEM}.yaml"))))
                .merge(Json::file(dir.join(format!("{USER_CONFIG_STEM}.json"))));
        }
        for file in &self.files {
            figment = merge_file(figment, file)?;
        }
        if self.env {
            figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__").ignore(&["config"]));
        }
        Ok(figment)
    }

    /// Merges every layer, then validates the result.
    #[instrument(skip(self), fields(files = self.files.len()))]
    pub fn load(&self) -> Result<Config> {
        let config: Config = self.figment()?.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        tracing::debug!(?config, "Loaded configuration");
        Ok(config)
    }
}

fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
    if !path.is_file() {
        exn::bail!(ErrorKind::Invalid(format!("config file not found: {}", path.display())));
    }
    let extension = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
    Ok(match extension.as_deref() {
        Some("toml") => figment.merge(Toml::file(path)),
        Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
        Some("json") => figment.merge(Json::file(path)),
        _ => exn::bail!(ErrorKind::Invalid(format!("unsupported config format: {}", path.display()))),
    })
}

impl Config {
    /// Rejects values the importer can't run with.
    pub fn validate(&self) -> Result<()> {
        if self.import.batch_size == 0 {
            exn::bail!(ErrorKind::Invalid("import.batch_size must be at least 1".to_string()));
        }
        if self.manifest.history_limit == 0 {
            exn::bail!(ErrorKind::Invalid("manifest.history_limit must be at least 1".to_string()));
        }
        if let Err(message) = self.import.background.parse::<Background>() {
            exn::bail!(ErrorKind::Invalid(message));
        }
        Ok(())
    }
}
