//! Manifest parser.
//!
//! Loads the YAML manifest, the optional `.env` file next to it, and applies
//! environment overrides. Environment values win over the file.

use crate::error::{ConfigError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::Manifest;

/// Environment variable holding the API token.
pub const TOKEN_ENV: &str = "HCLOUD_TOKEN";

/// Environment variable overriding the API endpoint.
pub const ENDPOINT_ENV: &str = "HCLOUD_ENDPOINT";

/// Environment variable overriding the state file path.
pub const STATE_PATH_ENV: &str = "HCLOUD_STATE_PATH";

/// Manifest parser.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving `.env`.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the directory `.env` is looked up in.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads a manifest from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Manifest> {
        let path = path.as_ref();
        info!("Loading manifest from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }
            .into());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ParseError {
            message: format!("Failed to read file: {e}"),
            location: Some(path.display().to_string()),
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses a manifest from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<Manifest> {
        debug!("Parsing YAML manifest");

        let manifest: Manifest = serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            }
        })?;

        debug!(
            "Parsed manifest for workspace {} with {} resources",
            manifest.workspace,
            manifest.resource_count()
        );
        Ok(manifest)
    }

    /// Loads `.env`, then the manifest, then applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if `.env` or the manifest cannot be loaded.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<Manifest> {
        self.load_dotenv()?;
        let mut manifest = self.load_file(path)?;
        apply_overrides(&mut manifest, |name| std::env::var(name).ok());
        Ok(manifest)
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| ConfigError::ParseError {
                message: format!("Failed to load .env file: {e}"),
                location: Some(env_path.display().to_string()),
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }

    /// Returns the API token from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `HCLOUD_TOKEN` is not set.
    pub fn token_from_env() -> Result<String> {
        std::env::var(TOKEN_ENV).map_err(|_| {
            ConfigError::MissingEnvVar {
                name: String::from(TOKEN_ENV),
            }
            .into()
        })
    }
}

/// Applies overrides looked up through `lookup`. Empty values are ignored.
pub fn apply_overrides(manifest: &mut Manifest, lookup: impl Fn(&str) -> Option<String>) {
    let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(token) = get(TOKEN_ENV) {
        debug!("Overriding provider.token from environment");
        manifest.provider.token = token;
    }

    if let Some(endpoint) = get(ENDPOINT_ENV) {
        debug!("Overriding provider.endpoint from environment");
        manifest.provider.endpoint = endpoint;
    }

    if let Some(path) = get(STATE_PATH_ENV) {
        debug!("Overriding state.path from environment");
        manifest.state.path = Some(PathBuf::from(path));
    }
}

/// Default manifest file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["hcloud.yaml", "hcloud.yml"];

/// Finds the manifest in the given directory or its parents.
///
/// # Errors
///
/// Returns an error if no manifest is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found manifest: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }
    .into())
}
