use std::path::{Path, PathBuf};

use crate::error::{RestError, Result};

const CONFIG_FILE_NAME: &str = ".hscfg";
const UNIX_SOCKET_PREFIX: &str = "http+unix";

/// Where the service lives and who we are when talking to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub endpoint: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Caller-supplied values that take priority over the environment and the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub endpoint: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ConnectionConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            username: None,
            password: None,
        }
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.username = Some(username.to_string());
        self.password = Some(password.to_string());
        self
    }

    /// Loads from `HSDS_*` environment variables, falling back to `~/.hscfg`.
    pub fn load(overrides: ConfigOverrides) -> Result<Self> {
        let cfg_path = default_config_path();
        Self::resolve(overrides, |key| std::env::var(key).ok(), cfg_path.as_deref())
    }

    /// Resolution order: overrides, then environment, then the config file. An endpoint
    /// in the environment means the config file is never read.
    pub fn resolve<F>(overrides: ConfigOverrides, env: F, cfg_path: Option<&Path>) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = ConnectionConfig::default();

        if let Some(endpoint) = env("HSDS_ENDPOINT").filter(|s| !s.is_empty()) {
            tracing::debug!("using connection information from the environment");
            config.endpoint = endpoint;
            config.username = env("HSDS_USERNAME").filter(|s| !s.is_empty());
            config.password = env("HSDS_PASSWORD").filter(|s| !s.is_empty());
        } else if let Some(path) = cfg_path.filter(|p| p.exists()) {
            tracing::debug!("reading connection information from {}", path.display());
            let contents = std::fs::read_to_string(path)?;
            config = Self::parse_config_file(&contents);
        }

        if let Some(endpoint) = overrides.endpoint {
            config.endpoint = endpoint;
        }
        if overrides.username.is_some() {
            config.username = overrides.username;
        }
        if overrides.password.is_some() {
            config.password = overrides.password;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parses `key = value` lines. Comments start with `#`; unknown keys are ignored.
    pub fn parse_config_file(contents: &str) -> Self {
        let mut config = ConnectionConfig::default();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else {
                continue;
            };
            let val = val.trim();
            if val.is_empty() {
                continue;
            }
            match key.trim() {
                "hs_endpoint" => config.endpoint = val.to_string(),
                "hs_username" => config.username = Some(val.to_string()),
                "hs_password" => config.password = Some(val.to_string()),
                other => tracing::debug!("ignoring config key '{}'", other),
            }
        }
        config
    }

    fn validate(&mut self) -> Result<()> {
        if self.endpoint.is_empty() {
            return Err(RestError::Argument(
                "must specify a base URL - please set HSDS_ENDPOINT environment variable or create a config file"
                    .to_string(),
            ));
        }
        if self.endpoint.starts_with(UNIX_SOCKET_PREFIX) {
            return Err(RestError::Unsupported(format!(
                "unix socket endpoints ({}) are not supported",
                self.endpoint
            )));
        }
        while self.endpoint.ends_with('/') {
            self.endpoint.pop();
        }
        Ok(())
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_FILE_NAME))
}
