use anyhow::{Result, bail};
use converge_core::connection::{ConnectionSettings, Credentials};
use converge_core::inventory::Inventory;
use converge_core::retry::RetryConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Inventory file used when neither a flag nor a profile names one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inventory: Option<String>,
    /// Host the local node is reached at
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_selection_timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_delay_ms: Option<u64>,
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_profile: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inventory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_host: Option<String>,
    /// Overrides the administrator password from the inventory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_password: Option<String>,
}

impl Config {
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config_path = match path {
            Some(p) => PathBuf::from(p),
            None => Self::default_path(),
        };

        if config_path.exists() {
            let content = fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    pub fn save(&self, path: Option<&str>) -> Result<()> {
        let config_path = match path {
            Some(p) => PathBuf::from(p),
            None => Self::default_path(),
        };

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mongo-converge")
            .join("config.toml")
    }

    pub fn get_profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.get(name)
    }

    pub fn set_profile(&mut self, name: &str, profile: Profile) {
        self.profiles.insert(name.to_string(), profile);
    }

    pub fn remove_profile(&mut self, name: &str) -> bool {
        let removed = self.profiles.remove(name).is_some();
        if removed && self.default_profile.as_deref() == Some(name) {
            self.default_profile = None;
        }
        removed
    }

    /// Profile names, sorted
    pub fn list_profiles(&self) -> Vec<&String> {
        let mut names: Vec<&String> = self.profiles.keys().collect();
        names.sort();
        names
    }

    /// The requested profile, else the default one; a requested profile
    /// that does not exist is an error
    pub fn active_profile(&self, requested: Option<&str>) -> Result<Option<&Profile>> {
        match requested {
            Some(name) => match self.get_profile(name) {
                Some(profile) => Ok(Some(profile)),
                None => bail!("Profile '{}' not found", name),
            },
            None => Ok(self
                .default_profile
                .as_deref()
                .and_then(|name| self.get_profile(name))),
        }
    }

    /// Inventory path: flag, then profile, then top level
    pub fn inventory_path(&self, flag: Option<&str>, profile: Option<&Profile>) -> Option<PathBuf> {
        flag.map(str::to_string)
            .or_else(|| profile.and_then(|p| p.inventory.clone()))
            .or_else(|| self.inventory.clone())
            .map(PathBuf::from)
    }

    /// Core connection settings for a run against `inventory`
    pub fn connection_settings(&self, profile: Option<&Profile>, inventory: &Inventory) -> ConnectionSettings {
        let defaults = ConnectionSettings::default();
        let default_retry = RetryConfig::default();

        let local_host = profile
            .and_then(|p| p.local_host.clone())
            .or_else(|| self.local_host.clone())
            .unwrap_or(defaults.local_host);
        let password = profile
            .and_then(|p| p.admin_password.clone())
            .unwrap_or_else(|| inventory.admin.password.clone());

        ConnectionSettings {
            local_host,
            auth: inventory.auth,
            credentials: Some(Credentials::new(inventory.admin.username.clone(), password)),
            server_selection_timeout: self
                .server_selection_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.server_selection_timeout),
            connect_timeout: self
                .connect_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.connect_timeout),
            retry: RetryConfig::new(
                self.max_retries.unwrap_or(default_retry.max_retries),
                self.retry_delay_ms
                    .map(Duration::from_millis)
                    .unwrap_or(default_retry.delay),
            ),
        }
    }
}
