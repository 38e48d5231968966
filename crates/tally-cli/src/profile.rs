//! Persistent CLI profile
//!
//! Stores the backend endpoint, tenant id, and the device id generated the
//! first time this machine runs a command. Values resolve flag > env >
//! profile file > default.

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tally_core::util::{is_http_url, normalize_text_option};
use uuid::Uuid;

use crate::error::CliError;

const PROFILE_FILE_NAME: &str = "profile.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    #[serde(default)]
    pub backend_url: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

/// Everything a command needs, with defaults filled in
#[derive(Debug, Clone)]
pub struct ResolvedProfile {
    pub user_id: String,
    pub device_id: String,
    pub db_path: PathBuf,
    pub backend_url: Option<String>,
    pub auth_token: Option<String>,
}

pub fn default_profile_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tally")
        .join(PROFILE_FILE_NAME)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tally")
        .join("tally.db")
}

impl Profile {
    pub fn load(path: &Path) -> Result<Self, CliError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|error| {
            CliError::Config(format!(
                "Failed to read profile at {}: {error}",
                path.display()
            ))
        })?;
        let mut profile = serde_json::from_str::<Self>(&raw).map_err(|error| {
            CliError::Config(format!(
                "Failed to parse profile at {}: {error}",
                path.display()
            ))
        })?;
        profile.normalize();
        Ok(profile)
    }

    pub fn save(&self, path: &Path) -> Result<(), CliError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                CliError::Config(format!(
                    "Failed to create profile directory {}: {error}",
                    parent.display()
                ))
            })?;
        }

        let mut normalized = self.clone();
        normalized.normalize();
        let serialized = serde_json::to_string_pretty(&normalized)?;
        std::fs::write(path, serialized).map_err(|error| {
            CliError::Config(format!(
                "Failed to write profile at {}: {error}",
                path.display()
            ))
        })?;
        Ok(())
    }

    /// Fill in defaults, generating and persisting a device id on first use
    pub fn resolve(
        mut self,
        path: &Path,
        cli_db_path: Option<PathBuf>,
    ) -> Result<ResolvedProfile, CliError> {
        let user_id = normalize_text_option(env::var("TALLY_USER_ID").ok())
            .or_else(|| self.user_id.clone())
            .ok_or_else(|| {
                CliError::Config(
                    "No user id configured. Run `tally config init --user <ID>`.".to_string(),
                )
            })?;

        let device_id = match self.device_id.clone() {
            Some(device_id) => device_id,
            None => {
                let device_id = Uuid::now_v7().to_string();
                self.device_id = Some(device_id.clone());
                self.save(path)?;
                tracing::info!("Generated device id {device_id} for this machine");
                device_id
            }
        };

        let db_path = cli_db_path
            .or_else(|| env::var_os("TALLY_DB_PATH").map(PathBuf::from))
            .or(self.db_path)
            .unwrap_or_else(default_db_path);

        let backend_url =
            normalize_text_option(env::var("TALLY_BACKEND_URL").ok()).or(self.backend_url);
        if let Some(url) = backend_url.as_deref() {
            if !is_http_url(url) {
                return Err(CliError::Config(format!(
                    "Backend URL must start with http:// or https://, got '{url}'"
                )));
            }
        }

        let auth_token =
            normalize_text_option(env::var("TALLY_AUTH_TOKEN").ok()).or(self.auth_token);

        Ok(ResolvedProfile {
            user_id,
            device_id,
            db_path,
            backend_url,
            auth_token,
        })
    }

    fn normalize(&mut self) {
        self.backend_url = normalize_text_option(self.backend_url.clone());
        self.auth_token = normalize_text_option(self.auth_token.clone());
        self.user_id = normalize_text_option(self.user_id.clone());
        self.device_id = normalize_text_option(self.device_id.clone());
    }
}
