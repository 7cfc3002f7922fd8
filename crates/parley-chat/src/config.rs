use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use parley_store::RestConfig;
use parley_types::models::ParticipantId;

use crate::subscription::RetryPolicy;
use crate::upload::UploadConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{name} has invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub enum StoreConfig {
    /// SQLite file on this machine.
    Local { db_path: PathBuf },
    /// Hosted realtime database.
    Rest(RestConfig),
}

/// Client settings read from `PARLEY_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub store: StoreConfig,
    /// `None` when no upload service is configured; attachments then fail.
    pub upload: Option<UploadConfig>,
    pub user_id: ParticipantId,
    pub user_email: Option<String>,
    /// Picture uploaded and shown next to this participant in rosters.
    pub user_avatar: Option<PathBuf>,
    pub peer_id: Option<ParticipantId>,
    pub retry: RetryPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the config from any variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let store = match var("PARLEY_STORE_URL") {
            Some(url) => {
                let mut rest = RestConfig::new(url);
                rest.auth_token = var("PARLEY_STORE_AUTH");
                StoreConfig::Rest(rest)
            }
            None => StoreConfig::Local {
                db_path: var("PARLEY_DB_PATH").unwrap_or_else(|| "parley.db".into()).into(),
            },
        };

        let upload = match (var("PARLEY_UPLOAD_CLOUD"), var("PARLEY_UPLOAD_PRESET")) {
            (Some(cloud_name), Some(upload_preset)) => {
                let mut upload = UploadConfig::new(cloud_name, upload_preset);
                if let Some(api_base) = var("PARLEY_UPLOAD_API") {
                    upload.api_base = api_base;
                }
                Some(upload)
            }
            (None, None) => None,
            (None, Some(_)) => return Err(ConfigError::Missing("PARLEY_UPLOAD_CLOUD")),
            (Some(_), None) => return Err(ConfigError::Missing("PARLEY_UPLOAD_PRESET")),
        };

        let user_id = var("PARLEY_USER_ID")
            .map(ParticipantId::new)
            .ok_or(ConfigError::Missing("PARLEY_USER_ID"))?;

        let max_secs = match var("PARLEY_RESUBSCRIBE_MAX_SECS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| ConfigError::Invalid {
                name: "PARLEY_RESUBSCRIBE_MAX_SECS",
                value: raw.clone(),
            })?,
            None => 30,
        };
        let default_retry = RetryPolicy::default();

        Ok(Self {
            store,
            upload,
            user_id,
            user_email: var("PARLEY_USER_EMAIL"),
            user_avatar: var("PARLEY_USER_AVATAR").map(PathBuf::from),
            peer_id: var("PARLEY_PEER_ID").map(ParticipantId::new),
            retry: RetryPolicy::new(default_retry.initial, Duration::from_secs(max_secs)),
        })
    }
}
