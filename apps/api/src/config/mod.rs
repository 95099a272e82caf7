use crate::constants::{DEFAULT_CHUNK_SIZE, DEFAULT_ZIP_COMPRESSION_LEVEL, SHARES_DIR};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default = "default_secret_key")]
    pub secret_key: String,
    #[serde(default = "default_owner_token_expire_days")]
    pub owner_token_expire_days: i64,
}

fn default_secret_key() -> String {
    "change-me-in-production-use-openssl-rand-hex-32".to_string()
}

fn default_owner_token_expire_days() -> i64 {
    30
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            secret_key: default_secret_key(),
            owner_token_expire_days: default_owner_token_expire_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_shares_dir")]
    pub shares_dir: PathBuf,
    /// Deflate level used for share archives, 0-9.
    #[serde(default = "default_zip_compression_level")]
    pub zip_compression_level: u8,
}

fn default_shares_dir() -> PathBuf {
    SHARES_DIR.clone()
}

fn default_zip_compression_level() -> u8 {
    DEFAULT_ZIP_COMPRESSION_LEVEL
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            shares_dir: default_shares_dir(),
            zip_compression_level: default_zip_compression_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareConfig {
    /// 0 disables the limit. Otherwise "never" expiring shares are refused.
    #[serde(default)]
    pub max_expiration_hours: i64,
    /// Per-file byte cap, 0 for unlimited.
    #[serde(default)]
    pub max_size: u64,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    /// Default lifetime of public file links, 0 to follow the share.
    #[serde(default)]
    pub public_link_expire_days: i64,
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            max_expiration_hours: 0,
            max_size: 0,
            chunk_size: default_chunk_size(),
            public_link_expire_days: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub share: ShareConfig,
}

pub fn load_config(config_path: &Path) -> Config {
    if !config_path.exists() {
        return Config::default();
    }

    match fs::read_to_string(config_path) {
        Ok(content) => match serde_yaml::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Invalid configuration in {:?}, using defaults: {}", config_path, e);
                Config::default()
            }
        },
        Err(_) => Config::default(),
    }
}

pub fn save_default_config(config_path: &Path) -> std::io::Result<()> {
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let config = Config::default();
    let yaml = serde_yaml::to_string(&config).map_err(|e| std::io::Error::other(e.to_string()))?;
    fs::write(config_path, yaml)
}
