//! Server configuration
//!
//! The configuration is a flat JSON document. Every field has a default, so a
//! partial file (or no file at all) yields a usable server. Loading a missing
//! file writes the defaults back out so operators have something to edit.

use crate::error::ConfigError;
use log::info;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use shared::Rank;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const SALT_LENGTH: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub server_name: String,
    /// Require clients to prove their name with an mppass
    pub verify_names: bool,
    pub whitelisted_only: bool,
    pub max_players: usize,
    pub max_guests: usize,
    /// Tell online operators when a guest is turned away for the guest limit
    pub guest_limit_notify: bool,
    pub default_ban_message: String,
    pub default_whitelist_message: String,
    /// Shared secret mixed into every mppass. Empty means "generate one".
    pub salt: String,
    /// Highest rank counted against `max_guests`
    pub guest_rank: Rank,
    /// Rank given to names absent from the rank table
    pub default_rank: Rank,
    /// Let loopback/LAN addresses skip the credential and capacity checks
    pub trust_private_networks: bool,
    pub ip_spam_check: bool,
    pub ip_spam_count: usize,
    pub ip_spam_interval_secs: u64,
    pub ip_spam_block_secs: u64,
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_name: "Admission Server".to_string(),
            verify_names: true,
            whitelisted_only: false,
            max_players: 16,
            max_guests: 14,
            guest_limit_notify: false,
            default_ban_message: "You're banned!".to_string(),
            default_whitelist_message:
                "This server is whitelist only! You are not on the whitelist.".to_string(),
            salt: String::new(),
            guest_rank: Rank::GUEST,
            default_rank: Rank::GUEST,
            trust_private_networks: true,
            ip_spam_check: true,
            ip_spam_count: 25,
            ip_spam_interval_secs: 5,
            ip_spam_block_secs: 30,
            data_dir: PathBuf::from("data"),
        }
    }
}

impl ServerConfig {
    /// Loads the configuration at `path`, creating it with defaults if absent.
    ///
    /// An empty salt is replaced with a generated one and written back, so
    /// mppasses stay valid across restarts.
    pub fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            info!("Writing default configuration to {}", path.display());
            Self::default()
        };

        if config.salt.is_empty() {
            config.ensure_salt();
            info!("Generated name verification salt: {}", config.salt);
            config.save(path)?;
        }
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| write_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        fs::write(path, text).map_err(write_err)
    }

    /// Fills in a random salt when none is configured.
    pub fn ensure_salt(&mut self) {
        if self.salt.is_empty() {
            self.salt = generate_salt();
        }
    }

    pub fn ip_spam_interval(&self) -> Duration {
        Duration::from_secs(self.ip_spam_interval_secs)
    }

    pub fn ip_spam_block(&self) -> Duration {
        Duration::from_secs(self.ip_spam_block_secs)
    }

    pub fn data_file(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }
}

/// Random alphanumeric salt, ASCII so it can always be hashed.
pub fn generate_salt() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SALT_LENGTH)
        .map(char::from)
        .collect()
}
