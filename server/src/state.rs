//! Shared admission state
//!
//! Every handle the admission checks read lives here, created once at
//! startup and shared by reference counting. Nothing is a global: tests
//! build their own state with in-memory stores and inject fakes for the
//! throttle and the operator notifier.
//!
//! Locking is owned by each handle (see the individual types); no lock is
//! ever held across two handles, so there is no lock ordering to respect.

use crate::bans::BanStore;
use crate::capacity::CapacityLimits;
use crate::config::ServerConfig;
use crate::credentials::{CredentialVerifier, ReconnectTokens};
use crate::error::StoreResult;
use crate::lists::NameList;
use crate::notify::{LogNotifier, OperatorNotifier};
use crate::ranks::RankTable;
use crate::registry::OnlineRegistry;
use crate::throttle::{ConnectionThrottle, IpThrottler, ThrottleConfig};
use log::error;
use std::sync::Arc;

pub const TEMP_BANS_FILE: &str = "tempbans.txt";
pub const BANS_FILE: &str = "bans.txt";
pub const BANNED_IPS_FILE: &str = "banned-ip.txt";
pub const WHITELIST_FILE: &str = "whitelist.txt";
pub const VIP_FILE: &str = "vip.txt";
pub const RANKS_FILE: &str = "ranks.txt";

#[derive(Clone)]
pub struct AdmissionState {
    pub config: Arc<ServerConfig>,
    pub tokens: Arc<ReconnectTokens>,
    pub temp_bans: Arc<BanStore>,
    /// Banner and reason text for permanent bans
    pub bans: Arc<BanStore>,
    pub banned_ips: Arc<NameList>,
    pub whitelist: Arc<NameList>,
    pub vips: Arc<NameList>,
    pub ranks: Arc<RankTable>,
    pub online: Arc<OnlineRegistry>,
    pub throttle: Arc<dyn ConnectionThrottle>,
    pub notifier: Arc<dyn OperatorNotifier>,
}

impl AdmissionState {
    /// State backed by empty in-memory stores.
    pub fn in_memory(mut config: ServerConfig) -> Self {
        config.ensure_salt();
        let default_rank = config.default_rank;
        let throttle = Arc::new(IpThrottler::new(throttle_config(&config)));
        Self {
            config: Arc::new(config),
            tokens: Arc::new(ReconnectTokens::new()),
            temp_bans: Arc::new(BanStore::in_memory()),
            bans: Arc::new(BanStore::in_memory()),
            banned_ips: Arc::new(NameList::in_memory()),
            whitelist: Arc::new(NameList::in_memory()),
            vips: Arc::new(NameList::in_memory()),
            ranks: Arc::new(RankTable::in_memory(default_rank)),
            online: Arc::new(OnlineRegistry::new()),
            throttle,
            notifier: Arc::new(LogNotifier),
        }
    }

    /// Loads every persisted store from the config's data directory.
    pub fn load(mut config: ServerConfig) -> StoreResult<Self> {
        config.ensure_salt();
        let throttle = Arc::new(IpThrottler::new(throttle_config(&config)));
        Ok(Self {
            tokens: Arc::new(ReconnectTokens::new()),
            temp_bans: Arc::new(BanStore::load(config.data_file(TEMP_BANS_FILE))?),
            bans: Arc::new(BanStore::load(config.data_file(BANS_FILE))?),
            banned_ips: Arc::new(NameList::load(config.data_file(BANNED_IPS_FILE))?),
            whitelist: Arc::new(NameList::load(config.data_file(WHITELIST_FILE))?),
            vips: Arc::new(NameList::load(config.data_file(VIP_FILE))?),
            ranks: Arc::new(RankTable::load(
                config.data_file(RANKS_FILE),
                config.default_rank,
            )?),
            online: Arc::new(OnlineRegistry::new()),
            throttle,
            notifier: Arc::new(LogNotifier),
            config: Arc::new(config),
        })
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn OperatorNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn verifier(&self) -> CredentialVerifier {
        CredentialVerifier::new(
            self.config.salt.clone(),
            self.config.verify_names,
            self.config.trust_private_networks,
            Arc::clone(&self.tokens),
        )
    }

    pub fn capacity_limits(&self) -> CapacityLimits {
        CapacityLimits {
            max_players: self.config.max_players,
            max_guests: self.config.max_guests,
            guest_rank: self.config.guest_rank,
            guest_limit_notify: self.config.guest_limit_notify,
            private_bypass: self.config.trust_private_networks,
        }
    }

    /// Flushes every persisted store, attempting all of them even if one
    /// fails. Returns the first error.
    pub fn save_all(&self) -> StoreResult<()> {
        let results = [
            self.temp_bans.save(),
            self.bans.save(),
            self.banned_ips.save(),
            self.whitelist.save(),
            self.vips.save(),
            self.ranks.save(),
        ];
        let mut first = None;
        for result in results {
            if let Err(e) = result {
                error!("Failed to save store: {}", e);
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }
}

fn throttle_config(config: &ServerConfig) -> ThrottleConfig {
    ThrottleConfig {
        enabled: config.ip_spam_check,
        max_attempts: config.ip_spam_count,
        interval: config.ip_spam_interval(),
        block_duration: config.ip_spam_block(),
        exempt_private: true,
    }
}
