//! Per-IP connection throttling
//!
//! Runs before any credential work so a flood of handshakes from one address
//! is turned away cheaply. Each address keeps the instants of its recent
//! connection attempts; reaching the configured count inside the window
//! blocks the address for a fixed period.

use crate::address;
use crate::bans::shorten;
use log::warn;
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ThrottleError {
    #[error("Too many connections too quickly! Wait {} before re-logging", format_wait(*.remaining))]
    Blocked { remaining: Duration },
}

/// Longest block the throttler will impose, whatever the config says.
pub const MAX_BLOCK: Duration = Duration::from_secs(365 * 24 * 60 * 60);

fn format_wait(remaining: Duration) -> String {
    let secs = remaining.min(MAX_BLOCK).as_secs().max(1);
    let wait = i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or_else(|| chrono::Duration::days(365));
    shorten(wait, true)
}

/// Gate consulted for every connection attempt, keyed by source address.
pub trait ConnectionThrottle: Send + Sync {
    fn check(&self, ip: IpAddr, now: Instant) -> Result<(), ThrottleError>;

    /// Periodic housekeeping hook.
    fn cleanup(&self, _now: Instant) {}
}

#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    pub enabled: bool,
    /// Attempts allowed inside `interval` before blocking
    pub max_attempts: usize,
    pub interval: Duration,
    pub block_duration: Duration,
    /// Private addresses are never throttled
    pub exempt_private: bool,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 25,
            interval: Duration::from_secs(5),
            block_duration: Duration::from_secs(30),
            exempt_private: true,
        }
    }
}

#[derive(Debug, Default)]
struct IpHistory {
    attempts: VecDeque<Instant>,
    blocked_until: Option<Instant>,
}

pub struct IpThrottler {
    config: ThrottleConfig,
    entries: RwLock<HashMap<IpAddr, IpHistory>>,
}

impl IpThrottler {
    /// `block_duration` is capped at [`MAX_BLOCK`].
    pub fn new(mut config: ThrottleConfig) -> Self {
        config.block_duration = config.block_duration.min(MAX_BLOCK);
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn tracked(&self) -> usize {
        self.entries.read().len()
    }
}

impl ConnectionThrottle for IpThrottler {
    fn check(&self, ip: IpAddr, now: Instant) -> Result<(), ThrottleError> {
        if !self.config.enabled || (self.config.exempt_private && address::is_private(ip)) {
            return Ok(());
        }

        let mut entries = self.entries.write();
        let entry = entries.entry(ip).or_default();

        if let Some(until) = entry.blocked_until {
            if now < until {
                return Err(ThrottleError::Blocked {
                    remaining: until - now,
                });
            }
            entry.blocked_until = None;
            entry.attempts.clear();
        }

        while entry
            .attempts
            .front()
            .is_some_and(|first| now.saturating_duration_since(*first) >= self.config.interval)
        {
            entry.attempts.pop_front();
        }
        entry.attempts.push_back(now);

        if entry.attempts.len() > self.config.max_attempts {
            let until = now.checked_add(self.config.block_duration).unwrap_or(now);
            entry.blocked_until = Some(until);
            warn!("{} blocked - too many connections too quickly", ip);
            return Err(ThrottleError::Blocked {
                remaining: until - now,
            });
        }

        Ok(())
    }

    /// Drops histories with no recent attempts and no active block.
    fn cleanup(&self, now: Instant) {
        let interval = self.config.interval;
        self.entries.write().retain(|_, entry| {
            let blocked = entry.blocked_until.is_some_and(|until| now < until);
            let recent = entry
                .attempts
                .back()
                .is_some_and(|last| now.saturating_duration_since(*last) < interval);
            blocked || recent
        });
    }
}
