//! Registry of admitted players
//!
//! This module tracks everyone who made it through admission:
//! - Player lifecycle (admit, disconnect, timeout)
//! - Rank and address of each online player
//! - Liveness tracking for timeout cleanup
//! - Population counts used by the capacity checks
//!
//! The registry is shared between concurrent admissions and the network
//! tasks. All state sits behind one `parking_lot::RwLock`; every count is
//! taken under a fresh read lock, so two counts in the same admission may
//! differ if another player joined in between. Admission is advisory, not a
//! reservation, and tolerates that.

use log::info;
use parking_lot::RwLock;
use shared::Rank;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// An admitted, connected player.
#[derive(Debug, Clone)]
pub struct OnlinePlayer {
    /// Unique id assigned on admission
    pub id: u32,
    pub name: String,
    /// Network address for sending responses
    pub addr: SocketAddr,
    pub rank: Rank,
    /// Last time we heard from this player
    pub last_seen: Instant,
}

impl OnlinePlayer {
    pub fn new(id: u32, name: &str, addr: SocketAddr, rank: Rank) -> Self {
        Self {
            id,
            name: name.to_string(),
            addr,
            rank,
            last_seen: Instant::now(),
        }
    }

    /// Returns true if nothing has been received within `timeout`.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

#[derive(Debug)]
struct RegistryInner {
    players: HashMap<u32, OnlinePlayer>,
    next_id: u32,
}

/// Thread-safe set of online players indexed by id.
#[derive(Debug)]
pub struct OnlineRegistry {
    inner: RwLock<RegistryInner>,
}

impl Default for OnlineRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl OnlineRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                players: HashMap::new(),
                next_id: 1,
            }),
        }
    }

    /// Inserts an admitted player and returns its id.
    ///
    /// Capacity is not enforced here; that is the admission pipeline's job.
    pub fn insert(&self, name: &str, addr: SocketAddr, rank: Rank) -> u32 {
        let mut inner = self.inner.write();
        let id = inner.next_id;
        inner.next_id += 1;
        inner
            .players
            .insert(id, OnlinePlayer::new(id, name, addr, rank));
        info!("Player {} ({}) joined from {} as {}", id, name, addr, rank);
        id
    }

    /// Returns the removed player, or None if they were already gone.
    pub fn remove(&self, id: u32) -> Option<OnlinePlayer> {
        let removed = self.inner.write().players.remove(&id);
        if let Some(player) = &removed {
            info!("Player {} ({}) left", player.id, player.name);
        }
        removed
    }

    pub fn find_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.inner
            .read()
            .players
            .values()
            .find(|player| player.addr == addr)
            .map(|player| player.id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<u32> {
        self.inner
            .read()
            .players
            .values()
            .find(|player| player.name.eq_ignore_ascii_case(name))
            .map(|player| player.id)
    }

    /// Refreshes the liveness timestamp. Returns false for unknown ids.
    pub fn touch(&self, id: u32) -> bool {
        match self.inner.write().players.get_mut(&id) {
            Some(player) => {
                player.last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Removes and returns players silent for longer than `timeout`.
    pub fn remove_timed_out(&self, timeout: Duration) -> Vec<OnlinePlayer> {
        let mut inner = self.inner.write();
        let timed_out: Vec<u32> = inner
            .players
            .values()
            .filter(|player| player.is_timed_out(timeout))
            .map(|player| player.id)
            .collect();

        timed_out
            .iter()
            .filter_map(|id| inner.players.remove(id))
            .inspect(|player| info!("Player {} ({}) timed out", player.id, player.name))
            .collect()
    }

    /// Addresses of online players whose rank is at least `min_rank`.
    pub fn addrs_at_or_above(&self, min_rank: Rank) -> Vec<(u32, SocketAddr)> {
        self.inner
            .read()
            .players
            .values()
            .filter(|player| player.rank >= min_rank)
            .map(|player| (player.id, player.addr))
            .collect()
    }

    /// Number of online players. Fresh read each call.
    pub fn count(&self) -> usize {
        self.inner.read().players.len()
    }

    /// Number of online players at or below `threshold`. Fresh read each call.
    pub fn count_at_or_below(&self, threshold: Rank) -> usize {
        self.inner
            .read()
            .players
            .values()
            .filter(|player| player.rank <= threshold)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }
}
