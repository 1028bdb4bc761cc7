//! # Admission Server Library
//!
//! This library decides whether a player attempting to join the server is
//! allowed in. Every handshake runs through an ordered chain of checks; the
//! first check that rejects stops the chain and its message is sent back to
//! the player, otherwise the player is admitted with their assigned rank.
//!
//! ## Check Order
//!
//! 1. **Name** (`names`): length and character set
//! 2. **Throttle** (`throttle`): per-address flood protection
//! 3. **Credentials** (`credentials`): reconnect token or salted MD5 mppass
//! 4. **Temporary ban** (`bans`): expired entries are removed on sight
//! 5. **Whitelist** (`lists`): only when whitelist mode is on
//! 6. **Rank** (`ranks`): resolves the player's rank for later checks
//! 7. **Permanent ban**: banned address or banned rank
//! 8. **Capacity** (`capacity`): total and guest slot limits, VIP bypass
//!
//! Each check declares what happens when it errors internally. The name,
//! credential and whitelist checks fail closed; the rest fail open and let
//! the chain continue. Of the fail-closed checks only credentials can
//! currently error (a name or salt that cannot be hashed).
//!
//! ## Module Organization
//!
//! ### Admission Module (`admission`)
//! The pipeline itself, the attempt and result types, and one check type
//! per step above.
//!
//! ### State Module (`state`)
//! Every shared handle the checks read, created once at startup. Stores are
//! loaded from the data directory and flushed back with `save_all`.
//!
//! ### Stores (`lists`, `bans`, `ranks`)
//! Line-oriented text files keyed by lowercased name. Writes go to a
//! temporary file that is then renamed over the original.
//!
//! ### Registry Module (`registry`)
//! Online players, used for duplicate logins, capacity counts and operator
//! notices.
//!
//! ### Network Module (`network`)
//! UDP transport: handshakes, heartbeats, disconnects and timeouts.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//! use server::state::AdmissionState;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let state = AdmissionState::load(ServerConfig::default())?;
//!     let mut server = Server::new(
//!         "127.0.0.1:25565",
//!         Duration::from_millis(100),
//!         state,
//!     ).await?;
//!
//!     // Runs until a Shutdown message arrives, then flushes every store
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod address;
pub mod admission;
pub mod bans;
pub mod capacity;
pub mod config;
pub mod credentials;
pub mod error;
pub mod lists;
pub mod names;
pub mod network;
pub mod notify;
pub mod ranks;
pub mod registry;
pub mod state;
pub mod throttle;
