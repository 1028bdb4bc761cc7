use serde::{Deserialize, Serialize};
use std::fmt;

pub const PROTOCOL_VERSION: u8 = 7;
pub const MAX_NAME_LENGTH: usize = 16;
pub const MAX_MESSAGE_LENGTH: usize = 64;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Handshake {
        protocol_version: u8,
        name: String,
        mppass: String,
    },
    Heartbeat,
    Disconnect,

    Admitted {
        client_id: u32,
        rank: Rank,
    },
    Kicked {
        reason: String,
        fatal: bool,
    },
    Message {
        text: String,
    },
    Disconnected {
        reason: String,
    },
}

/// Permission level of a player.
///
/// Ranks are ordered integers so that thresholds ("guest or below",
/// "operator or above") are plain comparisons. The named constants match the
/// default rank ladder; servers may define ranks in between.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct Rank(pub i32);

impl Rank {
    pub const BANNED: Rank = Rank(-20);
    pub const GUEST: Rank = Rank(0);
    pub const BUILDER: Rank = Rank(30);
    pub const ADV_BUILDER: Rank = Rank(50);
    pub const OPERATOR: Rank = Rank(80);
    pub const ADMIN: Rank = Rank(100);
    pub const OWNER: Rank = Rank(120);

    pub fn name(&self) -> Option<&'static str> {
        match *self {
            Rank::BANNED => Some("banned"),
            Rank::GUEST => Some("guest"),
            Rank::BUILDER => Some("builder"),
            Rank::ADV_BUILDER => Some("advbuilder"),
            Rank::OPERATOR => Some("operator"),
            Rank::ADMIN => Some("admin"),
            Rank::OWNER => Some("owner"),
            _ => None,
        }
    }

    /// Parses either a rank name or its numeric permission value.
    pub fn parse(text: &str) -> Option<Rank> {
        let text = text.trim();
        if let Ok(value) = text.parse::<i32>() {
            return Some(Rank(value));
        }
        match text.to_ascii_lowercase().as_str() {
            "banned" => Some(Rank::BANNED),
            "guest" => Some(Rank::GUEST),
            "builder" => Some(Rank::BUILDER),
            "advbuilder" => Some(Rank::ADV_BUILDER),
            "operator" | "op" => Some(Rank::OPERATOR),
            "admin" => Some(Rank::ADMIN),
            "owner" => Some(Rank::OWNER),
            _ => None,
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "rank {}", self.0),
        }
    }
}
