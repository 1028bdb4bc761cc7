//! Capacity control
//!
//! Decides whether a newly authenticated player fits on the server. Two
//! ceilings apply: the total player cap, which private-network connections
//! may exceed so local administration stays possible, and a separate cap on
//! guests so a crowd of unregistered players cannot lock regulars out.
//! Names on the VIP list skip both.

use crate::address;
use crate::lists::NameList;
use crate::notify::OperatorNotifier;
use crate::registry::OnlineRegistry;
use log::warn;
use shared::Rank;
use std::net::IpAddr;
use std::sync::Arc;

pub const SERVER_FULL_MESSAGE: &str = "Server full!";
pub const TOO_MANY_GUESTS_MESSAGE: &str = "Server has reached max number of guests";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityDecision {
    Admit,
    ServerFull,
    TooManyGuests,
}

impl CapacityDecision {
    pub fn message(&self) -> Option<&'static str> {
        match self {
            CapacityDecision::Admit => None,
            CapacityDecision::ServerFull => Some(SERVER_FULL_MESSAGE),
            CapacityDecision::TooManyGuests => Some(TOO_MANY_GUESTS_MESSAGE),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CapacityLimits {
    pub max_players: usize,
    pub max_guests: usize,
    /// Highest rank that counts as a guest
    pub guest_rank: Rank,
    pub guest_limit_notify: bool,
    /// Private addresses may join past `max_players`
    pub private_bypass: bool,
}

pub struct CapacityController {
    limits: CapacityLimits,
    vips: Arc<NameList>,
    online: Arc<OnlineRegistry>,
    notifier: Arc<dyn OperatorNotifier>,
}

impl CapacityController {
    pub fn new(
        limits: CapacityLimits,
        vips: Arc<NameList>,
        online: Arc<OnlineRegistry>,
        notifier: Arc<dyn OperatorNotifier>,
    ) -> Self {
        Self {
            limits,
            vips,
            online,
            notifier,
        }
    }

    pub fn has_room(&self, name: &str, source: IpAddr, rank: Rank) -> CapacityDecision {
        if self.vips.contains(name) {
            return CapacityDecision::Admit;
        }

        let private = self.limits.private_bypass && address::is_private(source);
        if self.online.count() >= self.limits.max_players && !private {
            return CapacityDecision::ServerFull;
        }
        if rank > self.limits.guest_rank {
            return CapacityDecision::Admit;
        }

        // Fresh count: other admissions may have landed since the first one
        let guests = self.online.count_at_or_below(self.limits.guest_rank);
        if guests < self.limits.max_guests {
            return CapacityDecision::Admit;
        }

        let notice = format!("Guest {} couldn't log in - too many guests.", name);
        if self.limits.guest_limit_notify {
            self.notifier.notify_ops(&notice);
        }
        warn!("{}", notice);
        CapacityDecision::TooManyGuests
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::net::SocketAddr;

    #[derive(Default)]
    struct RecordingNotifier {
        messages: Mutex<Vec<String>>,
    }

    impl OperatorNotifier for RecordingNotifier {
        fn notify_ops(&self, message: &str) {
            self.messages.lock().push(message.to_string());
        }
    }

    fn limits(max_players: usize, max_guests: usize) -> CapacityLimits {
        CapacityLimits {
            max_players,
            max_guests,
            guest_rank: Rank::GUEST,
            guest_limit_notify: true,
            private_bypass: true,
        }
    }

    fn public_ip() -> IpAddr {
        "203.0.113.10".parse().unwrap()
    }

    fn local_ip() -> IpAddr {
        "192.168.0.10".parse().unwrap()
    }

    fn addr() -> SocketAddr {
        "203.0.113.11:5000".parse().unwrap()
    }

    struct Fixture {
        controller: CapacityController,
        vips: Arc<NameList>,
        online: Arc<OnlineRegistry>,
        notifier: Arc<RecordingNotifier>,
    }

    fn fixture(limits: CapacityLimits) -> Fixture {
        let vips = Arc::new(NameList::in_memory());
        let online = Arc::new(OnlineRegistry::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let controller = CapacityController::new(
            limits,
            Arc::clone(&vips),
            Arc::clone(&online),
            notifier.clone(),
        );
        Fixture {
            controller,
            vips,
            online,
            notifier,
        }
    }

    #[test]
    fn test_admits_when_room() {
        let f = fixture(limits(2, 2));
        assert_eq!(
            f.controller.has_room("alice", public_ip(), Rank::GUEST),
            CapacityDecision::Admit
        );
    }

    #[test]
    fn test_server_full_for_public_address() {
        let f = fixture(limits(1, 5));
        f.online.insert("first", addr(), Rank::BUILDER);

        assert_eq!(
            f.controller.has_room("second", public_ip(), Rank::BUILDER),
            CapacityDecision::ServerFull
        );
        assert_eq!(
            f.controller.has_room("local", local_ip(), Rank::BUILDER),
            CapacityDecision::Admit
        );
    }

    #[test]
    fn test_private_bypass_can_be_disabled() {
        let f = fixture(CapacityLimits {
            private_bypass: false,
            ..limits(1, 5)
        });
        f.online.insert("first", addr(), Rank::BUILDER);

        assert_eq!(
            f.controller.has_room("local", local_ip(), Rank::BUILDER),
            CapacityDecision::ServerFull
        );
    }

    #[test]
    fn test_guest_limit() {
        let f = fixture(limits(10, 0));

        assert_eq!(
            f.controller.has_room("guest", public_ip(), Rank::GUEST),
            CapacityDecision::TooManyGuests
        );
        assert_eq!(
            f.controller.has_room("builder", public_ip(), Rank::BUILDER),
            CapacityDecision::Admit
        );
        assert_eq!(
            f.notifier.messages.lock().as_slice(),
            ["Guest guest couldn't log in - too many guests."]
        );
    }

    #[test]
    fn test_guest_limit_counts_only_guests() {
        let f = fixture(limits(10, 1));
        f.online.insert("op", addr(), Rank::OPERATOR);
        assert_eq!(
            f.controller.has_room("guest1", public_ip(), Rank::GUEST),
            CapacityDecision::Admit
        );

        f.online.insert("guest1", addr(), Rank::GUEST);
        assert_eq!(
            f.controller.has_room("guest2", public_ip(), Rank::GUEST),
            CapacityDecision::TooManyGuests
        );
    }

    #[test]
    fn test_guest_limit_without_notify() {
        let f = fixture(CapacityLimits {
            guest_limit_notify: false,
            ..limits(10, 0)
        });
        f.controller.has_room("guest", public_ip(), Rank::GUEST);
        assert!(f.notifier.messages.lock().is_empty());
    }

    #[test]
    fn test_vip_bypasses_everything() {
        let f = fixture(limits(0, 0));
        f.vips.add("Vip");

        assert_eq!(
            f.controller.has_room("vip", public_ip(), Rank::GUEST),
            CapacityDecision::Admit
        );
    }

    #[test]
    fn test_decision_messages() {
        assert_eq!(CapacityDecision::Admit.message(), None);
        assert_eq!(CapacityDecision::ServerFull.message(), Some("Server full!"));
        assert_eq!(
            CapacityDecision::TooManyGuests.message(),
            Some("Server has reached max number of guests")
        );
    }
}
