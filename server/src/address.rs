//! Classification of source addresses.
//!
//! Several checks treat connections from the local machine or the local
//! network as trusted. "Private" here covers loopback, RFC1918, link-local
//! and IPv6 unique-local ranges.

use ipnet::IpNet;
use std::net::IpAddr;
use std::sync::LazyLock;

const PRIVATE_CIDRS: &[&str] = &[
    "127.0.0.0/8",
    "10.0.0.0/8",
    "172.16.0.0/12",
    "192.168.0.0/16",
    "169.254.0.0/16",
    "::1/128",
    "fc00::/7",
    "fe80::/10",
];

static PRIVATE_NETS: LazyLock<Vec<IpNet>> = LazyLock::new(|| {
    PRIVATE_CIDRS
        .iter()
        .filter_map(|s| s.parse::<IpNet>().ok())
        .collect()
});

/// Returns true for loopback, LAN and link-local addresses.
///
/// IPv4-mapped IPv6 addresses are unwrapped first so `::ffff:127.0.0.1`
/// classifies the same as `127.0.0.1`.
pub fn is_private(ip: IpAddr) -> bool {
    let ip = ip.to_canonical();
    PRIVATE_NETS.iter().any(|net| net.contains(&ip))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_private_ranges() {
        assert!(is_private(ip("127.0.0.1")));
        assert!(is_private(ip("10.1.2.3")));
        assert!(is_private(ip("172.16.0.1")));
        assert!(is_private(ip("172.31.255.255")));
        assert!(is_private(ip("192.168.1.20")));
        assert!(is_private(ip("169.254.10.10")));
        assert!(is_private(ip("::1")));
        assert!(is_private(ip("fd12:3456::1")));
        assert!(is_private(ip("fe80::1")));
    }

    #[test]
    fn test_public_ranges() {
        assert!(!is_private(ip("8.8.8.8")));
        assert!(!is_private(ip("172.32.0.1")));
        assert!(!is_private(ip("203.0.113.9")));
        assert!(!is_private(ip("2001:db8::1")));
    }

    #[test]
    fn test_mapped_ipv4() {
        assert!(is_private(ip("::ffff:127.0.0.1")));
        assert!(!is_private(ip("::ffff:8.8.8.8")));
    }
}
