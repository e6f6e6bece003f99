//! Multicast group addressing for both PTP generations.
//!
//! IEEE 1588-2002 sends all subdomains to one group and filters on the
//! subdomain name in the payload. IEEE 1588-2008 assigns dedicated groups
//! to domains 0-3; every other domain shares the domain 0 group.

use std::net::Ipv4Addr;

/// Default PTP group (`224.0.1.129`), shared by v1 and v2 domain 0.
pub const PTP_PRIMARY_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 1, 129);

/// Dedicated v2 groups for domains 0 to 3, in domain order.
pub const PTP_V2_DOMAIN_GROUPS: [Ipv4Addr; 4] = [
    PTP_PRIMARY_GROUP,
    Ipv4Addr::new(224, 0, 1, 130),
    Ipv4Addr::new(224, 0, 1, 131),
    Ipv4Addr::new(224, 0, 1, 132),
];

/// Group for the legacy protocol. The subdomain never affects addressing.
#[must_use]
pub const fn v1_group() -> Ipv4Addr {
    PTP_PRIMARY_GROUP
}

/// Group for a modern-protocol domain.
#[must_use]
pub const fn v2_group(domain: u8) -> Ipv4Addr {
    match domain {
        0..=3 => PTP_V2_DOMAIN_GROUPS[domain as usize],
        _ => PTP_PRIMARY_GROUP,
    }
}
