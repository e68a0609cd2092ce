//! Requester address comparison for pairing confirmation.

use ipnet::{IpNet, Ipv6Net};
use screenlink_config::IpValidationMode;
use std::net::{IpAddr, Ipv6Addr};

const V4_SUBNET_PREFIX: u8 = 24;
const V6_SUBNET_PREFIX: u8 = 64;

/// Whether `requester` may confirm a code issued to `bound` under `mode`.
pub fn addresses_match(mode: IpValidationMode, bound: IpAddr, requester: IpAddr) -> bool {
    let bound = bound.to_canonical();
    let requester = requester.to_canonical();

    match mode {
        IpValidationMode::Disabled => true,
        IpValidationMode::Strict => bound == requester,
        IpValidationMode::Subnet => same_subnet(bound, requester),
        IpValidationMode::Permissive => {
            bound == requester || (is_local_range(bound) && is_local_range(requester))
        }
    }
}

fn same_subnet(a: IpAddr, b: IpAddr) -> bool {
    let prefix = match a {
        IpAddr::V4(_) => V4_SUBNET_PREFIX,
        IpAddr::V6(_) => V6_SUBNET_PREFIX,
    };
    IpNet::new(a, prefix)
        .map(|net| net.contains(&b))
        .unwrap_or(false)
}

fn is_local_range(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback() || v4.is_link_local(),
        IpAddr::V6(v6) => v6.is_loopback() || in_v6_net(v6, "fc00::/7") || in_v6_net(v6, "fe80::/10"),
    }
}

fn in_v6_net(addr: Ipv6Addr, cidr: &str) -> bool {
    cidr.parse::<Ipv6Net>()
        .ok()
        .is_some_and(|net| net.contains(&addr))
}
