//! IPv4 interface enumeration and broadcast-address computation
//! (spec.md §4.C): `broadcast = address ∧ mask ∨ ¬mask`.

use std::collections::HashSet;
use std::net::Ipv4Addr;

use crate::error::TransportError;

fn mask_u32(ip: Ipv4Addr, mask: Ipv4Addr) -> u32 {
    u32::from(ip) & u32::from(mask) | !u32::from(mask)
}

/// Broadcast address for every up, non-loopback IPv4 interface.
pub fn broadcast_addrs() -> Result<Vec<Ipv4Addr>, TransportError> {
    let ifaces = if_addrs::get_if_addrs()?;
    let mut out = Vec::new();
    for iface in ifaces {
        if iface.is_loopback() {
            continue;
        }
        if let if_addrs::IfAddr::V4(v4) = iface.addr {
            out.push(Ipv4Addr::from(mask_u32(v4.ip, v4.netmask)));
        }
    }
    if out.is_empty() {
        return Err(TransportError::NoInterfaces);
    }
    out.sort_unstable();
    out.dedup();
    Ok(out)
}

/// All local, non-loopback IPv4 addresses this host owns — used to drop
/// UDP datagrams that are our own broadcast loopback (spec.md §4.C).
pub fn local_ipv4_addrs() -> HashSet<Ipv4Addr> {
    if_addrs::get_if_addrs()
        .unwrap_or_default()
        .into_iter()
        .filter_map(|iface| match iface.addr {
            if_addrs::IfAddr::V4(v4) => Some(v4.ip),
            _ => None,
        })
        .collect()
}
