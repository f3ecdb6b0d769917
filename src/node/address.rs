//! IPv4 packing for kernel map keys
//!
//! sockops and redirect programs read addresses out of `struct bpf_sock_ops`
//! as a `__u32` whose in-memory bytes are the octets in network order. Keys
//! written from userspace must use the same layout, so 10.0.0.5 becomes
//! `u32::from_ne_bytes([10, 0, 0, 5])` (0x0500000A on little-endian hosts).

use crate::error::InvalidAddress;
use std::net::{IpAddr, Ipv4Addr};

/// Parse a dotted-quad string and pack it into a network-order `u32`.
///
/// IPv6 literals, including IPv4-mapped forms, are rejected.
pub fn pack_ipv4(address: &str) -> Result<u32, InvalidAddress> {
    match address.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => Ok(pack_octets(v4)),
        Ok(IpAddr::V6(_)) => Err(InvalidAddress::Ipv6(address.to_string())),
        Err(_) => Err(InvalidAddress::Malformed(address.to_string())),
    }
}

/// Pack an already parsed address.
pub fn pack_octets(address: Ipv4Addr) -> u32 {
    u32::from_ne_bytes(address.octets())
}

/// Inverse of [`pack_ipv4`].
pub fn unpack_ipv4(packed: u32) -> Ipv4Addr {
    Ipv4Addr::from(packed.to_ne_bytes())
}
