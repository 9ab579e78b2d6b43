//! Candidate address enumeration for a subnet

use super::NetworkContext;
use std::iter::FusedIterator;
use std::net::Ipv4Addr;

/// The probeable addresses of a subnet, produced lazily.
///
/// The range is a plain value; every call to [`AddressRange::iter`] starts a
/// fresh walk, so the same range always yields the same ascending sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange {
    base: Ipv4Addr,
    mask: Ipv4Addr,
}

impl AddressRange {
    pub fn new(base: Ipv4Addr, mask: Ipv4Addr) -> Self {
        Self { base, mask }
    }

    /// First address of the subnet (all host bits zero)
    pub fn network_address(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.base) & u32::from(self.mask))
    }

    /// Last address of the subnet (all host bits one)
    pub fn broadcast_address(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.base) | !u32::from(self.mask))
    }

    pub fn iter(&self) -> Addresses {
        let network = u32::from(self.network_address());
        Addresses {
            next: Some(network),
            network,
            mask: u32::from(self.mask),
            broadcast: u32::from(self.broadcast_address()),
        }
    }
}

impl From<&NetworkContext> for AddressRange {
    fn from(ctx: &NetworkContext) -> Self {
        Self::new(ctx.base_address, ctx.subnet_mask)
    }
}

impl IntoIterator for AddressRange {
    type Item = Ipv4Addr;
    type IntoIter = Addresses;

    fn into_iter(self) -> Addresses {
        self.iter()
    }
}

impl IntoIterator for &AddressRange {
    type Item = Ipv4Addr;
    type IntoIter = Addresses;

    fn into_iter(self) -> Addresses {
        self.iter()
    }
}

/// Iterator over the candidate addresses of an [`AddressRange`]
#[derive(Debug, Clone)]
pub struct Addresses {
    next: Option<u32>,
    network: u32,
    mask: u32,
    broadcast: u32,
}

impl Iterator for Addresses {
    type Item = Ipv4Addr;

    fn next(&mut self) -> Option<Ipv4Addr> {
        while let Some(current) = self.next {
            // Stop at the first address that falls outside the subnet
            if current & self.mask != self.network {
                self.next = None;
                return None;
            }
            self.next = current.checked_add(1);

            if current == self.network || current == self.broadcast {
                continue;
            }
            let addr = Ipv4Addr::from(current);
            if is_loopback(addr) {
                continue;
            }
            return Some(addr);
        }
        None
    }
}

impl FusedIterator for Addresses {}

/// 127.0.0.0/8
pub fn is_loopback(addr: Ipv4Addr) -> bool {
    addr.octets()[0] == 127
}
