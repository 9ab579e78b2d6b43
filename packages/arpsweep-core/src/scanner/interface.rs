//! Local network context detection

use super::{AddressRange, ScanError};
use ipnetwork::IpNetwork;
use pnet::datalink::{self, NetworkInterface};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// The interface a scan runs on and the subnet it covers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkContext {
    pub interface: String,
    /// The interface's own address
    pub base_address: Ipv4Addr,
    pub subnet_mask: Ipv4Addr,
}

impl NetworkContext {
    pub fn new(interface: impl Into<String>, base_address: Ipv4Addr, subnet_mask: Ipv4Addr) -> Self {
        Self {
            interface: interface.into(),
            base_address,
            subnet_mask,
        }
    }

    /// Candidate addresses of this subnet
    pub fn addresses(&self) -> AddressRange {
        AddressRange::from(self)
    }

    /// Prefix length, if the mask is contiguous
    pub fn prefix(&self) -> Option<u8> {
        ipnetwork::ipv4_mask_to_prefix(self.subnet_mask).ok()
    }

    /// Subnet in `network/prefix` form, or `network/mask` for odd masks
    pub fn cidr(&self) -> String {
        let network = self.addresses().network_address();
        match self.prefix() {
            Some(prefix) => format!("{}/{}", network, prefix),
            None => format!("{}/{}", network, self.subnet_mask),
        }
    }
}

impl fmt::Display for NetworkContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} on {} (local address {})",
            self.cidr(),
            self.interface,
            self.base_address
        )
    }
}

/// Resolve the network context from the platform's interface list.
pub fn resolve() -> Result<NetworkContext, ScanError> {
    // The listing reports failure as an empty list; a working host always has
    // at least a loopback interface.
    let interfaces = datalink::interfaces();
    if interfaces.is_empty() {
        return Err(ScanError::InterfaceEnumeration(
            "the platform returned no network interfaces".to_string(),
        ));
    }

    tracing::debug!("Inspecting {} network interfaces", interfaces.len());
    select_context(&interfaces)
}

/// Pick the first interface/address pair that is IPv4 and not loopback.
///
/// Interfaces and their addresses are walked in the order given; there is no
/// preference between several usable interfaces.
pub fn select_context(interfaces: &[NetworkInterface]) -> Result<NetworkContext, ScanError> {
    for iface in interfaces {
        for network in &iface.ips {
            let IpNetwork::V4(v4) = network else {
                continue;
            };
            if v4.ip().is_loopback() {
                tracing::trace!("Skipping loopback address {} on {}", v4, iface.name);
                continue;
            }

            tracing::debug!("Selected interface {} with {}", iface.name, v4);
            return Ok(NetworkContext::new(iface.name.clone(), v4.ip(), v4.mask()));
        }
    }

    Err(ScanError::NoInterfaceFound)
}
