//! Topology registry: local identity, service discovery and the
//! interface-to-next-hop resolution table.
//!
//! Loaded once at startup from `topology.toml` in the configuration
//! directory; read-only afterwards.

use crate::addr::{HostAddr, IsdAd};
use crate::{SciondError, SciondResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;

/// Infrastructure service kinds resolvable through the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Path,
    Beacon,
    Certificate,
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceKind::Path => "path",
            ServiceKind::Beacon => "beacon",
            ServiceKind::Certificate => "certificate",
        };
        write!(f, "{}", name)
    }
}

/// One infrastructure service instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub kind: ServiceKind,
    pub addr: SocketAddr,
}

/// One border-router interface and the internal host reaching it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceEntry {
    pub ifid: u16,
    pub next_hop: Ipv4Addr,
}

/// Static topology of the local AD as seen by the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topology {
    /// Local (ISD, AD) identity.
    pub local: IsdAd,
    /// Local host address.
    pub host: Ipv4Addr,
    /// SCION UDP port; 0 picks an ephemeral port.
    pub scion_port: u16,
    /// Known infrastructure services.
    #[serde(default)]
    pub services: Vec<ServiceEntry>,
    /// Border-router interfaces.
    #[serde(default)]
    pub interfaces: Vec<InterfaceEntry>,
}

impl Topology {
    /// Load from a TOML file.
    pub fn from_file(path: &Path) -> SciondResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SciondError::Topology(format!(
                "failed to read topology file {}: {}",
                path.display(),
                e
            ))
        })?;
        toml::from_str(&content)
            .map_err(|e| SciondError::Topology(format!("failed to parse topology file: {}", e)))
    }

    /// Address of the first registered instance of `kind`.
    pub fn resolve(&self, kind: ServiceKind) -> SciondResult<SocketAddr> {
        self.services
            .iter()
            .find(|service| service.kind == kind)
            .map(|service| service.addr)
            .ok_or_else(|| SciondError::ServiceLookup(format!("no {} service registered", kind)))
    }

    /// Interface-id to next-hop map, materialised once at startup.
    pub fn ifid_map(&self) -> HashMap<u16, HostAddr> {
        self.interfaces
            .iter()
            .map(|entry| (entry.ifid, HostAddr(entry.next_hop)))
            .collect()
    }

    pub fn host_addr(&self) -> HostAddr {
        HostAddr(self.host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        local = { isd = 1, ad = 10 }
        host = "192.168.1.5"
        scion_port = 30041

        [[services]]
        kind = "path"
        addr = "10.0.0.2:30041"

        [[interfaces]]
        ifid = 7
        next_hop = "192.168.1.1"
    "#;

    #[test]
    fn test_parse_and_resolve() {
        let topology: Topology = toml::from_str(SAMPLE).unwrap();
        assert_eq!(topology.local, IsdAd::new(1, 10));
        assert_eq!(
            topology.resolve(ServiceKind::Path).unwrap(),
            "10.0.0.2:30041".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_missing_service_is_lookup_error() {
        let topology: Topology = toml::from_str(SAMPLE).unwrap();
        match topology.resolve(ServiceKind::Beacon) {
            Err(SciondError::ServiceLookup(_)) => {}
            other => panic!("expected lookup error, got {:?}", other),
        }
    }

    #[test]
    fn test_ifid_map() {
        let topology: Topology = toml::from_str(SAMPLE).unwrap();
        let map = topology.ifid_map();
        assert_eq!(
            map.get(&7),
            Some(&HostAddr(Ipv4Addr::new(192, 168, 1, 1)))
        );
        assert!(map.get(&8).is_none());
    }

    #[test]
    fn test_from_file_missing_is_topology_error() {
        match Topology::from_file(Path::new("/nonexistent/topology.toml")) {
            Err(SciondError::Topology(_)) => {}
            other => panic!("expected topology error, got {:?}", other),
        }
    }
}
