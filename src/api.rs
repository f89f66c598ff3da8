//! Local client API.
//!
//! Binary UDP request/response surface for co-located processes. Every
//! datagram is one self-contained request; the reply goes back to the
//! datagram's source address.

use crate::addr::{HostAddr, IsdAd};
use crate::combinator::FullPath;
use crate::daemon::Daemon;
use crate::{SciondError, SciondResult};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{error, info, warn};

/// Path request discriminator.
pub const API_PATH_REQUEST: u8 = 0x00;
/// Address request discriminator.
pub const API_ADDRESS_REQUEST: u8 = 0x01;

/// Largest packed path the reply format can carry: the length field counts
/// 8-byte units in one byte.
const MAX_RAW_PATH: usize = 255 * 8;

/// Local API server bound to its UDP socket.
pub struct LocalApi {
    sock: Arc<UdpSocket>,
    daemon: Daemon,
}

impl LocalApi {
    pub fn new(sock: Arc<UdpSocket>, daemon: Daemon) -> Self {
        Self { sock, daemon }
    }

    /// Serve datagrams until the task is aborted.
    pub async fn run(self) {
        let mut buf = vec![0u8; 2048];
        loop {
            let (len, sender) = match self.sock.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    error!("API socket receive failed: {}", e);
                    continue;
                }
            };
            self.dispatch(&buf[..len], sender);
        }
    }

    fn dispatch(&self, packet: &[u8], sender: SocketAddr) {
        let Some(&discriminator) = packet.first() else {
            warn!("API: empty datagram from {}.", sender);
            return;
        };
        match discriminator {
            API_PATH_REQUEST => {
                self.daemon.record_api_request();
                info!("API: path request from {}.", sender);
                // each request runs on its own worker so that a slow
                // resolution does not block other clients
                let sock = Arc::clone(&self.sock);
                let daemon = self.daemon.clone();
                let packet = packet.to_vec();
                tokio::spawn(async move {
                    if let Err(e) = handle_path_request(&daemon, &sock, &packet, sender).await {
                        warn!("API: path request from {} failed: {}", sender, e);
                    }
                });
            }
            API_ADDRESS_REQUEST => {
                self.daemon.record_api_request();
                let sock = Arc::clone(&self.sock);
                let host = self.daemon.host_addr();
                tokio::spawn(async move {
                    if let Err(e) = sock.send_to(&host.pack(), sender).await {
                        warn!("API: address reply to {} failed: {}", sender, e);
                    }
                });
            }
            other => warn!("API: {}", SciondError::UnknownApiDiscriminator(other)),
        }
    }
}

async fn handle_path_request(
    daemon: &Daemon,
    sock: &UdpSocket,
    packet: &[u8],
    sender: SocketAddr,
) -> SciondResult<()> {
    if packet.len() < 1 + IsdAd::LEN {
        return Err(SciondError::Codec(format!(
            "path request needs {} bytes, got {}",
            1 + IsdAd::LEN,
            packet.len()
        )));
    }
    let dst = IsdAd::from_raw(&packet[1..1 + IsdAd::LEN])?;
    let paths = daemon.get_paths(dst).await;
    let reply = encode_path_reply(&paths, daemon.ifid2addr(), daemon.scion_port());
    sock.send_to(&reply, sender).await?;
    Ok(())
}

/// Encode a path reply: the concatenation of one entry per path. An empty
/// payload means no path was found. Paths the format cannot carry (packed
/// form over 2040 bytes, interface ids above 255) are skipped with a
/// warning instead of corrupting the stream.
pub fn encode_path_reply(
    paths: &[FullPath],
    ifid2addr: &HashMap<u16, HostAddr>,
    scion_port: u16,
) -> Vec<u8> {
    let mut reply = Vec::new();
    for path in paths {
        match encode_path_entry(path, ifid2addr, scion_port) {
            Ok(entry) => reply.extend_from_slice(&entry),
            Err(e) => warn!("API: dropping unencodable path: {}", e),
        }
    }
    reply
}

/// One reply entry:
/// `path_len(1B, 8-byte units) | raw_path | fh_ip(4B) | fh_port(2B BE) |
///  if_count(1B) | if_count * (isd_ad_bits(4B LE) | link_id(1B))`.
fn encode_path_entry(
    path: &FullPath,
    ifid2addr: &HashMap<u16, HostAddr>,
    scion_port: u16,
) -> SciondResult<Vec<u8>> {
    let raw_path = path.pack();
    if raw_path.len() > MAX_RAW_PATH {
        return Err(SciondError::PathTooLong(format!(
            "packed path is {} bytes, limit {}",
            raw_path.len(),
            MAX_RAW_PATH
        )));
    }
    let interfaces = path.interfaces();
    if interfaces.len() > u8::MAX as usize {
        return Err(SciondError::PathTooLong(format!(
            "{} interface entries, limit {}",
            interfaces.len(),
            u8::MAX
        )));
    }
    // the empty path and unknown interfaces keep the dummy forwarding hop
    let fwd_host = path
        .fwd_if()
        .and_then(|ifid| ifid2addr.get(&ifid).copied())
        .unwrap_or_else(HostAddr::unspecified);

    let mut entry = Vec::with_capacity(1 + raw_path.len() + 7 + interfaces.len() * 5);
    entry.push((raw_path.len() / 8) as u8);
    entry.extend_from_slice(&raw_path);
    entry.extend_from_slice(&fwd_host.pack());
    entry.extend_from_slice(&scion_port.to_be_bytes());
    entry.push(interfaces.len() as u8);
    for (isd_ad, link) in interfaces {
        let link = u8::try_from(link).map_err(|_| {
            SciondError::PathTooLong(format!(
                "interface id {} exceeds the 1-byte link field",
                link
            ))
        })?;
        entry.extend_from_slice(&isd_ad.to_raw());
        entry.push(link);
    }
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combinator::PathHop;
    use std::net::Ipv4Addr;

    fn sample_path() -> FullPath {
        FullPath::new(vec![
            PathHop {
                isd_ad: IsdAd::new(1, 10),
                ingress: 0,
                egress: 21,
            },
            PathHop {
                isd_ad: IsdAd::new(1, 1),
                ingress: 11,
                egress: 12,
            },
            PathHop {
                isd_ad: IsdAd::new(2, 20),
                ingress: 22,
                egress: 0,
            },
        ])
    }

    fn next_hops() -> HashMap<u16, HostAddr> {
        let mut map = HashMap::new();
        map.insert(21, HostAddr(Ipv4Addr::new(10, 0, 0, 7)));
        map
    }

    #[test]
    fn test_entry_layout() {
        let path = sample_path();
        let reply = encode_path_reply(&[path.clone()], &next_hops(), 30041);

        assert_eq!(reply[0], 3); // three 8-byte hop records
        let raw_len = 3 * 8;
        assert_eq!(&reply[1..1 + raw_len], &path.pack()[..]);

        let mut at = 1 + raw_len;
        assert_eq!(&reply[at..at + 4], &[10, 0, 0, 7]);
        at += 4;
        assert_eq!(&reply[at..at + 2], &30041u16.to_be_bytes());
        at += 2;
        assert_eq!(reply[at], 4); // interface count
        at += 1;
        // first interface entry: (1-10, link 21)
        assert_eq!(&reply[at..at + 4], &IsdAd::new(1, 10).to_raw());
        assert_eq!(reply[at + 4], 21);
        at += 4 * 5;
        assert_eq!(at, reply.len());
    }

    #[test]
    fn test_no_paths_is_empty_payload() {
        assert!(encode_path_reply(&[], &HashMap::new(), 30041).is_empty());
    }

    #[test]
    fn test_empty_path_keeps_dummy_forwarding_hop() {
        let reply = encode_path_reply(&[FullPath::empty()], &next_hops(), 30041);
        // path_len 0, dummy 0.0.0.0, port, zero interfaces
        assert_eq!(reply[0], 0);
        assert_eq!(&reply[1..5], &[0, 0, 0, 0]);
        assert_eq!(&reply[5..7], &30041u16.to_be_bytes());
        assert_eq!(reply[7], 0);
        assert_eq!(reply.len(), 8);
    }

    #[test]
    fn test_unknown_forwarding_interface_falls_back_to_dummy() {
        let reply = encode_path_reply(&[sample_path()], &HashMap::new(), 30041);
        let at = 1 + 3 * 8;
        assert_eq!(&reply[at..at + 4], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_oversized_link_id_drops_path() {
        let path = FullPath::new(vec![
            PathHop {
                isd_ad: IsdAd::new(1, 10),
                ingress: 0,
                egress: 300,
            },
            PathHop {
                isd_ad: IsdAd::new(2, 20),
                ingress: 301,
                egress: 0,
            },
        ]);
        assert!(encode_path_reply(&[path], &HashMap::new(), 30041).is_empty());
    }

    #[test]
    fn test_oversized_path_dropped_not_truncated() {
        let mut hops = Vec::new();
        for ad in 0..260u32 {
            hops.push(PathHop {
                isd_ad: IsdAd::new(1, ad),
                ingress: 1,
                egress: 2,
            });
        }
        let reply = encode_path_reply(&[FullPath::new(hops)], &HashMap::new(), 30041);
        assert!(reply.is_empty());
    }
}
