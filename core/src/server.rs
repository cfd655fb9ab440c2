//! Server Registry (`spec.md` §4.2).
//!
//! Owns the list of candidate upstream endpoints for a transport and the
//! "available" family filter. Endpoints are immutable once constructed, per
//! `spec.md` §3.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, UdpSocket};

/// A candidate upstream endpoint. Discriminated by transport, as `spec.md`
/// §3 requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Classic Do53: implicit port 53.
    Plain(IpAddr),
    /// DNS-over-TLS: address to dial, SNI hostname, TCP port (default 853),
    /// and an optional SPKI pin list (`spec.md` §4.6, §9).
    Dot {
        addr: IpAddr,
        host: String,
        port: u16,
        pins: Vec<String>,
    },
    /// DNS-over-HTTPS: an absolute HTTPS URL.
    Doh { url: String },
}

impl Endpoint {
    pub fn dot(addr: IpAddr, host: impl Into<String>) -> Self {
        Self::Dot {
            addr,
            host: host.into(),
            port: 853,
            pins: Vec::new(),
        }
    }

    pub fn dot_pinned(addr: IpAddr, host: impl Into<String>, pins: Vec<String>) -> Self {
        Self::Dot {
            addr,
            host: host.into(),
            port: 853,
            pins,
        }
    }

    fn family_is_v4(&self) -> bool {
        match self {
            Self::Plain(addr) => addr.is_ipv4(),
            Self::Dot { addr, .. } => addr.is_ipv4(),
            // Doh endpoints carry no address family of their own; treat them
            // as neither so they survive the ordering pass untouched.
            Self::Doh { .. } => true,
        }
    }
}

/// An ordered list of candidate endpoints for one transport.
#[derive(Debug, Clone)]
pub struct ServerList {
    endpoints: Vec<Endpoint>,
}

impl ServerList {
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        Self { endpoints }
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter()
    }

    /// Default Do53 server list: the OS's resolver configuration.
    ///
    /// `spec.md` §4.2 describes this as "enumerate all up, non-loopback
    /// interfaces and concatenate their configured DNS addresses". We get
    /// the same answer, platform-independently, via
    /// `hickory_resolver::system_conf::read_system_conf`, which performs
    /// that enumeration (resolv.conf on Unix, the IP helper API on Windows)
    /// without this crate needing its own interface-walking code.
    pub fn do53_default() -> Self {
        let endpoints = match hickory_resolver::system_conf::read_system_conf() {
            Ok((config, _opts)) => config
                .name_servers()
                .iter()
                .map(|ns| Endpoint::Plain(ns.socket_addr.ip()))
                .collect(),
            Err(err) => {
                log::warn!("failed to read system resolver configuration: {err}");
                Vec::new()
            }
        };
        Self::new(endpoints)
    }

    /// Default DoT server list: a small built-in set of well-known public
    /// resolvers, as `spec.md` §4.2 specifies.
    pub fn dot_default() -> Self {
        Self::new(vec![
            Endpoint::dot(IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)), "cloudflare-dns.com"),
            Endpoint::dot(IpAddr::V4(Ipv4Addr::new(1, 0, 0, 1)), "cloudflare-dns.com"),
            Endpoint::dot(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)), "dns.google"),
            Endpoint::dot(IpAddr::V4(Ipv4Addr::new(8, 8, 4, 4)), "dns.google"),
            Endpoint::dot(IpAddr::V4(Ipv4Addr::new(9, 9, 9, 9)), "dns.quad9.net"),
            Endpoint::dot_pinned(
                IpAddr::V4(Ipv4Addr::new(146, 185, 167, 43)),
                "securedns.eu",
                vec!["xxOVCg/fDlcYvO7HEjoL2t28pyGLSAEtp/NhpJ0tsp8=".to_string()],
            ),
        ])
    }

    /// Default DoH server: a single built-in URL, as `spec.md` §4.2
    /// specifies.
    pub fn doh_default() -> Self {
        Self::new(vec![Endpoint::Doh {
            url: "https://cloudflare-dns.com/dns-query".to_string(),
        }])
    }

    /// Remove endpoints whose address family the host does not support, then
    /// order IPv4 before IPv6 (`spec.md` §4.2: "consumer routers frequently
    /// mis-handle IPv6").
    pub fn available(&self) -> Vec<Endpoint> {
        let v4_ok = family_supported(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        let v6_ok = family_supported(IpAddr::V6(Ipv6Addr::UNSPECIFIED));

        let mut filtered: Vec<Endpoint> = self
            .endpoints
            .iter()
            .filter(|ep| match ep {
                Endpoint::Plain(addr) => {
                    if addr.is_ipv4() {
                        v4_ok
                    } else {
                        v6_ok
                    }
                }
                Endpoint::Dot { addr, .. } => {
                    if addr.is_ipv4() {
                        v4_ok
                    } else {
                        v6_ok
                    }
                }
                Endpoint::Doh { .. } => true,
            })
            .cloned()
            .collect();

        filtered.sort_by_key(|ep| !ep.family_is_v4());
        filtered
    }
}

/// Probe whether the host can open a socket of the given address family.
/// Short-lived and local-only; never touches the network.
fn family_supported(unspecified: IpAddr) -> bool {
    UdpSocket::bind((unspecified, 0)).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn available_orders_v4_before_v6() {
        let list = ServerList::new(vec![
            Endpoint::Plain(IpAddr::V6(Ipv6Addr::LOCALHOST)),
            Endpoint::Plain(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8))),
        ]);
        let available = list.available();
        if available.len() == 2 {
            assert!(available[0].family_is_v4());
            assert!(!available[1].family_is_v4());
        }
    }

    #[test]
    fn empty_list_is_empty() {
        assert!(ServerList::new(Vec::new()).is_empty());
    }

    #[test]
    fn dot_default_is_not_empty() {
        assert!(!ServerList::dot_default().is_empty());
    }

    #[test]
    fn doh_default_has_one_url() {
        let list = ServerList::doh_default();
        assert_eq!(list.iter().count(), 1);
    }
}
