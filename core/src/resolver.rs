//! Resolver Facade (`spec.md` §4.1): the single entry point callers use,
//! regardless of which transport backs it.

use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{Name, RData, RecordType};

use crate::connection::DotConnection;
use crate::error::{ResolveError, Result};
use crate::id::IdGenerator;
use crate::server::{Endpoint, ServerList};
use crate::transport::{do53, doh, Do53Transport, DohTransport};

/// DoT's per-round-trip deadline. `spec.md` §4.3 names no default distinct
/// from the other transports, so this mirrors Do53/DoH's 4 seconds.
const DOT_DEFAULT_TIMEOUT: Duration = Duration::from_secs(4);

/// Which wire transport a [`Resolver`] speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Do53,
    Dot,
    Doh,
}

enum Client {
    Do53(Do53Transport),
    Dot {
        connections: Vec<Arc<DotConnection>>,
        timeout: Duration,
    },
    Doh(DohTransport),
}

/// A configured resolver bound to one transport and one server list.
pub struct Resolver {
    client: Client,
    servers: ServerList,
    ids: IdGenerator,
    /// When set (the default), a non-`NoError` RCODE becomes
    /// [`ResolveError::DnsStatus`] instead of an `Ok` response the caller
    /// must inspect.
    throw_on_error_status: bool,
}

impl Resolver {
    /// Build a resolver for `transport`, using its built-in default server
    /// list unless `servers` overrides it entirely (`spec.md` §4.2: caller
    /// lists replace the default rather than extending it).
    pub fn new(transport: Transport, servers: Option<ServerList>) -> Self {
        let servers = servers.unwrap_or_else(|| match transport {
            Transport::Do53 => ServerList::do53_default(),
            Transport::Dot => ServerList::dot_default(),
            Transport::Doh => ServerList::doh_default(),
        });

        let client = match transport {
            Transport::Do53 => Client::Do53(Do53Transport::new(do53::DEFAULT_TIMEOUT)),
            Transport::Dot => {
                let connections = servers
                    .iter()
                    .filter_map(|ep| match ep {
                        Endpoint::Dot {
                            addr,
                            host,
                            port,
                            pins,
                        } => Some(DotConnection::new(*addr, host.clone(), *port, pins.clone())),
                        _ => None,
                    })
                    .collect();
                Client::Dot {
                    connections,
                    timeout: DOT_DEFAULT_TIMEOUT,
                }
            }
            Transport::Doh => Client::Doh(
                DohTransport::new(doh::DEFAULT_TIMEOUT)
                    .expect("default doh client configuration is always valid"),
            ),
        };

        Self {
            client,
            servers,
            ids: IdGenerator::new(),
            throw_on_error_status: true,
        }
    }

    /// Override whether a non-success RCODE becomes an error (`spec.md`
    /// §4.1 default: `true`).
    pub fn with_throw_on_error_status(mut self, value: bool) -> Self {
        self.throw_on_error_status = value;
        self
    }

    /// Send a fully-formed message and return its validated response.
    pub async fn query(&self, message: Message) -> Result<Message> {
        let response = match &self.client {
            Client::Do53(transport) => transport.query(&self.servers.available(), &message).await?,
            Client::Doh(transport) => transport.query(&self.servers.available(), &message).await?,
            Client::Dot { connections, timeout } => {
                self.query_dot(connections, *timeout, message).await?
            }
        };

        if self.throw_on_error_status && response.response_code() != ResponseCode::NoError {
            return Err(ResolveError::dns_status(response.response_code()));
        }
        Ok(response)
    }

    async fn query_dot(
        &self,
        connections: &[Arc<DotConnection>],
        timeout: Duration,
        message: Message,
    ) -> Result<Message> {
        if connections.is_empty() {
            return Err(ResolveError::no_servers());
        }
        let mut last_err = None;
        for connection in connections {
            match connection.send(message.clone(), timeout).await {
                Ok(response) => return Ok(response),
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err
            .unwrap_or_else(|| ResolveError::transport_unreachable("no dot server produced a response")))
    }

    /// Query a name and record type by name, e.g. `query_type("a.com", "MX")`.
    /// A convenience the distilled specification's `query(name, type)`
    /// signature implies but does not spell out as a string-typed helper.
    pub async fn query_type(&self, name: &str, record_type: &str) -> Result<Message> {
        let name = parse_name(name)?;
        let record_type = RecordType::from_str(record_type)
            .map_err(|_| ResolveError::protocol_format(format!("unknown record type: {record_type}")))?;
        self.query(self.build_query(name, record_type)).await
    }

    /// Resolve a hostname to its IPv4 and IPv6 addresses, querying both
    /// concurrently. Either branch failing fails the whole call, so a
    /// caller never has to guess whether an empty result means "no
    /// addresses" or "AAAA silently dropped" (`spec.md` §4.1).
    pub async fn resolve(&self, name: &str) -> Result<Vec<IpAddr>> {
        let name = parse_name(name)?;
        let (a, aaaa) = tokio::try_join!(
            self.query(self.build_query(name.clone(), RecordType::A)),
            self.query(self.build_query(name, RecordType::AAAA)),
        )?;

        let mut addrs = extract_addrs(&a);
        addrs.extend(extract_addrs(&aaaa));
        Ok(addrs)
    }

    /// Resolve an address to its first PTR name. `spec.md` §4.1 treats an
    /// answer with no PTR record as an error (`no-PTR -> no-answer`), not a
    /// silent empty result.
    pub async fn resolve_addr(&self, addr: IpAddr) -> Result<Name> {
        let response = self
            .query(self.build_query(reverse_name(addr), RecordType::PTR))
            .await?;
        extract_ptr(&response).ok_or_else(ResolveError::no_answer)
    }

    fn build_query(&self, name: Name, record_type: RecordType) -> Message {
        let mut message = Message::new();
        message.set_id(self.ids.next());
        message.set_message_type(MessageType::Query);
        message.set_op_code(OpCode::Query);
        message.set_recursion_desired(true);
        message.add_query(Query::query(name, record_type));
        message
    }
}

fn parse_name(name: &str) -> Result<Name> {
    Name::from_str(name).map_err(|_| ResolveError::protocol_format(format!("invalid name: {name}")))
}

fn extract_ptr(message: &Message) -> Option<Name> {
    message.answers().iter().find_map(|record| match record.data() {
        RData::PTR(ptr) => Some(ptr.0.clone()),
        _ => None,
    })
}

fn extract_addrs(message: &Message) -> Vec<IpAddr> {
    message
        .answers()
        .iter()
        .filter_map(|record| match record.data() {
            RData::A(a) => Some(IpAddr::V4(a.0)),
            RData::AAAA(aaaa) => Some(IpAddr::V6(aaaa.0)),
            _ => None,
        })
        .collect()
}

/// Build the `in-addr.arpa`/`ip6.arpa` query name for a reverse lookup
/// (RFC 1035 §3.5, RFC 3596 §2.5).
fn reverse_name(addr: IpAddr) -> Name {
    match addr {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            let label = format!("{}.{}.{}.{}.in-addr.arpa.", o[3], o[2], o[1], o[0]);
            Name::from_str(&label).expect("well-formed ipv4 reverse name")
        }
        IpAddr::V6(v6) => {
            let nibbles: String = v6
                .octets()
                .iter()
                .rev()
                .flat_map(|byte| [format!("{:x}", byte & 0xf), format!("{:x}", byte >> 4)])
                .collect::<Vec<_>>()
                .join(".");
            Name::from_str(&format!("{nibbles}.ip6.arpa.")).expect("well-formed ipv6 reverse name")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn reverse_name_for_ipv4() {
        let name = reverse_name(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)));
        assert_eq!(name.to_string(), "1.2.0.192.in-addr.arpa.");
    }

    #[test]
    fn reverse_name_for_ipv6_ends_in_ip6_arpa() {
        let name = reverse_name(IpAddr::V6(Ipv6Addr::LOCALHOST));
        assert!(name.to_string().ends_with("ip6.arpa."));
    }

    #[test]
    fn resolve_addr_raises_no_answer_without_a_ptr_record() {
        let response = Message::new();
        let result = extract_ptr(&response).ok_or_else(ResolveError::no_answer);
        assert!(matches!(result, Err(ResolveError::NoAnswer(_))));
    }

    #[test]
    fn query_type_rejects_unknown_record_type() {
        let resolver = Resolver::new(Transport::Do53, Some(ServerList::new(Vec::new())));
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let result = rt.block_on(resolver.query_type("example.com", "NOT-A-TYPE"));
        assert!(matches!(result, Err(ResolveError::ProtocolFormat(_))));
    }
}
