//! Classic Do53 transport: UDP with TCP fallback (`spec.md` §4.4).

use std::net::IpAddr;
use std::time::Duration;

use hickory_proto::op::{Message, MessageType};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};

use crate::codec;
use crate::error::{ResolveError, Result};
use crate::server::Endpoint;

/// Default per-phase timeout, applied independently to the UDP attempt and
/// to any TCP fallback it triggers.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(4);

pub struct Do53Transport {
    timeout: Duration,
}

impl Do53Transport {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Try each `Plain` endpoint in order (`spec.md` §4.2 already sorted
    /// IPv4 first) until one produces a validated response.
    pub async fn query(&self, servers: &[Endpoint], message: &Message) -> Result<Message> {
        let mut tried = false;
        let mut last_err = None;

        for endpoint in servers {
            let Endpoint::Plain(addr) = endpoint else {
                continue;
            };
            tried = true;
            match self.query_one(*addr, message).await {
                Ok(response) => return Ok(response),
                Err(err) => last_err = Some(err),
            }
        }

        if !tried {
            return Err(ResolveError::no_servers());
        }
        Err(last_err
            .unwrap_or_else(|| ResolveError::transport_unreachable("no do53 server produced a response")))
    }

    async fn query_one(&self, addr: IpAddr, message: &Message) -> Result<Message> {
        match self.query_udp(addr, message).await {
            Ok(response) if !response.truncated() => Ok(response),
            Ok(_truncated) => self.query_tcp(addr, message).await,
            Err(_udp_err) => self.query_tcp(addr, message).await,
        }
    }

    async fn query_udp(&self, addr: IpAddr, message: &Message) -> Result<Message> {
        let bytes = codec::encode(message)?;
        let attempt = async {
            let socket = UdpSocket::bind(local_bind_addr(addr)).await?;
            socket.connect((addr, 53)).await?;
            socket.send(&bytes).await?;
            let mut buf = [0u8; 4096];
            let len = socket.recv(&mut buf).await?;
            Ok::<_, std::io::Error>(buf[..len].to_vec())
        };
        let received = tokio::time::timeout(self.timeout, attempt).await??;
        validate(message.id(), codec::decode(&received)?, AllowTruncated::Yes)
    }

    async fn query_tcp(&self, addr: IpAddr, message: &Message) -> Result<Message> {
        let bytes = codec::encode(message)?;
        let len = u16::try_from(bytes.len())
            .map_err(|_| ResolveError::protocol_format("message exceeds the 65535-byte tcp frame limit"))?;

        let attempt = async {
            let mut stream = TcpStream::connect((addr, 53)).await?;
            stream.write_all(&len.to_be_bytes()).await?;
            stream.write_all(&bytes).await?;

            let mut len_buf = [0u8; 2];
            stream.read_exact(&mut len_buf).await?;
            let response_len = u16::from_be_bytes(len_buf) as usize;
            let mut frame = vec![0u8; response_len];
            stream.read_exact(&mut frame).await?;
            Ok::<_, std::io::Error>(frame)
        };
        let received = tokio::time::timeout(self.timeout, attempt).await??;
        validate(message.id(), codec::decode(&received)?, AllowTruncated::No)
    }
}

/// Whether a `Truncated` response is acceptable from this phase. UDP may
/// legitimately be truncated (that is the signal to fall back to TCP); a
/// stream transport like TCP must not be (`spec.md` §7 kind 4, §8's
/// universal invariant).
enum AllowTruncated {
    Yes,
    No,
}

fn validate(expected_id: u16, response: Message, allow_truncated: AllowTruncated) -> Result<Message> {
    if response.message_type() != MessageType::Response {
        return Err(ResolveError::protocol_format("expected a response message"));
    }
    if response.id() != expected_id {
        return Err(ResolveError::protocol_format("response id did not match the query"));
    }
    if matches!(allow_truncated, AllowTruncated::No) && response.truncated() {
        return Err(ResolveError::protocol_format(
            "response was marked truncated over a tcp transport",
        ));
    }
    Ok(response)
}

fn local_bind_addr(remote: IpAddr) -> (IpAddr, u16) {
    if remote.is_ipv4() {
        (IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED), 0)
    } else {
        (IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED), 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_truncated_response_when_disallowed() {
        let mut response = Message::new();
        response.set_id(7);
        response.set_message_type(MessageType::Response);
        response.set_truncated(true);
        let result = validate(7, response, AllowTruncated::No);
        assert!(matches!(result, Err(ResolveError::ProtocolFormat(_))));
    }

    #[test]
    fn validate_allows_truncated_response_when_allowed() {
        let mut response = Message::new();
        response.set_id(7);
        response.set_message_type(MessageType::Response);
        response.set_truncated(true);
        let result = validate(7, response, AllowTruncated::Yes);
        assert!(result.is_ok());
    }

    #[test]
    fn query_with_no_plain_endpoints_reports_no_servers() {
        let transport = Do53Transport::new(DEFAULT_TIMEOUT);
        let message = Message::new();
        let endpoints = vec![Endpoint::Doh {
            url: "https://example.com/dns-query".to_string(),
        }];
        let result = tokio_test_block_on(transport.query(&endpoints, &message));
        assert!(matches!(result, Err(ResolveError::NoServers(_))));
    }

    // Minimal single-threaded block_on so this module does not need the
    // `rt-multi-thread` dev feature just to exercise synchronous-looking
    // early-exit paths.
    fn tokio_test_block_on<F: std::future::Future>(fut: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(fut)
    }
}
