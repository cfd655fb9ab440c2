//! Error taxonomy for the resolver core.
//!
//! Every failure the transport layer can observe is one of the five kinds
//! `spec.md` §7 names: no candidate servers, transport exhaustion,
//! cancellation, a malformed response, or a non-success DNS status. Each
//! kind carries its own struct (mirroring the runner/shelter error modules)
//! so the message stays attached to the place that raised it instead of
//! being flattened into a single string. The Resolver Facade (`spec.md`
//! §4.1) adds one more kind of its own: `resolve(addr)`'s `no-answer` case,
//! which is a facade-level condition rather than a transport failure.

use std::fmt;

/// Result alias used throughout the core.
pub type Result<T> = std::result::Result<T, ResolveError>;

/// No endpoint was available to try: the configured or filtered server list
/// was empty before a single attempt was made.
#[derive(Debug)]
pub struct NoServersError;

/// Every candidate endpoint was tried and none produced a usable response.
#[derive(Debug)]
pub struct TransportUnreachableError {
    message: String,
}

impl TransportUnreachableError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Caller cancellation or a configured timeout fired before a response
/// arrived.
#[derive(Debug)]
pub struct CancelledError {
    message: String,
}

impl CancelledError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The decoded response violates the transport's framing contract: not a
/// response, truncated on a non-datagram transport, or a DoH content-type
/// mismatch.
#[derive(Debug)]
pub struct ProtocolFormatError {
    message: String,
}

impl ProtocolFormatError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The server answered with a non-success RCODE and `throw_on_error_status`
/// is set.
#[derive(Debug)]
pub struct DnsStatusError {
    status: hickory_proto::op::ResponseCode,
}

impl DnsStatusError {
    pub fn new(status: hickory_proto::op::ResponseCode) -> Self {
        Self { status }
    }

    pub fn status(&self) -> hickory_proto::op::ResponseCode {
        self.status
    }
}

/// `resolve(addr)` got a successful response with no PTR record in it
/// (`spec.md` §4.1: "no-PTR → `no-answer`").
#[derive(Debug)]
pub struct NoAnswerError;

/// Unified error type returned by every public `stubres` operation.
#[derive(Debug)]
pub enum ResolveError {
    NoServers(NoServersError),
    TransportUnreachable(TransportUnreachableError),
    Cancelled(CancelledError),
    ProtocolFormat(ProtocolFormatError),
    DnsStatus(DnsStatusError),
    NoAnswer(NoAnswerError),
}

impl ResolveError {
    pub fn no_servers() -> Self {
        Self::NoServers(NoServersError)
    }

    pub fn transport_unreachable(message: impl Into<String>) -> Self {
        Self::TransportUnreachable(TransportUnreachableError::new(message))
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled(CancelledError::new(message))
    }

    pub fn protocol_format(message: impl Into<String>) -> Self {
        Self::ProtocolFormat(ProtocolFormatError::new(message))
    }

    pub fn dns_status(status: hickory_proto::op::ResponseCode) -> Self {
        Self::DnsStatus(DnsStatusError::new(status))
    }

    pub fn no_answer() -> Self {
        Self::NoAnswer(NoAnswerError)
    }
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoServers(_) => write!(f, "no candidate servers configured"),
            Self::TransportUnreachable(e) => write!(f, "transport unreachable: {}", e.message),
            Self::Cancelled(e) => write!(f, "query cancelled: {}", e.message),
            Self::ProtocolFormat(e) => write!(f, "protocol format error: {}", e.message),
            Self::DnsStatus(e) => write!(f, "server returned {}", rcode_mnemonic(e.status())),
            Self::NoAnswer(_) => write!(f, "no answer: response contained no matching record"),
        }
    }
}

/// Map a response code to the RFC 1035 mnemonic `spec.md` §8 scenario 3
/// requires error messages to contain (e.g. `NXDomain` must read as
/// `"NameError"`), rather than `hickory_proto`'s own `Debug` spelling.
fn rcode_mnemonic(status: hickory_proto::op::ResponseCode) -> String {
    use hickory_proto::op::ResponseCode;
    match status {
        ResponseCode::NoError => "NoError".to_string(),
        ResponseCode::FormErr => "FormatError".to_string(),
        ResponseCode::ServFail => "ServerFailure".to_string(),
        ResponseCode::NXDomain => "NameError".to_string(),
        ResponseCode::NotImp => "NotImplemented".to_string(),
        ResponseCode::Refused => "Refused".to_string(),
        // Not spelled out in RFC 1035; fall back to hickory's own mnemonic
        // rather than inventing one spec.md does not name.
        other => format!("{other:?}"),
    }
}

impl std::error::Error for ResolveError {}

impl From<std::io::Error> for ResolveError {
    fn from(err: std::io::Error) -> Self {
        Self::transport_unreachable(err.to_string())
    }
}

impl From<reqwest::Error> for ResolveError {
    fn from(err: reqwest::Error) -> Self {
        Self::transport_unreachable(err.to_string())
    }
}

impl From<hickory_proto::ProtoError> for ResolveError {
    fn from(err: hickory_proto::ProtoError) -> Self {
        Self::protocol_format(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for ResolveError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::cancelled("deadline elapsed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::op::ResponseCode;

    #[test]
    fn nxdomain_status_message_contains_name_error() {
        let err = ResolveError::dns_status(ResponseCode::NXDomain);
        assert!(err.to_string().contains("NameError"));
    }
}
