//! DNS-over-HTTPS transport: POST requests carrying wire-format bodies
//! (`spec.md` §4.5).

use std::time::Duration;

use hickory_proto::op::{Message, MessageType};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tokio::sync::Mutex;

use crate::codec;
use crate::error::{ResolveError, Result};
use crate::server::Endpoint;

const DNS_MESSAGE_MIME: &str = "application/dns-message";

/// Default per-query timeout. Unlike Do53/DoT there is no separate
/// connect/read split to budget independently; one request, one deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(4);

pub struct DohTransport {
    client: reqwest::Client,
    /// Reqwest multiplexes safely on its own, but we still serialize request
    /// bodies through this so DoH and DoT present the same "one writer at a
    /// time" shape to a caller juggling both.
    write_lock: Mutex<()>,
}

impl DohTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            write_lock: Mutex::new(()),
        })
    }

    pub async fn query(&self, servers: &[Endpoint], message: &Message) -> Result<Message> {
        let mut tried = false;
        let mut last_err = None;

        for endpoint in servers {
            let Endpoint::Doh { url } = endpoint else {
                continue;
            };
            tried = true;
            match self.query_one(url, message).await {
                Ok(response) => return Ok(response),
                Err(err) => last_err = Some(err),
            }
        }

        if !tried {
            return Err(ResolveError::no_servers());
        }
        Err(last_err
            .unwrap_or_else(|| ResolveError::transport_unreachable("no doh server produced a response")))
    }

    async fn query_one(&self, url: &str, message: &Message) -> Result<Message> {
        let bytes = codec::encode(message)?;

        let _guard = self.write_lock.lock().await;
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, DNS_MESSAGE_MIME)
            .header(ACCEPT, DNS_MESSAGE_MIME)
            .body(bytes)
            .send()
            .await?;
        drop(_guard);

        if !response.status().is_success() {
            return Err(ResolveError::transport_unreachable(format!(
                "doh server returned http status {}",
                response.status()
            )));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.starts_with(DNS_MESSAGE_MIME) {
            return Err(ResolveError::protocol_format(format!(
                "unexpected doh content-type: {content_type}"
            )));
        }

        let body = response.bytes().await?;
        validate(message.id(), codec::decode(&body)?)
    }
}

fn validate(expected_id: u16, response: Message) -> Result<Message> {
    if response.message_type() != MessageType::Response {
        return Err(ResolveError::protocol_format("expected a response message"));
    }
    if response.id() != expected_id {
        return Err(ResolveError::protocol_format("response id did not match the query"));
    }
    // `spec.md` §4.5 applies the same validation rules as §4.3, which
    // requires `Truncated` clear; DoH has no UDP phase to fall back from,
    // so a truncated answer here is simply malformed.
    if response.truncated() {
        return Err(ResolveError::protocol_format(
            "doh response was marked truncated",
        ));
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_truncated_response() {
        let mut response = Message::new();
        response.set_id(3);
        response.set_message_type(MessageType::Response);
        response.set_truncated(true);
        let result = validate(3, response);
        assert!(matches!(result, Err(ResolveError::ProtocolFormat(_))));
    }

    #[test]
    fn query_with_no_doh_endpoints_reports_no_servers() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let transport = DohTransport::new(DEFAULT_TIMEOUT).unwrap();
        let message = Message::new();
        let endpoints = vec![Endpoint::Plain("1.1.1.1".parse().unwrap())];
        let result = rt.block_on(transport.query(&endpoints, &message));
        assert!(matches!(result, Err(ResolveError::NoServers(_))));
    }
}
