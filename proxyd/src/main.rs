//! A thin loopback DNS forwarding proxy: receive a Do53 datagram on
//! `--listen`, forward it over whichever transport `--transport` names, and
//! relay the response back. Exists so `stubres` is exercisable from the
//! command line without writing a client.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use stubres::{Endpoint, Resolver, ServerList, Transport};
use tokio::net::UdpSocket;

mod error;

use error::ProxyError;

#[derive(Parser, Debug)]
#[command(name = "stubres-proxyd", about = "Thin loopback DNS forwarding proxy")]
struct Args {
    /// Address to receive Do53 queries on.
    #[arg(long, default_value = "127.0.0.1:5053")]
    listen: SocketAddr,

    /// Upstream transport to forward over.
    #[arg(long, value_enum, default_value = "do53")]
    transport: TransportArg,

    /// Upstream server, overriding the transport's built-in default list.
    /// For `do53`, an IP address. For `dot`, `addr@host`. For `doh`, a URL.
    #[arg(long)]
    upstream: Option<String>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum TransportArg {
    Do53,
    Dot,
    Doh,
}

impl From<TransportArg> for Transport {
    fn from(value: TransportArg) -> Self {
        match value {
            TransportArg::Do53 => Transport::Do53,
            TransportArg::Dot => Transport::Dot,
            TransportArg::Doh => Transport::Doh,
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();
    if let Err(err) = run(args).await {
        log::error!("{err}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), ProxyError> {
    let transport: Transport = args.transport.into();
    let servers = args
        .upstream
        .as_deref()
        .map(|upstream| parse_upstream(transport, upstream))
        .transpose()?;
    let resolver = Arc::new(Resolver::new(transport, servers));

    let socket = Arc::new(UdpSocket::bind(args.listen).await?);
    log::info!("listening on {} forwarding over {:?}", args.listen, transport);

    let mut buf = [0u8; 4096];
    loop {
        let (len, peer) = socket.recv_from(&mut buf).await?;
        let message = match stubres::codec::decode(&buf[..len]) {
            Ok(message) => message,
            Err(err) => {
                log::warn!("dropping malformed datagram from {peer}: {err}");
                continue;
            }
        };

        let resolver = resolver.clone();
        let socket = socket.clone();
        tokio::spawn(async move {
            match resolver.query(message).await {
                Ok(response) => match stubres::codec::encode(&response) {
                    Ok(bytes) => {
                        if let Err(err) = socket.send_to(&bytes, peer).await {
                            log::warn!("failed to reply to {peer}: {err}");
                        }
                    }
                    Err(err) => log::warn!("failed to encode response for {peer}: {err}"),
                },
                Err(err) => log::warn!("upstream query for {peer} failed: {err}"),
            }
        });
    }
}

fn parse_upstream(transport: Transport, upstream: &str) -> Result<ServerList, ProxyError> {
    let endpoint = match transport {
        Transport::Do53 => Endpoint::Plain(
            upstream
                .parse()
                .map_err(|_| ProxyError::config("--upstream must be an ip address for do53"))?,
        ),
        Transport::Dot => {
            let (addr_part, host) = upstream
                .split_once('@')
                .ok_or_else(|| ProxyError::config("--upstream for dot must be addr@host"))?;
            Endpoint::dot(
                addr_part
                    .parse()
                    .map_err(|_| ProxyError::config("invalid --upstream ip address"))?,
                host,
            )
        }
        Transport::Doh => Endpoint::Doh {
            url: upstream.to_string(),
        },
    };
    Ok(ServerList::new(vec![endpoint]))
}
