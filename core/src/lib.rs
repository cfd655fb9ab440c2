//! `stubres`: a pluggable unicast DNS stub-resolver transport core.
//!
//! Three wire transports share one facade: classic Do53 (UDP with TCP
//! fallback), DNS-over-TLS (a multiplexed, padded, keepalive-aware stream),
//! and DNS-over-HTTPS (one POST per query). Message encoding itself is not
//! this crate's concern; `codec` forwards to `hickory-proto`.

pub mod codec;
pub mod connection;
pub mod edns;
pub mod error;
pub mod id;
pub mod resolver;
pub mod server;
pub mod transport;

pub use error::{ResolveError, Result};
pub use resolver::{Resolver, Transport};
pub use server::{Endpoint, ServerList};
