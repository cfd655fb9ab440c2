//! Per-transport query engines (`spec.md` §4.4, §4.5).
//!
//! Do53 and DoH are stateless from one query to the next, so each gets a
//! small engine rather than the full connection manager DoT needs.

pub mod do53;
pub mod doh;

pub use do53::Do53Transport;
pub use doh::DohTransport;
