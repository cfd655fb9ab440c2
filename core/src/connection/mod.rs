//! Stream-oriented connection management.
//!
//! Do53 and DoH are request/response per call and need no persistent state;
//! DoT multiplexes many queries over one long-lived stream, so it alone
//! gets a connection manager.

pub mod dot;

pub use dot::DotConnection;
