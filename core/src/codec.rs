//! Wire codec boundary.
//!
//! `spec.md` §1 treats message encoding as an external collaborator and
//! only asks the core to consume `encode`, `decode` and `length`. This module
//! is the thin seam: it never inspects wire bytes itself, it just forwards to
//! `hickory-proto`'s `BinEncodable`/`BinDecodable` implementations for
//! `Message`.

use hickory_proto::op::Message;
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};

use crate::error::{ResolveError, Result};

/// Encode a message to its wire form.
pub fn encode(message: &Message) -> Result<Vec<u8>> {
    message.to_bytes().map_err(ResolveError::from)
}

/// Decode a message from its wire form.
pub fn decode(bytes: &[u8]) -> Result<Message> {
    Message::from_bytes(bytes).map_err(ResolveError::from)
}

/// The encoded length of a message, without retaining the intermediate
/// buffer. Used to size EDNS padding (`spec.md` §4.3 step 4).
pub fn length(message: &Message) -> Result<usize> {
    Ok(encode(message)?.len())
}
