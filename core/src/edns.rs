//! EDNS(0) OPT pseudo-RR helpers (`spec.md` §4.3 steps 2-4).
//!
//! DoT connections attach two options to every outgoing query: a
//! TCP-Keepalive timeout (RFC 7828) so the server knows how long this stream
//! stays idle before either side tears it down, and block-aligned Padding
//! (RFC 7830) so a passive observer cannot infer the query name from the
//! encrypted record's length.

use hickory_proto::op::{Edns, Message};
use hickory_proto::rr::rdata::opt::EdnsOption;
use rand::RngCore;

use crate::codec;
use crate::error::Result;

/// RFC 7828 option code.
const EDNS_CODE_KEEPALIVE: u16 = 11;
/// RFC 7830 option code.
const EDNS_CODE_PADDING: u16 = 12;

/// RFC 7828 timeout, expressed in units of 100ms. 1200 = 2 minutes.
const KEEPALIVE_TIMEOUT_DECISECONDS: u16 = 1200;

/// RFC 7830 recommends aligning the whole message to a multiple of this
/// many bytes.
const PADDING_BLOCK_SIZE: usize = 128;

/// Ensure `message` carries an OPT record and return it for further
/// mutation.
pub fn ensure_edns(message: &mut Message) -> &mut Edns {
    if message.extensions().is_none() {
        message.set_edns(Edns::new());
    }
    message
        .extensions_mut()
        .as_mut()
        .expect("edns was just set")
}

/// Attach a TCP-Keepalive option advertising our idle timeout.
pub fn add_keepalive(message: &mut Message) {
    let edns = ensure_edns(message);
    edns.options_mut().insert(EdnsOption::Unknown(
        EDNS_CODE_KEEPALIVE,
        KEEPALIVE_TIMEOUT_DECISECONDS.to_be_bytes().to_vec(),
    ));
}

/// Size of the OPT option header (2-byte code, 2-byte length) that precedes
/// the padding fill itself.
const OPTION_HEADER_LEN: usize = 4;

/// Size of the 16-bit big-endian length prefix that precedes the message on
/// the wire (`spec.md` §4.3 step 4: the invariant is on the *framed* length,
/// not the bare message length).
const FRAME_PREFIX_LEN: usize = 2;

/// Pad `message` so that `(encoded_length + 2-byte frame prefix)` is a
/// multiple of [`PADDING_BLOCK_SIZE`], per the RFC 7830 "block-length
/// padding" strategy and `spec.md` §4.3 step 4 / §8's boundary invariant.
/// Must run last, after every other header or option mutation, since it
/// measures the message as it stands.
pub fn add_padding(message: &mut Message) -> Result<()> {
    // Reserve the padding option's own header and the frame's length prefix
    // before measuring, then solve for the fill length that rounds the
    // total framed length up to the next block boundary.
    let base_len = codec::length(message)? + OPTION_HEADER_LEN + FRAME_PREFIX_LEN;
    let remainder = base_len % PADDING_BLOCK_SIZE;
    let pad_len = if remainder == 0 {
        0
    } else {
        PADDING_BLOCK_SIZE - remainder
    };

    let mut fill = vec![0u8; pad_len];
    rand::thread_rng().fill_bytes(&mut fill);

    let edns = ensure_edns(message);
    edns.options_mut()
        .insert(EdnsOption::Unknown(EDNS_CODE_PADDING, fill));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::op::{Message, MessageType, OpCode, Query};
    use hickory_proto::rr::{Name, RecordType};
    use std::str::FromStr;

    fn sample_query() -> Message {
        let mut message = Message::new();
        message.set_message_type(MessageType::Query);
        message.set_op_code(OpCode::Query);
        message.set_recursion_desired(true);
        message.add_query(Query::query(
            Name::from_str("example.com.").unwrap(),
            RecordType::A,
        ));
        message
    }

    #[test]
    fn padding_rounds_up_framed_length_to_block_size() {
        let mut message = sample_query();
        add_padding(&mut message).unwrap();
        let total = codec::length(&message).unwrap();
        assert_eq!((total + FRAME_PREFIX_LEN) % PADDING_BLOCK_SIZE, 0);
    }

    #[test]
    fn keepalive_then_padding_still_aligns_framed_length() {
        let mut message = sample_query();
        add_keepalive(&mut message);
        add_padding(&mut message).unwrap();
        let total = codec::length(&message).unwrap();
        assert_eq!((total + FRAME_PREFIX_LEN) % PADDING_BLOCK_SIZE, 0);
    }
}
