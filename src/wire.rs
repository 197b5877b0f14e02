//! Request/response envelope header codec.
//!
//! Applications that frame their payloads with the fixed 24-byte envelope
//! use this module to pack and unpack the header. All multi-byte fields are
//! little-endian. The engine itself never inspects payload bytes; this
//! codec exists purely for the application layer.

use crate::status::Status;

/// Fixed-layout envelope header preceding every request/response payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnvelopeHeader {
    /// Command selector.
    pub command: u16,
    /// Length of the payload following the header, in bytes.
    pub payload_len: u16,
    /// Session identifier assigned by the peer.
    pub session_handle: u32,
    /// Status reported by the peer; zero means success.
    pub status: u32,
    /// Opaque context echoed back by the peer.
    pub sender_context: u64,
    /// Option flags.
    pub options: u32,
}

impl EnvelopeHeader {
    /// Encoded size of the header in bytes.
    pub const ENCODED_LEN: usize = 24;

    /// Packs the header into the start of `out`.
    ///
    /// Returns the number of bytes written (always
    /// [`ENCODED_LEN`](Self::ENCODED_LEN)).
    ///
    /// # Errors
    ///
    /// [`Status::OutOfBounds`] if `out` is shorter than the encoded size.
    pub fn encode(&self, out: &mut [u8]) -> Result<usize, Status> {
        if out.len() < Self::ENCODED_LEN {
            return Err(Status::OutOfBounds);
        }

        out[0..2].copy_from_slice(&self.command.to_le_bytes());
        out[2..4].copy_from_slice(&self.payload_len.to_le_bytes());
        out[4..8].copy_from_slice(&self.session_handle.to_le_bytes());
        out[8..12].copy_from_slice(&self.status.to_le_bytes());
        out[12..20].copy_from_slice(&self.sender_context.to_le_bytes());
        out[20..24].copy_from_slice(&self.options.to_le_bytes());

        Ok(Self::ENCODED_LEN)
    }

    /// Unpacks a header from the start of `input`.
    ///
    /// # Errors
    ///
    /// [`Status::Partial`] if fewer than
    /// [`ENCODED_LEN`](Self::ENCODED_LEN) bytes are available.
    pub fn decode(input: &[u8]) -> Result<Self, Status> {
        if input.len() < Self::ENCODED_LEN {
            return Err(Status::Partial);
        }

        Ok(Self {
            command: u16::from_le_bytes([input[0], input[1]]),
            payload_len: u16::from_le_bytes([input[2], input[3]]),
            session_handle: u32::from_le_bytes([input[4], input[5], input[6], input[7]]),
            status: u32::from_le_bytes([input[8], input[9], input[10], input[11]]),
            sender_context: u64::from_le_bytes([
                input[12], input[13], input[14], input[15], input[16], input[17], input[18],
                input[19],
            ]),
            options: u32::from_le_bytes([input[20], input[21], input[22], input[23]]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn golden_byte_layout() {
        let header = EnvelopeHeader {
            command: 0x0065,
            payload_len: 0x0004,
            session_handle: 0x1122_3344,
            status: 0,
            sender_context: 0x0807_0605_0403_0201,
            options: 0,
        };

        let mut out = [0u8; EnvelopeHeader::ENCODED_LEN];
        let written = header.encode(&mut out).expect("encode");
        assert_eq!(written, 24);
        assert_eq!(
            out,
            [
                0x65, 0x00, // command
                0x04, 0x00, // payload_len
                0x44, 0x33, 0x22, 0x11, // session_handle
                0x00, 0x00, 0x00, 0x00, // status
                0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, // sender_context
                0x00, 0x00, 0x00, 0x00, // options
            ]
        );
        assert_eq!(EnvelopeHeader::decode(&out).expect("decode"), header);
    }

    #[test]
    fn short_output_is_out_of_bounds() {
        let header = EnvelopeHeader::default();
        let mut out = [0u8; EnvelopeHeader::ENCODED_LEN - 1];
        assert_eq!(header.encode(&mut out), Err(Status::OutOfBounds));
    }

    #[test]
    fn short_input_is_partial() {
        let input = [0u8; EnvelopeHeader::ENCODED_LEN - 1];
        assert_eq!(EnvelopeHeader::decode(&input), Err(Status::Partial));
    }

    proptest! {
        #[test]
        fn decode_never_panics_on_arbitrary_prefixes(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            let _ = EnvelopeHeader::decode(&bytes);
        }
    }
}
