//! BTP message framing.
//!
//! Every frame is a five-byte header followed by the payload:
//! `service(1) opcode(1) index(1) len(2, LE) data[len]`.

use thiserror::Error;

use super::constants::HDR_LEN;

/// Errors raised while decoding an inbound frame. The dispatcher drops such
/// frames without replying.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    #[error("frame shorter than header: {0} bytes")]
    Truncated(usize),

    #[error("declared payload length {declared} exceeds available {available} bytes")]
    LengthMismatch { declared: usize, available: usize },
}

/// A single BTP frame: command, reply, or event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BtpMessage {
    pub service: u8,
    pub opcode: u8,
    pub index: u8,
    pub data: Vec<u8>,
}

impl BtpMessage {
    pub fn new(service: u8, opcode: u8, index: u8, data: Vec<u8>) -> Self {
        BtpMessage {
            service,
            opcode,
            index,
            data,
        }
    }

    /// Decodes one frame. Bytes past the declared payload length are ignored.
    pub fn parse(bytes: &[u8]) -> Result<Self, FramingError> {
        if bytes.len() < HDR_LEN {
            return Err(FramingError::Truncated(bytes.len()));
        }

        let declared = u16::from_le_bytes([bytes[3], bytes[4]]) as usize;
        let available = bytes.len() - HDR_LEN;
        if declared > available {
            return Err(FramingError::LengthMismatch {
                declared,
                available,
            });
        }

        Ok(BtpMessage {
            service: bytes[0],
            opcode: bytes[1],
            index: bytes[2],
            data: bytes[HDR_LEN..HDR_LEN + declared].to_vec(),
        })
    }

    /// Serializes the frame, header first, payload length little-endian.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HDR_LEN + self.data.len());
        out.push(self.service);
        out.push(self.opcode);
        out.push(self.index);
        out.extend_from_slice(&(self.data.len() as u16).to_le_bytes());
        out.extend_from_slice(&self.data);
        out
    }
}
