//! BTP framing and the transport-facing seams.

pub mod constants;
pub mod message;

pub use message::{BtpMessage, FramingError};

use constants::BTP_STATUS_SUCCESS;

/// Outbound side of the transport.
///
/// The tester pushes every reply and event frame through this trait; the
/// caller owns the actual socket. Send failures are reported but never abort
/// dispatch.
pub trait FrameSink {
    fn send(&mut self, message: &BtpMessage) -> std::io::Result<()>;
}

/// Sends a frame, logging transport failures.
pub fn send(sink: &mut dyn FrameSink, service: u8, opcode: u8, index: u8, data: Vec<u8>) {
    let message = BtpMessage::new(service, opcode, index, data);
    log::debug!(
        "tx service {:#04x} opcode {:#04x} index {:#04x} len {}",
        message.service,
        message.opcode,
        message.index,
        message.data.len()
    );
    if let Err(err) = sink.send(&message) {
        log::error!("failed to send frame: {}", err);
    }
}

/// Sends a status reply: a zero-length frame for SUCCESS, a one-byte payload
/// carrying the status otherwise.
pub fn send_status(sink: &mut dyn FrameSink, service: u8, opcode: u8, index: u8, status: u8) {
    if status == BTP_STATUS_SUCCESS {
        send(sink, service, opcode, index, Vec::new());
    } else {
        send(sink, service, opcode, index, vec![status]);
    }
}
