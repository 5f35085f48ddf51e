//! Protocol-level constants shared by every BTP service.

/// Fixed header length: service, opcode, index, 16-bit payload length.
pub const HDR_LEN: usize = 5;

/// Index value for frames not addressed to any controller.
pub const BTP_INDEX_NONE: u8 = 0xff;
/// The single controller this tester exposes.
pub const CONTROLLER_INDEX: u8 = 0x00;

// Service identifiers
pub const BTP_SERVICE_ID_CORE: u8 = 0;
pub const BTP_SERVICE_ID_GAP: u8 = 1;
pub const BTP_SERVICE_ID_GATT: u8 = 2;

// Status codes carried by error replies
pub const BTP_STATUS_SUCCESS: u8 = 0x00;
pub const BTP_STATUS_FAILED: u8 = 0x01;
pub const BTP_STATUS_UNKNOWN_CMD: u8 = 0x02;
pub const BTP_STATUS_NOT_READY: u8 = 0x03;

// Core service commands
pub const CORE_READ_SUPPORTED_COMMANDS: u8 = 0x01;
pub const CORE_READ_SUPPORTED_SERVICES: u8 = 0x02;
pub const CORE_REGISTER_SERVICE: u8 = 0x03;
pub const CORE_UNREGISTER_SERVICE: u8 = 0x04;

// Core service events
pub const CORE_EV_IUT_READY: u8 = 0x80;
