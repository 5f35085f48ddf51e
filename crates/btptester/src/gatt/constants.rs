//! GATT service opcodes, declaration types, and CCCD values.

// Commands
pub const GATT_READ_SUPPORTED_COMMANDS: u8 = 0x01;
pub const GATT_ADD_SERVICE: u8 = 0x02;
pub const GATT_ADD_CHARACTERISTIC: u8 = 0x03;
pub const GATT_ADD_DESCRIPTOR: u8 = 0x04;
pub const GATT_ADD_INCLUDED_SERVICE: u8 = 0x05;
pub const GATT_SET_VALUE: u8 = 0x06;
pub const GATT_START_SERVER: u8 = 0x07;
pub const GATT_DISC_ALL_PRIM_SVCS: u8 = 0x0b;
pub const GATT_DISC_PRIM_UUID: u8 = 0x0c;
pub const GATT_FIND_INCLUDED: u8 = 0x0d;
pub const GATT_DISC_ALL_CHRC: u8 = 0x0e;
pub const GATT_DISC_CHRC_UUID: u8 = 0x0f;
pub const GATT_DISC_ALL_DESC: u8 = 0x10;
pub const GATT_READ: u8 = 0x11;
pub const GATT_READ_LONG: u8 = 0x12;
pub const GATT_WRITE: u8 = 0x16;
pub const GATT_WRITE_LONG: u8 = 0x17;
pub const GATT_CFG_NOTIFY: u8 = 0x19;
pub const GATT_CFG_INDICATE: u8 = 0x1a;
pub const GATT_GET_ATTRIBUTES: u8 = 0x1b;
pub const GATT_GET_ATTRIBUTE_VALUE: u8 = 0x1c;

// Events
pub const GATT_EV_NOTIFICATION: u8 = 0x80;
pub const GATT_EV_ATTR_VALUE_CHANGED: u8 = 0x81;

// Service type byte in the add-service command
pub const GATT_SERVICE_PRIMARY: u8 = 0x00;
pub const GATT_SERVICE_SECONDARY: u8 = 0x01;

// Declaration type UUIDs
pub const UUID_PRIMARY_SERVICE: u16 = 0x2800;
pub const UUID_SECONDARY_SERVICE: u16 = 0x2801;
pub const UUID_INCLUDE: u16 = 0x2802;
pub const UUID_CHARACTERISTIC: u16 = 0x2803;
pub const UUID_CCCD: u16 = 0x2902;

// Well-known entries in the built-in database
pub const UUID_GAP_SERVICE: u16 = 0x1800;
pub const UUID_GATT_SERVICE: u16 = 0x1801;
pub const UUID_DEVICE_NAME: u16 = 0x2a00;
pub const UUID_APPEARANCE: u16 = 0x2a01;
pub const UUID_SERVICE_CHANGED: u16 = 0x2a05;
pub const UUID_CENTRAL_ADDR_RESOLUTION: u16 = 0x2aa6;

// CCCD values (little-endian)
pub const CCCD_NONE: [u8; 2] = [0x00, 0x00];
pub const CCCD_NOTIFY: [u8; 2] = [0x01, 0x00];
pub const CCCD_INDICATE: [u8; 2] = [0x02, 0x00];

// ATT status bytes surfaced in read/write replies and server responses
pub const ATT_SUCCESS: u8 = 0x00;
pub const ATT_ERROR_REQUEST_NOT_SUPPORTED: u8 = 0x06;
pub const ATT_ERROR_INVALID_ATTRIBUTE_LENGTH: u8 = 0x0d;
pub const ATT_ERROR_UNLIKELY: u8 = 0x0e;
