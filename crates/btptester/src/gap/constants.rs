//! GAP service opcodes, events, and settings bits.

// Commands
pub const GAP_READ_SUPPORTED_COMMANDS: u8 = 0x01;
pub const GAP_READ_CONTROLLER_INDEX_LIST: u8 = 0x02;
pub const GAP_READ_CONTROLLER_INFO: u8 = 0x03;
pub const GAP_SET_CONNECTABLE: u8 = 0x06;
pub const GAP_SET_DISCOVERABLE: u8 = 0x08;
pub const GAP_START_ADVERTISING: u8 = 0x0a;
pub const GAP_STOP_ADVERTISING: u8 = 0x0b;
pub const GAP_START_DISCOVERY: u8 = 0x0c;
pub const GAP_STOP_DISCOVERY: u8 = 0x0d;
pub const GAP_CONNECT: u8 = 0x0e;
pub const GAP_DISCONNECT: u8 = 0x0f;
pub const GAP_SET_IO_CAP: u8 = 0x10;
pub const GAP_PAIR: u8 = 0x11;
pub const GAP_UNPAIR: u8 = 0x12;
pub const GAP_PASSKEY_ENTRY: u8 = 0x13;
pub const GAP_PASSKEY_CONFIRM: u8 = 0x14;

// Events
pub const GAP_EV_DEVICE_FOUND: u8 = 0x81;
pub const GAP_EV_DEVICE_CONNECTED: u8 = 0x82;
pub const GAP_EV_DEVICE_DISCONNECTED: u8 = 0x83;
pub const GAP_EV_PASSKEY_DISPLAY: u8 = 0x84;
pub const GAP_EV_PASSKEY_ENTRY_REQ: u8 = 0x85;
pub const GAP_EV_PASSKEY_CONFIRM_REQ: u8 = 0x86;
pub const GAP_EV_CONN_PARAM_UPDATE: u8 = 0x88;
pub const GAP_EV_SEC_LEVEL_CHANGED: u8 = 0x89;
pub const GAP_EV_PAIRING_CONSENT_REQ: u8 = 0x8a;

// Settings bit positions (current/supported settings bitmaps)
pub const GAP_SETTINGS_POWERED: u8 = 0;
pub const GAP_SETTINGS_CONNECTABLE: u8 = 1;
pub const GAP_SETTINGS_FAST_CONNECTABLE: u8 = 2;
pub const GAP_SETTINGS_DISCOVERABLE: u8 = 3;
pub const GAP_SETTINGS_BONDABLE: u8 = 4;
pub const GAP_SETTINGS_LINK_SEC_3: u8 = 5;
pub const GAP_SETTINGS_SSP: u8 = 6;
pub const GAP_SETTINGS_BREDR: u8 = 7;
pub const GAP_SETTINGS_HS: u8 = 8;
pub const GAP_SETTINGS_LE: u8 = 9;
pub const GAP_SETTINGS_ADVERTISING: u8 = 10;
pub const GAP_SETTINGS_SC: u8 = 11;
pub const GAP_SETTINGS_DEBUG_KEYS: u8 = 12;
pub const GAP_SETTINGS_PRIVACY: u8 = 13;
pub const GAP_SETTINGS_CONTROLLER_CONFIG: u8 = 14;
pub const GAP_SETTINGS_STATIC_ADDRESS: u8 = 15;

// Discoverable modes
pub const GAP_NON_DISCOVERABLE: u8 = 0x00;
pub const GAP_GENERAL_DISCOVERABLE: u8 = 0x01;
pub const GAP_LIMITED_DISCOVERABLE: u8 = 0x02;

// Discovery flags
pub const GAP_DISCOVERY_FLAG_LE: u8 = 0x01;
pub const GAP_DISCOVERY_FLAG_BREDR: u8 = 0x02;
pub const GAP_DISCOVERY_FLAG_LIMITED: u8 = 0x04;
pub const GAP_DISCOVERY_FLAG_ACTIVE: u8 = 0x08;
pub const GAP_DISCOVERY_FLAG_OBSERVE: u8 = 0x10;

// Fixed-width fields in the controller info reply
pub const GAP_NAME_LEN: usize = 249;
pub const GAP_SHORT_NAME_LEN: usize = 11;
