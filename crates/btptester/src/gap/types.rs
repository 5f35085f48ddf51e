//! GAP wire types: addresses, settings bitmaps, and typed command payloads.

use byteorder::{LittleEndian, ReadBytesExt};
use std::fmt;
use std::io::{Cursor, Read};

use super::constants::{GAP_DISCOVERY_FLAG_ACTIVE, GAP_NAME_LEN, GAP_SHORT_NAME_LEN};
use crate::error::{Result, TesterError};

/// LE address type as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressType {
    Public,
    Random,
}

impl AddressType {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0x00 => Ok(AddressType::Public),
            0x01 => Ok(AddressType::Random),
            _ => Err(TesterError::MalformedPayload),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            AddressType::Public => 0x00,
            AddressType::Random => 0x01,
        }
    }
}

/// A six-byte Bluetooth device address, stored in wire (little-endian) order.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BdAddr {
    pub bytes: [u8; 6],
}

impl BdAddr {
    pub const fn new(bytes: [u8; 6]) -> Self {
        BdAddr { bytes }
    }

    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() != 6 {
            return None;
        }
        let mut bytes = [0u8; 6];
        bytes.copy_from_slice(slice);
        Some(BdAddr { bytes })
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Printable form is most-significant byte first.
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.bytes[5],
            self.bytes[4],
            self.bytes[3],
            self.bytes[2],
            self.bytes[1],
            self.bytes[0]
        )
    }
}

impl fmt::Debug for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// A remote peer: device address plus address type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Peer {
    pub address_type: AddressType,
    pub address: BdAddr,
}

impl Peer {
    pub fn new(address_type: AddressType, address: BdAddr) -> Self {
        Peer {
            address_type,
            address,
        }
    }

    /// Reads `addr_type(1) addr(6)` from a command payload.
    pub fn read_from(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        let address_type = AddressType::from_u8(cursor.read_u8()?)?;
        let mut bytes = [0u8; 6];
        cursor.read_exact(&mut bytes)?;
        Ok(Peer {
            address_type,
            address: BdAddr::new(bytes),
        })
    }

    /// Appends `addr_type(1) addr(6)` to a reply or event payload.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.push(self.address_type.as_u8());
        out.extend_from_slice(&self.address.bytes);
    }
}

/// Controller settings bitmap (`current_settings` / `supported_settings`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Settings(u32);

impl Settings {
    pub const fn new() -> Self {
        Settings(0)
    }

    pub fn from_bits(bits: &[u8]) -> Self {
        let mut settings = Settings::new();
        for &bit in bits {
            settings.set(bit);
        }
        settings
    }

    pub fn set(&mut self, bit: u8) {
        self.0 |= 1 << bit;
    }

    pub fn clear(&mut self, bit: u8) {
        self.0 &= !(1 << bit);
    }

    pub fn is_set(&self, bit: u8) -> bool {
        self.0 & (1 << bit) != 0
    }

    /// Four-byte wire form carried by settings replies.
    pub fn to_le_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

/// IO capability declared to the pairing layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoCapability {
    DisplayOnly,
    DisplayYesNo,
    KeyboardOnly,
    NoInputOutput,
    KeyboardDisplay,
}

impl IoCapability {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0x00 => Ok(IoCapability::DisplayOnly),
            0x01 => Ok(IoCapability::DisplayYesNo),
            0x02 => Ok(IoCapability::KeyboardOnly),
            0x03 => Ok(IoCapability::NoInputOutput),
            0x04 => Ok(IoCapability::KeyboardDisplay),
            _ => Err(TesterError::MalformedPayload),
        }
    }
}

// --- Command payloads ---

#[derive(Debug, Clone, Copy)]
pub struct GapSetConnectableCmd {
    pub connectable: bool,
}

impl GapSetConnectableCmd {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        Ok(GapSetConnectableCmd {
            connectable: cursor.read_u8()? != 0,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GapSetDiscoverableCmd {
    pub discoverable: u8,
}

impl GapSetDiscoverableCmd {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        Ok(GapSetDiscoverableCmd {
            discoverable: cursor.read_u8()?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct GapStartAdvertisingCmd {
    pub adv_data: Vec<u8>,
    pub scan_rsp: Vec<u8>,
}

impl GapStartAdvertisingCmd {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let adv_len = cursor.read_u8()? as usize;
        let scan_rsp_len = cursor.read_u8()? as usize;
        let mut adv_data = vec![0u8; adv_len];
        cursor.read_exact(&mut adv_data)?;
        let mut scan_rsp = vec![0u8; scan_rsp_len];
        cursor.read_exact(&mut scan_rsp)?;
        Ok(GapStartAdvertisingCmd { adv_data, scan_rsp })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GapStartDiscoveryCmd {
    pub flags: u8,
}

impl GapStartDiscoveryCmd {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        Ok(GapStartDiscoveryCmd {
            flags: cursor.read_u8()?,
        })
    }

    pub fn active(&self) -> bool {
        self.flags & GAP_DISCOVERY_FLAG_ACTIVE != 0
    }
}

/// Shared shape of connect/disconnect/pair/unpair: just the peer address.
#[derive(Debug, Clone, Copy)]
pub struct GapAddressCmd {
    pub peer: Peer,
}

impl GapAddressCmd {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        Ok(GapAddressCmd {
            peer: Peer::read_from(&mut cursor)?,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GapSetIoCapCmd {
    pub io_cap: IoCapability,
}

impl GapSetIoCapCmd {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        Ok(GapSetIoCapCmd {
            io_cap: IoCapability::from_u8(cursor.read_u8()?)?,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GapPasskeyEntryCmd {
    pub peer: Peer,
    pub passkey: u32,
}

impl GapPasskeyEntryCmd {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let peer = Peer::read_from(&mut cursor)?;
        let passkey = cursor.read_u32::<LittleEndian>()?;
        Ok(GapPasskeyEntryCmd { peer, passkey })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GapPasskeyConfirmCmd {
    pub peer: Peer,
    pub matches: bool,
}

impl GapPasskeyConfirmCmd {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let peer = Peer::read_from(&mut cursor)?;
        let matches = cursor.read_u8()? != 0;
        Ok(GapPasskeyConfirmCmd { peer, matches })
    }
}

// --- Reply payloads ---

/// Controller info reply: address, settings, class of device, names.
#[derive(Debug, Clone)]
pub struct GapReadControllerInfoRp {
    pub address: BdAddr,
    pub supported_settings: Settings,
    pub current_settings: Settings,
    pub cod: [u8; 3],
    pub name: String,
}

impl GapReadControllerInfoRp {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(6 + 4 + 4 + 3 + GAP_NAME_LEN + GAP_SHORT_NAME_LEN);
        out.extend_from_slice(&self.address.bytes);
        out.extend_from_slice(&self.supported_settings.to_le_bytes());
        out.extend_from_slice(&self.current_settings.to_le_bytes());
        out.extend_from_slice(&self.cod);
        push_padded(&mut out, self.name.as_bytes(), GAP_NAME_LEN);
        push_padded(&mut out, self.name.as_bytes(), GAP_SHORT_NAME_LEN);
        out
    }
}

// Fixed-width name fields: truncated if long, zero-padded if short.
fn push_padded(out: &mut Vec<u8>, value: &[u8], width: usize) {
    let take = value.len().min(width);
    out.extend_from_slice(&value[..take]);
    out.resize(out.len() + width - take, 0);
}
