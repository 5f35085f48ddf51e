//! GATT data model: definition tree, properties, permissions, and typed
//! command payloads.

use bitflags::bitflags;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};

use crate::error::{Result, TesterError};
use crate::gap::types::Peer;
use crate::uuid::Uuid;

bitflags! {
    /// Characteristic property bits from the characteristic declaration.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CharacteristicProperties: u8 {
        const BROADCAST = 0x01;
        const READ = 0x02;
        const WRITE_WITHOUT_RESPONSE = 0x04;
        const WRITE = 0x08;
        const NOTIFY = 0x10;
        const INDICATE = 0x20;
        const AUTHENTICATED_SIGNED_WRITES = 0x40;
        const EXTENDED_PROPERTIES = 0x80;
    }
}

bitflags! {
    /// Attribute permission bits carried by add-characteristic/descriptor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AttPermissions: u8 {
        const READ = 0x01;
        const WRITE = 0x02;
        const READ_ENCRYPTED = 0x04;
        const WRITE_ENCRYPTED = 0x08;
        const READ_AUTHENTICATED = 0x10;
        const WRITE_AUTHENTICATED = 0x20;
        const READ_AUTHORIZED = 0x40;
        const WRITE_AUTHORIZED = 0x80;
    }
}

/// One service in a definition tree, as handed to the host stack or the
/// database builder. Included services are embedded copies of their target.
#[derive(Debug, Clone)]
pub struct ServiceDefinition {
    pub uuid: Uuid,
    pub primary: bool,
    pub includes: Vec<ServiceDefinition>,
    pub characteristics: Vec<CharacteristicDefinition>,
}

impl ServiceDefinition {
    pub fn new(uuid: Uuid, primary: bool) -> Self {
        ServiceDefinition {
            uuid,
            primary,
            includes: Vec::new(),
            characteristics: Vec::new(),
        }
    }

    /// Number of attributes this service occupies once flattened: its
    /// declaration, one per include, two per characteristic, one per
    /// descriptor.
    pub fn attribute_count(&self) -> u16 {
        1 + self.includes.len() as u16
            + self
                .characteristics
                .iter()
                .map(|chr| 2 + chr.descriptors.len() as u16)
                .sum::<u16>()
    }
}

#[derive(Debug, Clone)]
pub struct CharacteristicDefinition {
    pub uuid: Uuid,
    pub properties: CharacteristicProperties,
    pub permissions: AttPermissions,
    pub value: Vec<u8>,
    pub descriptors: Vec<DescriptorDefinition>,
}

#[derive(Debug, Clone)]
pub struct DescriptorDefinition {
    pub uuid: Uuid,
    pub permissions: AttPermissions,
    pub value: Vec<u8>,
}

// --- Command payloads ---

/// Reads `uuid_len(1) uuid[..]`, little-endian, 2/4/16 bytes.
fn read_uuid(cursor: &mut Cursor<&[u8]>) -> Result<Uuid> {
    let len = cursor.read_u8()? as usize;
    let mut bytes = vec![0u8; len];
    cursor.read_exact(&mut bytes)?;
    Uuid::try_from_slice_le(&bytes).ok_or(TesterError::MalformedPayload)
}

#[derive(Debug, Clone, Copy)]
pub struct GattAddServiceCmd {
    pub primary: bool,
    pub uuid: Uuid,
}

impl GattAddServiceCmd {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let service_type = cursor.read_u8()?;
        let primary = match service_type {
            super::constants::GATT_SERVICE_PRIMARY => true,
            super::constants::GATT_SERVICE_SECONDARY => false,
            _ => return Err(TesterError::MalformedPayload),
        };
        let uuid = read_uuid(&mut cursor)?;
        Ok(GattAddServiceCmd { primary, uuid })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GattAddCharacteristicCmd {
    pub svc_id: u16,
    pub properties: CharacteristicProperties,
    pub permissions: AttPermissions,
    pub uuid: Uuid,
}

impl GattAddCharacteristicCmd {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let svc_id = cursor.read_u16::<LittleEndian>()?;
        let properties = CharacteristicProperties::from_bits_truncate(cursor.read_u8()?);
        let permissions = AttPermissions::from_bits_truncate(cursor.read_u8()?);
        let uuid = read_uuid(&mut cursor)?;
        Ok(GattAddCharacteristicCmd {
            svc_id,
            properties,
            permissions,
            uuid,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GattAddDescriptorCmd {
    pub chr_id: u16,
    pub permissions: AttPermissions,
    pub uuid: Uuid,
}

impl GattAddDescriptorCmd {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let chr_id = cursor.read_u16::<LittleEndian>()?;
        let permissions = AttPermissions::from_bits_truncate(cursor.read_u8()?);
        let uuid = read_uuid(&mut cursor)?;
        Ok(GattAddDescriptorCmd {
            chr_id,
            permissions,
            uuid,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GattAddIncludedServiceCmd {
    pub svc_id: u16,
}

impl GattAddIncludedServiceCmd {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        Ok(GattAddIncludedServiceCmd {
            svc_id: cursor.read_u16::<LittleEndian>()?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct GattSetValueCmd {
    pub attr_id: u16,
    pub value: Vec<u8>,
}

impl GattSetValueCmd {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let attr_id = cursor.read_u16::<LittleEndian>()?;
        let len = cursor.read_u16::<LittleEndian>()? as usize;
        let mut value = vec![0u8; len];
        cursor.read_exact(&mut value)?;
        Ok(GattSetValueCmd { attr_id, value })
    }
}

/// Discovery over the whole remote database: just the peer address.
#[derive(Debug, Clone, Copy)]
pub struct GattDiscCmd {
    pub peer: Peer,
}

impl GattDiscCmd {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        Ok(GattDiscCmd {
            peer: Peer::read_from(&mut cursor)?,
        })
    }
}

/// Discovery filtered by UUID over the whole remote database.
#[derive(Debug, Clone, Copy)]
pub struct GattDiscUuidCmd {
    pub peer: Peer,
    pub uuid: Uuid,
}

impl GattDiscUuidCmd {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let peer = Peer::read_from(&mut cursor)?;
        let uuid = read_uuid(&mut cursor)?;
        Ok(GattDiscUuidCmd { peer, uuid })
    }
}

/// Discovery over a handle range.
#[derive(Debug, Clone, Copy)]
pub struct GattRangeCmd {
    pub peer: Peer,
    pub start: u16,
    pub end: u16,
}

impl GattRangeCmd {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let peer = Peer::read_from(&mut cursor)?;
        let start = cursor.read_u16::<LittleEndian>()?;
        let end = cursor.read_u16::<LittleEndian>()?;
        Ok(GattRangeCmd { peer, start, end })
    }
}

/// Discovery over a handle range filtered by UUID.
#[derive(Debug, Clone, Copy)]
pub struct GattRangeUuidCmd {
    pub peer: Peer,
    pub start: u16,
    pub end: u16,
    pub uuid: Uuid,
}

impl GattRangeUuidCmd {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let peer = Peer::read_from(&mut cursor)?;
        let start = cursor.read_u16::<LittleEndian>()?;
        let end = cursor.read_u16::<LittleEndian>()?;
        let uuid = read_uuid(&mut cursor)?;
        Ok(GattRangeUuidCmd {
            peer,
            start,
            end,
            uuid,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GattReadCmd {
    pub peer: Peer,
    pub handle: u16,
}

impl GattReadCmd {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let peer = Peer::read_from(&mut cursor)?;
        let handle = cursor.read_u16::<LittleEndian>()?;
        Ok(GattReadCmd { peer, handle })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GattReadLongCmd {
    pub peer: Peer,
    pub handle: u16,
    pub offset: u16,
}

impl GattReadLongCmd {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let peer = Peer::read_from(&mut cursor)?;
        let handle = cursor.read_u16::<LittleEndian>()?;
        let offset = cursor.read_u16::<LittleEndian>()?;
        Ok(GattReadLongCmd {
            peer,
            handle,
            offset,
        })
    }
}

#[derive(Debug, Clone)]
pub struct GattWriteCmd {
    pub peer: Peer,
    pub handle: u16,
    pub data: Vec<u8>,
}

impl GattWriteCmd {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let peer = Peer::read_from(&mut cursor)?;
        let handle = cursor.read_u16::<LittleEndian>()?;
        let len = cursor.read_u16::<LittleEndian>()? as usize;
        let mut payload = vec![0u8; len];
        cursor.read_exact(&mut payload)?;
        Ok(GattWriteCmd {
            peer,
            handle,
            data: payload,
        })
    }
}

#[derive(Debug, Clone)]
pub struct GattWriteLongCmd {
    pub peer: Peer,
    pub handle: u16,
    pub offset: u16,
    pub data: Vec<u8>,
}

impl GattWriteLongCmd {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let peer = Peer::read_from(&mut cursor)?;
        let handle = cursor.read_u16::<LittleEndian>()?;
        let offset = cursor.read_u16::<LittleEndian>()?;
        let len = cursor.read_u16::<LittleEndian>()? as usize;
        let mut payload = vec![0u8; len];
        cursor.read_exact(&mut payload)?;
        Ok(GattWriteLongCmd {
            peer,
            handle,
            offset,
            data: payload,
        })
    }
}

/// Shared shape of the notify/indicate configuration commands.
#[derive(Debug, Clone, Copy)]
pub struct GattCfgSubscribeCmd {
    pub peer: Peer,
    pub enable: bool,
    pub cccd_handle: u16,
}

impl GattCfgSubscribeCmd {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let peer = Peer::read_from(&mut cursor)?;
        let enable = cursor.read_u8()? != 0;
        let cccd_handle = cursor.read_u16::<LittleEndian>()?;
        Ok(GattCfgSubscribeCmd {
            peer,
            enable,
            cccd_handle,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GattGetAttributesCmd {
    pub start: u16,
    pub end: u16,
    pub type_filter: Option<Uuid>,
}

impl GattGetAttributesCmd {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let start = cursor.read_u16::<LittleEndian>()?;
        let end = cursor.read_u16::<LittleEndian>()?;
        let type_len = cursor.read_u8()? as usize;
        let type_filter = if type_len == 0 {
            None
        } else {
            let mut bytes = vec![0u8; type_len];
            cursor.read_exact(&mut bytes)?;
            Some(Uuid::try_from_slice_le(&bytes).ok_or(TesterError::MalformedPayload)?)
        };
        Ok(GattGetAttributesCmd {
            start,
            end,
            type_filter,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GattGetAttributeValueCmd {
    pub handle: u16,
}

impl GattGetAttributeValueCmd {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        Ok(GattGetAttributeValueCmd {
            handle: cursor.read_u16::<LittleEndian>()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gap::types::AddressType;

    fn peer_bytes() -> Vec<u8> {
        vec![0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06]
    }

    #[test]
    fn add_service_parses_short_uuid() {
        let mut payload = vec![0x00, 0x02];
        payload.extend_from_slice(&[0x00, 0x18]);
        let cmd = GattAddServiceCmd::parse(&payload).unwrap();
        assert!(cmd.primary);
        assert_eq!(cmd.uuid, 0x1800u16);
    }

    #[test]
    fn add_service_rejects_bad_type() {
        let payload = [0x07, 0x02, 0x00, 0x18];
        assert!(GattAddServiceCmd::parse(&payload).is_err());
    }

    #[test]
    fn add_characteristic_parses_flags() {
        let mut payload = vec![0x01, 0x00, 0x12, 0x03, 0x02];
        payload.extend_from_slice(&[0x00, 0x2a]);
        let cmd = GattAddCharacteristicCmd::parse(&payload).unwrap();
        assert_eq!(cmd.svc_id, 1);
        assert!(cmd
            .properties
            .contains(CharacteristicProperties::READ | CharacteristicProperties::NOTIFY));
        assert!(cmd
            .permissions
            .contains(AttPermissions::READ | AttPermissions::WRITE));
    }

    #[test]
    fn write_cmd_honors_declared_length() {
        let mut payload = peer_bytes();
        payload.extend_from_slice(&[0x10, 0x00]); // handle
        payload.extend_from_slice(&[0x02, 0x00]); // len
        payload.extend_from_slice(&[0xaa, 0xbb]);
        let cmd = GattWriteCmd::parse(&payload).unwrap();
        assert_eq!(cmd.peer.address_type, AddressType::Public);
        assert_eq!(cmd.handle, 0x0010);
        assert_eq!(cmd.data, vec![0xaa, 0xbb]);
    }

    #[test]
    fn get_attributes_with_empty_filter() {
        let payload = [0x01, 0x00, 0xff, 0xff, 0x00];
        let cmd = GattGetAttributesCmd::parse(&payload).unwrap();
        assert_eq!(cmd.start, 1);
        assert_eq!(cmd.end, 0xffff);
        assert!(cmd.type_filter.is_none());
    }

    #[test]
    fn uuid_with_invalid_length_is_malformed() {
        let mut payload = peer_bytes();
        payload.extend_from_slice(&[0x03, 0xaa, 0xbb, 0xcc]);
        assert!(GattDiscUuidCmd::parse(&payload).is_err());
    }
}
