//! Server-build session driven by the add-service/characteristic/descriptor
//! command sequence.
//!
//! Attribute ids are minted from a single 1-based counter shared by every
//! node kind, in declaration order. The most recently added service stays
//! "open" and is only committed when the next service opens or the server
//! starts; descriptors always attach to the last characteristic of the open
//! service.

use crate::error::{Result, TesterError};
use crate::uuid::Uuid;

use super::types::{
    AttPermissions, CharacteristicDefinition, CharacteristicProperties, DescriptorDefinition,
    ServiceDefinition,
};

#[derive(Debug, Clone)]
struct BuildService {
    id: u16,
    uuid: Uuid,
    primary: bool,
    includes: Vec<BuildInclude>,
    characteristics: Vec<BuildCharacteristic>,
}

#[derive(Debug, Clone)]
struct BuildInclude {
    #[allow(dead_code)]
    id: u16,
    target_id: u16,
}

#[derive(Debug, Clone)]
struct BuildCharacteristic {
    id: u16,
    uuid: Uuid,
    properties: CharacteristicProperties,
    permissions: AttPermissions,
    value: Vec<u8>,
    descriptors: Vec<BuildDescriptor>,
}

#[derive(Debug, Clone)]
struct BuildDescriptor {
    id: u16,
    uuid: Uuid,
    permissions: AttPermissions,
    value: Vec<u8>,
}

/// Position of an attribute within the declared tree, by ordinal. Used to map
/// a set-value target onto database handles once the server is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeLocation {
    pub service: usize,
    pub characteristic: usize,
    /// `None` means the characteristic value itself.
    pub descriptor: Option<usize>,
}

/// The in-progress server declaration.
#[derive(Debug, Default)]
pub struct BuildSession {
    committed: Vec<BuildService>,
    open: Option<BuildService>,
    next_id: u16,
}

impl BuildSession {
    pub fn new() -> Self {
        BuildSession::default()
    }

    /// Opens a new service, committing any previously open one. Returns the
    /// minted service id.
    pub fn add_service(&mut self, uuid: Uuid, primary: bool) -> u16 {
        if let Some(open) = self.open.take() {
            self.committed.push(open);
        }
        self.next_id += 1;
        self.open = Some(BuildService {
            id: self.next_id,
            uuid,
            primary,
            includes: Vec::new(),
            characteristics: Vec::new(),
        });
        self.next_id
    }

    /// Appends a characteristic to the open service.
    pub fn add_characteristic(
        &mut self,
        uuid: Uuid,
        properties: CharacteristicProperties,
        permissions: AttPermissions,
    ) -> Result<u16> {
        let open = self.open.as_mut().ok_or(TesterError::NoOpenService)?;
        self.next_id += 1;
        open.characteristics.push(BuildCharacteristic {
            id: self.next_id,
            uuid,
            properties,
            permissions,
            value: Vec::new(),
            descriptors: Vec::new(),
        });
        Ok(self.next_id)
    }

    /// Appends a descriptor to the last characteristic of the open service.
    pub fn add_descriptor(&mut self, uuid: Uuid, permissions: AttPermissions) -> Result<u16> {
        let open = self.open.as_mut().ok_or(TesterError::NoOpenService)?;
        let chr = open
            .characteristics
            .last_mut()
            .ok_or(TesterError::NoOpenCharacteristic)?;
        self.next_id += 1;
        chr.descriptors.push(BuildDescriptor {
            id: self.next_id,
            uuid,
            permissions,
            value: Vec::new(),
        });
        Ok(self.next_id)
    }

    /// Adds an include entry referencing an already-committed service.
    pub fn add_included_service(&mut self, svc_id: u16) -> Result<u16> {
        if !self.committed.iter().any(|svc| svc.id == svc_id) {
            return Err(TesterError::UnknownAttribute(svc_id));
        }
        let open = self.open.as_mut().ok_or(TesterError::NoOpenService)?;
        self.next_id += 1;
        open.includes.push(BuildInclude {
            id: self.next_id,
            target_id: svc_id,
        });
        Ok(self.next_id)
    }

    /// Sets the value of the characteristic or descriptor with the given id.
    /// Service and include ids are not value-bearing and fail.
    pub fn set_value(&mut self, attr_id: u16, value: &[u8]) -> Result<AttributeLocation> {
        let open = self.open.iter_mut();
        for (svc_idx, svc) in self.committed.iter_mut().chain(open).enumerate() {
            for (chr_idx, chr) in svc.characteristics.iter_mut().enumerate() {
                if chr.id == attr_id {
                    chr.value = value.to_vec();
                    return Ok(AttributeLocation {
                        service: svc_idx,
                        characteristic: chr_idx,
                        descriptor: None,
                    });
                }
                for (dsc_idx, dsc) in chr.descriptors.iter_mut().enumerate() {
                    if dsc.id == attr_id {
                        dsc.value = value.to_vec();
                        return Ok(AttributeLocation {
                            service: svc_idx,
                            characteristic: chr_idx,
                            descriptor: Some(dsc_idx),
                        });
                    }
                }
            }
        }
        Err(TesterError::UnknownAttribute(attr_id))
    }

    /// Commits the open service, if any.
    pub fn flush(&mut self) {
        if let Some(open) = self.open.take() {
            self.committed.push(open);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.committed.is_empty() && self.open.is_none()
    }

    /// The committed services as a definition tree, include entries expanded
    /// to copies of their target services. The open service is not part of
    /// the tree until flushed.
    pub fn definitions(&self) -> Vec<ServiceDefinition> {
        self.committed
            .iter()
            .map(|svc| self.to_definition(svc))
            .collect()
    }

    fn to_definition(&self, svc: &BuildService) -> ServiceDefinition {
        ServiceDefinition {
            uuid: svc.uuid,
            primary: svc.primary,
            includes: svc
                .includes
                .iter()
                .filter_map(|inc| {
                    self.committed
                        .iter()
                        .find(|target| target.id == inc.target_id)
                })
                .map(|target| self.to_definition(target))
                .collect(),
            characteristics: svc
                .characteristics
                .iter()
                .map(|chr| CharacteristicDefinition {
                    uuid: chr.uuid,
                    properties: chr.properties,
                    permissions: chr.permissions,
                    value: chr.value.clone(),
                    descriptors: chr
                        .descriptors
                        .iter()
                        .map(|dsc| DescriptorDefinition {
                            uuid: dsc.uuid,
                            permissions: dsc.permissions,
                            value: dsc.value.clone(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_one_based_and_monotonic() {
        let mut session = BuildSession::new();
        assert_eq!(session.add_service(Uuid::from_u16(0x1800), true), 1);
        assert_eq!(
            session
                .add_characteristic(
                    Uuid::from_u16(0x2a00),
                    CharacteristicProperties::READ,
                    AttPermissions::READ,
                )
                .unwrap(),
            2
        );
        assert_eq!(
            session
                .add_descriptor(Uuid::from_u16(0x2901), AttPermissions::READ)
                .unwrap(),
            3
        );
        assert_eq!(session.add_service(Uuid::from_u16(0x1801), true), 4);
    }

    #[test]
    fn adds_require_open_nodes() {
        let mut session = BuildSession::new();
        assert!(matches!(
            session.add_characteristic(
                Uuid::from_u16(0x2a00),
                CharacteristicProperties::READ,
                AttPermissions::READ,
            ),
            Err(TesterError::NoOpenService)
        ));

        session.add_service(Uuid::from_u16(0x1800), true);
        assert!(matches!(
            session.add_descriptor(Uuid::from_u16(0x2901), AttPermissions::READ),
            Err(TesterError::NoOpenCharacteristic)
        ));
    }

    #[test]
    fn include_requires_committed_target() {
        let mut session = BuildSession::new();
        let first = session.add_service(Uuid::from_u16(0x180f), true);
        // Still open, not committed: include must fail.
        assert!(session.add_included_service(first).is_err());

        session.add_service(Uuid::from_u16(0x1800), true);
        let inc_id = session.add_included_service(first).unwrap();
        assert_eq!(inc_id, 3);

        session.flush();
        let defs = session.definitions();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[1].includes.len(), 1);
        assert_eq!(defs[1].includes[0].uuid, 0x180fu16);
    }

    #[test]
    fn set_value_walks_declaration_order() {
        let mut session = BuildSession::new();
        session.add_service(Uuid::from_u16(0x1800), true);
        let chr_id = session
            .add_characteristic(
                Uuid::from_u16(0x2a00),
                CharacteristicProperties::READ,
                AttPermissions::READ,
            )
            .unwrap();
        let dsc_id = session
            .add_descriptor(Uuid::from_u16(0x2901), AttPermissions::READ)
            .unwrap();

        let loc = session.set_value(chr_id, &[0xaa]).unwrap();
        assert_eq!(
            loc,
            AttributeLocation {
                service: 0,
                characteristic: 0,
                descriptor: None
            }
        );

        let loc = session.set_value(dsc_id, &[0xbb]).unwrap();
        assert_eq!(loc.descriptor, Some(0));

        // Service ids carry no value.
        assert!(session.set_value(1, &[0xcc]).is_err());
        assert!(session.set_value(99, &[0xcc]).is_err());

        session.flush();
        let defs = session.definitions();
        assert_eq!(defs[0].characteristics[0].value, vec![0xaa]);
        assert_eq!(defs[0].characteristics[0].descriptors[0].value, vec![0xbb]);
    }

    #[test]
    fn definitions_exclude_open_service() {
        let mut session = BuildSession::new();
        session.add_service(Uuid::from_u16(0x1800), true);
        assert!(session.definitions().is_empty());
        session.add_service(Uuid::from_u16(0x1801), true);
        assert_eq!(session.definitions().len(), 1);
    }
}
