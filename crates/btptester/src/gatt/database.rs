//! Flattened, handle-assigned view of a GATT service tree.
//!
//! The database is rebuilt wholesale from a definition tree: handle assignment
//! is a single deterministic walk, so the same tree always yields the same
//! handles. Used both for the local server and for the mirror of a remote
//! peer's database after discovery.

use crate::uuid::Uuid;

use super::constants::{
    UUID_CCCD, UUID_CHARACTERISTIC, UUID_INCLUDE, UUID_PRIMARY_SERVICE, UUID_SECONDARY_SERVICE,
};
use super::types::{AttPermissions, CharacteristicProperties, ServiceDefinition};

/// A descriptor with its assigned handle.
#[derive(Debug, Clone)]
pub struct DbDescriptor {
    pub uuid: Uuid,
    pub handle: u16,
    pub permissions: AttPermissions,
    pub value: Vec<u8>,
}

/// A characteristic with its declaration and value handles.
#[derive(Debug, Clone)]
pub struct DbCharacteristic {
    pub uuid: Uuid,
    pub properties: CharacteristicProperties,
    pub permissions: AttPermissions,
    pub declaration_handle: u16,
    pub value_handle: u16,
    pub value: Vec<u8>,
    pub descriptors: Vec<DbDescriptor>,
}

/// An include entry with its resolved target range.
#[derive(Debug, Clone)]
pub struct DbInclude {
    pub handle: u16,
    pub uuid: Uuid,
    pub start_handle: u16,
    pub end_handle: u16,
}

/// A service with its handle range.
#[derive(Debug, Clone)]
pub struct DbService {
    pub uuid: Uuid,
    pub primary: bool,
    pub start_handle: u16,
    pub end_handle: u16,
    pub includes: Vec<DbInclude>,
    pub characteristics: Vec<DbCharacteristic>,
}

/// What kind of attribute sits at a given handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    ServiceDeclaration,
    Include,
    CharacteristicDeclaration,
    CharacteristicValue,
    Descriptor,
}

/// Flat attribute info as exposed by attribute enumeration.
#[derive(Debug, Clone)]
pub struct AttributeInfo {
    pub handle: u16,
    pub type_uuid: Uuid,
    pub permissions: AttPermissions,
    pub kind: AttributeKind,
}

/// Handle-addressed database over an ordered list of services.
#[derive(Debug, Clone, Default)]
pub struct GattDatabase {
    services: Vec<DbService>,
}

impl GattDatabase {
    /// A database with no attributes, as held before any discovery pass.
    pub fn empty() -> Self {
        GattDatabase {
            services: Vec::new(),
        }
    }

    /// Builds the database, assigning handles with a deterministic walk:
    /// service declaration first, then includes, then each characteristic's
    /// declaration, value, and descriptors, all in declaration order.
    /// Services occupy contiguous ranges; the next service starts at
    /// `end_handle + 1`.
    pub fn build(definitions: &[ServiceDefinition]) -> Self {
        let mut services = Vec::with_capacity(definitions.len());
        let mut next = 1u16;

        for def in definitions {
            let start = next;
            let mut cursor = start;

            let mut includes = Vec::with_capacity(def.includes.len());
            for include in &def.includes {
                cursor += 1;
                includes.push(DbInclude {
                    handle: cursor,
                    uuid: include.uuid,
                    start_handle: 0,
                    end_handle: 0,
                });
            }

            let mut characteristics = Vec::with_capacity(def.characteristics.len());
            for chr in &def.characteristics {
                cursor += 1;
                let declaration_handle = cursor;
                cursor += 1;
                let value_handle = cursor;

                let mut descriptors = Vec::with_capacity(chr.descriptors.len());
                for dsc in &chr.descriptors {
                    cursor += 1;
                    descriptors.push(DbDescriptor {
                        uuid: dsc.uuid,
                        handle: cursor,
                        permissions: dsc.permissions,
                        value: dsc.value.clone(),
                    });
                }

                characteristics.push(DbCharacteristic {
                    uuid: chr.uuid,
                    properties: chr.properties,
                    permissions: chr.permissions,
                    declaration_handle,
                    value_handle,
                    value: chr.value.clone(),
                    descriptors,
                });
            }

            services.push(DbService {
                uuid: def.uuid,
                primary: def.primary,
                start_handle: start,
                end_handle: cursor,
                includes,
                characteristics,
            });
            next = cursor + 1;
        }

        // Include entries point at top-level services; resolve their ranges
        // by UUID now that every service has one. Unresolvable includes keep
        // the 0..0 range.
        let ranges: Vec<(Uuid, u16, u16)> = services
            .iter()
            .map(|svc| (svc.uuid, svc.start_handle, svc.end_handle))
            .collect();
        for svc in &mut services {
            for include in &mut svc.includes {
                if let Some((_, start, end)) = ranges.iter().find(|(uuid, _, _)| *uuid == include.uuid)
                {
                    include.start_handle = *start;
                    include.end_handle = *end;
                }
            }
        }

        GattDatabase { services }
    }

    pub fn services(&self) -> &[DbService] {
        &self.services
    }

    /// Highest assigned handle, 0 for an empty database.
    pub fn end_handle(&self) -> u16 {
        self.services.last().map(|svc| svc.end_handle).unwrap_or(0)
    }

    /// Primary services, optionally filtered by UUID.
    pub fn primary_services(&self, uuid: Option<&Uuid>) -> Vec<&DbService> {
        self.services
            .iter()
            .filter(|svc| svc.primary)
            .filter(|svc| uuid.map_or(true, |u| svc.uuid == *u))
            .collect()
    }

    /// Include entries whose handle falls within `start..=end`.
    pub fn includes_in_range(&self, start: u16, end: u16) -> Vec<&DbInclude> {
        self.services
            .iter()
            .flat_map(|svc| svc.includes.iter())
            .filter(|inc| inc.handle >= start && inc.handle <= end)
            .collect()
    }

    /// Characteristics whose declaration handle falls within `start..=end`,
    /// optionally filtered by UUID.
    pub fn characteristics_in_range(
        &self,
        start: u16,
        end: u16,
        uuid: Option<&Uuid>,
    ) -> Vec<&DbCharacteristic> {
        self.services
            .iter()
            .flat_map(|svc| svc.characteristics.iter())
            .filter(|chr| chr.declaration_handle >= start && chr.declaration_handle <= end)
            .filter(|chr| uuid.map_or(true, |u| chr.uuid == *u))
            .collect()
    }

    /// Descriptors whose handle falls within `start..=end`.
    pub fn descriptors_in_range(&self, start: u16, end: u16) -> Vec<&DbDescriptor> {
        self.services
            .iter()
            .flat_map(|svc| svc.characteristics.iter())
            .flat_map(|chr| chr.descriptors.iter())
            .filter(|dsc| dsc.handle >= start && dsc.handle <= end)
            .collect()
    }

    /// Every attribute in `start..=end` as flat entries, optionally filtered
    /// by attribute type. Declarations are readable without permissions;
    /// values and descriptors carry their declared permissions.
    pub fn attributes(&self, start: u16, end: u16, type_filter: Option<&Uuid>) -> Vec<AttributeInfo> {
        let mut out = Vec::new();
        let mut push = |info: AttributeInfo| {
            if info.handle < start || info.handle > end {
                return;
            }
            if let Some(filter) = type_filter {
                if info.type_uuid != *filter {
                    return;
                }
            }
            out.push(info);
        };

        for svc in &self.services {
            let service_type = if svc.primary {
                UUID_PRIMARY_SERVICE
            } else {
                UUID_SECONDARY_SERVICE
            };
            push(AttributeInfo {
                handle: svc.start_handle,
                type_uuid: Uuid::from_u16(service_type),
                permissions: AttPermissions::READ,
                kind: AttributeKind::ServiceDeclaration,
            });
            for include in &svc.includes {
                push(AttributeInfo {
                    handle: include.handle,
                    type_uuid: Uuid::from_u16(UUID_INCLUDE),
                    permissions: AttPermissions::READ,
                    kind: AttributeKind::Include,
                });
            }
            for chr in &svc.characteristics {
                push(AttributeInfo {
                    handle: chr.declaration_handle,
                    type_uuid: Uuid::from_u16(UUID_CHARACTERISTIC),
                    permissions: AttPermissions::READ,
                    kind: AttributeKind::CharacteristicDeclaration,
                });
                push(AttributeInfo {
                    handle: chr.value_handle,
                    type_uuid: chr.uuid,
                    permissions: chr.permissions,
                    kind: AttributeKind::CharacteristicValue,
                });
                for dsc in &chr.descriptors {
                    push(AttributeInfo {
                        handle: dsc.handle,
                        type_uuid: dsc.uuid,
                        permissions: dsc.permissions,
                        kind: AttributeKind::Descriptor,
                    });
                }
            }
        }
        out
    }

    /// The value of the attribute at `handle`. Declaration values are
    /// synthesized from the node:
    /// - service: the service UUID in its shortest LE form
    /// - include: `start(2) end(2)` plus the UUID when it is 16-bit
    /// - characteristic declaration: `props(1) value_handle(2) uuid(LE)`
    /// - characteristic value and descriptor: the stored value
    pub fn value_at(&self, handle: u16) -> Option<Vec<u8>> {
        for svc in &self.services {
            if svc.start_handle == handle {
                return Some(svc.uuid.to_wire());
            }
            for include in &svc.includes {
                if include.handle == handle {
                    let mut value = Vec::with_capacity(6);
                    value.extend_from_slice(&include.start_handle.to_le_bytes());
                    value.extend_from_slice(&include.end_handle.to_le_bytes());
                    if let Some(uuid16) = include.uuid.as_u16() {
                        value.extend_from_slice(&uuid16.to_le_bytes());
                    }
                    return Some(value);
                }
            }
            for chr in &svc.characteristics {
                if chr.declaration_handle == handle {
                    let mut value = Vec::with_capacity(3 + 16);
                    value.push(chr.properties.bits());
                    value.extend_from_slice(&chr.value_handle.to_le_bytes());
                    value.extend_from_slice(&chr.uuid.to_wire());
                    return Some(value);
                }
                if chr.value_handle == handle {
                    return Some(chr.value.clone());
                }
                for dsc in &chr.descriptors {
                    if dsc.handle == handle {
                        return Some(dsc.value.clone());
                    }
                }
            }
        }
        None
    }

    /// Overwrites a characteristic value or descriptor value. Declaration
    /// handles are not writable; returns false for those and unknown handles.
    pub fn set_value(&mut self, handle: u16, value: &[u8]) -> bool {
        for svc in &mut self.services {
            for chr in &mut svc.characteristics {
                if chr.value_handle == handle {
                    chr.value = value.to_vec();
                    return true;
                }
                for dsc in &mut chr.descriptors {
                    if dsc.handle == handle {
                        dsc.value = value.to_vec();
                        return true;
                    }
                }
            }
        }
        false
    }

    pub fn characteristic_by_value_handle(&self, handle: u16) -> Option<&DbCharacteristic> {
        self.services
            .iter()
            .flat_map(|svc| svc.characteristics.iter())
            .find(|chr| chr.value_handle == handle)
    }

    /// The characteristic owning the CCCD at `handle`, if that handle is a
    /// client characteristic configuration descriptor.
    pub fn characteristic_by_cccd(&self, handle: u16) -> Option<&DbCharacteristic> {
        self.services
            .iter()
            .flat_map(|svc| svc.characteristics.iter())
            .find(|chr| {
                chr.descriptors
                    .iter()
                    .any(|dsc| dsc.handle == handle && dsc.uuid == UUID_CCCD)
            })
    }

    pub fn descriptor_by_handle(&self, handle: u16) -> Option<&DbDescriptor> {
        self.services
            .iter()
            .flat_map(|svc| svc.characteristics.iter())
            .flat_map(|chr| chr.descriptors.iter())
            .find(|dsc| dsc.handle == handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gatt::types::{CharacteristicDefinition, DescriptorDefinition};

    fn sample_tree() -> Vec<ServiceDefinition> {
        let inner = ServiceDefinition::new(Uuid::from_u16(0x180f), true);

        let mut outer = ServiceDefinition::new(Uuid::from_u16(0x1800), true);
        outer.includes.push(inner.clone());
        outer.characteristics.push(CharacteristicDefinition {
            uuid: Uuid::from_u16(0x2a00),
            properties: CharacteristicProperties::READ | CharacteristicProperties::NOTIFY,
            permissions: AttPermissions::READ,
            value: vec![0x01],
            descriptors: vec![DescriptorDefinition {
                uuid: Uuid::from_u16(UUID_CCCD),
                permissions: AttPermissions::READ | AttPermissions::WRITE,
                value: vec![0x00, 0x00],
            }],
        });

        vec![inner, outer]
    }

    #[test]
    fn handle_assignment_is_contiguous_and_deterministic() {
        let tree = sample_tree();
        let db = GattDatabase::build(&tree);
        let again = GattDatabase::build(&tree);

        let svc = &db.services()[1];
        assert_eq!(db.services()[0].start_handle, 1);
        assert_eq!(db.services()[0].end_handle, 1);
        assert_eq!(svc.start_handle, 2);
        assert_eq!(svc.includes[0].handle, 3);
        assert_eq!(svc.characteristics[0].declaration_handle, 4);
        assert_eq!(svc.characteristics[0].value_handle, 5);
        assert_eq!(svc.characteristics[0].descriptors[0].handle, 6);
        assert_eq!(svc.end_handle, 6);
        assert_eq!(db.end_handle(), again.end_handle());
        assert_eq!(
            again.services()[1].characteristics[0].value_handle,
            svc.characteristics[0].value_handle
        );
    }

    #[test]
    fn include_range_resolves_to_target_service() {
        let db = GattDatabase::build(&sample_tree());
        let include = &db.services()[1].includes[0];
        assert_eq!(include.start_handle, 1);
        assert_eq!(include.end_handle, 1);

        let value = db.value_at(include.handle).unwrap();
        assert_eq!(value, vec![0x01, 0x00, 0x01, 0x00, 0x0f, 0x18]);
    }

    #[test]
    fn characteristic_declaration_value_shape() {
        let db = GattDatabase::build(&sample_tree());
        let chr = &db.services()[1].characteristics[0];
        let value = db.value_at(chr.declaration_handle).unwrap();
        // props, value handle LE, 16-bit uuid LE
        assert_eq!(value, vec![0x12, 0x05, 0x00, 0x00, 0x2a]);
    }

    #[test]
    fn queries_respect_range_and_filter() {
        let db = GattDatabase::build(&sample_tree());
        assert_eq!(db.primary_services(None).len(), 2);
        assert_eq!(
            db.primary_services(Some(&Uuid::from_u16(0x1800))).len(),
            1
        );
        assert_eq!(db.includes_in_range(1, 0xffff).len(), 1);
        assert_eq!(db.includes_in_range(4, 0xffff).len(), 0);
        assert_eq!(db.characteristics_in_range(1, 0xffff, None).len(), 1);
        assert_eq!(db.descriptors_in_range(6, 6).len(), 1);

        let attrs = db.attributes(1, 0xffff, None);
        assert_eq!(attrs.len(), 6);
        let cccd_only = db.attributes(1, 0xffff, Some(&Uuid::from_u16(UUID_CCCD)));
        assert_eq!(cccd_only.len(), 1);
        assert_eq!(cccd_only[0].handle, 6);
    }

    #[test]
    fn set_value_rejects_declarations() {
        let mut db = GattDatabase::build(&sample_tree());
        assert!(db.set_value(5, &[0xaa]));
        assert_eq!(db.value_at(5), Some(vec![0xaa]));
        assert!(!db.set_value(4, &[0xaa]));
        assert!(!db.set_value(0x30, &[0xaa]));
    }

    #[test]
    fn cccd_lookup_finds_owner() {
        let db = GattDatabase::build(&sample_tree());
        let owner = db.characteristic_by_cccd(6).unwrap();
        assert_eq!(owner.value_handle, 5);
        assert!(db.characteristic_by_cccd(5).is_none());
    }
}
