//! Local GATT server runtime: subscriptions, prepared writes, and handling of
//! remote-initiated requests against the local database.

use std::collections::HashMap;

use crate::error::{Result, TesterError};
use crate::gap::types::Peer;
use crate::host::SubscriptionKind;

use super::builder::AttributeLocation;
use super::constants::{CCCD_INDICATE, CCCD_NONE, CCCD_NOTIFY};
use super::database::GattDatabase;
use super::types::CharacteristicProperties;

/// Per-peer notify/indicate registrations, keyed by value handle. A peer
/// holds at most one entry per characteristic.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: HashMap<u16, Vec<(Peer, SubscriptionKind)>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        SubscriptionRegistry::default()
    }

    /// Registers a subscriber; enabling an already-subscribed peer fails.
    pub fn enable(&mut self, handle: u16, peer: Peer, kind: SubscriptionKind) -> Result<()> {
        let entries = self.entries.entry(handle).or_default();
        if entries.iter().any(|(p, _)| *p == peer) {
            return Err(TesterError::AlreadySubscribed);
        }
        entries.push((peer, kind));
        Ok(())
    }

    /// Removes a subscriber; disabling a non-subscribed peer fails.
    pub fn disable(&mut self, handle: u16, peer: &Peer) -> Result<()> {
        let entries = self
            .entries
            .get_mut(&handle)
            .ok_or(TesterError::NotSubscribed)?;
        let before = entries.len();
        entries.retain(|(p, _)| p != peer);
        if entries.len() == before {
            return Err(TesterError::NotSubscribed);
        }
        Ok(())
    }

    pub fn subscribers(&self, handle: u16) -> &[(Peer, SubscriptionKind)] {
        self.entries
            .get(&handle)
            .map(|entries| entries.as_slice())
            .unwrap_or(&[])
    }

    /// Drops every registration held by a departing peer.
    pub fn clear_peer(&mut self, peer: &Peer) {
        for entries in self.entries.values_mut() {
            entries.retain(|(p, _)| p != peer);
        }
    }
}

/// One partially reassembled long write.
#[derive(Debug, Clone)]
pub struct PreparedWrite {
    pub handle: u16,
    pub value: Vec<u8>,
}

impl PreparedWrite {
    pub fn new(handle: u16) -> Self {
        PreparedWrite {
            handle,
            value: Vec::new(),
        }
    }

    /// Splices `data` in at `offset`. The buffer becomes exactly
    /// `offset + data.len()` bytes: bytes before the offset are preserved,
    /// a gap is zero-filled, anything past the new end is dropped.
    pub fn splice(&mut self, offset: usize, data: &[u8]) {
        self.value.resize(offset, 0);
        self.value.extend_from_slice(data);
    }
}

/// One slot per attribute kind, mirroring the two queues a remote peer may
/// interleave within a single prepared-write transaction.
#[derive(Debug, Default)]
struct PeerPrepared {
    characteristic: Option<PreparedWrite>,
    descriptor: Option<PreparedWrite>,
}

/// One pending notification or indication toward a subscriber.
#[derive(Debug, Clone)]
pub struct NotifyTarget {
    pub peer: Peer,
    pub kind: SubscriptionKind,
    pub value_handle: u16,
    pub value: Vec<u8>,
}

/// What a server-side write resolved to.
#[derive(Debug)]
pub enum WriteOutcome {
    /// Committed immediately; carries the written handle and new value.
    ValueChanged { handle: u16, value: Vec<u8> },
    /// Queued into a prepared-write slot; nothing visible yet.
    Prepared,
    /// A CCCD flip; `pushes` lists the current value to deliver to the new
    /// subscriber (empty on disable).
    SubscriptionChanged { pushes: Vec<NotifyTarget> },
}

/// The running local server: a built database plus per-peer state.
pub struct GattServer {
    database: GattDatabase,
    subscriptions: SubscriptionRegistry,
    prepared: HashMap<Peer, PeerPrepared>,
    /// Index of the first session-declared service within `database`.
    user_service_offset: usize,
}

impl GattServer {
    pub fn new(database: GattDatabase, user_service_offset: usize) -> Self {
        GattServer {
            database,
            subscriptions: SubscriptionRegistry::new(),
            prepared: HashMap::new(),
            user_service_offset,
        }
    }

    pub fn database(&self) -> &GattDatabase {
        &self.database
    }

    /// Answers a remote read request. The offset is clamped to the value
    /// length, so reading past the end yields an empty slice.
    pub fn read(&self, handle: u16, offset: u16) -> Result<Vec<u8>> {
        let value = self
            .database
            .value_at(handle)
            .ok_or(TesterError::UnknownHandle(handle))?;
        let offset = (offset as usize).min(value.len());
        Ok(value[offset..].to_vec())
    }

    /// Applies a remote write. CCCD writes flip subscriptions, prepared
    /// writes accumulate in the peer's slot, plain writes commit immediately.
    pub fn write(
        &mut self,
        peer: Peer,
        handle: u16,
        offset: u16,
        data: &[u8],
        prepared: bool,
    ) -> Result<WriteOutcome> {
        if let Some(chr) = self.database.characteristic_by_cccd(handle) {
            let value_handle = chr.value_handle;
            let properties = chr.properties;
            return self.write_cccd(peer, handle, value_handle, properties, data);
        }

        if prepared {
            let is_descriptor = self.database.descriptor_by_handle(handle).is_some();
            if !is_descriptor && self.database.characteristic_by_value_handle(handle).is_none() {
                return Err(TesterError::UnknownHandle(handle));
            }
            let slots = self.prepared.entry(peer).or_default();
            let slot = if is_descriptor {
                &mut slots.descriptor
            } else {
                &mut slots.characteristic
            };
            let context = slot.get_or_insert_with(|| PreparedWrite::new(handle));
            if context.handle != handle {
                // The slot already reassembles a different attribute.
                return Err(TesterError::OperationPending);
            }
            context.splice(offset as usize, data);
            return Ok(WriteOutcome::Prepared);
        }

        if self.database.set_value(handle, data) {
            Ok(WriteOutcome::ValueChanged {
                handle,
                value: data.to_vec(),
            })
        } else {
            Err(TesterError::UnknownHandle(handle))
        }
    }

    fn write_cccd(
        &mut self,
        peer: Peer,
        cccd_handle: u16,
        value_handle: u16,
        properties: CharacteristicProperties,
        data: &[u8],
    ) -> Result<WriteOutcome> {
        if data.len() != 2 {
            return Err(TesterError::MalformedPayload);
        }
        let requested = [data[0], data[1]];
        let pushes = match requested {
            CCCD_NONE => {
                self.subscriptions.disable(value_handle, &peer)?;
                Vec::new()
            }
            CCCD_NOTIFY => {
                if !properties.contains(CharacteristicProperties::NOTIFY) {
                    return Err(TesterError::NotSupported);
                }
                self.subscribe_and_push(peer, value_handle, SubscriptionKind::Notification)?
            }
            CCCD_INDICATE => {
                if !properties.contains(CharacteristicProperties::INDICATE) {
                    return Err(TesterError::NotSupported);
                }
                self.subscribe_and_push(peer, value_handle, SubscriptionKind::Indication)?
            }
            _ => return Err(TesterError::MalformedPayload),
        };
        self.database.set_value(cccd_handle, data);
        Ok(WriteOutcome::SubscriptionChanged { pushes })
    }

    // A successful enable immediately pushes the current value to the new
    // subscriber.
    fn subscribe_and_push(
        &mut self,
        peer: Peer,
        value_handle: u16,
        kind: SubscriptionKind,
    ) -> Result<Vec<NotifyTarget>> {
        self.subscriptions.enable(value_handle, peer, kind)?;
        let value = self.database.value_at(value_handle).unwrap_or_default();
        Ok(vec![NotifyTarget {
            peer,
            kind,
            value_handle,
            value,
        }])
    }

    /// Resolves both prepared-write slots for `peer`. Committing returns the
    /// (handle, value) pairs that changed; cancelling returns none. The slots
    /// clear either way.
    pub fn execute_write(&mut self, peer: &Peer, commit: bool) -> Vec<(u16, Vec<u8>)> {
        let Some(slots) = self.prepared.remove(peer) else {
            return Vec::new();
        };
        if !commit {
            return Vec::new();
        }
        let mut changed = Vec::new();
        for context in [slots.characteristic, slots.descriptor].into_iter().flatten() {
            if self.database.set_value(context.handle, &context.value) {
                changed.push((context.handle, context.value));
            }
        }
        changed
    }

    /// Sets a local value and returns the subscribers it must be pushed to.
    pub fn update_value(&mut self, handle: u16, value: &[u8]) -> Result<Vec<NotifyTarget>> {
        if !self.database.set_value(handle, value) {
            return Err(TesterError::UnknownHandle(handle));
        }
        Ok(self
            .subscriptions
            .subscribers(handle)
            .iter()
            .map(|(peer, kind)| NotifyTarget {
                peer: *peer,
                kind: *kind,
                value_handle: handle,
                value: value.to_vec(),
            })
            .collect())
    }

    /// Clears everything held on behalf of a departing peer.
    pub fn forget_peer(&mut self, peer: &Peer) {
        self.subscriptions.clear_peer(peer);
        self.prepared.remove(peer);
    }

    /// Maps a build-session location onto the handle it received, offset past
    /// the built-in services.
    pub fn handle_at(&self, location: AttributeLocation) -> Option<u16> {
        let svc = self
            .database
            .services()
            .get(self.user_service_offset + location.service)?;
        let chr = svc.characteristics.get(location.characteristic)?;
        match location.descriptor {
            None => Some(chr.value_handle),
            Some(idx) => chr.descriptors.get(idx).map(|dsc| dsc.handle),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gap::types::{AddressType, BdAddr};
    use crate::gatt::constants::UUID_CCCD;
    use crate::gatt::types::{
        AttPermissions, CharacteristicDefinition, DescriptorDefinition, ServiceDefinition,
    };
    use crate::uuid::Uuid;

    fn peer(last: u8) -> Peer {
        Peer::new(AddressType::Public, BdAddr::new([last, 0, 0, 0, 0, 0]))
    }

    fn notify_server() -> GattServer {
        let mut svc = ServiceDefinition::new(Uuid::from_u16(0x1234), true);
        svc.characteristics.push(CharacteristicDefinition {
            uuid: Uuid::from_u16(0x5678),
            properties: CharacteristicProperties::READ | CharacteristicProperties::NOTIFY,
            permissions: AttPermissions::READ,
            value: vec![0x07],
            descriptors: vec![DescriptorDefinition {
                uuid: Uuid::from_u16(UUID_CCCD),
                permissions: AttPermissions::READ | AttPermissions::WRITE,
                value: vec![0x00, 0x00],
            }],
        });
        GattServer::new(GattDatabase::build(&[svc]), 0)
    }

    #[test]
    fn splice_preserves_prefix_and_truncates() {
        let mut write = PreparedWrite::new(5);
        write.splice(0, &[1, 2, 3]);
        write.splice(3, &[4, 5]);
        assert_eq!(write.value, vec![1, 2, 3, 4, 5]);
        write.splice(1, &[9]);
        assert_eq!(write.value, vec![1, 9]);
        write.splice(4, &[7]);
        assert_eq!(write.value, vec![1, 9, 0, 0, 7]);
    }

    #[test]
    fn subscription_registry_rejects_duplicates() {
        let mut registry = SubscriptionRegistry::new();
        registry
            .enable(3, peer(1), SubscriptionKind::Notification)
            .unwrap();
        assert!(matches!(
            registry.enable(3, peer(1), SubscriptionKind::Indication),
            Err(TesterError::AlreadySubscribed)
        ));
        // A different peer on the same handle is fine.
        registry
            .enable(3, peer(2), SubscriptionKind::Indication)
            .unwrap();
        assert_eq!(registry.subscribers(3).len(), 2);
    }

    #[test]
    fn disable_requires_prior_subscription() {
        let mut registry = SubscriptionRegistry::new();
        assert!(matches!(
            registry.disable(3, &peer(1)),
            Err(TesterError::NotSubscribed)
        ));
        registry
            .enable(3, peer(1), SubscriptionKind::Notification)
            .unwrap();
        registry.disable(3, &peer(1)).unwrap();
        assert!(registry.disable(3, &peer(1)).is_err());
    }

    #[test]
    fn cccd_enable_pushes_current_value() {
        let mut server = notify_server();
        // handles: 1 svc, 2 decl, 3 value, 4 cccd
        let outcome = server.write(peer(1), 4, 0, &CCCD_NOTIFY, false).unwrap();
        match outcome {
            WriteOutcome::SubscriptionChanged { pushes } => {
                assert_eq!(pushes.len(), 1);
                assert_eq!(pushes[0].value_handle, 3);
                assert_eq!(pushes[0].value, vec![0x07]);
                assert_eq!(pushes[0].kind, SubscriptionKind::Notification);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        // Second enable from the same peer fails.
        assert!(server.write(peer(1), 4, 0, &CCCD_NOTIFY, false).is_err());
    }

    #[test]
    fn cccd_rejects_unsupported_mode_and_bad_length() {
        let mut server = notify_server();
        // The characteristic cannot indicate.
        assert!(matches!(
            server.write(peer(1), 4, 0, &CCCD_INDICATE, false),
            Err(TesterError::NotSupported)
        ));
        assert!(server.write(peer(1), 4, 0, &[0x01], false).is_err());
        assert!(server.write(peer(1), 4, 0, &[0x03, 0x00], false).is_err());
    }

    #[test]
    fn prepared_writes_commit_on_execute() {
        let mut server = notify_server();
        server.write(peer(1), 3, 0, &[1, 2], true).unwrap();
        server.write(peer(1), 3, 2, &[3, 4], true).unwrap();
        // Nothing visible before execute.
        assert_eq!(server.read(3, 0).unwrap(), vec![0x07]);

        let changed = server.execute_write(&peer(1), true);
        assert_eq!(changed, vec![(3, vec![1, 2, 3, 4])]);
        assert_eq!(server.read(3, 0).unwrap(), vec![1, 2, 3, 4]);
        // Slots cleared: a second execute is a no-op.
        assert!(server.execute_write(&peer(1), true).is_empty());
    }

    #[test]
    fn prepared_writes_discard_on_cancel() {
        let mut server = notify_server();
        server.write(peer(1), 3, 0, &[9, 9], true).unwrap();
        assert!(server.execute_write(&peer(1), false).is_empty());
        assert_eq!(server.read(3, 0).unwrap(), vec![0x07]);
        // The slot is free again after cancel.
        server.write(peer(1), 3, 0, &[1], true).unwrap();
        assert_eq!(server.execute_write(&peer(1), true).len(), 1);
    }

    #[test]
    fn update_value_fans_out_to_subscribers() {
        let mut server = notify_server();
        server.write(peer(1), 4, 0, &CCCD_NOTIFY, false).unwrap();

        let targets = server.update_value(3, &[0xaa]).unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].peer, peer(1));
        assert_eq!(targets[0].value, vec![0xaa]);
    }

    #[test]
    fn forget_peer_clears_subscriptions_and_slots() {
        let mut server = notify_server();
        server.write(peer(1), 4, 0, &CCCD_NOTIFY, false).unwrap();
        server.write(peer(1), 3, 0, &[1], true).unwrap();

        server.forget_peer(&peer(1));
        assert!(server.update_value(3, &[0xbb]).unwrap().is_empty());
        assert!(server.execute_write(&peer(1), true).is_empty());
        // A fresh enable succeeds after the cleanup.
        server.write(peer(1), 4, 0, &CCCD_NOTIFY, false).unwrap();
    }

    #[test]
    fn read_clamps_offset() {
        let server = notify_server();
        assert_eq!(server.read(3, 0).unwrap(), vec![0x07]);
        assert_eq!(server.read(3, 5).unwrap(), Vec::<u8>::new());
        assert!(server.read(0x40, 0).is_err());
    }
}
