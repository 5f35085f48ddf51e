//! GATT service command handling.
//!
//! Declaration commands feed the build session; discovery and read/write
//! commands operate on per-connection mirrors of remote databases; the local
//! server answers remote-initiated requests relayed by the host.

use log::{debug, warn};
use std::str::FromStr;

use crate::btp::constants::{
    BTP_INDEX_NONE, BTP_SERVICE_ID_GATT, BTP_STATUS_FAILED, CONTROLLER_INDEX,
};
use crate::btp::{self, FrameSink};
use crate::connection::{ConnectionRegistry, PendingOp};
use crate::error::{Result, TesterError};
use crate::events::EventEmitter;
use crate::gap::types::Peer;
use crate::host::{BleHost, HostResult, SubscriptionKind};
use crate::uuid::Uuid;

use super::builder::BuildSession;
use super::constants::*;
use super::database::{DbCharacteristic, DbDescriptor, DbInclude, DbService, GattDatabase};
use super::server::{GattServer, NotifyTarget, WriteOutcome};
use super::types::*;

/// Opcodes this dispatcher routes; the supported-commands bitmap is derived
/// from exactly this list.
const HANDLED_COMMANDS: &[u8] = &[
    GATT_READ_SUPPORTED_COMMANDS,
    GATT_ADD_SERVICE,
    GATT_ADD_CHARACTERISTIC,
    GATT_ADD_DESCRIPTOR,
    GATT_ADD_INCLUDED_SERVICE,
    GATT_SET_VALUE,
    GATT_START_SERVER,
    GATT_DISC_ALL_PRIM_SVCS,
    GATT_DISC_PRIM_UUID,
    GATT_FIND_INCLUDED,
    GATT_DISC_ALL_CHRC,
    GATT_DISC_CHRC_UUID,
    GATT_DISC_ALL_DESC,
    GATT_READ,
    GATT_READ_LONG,
    GATT_WRITE,
    GATT_WRITE_LONG,
    GATT_CFG_NOTIFY,
    GATT_CFG_INDICATE,
    GATT_GET_ATTRIBUTES,
    GATT_GET_ATTRIBUTE_VALUE,
];

fn supported_commands() -> Vec<u8> {
    let mut bitmap = vec![0u8; 4];
    for &opcode in HANDLED_COMMANDS {
        bitmap[(opcode / 8) as usize] |= 1 << (opcode % 8);
    }
    bitmap
}

// Conformance test database, registered with the host alongside any
// session-declared services.
const TEST_SVC: &str = "00000001-8C26-476F-89A7-A108033A69C7";
const TEST_CHR_READ_WRITE: &str = "00000006-8C26-476F-89A7-A108033A69C7";
const TEST_DSC_READ_WRITE: &str = "0000000B-8C26-476F-89A7-A108033A69C7";
const TEST_CHR_READ_WRITE_LONG: &str = "00000015-8C26-476F-89A7-A108033A69C7";
const TEST_DSC_READ_WRITE_LONG: &str = "0000001B-8C26-476F-89A7-A108033A69C7";
const TEST_CHR_NOTIFY: &str = "00000025-8C26-476F-89A7-A108033A69C7";
const TEST_INC_SVC_UUID: u32 = 0x0000001e;

const SHORT_VALUE_LEN: usize = 1;
const LONG_VALUE_LEN: usize = 100;

fn test_uuid(s: &str) -> Uuid {
    // The literals above are valid by construction.
    Uuid::from_str(s).unwrap_or(Uuid::from_u16(0))
}

fn test_services() -> Vec<ServiceDefinition> {
    let includable = ServiceDefinition::new(Uuid::from_u32(TEST_INC_SVC_UUID), true);

    let mut svc = ServiceDefinition::new(test_uuid(TEST_SVC), true);
    svc.includes.push(includable.clone());
    svc.characteristics.push(CharacteristicDefinition {
        uuid: test_uuid(TEST_CHR_READ_WRITE),
        properties: CharacteristicProperties::READ | CharacteristicProperties::WRITE,
        permissions: AttPermissions::READ | AttPermissions::WRITE,
        value: vec![0; SHORT_VALUE_LEN],
        descriptors: vec![
            DescriptorDefinition {
                uuid: test_uuid(TEST_DSC_READ_WRITE),
                permissions: AttPermissions::READ | AttPermissions::WRITE,
                value: vec![0; SHORT_VALUE_LEN],
            },
            DescriptorDefinition {
                uuid: test_uuid(TEST_DSC_READ_WRITE_LONG),
                permissions: AttPermissions::READ | AttPermissions::WRITE,
                value: vec![0; LONG_VALUE_LEN],
            },
        ],
    });
    svc.characteristics.push(CharacteristicDefinition {
        uuid: test_uuid(TEST_CHR_READ_WRITE_LONG),
        properties: CharacteristicProperties::READ | CharacteristicProperties::WRITE,
        permissions: AttPermissions::READ | AttPermissions::WRITE,
        value: vec![0; LONG_VALUE_LEN],
        descriptors: Vec::new(),
    });
    svc.characteristics.push(CharacteristicDefinition {
        uuid: test_uuid(TEST_CHR_NOTIFY),
        properties: CharacteristicProperties::NOTIFY | CharacteristicProperties::INDICATE,
        permissions: AttPermissions::READ,
        value: vec![0; SHORT_VALUE_LEN],
        descriptors: vec![DescriptorDefinition {
            uuid: Uuid::from_u16(UUID_CCCD),
            permissions: AttPermissions::READ | AttPermissions::WRITE,
            value: vec![0x00, 0x00],
        }],
    });

    vec![includable, svc]
}

// Core GAP/GATT services exposed ahead of everything else in attribute
// enumeration.
fn core_services(device_name: &str) -> Vec<ServiceDefinition> {
    let mut gap = ServiceDefinition::new(Uuid::from_u16(UUID_GAP_SERVICE), true);
    gap.characteristics.push(CharacteristicDefinition {
        uuid: Uuid::from_u16(UUID_DEVICE_NAME),
        properties: CharacteristicProperties::READ,
        permissions: AttPermissions::READ,
        value: device_name.as_bytes().to_vec(),
        descriptors: Vec::new(),
    });
    gap.characteristics.push(CharacteristicDefinition {
        uuid: Uuid::from_u16(UUID_APPEARANCE),
        properties: CharacteristicProperties::READ,
        permissions: AttPermissions::READ,
        value: vec![0x00, 0x00],
        descriptors: Vec::new(),
    });
    gap.characteristics.push(CharacteristicDefinition {
        uuid: Uuid::from_u16(UUID_CENTRAL_ADDR_RESOLUTION),
        properties: CharacteristicProperties::READ,
        permissions: AttPermissions::READ,
        value: vec![0x00],
        descriptors: Vec::new(),
    });

    let mut gatt = ServiceDefinition::new(Uuid::from_u16(UUID_GATT_SERVICE), true);
    gatt.characteristics.push(CharacteristicDefinition {
        uuid: Uuid::from_u16(UUID_SERVICE_CHANGED),
        properties: CharacteristicProperties::INDICATE,
        permissions: AttPermissions::empty(),
        value: Vec::new(),
        descriptors: vec![DescriptorDefinition {
            uuid: Uuid::from_u16(UUID_CCCD),
            permissions: AttPermissions::READ | AttPermissions::WRITE,
            value: vec![0x00, 0x00],
        }],
    });

    vec![gap, gatt]
}

enum Outcome {
    Reply(Vec<u8>),
    /// Reply comes later, from a host completion event.
    Deferred,
}

/// GATT-side state: the build session and, once started, the local server.
pub struct GattService {
    session: BuildSession,
    server: Option<GattServer>,
    builtin: Vec<ServiceDefinition>,
}

impl GattService {
    pub fn new() -> Self {
        GattService {
            session: BuildSession::new(),
            server: None,
            builtin: test_services(),
        }
    }

    /// Routes one GATT command frame.
    pub fn handle(
        &mut self,
        opcode: u8,
        index: u8,
        data: &[u8],
        connections: &mut ConnectionRegistry,
        host: &mut dyn BleHost,
        sink: &mut dyn FrameSink,
    ) {
        debug!("GATT command {:#04x} index {:#04x}", opcode, index);

        let enumeration = opcode == GATT_READ_SUPPORTED_COMMANDS;
        let index_ok = if enumeration {
            index == BTP_INDEX_NONE
        } else {
            index == CONTROLLER_INDEX
        };
        if !index_ok {
            btp::send_status(sink, BTP_SERVICE_ID_GATT, opcode, index, BTP_STATUS_FAILED);
            return;
        }

        let result = match opcode {
            GATT_READ_SUPPORTED_COMMANDS => Ok(Outcome::Reply(supported_commands())),
            GATT_ADD_SERVICE => self.add_service(data),
            GATT_ADD_CHARACTERISTIC => self.add_characteristic(data),
            GATT_ADD_DESCRIPTOR => self.add_descriptor(data),
            GATT_ADD_INCLUDED_SERVICE => self.add_included_service(data),
            GATT_SET_VALUE => self.set_value(data, host),
            GATT_START_SERVER => self.start_server(host),
            GATT_DISC_ALL_PRIM_SVCS => self.disc_all_prim_svcs(data, connections),
            GATT_DISC_PRIM_UUID => self.disc_prim_uuid(data, connections),
            GATT_FIND_INCLUDED => self.find_included(data, connections),
            GATT_DISC_ALL_CHRC => self.disc_chrc(data, connections, false),
            GATT_DISC_CHRC_UUID => self.disc_chrc(data, connections, true),
            GATT_DISC_ALL_DESC => self.disc_all_desc(data, connections),
            GATT_READ => self.read(data, connections, host),
            GATT_READ_LONG => self.read_long(data, connections, host),
            GATT_WRITE => self.write(data, connections, host),
            GATT_WRITE_LONG => self.write_long(data, connections, host),
            GATT_CFG_NOTIFY => self.configure(data, connections, host, SubscriptionKind::Notification),
            GATT_CFG_INDICATE => self.configure(data, connections, host, SubscriptionKind::Indication),
            GATT_GET_ATTRIBUTES => self.get_attributes(data),
            GATT_GET_ATTRIBUTE_VALUE => self.get_attribute_value(data),
            _ => Err(TesterError::UnknownCommand {
                service: BTP_SERVICE_ID_GATT,
                opcode,
            }),
        };

        match result {
            Ok(Outcome::Reply(payload)) => {
                btp::send(sink, BTP_SERVICE_ID_GATT, opcode, CONTROLLER_INDEX, payload)
            }
            Ok(Outcome::Deferred) => {}
            Err(err) => {
                warn!("GATT command {:#04x} failed: {}", opcode, err);
                btp::send_status(
                    sink,
                    BTP_SERVICE_ID_GATT,
                    opcode,
                    CONTROLLER_INDEX,
                    err.status(),
                );
            }
        }
    }

    // --- declaration commands ---

    fn add_service(&mut self, data: &[u8]) -> Result<Outcome> {
        let cmd = GattAddServiceCmd::parse(data)?;
        let id = self.session.add_service(cmd.uuid, cmd.primary);
        Ok(Outcome::Reply(id.to_le_bytes().to_vec()))
    }

    fn add_characteristic(&mut self, data: &[u8]) -> Result<Outcome> {
        let cmd = GattAddCharacteristicCmd::parse(data)?;
        let id = self
            .session
            .add_characteristic(cmd.uuid, cmd.properties, cmd.permissions)?;
        Ok(Outcome::Reply(id.to_le_bytes().to_vec()))
    }

    fn add_descriptor(&mut self, data: &[u8]) -> Result<Outcome> {
        let cmd = GattAddDescriptorCmd::parse(data)?;
        let id = self.session.add_descriptor(cmd.uuid, cmd.permissions)?;
        Ok(Outcome::Reply(id.to_le_bytes().to_vec()))
    }

    fn add_included_service(&mut self, data: &[u8]) -> Result<Outcome> {
        let cmd = GattAddIncludedServiceCmd::parse(data)?;
        let id = self.session.add_included_service(cmd.svc_id)?;
        Ok(Outcome::Reply(id.to_le_bytes().to_vec()))
    }

    fn set_value(&mut self, data: &[u8], host: &mut dyn BleHost) -> Result<Outcome> {
        let cmd = GattSetValueCmd::parse(data)?;
        let location = self.session.set_value(cmd.attr_id, &cmd.value)?;
        // With a running server, mirror the value into the database and fan
        // out to current subscribers.
        if let Some(server) = &mut self.server {
            if let Some(handle) = server.handle_at(location) {
                let targets = server.update_value(handle, &cmd.value)?;
                push_notifications(host, &targets);
            }
        }
        Ok(Outcome::Reply(Vec::new()))
    }

    fn start_server(&mut self, host: &mut dyn BleHost) -> Result<Outcome> {
        self.session.flush();

        let user_defs = self.session.definitions();
        // The reply counts flattened attributes, not declaration ids: a
        // characteristic occupies its declaration and value handles.
        let db_attr_cnt = user_defs
            .iter()
            .map(|svc| svc.attribute_count())
            .sum::<u16>()
            .min(u8::MAX as u16) as u8;

        let mut registered = self.builtin.clone();
        registered.extend(user_defs);
        host.register_services(&registered)?;

        let mut full = core_services(&host.controller_name());
        let builtin_count = full.len() + self.builtin.len();
        full.extend(registered);
        let database = GattDatabase::build(&full);

        let db_attr_off = database
            .services()
            .get(builtin_count)
            .map(|svc| svc.start_handle)
            .unwrap_or(0);

        self.server = Some(GattServer::new(database, builtin_count));

        let mut payload = Vec::with_capacity(3);
        payload.extend_from_slice(&db_attr_off.to_le_bytes());
        payload.push(db_attr_cnt);
        Ok(Outcome::Reply(payload))
    }

    // --- discovery over a remote database ---

    fn disc_all_prim_svcs(
        &mut self,
        data: &[u8],
        connections: &mut ConnectionRegistry,
    ) -> Result<Outcome> {
        let cmd = GattDiscCmd::parse(data)?;
        let conn = connections
            .get(&cmd.peer.address)
            .ok_or(TesterError::NotConnected)?;
        Ok(Outcome::Reply(encode_services(
            &conn.database.primary_services(None),
        )))
    }

    fn disc_prim_uuid(
        &mut self,
        data: &[u8],
        connections: &mut ConnectionRegistry,
    ) -> Result<Outcome> {
        let cmd = GattDiscUuidCmd::parse(data)?;
        let conn = connections
            .get(&cmd.peer.address)
            .ok_or(TesterError::NotConnected)?;
        Ok(Outcome::Reply(encode_services(
            &conn.database.primary_services(Some(&cmd.uuid)),
        )))
    }

    fn find_included(
        &mut self,
        data: &[u8],
        connections: &mut ConnectionRegistry,
    ) -> Result<Outcome> {
        let cmd = GattRangeCmd::parse(data)?;
        let conn = connections
            .get(&cmd.peer.address)
            .ok_or(TesterError::NotConnected)?;
        Ok(Outcome::Reply(encode_includes(
            &conn.database.includes_in_range(cmd.start, cmd.end),
        )))
    }

    fn disc_chrc(
        &mut self,
        data: &[u8],
        connections: &mut ConnectionRegistry,
        with_uuid: bool,
    ) -> Result<Outcome> {
        let (peer, start, end, uuid) = if with_uuid {
            let cmd = GattRangeUuidCmd::parse(data)?;
            (cmd.peer, cmd.start, cmd.end, Some(cmd.uuid))
        } else {
            let cmd = GattRangeCmd::parse(data)?;
            (cmd.peer, cmd.start, cmd.end, None)
        };
        let conn = connections
            .get(&peer.address)
            .ok_or(TesterError::NotConnected)?;
        Ok(Outcome::Reply(encode_characteristics(
            &conn
                .database
                .characteristics_in_range(start, end, uuid.as_ref()),
        )))
    }

    fn disc_all_desc(
        &mut self,
        data: &[u8],
        connections: &mut ConnectionRegistry,
    ) -> Result<Outcome> {
        let cmd = GattRangeCmd::parse(data)?;
        let conn = connections
            .get(&cmd.peer.address)
            .ok_or(TesterError::NotConnected)?;
        Ok(Outcome::Reply(encode_descriptors(
            &conn.database.descriptors_in_range(cmd.start, cmd.end),
        )))
    }

    // --- remote reads and writes (deferred replies) ---

    fn read(
        &mut self,
        data: &[u8],
        connections: &mut ConnectionRegistry,
        host: &mut dyn BleHost,
    ) -> Result<Outcome> {
        let cmd = GattReadCmd::parse(data)?;
        ensure_idle(connections, &cmd.peer)?;
        host.read_attribute(&cmd.peer, cmd.handle, 0)?;
        mark_pending(connections, &cmd.peer, PendingOp::Read);
        Ok(Outcome::Deferred)
    }

    fn read_long(
        &mut self,
        data: &[u8],
        connections: &mut ConnectionRegistry,
        host: &mut dyn BleHost,
    ) -> Result<Outcome> {
        let cmd = GattReadLongCmd::parse(data)?;
        ensure_idle(connections, &cmd.peer)?;
        host.read_attribute(&cmd.peer, cmd.handle, cmd.offset)?;
        mark_pending(connections, &cmd.peer, PendingOp::ReadLong);
        Ok(Outcome::Deferred)
    }

    fn write(
        &mut self,
        data: &[u8],
        connections: &mut ConnectionRegistry,
        host: &mut dyn BleHost,
    ) -> Result<Outcome> {
        let cmd = GattWriteCmd::parse(data)?;
        ensure_idle(connections, &cmd.peer)?;
        host.write_attribute(&cmd.peer, cmd.handle, 0, &cmd.data)?;
        mark_pending(connections, &cmd.peer, PendingOp::Write);
        Ok(Outcome::Deferred)
    }

    fn write_long(
        &mut self,
        data: &[u8],
        connections: &mut ConnectionRegistry,
        host: &mut dyn BleHost,
    ) -> Result<Outcome> {
        let cmd = GattWriteLongCmd::parse(data)?;
        ensure_idle(connections, &cmd.peer)?;
        host.write_attribute(&cmd.peer, cmd.handle, cmd.offset, &cmd.data)?;
        mark_pending(connections, &cmd.peer, PendingOp::WriteLong);
        Ok(Outcome::Deferred)
    }

    fn configure(
        &mut self,
        data: &[u8],
        connections: &mut ConnectionRegistry,
        host: &mut dyn BleHost,
        kind: SubscriptionKind,
    ) -> Result<Outcome> {
        let cmd = GattCfgSubscribeCmd::parse(data)?;
        if connections.get(&cmd.peer.address).is_none() {
            return Err(TesterError::NotConnected);
        }
        let requested = if cmd.enable { Some(kind) } else { None };
        host.configure_subscription(&cmd.peer, cmd.cccd_handle, requested)?;
        Ok(Outcome::Reply(Vec::new()))
    }

    // --- local database enumeration ---

    fn get_attributes(&mut self, data: &[u8]) -> Result<Outcome> {
        let cmd = GattGetAttributesCmd::parse(data)?;
        let database = self.enumeration_database();
        let attrs = database.attributes(cmd.start, cmd.end, cmd.type_filter.as_ref());

        let mut payload = vec![attrs.len() as u8];
        for attr in &attrs {
            payload.extend_from_slice(&attr.handle.to_le_bytes());
            payload.push(attr.permissions.bits());
            push_uuid(&mut payload, &attr.type_uuid);
        }
        Ok(Outcome::Reply(payload))
    }

    fn get_attribute_value(&mut self, data: &[u8]) -> Result<Outcome> {
        let cmd = GattGetAttributeValueCmd::parse(data)?;
        let database = self.enumeration_database();
        let value = database
            .value_at(cmd.handle)
            .ok_or(TesterError::UnknownHandle(cmd.handle))?;

        let mut payload = Vec::with_capacity(3 + value.len());
        payload.push(ATT_SUCCESS);
        payload.extend_from_slice(&(value.len() as u16).to_le_bytes());
        payload.extend_from_slice(&value);
        Ok(Outcome::Reply(payload))
    }

    // Enumeration covers the running server's database, or an equivalent
    // preview built from the committed declarations before start.
    fn enumeration_database(&self) -> GattDatabase {
        match &self.server {
            Some(server) => server.database().clone(),
            None => {
                let mut full = core_services("");
                full.extend(self.builtin.clone());
                full.extend(self.session.definitions());
                GattDatabase::build(&full)
            }
        }
    }

    // --- host completions and local server requests ---

    /// Completion of a remote read issued through `read`/`read_long`.
    pub fn on_read_completed(
        &mut self,
        peer: &Peer,
        result: HostResult<Vec<u8>>,
        connections: &mut ConnectionRegistry,
        sink: &mut dyn FrameSink,
    ) {
        let Some(opcode) = take_pending(connections, peer, true) else {
            warn!("read completion with no pending read from {}", peer.address);
            return;
        };
        match result {
            Ok(data) => {
                let mut payload = Vec::with_capacity(3 + data.len());
                payload.push(ATT_SUCCESS);
                payload.extend_from_slice(&(data.len() as u16).to_le_bytes());
                payload.extend_from_slice(&data);
                btp::send(sink, BTP_SERVICE_ID_GATT, opcode, CONTROLLER_INDEX, payload);
            }
            Err(err) => {
                warn!("remote read failed: {}", err);
                btp::send_status(
                    sink,
                    BTP_SERVICE_ID_GATT,
                    opcode,
                    CONTROLLER_INDEX,
                    BTP_STATUS_FAILED,
                );
            }
        }
    }

    /// Completion of a remote write issued through `write`/`write_long`.
    pub fn on_write_completed(
        &mut self,
        peer: &Peer,
        result: HostResult<()>,
        connections: &mut ConnectionRegistry,
        sink: &mut dyn FrameSink,
    ) {
        let Some(opcode) = take_pending(connections, peer, false) else {
            warn!("write completion with no pending write from {}", peer.address);
            return;
        };
        match result {
            Ok(()) => btp::send(
                sink,
                BTP_SERVICE_ID_GATT,
                opcode,
                CONTROLLER_INDEX,
                vec![ATT_SUCCESS],
            ),
            Err(err) => {
                warn!("remote write failed: {}", err);
                btp::send_status(
                    sink,
                    BTP_SERVICE_ID_GATT,
                    opcode,
                    CONTROLLER_INDEX,
                    BTP_STATUS_FAILED,
                );
            }
        }
    }

    /// A remote peer reads from the local server.
    pub fn on_local_read(&mut self, peer: &Peer, handle: u16, offset: u16, host: &mut dyn BleHost) {
        let Some(server) = &self.server else {
            respond(host, peer, ATT_ERROR_UNLIKELY, &[]);
            return;
        };
        match server.read(handle, offset) {
            Ok(value) => respond(host, peer, ATT_SUCCESS, &value),
            Err(err) => {
                warn!("local read of {:#06x} failed: {}", handle, err);
                respond(host, peer, att_error(&err), &[]);
            }
        }
    }

    /// A remote peer writes to the local server.
    #[allow(clippy::too_many_arguments)]
    pub fn on_local_write(
        &mut self,
        peer: &Peer,
        handle: u16,
        offset: u16,
        data: &[u8],
        prepared: bool,
        response_needed: bool,
        host: &mut dyn BleHost,
        sink: &mut dyn FrameSink,
    ) {
        let Some(server) = &mut self.server else {
            if response_needed {
                respond(host, peer, ATT_ERROR_UNLIKELY, &[]);
            }
            return;
        };
        match server.write(*peer, handle, offset, data, prepared) {
            Ok(outcome) => {
                if response_needed {
                    respond(host, peer, ATT_SUCCESS, &[]);
                }
                match outcome {
                    WriteOutcome::ValueChanged { handle, value } => {
                        EventEmitter::new(sink).attr_value_changed(handle, &value);
                    }
                    WriteOutcome::SubscriptionChanged { pushes } => {
                        push_notifications(host, &pushes);
                    }
                    WriteOutcome::Prepared => {}
                }
            }
            Err(err) => {
                warn!("local write to {:#06x} failed: {}", handle, err);
                if response_needed {
                    respond(host, peer, att_error(&err), &[]);
                }
            }
        }
    }

    /// A remote peer resolves its prepared writes.
    pub fn on_execute_write(
        &mut self,
        peer: &Peer,
        commit: bool,
        host: &mut dyn BleHost,
        sink: &mut dyn FrameSink,
    ) {
        let Some(server) = &mut self.server else {
            respond(host, peer, ATT_ERROR_UNLIKELY, &[]);
            return;
        };
        let changed = server.execute_write(peer, commit);
        respond(host, peer, ATT_SUCCESS, &[]);
        for (handle, value) in changed {
            EventEmitter::new(sink).attr_value_changed(handle, &value);
        }
    }

    /// Clears server-side state for a departing peer.
    pub fn forget_peer(&mut self, peer: &Peer) {
        if let Some(server) = &mut self.server {
            server.forget_peer(peer);
        }
    }
}

impl Default for GattService {
    fn default() -> Self {
        GattService::new()
    }
}

// ATT error code reported for a failed local-server request. A rejected CCCD
// mode and a bad CCCD length have dedicated codes; everything else collapses
// to "unlikely error".
fn att_error(err: &TesterError) -> u8 {
    match err {
        TesterError::NotSupported => ATT_ERROR_REQUEST_NOT_SUPPORTED,
        TesterError::MalformedPayload => ATT_ERROR_INVALID_ATTRIBUTE_LENGTH,
        _ => ATT_ERROR_UNLIKELY,
    }
}

fn respond(host: &mut dyn BleHost, peer: &Peer, status: u8, data: &[u8]) {
    if let Err(err) = host.send_attribute_response(peer, status, data) {
        warn!("failed to respond to {}: {}", peer.address, err);
    }
}

fn push_notifications(host: &mut dyn BleHost, targets: &[NotifyTarget]) {
    for target in targets {
        if let Err(err) = host.notify(&target.peer, target.value_handle, &target.value, target.kind)
        {
            warn!("failed to notify {}: {}", target.peer.address, err);
        }
    }
}

// The pending slot is claimed only once the host accepted the operation, so a
// synchronously rejected command leaves the connection idle.
fn ensure_idle(connections: &ConnectionRegistry, peer: &Peer) -> Result<()> {
    let conn = connections
        .get(&peer.address)
        .ok_or(TesterError::NotConnected)?;
    if conn.pending.is_some() {
        return Err(TesterError::OperationPending);
    }
    Ok(())
}

fn mark_pending(connections: &mut ConnectionRegistry, peer: &Peer, op: PendingOp) {
    if let Some(conn) = connections.get_mut(&peer.address) {
        conn.pending = Some(op);
    }
}

// Consumes the pending op if its kind matches the completion, returning the
// opcode the deferred reply must carry.
fn take_pending(
    connections: &mut ConnectionRegistry,
    peer: &Peer,
    read: bool,
) -> Option<u8> {
    let conn = connections.get_mut(&peer.address)?;
    let op = conn.pending?;
    if op.is_read() != read {
        return None;
    }
    conn.pending = None;
    Some(match op {
        PendingOp::Read => GATT_READ,
        PendingOp::ReadLong => GATT_READ_LONG,
        PendingOp::Write => GATT_WRITE,
        PendingOp::WriteLong => GATT_WRITE_LONG,
    })
}

// --- record encoders ---

fn push_uuid(out: &mut Vec<u8>, uuid: &Uuid) {
    let wire = uuid.to_wire();
    out.push(wire.len() as u8);
    out.extend_from_slice(&wire);
}

fn encode_services(services: &[&DbService]) -> Vec<u8> {
    let mut out = vec![services.len() as u8];
    for svc in services {
        out.extend_from_slice(&svc.start_handle.to_le_bytes());
        out.extend_from_slice(&svc.end_handle.to_le_bytes());
        push_uuid(&mut out, &svc.uuid);
    }
    out
}

fn encode_includes(includes: &[&DbInclude]) -> Vec<u8> {
    let mut out = vec![includes.len() as u8];
    for inc in includes {
        out.extend_from_slice(&inc.handle.to_le_bytes());
        out.extend_from_slice(&inc.start_handle.to_le_bytes());
        out.extend_from_slice(&inc.end_handle.to_le_bytes());
        push_uuid(&mut out, &inc.uuid);
    }
    out
}

fn encode_characteristics(characteristics: &[&DbCharacteristic]) -> Vec<u8> {
    let mut out = vec![characteristics.len() as u8];
    for chr in characteristics {
        out.extend_from_slice(&chr.declaration_handle.to_le_bytes());
        out.extend_from_slice(&chr.value_handle.to_le_bytes());
        out.push(chr.properties.bits());
        push_uuid(&mut out, &chr.uuid);
    }
    out
}

fn encode_descriptors(descriptors: &[&DbDescriptor]) -> Vec<u8> {
    let mut out = vec![descriptors.len() as u8];
    for dsc in descriptors {
        out.extend_from_slice(&dsc.handle.to_le_bytes());
        push_uuid(&mut out, &dsc.uuid);
    }
    out
}
