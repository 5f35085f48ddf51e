//! The top-level BTP dispatcher.
//!
//! [`Tester`] sits between a transport (anything feeding it raw frames and
//! accepting reply frames) and a [`BleHost`] implementation. Inbound bytes go
//! through [`Tester::receive`]; host callbacks go through
//! [`Tester::handle_host_event`].

use log::{debug, warn};

use crate::btp::constants::*;
use crate::btp::{self, BtpMessage, FrameSink};
use crate::connection::ConnectionRegistry;
use crate::error::{Result, TesterError};
use crate::events::EventEmitter;
use crate::gap::GapService;
use crate::gatt::database::GattDatabase;
use crate::gatt::service::GattService;
use crate::host::{BleHost, HostEvent};

/// Opcodes the Core service routes.
const HANDLED_COMMANDS: &[u8] = &[
    CORE_READ_SUPPORTED_COMMANDS,
    CORE_READ_SUPPORTED_SERVICES,
    CORE_REGISTER_SERVICE,
    CORE_UNREGISTER_SERVICE,
];

fn supported_commands() -> Vec<u8> {
    let mut bitmap = vec![0u8; 1];
    for &opcode in HANDLED_COMMANDS {
        bitmap[(opcode / 8) as usize] |= 1 << (opcode % 8);
    }
    bitmap
}

fn supported_services() -> Vec<u8> {
    vec![
        (1 << BTP_SERVICE_ID_CORE) | (1 << BTP_SERVICE_ID_GAP) | (1 << BTP_SERVICE_ID_GATT),
    ]
}

/// The device-under-test side of a BTP session.
///
/// GAP and GATT start unregistered; commands for them answer NOT_READY until
/// the upper tester registers them through the Core service.
pub struct Tester<H: BleHost, S: FrameSink> {
    host: H,
    sink: S,
    gap: Option<GapService>,
    gatt: Option<GattService>,
    connections: ConnectionRegistry,
}

impl<H: BleHost, S: FrameSink> Tester<H, S> {
    pub fn new(host: H, sink: S) -> Self {
        Tester {
            host,
            sink,
            gap: None,
            gatt: None,
            connections: ConnectionRegistry::new(),
        }
    }

    /// Emits the IUT ready event. Call once the transport is up.
    pub fn announce_ready(&mut self) {
        EventEmitter::new(&mut self.sink).iut_ready();
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Handles one raw frame from the transport. Frames that fail to parse
    /// are dropped without a reply.
    pub fn receive(&mut self, bytes: &[u8]) {
        let message = match BtpMessage::parse(bytes) {
            Ok(message) => message,
            Err(err) => {
                debug!("dropping malformed frame: {}", err);
                return;
            }
        };
        debug!("rx {:?}", message);

        match message.service {
            BTP_SERVICE_ID_CORE => self.handle_core(&message),
            BTP_SERVICE_ID_GAP => match &mut self.gap {
                Some(gap) => gap.handle(
                    message.opcode,
                    message.index,
                    &message.data,
                    &mut self.host,
                    &mut self.sink,
                ),
                None => self.not_ready(&message),
            },
            BTP_SERVICE_ID_GATT => match &mut self.gatt {
                Some(gatt) => gatt.handle(
                    message.opcode,
                    message.index,
                    &message.data,
                    &mut self.connections,
                    &mut self.host,
                    &mut self.sink,
                ),
                None => self.not_ready(&message),
            },
            other => {
                warn!("frame for unknown service {:#04x}", other);
                btp::send_status(
                    &mut self.sink,
                    other,
                    message.opcode,
                    message.index,
                    BTP_STATUS_FAILED,
                );
            }
        }
    }

    fn not_ready(&mut self, message: &BtpMessage) {
        btp::send_status(
            &mut self.sink,
            message.service,
            message.opcode,
            message.index,
            BTP_STATUS_NOT_READY,
        );
    }

    // Core frames always carry the non-controller index.
    fn handle_core(&mut self, message: &BtpMessage) {
        if message.index != BTP_INDEX_NONE {
            btp::send_status(
                &mut self.sink,
                BTP_SERVICE_ID_CORE,
                message.opcode,
                message.index,
                BTP_STATUS_FAILED,
            );
            return;
        }

        let result = match message.opcode {
            CORE_READ_SUPPORTED_COMMANDS => Ok(supported_commands()),
            CORE_READ_SUPPORTED_SERVICES => Ok(supported_services()),
            CORE_REGISTER_SERVICE => self.register_service(&message.data),
            CORE_UNREGISTER_SERVICE => self.unregister_service(&message.data),
            _ => Err(TesterError::UnknownCommand {
                service: BTP_SERVICE_ID_CORE,
                opcode: message.opcode,
            }),
        };

        match result {
            Ok(payload) => btp::send(
                &mut self.sink,
                BTP_SERVICE_ID_CORE,
                message.opcode,
                BTP_INDEX_NONE,
                payload,
            ),
            Err(err) => {
                warn!("Core command {:#04x} failed: {}", message.opcode, err);
                btp::send_status(
                    &mut self.sink,
                    BTP_SERVICE_ID_CORE,
                    message.opcode,
                    BTP_INDEX_NONE,
                    err.status(),
                );
            }
        }
    }

    fn register_service(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        let id = *data.first().ok_or(TesterError::MalformedPayload)?;
        match id {
            BTP_SERVICE_ID_GAP => {
                if self.gap.is_some() {
                    return Err(TesterError::MalformedPayload);
                }
                self.gap = Some(GapService::new());
            }
            BTP_SERVICE_ID_GATT => {
                if self.gatt.is_some() {
                    return Err(TesterError::MalformedPayload);
                }
                self.gatt = Some(GattService::new());
            }
            _ => return Err(TesterError::MalformedPayload),
        }
        Ok(Vec::new())
    }

    fn unregister_service(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        let id = *data.first().ok_or(TesterError::MalformedPayload)?;
        match id {
            BTP_SERVICE_ID_GAP => {
                self.gap
                    .take()
                    .ok_or(TesterError::ServiceNotRegistered(id))?;
            }
            BTP_SERVICE_ID_GATT => {
                self.gatt
                    .take()
                    .ok_or(TesterError::ServiceNotRegistered(id))?;
            }
            _ => return Err(TesterError::MalformedPayload),
        }
        Ok(Vec::new())
    }

    /// Feeds one host callback into the session: updates connection state,
    /// resolves deferred replies, and emits the matching events.
    pub fn handle_host_event(&mut self, event: HostEvent) {
        match event {
            HostEvent::DeviceFound {
                peer,
                rssi,
                flags,
                eir,
            } => EventEmitter::new(&mut self.sink).device_found(&peer, rssi, flags, &eir),
            HostEvent::Connected { peer } => {
                self.connections.insert(peer);
                EventEmitter::new(&mut self.sink).device_connected(&peer);
            }
            HostEvent::Disconnected { peer } => {
                if let Some(gatt) = &mut self.gatt {
                    gatt.forget_peer(&peer);
                }
                if self.connections.remove(&peer.address).is_none() {
                    warn!("disconnect for unknown peer {}", peer.address);
                }
                EventEmitter::new(&mut self.sink).device_disconnected(&peer);
            }
            HostEvent::ServicesDiscovered { peer, services } => {
                match self.connections.get_mut(&peer.address) {
                    Some(conn) => conn.database = GattDatabase::build(&services),
                    None => warn!("discovery result for unknown peer {}", peer.address),
                }
            }
            HostEvent::ReadCompleted { peer, result } => {
                if let Some(gatt) = &mut self.gatt {
                    gatt.on_read_completed(&peer, result, &mut self.connections, &mut self.sink);
                }
            }
            HostEvent::WriteCompleted { peer, result } => {
                if let Some(gatt) = &mut self.gatt {
                    gatt.on_write_completed(&peer, result, &mut self.connections, &mut self.sink);
                }
            }
            HostEvent::NotificationReceived {
                peer,
                kind,
                handle,
                data,
            } => EventEmitter::new(&mut self.sink).notification(&peer, kind, handle, &data),
            HostEvent::PasskeyDisplay { peer, passkey } => {
                EventEmitter::new(&mut self.sink).passkey_display(&peer, passkey)
            }
            HostEvent::PasskeyEntryRequest { peer } => {
                EventEmitter::new(&mut self.sink).passkey_entry_request(&peer)
            }
            HostEvent::PasskeyConfirmRequest { peer, passkey } => {
                EventEmitter::new(&mut self.sink).passkey_confirm_request(&peer, passkey)
            }
            HostEvent::PairingConsentRequest { peer } => {
                EventEmitter::new(&mut self.sink).pairing_consent_request(&peer)
            }
            HostEvent::SecurityLevelChanged { peer, level } => {
                EventEmitter::new(&mut self.sink).sec_level_changed(&peer, level)
            }
            HostEvent::ConnectionParamsUpdated {
                peer,
                interval,
                latency,
                timeout,
            } => EventEmitter::new(&mut self.sink)
                .conn_param_update(&peer, interval, latency, timeout),
            HostEvent::AttributeReadRequest {
                peer,
                handle,
                offset,
            } => {
                if let Some(gatt) = &mut self.gatt {
                    gatt.on_local_read(&peer, handle, offset, &mut self.host);
                }
            }
            HostEvent::AttributeWriteRequest {
                peer,
                handle,
                offset,
                data,
                prepared,
                response_needed,
            } => {
                if let Some(gatt) = &mut self.gatt {
                    gatt.on_local_write(
                        &peer,
                        handle,
                        offset,
                        &data,
                        prepared,
                        response_needed,
                        &mut self.host,
                        &mut self.sink,
                    );
                }
            }
            HostEvent::ExecuteWrite { peer, commit } => {
                if let Some(gatt) = &mut self.gatt {
                    gatt.on_execute_write(&peer, commit, &mut self.host, &mut self.sink);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btp::constants::HDR_LEN;
    use crate::gap::constants::GAP_READ_SUPPORTED_COMMANDS;
    use crate::gap::types::{AddressType, BdAddr, IoCapability, Peer};
    use crate::gatt::types::ServiceDefinition;
    use crate::host::{HostResult, SubscriptionKind};

    struct NullHost;

    impl BleHost for NullHost {
        fn controller_address(&self) -> BdAddr {
            BdAddr::new([0x01, 0x02, 0x03, 0x04, 0x05, 0x06])
        }
        fn controller_name(&self) -> String {
            "tester".to_string()
        }
        fn start_advertising(&mut self, _: &[u8], _: &[u8], _: bool) -> HostResult<()> {
            Ok(())
        }
        fn stop_advertising(&mut self) -> HostResult<()> {
            Ok(())
        }
        fn start_discovery(&mut self, _: bool) -> HostResult<()> {
            Ok(())
        }
        fn stop_discovery(&mut self) -> HostResult<()> {
            Ok(())
        }
        fn connect(&mut self, _: &Peer) -> HostResult<()> {
            Ok(())
        }
        fn disconnect(&mut self, _: &Peer) -> HostResult<()> {
            Ok(())
        }
        fn set_io_capability(&mut self, _: IoCapability) -> HostResult<()> {
            Ok(())
        }
        fn pair(&mut self, _: &Peer) -> HostResult<()> {
            Ok(())
        }
        fn unpair(&mut self, _: &Peer) -> HostResult<()> {
            Ok(())
        }
        fn supply_passkey(&mut self, _: &Peer, _: u32) -> HostResult<()> {
            Ok(())
        }
        fn confirm_passkey(&mut self, _: &Peer, _: bool) -> HostResult<()> {
            Ok(())
        }
        fn register_services(&mut self, _: &[ServiceDefinition]) -> HostResult<()> {
            Ok(())
        }
        fn read_attribute(&mut self, _: &Peer, _: u16, _: u16) -> HostResult<()> {
            Ok(())
        }
        fn write_attribute(&mut self, _: &Peer, _: u16, _: u16, _: &[u8]) -> HostResult<()> {
            Ok(())
        }
        fn configure_subscription(
            &mut self,
            _: &Peer,
            _: u16,
            _: Option<SubscriptionKind>,
        ) -> HostResult<()> {
            Ok(())
        }
        fn send_attribute_response(&mut self, _: &Peer, _: u8, _: &[u8]) -> HostResult<()> {
            Ok(())
        }
        fn notify(&mut self, _: &Peer, _: u16, _: &[u8], _: SubscriptionKind) -> HostResult<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct VecSink {
        frames: Vec<BtpMessage>,
    }

    impl FrameSink for VecSink {
        fn send(&mut self, message: &BtpMessage) -> std::io::Result<()> {
            self.frames.push(message.clone());
            Ok(())
        }
    }

    fn tester() -> Tester<NullHost, VecSink> {
        Tester::new(NullHost, VecSink::default())
    }

    fn frame(service: u8, opcode: u8, index: u8, data: &[u8]) -> Vec<u8> {
        BtpMessage::new(service, opcode, index, data.to_vec()).to_bytes()
    }

    #[test]
    fn malformed_frames_are_dropped_silently() {
        let mut t = tester();
        t.receive(&[0x00, 0x01]);
        // Declared length larger than available bytes.
        t.receive(&[0x00, 0x01, 0xff, 0x10, 0x00]);
        assert!(t.sink_mut().frames.is_empty());
    }

    #[test]
    fn core_reports_supported_services_and_commands() {
        let mut t = tester();
        t.receive(&frame(
            BTP_SERVICE_ID_CORE,
            CORE_READ_SUPPORTED_SERVICES,
            BTP_INDEX_NONE,
            &[],
        ));
        assert_eq!(t.sink_mut().frames[0].data, vec![0b0000_0111]);

        t.receive(&frame(
            BTP_SERVICE_ID_CORE,
            CORE_READ_SUPPORTED_COMMANDS,
            BTP_INDEX_NONE,
            &[],
        ));
        assert_eq!(t.sink_mut().frames[1].data, vec![0b0001_1110]);
        assert_eq!(t.sink_mut().frames[1].index, BTP_INDEX_NONE);
    }

    #[test]
    fn core_requires_index_none() {
        let mut t = tester();
        t.receive(&frame(
            BTP_SERVICE_ID_CORE,
            CORE_READ_SUPPORTED_SERVICES,
            CONTROLLER_INDEX,
            &[],
        ));
        assert_eq!(t.sink_mut().frames[0].data, vec![BTP_STATUS_FAILED]);
    }

    #[test]
    fn gap_commands_need_registration_first() {
        let mut t = tester();
        t.receive(&frame(
            BTP_SERVICE_ID_GAP,
            GAP_READ_SUPPORTED_COMMANDS,
            BTP_INDEX_NONE,
            &[],
        ));
        assert_eq!(t.sink_mut().frames[0].data, vec![BTP_STATUS_NOT_READY]);

        t.receive(&frame(
            BTP_SERVICE_ID_CORE,
            CORE_REGISTER_SERVICE,
            BTP_INDEX_NONE,
            &[BTP_SERVICE_ID_GAP],
        ));
        assert!(t.sink_mut().frames[1].data.is_empty());

        t.receive(&frame(
            BTP_SERVICE_ID_GAP,
            GAP_READ_SUPPORTED_COMMANDS,
            BTP_INDEX_NONE,
            &[],
        ));
        assert_eq!(t.sink_mut().frames[2].data.len(), 3);
    }

    #[test]
    fn double_registration_fails() {
        let mut t = tester();
        let register = frame(
            BTP_SERVICE_ID_CORE,
            CORE_REGISTER_SERVICE,
            BTP_INDEX_NONE,
            &[BTP_SERVICE_ID_GATT],
        );
        t.receive(&register);
        t.receive(&register);
        assert!(t.sink_mut().frames[0].data.is_empty());
        assert_eq!(t.sink_mut().frames[1].data, vec![BTP_STATUS_FAILED]);
    }

    #[test]
    fn unregister_returns_service_to_not_ready() {
        let mut t = tester();
        t.receive(&frame(
            BTP_SERVICE_ID_CORE,
            CORE_REGISTER_SERVICE,
            BTP_INDEX_NONE,
            &[BTP_SERVICE_ID_GAP],
        ));
        t.receive(&frame(
            BTP_SERVICE_ID_CORE,
            CORE_UNREGISTER_SERVICE,
            BTP_INDEX_NONE,
            &[BTP_SERVICE_ID_GAP],
        ));
        assert!(t.sink_mut().frames[1].data.is_empty());

        t.receive(&frame(
            BTP_SERVICE_ID_GAP,
            GAP_READ_SUPPORTED_COMMANDS,
            BTP_INDEX_NONE,
            &[],
        ));
        assert_eq!(t.sink_mut().frames[2].data, vec![BTP_STATUS_NOT_READY]);
    }

    #[test]
    fn unregister_without_registration_is_not_ready() {
        let mut t = tester();
        t.receive(&frame(
            BTP_SERVICE_ID_CORE,
            CORE_UNREGISTER_SERVICE,
            BTP_INDEX_NONE,
            &[BTP_SERVICE_ID_GATT],
        ));
        assert_eq!(t.sink_mut().frames[0].data, vec![BTP_STATUS_NOT_READY]);
    }

    #[test]
    fn unknown_core_opcode_is_unknown_command() {
        let mut t = tester();
        t.receive(&frame(BTP_SERVICE_ID_CORE, 0x55, BTP_INDEX_NONE, &[]));
        assert_eq!(t.sink_mut().frames[0].data, vec![BTP_STATUS_UNKNOWN_CMD]);
    }

    #[test]
    fn unknown_service_fails() {
        let mut t = tester();
        t.receive(&frame(0x09, 0x01, BTP_INDEX_NONE, &[]));
        assert_eq!(t.sink_mut().frames[0].data, vec![BTP_STATUS_FAILED]);
        assert_eq!(t.sink_mut().frames[0].service, 0x09);
    }

    #[test]
    fn announce_ready_emits_core_event() {
        let mut t = tester();
        t.announce_ready();
        let ev = &t.sink_mut().frames[0];
        assert_eq!(ev.service, BTP_SERVICE_ID_CORE);
        assert_eq!(ev.opcode, CORE_EV_IUT_READY);
        assert_eq!(ev.index, BTP_INDEX_NONE);
        assert!(ev.data.is_empty());
        assert_eq!(ev.to_bytes().len(), HDR_LEN);
    }

    #[test]
    fn connect_and_disconnect_events_track_connections() {
        let mut t = tester();
        let peer = Peer::new(AddressType::Public, BdAddr::new([1, 2, 3, 4, 5, 6]));
        t.handle_host_event(HostEvent::Connected { peer });
        assert!(!t.connections.is_empty());
        assert_eq!(t.sink_mut().frames[0].opcode, 0x82);
        assert_eq!(t.sink_mut().frames[0].data[1..7], [1, 2, 3, 4, 5, 6]);

        t.handle_host_event(HostEvent::Disconnected { peer });
        assert!(t.connections.is_empty());
        assert_eq!(t.sink_mut().frames[1].opcode, 0x83);
    }
}
