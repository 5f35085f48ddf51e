//! GAP service command handling.

use log::{debug, warn};

use crate::btp::constants::{
    BTP_INDEX_NONE, BTP_SERVICE_ID_GAP, BTP_STATUS_FAILED, CONTROLLER_INDEX,
};
use crate::btp::{self, FrameSink};
use crate::error::{Result, TesterError};
use crate::host::BleHost;

use super::constants::*;
use super::types::*;

/// Opcodes this dispatcher routes; the supported-commands bitmap is derived
/// from exactly this list.
const HANDLED_COMMANDS: &[u8] = &[
    GAP_READ_SUPPORTED_COMMANDS,
    GAP_READ_CONTROLLER_INDEX_LIST,
    GAP_READ_CONTROLLER_INFO,
    GAP_SET_CONNECTABLE,
    GAP_SET_DISCOVERABLE,
    GAP_START_ADVERTISING,
    GAP_STOP_ADVERTISING,
    GAP_START_DISCOVERY,
    GAP_STOP_DISCOVERY,
    GAP_CONNECT,
    GAP_DISCONNECT,
    GAP_SET_IO_CAP,
    GAP_PAIR,
    GAP_UNPAIR,
    GAP_PASSKEY_ENTRY,
    GAP_PASSKEY_CONFIRM,
];

fn supported_commands() -> Vec<u8> {
    let mut bitmap = vec![0u8; 3];
    for &opcode in HANDLED_COMMANDS {
        bitmap[(opcode / 8) as usize] |= 1 << (opcode % 8);
    }
    bitmap
}

/// Controller-facing GAP state: settings bitmaps and pairing IO capability.
pub struct GapService {
    current_settings: Settings,
    supported_settings: Settings,
    io_cap: IoCapability,
}

impl GapService {
    pub fn new() -> Self {
        let supported_settings = Settings::from_bits(&[
            GAP_SETTINGS_POWERED,
            GAP_SETTINGS_CONNECTABLE,
            GAP_SETTINGS_DISCOVERABLE,
            GAP_SETTINGS_BONDABLE,
            GAP_SETTINGS_LE,
            GAP_SETTINGS_ADVERTISING,
            GAP_SETTINGS_PRIVACY,
            GAP_SETTINGS_STATIC_ADDRESS,
        ]);
        let current_settings = Settings::from_bits(&[
            GAP_SETTINGS_POWERED,
            GAP_SETTINGS_BONDABLE,
            GAP_SETTINGS_LE,
            GAP_SETTINGS_DISCOVERABLE,
            GAP_SETTINGS_PRIVACY,
        ]);
        GapService {
            current_settings,
            supported_settings,
            io_cap: IoCapability::NoInputOutput,
        }
    }

    pub fn current_settings(&self) -> Settings {
        self.current_settings
    }

    pub fn io_capability(&self) -> IoCapability {
        self.io_cap
    }

    /// Routes one GAP command frame. Enumeration opcodes must arrive with the
    /// non-controller index; everything else is bound to controller 0.
    pub fn handle(
        &mut self,
        opcode: u8,
        index: u8,
        data: &[u8],
        host: &mut dyn BleHost,
        sink: &mut dyn FrameSink,
    ) {
        debug!("GAP command {:#04x} index {:#04x}", opcode, index);

        let enumeration = matches!(
            opcode,
            GAP_READ_SUPPORTED_COMMANDS | GAP_READ_CONTROLLER_INDEX_LIST
        );
        let index_ok = if enumeration {
            index == BTP_INDEX_NONE
        } else {
            index == CONTROLLER_INDEX
        };
        if !index_ok {
            btp::send_status(sink, BTP_SERVICE_ID_GAP, opcode, index, BTP_STATUS_FAILED);
            return;
        }

        let result = match opcode {
            GAP_READ_SUPPORTED_COMMANDS => Ok(supported_commands()),
            GAP_READ_CONTROLLER_INDEX_LIST => Ok(vec![1, CONTROLLER_INDEX]),
            GAP_READ_CONTROLLER_INFO => self.read_controller_info(host),
            GAP_SET_CONNECTABLE => self.set_connectable(data),
            GAP_SET_DISCOVERABLE => self.set_discoverable(data),
            GAP_START_ADVERTISING => self.start_advertising(data, host),
            GAP_STOP_ADVERTISING => self.stop_advertising(host),
            GAP_START_DISCOVERY => self.start_discovery(data, host),
            GAP_STOP_DISCOVERY => self.stop_discovery(host),
            GAP_CONNECT => self.connect(data, host),
            GAP_DISCONNECT => self.disconnect(data, host),
            GAP_SET_IO_CAP => self.set_io_cap(data, host),
            GAP_PAIR => self.pair(data, host),
            GAP_UNPAIR => self.unpair(data, host),
            GAP_PASSKEY_ENTRY => self.passkey_entry(data, host),
            GAP_PASSKEY_CONFIRM => self.passkey_confirm(data, host),
            _ => Err(TesterError::UnknownCommand {
                service: BTP_SERVICE_ID_GAP,
                opcode,
            }),
        };

        match result {
            Ok(payload) => btp::send(sink, BTP_SERVICE_ID_GAP, opcode, CONTROLLER_INDEX, payload),
            Err(err) => {
                warn!("GAP command {:#04x} failed: {}", opcode, err);
                btp::send_status(
                    sink,
                    BTP_SERVICE_ID_GAP,
                    opcode,
                    CONTROLLER_INDEX,
                    err.status(),
                );
            }
        }
    }

    fn read_controller_info(&self, host: &mut dyn BleHost) -> Result<Vec<u8>> {
        let rp = GapReadControllerInfoRp {
            address: host.controller_address(),
            supported_settings: self.supported_settings,
            current_settings: self.current_settings,
            cod: [0; 3],
            name: host.controller_name(),
        };
        Ok(rp.to_bytes())
    }

    fn settings_reply(&self) -> Vec<u8> {
        self.current_settings.to_le_bytes().to_vec()
    }

    fn set_connectable(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        let cmd = GapSetConnectableCmd::parse(data)?;
        if cmd.connectable {
            self.current_settings.set(GAP_SETTINGS_CONNECTABLE);
        } else {
            self.current_settings.clear(GAP_SETTINGS_CONNECTABLE);
        }
        Ok(self.settings_reply())
    }

    // Only general discoverability is supported.
    fn set_discoverable(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        let cmd = GapSetDiscoverableCmd::parse(data)?;
        match cmd.discoverable {
            GAP_GENERAL_DISCOVERABLE => {
                self.current_settings.set(GAP_SETTINGS_DISCOVERABLE);
                Ok(self.settings_reply())
            }
            _ => Err(TesterError::MalformedPayload),
        }
    }

    fn start_advertising(&mut self, data: &[u8], host: &mut dyn BleHost) -> Result<Vec<u8>> {
        let cmd = GapStartAdvertisingCmd::parse(data)?;
        let connectable = self.current_settings.is_set(GAP_SETTINGS_CONNECTABLE);
        host.start_advertising(&cmd.adv_data, &cmd.scan_rsp, connectable)?;
        self.current_settings.set(GAP_SETTINGS_ADVERTISING);
        Ok(self.settings_reply())
    }

    fn stop_advertising(&mut self, host: &mut dyn BleHost) -> Result<Vec<u8>> {
        host.stop_advertising()?;
        self.current_settings.clear(GAP_SETTINGS_ADVERTISING);
        Ok(self.settings_reply())
    }

    fn start_discovery(&mut self, data: &[u8], host: &mut dyn BleHost) -> Result<Vec<u8>> {
        let cmd = GapStartDiscoveryCmd::parse(data)?;
        host.start_discovery(cmd.active())?;
        Ok(Vec::new())
    }

    fn stop_discovery(&mut self, host: &mut dyn BleHost) -> Result<Vec<u8>> {
        host.stop_discovery()?;
        Ok(Vec::new())
    }

    fn connect(&mut self, data: &[u8], host: &mut dyn BleHost) -> Result<Vec<u8>> {
        let cmd = GapAddressCmd::parse(data)?;
        host.connect(&cmd.peer)?;
        Ok(Vec::new())
    }

    fn disconnect(&mut self, data: &[u8], host: &mut dyn BleHost) -> Result<Vec<u8>> {
        let cmd = GapAddressCmd::parse(data)?;
        host.disconnect(&cmd.peer)?;
        Ok(Vec::new())
    }

    fn set_io_cap(&mut self, data: &[u8], host: &mut dyn BleHost) -> Result<Vec<u8>> {
        let cmd = GapSetIoCapCmd::parse(data)?;
        host.set_io_capability(cmd.io_cap)?;
        self.io_cap = cmd.io_cap;
        Ok(Vec::new())
    }

    fn pair(&mut self, data: &[u8], host: &mut dyn BleHost) -> Result<Vec<u8>> {
        let cmd = GapAddressCmd::parse(data)?;
        host.pair(&cmd.peer)?;
        Ok(Vec::new())
    }

    fn unpair(&mut self, data: &[u8], host: &mut dyn BleHost) -> Result<Vec<u8>> {
        let cmd = GapAddressCmd::parse(data)?;
        host.unpair(&cmd.peer)?;
        Ok(Vec::new())
    }

    fn passkey_entry(&mut self, data: &[u8], host: &mut dyn BleHost) -> Result<Vec<u8>> {
        let cmd = GapPasskeyEntryCmd::parse(data)?;
        host.supply_passkey(&cmd.peer, cmd.passkey)?;
        Ok(Vec::new())
    }

    fn passkey_confirm(&mut self, data: &[u8], host: &mut dyn BleHost) -> Result<Vec<u8>> {
        let cmd = GapPasskeyConfirmCmd::parse(data)?;
        host.confirm_passkey(&cmd.peer, cmd.matches)?;
        Ok(Vec::new())
    }
}

impl Default for GapService {
    fn default() -> Self {
        GapService::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btp::constants::BTP_STATUS_UNKNOWN_CMD;
    use crate::btp::BtpMessage;
    use crate::host::{HostResult, SubscriptionKind};
    use crate::gatt::types::ServiceDefinition;

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

    #[test]
    fn supported_commands_bitmap_covers_routed_opcodes() {
        let bitmap = supported_commands();
        for &opcode in HANDLED_COMMANDS {
            assert_ne!(
                bitmap[(opcode / 8) as usize] & (1 << (opcode % 8)),
                0,
                "missing bit for opcode {:#04x}",
                opcode
            );
        }
        // Unrouted opcode 0x04 stays clear.
        assert_eq!(bitmap[0] & (1 << 4), 0);
    }

    #[test]
    fn enumeration_opcode_requires_index_none() {
        let mut gap = GapService::new();
        let mut sink = VecSink::default();
        gap.handle(
            GAP_READ_SUPPORTED_COMMANDS,
            CONTROLLER_INDEX,
            &[],
            &mut NullHost,
            &mut sink,
        );
        assert_eq!(sink.frames[0].data, vec![BTP_STATUS_FAILED]);

        gap.handle(
            GAP_READ_SUPPORTED_COMMANDS,
            BTP_INDEX_NONE,
            &[],
            &mut NullHost,
            &mut sink,
        );
        assert_eq!(sink.frames[1].data, supported_commands());
    }

    #[test]
    fn regular_opcode_requires_controller_index() {
        let mut gap = GapService::new();
        let mut sink = VecSink::default();
        gap.handle(
            GAP_SET_CONNECTABLE,
            BTP_INDEX_NONE,
            &[0x01],
            &mut NullHost,
            &mut sink,
        );
        assert_eq!(sink.frames[0].data, vec![BTP_STATUS_FAILED]);
    }

    #[test]
    fn set_connectable_flips_settings_bit() {
        let mut gap = GapService::new();
        let mut sink = VecSink::default();
        gap.handle(
            GAP_SET_CONNECTABLE,
            CONTROLLER_INDEX,
            &[0x01],
            &mut NullHost,
            &mut sink,
        );
        assert!(gap.current_settings().is_set(GAP_SETTINGS_CONNECTABLE));
        assert_eq!(
            sink.frames[0].data,
            gap.current_settings().to_le_bytes().to_vec()
        );

        gap.handle(
            GAP_SET_CONNECTABLE,
            CONTROLLER_INDEX,
            &[0x00],
            &mut NullHost,
            &mut sink,
        );
        assert!(!gap.current_settings().is_set(GAP_SETTINGS_CONNECTABLE));
    }

    #[test]
    fn limited_discoverable_is_rejected() {
        let mut gap = GapService::new();
        let mut sink = VecSink::default();
        gap.handle(
            GAP_SET_DISCOVERABLE,
            CONTROLLER_INDEX,
            &[GAP_LIMITED_DISCOVERABLE],
            &mut NullHost,
            &mut sink,
        );
        assert_eq!(sink.frames[0].data, vec![BTP_STATUS_FAILED]);
    }

    #[test]
    fn unknown_opcode_reports_unknown_command() {
        let mut gap = GapService::new();
        let mut sink = VecSink::default();
        gap.handle(0x3f, CONTROLLER_INDEX, &[], &mut NullHost, &mut sink);
        assert_eq!(sink.frames[0].data, vec![BTP_STATUS_UNKNOWN_CMD]);
    }

    #[test]
    fn connect_replies_with_empty_success() {
        let mut gap = GapService::new();
        let mut sink = VecSink::default();
        let payload = [0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06];
        gap.handle(
            GAP_CONNECT,
            CONTROLLER_INDEX,
            &payload,
            &mut NullHost,
            &mut sink,
        );
        // An empty payload is the SUCCESS shape.
        assert!(sink.frames[0].data.is_empty());
        assert_eq!(sink.frames[0].opcode, GAP_CONNECT);
    }
}
