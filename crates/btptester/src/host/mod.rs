//! Abstract BLE host capability consumed by the tester.
//!
//! The tester never talks to a radio directly. Commands that need the
//! controller call into [`BleHost`]; everything asynchronous comes back as a
//! [`HostEvent`] which the caller feeds into
//! [`Tester::handle_host_event`](crate::tester::Tester::handle_host_event).

use thiserror::Error;

use crate::gap::types::{BdAddr, IoCapability, Peer};
use crate::gatt::types::ServiceDefinition;

/// Errors surfaced by a host implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("operation not supported by this host")]
    Unsupported,

    #[error("peer is not connected")]
    NotConnected,

    #[error("host operation failed: {0}")]
    Failed(String),
}

pub type HostResult<T> = std::result::Result<T, HostError>;

/// Subscription mode requested through a CCCD write or a config command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionKind {
    Notification,
    Indication,
}

/// The capability surface the tester needs from a BLE host stack.
///
/// Operations are fire-and-forget where the protocol expects a deferred
/// answer: `read_attribute`/`write_attribute` complete through
/// [`HostEvent::ReadCompleted`]/[`HostEvent::WriteCompleted`], discovery
/// results arrive as [`HostEvent::ServicesDiscovered`].
pub trait BleHost: Send {
    fn controller_address(&self) -> BdAddr;
    fn controller_name(&self) -> String;

    fn start_advertising(
        &mut self,
        adv_data: &[u8],
        scan_rsp: &[u8],
        connectable: bool,
    ) -> HostResult<()>;
    fn stop_advertising(&mut self) -> HostResult<()>;

    fn start_discovery(&mut self, active: bool) -> HostResult<()>;
    fn stop_discovery(&mut self) -> HostResult<()>;

    fn connect(&mut self, peer: &Peer) -> HostResult<()>;
    fn disconnect(&mut self, peer: &Peer) -> HostResult<()>;

    fn set_io_capability(&mut self, io_cap: IoCapability) -> HostResult<()>;
    fn pair(&mut self, peer: &Peer) -> HostResult<()>;
    fn unpair(&mut self, peer: &Peer) -> HostResult<()>;
    fn supply_passkey(&mut self, peer: &Peer, passkey: u32) -> HostResult<()>;
    fn confirm_passkey(&mut self, peer: &Peer, confirm: bool) -> HostResult<()>;

    /// Registers the local server database with the stack.
    fn register_services(&mut self, services: &[ServiceDefinition]) -> HostResult<()>;

    /// Issues a remote read; completes via [`HostEvent::ReadCompleted`].
    fn read_attribute(&mut self, peer: &Peer, handle: u16, offset: u16) -> HostResult<()>;

    /// Issues a remote write; completes via [`HostEvent::WriteCompleted`].
    fn write_attribute(
        &mut self,
        peer: &Peer,
        handle: u16,
        offset: u16,
        data: &[u8],
    ) -> HostResult<()>;

    /// Writes the remote CCCD behind `cccd_handle`. `None` disables.
    fn configure_subscription(
        &mut self,
        peer: &Peer,
        cccd_handle: u16,
        kind: Option<SubscriptionKind>,
    ) -> HostResult<()>;

    /// Answers a remote-initiated request against the local server.
    fn send_attribute_response(
        &mut self,
        peer: &Peer,
        status: u8,
        data: &[u8],
    ) -> HostResult<()>;

    /// Pushes a local value change to a subscribed peer.
    fn notify(
        &mut self,
        peer: &Peer,
        value_handle: u16,
        value: &[u8],
        kind: SubscriptionKind,
    ) -> HostResult<()>;
}

/// Asynchronous happenings pushed by the host implementation.
#[derive(Debug, Clone)]
pub enum HostEvent {
    /// Advertisement or scan response observed during discovery.
    DeviceFound {
        peer: Peer,
        rssi: i8,
        flags: u8,
        eir: Vec<u8>,
    },
    Connected {
        peer: Peer,
    },
    Disconnected {
        peer: Peer,
    },
    /// Full remote database snapshot after a discovery pass.
    ServicesDiscovered {
        peer: Peer,
        services: Vec<ServiceDefinition>,
    },
    ReadCompleted {
        peer: Peer,
        result: HostResult<Vec<u8>>,
    },
    WriteCompleted {
        peer: Peer,
        result: HostResult<()>,
    },
    /// Notification or indication received from a remote server.
    NotificationReceived {
        peer: Peer,
        kind: SubscriptionKind,
        handle: u16,
        data: Vec<u8>,
    },
    PasskeyDisplay {
        peer: Peer,
        passkey: u32,
    },
    PasskeyEntryRequest {
        peer: Peer,
    },
    PasskeyConfirmRequest {
        peer: Peer,
        passkey: u32,
    },
    PairingConsentRequest {
        peer: Peer,
    },
    SecurityLevelChanged {
        peer: Peer,
        level: u8,
    },
    ConnectionParamsUpdated {
        peer: Peer,
        interval: u16,
        latency: u16,
        timeout: u16,
    },
    /// Remote peer reads an attribute on the local server.
    AttributeReadRequest {
        peer: Peer,
        handle: u16,
        offset: u16,
    },
    /// Remote peer writes an attribute on the local server.
    AttributeWriteRequest {
        peer: Peer,
        handle: u16,
        offset: u16,
        data: Vec<u8>,
        prepared: bool,
        response_needed: bool,
    },
    /// Remote peer resolves its queued prepared writes.
    ExecuteWrite {
        peer: Peer,
        commit: bool,
    },
}
