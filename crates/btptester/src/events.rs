//! Unsolicited BTP event frames.
//!
//! Every emitter builds the event payload and pushes one frame through the
//! sink. Events for a controller carry index 0; the ready event carries the
//! non-controller index.

use crate::btp::constants::{
    BTP_INDEX_NONE, BTP_SERVICE_ID_CORE, BTP_SERVICE_ID_GAP, BTP_SERVICE_ID_GATT,
    CONTROLLER_INDEX, CORE_EV_IUT_READY,
};
use crate::btp::{self, FrameSink};
use crate::gap::constants::*;
use crate::gap::types::Peer;
use crate::gatt::constants::{GATT_EV_ATTR_VALUE_CHANGED, GATT_EV_NOTIFICATION};
use crate::host::SubscriptionKind;

/// Builds and sends unsolicited event frames.
pub struct EventEmitter<'a> {
    sink: &'a mut dyn FrameSink,
}

impl<'a> EventEmitter<'a> {
    pub fn new(sink: &'a mut dyn FrameSink) -> Self {
        EventEmitter { sink }
    }

    fn gap_event(&mut self, opcode: u8, payload: Vec<u8>) {
        btp::send(
            self.sink,
            BTP_SERVICE_ID_GAP,
            opcode,
            CONTROLLER_INDEX,
            payload,
        );
    }

    /// Announces the IUT is up; sent once the transport connects.
    pub fn iut_ready(&mut self) {
        btp::send(
            self.sink,
            BTP_SERVICE_ID_CORE,
            CORE_EV_IUT_READY,
            BTP_INDEX_NONE,
            Vec::new(),
        );
    }

    pub fn device_found(&mut self, peer: &Peer, rssi: i8, flags: u8, eir: &[u8]) {
        let mut payload = Vec::with_capacity(11 + eir.len());
        peer.write_to(&mut payload);
        payload.push(rssi as u8);
        payload.push(flags);
        payload.extend_from_slice(&(eir.len() as u16).to_le_bytes());
        payload.extend_from_slice(eir);
        self.gap_event(GAP_EV_DEVICE_FOUND, payload);
    }

    pub fn device_connected(&mut self, peer: &Peer) {
        let mut payload = Vec::with_capacity(7);
        peer.write_to(&mut payload);
        self.gap_event(GAP_EV_DEVICE_CONNECTED, payload);
    }

    pub fn device_disconnected(&mut self, peer: &Peer) {
        let mut payload = Vec::with_capacity(7);
        peer.write_to(&mut payload);
        self.gap_event(GAP_EV_DEVICE_DISCONNECTED, payload);
    }

    pub fn passkey_display(&mut self, peer: &Peer, passkey: u32) {
        let mut payload = Vec::with_capacity(11);
        peer.write_to(&mut payload);
        payload.extend_from_slice(&passkey.to_le_bytes());
        self.gap_event(GAP_EV_PASSKEY_DISPLAY, payload);
    }

    pub fn passkey_entry_request(&mut self, peer: &Peer) {
        let mut payload = Vec::with_capacity(7);
        peer.write_to(&mut payload);
        self.gap_event(GAP_EV_PASSKEY_ENTRY_REQ, payload);
    }

    pub fn passkey_confirm_request(&mut self, peer: &Peer, passkey: u32) {
        let mut payload = Vec::with_capacity(11);
        peer.write_to(&mut payload);
        payload.extend_from_slice(&passkey.to_le_bytes());
        self.gap_event(GAP_EV_PASSKEY_CONFIRM_REQ, payload);
    }

    pub fn pairing_consent_request(&mut self, peer: &Peer) {
        let mut payload = Vec::with_capacity(7);
        peer.write_to(&mut payload);
        self.gap_event(GAP_EV_PAIRING_CONSENT_REQ, payload);
    }

    pub fn sec_level_changed(&mut self, peer: &Peer, level: u8) {
        let mut payload = Vec::with_capacity(8);
        peer.write_to(&mut payload);
        payload.push(level);
        self.gap_event(GAP_EV_SEC_LEVEL_CHANGED, payload);
    }

    pub fn conn_param_update(&mut self, peer: &Peer, interval: u16, latency: u16, timeout: u16) {
        let mut payload = Vec::with_capacity(13);
        peer.write_to(&mut payload);
        payload.extend_from_slice(&interval.to_le_bytes());
        payload.extend_from_slice(&latency.to_le_bytes());
        payload.extend_from_slice(&timeout.to_le_bytes());
        self.gap_event(GAP_EV_CONN_PARAM_UPDATE, payload);
    }

    /// Notification/indication received from a remote server.
    pub fn notification(&mut self, peer: &Peer, kind: SubscriptionKind, handle: u16, data: &[u8]) {
        let kind_byte = match kind {
            SubscriptionKind::Notification => 0x01,
            SubscriptionKind::Indication => 0x02,
        };
        let mut payload = Vec::with_capacity(12 + data.len());
        peer.write_to(&mut payload);
        payload.push(kind_byte);
        payload.extend_from_slice(&handle.to_le_bytes());
        payload.extend_from_slice(&(data.len() as u16).to_le_bytes());
        payload.extend_from_slice(data);
        btp::send(
            self.sink,
            BTP_SERVICE_ID_GATT,
            GATT_EV_NOTIFICATION,
            CONTROLLER_INDEX,
            payload,
        );
    }

    /// A value on the local server changed through a committed remote write.
    pub fn attr_value_changed(&mut self, handle: u16, data: &[u8]) {
        let mut payload = Vec::with_capacity(4 + data.len());
        payload.extend_from_slice(&handle.to_le_bytes());
        payload.extend_from_slice(&(data.len() as u16).to_le_bytes());
        payload.extend_from_slice(data);
        btp::send(
            self.sink,
            BTP_SERVICE_ID_GATT,
            GATT_EV_ATTR_VALUE_CHANGED,
            CONTROLLER_INDEX,
            payload,
        );
    }
}
