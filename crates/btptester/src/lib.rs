//! BTP tester backend for BLE conformance testing.
//!
//! This library implements the device-under-test side of the Bluetooth Test
//! Protocol (BTP): frame codec, Core/GAP/GATT command dispatch, a local GATT
//! server with a flattened attribute database, and event emission toward the
//! test driver. The radio is consumed through the [`host::BleHost`] capability
//! trait, so the library stays independent of any particular BLE stack or
//! transport.
//!
//! A caller wires a transport to [`tester::Tester`]: inbound frames go through
//! [`Tester::receive`](tester::Tester::receive), host callbacks through
//! [`Tester::handle_host_event`](tester::Tester::handle_host_event), and
//! outbound frames leave via the [`btp::FrameSink`] the tester was built with.

pub mod btp;
pub mod connection;
pub mod error;
pub mod events;
pub mod gap;
pub mod gatt;
pub mod host;
pub mod tester;
pub mod uuid;

pub use btp::{BtpMessage, FrameSink};
pub use error::{Result, TesterError};
pub use host::{BleHost, HostError, HostEvent};
pub use tester::Tester;
pub use uuid::Uuid;
