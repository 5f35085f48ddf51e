//! GAP service: controller state, discovery, connections, and pairing.

pub mod constants;
pub mod service;
pub mod types;

pub use service::GapService;
pub use types::{AddressType, BdAddr, IoCapability, Peer, Settings};
