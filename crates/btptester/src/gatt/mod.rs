//! GATT service: server-build session, local server, remote discovery.

pub mod builder;
pub mod constants;
pub mod database;
pub mod server;
pub mod service;
pub mod types;


pub use database::GattDatabase;
pub use server::GattServer;
pub use service::GattService;
pub use types::{
    AttPermissions, CharacteristicDefinition, CharacteristicProperties, DescriptorDefinition,
    ServiceDefinition,
};
