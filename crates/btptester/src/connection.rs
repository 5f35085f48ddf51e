//! Per-peer connection state.

use std::collections::HashMap;

use crate::gap::types::{BdAddr, Peer};
use crate::gatt::database::GattDatabase;

/// The outstanding remote GATT operation awaiting a host completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingOp {
    Read,
    ReadLong,
    Write,
    WriteLong,
}

impl PendingOp {
    pub fn is_read(self) -> bool {
        matches!(self, PendingOp::Read | PendingOp::ReadLong)
    }
}

/// State tracked for one connected peer.
pub struct Connection {
    pub peer: Peer,
    /// Mirror of the remote database, rebuilt wholesale after each discovery
    /// pass; empty until then.
    pub database: GattDatabase,
    /// At most one outstanding read/write toward this peer.
    pub pending: Option<PendingOp>,
}

impl Connection {
    pub fn new(peer: Peer) -> Self {
        Connection {
            peer,
            database: GattDatabase::empty(),
            pending: None,
        }
    }
}

/// All live connections, keyed by peer address.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: HashMap<BdAddr, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        ConnectionRegistry::default()
    }

    /// Adds (or resets) the connection for `peer`.
    pub fn insert(&mut self, peer: Peer) {
        self.connections
            .insert(peer.address, Connection::new(peer));
    }

    pub fn remove(&mut self, address: &BdAddr) -> Option<Connection> {
        self.connections.remove(address)
    }

    pub fn get(&self, address: &BdAddr) -> Option<&Connection> {
        self.connections.get(address)
    }

    pub fn get_mut(&mut self, address: &BdAddr) -> Option<&mut Connection> {
        self.connections.get_mut(address)
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
