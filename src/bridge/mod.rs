//! # Bridge Module
//!
//! Remote control between a master node and the slave attached to the
//! flight controller.
//!
//! This module handles:
//! - The newline-delimited JSON wire format ([`protocol`])
//! - The slave's TCP server feeding the control loop ([`slave`])
//! - The master's client with bounded timeouts ([`master`])
//! - The master's HTTP API ([`api`])

pub mod api;
pub mod master;
pub mod protocol;
pub mod slave;

pub use master::{BridgeLink, MasterClient, TcpBridgeLink};
pub use protocol::{BridgeRequest, BridgeResponse};
pub use slave::{SlaveHandle, SlaveServer};
