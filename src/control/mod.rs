//! # Control Module
//!
//! The slave's side of the bridge: the shared channel state and the loop
//! that drives the flight controller with it.
//!
//! This module handles:
//! - Channel values, control mode and link status ([`state`], [`link`])
//! - Parsing and applying remote commands ([`command`])
//! - The file-based command handoff ([`spool`])
//! - The fixed-period control loop ([`runner`])

pub mod command;
pub mod link;
pub mod runner;
pub mod spool;
pub mod state;

pub use command::{parse_batch, parse_line, RemoteCommand};
pub use runner::{command_channel, CommandSender, ControlLoop, LoopTiming};
pub use spool::CommandSpool;
pub use state::{ControlMode, SharedState, StateSnapshot};
