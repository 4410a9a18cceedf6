//! Subsystem modules for the relay bot.

pub mod agents;
pub mod comms;
pub mod memory;
pub mod runtime;
