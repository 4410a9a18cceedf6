//! Agents subsystem — the logic that sits between a channel and the LLM.
//!
//! There is a single agent today: [`chat::ChatAgent`].

pub mod chat;

pub use chat::ChatAgent;
