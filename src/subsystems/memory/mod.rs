//! Memory subsystem — per-user conversation transcripts.
//!
//! Everything lives in process memory; a restart starts every user over.

pub mod store;
pub mod types;

pub use store::{ConversationStore, SessionGuard};
pub use types::{Conversation, Role, Turn, UserId};
