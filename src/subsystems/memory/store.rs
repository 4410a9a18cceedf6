//! In-memory conversation store — one transcript per user, process lifetime.
//!
//! The outer map is guarded by a `std::sync::Mutex` that is only held long
//! enough to look up or insert a slot; it is never held across an `.await`.
//! Each user's [`Conversation`] sits behind its own `tokio::sync::Mutex`, so
//! a dispatch can hold one user's transcript for the full completion round
//! trip while other users proceed in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

use super::types::{Conversation, Turn, UserId};

type Slot = Arc<AsyncMutex<Conversation>>;

/// Process-wide mapping from [`UserId`] to exactly one [`Conversation`].
///
/// Entries are created lazily and never evicted. [`reset`](Self::reset)
/// replaces the value in place, so the slot identity (and any waiter queued
/// on its lock) survives.
pub struct ConversationStore {
    system_prompt: String,
    history_cap: Option<usize>,
    entries: Mutex<HashMap<UserId, Slot>>,
}

impl ConversationStore {
    /// `history_cap` bounds the non-system turns kept per user; `None` keeps
    /// everything. A cap of zero is raised to one so the newest turn always
    /// survives its own append.
    pub fn new(system_prompt: impl Into<String>, history_cap: Option<usize>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            history_cap: history_cap.map(|c| c.max(1)),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Number of users with a live conversation.
    pub fn user_count(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&user_id)
    }

    fn slot(&self, user_id: UserId) -> Slot {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .entry(user_id)
            .or_insert_with(|| {
                debug!(%user_id, "conversation created");
                Arc::new(AsyncMutex::new(Conversation::new(&self.system_prompt)))
            })
            .clone()
    }

    /// Exclusive access to one user's conversation, creating it if needed.
    ///
    /// Holding the guard serialises every other operation on the same user.
    pub async fn lock(&self, user_id: UserId) -> SessionGuard {
        let guard = self.slot(user_id).lock_owned().await;
        SessionGuard {
            guard,
            system_prompt: self.system_prompt.clone(),
            history_cap: self.history_cap,
        }
    }

    /// Snapshot of the user's conversation, seeding it on first access.
    pub async fn get_or_create(&self, user_id: UserId) -> Conversation {
        self.lock(user_id).await.conversation().clone()
    }

    /// Snapshot without creating an entry.
    pub async fn snapshot(&self, user_id: UserId) -> Option<Conversation> {
        let slot = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user_id)
            .cloned()?;
        let conversation = slot.lock().await.clone();
        Some(conversation)
    }

    /// Number of turns stored for the user, `0` if none exist yet.
    pub async fn turn_count(&self, user_id: UserId) -> usize {
        self.snapshot(user_id).await.map_or(0, |c| c.len())
    }

    /// Append a turn to the user's conversation.
    pub async fn append(&self, user_id: UserId, turn: Turn) {
        self.lock(user_id).await.append(turn);
    }

    /// Replace the user's conversation with a fresh system-only one.
    pub async fn reset(&self, user_id: UserId) {
        self.lock(user_id).await.reset();
    }
}

/// Locked view of one user's conversation. Released on drop.
pub struct SessionGuard {
    guard: OwnedMutexGuard<Conversation>,
    system_prompt: String,
    history_cap: Option<usize>,
}

impl SessionGuard {
    pub fn conversation(&self) -> &Conversation {
        &self.guard
    }

    pub fn append(&mut self, turn: Turn) {
        self.guard.push(turn);
        if let Some(cap) = self.history_cap {
            self.guard.cap_history(cap);
        }
    }

    pub fn reset(&mut self) {
        *self.guard = Conversation::new(&self.system_prompt);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::subsystems::memory::types::Role;

    fn store() -> ConversationStore {
        ConversationStore::new("sys", None)
    }

    #[tokio::test]
    async fn unseen_user_gets_system_only_conversation() {
        let s = store();
        let c = s.get_or_create(UserId(1)).await;
        assert_eq!(c.len(), 1);
        assert_eq!(c.turns()[0].role, Role::System);
        assert_eq!(c.turns()[0].content, "sys");
    }

    #[tokio::test]
    async fn append_preserves_order() {
        let s = store();
        s.get_or_create(UserId(1)).await;
        s.append(UserId(1), Turn::user("a")).await;
        s.append(UserId(1), Turn::assistant("b")).await;
        let c = s.get_or_create(UserId(1)).await;
        assert_eq!(c.turns()[1], Turn::user("a"));
        assert_eq!(c.turns()[2], Turn::assistant("b"));
    }

    #[tokio::test]
    async fn append_without_prior_lookup_still_seeds_system_turn() {
        let s = store();
        s.append(UserId(9), Turn::user("x")).await;
        let c = s.get_or_create(UserId(9)).await;
        assert_eq!(c.len(), 2);
        assert_eq!(c.turns()[0].role, Role::System);
    }

    #[tokio::test]
    async fn reset_returns_to_system_only_and_is_idempotent() {
        let s = store();
        for i in 0..4 {
            s.append(UserId(3), Turn::user(format!("m{i}"))).await;
        }
        s.reset(UserId(3)).await;
        assert_eq!(s.get_or_create(UserId(3)).await.len(), 1);
        s.reset(UserId(3)).await;
        assert_eq!(s.get_or_create(UserId(3)).await.turns(), &[Turn::system("sys")]);
    }

    #[tokio::test]
    async fn reset_of_unseen_user_creates_entry() {
        let s = store();
        assert!(!s.contains(UserId(7)));
        s.reset(UserId(7)).await;
        assert!(s.contains(UserId(7)));
        assert_eq!(s.snapshot(UserId(7)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn users_are_isolated() {
        let s = store();
        s.append(UserId(1), Turn::user("one")).await;
        s.append(UserId(2), Turn::user("two")).await;
        s.append(UserId(2), Turn::user("two again")).await;
        assert_eq!(s.get_or_create(UserId(1)).await.len(), 2);
        assert_eq!(s.get_or_create(UserId(2)).await.len(), 3);
        assert_eq!(s.user_count(), 2);
    }

    #[tokio::test]
    async fn snapshot_does_not_create() {
        let s = store();
        assert!(s.snapshot(UserId(5)).await.is_none());
        assert_eq!(s.turn_count(UserId(5)).await, 0);
        assert_eq!(s.user_count(), 0);

        s.append(UserId(5), Turn::user("hi")).await;
        assert_eq!(s.turn_count(UserId(5)).await, 2);
    }

    #[tokio::test]
    async fn history_cap_drops_oldest_non_system_turns() {
        let s = ConversationStore::new("sys", Some(2));
        for i in 0..5 {
            s.append(UserId(1), Turn::user(format!("m{i}"))).await;
        }
        let c = s.get_or_create(UserId(1)).await;
        let contents: Vec<&str> = c.turns().iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["sys", "m3", "m4"]);
    }

    #[tokio::test]
    async fn zero_cap_keeps_newest_turn() {
        let s = ConversationStore::new("sys", Some(0));
        s.append(UserId(1), Turn::user("a")).await;
        s.append(UserId(1), Turn::user("b")).await;
        let c = s.get_or_create(UserId(1)).await;
        assert_eq!(c.turns(), &[Turn::system("sys"), Turn::user("b")]);
    }

    #[tokio::test]
    async fn lock_serialises_same_user() {
        let s = Arc::new(store());
        let mut guard = s.lock(UserId(1)).await;

        let s2 = s.clone();
        let waiter = tokio::spawn(async move {
            s2.append(UserId(1), Turn::user("second")).await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        guard.append(Turn::user("first"));
        drop(guard);

        waiter.await.unwrap();
        let c = s.get_or_create(UserId(1)).await;
        assert_eq!(c.turns()[1].content, "first");
        assert_eq!(c.turns()[2].content, "second");
    }
}
