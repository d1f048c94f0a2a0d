//! `ChatHistoryStore` — the boundary for conversation persistence. This
//! crate only needs *something* behind that trait object to drive the
//! chat loop end to end; concrete durable storage, compaction triggers,
//! and transcript file layout are an external concern.
//!
//! [`InMemoryHistoryStore`] is the stand-in default: a plain in-memory
//! log per session, holding canonical [`Message`]s directly instead of
//! a serialized role/content wire format.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use sa_domain::error::Result;
use sa_domain::tool::Message;

/// Conversation history for one session, as the Chat Loop sees it.
///
/// Implementations are free to back this with a file, a database, or
/// nothing at all; the only contract is append-order preservation and
/// read-your-writes within a process.
#[async_trait]
pub trait ChatHistoryStore: Send + Sync {
    /// Append messages to a session's history, in order.
    async fn append(&self, session_id: &str, messages: &[Message]) -> Result<()>;

    /// Load the full message history for a session, oldest first. Returns
    /// an empty vec for a session that has never been written to.
    async fn load(&self, session_id: &str) -> Result<Vec<Message>>;

    /// Replace a session's history wholesale — used after compaction
    /// collapses older turns into a summary message.
    async fn replace(&self, session_id: &str, messages: Vec<Message>) -> Result<()>;

    /// Drop a session's history entirely (`/reset`).
    async fn clear(&self, session_id: &str) -> Result<()>;
}

/// Default in-process implementation: one `Vec<Message>` per session,
/// guarded by a single lock. Fine for a single daemon process; does not
/// survive a restart.
#[derive(Default)]
pub struct InMemoryHistoryStore {
    sessions: RwLock<HashMap<String, Vec<Message>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatHistoryStore for InMemoryHistoryStore {
    async fn append(&self, session_id: &str, messages: &[Message]) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }
        let mut sessions = self.sessions.write();
        sessions
            .entry(session_id.to_owned())
            .or_default()
            .extend_from_slice(messages);
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Vec<Message>> {
        let sessions = self.sessions.read();
        Ok(sessions.get(session_id).cloned().unwrap_or_default())
    }

    async fn replace(&self, session_id: &str, messages: Vec<Message>) -> Result<()> {
        let mut sessions = self.sessions.write();
        sessions.insert(session_id.to_owned(), messages);
        Ok(())
    }

    async fn clear(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.sessions.write();
        sessions.remove(session_id);
        Ok(())
    }
}
