//! In-memory conversation store.

use super::Conversation;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::info;

/// Shared handle to one conversation.
///
/// Holding the lock for a whole turn serialises turns of the same conversation.
pub type ConversationHandle = Arc<Mutex<Conversation>>;

/// Owns conversations by id. Nothing is persisted.
pub struct ConversationStore {
    conversations: RwLock<HashMap<String, ConversationHandle>>,
    max_retained: usize,
}

impl ConversationStore {
    pub fn new(max_retained: usize) -> Self {
        Self {
            conversations: RwLock::new(HashMap::new()),
            max_retained,
        }
    }

    /// Create a conversation, replacing any existing one with the same id.
    pub fn create(&self, id: Option<&str>) -> ConversationHandle {
        let id = id
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let handle = Arc::new(Mutex::new(Conversation::new(id.clone(), self.max_retained)));
        self.write().insert(id.clone(), handle.clone());
        info!("Created new conversation: {}", id);
        handle
    }

    pub fn get(&self, id: &str) -> Option<ConversationHandle> {
        self.read().get(id).cloned()
    }

    /// Return the conversation for `id`, creating it on first reference.
    pub fn get_or_create(&self, id: &str) -> ConversationHandle {
        if let Some(handle) = self.get(id) {
            return handle;
        }

        let mut conversations = self.write();
        // Another caller may have created it between the read and the write lock
        if let Some(handle) = conversations.get(id) {
            return handle.clone();
        }

        let handle = Arc::new(Mutex::new(Conversation::new(id, self.max_retained)));
        conversations.insert(id.to_string(), handle.clone());
        info!("Created new conversation: {}", id);
        handle
    }

    pub fn delete(&self, id: &str) -> bool {
        let removed = self.write().remove(id).is_some();
        if removed {
            info!("Deleted conversation: {}", id);
        }
        removed
    }

    pub fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Drop all conversations.
    pub fn clear(&self) {
        self.write().clear();
    }

    // A poisoned lock only means another thread panicked mid-insert; the map is still usable.
    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, ConversationHandle>> {
        self.conversations.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, ConversationHandle>> {
        self.conversations.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Message;

    #[tokio::test]
    async fn test_get_or_create_returns_same_conversation() {
        let store = ConversationStore::new(10);

        let first = store.get_or_create("abc");
        first.lock().await.add_message(Message::user("hello"));

        let second = store.get_or_create("abc");
        assert_eq!(second.lock().await.len(), 1);
        assert_eq!(store.list(), vec!["abc".to_string()]);
    }

    #[tokio::test]
    async fn test_create_replaces_and_delete() {
        let store = ConversationStore::new(10);

        let old = store.create(Some("abc"));
        old.lock().await.add_message(Message::user("hello"));
        let fresh = store.create(Some("abc"));
        assert!(fresh.lock().await.is_empty());

        let handle = store.create(None);
        let id = handle.lock().await.id().to_string();
        assert_ne!(id, "abc");

        assert!(store.get(&id).is_some());
        assert!(store.delete(&id));
        assert!(!store.delete(&id));
        assert!(store.get(&id).is_none());
    }

    #[test]
    fn test_clear() {
        let store = ConversationStore::new(5);
        store.create(Some("a"));
        store.create(Some("b"));
        store.clear();
        assert!(store.list().is_empty());
    }
}
