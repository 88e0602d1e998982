//! Chat history service: sessions, messages and the current-session pointer.

use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::ServiceError;
use crate::gateway::GatewayMessage;
use crate::storage::ChatStore;
use crate::types::{
    ChatSession, DEFAULT_SESSION_TITLE, MessageRole, NewMessage, SessionStats, SessionSummary,
    StoredMessage, preview_title,
};

/// Session and message operations over a [`ChatStore`].
///
/// The current session is process-wide: creating, switching to or chatting
/// in a session makes it current.
pub struct ChatHistory {
    store: ChatStore,
    current: RwLock<Option<Uuid>>,
}

impl ChatHistory {
    pub fn new(store: ChatStore) -> Self {
        Self {
            store,
            current: RwLock::new(None),
        }
    }

    pub fn store(&self) -> &ChatStore {
        &self.store
    }

    pub fn current_session(&self) -> Option<Uuid> {
        *self.current.read()
    }

    pub fn set_current_session(&self, id: Uuid) {
        *self.current.write() = Some(id);
    }

    // --- Sessions ---

    /// Creates a session (default title when `None`) and makes it current.
    pub async fn create_session(&self, title: Option<&str>) -> Result<ChatSession, ServiceError> {
        let title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_SESSION_TITLE);
        let session = self.store.create_session(title, None).await?;
        self.set_current_session(session.id);
        tracing::info!(session_id = %session.id, title, "session created");
        Ok(session)
    }

    pub async fn get_session(&self, id: Uuid) -> Result<Option<ChatSession>, ServiceError> {
        self.store.get_session(id).await
    }

    /// Returns the requested session if it exists, otherwise a new one.
    /// Either way the result becomes current.
    pub async fn get_or_create_session(
        &self,
        id: Option<Uuid>,
    ) -> Result<ChatSession, ServiceError> {
        if let Some(id) = id
            && let Some(session) = self.store.get_session(id).await?
        {
            self.set_current_session(session.id);
            return Ok(session);
        }
        self.create_session(None).await
    }

    /// Resolves the session whose history a caller wants to read.
    ///
    /// An explicit id must exist and becomes current. Without one, the
    /// current session is used, or a new session is created.
    pub async fn resolve_session(&self, id: Option<Uuid>) -> Result<Uuid, ServiceError> {
        match id {
            Some(id) => {
                if self.store.get_session(id).await?.is_none() {
                    return Err(ServiceError::SessionNotFound);
                }
                self.set_current_session(id);
                Ok(id)
            }
            None => match self.current_session() {
                Some(current) => Ok(current),
                None => Ok(self.create_session(None).await?.id),
            },
        }
    }

    /// Makes an existing session current and returns it with its messages.
    pub async fn switch_session(
        &self,
        id: Uuid,
    ) -> Result<(ChatSession, Vec<StoredMessage>), ServiceError> {
        let session = self
            .store
            .get_session(id)
            .await?
            .ok_or(ServiceError::SessionNotFound)?;
        self.set_current_session(id);
        let messages = self.store.list_messages(id).await?;
        Ok((session, messages))
    }

    /// Active sessions, newest first. Untitled sessions show their first user
    /// message as the title.
    pub async fn list_sessions(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<SessionSummary>, ServiceError> {
        let current = self.current_session();
        let listings = self.store.list_sessions(limit, offset).await?;

        Ok(listings
            .into_iter()
            .map(|listing| {
                let session = listing.session;
                let title = match listing.first_user_message {
                    Some(first) if session.title == DEFAULT_SESSION_TITLE => preview_title(&first),
                    _ => session.title,
                };
                SessionSummary {
                    id: session.id,
                    title,
                    message_count: listing.message_count,
                    last_updated: session.updated_at,
                    created_at: session.created_at,
                    is_active: current == Some(session.id),
                }
            })
            .collect())
    }

    /// Deletes a session. Deleting the current session starts a fresh one.
    pub async fn delete_session(&self, id: Uuid) -> Result<bool, ServiceError> {
        let deleted = self.store.delete_session(id).await?;
        if deleted {
            tracing::info!(session_id = %id, "session deleted");
            if self.current_session() == Some(id) {
                self.create_session(None).await?;
            }
        }
        Ok(deleted)
    }

    pub async fn update_session_title(&self, id: Uuid, title: &str) -> Result<bool, ServiceError> {
        self.store.update_session_title(id, title).await
    }

    // --- Messages ---

    /// Appends a message. The first user message names an untitled session.
    pub async fn add_message(&self, message: NewMessage) -> Result<StoredMessage, ServiceError> {
        let stored = self.store.append_message(message).await?;

        if stored.role == MessageRole::User
            && let Some(session) = self.store.get_session(stored.session_id).await?
            && session.title == DEFAULT_SESSION_TITLE
        {
            self.store
                .update_session_title(session.id, &preview_title(&stored.content))
                .await?;
        }

        tracing::debug!(
            session_id = %stored.session_id,
            role = %stored.role,
            content_length = stored.content.len(),
            "message stored"
        );
        Ok(stored)
    }

    pub async fn history(&self, session_id: Uuid) -> Result<Vec<StoredMessage>, ServiceError> {
        self.store.list_messages(session_id).await
    }

    /// History as role/content pairs ready for the gateway.
    pub async fn gateway_messages(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<GatewayMessage>, ServiceError> {
        Ok(self
            .history(session_id)
            .await?
            .into_iter()
            .map(|m| GatewayMessage {
                role: m.role,
                content: m.content,
            })
            .collect())
    }

    pub async fn clear_history(&self, session_id: Uuid) -> Result<u64, ServiceError> {
        let deleted = self.store.clear_messages(session_id).await?;
        tracing::info!(session_id = %session_id, deleted, "history cleared");
        Ok(deleted)
    }

    pub async fn session_stats(&self, session_id: Uuid) -> Result<Option<SessionStats>, ServiceError> {
        self.store.session_stats(session_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn history() -> ChatHistory {
        ChatHistory::new(ChatStore::in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn create_session_uses_default_title_and_becomes_current() {
        let history = history().await;
        assert_eq!(history.current_session(), None);

        let session = history.create_session(None).await.unwrap();
        assert_eq!(session.title, "New Chat");
        assert_eq!(history.current_session(), Some(session.id));

        let named = history.create_session(Some("Recipes")).await.unwrap();
        assert_eq!(named.title, "Recipes");
        assert_eq!(history.current_session(), Some(named.id));
    }

    #[tokio::test]
    async fn get_or_create_falls_back_to_new_session() {
        let history = history().await;
        let existing = history.create_session(Some("a")).await.unwrap();
        history.create_session(Some("b")).await.unwrap();

        let got = history.get_or_create_session(Some(existing.id)).await.unwrap();
        assert_eq!(got.id, existing.id);
        assert_eq!(history.current_session(), Some(existing.id));

        let fresh = history.get_or_create_session(Some(Uuid::new_v4())).await.unwrap();
        assert_ne!(fresh.id, existing.id);
        assert_eq!(history.current_session(), Some(fresh.id));
    }

    #[tokio::test]
    async fn first_user_message_names_untitled_session() {
        let history = history().await;
        let session = history.create_session(None).await.unwrap();
        let long = "a".repeat(80);

        history
            .add_message(NewMessage::new(session.id, MessageRole::User, long.clone()))
            .await
            .unwrap();
        history
            .add_message(NewMessage::new(session.id, MessageRole::User, "second"))
            .await
            .unwrap();

        let renamed = history.get_session(session.id).await.unwrap().unwrap();
        assert_eq!(renamed.title, format!("{}...", "a".repeat(50)));
    }

    #[tokio::test]
    async fn assistant_message_does_not_rename() {
        let history = history().await;
        let session = history.create_session(None).await.unwrap();
        history
            .add_message(NewMessage::new(session.id, MessageRole::Assistant, "hello"))
            .await
            .unwrap();
        let unchanged = history.get_session(session.id).await.unwrap().unwrap();
        assert_eq!(unchanged.title, "New Chat");
    }

    #[tokio::test]
    async fn list_marks_current_session() {
        let history = history().await;
        let first = history.create_session(Some("first")).await.unwrap();
        let second = history.create_session(Some("second")).await.unwrap();

        let listed = history.list_sessions(50, 0).await.unwrap();
        assert_eq!(listed.len(), 2);
        for summary in &listed {
            assert_eq!(summary.is_active, summary.id == second.id);
        }

        history.set_current_session(first.id);
        let listed = history.list_sessions(50, 0).await.unwrap();
        assert!(listed.iter().any(|s| s.id == first.id && s.is_active));
    }

    #[tokio::test]
    async fn deleting_current_session_starts_a_new_one() {
        let history = history().await;
        let session = history.create_session(None).await.unwrap();

        assert!(history.delete_session(session.id).await.unwrap());
        let current = history.current_session().unwrap();
        assert_ne!(current, session.id);
        assert!(history.get_session(current).await.unwrap().is_some());

        assert!(!history.delete_session(session.id).await.unwrap());
    }

    #[tokio::test]
    async fn resolve_session_rules() {
        let history = history().await;

        let created = history.resolve_session(None).await.unwrap();
        assert_eq!(history.current_session(), Some(created));
        assert_eq!(history.resolve_session(None).await.unwrap(), created);

        let err = history.resolve_session(Some(Uuid::new_v4())).await.unwrap_err();
        assert!(matches!(err, ServiceError::SessionNotFound));

        let other = history.store().create_session("other", None).await.unwrap();
        assert_eq!(history.resolve_session(Some(other.id)).await.unwrap(), other.id);
        assert_eq!(history.current_session(), Some(other.id));
    }

    #[tokio::test]
    async fn gateway_messages_and_clear() {
        let history = history().await;
        let session = history.create_session(None).await.unwrap();
        history
            .add_message(NewMessage::new(session.id, MessageRole::User, "hi"))
            .await
            .unwrap();
        history
            .add_message(NewMessage::new(session.id, MessageRole::Assistant, "hello"))
            .await
            .unwrap();

        let messages = history.gateway_messages(session.id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[1].content, "hello");

        assert_eq!(history.clear_history(session.id).await.unwrap(), 2);
        assert!(history.history(session.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn switch_session_returns_messages() {
        let history = history().await;
        let target = history.create_session(Some("target")).await.unwrap();
        history
            .add_message(NewMessage::new(target.id, MessageRole::User, "hi"))
            .await
            .unwrap();
        history.create_session(None).await.unwrap();

        let (session, messages) = history.switch_session(target.id).await.unwrap();
        assert_eq!(session.title, "target");
        assert_eq!(messages.len(), 1);
        assert_eq!(history.current_session(), Some(target.id));

        assert!(matches!(
            history.switch_session(Uuid::new_v4()).await.unwrap_err(),
            ServiceError::SessionNotFound
        ));
    }
}
