use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::LanguageModel;
use crate::session::{Message, Role, Session, SessionStore};
use crate::storage::SnapshotStore;

pub const EMPTY_REPLY_GLYPH: &str = "…";
pub const UNREACHABLE_MODEL_MESSAGE: &str =
    "Désolé, je n'arrive pas à joindre le modèle pour le moment. Vérifie l'adresse du service et la clé d'API, puis réessaie.";

#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Blank input; nothing was appended.
    Ignored,
    /// The appended assistant message (reply, placeholder, or apology).
    Replied(Message),
    /// A newer send won; this call's outcome was discarded.
    Superseded,
}

struct InFlight {
    generation: u64,
    cancel: CancellationToken,
}

/// Owns the session collection and the single in-flight model call. Every
/// mutation is followed by a best-effort snapshot write.
pub struct ChatController {
    store: RwLock<SessionStore>,
    snapshot: Box<dyn SnapshotStore>,
    model: Arc<dyn LanguageModel>,
    generation: AtomicU64,
    in_flight: Mutex<Option<InFlight>>,
}

impl ChatController {
    /// The snapshot is read exactly once, here; a missing or corrupt one
    /// falls back to a fresh collection.
    pub fn new(model: Arc<dyn LanguageModel>, snapshot: Box<dyn SnapshotStore>) -> Self {
        let store = snapshot.load().unwrap_or_else(SessionStore::bootstrap);
        Self {
            store: RwLock::new(store),
            snapshot,
            model,
            generation: AtomicU64::new(0),
            in_flight: Mutex::new(None),
        }
    }

    pub async fn view(&self) -> SessionStore {
        self.store.read().await.clone()
    }

    pub async fn transcript(&self, id: Uuid) -> Option<Session> {
        self.store.read().await.get(id).cloned()
    }

    pub async fn is_sending(&self) -> bool {
        self.in_flight.lock().await.is_some()
    }

    pub async fn create(&self, title: Option<&str>) -> Session {
        let mut store = self.store.write().await;
        let session = store.create(title).clone();
        self.persist(&store);
        session
    }

    pub async fn select(&self, id: Uuid) -> bool {
        let mut store = self.store.write().await;
        let selected = store.select(id);
        if selected {
            self.persist(&store);
        }
        selected
    }

    pub async fn rename(&self, id: Uuid, title: &str) -> Option<Session> {
        let mut store = self.store.write().await;
        if !store.rename(id, title) {
            return None;
        }
        self.persist(&store);
        store.get(id).cloned()
    }

    /// Returns the resulting current-session id when the deletion happened.
    pub async fn delete(&self, id: Uuid) -> Option<Uuid> {
        let mut store = self.store.write().await;
        if !store.delete(id) {
            return None;
        }
        self.persist(&store);
        Some(store.current_id())
    }

    /// Send-message protocol: append the user's message immediately, call the
    /// model with the conversation so far, then append the reply unless a
    /// newer send superseded this one in the meantime.
    pub async fn send(&self, content: &str) -> SendOutcome {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return SendOutcome::Ignored;
        }

        // The newer request always wins: cancel whatever is still in flight
        // and take the slot.
        let cancel = CancellationToken::new();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut slot = self.in_flight.lock().await;
            if let Some(previous) = slot.take() {
                previous.cancel.cancel();
            }
            *slot = Some(InFlight { generation, cancel: cancel.clone() });
        }

        let (session_id, history) = {
            let mut store = self.store.write().await;
            let id = store.current_id();
            store.append(id, Role::User, trimmed);
            self.persist(&store);
            let history = store.get(id).map(|s| s.messages.clone()).unwrap_or_default();
            (id, history)
        };

        let result = self.model.complete(&history, cancel).await;

        // Stale outcomes are discarded, not appended: the slot still holding
        // our generation means no newer send started while we waited.
        {
            let mut slot = self.in_flight.lock().await;
            match slot.as_ref() {
                Some(current) if current.generation == generation => {
                    *slot = None;
                }
                _ => {
                    tracing::debug!(generation, "discarding superseded model outcome");
                    return SendOutcome::Superseded;
                }
            }
        }

        let reply = match result {
            Ok(text) if text.is_empty() => EMPTY_REPLY_GLYPH.to_string(),
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(%err, "model call failed, appending fallback message");
                UNREACHABLE_MODEL_MESSAGE.to_string()
            }
        };

        let mut store = self.store.write().await;
        let appended = store.append(session_id, Role::Assistant, &reply).cloned();
        self.persist(&store);
        match appended {
            Some(message) => SendOutcome::Replied(message),
            // The session was deleted while the call was in flight.
            None => SendOutcome::Superseded,
        }
    }

    fn persist(&self, store: &SessionStore) {
        if let Err(err) = self.snapshot.save(store) {
            tracing::warn!(%err, "failed to persist session snapshot");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelError;
    use crate::session::{FIRST_SESSION_TITLE, GREETING};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Clone)]
    struct MemorySnapshot {
        cell: Arc<std::sync::Mutex<Option<SessionStore>>>,
    }

    impl MemorySnapshot {
        fn empty() -> Self {
            Self { cell: Arc::new(std::sync::Mutex::new(None)) }
        }

        fn preloaded(store: SessionStore) -> Self {
            Self { cell: Arc::new(std::sync::Mutex::new(Some(store))) }
        }

        fn stored(&self) -> Option<SessionStore> {
            self.cell.lock().unwrap().clone()
        }
    }

    impl SnapshotStore for MemorySnapshot {
        fn load(&self) -> Option<SessionStore> {
            self.stored()
        }

        fn save(&self, store: &SessionStore) -> anyhow::Result<()> {
            *self.cell.lock().unwrap() = Some(store.clone());
            Ok(())
        }
    }

    struct CannedModel {
        reply: Result<String, ModelError>,
    }

    #[async_trait]
    impl LanguageModel for CannedModel {
        async fn complete(
            &self,
            _history: &[Message],
            _cancel: CancellationToken,
        ) -> Result<String, ModelError> {
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(ModelError::Remote { status, detail }) => {
                    Err(ModelError::Remote { status: *status, detail: detail.clone() })
                }
                Err(_) => Err(ModelError::Cancelled),
            }
        }
    }

    fn controller_with(reply: Result<String, ModelError>) -> ChatController {
        ChatController::new(Arc::new(CannedModel { reply }), Box::new(MemorySnapshot::empty()))
    }

    #[tokio::test]
    async fn fresh_start_has_one_greeting_session() {
        let controller = controller_with(Ok("salut".into()));
        let view = controller.view().await;
        assert_eq!(view.sessions().len(), 1);
        assert_eq!(view.current().title, FIRST_SESSION_TITLE);
        assert_eq!(view.current().messages[0].content, GREETING);
    }

    #[tokio::test]
    async fn startup_restores_persisted_collection() {
        let mut persisted = SessionStore::bootstrap();
        persisted.create(Some("restaurée"));
        let controller = ChatController::new(
            Arc::new(CannedModel { reply: Ok(String::new()) }),
            Box::new(MemorySnapshot::preloaded(persisted.clone())),
        );
        let view = controller.view().await;
        assert_eq!(view.sessions().len(), 2);
        assert_eq!(view.current_id(), persisted.current_id());
    }

    #[tokio::test]
    async fn send_appends_user_then_assistant_reply() {
        let controller = controller_with(Ok("salut".into()));
        let reply = match controller.send("bonjour").await {
            SendOutcome::Replied(m) => m,
            other => panic!("expected a reply, got {:?}", other),
        };
        assert_eq!(reply.content, "salut");
        assert_eq!(reply.role, Role::Assistant);

        let current = controller.view().await.current().clone();
        assert_eq!(current.messages.len(), 3);
        assert_eq!(current.messages[1].role, Role::User);
        assert_eq!(current.messages[1].content, "bonjour");
        assert_eq!(current.messages[2].content, "salut");
        assert!(!controller.is_sending().await);
    }

    #[tokio::test]
    async fn blank_input_is_ignored() {
        let controller = controller_with(Ok("salut".into()));
        assert_eq!(controller.send("   \n  ").await, SendOutcome::Ignored);
        assert_eq!(controller.view().await.current().messages.len(), 1);
    }

    #[tokio::test]
    async fn empty_reply_becomes_placeholder_glyph() {
        let controller = controller_with(Ok(String::new()));
        let outcome = controller.send("bonjour").await;
        match outcome {
            SendOutcome::Replied(m) => assert_eq!(m.content, EMPTY_REPLY_GLYPH),
            other => panic!("expected a reply, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn remote_failure_appends_fallback_message() {
        let controller = controller_with(Err(ModelError::Remote {
            status: 500,
            detail: "backend exploded".into(),
        }));
        let outcome = controller.send("bonjour").await;
        match outcome {
            SendOutcome::Replied(m) => assert_eq!(m.content, UNREACHABLE_MODEL_MESSAGE),
            other => panic!("expected the fallback message, got {:?}", other),
        }
        assert!(!controller.is_sending().await);
    }

    #[tokio::test]
    async fn every_mutation_updates_the_snapshot() {
        let snapshot = MemorySnapshot::empty();
        let controller = ChatController::new(
            Arc::new(CannedModel { reply: Ok("salut".into()) }),
            Box::new(snapshot.clone()),
        );
        controller.send("bonjour").await;
        let stored = snapshot.stored().unwrap();
        assert_eq!(stored.current().messages.len(), 3);

        let id = controller.view().await.current_id();
        controller.rename(id, "renommée").await.unwrap();
        assert_eq!(snapshot.stored().unwrap().current().title, "renommée");

        controller.create(Some("autre")).await;
        assert_eq!(snapshot.stored().unwrap().sessions().len(), 2);
    }

    /// First call hangs until its token fires, then reports cancellation;
    /// the second call answers immediately.
    struct SupersededModel {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LanguageModel for SupersededModel {
        async fn complete(
            &self,
            _history: &[Message],
            cancel: CancellationToken,
        ) -> Result<String, ModelError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                cancel.cancelled().await;
                Err(ModelError::Cancelled)
            } else {
                Ok("deuxième".into())
            }
        }
    }

    #[tokio::test]
    async fn newer_send_supersedes_and_discards_the_older_outcome() {
        let controller = Arc::new(ChatController::new(
            Arc::new(SupersededModel { calls: AtomicUsize::new(0) }),
            Box::new(MemorySnapshot::empty()),
        ));

        let racing = controller.clone();
        let first = tokio::spawn(async move { racing.send("premier").await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = controller.send("second").await;

        match second {
            SendOutcome::Replied(m) => assert_eq!(m.content, "deuxième"),
            other => panic!("expected the second reply, got {:?}", other),
        }
        assert_eq!(first.await.unwrap(), SendOutcome::Superseded);

        let messages = controller.view().await.current().messages.clone();
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        // Both user messages land; only the winning call's reply does.
        assert_eq!(contents, vec![GREETING, "premier", "second", "deuxième"]);
        assert!(!controller.is_sending().await);
    }

    #[tokio::test]
    async fn session_deleted_mid_flight_discards_the_reply() {
        struct GatedModel {
            gate: tokio::sync::Notify,
        }

        #[async_trait]
        impl LanguageModel for GatedModel {
            async fn complete(
                &self,
                _history: &[Message],
                _cancel: CancellationToken,
            ) -> Result<String, ModelError> {
                self.gate.notified().await;
                Ok("trop tard".into())
            }
        }

        let model = Arc::new(GatedModel { gate: tokio::sync::Notify::new() });
        let controller =
            Arc::new(ChatController::new(model.clone(), Box::new(MemorySnapshot::empty())));
        let doomed = controller.view().await.current_id();

        let racing = controller.clone();
        let pending = tokio::spawn(async move { racing.send("bonjour").await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        controller.delete(doomed).await.unwrap();
        model.gate.notify_one();

        assert_eq!(pending.await.unwrap(), SendOutcome::Superseded);
        assert!(controller.view().await.get(doomed).is_none());
    }
}
