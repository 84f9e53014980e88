use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const FIRST_SESSION_TITLE: &str = "Premiers pas";
pub const NEW_SESSION_TITLE: &str = "Nouvelle discussion";
pub const UNTITLED: &str = "Sans titre";
pub const GREETING: &str = "Bonjour ! Je suis le Quiet Observer. Démarrons ?";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub title: String,
    pub messages: Vec<Message>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// New session seeded with the assistant greeting.
    pub fn new(title: &str) -> Self {
        let greeting = Message::new(Role::Assistant, GREETING);
        let updated_at = greeting.created_at;
        Self {
            id: Uuid::new_v4(),
            title: title.to_string(),
            messages: vec![greeting],
            updated_at,
        }
    }
}

/// In-memory session collection. Never empty; exactly one session is current.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStore {
    sessions: Vec<Session>,
    current: Uuid,
}

impl SessionStore {
    /// Fresh collection for a first start (or a corrupt/missing snapshot).
    pub fn bootstrap() -> Self {
        let session = Session::new(FIRST_SESSION_TITLE);
        let current = session.id;
        Self { sessions: vec![session], current }
    }

    /// A deserialized snapshot is usable only if it upholds the collection
    /// invariants; anything else is treated as corrupt by the caller.
    pub fn coherent(&self) -> bool {
        !self.sessions.is_empty() && self.sessions.iter().any(|s| s.id == self.current)
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn get(&self, id: Uuid) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == id)
    }

    pub fn current_id(&self) -> Uuid {
        self.current
    }

    pub fn current(&self) -> &Session {
        self.sessions
            .iter()
            .find(|s| s.id == self.current)
            .expect("collection invariant: current session exists")
    }

    pub fn create(&mut self, title: Option<&str>) -> &Session {
        let session = Session::new(title.unwrap_or(NEW_SESSION_TITLE));
        self.current = session.id;
        self.sessions.insert(0, session);
        &self.sessions[0]
    }

    /// No-op when the id is unknown; callers are expected to pass known ids.
    pub fn select(&mut self, id: Uuid) -> bool {
        if self.sessions.iter().any(|s| s.id == id) {
            self.current = id;
            true
        } else {
            false
        }
    }

    pub fn rename(&mut self, id: Uuid, title: &str) -> bool {
        let Some(session) = self.sessions.iter_mut().find(|s| s.id == id) else {
            return false;
        };
        let trimmed = title.trim();
        session.title = if trimmed.is_empty() { UNTITLED.to_string() } else { trimmed.to_string() };
        session.updated_at = Utc::now();
        true
    }

    pub fn delete(&mut self, id: Uuid) -> bool {
        let before = self.sessions.len();
        self.sessions.retain(|s| s.id != id);
        if self.sessions.len() == before {
            return false;
        }
        if self.sessions.is_empty() {
            let replacement = Session::new(NEW_SESSION_TITLE);
            self.current = replacement.id;
            self.sessions.push(replacement);
        } else if self.current == id {
            // Fall back to the most recently updated survivor.
            self.current = self
                .sessions
                .iter()
                .max_by_key(|s| s.updated_at)
                .map(|s| s.id)
                .expect("collection invariant: non-empty");
        }
        true
    }

    pub fn append(&mut self, id: Uuid, role: Role, content: &str) -> Option<&Message> {
        let session = self.sessions.iter_mut().find(|s| s.id == id)?;
        let message = Message::new(role, content);
        session.updated_at = message.created_at;
        session.messages.push(message);
        session.messages.last()
    }
}
