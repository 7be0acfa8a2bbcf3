use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::session::Session;
use crate::settings::SessionSettings;

/// A session is locked for the whole of one interaction, generation included.
pub type SharedSession = Arc<Mutex<Session>>;

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create_session(&self, client_id: Option<String>, settings: SessionSettings) -> Uuid;
    async fn delete_session(&self, id: Uuid) -> Option<Session>;
    async fn list_sessions(&self) -> Vec<Uuid>;
    async fn get_session(&self, id: Uuid) -> Option<SharedSession>;
}

/// Process-wide session store. Sessions live as long as the process or
/// until deleted.
#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: RwLock<HashMap<Uuid, (DateTime<Utc>, SharedSession)>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn create_session(&self, client_id: Option<String>, settings: SessionSettings) -> Uuid {
        let session = Session::new(client_id, settings);
        let id = session.id;
        let created_at = session.created_at;
        self.sessions.write().await.insert(id, (created_at, Arc::new(Mutex::new(session))));
        debug!(%id, "session created");
        id
    }

    async fn delete_session(&self, id: Uuid) -> Option<Session> {
        let (_, shared) = self.sessions.write().await.remove(&id)?;
        let session = shared.lock().await.clone();
        debug!(%id, "session deleted");
        Some(session)
    }

    async fn list_sessions(&self) -> Vec<Uuid> {
        // listing must not wait on a session that is busy generating
        let sessions = self.sessions.read().await;
        let mut entries: Vec<(DateTime<Utc>, Uuid)> = sessions.iter().map(|(id, (created_at, _))| (*created_at, *id)).collect();
        entries.sort_by(|a, b| b.0.cmp(&a.0));
        entries.into_iter().map(|(_, id)| id).collect()
    }

    async fn get_session(&self, id: Uuid) -> Option<SharedSession> {
        self.sessions.read().await.get(&id).map(|(_, shared)| shared.clone())
    }
}
