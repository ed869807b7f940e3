//! Server-side sessions.
//!
//! A session is named by the `jti` of its token. Sessions idle for longer
//! than the configured timeout are dropped on their next use; logout and
//! the liveness gate drop them explicitly.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use sgir_core::{Principal, Role};

/// One logged-in principal.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub principal_id: i64,
    pub role: Role,
    pub started_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// In-memory session table.
pub struct SessionStore {
    idle_timeout: Duration,
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new(idle_minutes: i64) -> Self {
        SessionStore {
            idle_timeout: Duration::minutes(idle_minutes),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Opens a session for `principal`.
    pub async fn start(&self, principal: &Principal) -> Session {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            principal_id: principal.id,
            role: principal.role,
            started_at: now,
            last_seen: now,
        };
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        debug!(session = %session.id, principal_id = principal.id, "Session started");
        session
    }

    /// Returns the live session `id` and refreshes its idle clock.
    /// An idle-expired session is removed and `None` returned.
    pub async fn touch(&self, id: &str) -> Option<Session> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;

        let expired = match sessions.get_mut(id) {
            None => return None,
            Some(session) if now - session.last_seen > self.idle_timeout => true,
            Some(session) => {
                session.last_seen = now;
                return Some(session.clone());
            }
        };
        if expired {
            sessions.remove(id);
            debug!(session = %id, "Session expired after idle timeout");
        }
        None
    }

    /// Ends one session. Returns `false` if it was already gone.
    pub async fn end(&self, id: &str) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    /// Ends every session of a principal (deactivation).
    pub async fn end_all_for(&self, principal_id: i64) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.principal_id != principal_id);
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
