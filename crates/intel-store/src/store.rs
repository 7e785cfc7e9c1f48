//! Session storage trait and in-memory implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use intel_core::{AnalysisSession, IntelError, Result, SessionStatus};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Filter for session listings
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    /// Only sessions with this status
    pub status: Option<SessionStatus>,
    /// Only sessions for this market domain (case-insensitive)
    pub domain: Option<String>,
    /// Only sessions created at or after this instant
    pub since: Option<DateTime<Utc>>,
}

impl SessionFilter {
    fn matches(&self, session: &AnalysisSession) -> bool {
        if let Some(status) = self.status {
            if session.status != status {
                return false;
            }
        }
        if let Some(domain) = &self.domain {
            if !session.market_domain.eq_ignore_ascii_case(domain) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if session.created_at < since {
                return false;
            }
        }
        true
    }
}

/// Storage backend for analysis sessions
///
/// The seam where a durable backend (sqlite, postgres) would plug in; the
/// default deployment uses [`InMemorySessionStore`].
#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// Insert a new session; errors if the id already exists
    async fn create(&self, session: AnalysisSession) -> Result<()>;

    /// Overwrite an existing session
    ///
    /// Errors if the session is unknown or the stored copy has already
    /// reached a terminal status.
    async fn save(&self, session: AnalysisSession) -> Result<()>;

    /// Fetch a session by id
    async fn get(&self, id: Uuid) -> Result<Option<AnalysisSession>>;

    /// List sessions matching the filter, newest first
    async fn list(&self, filter: &SessionFilter) -> Result<Vec<AnalysisSession>>;

    /// Remove a session; returns whether it existed
    async fn delete(&self, id: Uuid) -> Result<bool>;
}

/// In-memory session store
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, AnalysisSession>>>,
}

impl InMemorySessionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStorage for InMemorySessionStore {
    async fn create(&self, session: AnalysisSession) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.id) {
            return Err(IntelError::Store(format!(
                "session {} already exists",
                session.id
            )));
        }
        debug!("Creating session {}", session.id);
        sessions.insert(session.id, session);
        Ok(())
    }

    async fn save(&self, session: AnalysisSession) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        match sessions.get(&session.id) {
            None => Err(IntelError::Store(format!(
                "session {} does not exist",
                session.id
            ))),
            Some(existing) if existing.status.is_terminal() => Err(IntelError::Store(format!(
                "session {} is terminal and cannot be modified",
                session.id
            ))),
            Some(_) => {
                sessions.insert(session.id, session);
                Ok(())
            }
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<AnalysisSession>> {
        Ok(self.sessions.read().await.get(&id).cloned())
    }

    async fn list(&self, filter: &SessionFilter) -> Result<Vec<AnalysisSession>> {
        let sessions = self.sessions.read().await;
        let mut matched: Vec<AnalysisSession> = sessions
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matched)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.sessions.write().await.remove(&id).is_some())
    }
}

/// File-backed session store
///
/// Persists the session map as one JSON document at a fixed path, loaded
/// at open and rewritten after every mutation. One record per session
/// holds the full serialized state, so a later process can reopen past
/// analyses and ground follow-up questions in them.
pub struct JsonFileSessionStore {
    path: PathBuf,
    sessions: RwLock<HashMap<Uuid, AnalysisSession>>,
}

impl JsonFileSessionStore {
    /// Open a store at the given path, creating an empty one if absent
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let sessions = if path.exists() {
            let raw = fs::read_to_string(&path)
                .map_err(|e| IntelError::Store(format!("read {}: {e}", path.display())))?;
            serde_json::from_str(&raw)?
        } else {
            HashMap::new()
        };
        debug!("Opened session store at {}", path.display());
        Ok(Self {
            path,
            sessions: RwLock::new(sessions),
        })
    }

    /// Where this store persists its sessions
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, sessions: &HashMap<Uuid, AnalysisSession>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| IntelError::Store(format!("create {}: {e}", parent.display())))?;
            }
        }
        let raw = serde_json::to_string_pretty(sessions)?;
        fs::write(&self.path, raw)
            .map_err(|e| IntelError::Store(format!("write {}: {e}", self.path.display())))
    }
}

#[async_trait]
impl SessionStorage for JsonFileSessionStore {
    async fn create(&self, session: AnalysisSession) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.id) {
            return Err(IntelError::Store(format!(
                "session {} already exists",
                session.id
            )));
        }
        debug!("Creating session {}", session.id);
        sessions.insert(session.id, session);
        self.persist(&sessions)
    }

    async fn save(&self, session: AnalysisSession) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        match sessions.get(&session.id) {
            None => Err(IntelError::Store(format!(
                "session {} does not exist",
                session.id
            ))),
            Some(existing) if existing.status.is_terminal() => Err(IntelError::Store(format!(
                "session {} is terminal and cannot be modified",
                session.id
            ))),
            Some(_) => {
                sessions.insert(session.id, session);
                self.persist(&sessions)
            }
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<AnalysisSession>> {
        Ok(self.sessions.read().await.get(&id).cloned())
    }

    async fn list(&self, filter: &SessionFilter) -> Result<Vec<AnalysisSession>> {
        let sessions = self.sessions.read().await;
        let mut matched: Vec<AnalysisSession> = sessions
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matched)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let mut sessions = self.sessions.write().await;
        let existed = sessions.remove(&id).is_some();
        if existed {
            self.persist(&sessions)?;
        }
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(domain: &str) -> AnalysisSession {
        AnalysisSession::new("electric vehicle batteries", domain).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = InMemorySessionStore::new();
        let s = session("automotive");
        let id = s.id;

        store.create(s).await.unwrap();
        let fetched = store.get(id).await.unwrap().unwrap();
        assert_eq!(fetched.id, id);
        assert_eq!(fetched.status, SessionStatus::Pending);
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let store = InMemorySessionStore::new();
        let s = session("automotive");
        store.create(s.clone()).await.unwrap();
        assert!(store.create(s).await.is_err());
    }

    #[tokio::test]
    async fn test_save_unknown_session_rejected() {
        let store = InMemorySessionStore::new();
        assert!(store.save(session("automotive")).await.is_err());
    }

    #[tokio::test]
    async fn test_terminal_session_is_immutable() {
        let store = InMemorySessionStore::new();
        let mut s = session("automotive");
        store.create(s.clone()).await.unwrap();

        s.status = SessionStatus::Complete;
        store.save(s.clone()).await.unwrap();

        s.report = Some("tampered".to_string());
        let result = store.save(s).await;
        assert!(matches!(result, Err(IntelError::Store(_))));
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let store = InMemorySessionStore::new();
        let mut older = session("automotive");
        older.created_at = Utc::now() - chrono::Duration::hours(2);
        let newer = session("automotive");

        let (older_id, newer_id) = (older.id, newer.id);
        store.create(older).await.unwrap();
        store.create(newer).await.unwrap();

        let listed = store.list(&SessionFilter::default()).await.unwrap();
        assert_eq!(listed[0].id, newer_id);
        assert_eq!(listed[1].id, older_id);
    }

    #[tokio::test]
    async fn test_list_filters() {
        let store = InMemorySessionStore::new();
        let auto = session("automotive");
        let mut retail = session("retail");
        retail.status = SessionStatus::Running;

        store.create(auto.clone()).await.unwrap();
        store.create(retail.clone()).await.unwrap();

        let by_domain = store
            .list(&SessionFilter {
                domain: Some("Automotive".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_domain.len(), 1);
        assert_eq!(by_domain[0].id, auto.id);

        let by_status = store
            .list(&SessionFilter {
                status: Some(SessionStatus::Running),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_status.len(), 1);
        assert_eq!(by_status[0].id, retail.id);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = InMemorySessionStore::new();
        let s = session("automotive");
        let id = s.id;
        store.create(s).await.unwrap();

        assert!(store.delete(id).await.unwrap());
        assert!(!store.delete(id).await.unwrap());
        assert!(store.get(id).await.unwrap().is_none());
    }

    fn scratch_file() -> PathBuf {
        std::env::temp_dir().join(format!("intel-sessions-{}.json", Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let path = scratch_file();
        let s = session("automotive");
        let id = s.id;

        {
            let store = JsonFileSessionStore::open(&path).unwrap();
            store.create(s).await.unwrap();
        }

        let reopened = JsonFileSessionStore::open(&path).unwrap();
        let loaded = reopened.get(id).await.unwrap().unwrap();
        assert_eq!(loaded.id, id);
        assert_eq!(loaded.market_domain, "automotive");

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_file_store_delete_survives_reopen() {
        let path = scratch_file();
        let s = session("automotive");
        let id = s.id;

        {
            let store = JsonFileSessionStore::open(&path).unwrap();
            store.create(s).await.unwrap();
            assert!(store.delete(id).await.unwrap());
        }

        let reopened = JsonFileSessionStore::open(&path).unwrap();
        assert!(reopened.get(id).await.unwrap().is_none());

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_file_store_terminal_session_is_immutable() {
        let path = scratch_file();
        let store = JsonFileSessionStore::open(&path).unwrap();
        let mut s = session("automotive");
        store.create(s.clone()).await.unwrap();

        s.status = SessionStatus::Complete;
        store.save(s.clone()).await.unwrap();

        s.status = SessionStatus::Running;
        assert!(store.save(s).await.is_err());

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_file_store_missing_file_starts_empty() {
        let path = scratch_file();
        let store = JsonFileSessionStore::open(&path).unwrap();
        assert!(store.list(&SessionFilter::default()).await.unwrap().is_empty());
    }
}
