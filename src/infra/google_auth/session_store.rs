// In-memory sessions for the web redirect flow.
//
// **DashMap:**
// Each connection is handled on its own task, so sessions live in a
// concurrent map keyed by the `session_id` cookie. Nothing is written to
// disk; restarting the server logs everyone out.
//
// **Limits:**
// A session idle for longer than the TTL is dropped the next time it is
// looked up or a session is created. The map never holds more than
// `max_sessions` entries; creating one past the cap evicts the least
// recently used.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use super::oauth_config::new_state_token;
use crate::core::auth::{AuthError, Credential, CredentialStore};

pub const SESSION_COOKIE: &str = "session_id";
pub const DEFAULT_SESSION_IDLE_MINUTES: i64 = 60;
pub const DEFAULT_MAX_SESSIONS: usize = 10_000;

#[derive(Debug, Clone, Default)]
pub struct SessionData {
    pub credential: Option<Credential>,
    /// `state` sent with the pending authorization request, if any.
    pub oauth_state: Option<String>,
}

struct SessionEntry {
    data: SessionData,
    last_seen: DateTime<Utc>,
    /// Bumped on every use; orders entries for eviction.
    use_seq: u64,
}

pub struct SessionStore {
    sessions: DashMap<String, SessionEntry>,
    idle_ttl: Duration,
    max_sessions: usize,
    seq: AtomicU64,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_limits(
            Duration::minutes(DEFAULT_SESSION_IDLE_MINUTES),
            DEFAULT_MAX_SESSIONS,
        )
    }
}

impl SessionStore {
    pub fn with_limits(idle_ttl: Duration, max_sessions: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            idle_ttl,
            max_sessions: max_sessions.max(1),
            seq: AtomicU64::new(0),
        }
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    fn is_expired(&self, entry: &SessionEntry, now: DateTime<Utc>) -> bool {
        now - entry.last_seen >= self.idle_ttl
    }

    /// Drops every session idle for longer than the TTL.
    pub fn prune_expired(&self) {
        let now = Utc::now();
        let ttl = self.idle_ttl;
        self.sessions.retain(|_, entry| now - entry.last_seen < ttl);
    }

    fn evict_least_recently_used(&self) {
        let oldest = self
            .sessions
            .iter()
            .min_by_key(|entry| entry.value().use_seq)
            .map(|entry| entry.key().clone());

        if let Some(id) = oldest {
            tracing::debug!("Session limit reached, evicting least recently used session");
            self.sessions.remove(&id);
        }
    }

    /// Starts an empty session and returns its id.
    pub fn create(&self) -> String {
        self.prune_expired();
        while self.sessions.len() >= self.max_sessions {
            self.evict_least_recently_used();
        }

        let id = new_state_token();
        self.sessions.insert(
            id.clone(),
            SessionEntry {
                data: SessionData::default(),
                last_seen: Utc::now(),
                use_seq: self.next_seq(),
            },
        );
        tracing::debug!("Session created ({} active)", self.sessions.len());
        id
    }

    /// Marks the session as used. Returns `false` (and forgets it) when it has expired.
    pub fn touch(&self, session_id: &str) -> bool {
        let now = Utc::now();
        let live = match self.sessions.get_mut(session_id) {
            Some(mut entry) if !self.is_expired(&entry, now) => {
                entry.last_seen = now;
                entry.use_seq = self.next_seq();
                true
            }
            Some(_) => false,
            None => return false,
        };

        if !live {
            self.sessions.remove(session_id);
        }
        live
    }

    /// Like [`SessionStore::touch`] without refreshing the idle timer.
    #[cfg(test)]
    pub fn contains(&self, session_id: &str) -> bool {
        let now = Utc::now();
        self.sessions
            .get(session_id)
            .is_some_and(|entry| !self.is_expired(&entry, now))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn get(&self, session_id: &str) -> Option<SessionData> {
        self.sessions.get(session_id).map(|s| s.data.clone())
    }

    /// Setters ignore unknown ids; an expired session stays gone.
    pub fn set_credential(&self, session_id: &str, credential: Option<Credential>) {
        if let Some(mut entry) = self.sessions.get_mut(session_id) {
            entry.data.credential = credential;
        }
    }

    pub fn set_state(&self, session_id: &str, state: String) {
        if let Some(mut entry) = self.sessions.get_mut(session_id) {
            entry.data.oauth_state = Some(state);
        }
    }

    /// Removes and returns the pending `state`. Each state is good for one callback.
    pub fn take_state(&self, session_id: &str) -> Option<String> {
        self.sessions
            .get_mut(session_id)
            .and_then(|mut s| s.data.oauth_state.take())
    }

    pub fn remove(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }
}

/// [`CredentialStore`] view of one session.
pub struct SessionCredentialStore {
    sessions: Arc<SessionStore>,
    session_id: String,
}

impl SessionCredentialStore {
    pub fn new(sessions: Arc<SessionStore>, session_id: impl Into<String>) -> Self {
        Self {
            sessions,
            session_id: session_id.into(),
        }
    }
}

#[async_trait]
impl CredentialStore for SessionCredentialStore {
    async fn load(&self) -> Result<Option<Credential>, AuthError> {
        Ok(self
            .sessions
            .get(&self.session_id)
            .and_then(|s| s.credential))
    }

    async fn save(&self, credential: &Credential) -> Result<(), AuthError> {
        self.sessions
            .set_credential(&self.session_id, Some(credential.clone()));
        Ok(())
    }

    async fn clear(&self) -> Result<(), AuthError> {
        self.sessions.set_credential(&self.session_id, None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential() -> Credential {
        Credential {
            access_token: "ya29.session".to_string(),
            refresh_token: None,
            expiry: None,
            scopes: vec![],
        }
    }

    #[test]
    fn state_can_only_be_taken_once() {
        let store = SessionStore::default();
        let id = store.create();

        store.set_state(&id, "s1".to_string());
        assert_eq!(store.take_state(&id).as_deref(), Some("s1"));
        assert_eq!(store.take_state(&id), None);
    }

    #[test]
    fn sessions_are_isolated() {
        let store = SessionStore::default();
        let a = store.create();
        let b = store.create();
        assert_ne!(a, b);

        store.set_credential(&a, Some(credential()));
        assert!(store.get(&a).unwrap().credential.is_some());
        assert!(store.get(&b).unwrap().credential.is_none());

        store.remove(&a);
        assert!(!store.contains(&a));
        assert!(store.contains(&b));
    }

    #[test]
    fn setters_do_not_create_sessions() {
        let store = SessionStore::default();
        store.set_state("unknown", "s".to_string());
        store.set_credential("unknown", Some(credential()));
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn idle_sessions_expire() {
        let store = SessionStore::with_limits(Duration::zero(), 100);
        let id = store.create();

        assert!(!store.contains(&id));
        assert!(!store.touch(&id));
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn creating_a_session_prunes_expired_ones() {
        let store = SessionStore::with_limits(Duration::zero(), 100);
        for _ in 0..10 {
            store.create();
        }
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn live_sessions_survive_touch() {
        let store = SessionStore::with_limits(Duration::hours(1), 100);
        let id = store.create();
        assert!(store.touch(&id));
        assert!(store.contains(&id));
    }

    #[test]
    fn session_count_is_capped_and_evicts_least_recently_used() {
        let store = SessionStore::with_limits(Duration::hours(1), 3);
        let a = store.create();
        let b = store.create();
        let c = store.create();

        // `a` becomes the most recently used, so `b` goes first.
        assert!(store.touch(&a));
        let d = store.create();

        assert_eq!(store.len(), 3);
        assert!(store.contains(&a));
        assert!(!store.contains(&b));
        assert!(store.contains(&c));
        assert!(store.contains(&d));

        for _ in 0..1000 {
            store.create();
        }
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn credential_store_view_round_trips() {
        let sessions = Arc::new(SessionStore::default());
        let id = sessions.create();
        let view = SessionCredentialStore::new(Arc::clone(&sessions), id.clone());

        assert_eq!(view.load().await.unwrap(), None);
        view.save(&credential()).await.unwrap();
        assert_eq!(view.load().await.unwrap(), Some(credential()));
        view.clear().await.unwrap();
        assert_eq!(sessions.get(&id).unwrap().credential, None);
    }
}
