//! Session table for the stateful HTTP transport.
//!
//! Sessions are created on initialization requests, touched on every
//! subsequent request, pruned by TTL before dispatch, and evicted
//! least-recently-seen when the table is full. All table operations run
//! under one lock.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use uuid::Uuid;

/// One live session binding.
#[derive(Debug, Clone)]
pub struct SessionRuntime {
    pub session_id: String,
    pub created_at: Instant,
    /// Monotonically non-decreasing within a session.
    pub last_seen_at: Instant,
}

#[derive(Debug)]
pub struct SessionManager {
    ttl: Duration,
    max_sessions: usize,
    sessions: Mutex<HashMap<String, SessionRuntime>>,
}

impl SessionManager {
    pub fn new(ttl: Duration, max_sessions: usize) -> Self {
        Self {
            ttl,
            max_sessions: max_sessions.max(1),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Drop every session idle for longer than the TTL. Runs before each
    /// dispatch.
    pub fn prune(&self, now: Instant) {
        let mut sessions = self.sessions.lock().unwrap();
        let before = sessions.len();
        sessions.retain(|_, session| {
            now.saturating_duration_since(session.last_seen_at) <= self.ttl
        });
        let dropped = before - sessions.len();
        if dropped > 0 {
            tracing::debug!(dropped, "pruned expired sessions");
        }
    }

    /// Create a session, evicting the least-recently-seen one first when the
    /// table is full. Ties break on the smaller session id, so eviction is
    /// deterministic.
    pub fn create(&self, now: Instant) -> SessionRuntime {
        let mut sessions = self.sessions.lock().unwrap();
        while sessions.len() >= self.max_sessions {
            let victim = sessions
                .values()
                .min_by(|a, b| {
                    a.last_seen_at
                        .cmp(&b.last_seen_at)
                        .then_with(|| a.session_id.cmp(&b.session_id))
                })
                .map(|session| session.session_id.clone());
            match victim {
                Some(id) => {
                    tracing::info!(session_id = %id, "evicting least-recently-seen session");
                    sessions.remove(&id);
                }
                None => break,
            }
        }

        let session = SessionRuntime {
            session_id: Uuid::new_v4().to_string(),
            created_at: now,
            last_seen_at: now,
        };
        sessions.insert(session.session_id.clone(), session.clone());
        session
    }

    /// Refresh `last_seen_at` for a known session. Returns false for unknown
    /// ids.
    pub fn touch(&self, session_id: &str, now: Instant) -> bool {
        let mut sessions = self.sessions.lock().unwrap();
        match sessions.get_mut(session_id) {
            Some(session) => {
                if now > session.last_seen_at {
                    session.last_seen_at = now;
                }
                true
            }
            None => false,
        }
    }

    /// Client-issued close. Idempotent.
    pub fn remove(&self, session_id: &str) -> bool {
        self.sessions.lock().unwrap().remove(session_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Graceful shutdown: close everything.
    pub fn close_all(&self) {
        let mut sessions = self.sessions.lock().unwrap();
        let count = sessions.len();
        sessions.clear();
        if count > 0 {
            tracing::info!(count, "closed all sessions");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_touch() {
        let manager = SessionManager::new(Duration::from_secs(60), 4);
        let now = Instant::now();
        let session = manager.create(now);
        assert_eq!(manager.len(), 1);

        let later = now + Duration::from_secs(1);
        assert!(manager.touch(&session.session_id, later));
        assert!(!manager.touch("unknown", later));
    }

    #[test]
    fn test_ttl_prune() {
        let manager = SessionManager::new(Duration::from_millis(1000), 4);
        let start = Instant::now();
        manager.create(start);

        // A second initialization at T+2000ms observes one session, not two.
        let later = start + Duration::from_millis(2000);
        manager.prune(later);
        assert_eq!(manager.len(), 0);
        manager.create(later);
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_capacity_eviction_is_lru() {
        let manager = SessionManager::new(Duration::from_secs(60), 2);
        let start = Instant::now();
        let first = manager.create(start);
        let second = manager.create(start + Duration::from_millis(10));

        // Touch the first so the second becomes least-recently-seen.
        manager.touch(&first.session_id, start + Duration::from_millis(20));

        let third = manager.create(start + Duration::from_millis(30));
        assert_eq!(manager.len(), 2);
        assert!(manager.touch(&first.session_id, start + Duration::from_millis(40)));
        assert!(manager.touch(&third.session_id, start + Duration::from_millis(40)));
        assert!(!manager.touch(&second.session_id, start + Duration::from_millis(40)));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let manager = SessionManager::new(Duration::from_secs(60), 4);
        let session = manager.create(Instant::now());
        assert!(manager.remove(&session.session_id));
        assert!(!manager.remove(&session.session_id));
    }

    #[test]
    fn test_close_all() {
        let manager = SessionManager::new(Duration::from_secs(60), 4);
        let now = Instant::now();
        manager.create(now);
        manager.create(now);
        manager.close_all();
        assert!(manager.is_empty());
    }

    #[test]
    fn test_capacity_never_exceeded() {
        let manager = SessionManager::new(Duration::from_secs(60), 3);
        let start = Instant::now();
        for offset in 0..10 {
            manager.create(start + Duration::from_millis(offset));
            assert!(manager.len() <= 3);
        }
    }
}
