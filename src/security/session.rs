//! Session lifecycle with anti-hijack checks.
//!
//! Sessions are bound to the principal that created them. A token presented
//! by anyone else is treated as a hijack attempt: the attempt is audited and
//! the session is expired on the spot.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;
use serde_json::json;

use crate::audit::severity::{actions, ThreatLevel};
use crate::audit::AuditLog;
use crate::clock::{Millis, SharedClock};
use crate::error::SessionInvalid;

const TOKEN_BYTES: usize = 32;

/// A principal's authenticated session.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: String,
    pub principal_id: String,
    pub created_at: Millis,
    pub last_activity_at: Millis,
    pub is_active: bool,
    /// Set when the session stops being active.
    pub expired_at: Option<Millis>,
    pub rotation_count: u32,
    pub threat_level: ThreatLevel,
    pub meta: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub active: usize,
    /// Live sessions plus inactive tombstones.
    pub tracked: usize,
    pub principals: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    pub expired: usize,
    pub purged: usize,
}

/// Owns every session and the per-principal live index.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: DashMap<String, Session>,
    live: DashMap<String, HashSet<String>>,
    timeout_ms: AtomicU64,
    audit: Arc<AuditLog>,
    clock: SharedClock,
}

fn new_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Short prefix safe to put in logs.
fn token_hint(session_id: &str) -> &str {
    session_id.get(..8).unwrap_or(session_id)
}

impl SessionRegistry {
    pub fn new(timeout: Duration, audit: Arc<AuditLog>, clock: SharedClock) -> Self {
        Self {
            sessions: DashMap::new(),
            live: DashMap::new(),
            timeout_ms: AtomicU64::new(timeout.as_millis() as u64),
            audit,
            clock,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.load(Ordering::Relaxed))
    }

    pub fn set_timeout(&self, timeout: Duration) {
        self.timeout_ms
            .store(timeout.as_millis() as u64, Ordering::Relaxed);
    }

    /// Open a session and return its token.
    pub fn create_session(&self, principal_id: &str, meta: HashMap<String, String>) -> String {
        self.insert_session(principal_id, meta, 0, ThreatLevel::default())
    }

    fn insert_session(
        &self,
        principal_id: &str,
        meta: HashMap<String, String>,
        rotation_count: u32,
        threat_level: ThreatLevel,
    ) -> String {
        let now = self.clock.now_ms();
        let mut session = Session {
            id: String::new(),
            principal_id: principal_id.to_string(),
            created_at: now,
            last_activity_at: now,
            is_active: true,
            expired_at: None,
            rotation_count,
            threat_level,
            meta,
        };

        let id = loop {
            let candidate = new_token();
            if let Entry::Vacant(slot) = self.sessions.entry(candidate.clone()) {
                session.id = candidate.clone();
                slot.insert(session);
                break candidate;
            }
        };

        self.live
            .entry(principal_id.to_string())
            .or_default()
            .insert(id.clone());

        self.audit.log_event(
            principal_id,
            actions::SESSION_CREATED,
            json!({ "session": token_hint(&id), "rotation": rotation_count }),
        );
        tracing::debug!(principal = %principal_id, session = token_hint(&id), "Session created");
        id
    }

    /// Check that `session_id` is live, unexpired and owned by `principal_id`.
    ///
    /// Success refreshes `last_activity_at`.
    pub fn validate_session(
        &self,
        session_id: &str,
        principal_id: &str,
    ) -> Result<(), SessionInvalid> {
        let now = self.clock.now_ms();
        let timeout_ms = self.timeout_ms.load(Ordering::Relaxed);

        let outcome = match self.sessions.get_mut(session_id) {
            None => Err((SessionInvalid::NotFound, None)),
            Some(mut session) => {
                if session.principal_id != principal_id {
                    Err((SessionInvalid::Mismatch, Some(session.principal_id.clone())))
                } else if !session.is_active {
                    Err((SessionInvalid::Inactive, None))
                } else if now.saturating_sub(session.created_at) >= timeout_ms {
                    Err((SessionInvalid::Expired, None))
                } else {
                    session.last_activity_at = now;
                    Ok(())
                }
            }
        };

        let Err((reason, owner)) = outcome else {
            return Ok(());
        };

        match reason {
            SessionInvalid::Mismatch => {
                tracing::warn!(
                    principal = %principal_id,
                    owner = ?owner,
                    session = token_hint(session_id),
                    "Session presented by a different principal"
                );
                self.audit.log_event(
                    principal_id,
                    actions::SESSION_HIJACK_ATTEMPT,
                    json!({ "session": token_hint(session_id), "owner": owner }),
                );
                self.expire_session(session_id, "hijack_attempt");
            }
            SessionInvalid::Expired => {
                self.audit.log_event(
                    principal_id,
                    actions::INVALID_SESSION,
                    json!({ "reason": reason.as_str() }),
                );
                self.expire_session(session_id, "timeout");
            }
            SessionInvalid::NotFound | SessionInvalid::Inactive => {
                self.audit.log_event(
                    principal_id,
                    actions::INVALID_SESSION,
                    json!({ "reason": reason.as_str() }),
                );
            }
        }
        Err(reason)
    }

    /// Mark a session inactive and drop it from the live index.
    ///
    /// Returns `false` when the session was unknown or already inactive.
    pub fn expire_session(&self, session_id: &str, reason: &str) -> bool {
        let principal_id = {
            let Some(mut session) = self.sessions.get_mut(session_id) else {
                return false;
            };
            if !session.is_active {
                return false;
            }
            session.is_active = false;
            session.expired_at = Some(self.clock.now_ms());
            session.principal_id.clone()
        };

        if let Some(mut ids) = self.live.get_mut(&principal_id) {
            ids.remove(session_id);
        }
        self.live.remove_if(&principal_id, |_, ids| ids.is_empty());

        self.audit.log_event(
            &principal_id,
            actions::SESSION_EXPIRED,
            json!({ "session": token_hint(session_id), "reason": reason }),
        );
        tracing::debug!(
            principal = %principal_id,
            session = token_hint(session_id),
            reason,
            "Session expired"
        );
        true
    }

    /// Replace a valid session with a fresh token carrying the same metadata.
    pub fn rotate_session(
        &self,
        session_id: &str,
        principal_id: &str,
    ) -> Result<String, SessionInvalid> {
        self.validate_session(session_id, principal_id)?;

        let (meta, rotation_count, threat_level) = {
            let session = self
                .sessions
                .get(session_id)
                .ok_or(SessionInvalid::NotFound)?;
            (
                session.meta.clone(),
                session.rotation_count.saturating_add(1),
                session.threat_level,
            )
        };

        let new_id = self.insert_session(principal_id, meta, rotation_count, threat_level);
        self.expire_session(session_id, "rotated");
        self.audit.log_event(
            principal_id,
            actions::SESSION_ROTATED,
            json!({
                "from": token_hint(session_id),
                "to": token_hint(&new_id),
                "rotation": rotation_count,
            }),
        );
        Ok(new_id)
    }

    /// Expire every live session of a principal. Returns how many were expired.
    pub fn expire_principal_sessions(&self, principal_id: &str, reason: &str) -> usize {
        let ids: Vec<String> = self
            .live
            .get(principal_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default();

        ids.iter()
            .filter(|id| self.expire_session(id, reason))
            .count()
    }

    /// Set the threat level on every live session of a principal.
    pub fn set_threat_level(&self, principal_id: &str, level: ThreatLevel) -> usize {
        let ids: Vec<String> = self
            .live
            .get(principal_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default();

        let mut updated = 0;
        for id in ids {
            if let Some(mut session) = self.sessions.get_mut(&id) {
                session.threat_level = level;
                updated += 1;
            }
        }
        updated
    }

    /// Expire sessions older than the timeout, then purge tombstones that
    /// have been inactive for a full timeout period.
    pub fn sweep_expired(&self) -> SweepOutcome {
        let now = self.clock.now_ms();
        let timeout_ms = self.timeout_ms.load(Ordering::Relaxed);

        let stale: Vec<String> = self
            .sessions
            .iter()
            .filter(|s| s.is_active && now.saturating_sub(s.created_at) >= timeout_ms)
            .map(|s| s.id.clone())
            .collect();
        let expired = stale
            .iter()
            .filter(|id| self.expire_session(id, "timeout"))
            .count();

        let before = self.sessions.len();
        self.sessions.retain(|_, s| match s.expired_at {
            Some(at) => now.saturating_sub(at) < timeout_ms,
            None => true,
        });
        let purged = before.saturating_sub(self.sessions.len());

        if expired > 0 || purged > 0 {
            tracing::debug!(expired, purged, "Session sweep complete");
        }
        SweepOutcome { expired, purged }
    }

    pub fn get_session(&self, session_id: &str) -> Option<Session> {
        self.sessions.get(session_id).map(|s| s.clone())
    }

    pub fn active_count(&self) -> usize {
        self.live.iter().map(|ids| ids.len()).sum()
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            active: self.active_count(),
            tracked: self.sessions.len(),
            principals: self.live.len(),
        }
    }
}
