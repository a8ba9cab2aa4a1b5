//! # Session Store
//!
//! Conversation state for multi-step chat flows (pick product → quantity →
//! coupon → payment method). Each step names the step it expects the
//! account to be at, so a stale button press cannot skip ahead.
//!
//! ```text
//! start(7, "choose_product")
//! advance(7, "choose_product", "enter_quantity")   ok
//! advance(7, "choose_product", "enter_quantity")   SessionConflict (now at enter_quantity)
//! ```
//!
//! ## Thread Safety
//! The map sits behind `Arc<Mutex<_>>`; every call holds the lock only for
//! the map operation itself.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use vendo_core::AccountId;

use crate::clock::Clock;
use crate::error::{EngineError, EngineResult};

/// One account's position in a chat flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Changes on every `start`; lets the chat layer ignore replies meant
    /// for an earlier conversation.
    pub token: Uuid,
    pub account_id: AccountId,
    pub step: String,
    /// Values collected so far.
    pub data: Map<String, Value>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Mutex<HashMap<AccountId, Session>>>,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        SessionStore {
            inner: Arc::new(Mutex::new(HashMap::new())),
            clock,
        }
    }

    fn map(&self) -> MutexGuard<'_, HashMap<AccountId, Session>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Starts a fresh flow, replacing whatever the account was doing.
    pub fn start(&self, account_id: AccountId, step: &str) -> Session {
        let now = self.clock.now();
        let session = Session {
            token: Uuid::new_v4(),
            account_id,
            step: step.to_string(),
            data: Map::new(),
            started_at: now,
            updated_at: now,
        };
        self.map().insert(account_id, session.clone());
        debug!(account_id, step, "Session started");
        session
    }

    pub fn get(&self, account_id: AccountId) -> Option<Session> {
        self.map().get(&account_id).cloned()
    }

    /// Moves from `expected` to `next`.
    pub fn advance(&self, account_id: AccountId, expected: &str, next: &str) -> EngineResult<Session> {
        let now = self.clock.now();
        let mut map = self.map();

        let Some(session) = map.get_mut(&account_id) else {
            return Err(EngineError::SessionConflict {
                account_id,
                expected: expected.to_string(),
                actual: "none".to_string(),
            });
        };
        if session.step != expected {
            return Err(EngineError::SessionConflict {
                account_id,
                expected: expected.to_string(),
                actual: session.step.clone(),
            });
        }

        session.step = next.to_string();
        session.updated_at = now;
        Ok(session.clone())
    }

    /// Stores a collected value. Returns false when no flow is running.
    pub fn put(&self, account_id: AccountId, key: &str, value: Value) -> bool {
        let now = self.clock.now();
        match self.map().get_mut(&account_id) {
            Some(session) => {
                session.data.insert(key.to_string(), value);
                session.updated_at = now;
                true
            }
            None => false,
        }
    }

    pub fn clear(&self, account_id: AccountId) -> Option<Session> {
        self.map().remove(&account_id)
    }

    /// Drops sessions untouched for longer than `max_idle`.
    pub fn prune_idle(&self, max_idle: Duration) -> usize {
        let cutoff = self.clock.now() - max_idle;
        let mut map = self.map();
        let before = map.len();
        map.retain(|_, s| s.updated_at > cutoff);
        before - map.len()
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }
}
