use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::warn;
use tourbook_core::{BookingDraft, BookingStatus, IntentHandle};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TerminalOutcome {
    Confirmed,
    Failed,
    Cancelled,
}

/// Orchestrator phase for one booking session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "phase", content = "outcome", rename_all = "snake_case")]
pub enum PaymentPhase {
    #[default]
    Idle,
    IntentRequested,
    AwaitingProviderAction,
    Reconciling,
    Terminal(TerminalOutcome),
}

impl PaymentPhase {
    /// Phase implied by a persisted booking status.
    pub fn from_status(status: BookingStatus) -> Self {
        match status {
            BookingStatus::Confirmed => PaymentPhase::Terminal(TerminalOutcome::Confirmed),
            BookingStatus::Cancelled => PaymentPhase::Terminal(TerminalOutcome::Cancelled),
            BookingStatus::Failed => PaymentPhase::Terminal(TerminalOutcome::Failed),
            BookingStatus::Processing => PaymentPhase::AwaitingProviderAction,
            BookingStatus::Draft | BookingStatus::PendingPayment => PaymentPhase::Idle,
        }
    }
}

impl fmt::Display for PaymentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentPhase::Idle => f.write_str("idle"),
            PaymentPhase::IntentRequested => f.write_str("intent_requested"),
            PaymentPhase::AwaitingProviderAction => f.write_str("awaiting_provider_action"),
            PaymentPhase::Reconciling => f.write_str("reconciling"),
            PaymentPhase::Terminal(TerminalOutcome::Confirmed) => f.write_str("terminal(confirmed)"),
            PaymentPhase::Terminal(TerminalOutcome::Failed) => f.write_str("terminal(failed)"),
            PaymentPhase::Terminal(TerminalOutcome::Cancelled) => f.write_str("terminal(cancelled)"),
        }
    }
}

/// The explicit state of one customer's booking flow, kept between requests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentSession {
    pub session_id: String,
    pub draft: Option<BookingDraft>,
    pub booking_id: Option<Uuid>,
    pub phase: PaymentPhase,
    pub active_intent: Option<IntentHandle>,
    pub attempts: u32,
    pub updated_at: DateTime<Utc>,
}

impl PaymentSession {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            draft: None,
            booking_id: None,
            phase: PaymentPhase::Idle,
            active_intent: None,
            attempts: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionStoreError {
    #[error("Session store unavailable: {0}")]
    Unavailable(String),

    #[error("Stored session is malformed: {0}")]
    Corrupt(String),
}

/// Persistence of payment sessions plus a per-session mutual exclusion.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, session_id: &str) -> Result<Option<PaymentSession>, SessionStoreError>;

    async fn save(&self, session: &PaymentSession) -> Result<(), SessionStoreError>;

    /// Take the session lock. `false` when another operation holds it.
    async fn try_lock(&self, session_id: &str) -> Result<bool, SessionStoreError>;

    async fn unlock(&self, session_id: &str) -> Result<(), SessionStoreError>;
}

/// Lock lifetime when none is configured.
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(30);

/// Process-local session store. Sessions do not survive a restart.
///
/// Locks expire after `lock_ttl`, so an operation that never unlocks (a dropped
/// request future) does not block its session for good.
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, PaymentSession>>,
    locks: Mutex<HashMap<String, Instant>>,
    lock_ttl: Duration,
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::with_lock_ttl(DEFAULT_LOCK_TTL)
    }
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lock_ttl(lock_ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
            lock_ttl,
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<PaymentSession>, SessionStoreError> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn save(&self, session: &PaymentSession) -> Result<(), SessionStoreError> {
        self.sessions
            .write()
            .await
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn try_lock(&self, session_id: &str) -> Result<bool, SessionStoreError> {
        let now = Instant::now();
        let mut locks = self.locks.lock().await;
        if let Some(expires_at) = locks.get(session_id) {
            if *expires_at > now {
                return Ok(false);
            }
            warn!(session_id, "Session lock expired without release; taking it over");
        }
        locks.insert(session_id.to_string(), now + self.lock_ttl);
        Ok(true)
    }

    async fn unlock(&self, session_id: &str) -> Result<(), SessionStoreError> {
        self.locks.lock().await.remove(session_id);
        Ok(())
    }
}
