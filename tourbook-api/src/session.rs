use tourbook_booking::{PaymentOrchestrator, PaymentSession};
use tracing::warn;

use crate::error::AppError;
use crate::state::AppState;

const MAX_SESSION_ID_LEN: usize = 128;

pub fn validate_session_id(session_id: &str) -> Result<(), AppError> {
    let well_formed = !session_id.is_empty()
        && session_id.len() <= MAX_SESSION_ID_LEN
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if well_formed {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!("Invalid session id: {:?}", session_id)))
    }
}

/// An orchestrator bound to a locked session. Must be handed back through `release`.
pub struct SessionLease {
    pub orchestrator: PaymentOrchestrator,
}

impl SessionLease {
    /// Take the per-session lock and load the session, starting a fresh one if none exists.
    pub async fn acquire(state: &AppState, session_id: &str) -> Result<Self, AppError> {
        validate_session_id(session_id)?;
        if !state.sessions.try_lock(session_id).await? {
            return Err(AppError::SessionBusy(session_id.to_string()));
        }

        let session = match state.sessions.load(session_id).await {
            Ok(Some(session)) => session,
            Ok(None) => PaymentSession::new(session_id),
            Err(e) => {
                unlock(state, session_id).await;
                return Err(e.into());
            }
        };

        Ok(Self {
            orchestrator: PaymentOrchestrator::new(state.services.clone(), session),
        })
    }

    /// Persist the session, whatever the operation's result was, and drop the lock.
    /// A session that never got a draft is not written.
    pub async fn release(self, state: &AppState) -> Result<(), AppError> {
        let session = self.orchestrator.into_session();
        let saved = if session.draft.is_some() || session.booking_id.is_some() {
            state.sessions.save(&session).await
        } else {
            Ok(())
        };
        unlock(state, &session.session_id).await;
        saved.map_err(AppError::from)
    }
}

/// Read a session without locking it. `None` when the session is unknown.
pub async fn peek(state: &AppState, session_id: &str) -> Result<Option<PaymentOrchestrator>, AppError> {
    validate_session_id(session_id)?;
    Ok(state
        .sessions
        .load(session_id)
        .await?
        .map(|session| PaymentOrchestrator::new(state.services.clone(), session)))
}

async fn unlock(state: &AppState, session_id: &str) {
    // The lock expires on its own if this fails.
    if let Err(e) = state.sessions.unlock(session_id).await {
        warn!(session_id, "Failed to release session lock: {}", e);
    }
}
