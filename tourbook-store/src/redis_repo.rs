use async_trait::async_trait;
use redis::AsyncCommands;
use tourbook_booking::{PaymentSession, SessionStore, SessionStoreError};
use tracing::{debug, warn};

/// Payment sessions as JSON strings with a sliding TTL, plus a `SET NX EX` lock per session.
#[derive(Clone)]
pub struct RedisSessionStore {
    client: redis::Client,
    ttl_seconds: u64,
    lock_seconds: u64,
}

impl RedisSessionStore {
    pub fn new(connection_string: &str, ttl_seconds: u64, lock_seconds: u64) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self {
            client,
            ttl_seconds,
            lock_seconds,
        })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, SessionStoreError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(unavailable)
    }
}

fn session_key(session_id: &str) -> String {
    format!("session:{}", session_id)
}

fn lock_key(session_id: &str) -> String {
    format!("session:{}:lock", session_id)
}

fn unavailable(e: redis::RedisError) -> SessionStoreError {
    SessionStoreError::Unavailable(e.to_string())
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<PaymentSession>, SessionStoreError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn.get(session_key(session_id)).await.map_err(unavailable)?;

        match raw {
            Some(json) => serde_json::from_str(&json).map(Some).map_err(|e| {
                warn!(session_id, "Stored session does not deserialize: {}", e);
                SessionStoreError::Corrupt(e.to_string())
            }),
            None => Ok(None),
        }
    }

    async fn save(&self, session: &PaymentSession) -> Result<(), SessionStoreError> {
        let json = serde_json::to_string(session).map_err(|e| SessionStoreError::Corrupt(e.to_string()))?;
        let mut conn = self.connection().await?;
        conn.set_ex::<_, _, ()>(session_key(&session.session_id), json, self.ttl_seconds)
            .await
            .map_err(unavailable)?;
        debug!(session_id = %session.session_id, phase = %session.phase, "Session saved");
        Ok(())
    }

    async fn try_lock(&self, session_id: &str) -> Result<bool, SessionStoreError> {
        let mut conn = self.connection().await?;

        // SET NX: only set if key does not exist. The expiry frees a lock whose holder crashed.
        let result: Option<String> = redis::cmd("SET")
            .arg(lock_key(session_id))
            .arg("locked")
            .arg("NX")
            .arg("EX")
            .arg(self.lock_seconds)
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;

        Ok(result.is_some())
    }

    async fn unlock(&self, session_id: &str) -> Result<(), SessionStoreError> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(lock_key(session_id)).await.map_err(unavailable)
    }
}
