use crate::error::Result;
use redis::{AsyncCommands, Client, aio::ConnectionManager};

/// Redis access for session lookups and rate limiting.
///
/// `ConnectionManager` multiplexes one reconnecting connection; clones share it.
#[derive(Clone)]
pub struct RedisClient {
    manager: ConnectionManager,
}

impl RedisClient {
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self { manager })
    }

    /// Counts one hit against `key` and reports whether it is still within
    /// `limit` for the current window.
    pub async fn check_rate_limit(
        &self,
        key: &str,
        limit: u32,
        window_seconds: u64,
    ) -> Result<bool> {
        let mut conn = self.manager.clone();
        let key = format!("rate_limit:{}", key);

        let current: u32 = conn.incr(&key, 1).await?;
        if current == 1 {
            let _: () = conn.expire(&key, window_seconds as i64).await?;
        }

        Ok(current <= limit)
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<String>> {
        let mut conn = self.manager.clone();
        let key = format!("session:{}", session_id);

        let user_id: Option<String> = conn.get(key).await?;
        Ok(user_id)
    }
}
