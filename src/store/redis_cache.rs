//! Redis-backed cache

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{with_timeout, Cache, StoreError, StoreResult};

// GET and DEL in one server-side step so a mismatched value is left in place
const TAKE_IF_EQ_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

fn map_redis(e: redis::RedisError) -> StoreError {
    if e.is_timeout() {
        StoreError::Timeout(e.to_string())
    } else {
        StoreError::Unavailable(e.to_string())
    }
}

/// Cache over a multiplexed, auto-reconnecting Redis connection
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    op_timeout: Duration,
}

impl RedisCache {
    /// Open a connection manager, bounding the initial connect by `connect_timeout`
    pub async fn connect(
        url: &str,
        connect_timeout: Duration,
        op_timeout: Duration,
    ) -> StoreResult<Self> {
        let client = redis::Client::open(url).map_err(map_redis)?;
        let conn = with_timeout(connect_timeout, "redis.connect", async {
            ConnectionManager::new(client).await.map_err(map_redis)
        })
        .await?;

        Ok(Self { conn, op_timeout })
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        with_timeout(self.op_timeout, "redis.get", async move {
            conn.get::<_, Option<String>>(key).await.map_err(map_redis)
        })
        .await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        // Redis rejects a zero expiry
        let seconds = ttl.as_secs().max(1);
        with_timeout(self.op_timeout, "redis.set_ex", async move {
            conn.set_ex::<_, _, ()>(key, value, seconds)
                .await
                .map_err(map_redis)
        })
        .await
    }

    async fn take_if_eq(&self, key: &str, expected: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let script = redis::Script::new(TAKE_IF_EQ_SCRIPT);
        with_timeout(self.op_timeout, "redis.take_if_eq", async move {
            let removed: i64 = script
                .key(key)
                .arg(expected)
                .invoke_async(&mut conn)
                .await
                .map_err(map_redis)?;
            Ok(removed == 1)
        })
        .await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        with_timeout(self.op_timeout, "redis.del", async move {
            conn.del::<_, ()>(key).await.map_err(map_redis)
        })
        .await
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        with_timeout(self.op_timeout, "redis.ping", async move {
            redis::cmd("PING")
                .query_async::<_, String>(&mut conn)
                .await
                .map(|_| ())
                .map_err(map_redis)
        })
        .await
    }
}
