//! Redis Fast Store
//!
//! Holds the packed board snapshot and every rate-limit key. Multi-step
//! operations run as Lua scripts so each one is atomic on the server, and
//! every call is bounded by a client-side timeout that surfaces as a store
//! error instead of a hung request.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use pixels_core::{PixelsResult, StoreError, StoreKind, ValidationError};
use pixels_storage::{FastStore, WindowOutcome, WindowRequest};
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{Client, RedisResult, Script};

use crate::constants::{DEFAULT_REDIS_RETRIES, DEFAULT_REDIS_TIMEOUT_MS};
use crate::error::ApiResult;

/// Sliding-window admission.
///
/// KEYS: entries, cooldown. ARGV: limit, window_ms, cooldown_ms, token,
/// record (1 admits and records, 0 only reports).
///
/// Reply: {admitted, count, retry_after_ms, reset_after_ms}. Scores are
/// expiry times on the Redis clock.
const ADMIT_SCRIPT: &str = r"
local entries = KEYS[1]
local cooldown = KEYS[2]
local limit = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local cooldown_ms = tonumber(ARGV[3])
local token = ARGV[4]
local record = ARGV[5] == '1'

local t = redis.call('TIME')
local now = tonumber(t[1]) * 1000 + math.floor(tonumber(t[2]) / 1000)

local function earliest()
  local first = redis.call('ZRANGEBYSCORE', entries, '(' .. now, '+inf', 'WITHSCORES', 'LIMIT', 0, 1)
  if first[2] then
    return tonumber(first[2]) - now
  end
  return 0
end

local blocked = redis.call('PTTL', cooldown)
if blocked > 0 then
  return {0, redis.call('ZCOUNT', entries, '(' .. now, '+inf'), blocked, earliest()}
end

if record then
  redis.call('ZREMRANGEBYSCORE', entries, '-inf', now)
end
local count = redis.call('ZCOUNT', entries, '(' .. now, '+inf')

if count >= limit then
  local reset = earliest()
  if record and cooldown_ms > 0 then
    redis.call('SET', cooldown, '1', 'PX', cooldown_ms)
    return {0, count, cooldown_ms, reset}
  end
  return {0, count, reset, reset}
end

if record then
  redis.call('ZADD', entries, now + window, token)
  redis.call('PEXPIRE', entries, window)
  count = count + 1
end
return {1, count, 0, earliest()}
";

/// Patch an existing buffer; never create a partial one.
const SET_RANGE_SCRIPT: &str = r"
if redis.call('EXISTS', KEYS[1]) == 1 then
  redis.call('SETRANGE', KEYS[1], ARGV[1], ARGV[2])
  return 1
end
return 0
";

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    /// Bound on every single call.
    pub timeout: Duration,
    /// Reconnect attempts made by the connection manager.
    pub retries: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            timeout: Duration::from_millis(DEFAULT_REDIS_TIMEOUT_MS),
            retries: DEFAULT_REDIS_RETRIES,
        }
    }
}

impl RedisConfig {
    /// Read `PIXELS_REDIS_URL`, `PIXELS_REDIS_TIMEOUT_MS` and
    /// `PIXELS_REDIS_RETRIES`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: std::env::var("PIXELS_REDIS_URL").unwrap_or(defaults.url),
            timeout: std::env::var("PIXELS_REDIS_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.timeout),
            retries: std::env::var("PIXELS_REDIS_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.retries),
        }
    }
}

// ============================================================================
// FAST STORE
// ============================================================================

/// [`FastStore`] backed by Redis through a reconnecting connection manager.
#[derive(Clone)]
pub struct RedisFastStore {
    conn: ConnectionManager,
    timeout: Duration,
    admit_script: Script,
    set_range_script: Script,
}

impl RedisFastStore {
    pub async fn connect(config: &RedisConfig) -> ApiResult<Self> {
        let manager_config = ConnectionManagerConfig::new().set_number_of_retries(config.retries);
        let client = Client::open(config.url.as_str())?;
        let conn = client
            .get_connection_manager_with_config(manager_config)
            .await?;

        tracing::info!(timeout_ms = config.timeout.as_millis() as u64, "connected to redis");
        Ok(Self {
            conn,
            timeout: config.timeout,
            admit_script: Script::new(ADMIT_SCRIPT),
            set_range_script: Script::new(SET_RANGE_SCRIPT),
        })
    }

    async fn run<T, F>(&self, operation: &str, call: F) -> PixelsResult<T>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(StoreError::unavailable(StoreKind::Fast, operation, err).into()),
            Err(_) => Err(StoreError::timeout(StoreKind::Fast, operation).into()),
        }
    }

    async fn window(
        &self,
        operation: &str,
        request: &WindowRequest,
        record: bool,
    ) -> PixelsResult<WindowOutcome> {
        let mut conn = self.conn.clone();
        let mut invocation = self.admit_script.prepare_invoke();
        invocation
            .key(&request.entries_key)
            .key(&request.cooldown_key)
            .arg(request.limit)
            .arg(millis("window", request.window)?)
            .arg(millis("cooldown", request.cooldown)?)
            .arg(&request.token)
            .arg(if record { 1 } else { 0 });

        let reply: (i64, i64, i64, i64) = self
            .run(operation, invocation.invoke_async(&mut conn))
            .await?;
        Ok(outcome_from_reply(reply))
    }
}

fn millis(field: &str, duration: Duration) -> PixelsResult<u64> {
    u64::try_from(duration.as_millis()).map_err(|_| {
        ValidationError::InvalidConfig {
            field: field.to_string(),
            reason: "does not fit in milliseconds".to_string(),
        }
        .into()
    })
}

fn outcome_from_reply(
    (admitted, count, retry_after_ms, reset_after_ms): (i64, i64, i64, i64),
) -> WindowOutcome {
    let admitted = admitted == 1;
    let as_duration = |ms: i64| Duration::from_millis(ms.max(0) as u64);
    WindowOutcome {
        admitted,
        count: count.clamp(0, i64::from(u32::MAX)) as u32,
        retry_after: (!admitted).then(|| as_duration(retry_after_ms)),
        reset_after: as_duration(reset_after_ms),
    }
}

#[async_trait]
impl FastStore for RedisFastStore {
    async fn get_bytes(&self, key: &str) -> PixelsResult<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        self.run("get_bytes", redis::cmd("GET").arg(key).query_async(&mut conn))
            .await
    }

    async fn set_bytes(&self, key: &str, value: &[u8]) -> PixelsResult<()> {
        let mut conn = self.conn.clone();
        self.run(
            "set_bytes",
            redis::cmd("SET").arg(key).arg(value).query_async(&mut conn),
        )
        .await
    }

    async fn set_range(&self, key: &str, offset: usize, value: &[u8]) -> PixelsResult<bool> {
        let mut conn = self.conn.clone();
        let mut invocation = self.set_range_script.prepare_invoke();
        invocation.key(key).arg(offset).arg(value);
        let written: i64 = self
            .run("set_range", invocation.invoke_async(&mut conn))
            .await?;
        Ok(written == 1)
    }

    async fn admit(&self, request: &WindowRequest) -> PixelsResult<WindowOutcome> {
        self.window("admit", request, true).await
    }

    async fn inspect(&self, request: &WindowRequest) -> PixelsResult<WindowOutcome> {
        self.window("inspect", request, false).await
    }

    async fn remove_entry(&self, entries_key: &str, token: &str) -> PixelsResult<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = self
            .run(
                "remove_entry",
                redis::cmd("ZREM").arg(entries_key).arg(token).query_async(&mut conn),
            )
            .await?;
        Ok(removed > 0)
    }

    async fn set_flag(&self, key: &str, ttl: Duration) -> PixelsResult<()> {
        let mut conn = self.conn.clone();
        self.run(
            "set_flag",
            redis::cmd("SET")
                .arg(key)
                .arg(1)
                .arg("PX")
                .arg(millis("ttl", ttl)?.max(1))
                .query_async(&mut conn),
        )
        .await
    }

    async fn ping(&self) -> PixelsResult<()> {
        let mut conn = self.conn.clone();
        let _pong: String = self
            .run("ping", redis::cmd("PING").query_async(&mut conn))
            .await?;
        Ok(())
    }
}
