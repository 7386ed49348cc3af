//! Redis backend
//!
//! Lua scripts give the admission and lock paths server-side atomicity.
//! Blocking stream reads go through a dedicated connection so a 2s `BLOCK`
//! never stalls the multiplexed command connection.

use super::{
    Admission, AdmissionStore, KvStore, LockStore, ReadFrom, ReentrantRelease, StoreError,
    StoreResult, StreamEntry, StreamStore, keys,
};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamPendingReply, StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, Client, RedisError, Script, Value};
use std::collections::HashMap;
use std::time::Duration;

struct Scripts {
    admit: Script,
    unlock: Script,
    reentrant_lock: Script,
    reentrant_unlock: Script,
    reentrant_renew: Script,
}

impl Scripts {
    fn load() -> Self {
        Self {
            admit: Script::new(include_str!("scripts/seckill.lua")),
            unlock: Script::new(include_str!("scripts/unlock.lua")),
            reentrant_lock: Script::new(include_str!("scripts/reentrant_lock.lua")),
            reentrant_unlock: Script::new(include_str!("scripts/reentrant_unlock.lua")),
            reentrant_renew: Script::new(include_str!("scripts/reentrant_renew.lua")),
        }
    }
}

/// Redis-backed shared store
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
    blocking: MultiplexedConnection,
    scripts: std::sync::Arc<Scripts>,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Open both connections and verify the server answers
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = Client::open(url)?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        let blocking = client.get_multiplexed_async_connection().await?;

        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        tracing::info!("Connected to Redis");

        Ok(Self {
            conn,
            blocking,
            scripts: std::sync::Arc::new(Scripts::load()),
        })
    }

    fn con(&self) -> MultiplexedConnection {
        self.conn.clone()
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    // PX 0 is rejected by Redis
    (ttl.as_millis() as u64).max(1)
}

fn group_error(e: RedisError, stream: &str, group: &str) -> StoreError {
    if e.code() == Some("NOGROUP") {
        StoreError::NoGroup {
            stream: stream.to_string(),
            group: group.to_string(),
        }
    } else {
        StoreError::Redis(e)
    }
}

fn decode_reply(reply: Option<StreamReadReply>) -> StoreResult<Vec<StreamEntry>> {
    let Some(reply) = reply else {
        return Ok(Vec::new());
    };

    let mut entries = Vec::new();
    for key in reply.keys {
        for stream_id in key.ids {
            let mut fields = HashMap::with_capacity(stream_id.map.len());
            for (field, value) in &stream_id.map {
                fields.insert(field.clone(), value_to_string(field, value)?);
            }
            entries.push(StreamEntry {
                id: stream_id.id,
                fields,
            });
        }
    }
    Ok(entries)
}

fn value_to_string(field: &str, value: &Value) -> StoreResult<String> {
    let decoded: Result<String, RedisError> = redis::from_redis_value(value);
    decoded.map_err(|e| StoreError::Protocol(format!("field {field}: {e}")))
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut con = self.con();
        let value: Option<String> = con.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        let mut con = self.con();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }
        let _: () = cmd.query_async(&mut con).await?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let mut con = self.con();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut con)
            .await?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut con = self.con();
        let removed: u64 = con.del(key).await?;
        Ok(removed > 0)
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        let mut con = self.con();
        let value: i64 = con.incr(key, 1).await?;
        Ok(value)
    }
}

#[async_trait]
impl LockStore for RedisStore {
    async fn release_if_owner(&self, key: &str, token: &str) -> StoreResult<bool> {
        let mut con = self.con();
        let removed: i64 = self
            .scripts
            .unlock
            .key(key)
            .arg(token)
            .invoke_async(&mut con)
            .await?;
        Ok(removed > 0)
    }

    async fn reentrant_acquire(
        &self,
        key: &str,
        holder: &str,
        lease: Duration,
    ) -> StoreResult<bool> {
        let mut con = self.con();
        let acquired: i64 = self
            .scripts
            .reentrant_lock
            .key(key)
            .arg(holder)
            .arg(ttl_millis(lease))
            .invoke_async(&mut con)
            .await?;
        Ok(acquired == 1)
    }

    async fn reentrant_release(
        &self,
        key: &str,
        holder: &str,
        lease: Duration,
    ) -> StoreResult<ReentrantRelease> {
        let mut con = self.con();
        let code: i64 = self
            .scripts
            .reentrant_unlock
            .key(key)
            .arg(holder)
            .arg(ttl_millis(lease))
            .invoke_async(&mut con)
            .await?;
        Ok(ReentrantRelease::from_code(code))
    }

    async fn reentrant_renew(&self, key: &str, holder: &str, lease: Duration) -> StoreResult<bool> {
        let mut con = self.con();
        let renewed: i64 = self
            .scripts
            .reentrant_renew
            .key(key)
            .arg(holder)
            .arg(ttl_millis(lease))
            .invoke_async(&mut con)
            .await?;
        Ok(renewed == 1)
    }
}

#[async_trait]
impl AdmissionStore for RedisStore {
    async fn mark_purchased(&self, voucher_id: i64, user_ids: &[i64]) -> StoreResult<()> {
        if user_ids.is_empty() {
            return Ok(());
        }
        let mut con = self.con();
        let _: i64 = con.sadd(keys::seckill_order(voucher_id), user_ids).await?;
        Ok(())
    }

    async fn admit(
        &self,
        stream: &str,
        voucher_id: i64,
        user_id: i64,
        order_id: i64,
    ) -> StoreResult<Admission> {
        let mut con = self.con();
        let code: i64 = self
            .scripts
            .admit
            .key(keys::seckill_stock(voucher_id))
            .key(keys::seckill_order(voucher_id))
            .key(stream)
            .arg(voucher_id)
            .arg(user_id)
            .arg(order_id)
            .invoke_async(&mut con)
            .await?;
        Admission::from_code(code)
    }
}

#[async_trait]
impl StreamStore for RedisStore {
    async fn create_group(&self, stream: &str, group: &str) -> StoreResult<bool> {
        let mut con = self.con();
        let created: Result<(), RedisError> = con.xgroup_create_mkstream(stream, group, "0").await;
        match created {
            Ok(()) => Ok(true),
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn append(&self, stream: &str, fields: &[(&str, String)]) -> StoreResult<String> {
        let mut con = self.con();
        let id: String = con.xadd(stream, "*", fields).await?;
        Ok(id)
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        from: ReadFrom<'_>,
        count: usize,
    ) -> StoreResult<Vec<StreamEntry>> {
        let opts = StreamReadOptions::default()
            .group(group, consumer)
            .count(count);

        let reply: Result<Option<StreamReadReply>, RedisError> = match from {
            ReadFrom::New { block } => {
                let opts = if block.is_zero() {
                    opts
                } else {
                    opts.block(block.as_millis() as usize)
                };
                let mut con = self.blocking.clone();
                con.xread_options(&[stream], &[">"], &opts).await
            }
            ReadFrom::Pending { after } => {
                let mut con = self.con();
                con.xread_options(&[stream], &[after.unwrap_or("0")], &opts)
                    .await
            }
        };

        decode_reply(reply.map_err(|e| group_error(e, stream, group))?)
    }

    async fn ack(&self, stream: &str, group: &str, ids: &[String]) -> StoreResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut con = self.con();
        let acked: u64 = con.xack(stream, group, ids).await?;
        Ok(acked)
    }

    async fn pending_count(&self, stream: &str, group: &str) -> StoreResult<u64> {
        let mut con = self.con();
        let reply: Result<StreamPendingReply, RedisError> = con.xpending(stream, group).await;
        let reply = reply.map_err(|e| group_error(e, stream, group))?;
        Ok(reply.count() as u64)
    }
}
