//! In-process store
//!
//! Mirrors the Redis semantics the server relies on (TTL expiry, sets, hash
//! locks, streams with consumer groups and bounded blocking reads) behind a
//! single mutex. Every multi-step operation runs under one lock acquisition,
//! which is what makes the admission step atomic here.

use super::{
    Admission, AdmissionStore, KvStore, LockStore, ReadFrom, ReentrantRelease, StoreError,
    StoreResult, StreamEntry, StreamStore, keys,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

type EntryId = (u64, u64);

enum Value {
    Str(String),
    Set(HashSet<String>),
    Hash(HashMap<String, i64>),
}

struct Slot {
    value: Value,
    expires_at: Option<Instant>,
}

#[derive(Default)]
struct Group {
    last_delivered: EntryId,
    /// entry id -> consumer it was delivered to
    pending: BTreeMap<EntryId, String>,
}

#[derive(Default)]
struct Stream {
    entries: BTreeMap<EntryId, HashMap<String, String>>,
    last_id: EntryId,
    groups: HashMap<String, Group>,
}

impl Stream {
    fn next_id(&mut self) -> EntryId {
        let now = shared::util::now_millis().max(0) as u64;
        let id = if now > self.last_id.0 {
            (now, 0)
        } else {
            (self.last_id.0, self.last_id.1 + 1)
        };
        self.last_id = id;
        id
    }

    fn append(&mut self, fields: HashMap<String, String>) -> String {
        let id = self.next_id();
        self.entries.insert(id, fields);
        format_id(id)
    }
}

#[derive(Default)]
struct Inner {
    values: HashMap<String, Slot>,
    streams: HashMap<String, Stream>,
}

impl Inner {
    /// Live slot for `key`, evicting it first if its TTL elapsed
    fn slot(&mut self, key: &str) -> Option<&mut Slot> {
        let expired = self
            .values
            .get(key)
            .and_then(|s| s.expires_at)
            .is_some_and(|at| at <= Instant::now());
        if expired {
            self.values.remove(key);
        }
        self.values.get_mut(key)
    }

    fn get_str(&mut self, key: &str) -> StoreResult<Option<&String>> {
        match self.slot(key) {
            None => Ok(None),
            Some(Slot {
                value: Value::Str(s),
                ..
            }) => Ok(Some(s)),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    fn put(&mut self, key: &str, value: Value, ttl: Option<Duration>) {
        self.values.insert(
            key.to_string(),
            Slot {
                value,
                expires_at: ttl.map(|t| Instant::now() + t),
            },
        );
    }

    fn group_mut(&mut self, stream: &str, group: &str) -> StoreResult<&mut Stream> {
        let no_group = || StoreError::NoGroup {
            stream: stream.to_string(),
            group: group.to_string(),
        };
        let s = self.streams.get_mut(stream).ok_or_else(no_group)?;
        if !s.groups.contains_key(group) {
            return Err(no_group());
        }
        Ok(s)
    }

    fn read_new(
        &mut self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> StoreResult<Vec<StreamEntry>> {
        let s = self.group_mut(stream, group)?;
        let Some(g) = s.groups.get_mut(group) else {
            return Ok(Vec::new());
        };

        let mut batch = Vec::new();
        for (id, fields) in s
            .entries
            .range((Bound::Excluded(g.last_delivered), Bound::Unbounded))
            .take(count)
        {
            g.last_delivered = *id;
            g.pending.insert(*id, consumer.to_string());
            batch.push(StreamEntry {
                id: format_id(*id),
                fields: fields.clone(),
            });
        }
        Ok(batch)
    }

    fn read_pending(
        &mut self,
        stream: &str,
        group: &str,
        consumer: &str,
        after: Option<&str>,
        count: usize,
    ) -> StoreResult<Vec<StreamEntry>> {
        let start = match after {
            Some(id) => Bound::Excluded(
                parse_id(id).ok_or_else(|| StoreError::Protocol(format!("bad entry id {id}")))?,
            ),
            None => Bound::Unbounded,
        };
        let s = self.group_mut(stream, group)?;
        let Some(g) = s.groups.get(group) else {
            return Ok(Vec::new());
        };
        Ok(g.pending
            .range((start, Bound::Unbounded))
            .filter(|(_, owner)| owner.as_str() == consumer)
            .filter_map(|(id, _)| {
                s.entries.get(id).map(|fields| StreamEntry {
                    id: format_id(*id),
                    fields: fields.clone(),
                })
            })
            .take(count)
            .collect())
    }
}

fn format_id((ms, seq): EntryId) -> String {
    format!("{ms}-{seq}")
}

fn parse_id(id: &str) -> Option<EntryId> {
    let (ms, seq) = id.split_once('-')?;
    Some((ms.parse().ok()?, seq.parse().ok()?))
}

/// Single-process [`SharedStore`](super::SharedStore)
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    appended: Notify,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Members of a set key (empty if missing)
    pub fn set_members(&self, key: &str) -> Vec<String> {
        let mut inner = self.inner.lock();
        match inner.slot(key) {
            Some(Slot {
                value: Value::Set(set),
                ..
            }) => {
                let mut members: Vec<String> = set.iter().cloned().collect();
                members.sort();
                members
            }
            _ => Vec::new(),
        }
    }

    /// Number of entries ever appended to `stream`
    pub fn stream_len(&self, stream: &str) -> usize {
        self.inner
            .lock()
            .streams
            .get(stream)
            .map_or(0, |s| s.entries.len())
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut inner = self.inner.lock();
        Ok(inner.get_str(key)?.cloned())
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        self.inner
            .lock()
            .put(key, Value::Str(value.to_string()), ttl);
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let mut inner = self.inner.lock();
        if inner.slot(key).is_some() {
            return Ok(false);
        }
        inner.put(key, Value::Str(value.to_string()), Some(ttl));
        Ok(true)
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut inner = self.inner.lock();
        let existed = inner.slot(key).is_some();
        inner.values.remove(key);
        Ok(existed)
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        let mut inner = self.inner.lock();
        let current = match inner.get_str(key)? {
            Some(s) => s
                .parse::<i64>()
                .map_err(|_| StoreError::WrongType(key.to_string()))?,
            None => 0,
        };
        let next = current + 1;
        let expires_at = inner.slot(key).and_then(|s| s.expires_at);
        inner.values.insert(
            key.to_string(),
            Slot {
                value: Value::Str(next.to_string()),
                expires_at,
            },
        );
        Ok(next)
    }
}

#[async_trait]
impl LockStore for MemoryStore {
    async fn release_if_owner(&self, key: &str, token: &str) -> StoreResult<bool> {
        let mut inner = self.inner.lock();
        let owned = matches!(inner.get_str(key), Ok(Some(current)) if current == token);
        if owned {
            inner.values.remove(key);
        }
        Ok(owned)
    }

    async fn reentrant_acquire(
        &self,
        key: &str,
        holder: &str,
        lease: Duration,
    ) -> StoreResult<bool> {
        let mut inner = self.inner.lock();
        match inner.slot(key) {
            None => {
                let mut holds = HashMap::new();
                holds.insert(holder.to_string(), 1);
                inner.put(key, Value::Hash(holds), Some(lease));
                Ok(true)
            }
            Some(Slot {
                value: Value::Hash(holds),
                expires_at,
            }) => match holds.get_mut(holder) {
                Some(count) => {
                    *count += 1;
                    *expires_at = Some(Instant::now() + lease);
                    Ok(true)
                }
                None => Ok(false),
            },
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn reentrant_release(
        &self,
        key: &str,
        holder: &str,
        lease: Duration,
    ) -> StoreResult<ReentrantRelease> {
        let mut inner = self.inner.lock();
        let remaining = match inner.slot(key) {
            Some(Slot {
                value: Value::Hash(holds),
                expires_at,
            }) => match holds.get_mut(holder) {
                Some(count) => {
                    *count -= 1;
                    *expires_at = Some(Instant::now() + lease);
                    *count
                }
                None => return Ok(ReentrantRelease::NotHeld),
            },
            Some(Slot {
                value: Value::Str(_) | Value::Set(_),
                ..
            }) => return Err(StoreError::WrongType(key.to_string())),
            None => return Ok(ReentrantRelease::NotHeld),
        };

        if remaining > 0 {
            return Ok(ReentrantRelease::from_code(remaining));
        }
        inner.values.remove(key);
        Ok(ReentrantRelease::Released)
    }

    async fn reentrant_renew(&self, key: &str, holder: &str, lease: Duration) -> StoreResult<bool> {
        let mut inner = self.inner.lock();
        match inner.slot(key) {
            Some(Slot {
                value: Value::Hash(holds),
                expires_at,
            }) if holds.contains_key(holder) => {
                *expires_at = Some(Instant::now() + lease);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl AdmissionStore for MemoryStore {
    async fn mark_purchased(&self, voucher_id: i64, user_ids: &[i64]) -> StoreResult<()> {
        if user_ids.is_empty() {
            return Ok(());
        }
        let order_key = keys::seckill_order(voucher_id);
        let users = user_ids.iter().map(i64::to_string);

        let mut inner = self.inner.lock();
        match inner.slot(&order_key) {
            None => inner.put(&order_key, Value::Set(users.collect()), None),
            Some(Slot {
                value: Value::Set(set),
                ..
            }) => set.extend(users),
            Some(_) => return Err(StoreError::WrongType(order_key)),
        }
        Ok(())
    }

    async fn admit(
        &self,
        stream: &str,
        voucher_id: i64,
        user_id: i64,
        order_id: i64,
    ) -> StoreResult<Admission> {
        let stock_key = keys::seckill_stock(voucher_id);
        let order_key = keys::seckill_order(voucher_id);
        let user = user_id.to_string();

        {
            let mut inner = self.inner.lock();

            let stock = inner
                .get_str(&stock_key)?
                .and_then(|s| s.parse::<i64>().ok());
            let stock = match stock {
                Some(n) if n > 0 => n,
                _ => return Ok(Admission::OutOfStock),
            };

            let purchased = match inner.slot(&order_key) {
                None => false,
                Some(Slot {
                    value: Value::Set(set),
                    ..
                }) => set.contains(&user),
                Some(_) => return Err(StoreError::WrongType(order_key)),
            };
            if purchased {
                return Ok(Admission::AlreadyPurchased);
            }

            if let Some(slot) = inner.slot(&stock_key) {
                slot.value = Value::Str((stock - 1).to_string());
            }
            match inner.slot(&order_key) {
                Some(Slot {
                    value: Value::Set(set),
                    ..
                }) => {
                    set.insert(user.clone());
                }
                _ => inner.put(&order_key, Value::Set(HashSet::from([user.clone()])), None),
            }

            let fields = HashMap::from([
                ("voucherId".to_string(), voucher_id.to_string()),
                ("userId".to_string(), user),
                ("orderId".to_string(), order_id.to_string()),
            ]);
            inner
                .streams
                .entry(stream.to_string())
                .or_default()
                .append(fields);
        }

        self.appended.notify_waiters();
        Ok(Admission::Admitted)
    }
}

#[async_trait]
impl StreamStore for MemoryStore {
    async fn create_group(&self, stream: &str, group: &str) -> StoreResult<bool> {
        let mut inner = self.inner.lock();
        let s = inner.streams.entry(stream.to_string()).or_default();
        if s.groups.contains_key(group) {
            return Ok(false);
        }
        s.groups.insert(group.to_string(), Group::default());
        Ok(true)
    }

    async fn append(&self, stream: &str, fields: &[(&str, String)]) -> StoreResult<String> {
        let fields = fields
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect();
        let id = self
            .inner
            .lock()
            .streams
            .entry(stream.to_string())
            .or_default()
            .append(fields);
        self.appended.notify_waiters();
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
        let block = match from {
            ReadFrom::Pending { after } => {
                return self
                    .inner
                    .lock()
                    .read_pending(stream, group, consumer, after, count);
            }
            ReadFrom::New { block } => block,
        };

        let deadline = Instant::now() + block;
        loop {
            // Register interest before looking so an append in between is not missed
            let notified = self.appended.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let batch = self.inner.lock().read_new(stream, group, consumer, count)?;
            if !batch.is_empty() || block.is_zero() {
                return Ok(batch);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn ack(&self, stream: &str, group: &str, ids: &[String]) -> StoreResult<u64> {
        let mut inner = self.inner.lock();
        let Some(g) = inner
            .streams
            .get_mut(stream)
            .and_then(|s| s.groups.get_mut(group))
        else {
            return Ok(0);
        };
        let acked = ids
            .iter()
            .filter_map(|id| parse_id(id))
            .filter(|id| g.pending.remove(id).is_some())
            .count();
        Ok(acked as u64)
    }

    async fn pending_count(&self, stream: &str, group: &str) -> StoreResult<u64> {
        let mut inner = self.inner.lock();
        let s = inner.group_mut(stream, group)?;
        Ok(s.groups.get(group).map_or(0, |g| g.pending.len() as u64))
    }
}
