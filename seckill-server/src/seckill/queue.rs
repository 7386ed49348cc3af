//! Order Queue - 持久化订单流
//!
//! Typed view over one stream + consumer group + consumer name.
//! Payload is a flat map `{voucherId, userId, orderId}`.

use super::{SeckillError, SeckillResult};
use crate::store::{ReadFrom, StoreError, StreamEntry, StreamStore};
use std::sync::Arc;
use std::time::Duration;

/// Entries fetched per read
const READ_COUNT: usize = 1;

/// Decoded queue payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderMessage {
    pub voucher_id: i64,
    pub user_id: i64,
    pub order_id: i64,
}

impl OrderMessage {
    pub fn to_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("voucherId", self.voucher_id.to_string()),
            ("userId", self.user_id.to_string()),
            ("orderId", self.order_id.to_string()),
        ]
    }
}

impl TryFrom<&StreamEntry> for OrderMessage {
    type Error = SeckillError;

    fn try_from(entry: &StreamEntry) -> Result<Self, Self::Error> {
        let field = |name: &str| -> SeckillResult<i64> {
            let raw = entry
                .fields
                .get(name)
                .ok_or_else(|| SeckillError::MalformedEntry {
                    id: entry.id.clone(),
                    reason: format!("missing {name}"),
                })?;
            raw.parse().map_err(|_| SeckillError::MalformedEntry {
                id: entry.id.clone(),
                reason: format!("{name} is not an integer: {raw:?}"),
            })
        };

        Ok(Self {
            voucher_id: field("voucherId")?,
            user_id: field("userId")?,
            order_id: field("orderId")?,
        })
    }
}

#[derive(Clone)]
pub struct OrderQueue {
    store: Arc<dyn StreamStore>,
    stream: String,
    group: String,
    consumer: String,
}

impl OrderQueue {
    pub fn new(
        store: Arc<dyn StreamStore>,
        stream: impl Into<String>,
        group: impl Into<String>,
        consumer: impl Into<String>,
    ) -> Self {
        Self {
            store,
            stream: stream.into(),
            group: group.into(),
            consumer: consumer.into(),
        }
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Create the consumer group if missing
    pub async fn ensure_group(&self) -> SeckillResult<()> {
        if self.store.create_group(&self.stream, &self.group).await? {
            tracing::info!(stream = %self.stream, group = %self.group, "Created consumer group");
        }
        Ok(())
    }

    /// Live read: new entries only, waiting up to `block`
    pub async fn read_live(&self, block: Duration) -> SeckillResult<Vec<StreamEntry>> {
        Ok(self
            .store
            .read_group(
                &self.stream,
                &self.group,
                &self.consumer,
                ReadFrom::New { block },
                READ_COUNT,
            )
            .await?)
    }

    /// Backlog read: this consumer's unacknowledged entries, oldest first,
    /// starting after `after` when given
    pub async fn read_backlog(&self, after: Option<&str>) -> SeckillResult<Vec<StreamEntry>> {
        Ok(self
            .store
            .read_group(
                &self.stream,
                &self.group,
                &self.consumer,
                ReadFrom::Pending { after },
                READ_COUNT,
            )
            .await?)
    }

    pub async fn ack(&self, entry_id: &str) -> SeckillResult<()> {
        self.store
            .ack(&self.stream, &self.group, &[entry_id.to_string()])
            .await?;
        Ok(())
    }

    /// Append a message directly (manual replay / tooling)
    pub async fn publish(&self, message: &OrderMessage) -> SeckillResult<String> {
        Ok(self.store.append(&self.stream, &message.to_fields()).await?)
    }

    /// Delivered-but-unacknowledged entries; 0 before the group exists
    pub async fn pending_count(&self) -> SeckillResult<u64> {
        match self.store.pending_count(&self.stream, &self.group).await {
            Ok(count) => Ok(count),
            Err(StoreError::NoGroup { .. }) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::collections::HashMap;

    fn entry(fields: &[(&str, &str)]) -> StreamEntry {
        StreamEntry {
            id: "1-0".into(),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn test_decode_message() {
        let msg = OrderMessage::try_from(&entry(&[
            ("voucherId", "1"),
            ("userId", "2"),
            ("orderId", "3"),
        ]))
        .unwrap();
        assert_eq!(
            msg,
            OrderMessage {
                voucher_id: 1,
                user_id: 2,
                order_id: 3
            }
        );
    }

    #[test]
    fn test_decode_rejects_missing_and_garbage() {
        let missing = OrderMessage::try_from(&entry(&[("voucherId", "1"), ("userId", "2")]));
        assert!(matches!(missing, Err(SeckillError::MalformedEntry { .. })));

        let garbage = OrderMessage::try_from(&entry(&[
            ("voucherId", "1"),
            ("userId", "bob"),
            ("orderId", "3"),
        ]));
        assert!(matches!(garbage, Err(SeckillError::MalformedEntry { .. })));
    }

    #[tokio::test]
    async fn test_publish_read_ack() {
        let queue = OrderQueue::new(Arc::new(MemoryStore::new()), "stream.orders", "g1", "c1");
        queue.ensure_group().await.unwrap();
        queue.ensure_group().await.unwrap();

        let msg = OrderMessage {
            voucher_id: 1,
            user_id: 2,
            order_id: 3,
        };
        queue.publish(&msg).await.unwrap();

        let live = queue.read_live(Duration::ZERO).await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(OrderMessage::try_from(&live[0]).unwrap(), msg);
        assert_eq!(queue.pending_count().await.unwrap(), 1);

        let backlog = queue.read_backlog(None).await.unwrap();
        assert_eq!(backlog, live);
        assert!(queue.read_backlog(Some(&live[0].id)).await.unwrap().is_empty());

        queue.ack(&live[0].id).await.unwrap();
        assert_eq!(queue.pending_count().await.unwrap(), 0);
        assert!(queue.read_backlog(None).await.unwrap().is_empty());
    }
}
