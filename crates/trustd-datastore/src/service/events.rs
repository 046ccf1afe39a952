//! Event log reads and pruning.
//!
//! Event rows are keyed by their id as big-endian bytes, so key order equals
//! numeric order and "everything after id N" is a single ordered scan.
//! Pruning deletes rows only; the sequence counters survive so ids are never
//! reused.

use crate::{errors::*, types::*};
use tracing::info;
use trustd_storage::{Storage, CF_ENTRY_EVENTS, CF_NODE_EVENTS};

use super::DataStoreService;

impl<S: Storage> DataStoreService<S> {
    pub(crate) async fn list_node_events_since_internal(
        &self,
        after_event_id: u64,
        limit: usize,
    ) -> Result<Vec<AttestedNodeEvent>> {
        let rows: Vec<(Vec<u8>, AttestedNodeEvent)> = self
            .storage
            .scan_page(CF_NODE_EVENTS, Some(&after_event_id.to_be_bytes()), limit)
            .await?;
        Ok(rows.into_iter().map(|(_, event)| event).collect())
    }

    pub(crate) async fn list_entry_events_since_internal(
        &self,
        after_event_id: u64,
        limit: usize,
    ) -> Result<Vec<RegisteredEntryEvent>> {
        let rows: Vec<(Vec<u8>, RegisteredEntryEvent)> = self
            .storage
            .scan_page(CF_ENTRY_EVENTS, Some(&after_event_id.to_be_bytes()), limit)
            .await?;
        Ok(rows.into_iter().map(|(_, event)| event).collect())
    }

    pub(crate) async fn prune_node_events_internal(&self, older_than: u64) -> Result<usize> {
        let pruned = self
            .prune_events(CF_NODE_EVENTS, older_than, |event: &AttestedNodeEvent| {
                (event.event_id, event.created_at)
            })
            .await?;
        if pruned > 0 {
            info!(pruned, "Node events pruned");
        }
        Ok(pruned)
    }

    pub(crate) async fn prune_entry_events_internal(&self, older_than: u64) -> Result<usize> {
        let pruned = self
            .prune_events(CF_ENTRY_EVENTS, older_than, |event: &RegisteredEntryEvent| {
                (event.event_id, event.created_at)
            })
            .await?;
        if pruned > 0 {
            info!(pruned, "Entry events pruned");
        }
        Ok(pruned)
    }

    /// Delete events recorded before the cutoff
    ///
    /// Ids and timestamps increase together, so the scan stops at the first
    /// event at or past the cutoff.
    async fn prune_events<V>(
        &self,
        cf: &str,
        older_than: u64,
        id_and_time: fn(&V) -> (u64, u64),
    ) -> Result<usize>
    where
        V: serde::de::DeserializeOwned + Send,
    {
        let _guard = self.write_lock.lock().await;

        let mut doomed: Vec<[u8; 8]> = Vec::new();
        let mut after: Option<[u8; 8]> = None;

        'scan: loop {
            let chunk: Vec<(Vec<u8>, V)> =
                self.storage.scan_page(cf, after.as_ref(), 256).await?;
            let exhausted = chunk.len() < 256;

            for (_, event) in chunk {
                let (event_id, created_at) = id_and_time(&event);
                if created_at >= older_than {
                    break 'scan;
                }
                doomed.push(event_id.to_be_bytes());
                after = Some(event_id.to_be_bytes());
            }

            if exhausted {
                break;
            }
        }

        if doomed.is_empty() {
            return Ok(0);
        }

        let mut batch = self.storage.batch();
        for key in &doomed {
            batch.delete_raw(cf, key.to_vec())?;
        }
        batch.commit().await?;

        Ok(doomed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::DataStore;
    use std::sync::Arc;
    use trustd_storage::MemoryStorage;

    fn service() -> DataStoreService<MemoryStorage> {
        DataStoreService::new(Arc::new(MemoryStorage::new()))
    }

    fn new_node(spiffe_id: &str) -> NewAttestedNode {
        NewAttestedNode {
            spiffe_id: spiffe_id.to_string(),
            attestation_data_type: "join_token".to_string(),
            serial_number: "serial-1".to_string(),
            expires_at: 5_000,
            can_reattest: false,
        }
    }

    fn new_entry(spiffe_id: &str) -> NewRegisteredEntry {
        NewRegisteredEntry {
            spiffe_id: spiffe_id.to_string(),
            parent_id: "spiffe://example.org/agent/a".to_string(),
            selectors: vec![Selector::new("unix", "uid:1000")],
            x509_svid_ttl: 3600,
            jwt_svid_ttl: 300,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_node_lifecycle_yields_strictly_increasing_ids() {
        let ds = service();

        ds.create_attested_node(new_node("spiffe://example.org/agent/a"))
            .await
            .unwrap();
        ds.create_attested_node(new_node("spiffe://example.org/agent/b"))
            .await
            .unwrap();
        ds.delete_attested_node("spiffe://example.org/agent/a")
            .await
            .unwrap();

        let events = ds.list_node_events_since(0, 100).await.unwrap();
        assert_eq!(events.len(), 3);
        for pair in events.windows(2) {
            assert!(pair[0].event_id < pair[1].event_id);
        }
        assert_eq!(events[0].spiffe_id, "spiffe://example.org/agent/a");
        assert_eq!(events[2].spiffe_id, "spiffe://example.org/agent/a");
    }

    #[tokio::test]
    async fn test_listing_is_strictly_after_the_cursor() {
        let ds = service();

        for name in ["a", "b", "c"] {
            ds.create_registered_entry(new_entry(&format!("spiffe://example.org/{name}")))
                .await
                .unwrap();
        }

        let all = ds.list_entry_events_since(0, 100).await.unwrap();
        assert_eq!(all.len(), 3);

        let rest = ds
            .list_entry_events_since(all[0].event_id, 100)
            .await
            .unwrap();
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[0].event_id, all[1].event_id);

        let none = ds
            .list_entry_events_since(all[2].event_id, 100)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_limit_bounds_the_result() {
        let ds = service();

        for name in ["a", "b", "c"] {
            ds.create_attested_node(new_node(&format!("spiffe://example.org/agent/{name}")))
                .await
                .unwrap();
        }

        let page = ds.list_node_events_since(0, 2).await.unwrap();
        assert_eq!(page.len(), 2);
    }

    #[tokio::test]
    async fn test_prune_keeps_later_events_and_never_reuses_ids() {
        let ds = service();

        ds.create_attested_node(new_node("spiffe://example.org/agent/a"))
            .await
            .unwrap();
        ds.create_attested_node(new_node("spiffe://example.org/agent/b"))
            .await
            .unwrap();

        let before = ds.list_node_events_since(0, 100).await.unwrap();
        let last_id = before.last().unwrap().event_id;

        // Everything so far is older than a far-future cutoff
        let pruned = ds.prune_node_events(u64::MAX).await.unwrap();
        assert_eq!(pruned, before.len());
        assert!(ds.list_node_events_since(0, 100).await.unwrap().is_empty());

        // New events continue after the pruned range
        ds.create_attested_node(new_node("spiffe://example.org/agent/c"))
            .await
            .unwrap();
        let after = ds.list_node_events_since(0, 100).await.unwrap();
        assert_eq!(after.len(), 1);
        assert!(after[0].event_id > last_id);
    }

    #[tokio::test]
    async fn test_prune_with_past_cutoff_removes_nothing() {
        let ds = service();

        ds.create_registered_entry(new_entry("spiffe://example.org/web"))
            .await
            .unwrap();

        let pruned = ds.prune_entry_events(1).await.unwrap();
        assert_eq!(pruned, 0);
        assert_eq!(ds.list_entry_events_since(0, 100).await.unwrap().len(), 1);
    }
}
