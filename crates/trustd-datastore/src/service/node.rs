//! Attested node operations: CRUD, selectors, and re-attestation rotation.

use crate::{errors::*, types::*};
use std::collections::HashSet;
use tracing::info;
use trustd_storage::{traits::BatchExt, Storage, CF_ATTESTED_NODES, CF_NODE_SELECTORS};
use uuid::Uuid;

use super::DataStoreService;

fn validate_spiffe_id(spiffe_id: &str) -> Result<()> {
    if spiffe_id.is_empty() {
        return Err(DataStoreError::Invalid(
            "spiffe id must not be empty".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn validate_selectors(selectors: &[Selector]) -> Result<()> {
    let mut seen = HashSet::new();
    for selector in selectors {
        if selector.selector_type.is_empty() || selector.value.is_empty() {
            return Err(DataStoreError::Invalid(
                "selector type and value must not be empty".to_string(),
            ));
        }
        if !seen.insert((selector.selector_type.as_str(), selector.value.as_str())) {
            return Err(DataStoreError::Invalid(format!(
                "duplicate selector {}:{}",
                selector.selector_type, selector.value
            )));
        }
    }
    Ok(())
}

impl<S: Storage> DataStoreService<S> {
    pub(crate) async fn create_attested_node_internal(
        &self,
        new: NewAttestedNode,
    ) -> Result<AttestedNode> {
        validate_spiffe_id(&new.spiffe_id)?;
        if new.serial_number.is_empty() {
            return Err(DataStoreError::Invalid(
                "serial number must not be empty".to_string(),
            ));
        }

        let _guard = self.write_lock.lock().await;

        if self
            .storage
            .exists(CF_ATTESTED_NODES, &new.spiffe_id)
            .await?
        {
            return Err(DataStoreError::AlreadyExists(new.spiffe_id));
        }

        let now = current_timestamp();
        let node = AttestedNode {
            id: Uuid::new_v4(),
            spiffe_id: new.spiffe_id,
            attestation_data_type: new.attestation_data_type,
            serial_number: new.serial_number,
            expires_at: new.expires_at,
            pending: None,
            can_reattest: new.can_reattest,
            created_at: now,
            updated_at: now,
        };

        let mut sequence = self.load_event_sequence(EventKind::AttestedNode).await?;
        let mut batch = self.storage.batch();
        batch.put(CF_ATTESTED_NODES, &node.spiffe_id, &node)?;
        self.stage_node_event(&mut batch, &node.spiffe_id, &mut sequence)?;
        batch.commit().await?;

        info!(spiffe_id = %node.spiffe_id, "Attested node created");
        Ok(node)
    }

    pub(crate) async fn get_attested_node_internal(&self, spiffe_id: &str) -> Result<AttestedNode> {
        self.fetch_node(spiffe_id).await
    }

    pub(crate) async fn update_attested_node_internal(
        &self,
        spiffe_id: &str,
        changes: AttestedNodeUpdate,
    ) -> Result<AttestedNode> {
        if let Some(Some(pending)) = &changes.pending {
            if pending.serial_number.is_empty() {
                return Err(DataStoreError::Invalid(
                    "pending serial number must not be empty".to_string(),
                ));
            }
        }

        let _guard = self.write_lock.lock().await;

        let mut node = self.fetch_node(spiffe_id).await?;

        if let Some(serial_number) = changes.serial_number {
            node.serial_number = serial_number;
        }
        if let Some(expires_at) = changes.expires_at {
            node.expires_at = expires_at;
        }
        if let Some(pending) = changes.pending {
            node.pending = pending;
        }
        if let Some(can_reattest) = changes.can_reattest {
            node.can_reattest = can_reattest;
        }
        node.updated_at = current_timestamp();

        self.storage
            .put(CF_ATTESTED_NODES, &spiffe_id, &node)
            .await?;

        info!(spiffe_id = %spiffe_id, "Attested node updated");
        Ok(node)
    }

    pub(crate) async fn delete_attested_node_internal(&self, spiffe_id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        if !self.storage.exists(CF_ATTESTED_NODES, &spiffe_id).await? {
            return Err(DataStoreError::NotFound(spiffe_id.to_string()));
        }

        let mut sequence = self.load_event_sequence(EventKind::AttestedNode).await?;
        let mut batch = self.storage.batch();
        batch.delete(CF_ATTESTED_NODES, &spiffe_id)?;
        self.stage_delete_prefix::<Selector>(
            &mut batch,
            CF_NODE_SELECTORS,
            &spiffe_id.to_string(),
        )
        .await?;
        self.stage_node_event(&mut batch, spiffe_id, &mut sequence)?;
        batch.commit().await?;

        info!(spiffe_id = %spiffe_id, "Attested node deleted");
        Ok(())
    }

    pub(crate) async fn list_attested_nodes_internal(
        &self,
        filter: NodeFilter,
        pagination: Pagination,
    ) -> Result<Page<AttestedNode>> {
        self.list_page(
            CF_ATTESTED_NODES,
            pagination,
            |node: &AttestedNode| &node.spiffe_id,
            move |node| {
                if let Some(cutoff) = filter.by_expires_before {
                    if node.expires_at >= cutoff {
                        return false;
                    }
                }
                if let Some(can_reattest) = filter.by_can_reattest {
                    if node.can_reattest != can_reattest {
                        return false;
                    }
                }
                true
            },
        )
        .await
    }

    /// Replace a node's selector set wholesale
    ///
    /// The target node must exist: selectors are owned records, never
    /// free-standing rows.
    pub(crate) async fn set_node_selectors_internal(
        &self,
        spiffe_id: &str,
        selectors: Vec<Selector>,
    ) -> Result<()> {
        validate_selectors(&selectors)?;

        let _guard = self.write_lock.lock().await;

        if !self.storage.exists(CF_ATTESTED_NODES, &spiffe_id).await? {
            return Err(DataStoreError::ConstraintViolation(format!(
                "cannot set selectors for unknown node {spiffe_id}"
            )));
        }

        let mut batch = self.storage.batch();
        self.stage_delete_prefix::<Selector>(
            &mut batch,
            CF_NODE_SELECTORS,
            &spiffe_id.to_string(),
        )
        .await?;
        for selector in &selectors {
            let key = (
                spiffe_id.to_string(),
                selector.selector_type.clone(),
                selector.value.clone(),
            );
            batch.put(CF_NODE_SELECTORS, &key, selector)?;
        }
        batch.commit().await?;

        info!(
            spiffe_id = %spiffe_id,
            count = selectors.len(),
            "Node selectors replaced"
        );
        Ok(())
    }

    pub(crate) async fn get_node_selectors_internal(
        &self,
        spiffe_id: &str,
    ) -> Result<Vec<Selector>> {
        let rows: Vec<(Vec<u8>, Selector)> = self
            .storage
            .get_by_prefix(CF_NODE_SELECTORS, &spiffe_id.to_string())
            .await?;
        Ok(rows.into_iter().map(|(_, selector)| selector).collect())
    }

    /// Stage a replacement credential without touching the current one
    ///
    /// Credentials issued against the old serial stay valid through the
    /// overlap window until promotion.
    pub(crate) async fn prepare_node_rotation_internal(
        &self,
        spiffe_id: &str,
        serial_number: String,
        expires_at: u64,
    ) -> Result<AttestedNode> {
        if serial_number.is_empty() {
            return Err(DataStoreError::Invalid(
                "replacement serial number must not be empty".to_string(),
            ));
        }

        let _guard = self.write_lock.lock().await;

        let mut node = self.fetch_node(spiffe_id).await?;

        if !node.can_reattest {
            return Err(DataStoreError::Invalid(format!(
                "node {spiffe_id} is not eligible for re-attestation"
            )));
        }

        node.pending = Some(PendingRotation {
            serial_number,
            expires_at,
        });
        node.updated_at = current_timestamp();

        self.storage
            .put(CF_ATTESTED_NODES, &spiffe_id, &node)
            .await?;

        info!(spiffe_id = %spiffe_id, "Node rotation prepared");
        Ok(node)
    }

    /// Promote the pending credential to current
    ///
    /// The read-then-write runs under the writer lock, so of two racing
    /// promotes exactly one observes a pending rotation; the other finds
    /// nothing pending and returns the node unchanged.
    pub(crate) async fn promote_node_rotation_internal(
        &self,
        spiffe_id: &str,
    ) -> Result<AttestedNode> {
        let _guard = self.write_lock.lock().await;

        let mut node = self.fetch_node(spiffe_id).await?;

        let pending = match node.pending.take() {
            Some(pending) => pending,
            None => return Ok(node),
        };

        node.serial_number = pending.serial_number;
        node.expires_at = pending.expires_at;
        node.updated_at = current_timestamp();

        self.storage
            .put(CF_ATTESTED_NODES, &spiffe_id, &node)
            .await?;

        info!(
            spiffe_id = %spiffe_id,
            serial_number = %node.serial_number,
            "Node rotation promoted"
        );
        Ok(node)
    }

    async fn fetch_node(&self, spiffe_id: &str) -> Result<AttestedNode> {
        self.storage
            .get(CF_ATTESTED_NODES, &spiffe_id)
            .await?
            .ok_or_else(|| DataStoreError::NotFound(spiffe_id.to_string()))
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

    fn new_node(spiffe_id: &str, can_reattest: bool) -> NewAttestedNode {
        NewAttestedNode {
            spiffe_id: spiffe_id.to_string(),
            attestation_data_type: "join_token".to_string(),
            serial_number: "S1".to_string(),
            expires_at: 2_000_000_000,
            can_reattest,
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let ds = service();
        let agent = "spiffe://example.org/agent/a";

        ds.create_attested_node(new_node(agent, true)).await.unwrap();

        let node = ds.get_attested_node(agent).await.unwrap();
        assert_eq!(node.serial_number, "S1");
        assert!(node.pending.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_create_is_already_exists() {
        let ds = service();
        let agent = "spiffe://example.org/agent/a";

        ds.create_attested_node(new_node(agent, true)).await.unwrap();
        let err = ds
            .create_attested_node(new_node(agent, true))
            .await
            .unwrap_err();
        assert!(matches!(err, DataStoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_update_touches_only_masked_fields() {
        let ds = service();
        let agent = "spiffe://example.org/agent/a";
        ds.create_attested_node(new_node(agent, true)).await.unwrap();

        let updated = ds
            .update_attested_node(
                agent,
                AttestedNodeUpdate {
                    expires_at: Some(2_100_000_000),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.expires_at, 2_100_000_000);
        assert_eq!(updated.serial_number, "S1");
        assert!(updated.can_reattest);
    }

    #[tokio::test]
    async fn test_prepare_requires_reattest_flag() {
        let ds = service();
        let agent = "spiffe://example.org/agent/a";
        ds.create_attested_node(new_node(agent, false))
            .await
            .unwrap();

        let err = ds
            .prepare_node_rotation(agent, "S2".to_string(), 2_100_000_000)
            .await
            .unwrap_err();
        assert!(matches!(err, DataStoreError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_rotation_prepare_then_promote() {
        let ds = service();
        let agent = "spiffe://example.org/agent/a";
        ds.create_attested_node(new_node(agent, true)).await.unwrap();

        // Prepare leaves the current credential untouched
        ds.prepare_node_rotation(agent, "S2".to_string(), 2_100_000_000)
            .await
            .unwrap();
        let node = ds.get_attested_node(agent).await.unwrap();
        assert_eq!(node.serial_number, "S1");
        assert_eq!(
            node.pending,
            Some(PendingRotation {
                serial_number: "S2".to_string(),
                expires_at: 2_100_000_000,
            })
        );

        // Promote swaps pending into current and clears it
        let promoted = ds.promote_node_rotation(agent).await.unwrap();
        assert_eq!(promoted.serial_number, "S2");
        assert_eq!(promoted.expires_at, 2_100_000_000);
        assert!(promoted.pending.is_none());

        // A second promote is a no-op, not an error
        let again = ds.promote_node_rotation(agent).await.unwrap();
        assert_eq!(again.serial_number, "S2");
        assert!(again.pending.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_promotes_have_one_winner() {
        let ds = Arc::new(service());
        let agent = "spiffe://example.org/agent/a";
        ds.create_attested_node(new_node(agent, true)).await.unwrap();
        ds.prepare_node_rotation(agent, "S2".to_string(), 2_100_000_000)
            .await
            .unwrap();

        let a = {
            let ds = Arc::clone(&ds);
            tokio::spawn(async move { ds.promote_node_rotation(agent).await })
        };
        let b = {
            let ds = Arc::clone(&ds);
            tokio::spawn(async move { ds.promote_node_rotation(agent).await })
        };

        // Both succeed; the node ends up rotated exactly once
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let node = ds.get_attested_node(agent).await.unwrap();
        assert_eq!(node.serial_number, "S2");
        assert!(node.pending.is_none());
    }

    #[tokio::test]
    async fn test_selectors_replaced_wholesale_and_deleted_with_node() {
        let ds = service();
        let agent = "spiffe://example.org/agent/a";
        ds.create_attested_node(new_node(agent, true)).await.unwrap();

        ds.set_node_selectors(
            agent,
            vec![
                Selector::new("unix", "uid:1000"),
                Selector::new("k8s", "ns:prod"),
            ],
        )
        .await
        .unwrap();
        assert_eq!(ds.get_node_selectors(agent).await.unwrap().len(), 2);

        ds.set_node_selectors(agent, vec![Selector::new("unix", "uid:1001")])
            .await
            .unwrap();
        let selectors = ds.get_node_selectors(agent).await.unwrap();
        assert_eq!(selectors, vec![Selector::new("unix", "uid:1001")]);

        ds.delete_attested_node(agent).await.unwrap();
        assert!(ds.get_node_selectors(agent).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_selectors_for_unknown_node_is_constraint_violation() {
        let ds = service();
        let err = ds
            .set_node_selectors("spiffe://example.org/agent/ghost", vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, DataStoreError::ConstraintViolation(_)));
    }

    #[tokio::test]
    async fn test_list_filters_by_expiry() {
        let ds = service();

        let mut early = new_node("spiffe://example.org/agent/a", true);
        early.expires_at = 1_000;
        ds.create_attested_node(early).await.unwrap();
        ds.create_attested_node(new_node("spiffe://example.org/agent/b", true))
            .await
            .unwrap();

        let page = ds
            .list_attested_nodes(
                NodeFilter {
                    by_expires_before: Some(2_000),
                    ..Default::default()
                },
                Pagination::first(10),
            )
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].spiffe_id, "spiffe://example.org/agent/a");
    }
}
