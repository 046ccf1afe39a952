//! Datastore service implementation.
//!
//! `DataStoreService` implements [`DataStore`](crate::traits::DataStore) on
//! top of the [`Storage`] abstraction. Each operation lives in its entity's
//! module; this module holds the shared transaction plumbing: event-id
//! allocation, cascade staging, and cursor pagination.

pub mod bundle;
pub mod entry;
pub mod events;
pub mod federation;
pub mod journal;
pub mod migration;
pub mod node;
pub mod token;

use crate::{
    errors::{DataStoreError, Result},
    traits::DataStore,
    types::*,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::Mutex;
use trustd_storage::{
    traits::BatchExt, Batch, Storage, CF_ENTRY_EVENTS, CF_EVENT_SEQUENCES, CF_NODE_EVENTS,
};
use uuid::Uuid;

/// Datastore service
///
/// Cheap to share behind an `Arc`; all coordination happens through the
/// backing store's batches plus one writer lock.
pub struct DataStoreService<S: Storage> {
    storage: Arc<S>,
    /// Serializes read-then-write sequences (revision checks, rotation
    /// promotion, token consumption, event-id allocation) against the
    /// embedded backing store. Read-only operations bypass it.
    write_lock: Mutex<()>,
}

impl<S: Storage> DataStoreService<S> {
    /// Create a new datastore service over the given storage backend
    pub fn new(storage: Arc<S>) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
        }
    }

    /// Access the underlying storage (test support)
    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    /// Read the last committed event id for `kind`
    ///
    /// Staged increments are invisible until their batch commits, so a
    /// mutation that appends events must load the sequence once and thread
    /// it through every stage call in that batch. Must be called with the
    /// write lock held so ids are strictly increasing and never reused.
    pub(crate) async fn load_event_sequence(&self, kind: EventKind) -> Result<u64> {
        let current: Option<u64> = self.storage.get(CF_EVENT_SEQUENCES, &kind.as_str()).await?;
        Ok(current.unwrap_or(0))
    }

    /// Stage an attested-node event row in the mutation's batch
    pub(crate) fn stage_node_event(
        &self,
        batch: &mut Box<dyn Batch>,
        spiffe_id: &str,
        sequence: &mut u64,
    ) -> Result<u64> {
        *sequence += 1;
        let event_id = *sequence;
        batch.put(CF_EVENT_SEQUENCES, &EventKind::AttestedNode.as_str(), sequence)?;
        let event = AttestedNodeEvent {
            event_id,
            spiffe_id: spiffe_id.to_string(),
            created_at: current_timestamp(),
        };
        batch.put(CF_NODE_EVENTS, &event_id.to_be_bytes(), &event)?;
        Ok(event_id)
    }

    /// Stage a registered-entry event row in the mutation's batch
    pub(crate) fn stage_entry_event(
        &self,
        batch: &mut Box<dyn Batch>,
        entry_id: &str,
        sequence: &mut u64,
    ) -> Result<u64> {
        *sequence += 1;
        let event_id = *sequence;
        batch.put(
            CF_EVENT_SEQUENCES,
            &EventKind::RegisteredEntry.as_str(),
            sequence,
        )?;
        let event = RegisteredEntryEvent {
            event_id,
            entry_id: entry_id.to_string(),
            created_at: current_timestamp(),
        };
        batch.put(CF_ENTRY_EVENTS, &event_id.to_be_bytes(), &event)?;
        Ok(event_id)
    }

    /// Stage deletion of every row under `prefix` and return the rows
    pub(crate) async fn stage_delete_prefix<V>(
        &self,
        batch: &mut Box<dyn Batch>,
        cf: &str,
        prefix: &String,
    ) -> Result<Vec<(Vec<u8>, V)>>
    where
        V: DeserializeOwned + Send,
    {
        let rows: Vec<(Vec<u8>, V)> = self.storage.get_by_prefix(cf, prefix).await?;
        for (raw_key, _) in &rows {
            batch.delete_raw(cf, raw_key.clone())?;
        }
        Ok(rows)
    }

    /// Scan a column family in key order, applying a filter, and assemble
    /// one page of results
    ///
    /// The cursor is the natural key of the last row scanned, so a caller
    /// can stop consuming at any point and restart without side effects.
    pub(crate) async fn list_page<V, F>(
        &self,
        cf: &str,
        pagination: Pagination,
        key_of: fn(&V) -> &str,
        mut matches: F,
    ) -> Result<Page<V>>
    where
        V: DeserializeOwned + Send,
        F: FnMut(&V) -> bool + Send,
    {
        if pagination.page_size == 0 {
            return Err(DataStoreError::Invalid(
                "page size must be greater than zero".to_string(),
            ));
        }

        let mut items = Vec::new();
        let mut after = pagination.cursor;

        loop {
            let chunk: Vec<(Vec<u8>, V)> = self
                .storage
                .scan_page(cf, after.as_ref(), pagination.page_size)
                .await?;
            let exhausted = chunk.len() < pagination.page_size;

            for (_, value) in chunk {
                after = Some(key_of(&value).to_string());
                if matches(&value) {
                    items.push(value);
                    if items.len() == pagination.page_size {
                        return Ok(Page {
                            items,
                            next_cursor: after,
                        });
                    }
                }
            }

            if exhausted {
                return Ok(Page {
                    items,
                    next_cursor: None,
                });
            }
        }
    }
}

#[async_trait]
impl<S: Storage + 'static> DataStore for DataStoreService<S> {
    async fn create_bundle(&self, trust_domain: String, data: Vec<u8>) -> Result<Bundle> {
        self.create_bundle_internal(trust_domain, data).await
    }

    async fn update_bundle(&self, trust_domain: &str, data: Vec<u8>) -> Result<Bundle> {
        self.update_bundle_internal(trust_domain, data).await
    }

    async fn set_bundle(&self, trust_domain: String, data: Vec<u8>) -> Result<Bundle> {
        self.set_bundle_internal(trust_domain, data).await
    }

    async fn get_bundle(&self, trust_domain: &str) -> Result<Bundle> {
        self.get_bundle_internal(trust_domain).await
    }

    async fn delete_bundle(&self, trust_domain: &str) -> Result<()> {
        self.delete_bundle_internal(trust_domain).await
    }

    async fn list_bundles(&self, pagination: Pagination) -> Result<Page<Bundle>> {
        self.list_bundles_internal(pagination).await
    }

    async fn create_attested_node(&self, new: NewAttestedNode) -> Result<AttestedNode> {
        self.create_attested_node_internal(new).await
    }

    async fn get_attested_node(&self, spiffe_id: &str) -> Result<AttestedNode> {
        self.get_attested_node_internal(spiffe_id).await
    }

    async fn update_attested_node(
        &self,
        spiffe_id: &str,
        changes: AttestedNodeUpdate,
    ) -> Result<AttestedNode> {
        self.update_attested_node_internal(spiffe_id, changes).await
    }

    async fn delete_attested_node(&self, spiffe_id: &str) -> Result<()> {
        self.delete_attested_node_internal(spiffe_id).await
    }

    async fn list_attested_nodes(
        &self,
        filter: NodeFilter,
        pagination: Pagination,
    ) -> Result<Page<AttestedNode>> {
        self.list_attested_nodes_internal(filter, pagination).await
    }

    async fn set_node_selectors(&self, spiffe_id: &str, selectors: Vec<Selector>) -> Result<()> {
        self.set_node_selectors_internal(spiffe_id, selectors).await
    }

    async fn get_node_selectors(&self, spiffe_id: &str) -> Result<Vec<Selector>> {
        self.get_node_selectors_internal(spiffe_id).await
    }

    async fn prepare_node_rotation(
        &self,
        spiffe_id: &str,
        serial_number: String,
        expires_at: u64,
    ) -> Result<AttestedNode> {
        self.prepare_node_rotation_internal(spiffe_id, serial_number, expires_at)
            .await
    }

    async fn promote_node_rotation(&self, spiffe_id: &str) -> Result<AttestedNode> {
        self.promote_node_rotation_internal(spiffe_id).await
    }

    async fn create_registered_entry(&self, new: NewRegisteredEntry) -> Result<RegisteredEntry> {
        self.create_registered_entry_internal(new).await
    }

    async fn get_registered_entry(&self, entry_id: &str) -> Result<RegisteredEntry> {
        self.get_registered_entry_internal(entry_id).await
    }

    async fn update_registered_entry(
        &self,
        update: RegisteredEntryUpdate,
    ) -> Result<RegisteredEntry> {
        self.update_registered_entry_internal(update).await
    }

    async fn delete_registered_entry(&self, entry_id: &str) -> Result<()> {
        self.delete_registered_entry_internal(entry_id).await
    }

    async fn list_registered_entries(
        &self,
        filter: EntryFilter,
        pagination: Pagination,
    ) -> Result<Page<RegisteredEntry>> {
        self.list_registered_entries_internal(filter, pagination)
            .await
    }

    async fn prune_registered_entries(&self, expires_before: u64) -> Result<usize> {
        self.prune_registered_entries_internal(expires_before).await
    }

    async fn create_join_token(&self, token: String, expiry: u64) -> Result<JoinToken> {
        self.create_join_token_internal(token, expiry).await
    }

    async fn fetch_join_token(&self, token: &str) -> Result<Option<JoinToken>> {
        self.fetch_join_token_internal(token).await
    }

    async fn consume_join_token(&self, token: &str) -> Result<JoinToken> {
        self.consume_join_token_internal(token).await
    }

    async fn prune_join_tokens(&self, expires_before: u64) -> Result<usize> {
        self.prune_join_tokens_internal(expires_before).await
    }

    async fn create_federated_trust_domain(
        &self,
        new: NewFederatedTrustDomain,
    ) -> Result<FederatedTrustDomain> {
        self.create_federated_trust_domain_internal(new).await
    }

    async fn update_federated_trust_domain(
        &self,
        new: NewFederatedTrustDomain,
    ) -> Result<FederatedTrustDomain> {
        self.update_federated_trust_domain_internal(new).await
    }

    async fn get_federated_trust_domain(
        &self,
        trust_domain: &str,
    ) -> Result<FederatedTrustDomain> {
        self.get_federated_trust_domain_internal(trust_domain).await
    }

    async fn delete_federated_trust_domain(&self, trust_domain: &str) -> Result<()> {
        self.delete_federated_trust_domain_internal(trust_domain)
            .await
    }

    async fn list_federated_trust_domains(
        &self,
        pagination: Pagination,
    ) -> Result<Page<FederatedTrustDomain>> {
        self.list_federated_trust_domains_internal(pagination).await
    }

    async fn set_ca_journal(&self, journal: NewCaJournal) -> Result<CaJournal> {
        self.set_ca_journal_internal(journal).await
    }

    async fn get_ca_journal(&self, journal_id: Uuid) -> Result<CaJournal> {
        self.get_ca_journal_internal(journal_id).await
    }

    async fn fetch_ca_journal_by_x509_authority(
        &self,
        authority_id: &str,
    ) -> Result<Option<CaJournal>> {
        self.fetch_ca_journal_by_x509_authority_internal(authority_id)
            .await
    }

    async fn set_active_authorities(
        &self,
        journal_id: Uuid,
        x509_authority_id: String,
        jwt_authority_id: String,
    ) -> Result<CaJournal> {
        self.set_active_authorities_internal(journal_id, x509_authority_id, jwt_authority_id)
            .await
    }

    async fn list_node_events_since(
        &self,
        after_event_id: u64,
        limit: usize,
    ) -> Result<Vec<AttestedNodeEvent>> {
        self.list_node_events_since_internal(after_event_id, limit)
            .await
    }

    async fn list_entry_events_since(
        &self,
        after_event_id: u64,
        limit: usize,
    ) -> Result<Vec<RegisteredEntryEvent>> {
        self.list_entry_events_since_internal(after_event_id, limit)
            .await
    }

    async fn prune_node_events(&self, older_than: u64) -> Result<usize> {
        self.prune_node_events_internal(older_than).await
    }

    async fn prune_entry_events(&self, older_than: u64) -> Result<usize> {
        self.prune_entry_events_internal(older_than).await
    }

    async fn get_schema_version(&self) -> Result<Option<SchemaVersion>> {
        self.get_schema_version_internal().await
    }

    async fn set_schema_version(
        &self,
        version: u32,
        code_version: String,
    ) -> Result<SchemaVersion> {
        self.set_schema_version_internal(version, code_version).await
    }

    async fn assert_schema_version(&self, expected: u32) -> Result<()> {
        self.assert_schema_version_internal(expected).await
    }
}
