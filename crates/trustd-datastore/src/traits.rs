//! Datastore trait definitions.

use crate::{errors::Result, types::*};
use async_trait::async_trait;
use uuid::Uuid;

/// Logical operation surface of the persistence layer
///
/// Consumed by the attestation service, registration API, CA manager, and
/// replica cache synchronizers. All operations are safe to cancel: a dropped
/// future leaves no partial writes.
#[async_trait]
pub trait DataStore: Send + Sync {
    // ========================================================================
    // Trust bundles
    // ========================================================================

    /// Create a trust bundle; fails with `AlreadyExists` on a duplicate
    /// trust domain
    async fn create_bundle(&self, trust_domain: String, data: Vec<u8>) -> Result<Bundle>;

    /// Replace the payload of an existing bundle
    async fn update_bundle(&self, trust_domain: &str, data: Vec<u8>) -> Result<Bundle>;

    /// Create the bundle if absent, otherwise replace its payload
    async fn set_bundle(&self, trust_domain: String, data: Vec<u8>) -> Result<Bundle>;

    /// Get a bundle by trust domain
    async fn get_bundle(&self, trust_domain: &str) -> Result<Bundle>;

    /// Delete a bundle and its federation association rows
    ///
    /// Referencing entries are never deleted; each simply loses this trust
    /// domain from its federation list.
    async fn delete_bundle(&self, trust_domain: &str) -> Result<()>;

    /// List bundles in stored key order (see [`Pagination`])
    async fn list_bundles(&self, pagination: Pagination) -> Result<Page<Bundle>>;

    // ========================================================================
    // Attested nodes
    // ========================================================================

    /// Create an attested node and append a creation event
    async fn create_attested_node(&self, new: NewAttestedNode) -> Result<AttestedNode>;

    /// Get an attested node by agent identity
    async fn get_attested_node(&self, spiffe_id: &str) -> Result<AttestedNode>;

    /// Apply a field-level changeset; untouched fields keep their values
    async fn update_attested_node(
        &self,
        spiffe_id: &str,
        changes: AttestedNodeUpdate,
    ) -> Result<AttestedNode>;

    /// Delete a node, its selectors, and append a removal event
    async fn delete_attested_node(&self, spiffe_id: &str) -> Result<()>;

    /// List attested nodes in stored key order (see [`Pagination`])
    async fn list_attested_nodes(
        &self,
        filter: NodeFilter,
        pagination: Pagination,
    ) -> Result<Page<AttestedNode>>;

    /// Replace a node's selector set wholesale
    async fn set_node_selectors(&self, spiffe_id: &str, selectors: Vec<Selector>) -> Result<()>;

    /// Get a node's selector set
    async fn get_node_selectors(&self, spiffe_id: &str) -> Result<Vec<Selector>>;

    // ========================================================================
    // Node re-attestation rotation
    // ========================================================================

    /// Stage a replacement credential without disturbing the current one
    ///
    /// Fails with `Invalid` when the node is not flagged for re-attestation.
    async fn prepare_node_rotation(
        &self,
        spiffe_id: &str,
        serial_number: String,
        expires_at: u64,
    ) -> Result<AttestedNode>;

    /// Promote the pending credential to current and clear it
    ///
    /// Idempotent: promoting a node with no pending rotation is a no-op, so
    /// exactly one of two racing promotes takes effect.
    async fn promote_node_rotation(&self, spiffe_id: &str) -> Result<AttestedNode>;

    // ========================================================================
    // Registered entries
    // ========================================================================

    /// Create an entry with its selectors, DNS names, and federation
    /// associations, and append a creation event — all in one transaction
    ///
    /// Fails with `NotFound` when any federation target bundle is missing;
    /// nothing is written in that case.
    async fn create_registered_entry(&self, new: NewRegisteredEntry) -> Result<RegisteredEntry>;

    /// Get an entry by id
    async fn get_registered_entry(&self, entry_id: &str) -> Result<RegisteredEntry>;

    /// Replace an entry's mutable fields and child sets wholesale
    ///
    /// Fails with `Conflict` when `expected_revision` is stale; on success
    /// the revision number increases by exactly one.
    async fn update_registered_entry(
        &self,
        update: RegisteredEntryUpdate,
    ) -> Result<RegisteredEntry>;

    /// Delete an entry, cascade its children, and append a removal event
    async fn delete_registered_entry(&self, entry_id: &str) -> Result<()>;

    /// List entries in stored key order, applying all present filters
    async fn list_registered_entries(
        &self,
        filter: EntryFilter,
        pagination: Pagination,
    ) -> Result<Page<RegisteredEntry>>;

    /// Delete entries whose absolute expiry falls before the cutoff,
    /// cascading children and appending removal events; returns the count
    async fn prune_registered_entries(&self, expires_before: u64) -> Result<usize>;

    // ========================================================================
    // Join tokens
    // ========================================================================

    /// Create a single-use bootstrap token
    async fn create_join_token(&self, token: String, expiry: u64) -> Result<JoinToken>;

    /// Fetch a token without consuming it
    async fn fetch_join_token(&self, token: &str) -> Result<Option<JoinToken>>;

    /// Consume a token exactly once; a second consume returns `NotFound`
    async fn consume_join_token(&self, token: &str) -> Result<JoinToken>;

    /// Delete tokens whose expiry falls before the cutoff; returns the count
    async fn prune_join_tokens(&self, expires_before: u64) -> Result<usize>;

    // ========================================================================
    // Federated trust domains
    // ========================================================================

    async fn create_federated_trust_domain(
        &self,
        new: NewFederatedTrustDomain,
    ) -> Result<FederatedTrustDomain>;

    async fn update_federated_trust_domain(
        &self,
        new: NewFederatedTrustDomain,
    ) -> Result<FederatedTrustDomain>;

    async fn get_federated_trust_domain(&self, trust_domain: &str)
        -> Result<FederatedTrustDomain>;

    async fn delete_federated_trust_domain(&self, trust_domain: &str) -> Result<()>;

    async fn list_federated_trust_domains(
        &self,
        pagination: Pagination,
    ) -> Result<Page<FederatedTrustDomain>>;

    // ========================================================================
    // CA journal
    // ========================================================================

    /// Create a journal row, or replace one when `id` is given
    async fn set_ca_journal(&self, journal: NewCaJournal) -> Result<CaJournal>;

    /// Get a journal by id
    async fn get_ca_journal(&self, journal_id: Uuid) -> Result<CaJournal>;

    /// Look up the journal whose active X.509 authority matches
    async fn fetch_ca_journal_by_x509_authority(
        &self,
        authority_id: &str,
    ) -> Result<Option<CaJournal>>;

    /// Promote prepared authorities to active on an existing journal
    ///
    /// The previous active ids remain described inside the opaque data blob;
    /// the store never deletes authority ids on rotation.
    async fn set_active_authorities(
        &self,
        journal_id: Uuid,
        x509_authority_id: String,
        jwt_authority_id: String,
    ) -> Result<CaJournal>;

    // ========================================================================
    // Event log
    // ========================================================================

    /// Fetch node events with ids strictly greater than `after_event_id`
    async fn list_node_events_since(
        &self,
        after_event_id: u64,
        limit: usize,
    ) -> Result<Vec<AttestedNodeEvent>>;

    /// Fetch entry events with ids strictly greater than `after_event_id`
    async fn list_entry_events_since(
        &self,
        after_event_id: u64,
        limit: usize,
    ) -> Result<Vec<RegisteredEntryEvent>>;

    /// Delete node events recorded before the cutoff; returns the count
    async fn prune_node_events(&self, older_than: u64) -> Result<usize>;

    /// Delete entry events recorded before the cutoff; returns the count
    async fn prune_entry_events(&self, older_than: u64) -> Result<usize>;

    // ========================================================================
    // Schema version
    // ========================================================================

    /// Get the persisted schema version, if any has been recorded
    async fn get_schema_version(&self) -> Result<Option<SchemaVersion>>;

    /// Record the schema and code version
    async fn set_schema_version(&self, version: u32, code_version: String)
        -> Result<SchemaVersion>;

    /// Compare the persisted schema version against the expected one
    ///
    /// Returns `Fatal` when no version is recorded or the versions differ;
    /// startup must not proceed in either case.
    async fn assert_schema_version(&self, expected: u32) -> Result<()>;
}
