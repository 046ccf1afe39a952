//! Datastore type definitions.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound on serialized trust bundle and CA journal payloads (~16 MiB)
pub const MAX_BLOB_SIZE: usize = 16_777_215;

/// Trust bundle for a trust domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    pub id: Uuid,
    pub trust_domain: String,
    /// Opaque serialized trust-bundle payload
    pub data: Vec<u8>,
    pub created_at: u64,
    pub updated_at: u64,
}

/// Pending credential written by rotation prepare, consumed by promote
///
/// The serial/expiry pair is modeled as one optional value so the two
/// fields cannot be half-set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRotation {
    pub serial_number: String,
    pub expires_at: u64,
}

/// Attested node (agent) record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestedNode {
    pub id: Uuid,
    pub spiffe_id: String,
    pub attestation_data_type: String,
    pub serial_number: String,
    pub expires_at: u64,
    pub pending: Option<PendingRotation>,
    pub can_reattest: bool,
    pub created_at: u64,
    pub updated_at: u64,
}

/// Input for creating an attested node
#[derive(Debug, Clone)]
pub struct NewAttestedNode {
    pub spiffe_id: String,
    pub attestation_data_type: String,
    pub serial_number: String,
    pub expires_at: u64,
    pub can_reattest: bool,
}

/// Field-level changeset for updating an attested node
///
/// `None` leaves a field untouched. For `pending`, the outer `Option` is the
/// mask and the inner one the new value, so `Some(None)` clears a pending
/// rotation.
#[derive(Debug, Clone, Default)]
pub struct AttestedNodeUpdate {
    pub serial_number: Option<String>,
    pub expires_at: Option<u64>,
    pub pending: Option<Option<PendingRotation>>,
    pub can_reattest: Option<bool>,
}

/// A type/value attribute used to match a workload or node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selector {
    pub selector_type: String,
    pub value: String,
}

impl Selector {
    pub fn new(selector_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            selector_type: selector_type.into(),
            value: value.into(),
        }
    }
}

/// Registered entry: binds selectors and a parent to an issuable identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredEntry {
    pub entry_id: String,
    pub spiffe_id: String,
    pub parent_id: String,
    pub selectors: Vec<Selector>,
    pub dns_names: Vec<String>,
    /// Trust domains this entry federates with
    pub federates_with: Vec<String>,
    /// TTL of X.509 credentials issued from this entry
    pub x509_svid_ttl: i32,
    /// TTL of JWT credentials issued from this entry
    pub jwt_svid_ttl: i32,
    /// Optional absolute expiry of the entry itself
    pub expiry: Option<u64>,
    pub admin: bool,
    pub downstream: bool,
    /// Passed to the workload to distinguish between multiple credentials
    pub hint: String,
    /// Incremented by exactly one on every successful update
    pub revision_number: u64,
    pub created_at: u64,
    pub updated_at: u64,
}

/// Input for creating a registered entry
///
/// When `entry_id` is `None` the store assigns one.
#[derive(Debug, Clone, Default)]
pub struct NewRegisteredEntry {
    pub entry_id: Option<String>,
    pub spiffe_id: String,
    pub parent_id: String,
    pub selectors: Vec<Selector>,
    pub dns_names: Vec<String>,
    pub federates_with: Vec<String>,
    pub x509_svid_ttl: i32,
    pub jwt_svid_ttl: i32,
    pub expiry: Option<u64>,
    pub admin: bool,
    pub downstream: bool,
    pub hint: String,
}

/// Input for updating a registered entry
///
/// Mutable fields and child sets are replaced wholesale; the update only
/// applies when `expected_revision` matches the stored revision.
#[derive(Debug, Clone)]
pub struct RegisteredEntryUpdate {
    pub entry_id: String,
    pub expected_revision: u64,
    pub spiffe_id: String,
    pub parent_id: String,
    pub selectors: Vec<Selector>,
    pub dns_names: Vec<String>,
    pub federates_with: Vec<String>,
    pub x509_svid_ttl: i32,
    pub jwt_svid_ttl: i32,
    pub expiry: Option<u64>,
    pub admin: bool,
    pub downstream: bool,
    pub hint: String,
}

/// Single-use credential-bootstrap token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinToken {
    pub token: String,
    pub expiry: u64,
    pub created_at: u64,
}

/// Bundle endpoint profile of a federated trust domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BundleEndpointProfile {
    HttpsWeb,
    HttpsSpiffe { endpoint_spiffe_id: String },
}

/// Remote trust domain reachable via a bundle endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederatedTrustDomain {
    pub id: Uuid,
    pub trust_domain: String,
    pub bundle_endpoint_url: String,
    pub bundle_endpoint_profile: BundleEndpointProfile,
    /// Whether new entries federate with this trust domain by default
    pub implicit: bool,
    pub created_at: u64,
    pub updated_at: u64,
}

/// Input for creating or updating a federated trust domain
#[derive(Debug, Clone)]
pub struct NewFederatedTrustDomain {
    pub trust_domain: String,
    pub bundle_endpoint_url: String,
    pub bundle_endpoint_profile: BundleEndpointProfile,
    pub implicit: bool,
}

/// Per-server record of signing-authority identifiers for rotation
///
/// The `data` blob describes the full prepared/active/old authority set and
/// is opaque to the store; only the active ids are tracked for lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaJournal {
    pub id: Uuid,
    pub data: Vec<u8>,
    pub active_x509_authority_id: String,
    pub active_jwt_authority_id: String,
    pub created_at: u64,
    pub updated_at: u64,
}

/// Input for creating or replacing a CA journal
///
/// When `id` is `None` a new journal row is created.
#[derive(Debug, Clone)]
pub struct NewCaJournal {
    pub id: Option<Uuid>,
    pub data: Vec<u8>,
    pub active_x509_authority_id: String,
    pub active_jwt_authority_id: String,
}

/// Append-only record that an attested node was created or removed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestedNodeEvent {
    pub event_id: u64,
    pub spiffe_id: String,
    pub created_at: u64,
}

/// Append-only record that a registered entry was created or removed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredEntryEvent {
    pub event_id: u64,
    pub entry_id: String,
    pub created_at: u64,
}

/// Event log kind, used to key the per-kind sequence counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    AttestedNode,
    RegisteredEntry,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::AttestedNode => "attested_node",
            EventKind::RegisteredEntry => "registered_entry",
        }
    }
}

/// Persisted schema version record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaVersion {
    pub version: u32,
    pub code_version: String,
    pub updated_at: u64,
}

/// Cursor-based pagination request
///
/// The cursor is the natural key of the last item of the previous page;
/// `None` starts from the beginning.
///
/// Listings follow the storage key order: serialized string keys compare by
/// length first, then bytes, so shorter identifiers sort before longer ones
/// regardless of content. The order is stable across pages, which is all
/// cursor pagination requires.
#[derive(Debug, Clone, Default)]
pub struct Pagination {
    pub cursor: Option<String>,
    pub page_size: usize,
}

impl Pagination {
    pub fn first(page_size: usize) -> Self {
        Self {
            cursor: None,
            page_size,
        }
    }
}

/// One page of list results
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Cursor for the next page; `None` when the listing is exhausted
    pub next_cursor: Option<String>,
}

/// Selector match behavior for entry listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchBehavior {
    /// At least one of the entry's selectors appears in the given set
    MatchAny,
    /// Every one of the entry's selectors appears in the given set
    MatchAll,
}

/// Selector filter for entry listing
#[derive(Debug, Clone)]
pub struct SelectorMatch {
    pub behavior: MatchBehavior,
    pub selectors: Vec<Selector>,
}

/// Filters for listing registered entries; all present filters must match
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub by_parent_id: Option<String>,
    pub by_spiffe_id_prefix: Option<String>,
    pub by_selectors: Option<SelectorMatch>,
    pub by_hint: Option<String>,
    pub by_federates_with: Option<String>,
}

/// Filters for listing attested nodes
#[derive(Debug, Clone, Default)]
pub struct NodeFilter {
    pub by_expires_before: Option<u64>,
    pub by_can_reattest: Option<bool>,
}

/// Current unix timestamp in seconds
pub fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
