//! Column family definitions for the trustd datastore.
//!
//! Each entity kind maps to one column family; child records and secondary
//! indexes use composite keys so cascade and lookup semantics stay explicit.
//! The mapping is fixed at database-open time.

/// Trust bundles: trust_domain → Bundle
pub const CF_BUNDLES: &str = "bundles";

/// Attested nodes: spiffe_id → AttestedNode
pub const CF_ATTESTED_NODES: &str = "attested_nodes";

/// Node selectors: (spiffe_id, type, value) → Selector
pub const CF_NODE_SELECTORS: &str = "node_selectors";

/// Registered entries: entry_id → RegisteredEntry
pub const CF_REGISTERED_ENTRIES: &str = "registered_entries";

/// Entry selectors: (entry_id, type, value) → ()
pub const CF_ENTRY_SELECTORS: &str = "entry_selectors";

/// Entry DNS names: (entry_id, value) → ()
pub const CF_DNS_NAMES: &str = "dns_names";

/// Bundle↔entry federation association: (trust_domain, entry_id) → entry_id
pub const CF_FEDERATED_ENTRIES: &str = "federated_entries";

/// Entries by parent index: (parent_id, entry_id) → entry_id
pub const CF_ENTRIES_BY_PARENT: &str = "entries_by_parent";

/// Join tokens: token → JoinToken
pub const CF_JOIN_TOKENS: &str = "join_tokens";

/// Federated trust domains: trust_domain → FederatedTrustDomain
pub const CF_FEDERATED_TRUST_DOMAINS: &str = "federated_trust_domains";

/// CA journals: journal_id → CaJournal
pub const CF_CA_JOURNALS: &str = "ca_journals";

/// CA journals by active X.509 authority index: authority_id → journal_id
pub const CF_CA_JOURNALS_BY_X509_AUTHORITY: &str = "ca_journals_by_x509_authority";

/// Attested node events: big-endian event id → AttestedNodeEvent
pub const CF_NODE_EVENTS: &str = "node_events";

/// Registered entry events: big-endian event id → RegisteredEntryEvent
pub const CF_ENTRY_EVENTS: &str = "entry_events";

/// Event sequence counters: event kind → u64
pub const CF_EVENT_SEQUENCES: &str = "event_sequences";

/// Schema version: single row under a fixed key
pub const CF_MIGRATIONS: &str = "migrations";

/// Get all column family names
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        CF_BUNDLES,
        CF_ATTESTED_NODES,
        CF_NODE_SELECTORS,
        CF_REGISTERED_ENTRIES,
        CF_ENTRY_SELECTORS,
        CF_DNS_NAMES,
        CF_FEDERATED_ENTRIES,
        CF_ENTRIES_BY_PARENT,
        CF_JOIN_TOKENS,
        CF_FEDERATED_TRUST_DOMAINS,
        CF_CA_JOURNALS,
        CF_CA_JOURNALS_BY_X509_AUTHORITY,
        CF_NODE_EVENTS,
        CF_ENTRY_EVENTS,
        CF_EVENT_SEQUENCES,
        CF_MIGRATIONS,
    ]
}
