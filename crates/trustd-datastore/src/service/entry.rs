//! Registered entry operations.
//!
//! An entry, its selector rows, DNS rows, federation association rows, the
//! parent index row, and its event-log row always move in one batch, so no
//! reader ever observes an entry with half its children.

use crate::{errors::*, types::*};
use std::collections::HashSet;
use tracing::info;
use trustd_storage::{
    traits::BatchExt, Batch, Storage, CF_BUNDLES, CF_DNS_NAMES, CF_ENTRIES_BY_PARENT,
    CF_ENTRY_SELECTORS, CF_FEDERATED_ENTRIES, CF_REGISTERED_ENTRIES,
};
use uuid::Uuid;

use super::node::validate_selectors;
use super::DataStoreService;

const MAX_DNS_NAME_LEN: usize = 253;
const MAX_DNS_LABEL_LEN: usize = 63;

pub(crate) fn validate_dns_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_DNS_NAME_LEN {
        return Err(DataStoreError::Invalid(format!(
            "malformed DNS name: {name:?}"
        )));
    }
    for label in name.split('.') {
        let valid_label = !label.is_empty()
            && label.len() <= MAX_DNS_LABEL_LEN
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
            && !label.starts_with('-')
            && !label.ends_with('-');
        if !valid_label {
            return Err(DataStoreError::Invalid(format!(
                "malformed DNS name: {name:?}"
            )));
        }
    }
    Ok(())
}

struct EntryFields<'a> {
    spiffe_id: &'a str,
    parent_id: &'a str,
    selectors: &'a [Selector],
    dns_names: &'a [String],
    federates_with: &'a [String],
    x509_svid_ttl: i32,
    jwt_svid_ttl: i32,
}

fn validate_entry_fields(fields: &EntryFields<'_>) -> Result<()> {
    if fields.spiffe_id.is_empty() {
        return Err(DataStoreError::Invalid(
            "entry spiffe id must not be empty".to_string(),
        ));
    }
    if fields.parent_id.is_empty() {
        return Err(DataStoreError::Invalid(
            "entry parent id must not be empty".to_string(),
        ));
    }
    if fields.x509_svid_ttl < 0 || fields.jwt_svid_ttl < 0 {
        return Err(DataStoreError::Invalid(
            "credential TTLs must not be negative".to_string(),
        ));
    }
    if fields.selectors.is_empty() {
        return Err(DataStoreError::Invalid(
            "entry must have at least one selector".to_string(),
        ));
    }
    validate_selectors(fields.selectors)?;

    let mut seen_dns = HashSet::new();
    for name in fields.dns_names {
        validate_dns_name(name)?;
        if !seen_dns.insert(name.as_str()) {
            return Err(DataStoreError::Invalid(format!(
                "duplicate DNS name {name:?}"
            )));
        }
    }

    let mut seen_td = HashSet::new();
    for trust_domain in fields.federates_with {
        super::bundle::validate_trust_domain(trust_domain)?;
        if !seen_td.insert(trust_domain.as_str()) {
            return Err(DataStoreError::Invalid(format!(
                "duplicate federation target {trust_domain:?}"
            )));
        }
    }

    Ok(())
}

impl<S: Storage> DataStoreService<S> {
    /// Require a bundle for every federation target
    ///
    /// Any missing target fails the whole operation before a single row is
    /// staged, so no partial association can exist.
    async fn validate_federation_targets(&self, federates_with: &[String]) -> Result<()> {
        for trust_domain in federates_with {
            if !self.storage.exists(CF_BUNDLES, trust_domain).await? {
                return Err(DataStoreError::NotFound(format!(
                    "bundle for trust domain {trust_domain}"
                )));
            }
        }
        Ok(())
    }

    /// Stage the child rows an entry owns, keys derived from the record
    fn stage_entry_children(
        &self,
        batch: &mut Box<dyn Batch>,
        entry: &RegisteredEntry,
    ) -> Result<()> {
        for selector in &entry.selectors {
            let key = (
                entry.entry_id.clone(),
                selector.selector_type.clone(),
                selector.value.clone(),
            );
            batch.put(CF_ENTRY_SELECTORS, &key, &())?;
        }
        for name in &entry.dns_names {
            batch.put(CF_DNS_NAMES, &(entry.entry_id.clone(), name.clone()), &())?;
        }
        for trust_domain in &entry.federates_with {
            let key = (trust_domain.clone(), entry.entry_id.clone());
            batch.put(CF_FEDERATED_ENTRIES, &key, &entry.entry_id)?;
        }
        batch.put(
            CF_ENTRIES_BY_PARENT,
            &(entry.parent_id.clone(), entry.entry_id.clone()),
            &entry.entry_id,
        )?;
        Ok(())
    }

    /// Stage removal of every child row an entry owns
    fn stage_remove_entry_children(
        &self,
        batch: &mut Box<dyn Batch>,
        entry: &RegisteredEntry,
    ) -> Result<()> {
        for selector in &entry.selectors {
            let key = (
                entry.entry_id.clone(),
                selector.selector_type.clone(),
                selector.value.clone(),
            );
            batch.delete(CF_ENTRY_SELECTORS, &key)?;
        }
        for name in &entry.dns_names {
            batch.delete(CF_DNS_NAMES, &(entry.entry_id.clone(), name.clone()))?;
        }
        for trust_domain in &entry.federates_with {
            batch.delete(
                CF_FEDERATED_ENTRIES,
                &(trust_domain.clone(), entry.entry_id.clone()),
            )?;
        }
        batch.delete(
            CF_ENTRIES_BY_PARENT,
            &(entry.parent_id.clone(), entry.entry_id.clone()),
        )?;
        Ok(())
    }

    pub(crate) async fn create_registered_entry_internal(
        &self,
        new: NewRegisteredEntry,
    ) -> Result<RegisteredEntry> {
        validate_entry_fields(&EntryFields {
            spiffe_id: &new.spiffe_id,
            parent_id: &new.parent_id,
            selectors: &new.selectors,
            dns_names: &new.dns_names,
            federates_with: &new.federates_with,
            x509_svid_ttl: new.x509_svid_ttl,
            jwt_svid_ttl: new.jwt_svid_ttl,
        })?;
        if let Some(entry_id) = &new.entry_id {
            if entry_id.is_empty() {
                return Err(DataStoreError::Invalid(
                    "entry id must not be empty".to_string(),
                ));
            }
        }

        let _guard = self.write_lock.lock().await;

        let entry_id = new
            .entry_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        if self
            .storage
            .exists(CF_REGISTERED_ENTRIES, &entry_id)
            .await?
        {
            return Err(DataStoreError::AlreadyExists(entry_id));
        }

        self.validate_federation_targets(&new.federates_with).await?;

        let now = current_timestamp();
        let entry = RegisteredEntry {
            entry_id,
            spiffe_id: new.spiffe_id,
            parent_id: new.parent_id,
            selectors: new.selectors,
            dns_names: new.dns_names,
            federates_with: new.federates_with,
            x509_svid_ttl: new.x509_svid_ttl,
            jwt_svid_ttl: new.jwt_svid_ttl,
            expiry: new.expiry,
            admin: new.admin,
            downstream: new.downstream,
            hint: new.hint,
            revision_number: 0,
            created_at: now,
            updated_at: now,
        };

        let mut sequence = self
            .load_event_sequence(EventKind::RegisteredEntry)
            .await?;
        let mut batch = self.storage.batch();
        batch.put(CF_REGISTERED_ENTRIES, &entry.entry_id, &entry)?;
        self.stage_entry_children(&mut batch, &entry)?;
        self.stage_entry_event(&mut batch, &entry.entry_id, &mut sequence)?;
        batch.commit().await?;

        info!(entry_id = %entry.entry_id, spiffe_id = %entry.spiffe_id, "Registered entry created");
        Ok(entry)
    }

    pub(crate) async fn get_registered_entry_internal(
        &self,
        entry_id: &str,
    ) -> Result<RegisteredEntry> {
        self.fetch_entry(entry_id).await
    }

    pub(crate) async fn update_registered_entry_internal(
        &self,
        update: RegisteredEntryUpdate,
    ) -> Result<RegisteredEntry> {
        validate_entry_fields(&EntryFields {
            spiffe_id: &update.spiffe_id,
            parent_id: &update.parent_id,
            selectors: &update.selectors,
            dns_names: &update.dns_names,
            federates_with: &update.federates_with,
            x509_svid_ttl: update.x509_svid_ttl,
            jwt_svid_ttl: update.jwt_svid_ttl,
        })?;

        let _guard = self.write_lock.lock().await;

        let stored = self.fetch_entry(&update.entry_id).await?;

        if stored.revision_number != update.expected_revision {
            return Err(DataStoreError::Conflict {
                entry_id: update.entry_id,
                expected: update.expected_revision,
                stored: stored.revision_number,
            });
        }

        self.validate_federation_targets(&update.federates_with)
            .await?;

        let entry = RegisteredEntry {
            entry_id: stored.entry_id.clone(),
            spiffe_id: update.spiffe_id,
            parent_id: update.parent_id,
            selectors: update.selectors,
            dns_names: update.dns_names,
            federates_with: update.federates_with,
            x509_svid_ttl: update.x509_svid_ttl,
            jwt_svid_ttl: update.jwt_svid_ttl,
            expiry: update.expiry,
            admin: update.admin,
            downstream: update.downstream,
            hint: update.hint,
            revision_number: stored.revision_number + 1,
            created_at: stored.created_at,
            updated_at: current_timestamp(),
        };

        let mut batch = self.storage.batch();
        self.stage_remove_entry_children(&mut batch, &stored)?;
        batch.put(CF_REGISTERED_ENTRIES, &entry.entry_id, &entry)?;
        self.stage_entry_children(&mut batch, &entry)?;
        batch.commit().await?;

        info!(
            entry_id = %entry.entry_id,
            revision = entry.revision_number,
            "Registered entry updated"
        );
        Ok(entry)
    }

    pub(crate) async fn delete_registered_entry_internal(&self, entry_id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let entry = self.fetch_entry(entry_id).await?;

        let mut sequence = self
            .load_event_sequence(EventKind::RegisteredEntry)
            .await?;
        let mut batch = self.storage.batch();
        self.stage_entry_removal(&mut batch, &entry, &mut sequence)?;
        batch.commit().await?;

        info!(entry_id = %entry_id, "Registered entry deleted");
        Ok(())
    }

    /// Stage the full removal of an entry: row, children, removal event
    fn stage_entry_removal(
        &self,
        batch: &mut Box<dyn Batch>,
        entry: &RegisteredEntry,
        sequence: &mut u64,
    ) -> Result<()> {
        batch.delete(CF_REGISTERED_ENTRIES, &entry.entry_id)?;
        self.stage_remove_entry_children(batch, entry)?;
        self.stage_entry_event(batch, &entry.entry_id, sequence)?;
        Ok(())
    }

    pub(crate) async fn list_registered_entries_internal(
        &self,
        filter: EntryFilter,
        pagination: Pagination,
    ) -> Result<Page<RegisteredEntry>> {
        let selector_set: Option<(MatchBehavior, HashSet<Selector>)> = filter
            .by_selectors
            .map(|m| (m.behavior, m.selectors.into_iter().collect()));

        self.list_page(
            CF_REGISTERED_ENTRIES,
            pagination,
            |entry: &RegisteredEntry| &entry.entry_id,
            move |entry| {
                if let Some(parent_id) = &filter.by_parent_id {
                    if entry.parent_id != *parent_id {
                        return false;
                    }
                }
                if let Some(prefix) = &filter.by_spiffe_id_prefix {
                    if !entry.spiffe_id.starts_with(prefix.as_str()) {
                        return false;
                    }
                }
                if let Some(hint) = &filter.by_hint {
                    if entry.hint != *hint {
                        return false;
                    }
                }
                if let Some(trust_domain) = &filter.by_federates_with {
                    if !entry.federates_with.contains(trust_domain) {
                        return false;
                    }
                }
                if let Some((behavior, selectors)) = &selector_set {
                    let matched = match behavior {
                        MatchBehavior::MatchAny => {
                            entry.selectors.iter().any(|s| selectors.contains(s))
                        }
                        MatchBehavior::MatchAll => {
                            entry.selectors.iter().all(|s| selectors.contains(s))
                        }
                    };
                    if !matched {
                        return false;
                    }
                }
                true
            },
        )
        .await
    }

    /// Delete entries whose absolute expiry falls before the cutoff
    ///
    /// Each expired entry is removed with its full cascade and a removal
    /// event, all in one batch.
    pub(crate) async fn prune_registered_entries_internal(
        &self,
        expires_before: u64,
    ) -> Result<usize> {
        let _guard = self.write_lock.lock().await;

        let mut expired = Vec::new();
        let mut after: Option<String> = None;

        loop {
            let chunk: Vec<(Vec<u8>, RegisteredEntry)> = self
                .storage
                .scan_page(CF_REGISTERED_ENTRIES, after.as_ref(), 256)
                .await?;
            let exhausted = chunk.len() < 256;

            for (_, entry) in chunk {
                after = Some(entry.entry_id.clone());
                if matches!(entry.expiry, Some(expiry) if expiry < expires_before) {
                    expired.push(entry);
                }
            }

            if exhausted {
                break;
            }
        }

        if expired.is_empty() {
            return Ok(0);
        }

        let mut sequence = self
            .load_event_sequence(EventKind::RegisteredEntry)
            .await?;
        let mut batch = self.storage.batch();
        for entry in &expired {
            self.stage_entry_removal(&mut batch, entry, &mut sequence)?;
        }
        batch.commit().await?;

        info!(pruned = expired.len(), "Expired registered entries pruned");
        Ok(expired.len())
    }

    async fn fetch_entry(&self, entry_id: &str) -> Result<RegisteredEntry> {
        self.storage
            .get(CF_REGISTERED_ENTRIES, &entry_id)
            .await?
            .ok_or_else(|| DataStoreError::NotFound(entry_id.to_string()))
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

    fn update_from(entry: &RegisteredEntry) -> RegisteredEntryUpdate {
        RegisteredEntryUpdate {
            entry_id: entry.entry_id.clone(),
            expected_revision: entry.revision_number,
            spiffe_id: entry.spiffe_id.clone(),
            parent_id: entry.parent_id.clone(),
            selectors: entry.selectors.clone(),
            dns_names: entry.dns_names.clone(),
            federates_with: entry.federates_with.clone(),
            x509_svid_ttl: entry.x509_svid_ttl,
            jwt_svid_ttl: entry.jwt_svid_ttl,
            expiry: entry.expiry,
            admin: entry.admin,
            downstream: entry.downstream,
            hint: entry.hint.clone(),
        }
    }

    #[tokio::test]
    async fn test_create_assigns_id_and_revision_zero() {
        let ds = service();
        let entry = ds
            .create_registered_entry(new_entry("spiffe://example.org/web"))
            .await
            .unwrap();

        assert!(!entry.entry_id.is_empty());
        assert_eq!(entry.revision_number, 0);

        let fetched = ds.get_registered_entry(&entry.entry_id).await.unwrap();
        assert_eq!(fetched, entry);
    }

    #[tokio::test]
    async fn test_caller_supplied_id_collision_is_already_exists() {
        let ds = service();

        let mut new = new_entry("spiffe://example.org/web");
        new.entry_id = Some("fixed-id".to_string());
        ds.create_registered_entry(new.clone()).await.unwrap();

        let err = ds.create_registered_entry(new).await.unwrap_err();
        assert!(matches!(err, DataStoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_validation_rejects_bad_input() {
        let ds = service();

        let mut no_selectors = new_entry("spiffe://example.org/web");
        no_selectors.selectors.clear();
        assert!(matches!(
            ds.create_registered_entry(no_selectors).await.unwrap_err(),
            DataStoreError::Invalid(_)
        ));

        let mut negative_ttl = new_entry("spiffe://example.org/web");
        negative_ttl.x509_svid_ttl = -1;
        assert!(matches!(
            ds.create_registered_entry(negative_ttl).await.unwrap_err(),
            DataStoreError::Invalid(_)
        ));

        let mut bad_dns = new_entry("spiffe://example.org/web");
        bad_dns.dns_names = vec!["-bad.example.org".to_string()];
        assert!(matches!(
            ds.create_registered_entry(bad_dns).await.unwrap_err(),
            DataStoreError::Invalid(_)
        ));
    }

    #[tokio::test]
    async fn test_update_increments_revision_by_one() {
        let ds = service();
        let entry = ds
            .create_registered_entry(new_entry("spiffe://example.org/web"))
            .await
            .unwrap();

        let mut update = update_from(&entry);
        update.hint = "primary".to_string();
        let updated = ds.update_registered_entry(update).await.unwrap();

        assert_eq!(updated.revision_number, entry.revision_number + 1);
        assert_eq!(updated.hint, "primary");
    }

    #[tokio::test]
    async fn test_stale_revision_is_conflict_and_leaves_entry_unchanged() {
        let ds = service();
        let entry = ds
            .create_registered_entry(new_entry("spiffe://example.org/web"))
            .await
            .unwrap();

        let mut first = update_from(&entry);
        first.hint = "primary".to_string();
        ds.update_registered_entry(first).await.unwrap();

        // Second writer still holds revision 0
        let mut stale = update_from(&entry);
        stale.hint = "secondary".to_string();
        let err = ds.update_registered_entry(stale).await.unwrap_err();
        assert!(matches!(err, DataStoreError::Conflict { .. }));

        let stored = ds.get_registered_entry(&entry.entry_id).await.unwrap();
        assert_eq!(stored.hint, "primary");
        assert_eq!(stored.revision_number, 1);
    }

    #[tokio::test]
    async fn test_update_replaces_child_sets_wholesale() {
        let ds = service();
        let mut new = new_entry("spiffe://example.org/web");
        new.dns_names = vec!["web.example.org".to_string()];
        let entry = ds.create_registered_entry(new).await.unwrap();

        let mut update = update_from(&entry);
        update.selectors = vec![Selector::new("k8s", "ns:prod")];
        update.dns_names = vec!["api.example.org".to_string()];
        ds.update_registered_entry(update).await.unwrap();

        let stored = ds.get_registered_entry(&entry.entry_id).await.unwrap();
        assert_eq!(stored.selectors, vec![Selector::new("k8s", "ns:prod")]);
        assert_eq!(stored.dns_names, vec!["api.example.org".to_string()]);

        // Old child rows are gone from the child column families
        let selectors: Vec<(Vec<u8>, ())> = ds
            .storage()
            .get_by_prefix(CF_ENTRY_SELECTORS, &entry.entry_id)
            .await
            .unwrap();
        assert_eq!(selectors.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_cascades_selectors_and_dns_names() {
        let ds = service();
        let mut new = new_entry("spiffe://example.org/web");
        new.dns_names = vec!["web.example.org".to_string()];
        let entry = ds.create_registered_entry(new).await.unwrap();

        ds.delete_registered_entry(&entry.entry_id).await.unwrap();

        assert!(matches!(
            ds.get_registered_entry(&entry.entry_id).await.unwrap_err(),
            DataStoreError::NotFound(_)
        ));

        let selectors: Vec<(Vec<u8>, ())> = ds
            .storage()
            .get_by_prefix(CF_ENTRY_SELECTORS, &entry.entry_id)
            .await
            .unwrap();
        assert!(selectors.is_empty());

        let dns: Vec<(Vec<u8>, ())> = ds
            .storage()
            .get_by_prefix(CF_DNS_NAMES, &entry.entry_id)
            .await
            .unwrap();
        assert!(dns.is_empty());
    }

    #[tokio::test]
    async fn test_federation_target_must_exist() {
        let ds = service();

        let mut new = new_entry("spiffe://example.org/web");
        new.federates_with = vec!["partner.org".to_string()];
        let err = ds.create_registered_entry(new.clone()).await.unwrap_err();
        assert!(matches!(err, DataStoreError::NotFound(_)));

        // Nothing was created: no orphan entry, no orphan selectors
        let entries = ds
            .list_registered_entries(EntryFilter::default(), Pagination::first(10))
            .await
            .unwrap();
        assert!(entries.items.is_empty());

        ds.create_bundle("partner.org".to_string(), vec![1])
            .await
            .unwrap();
        ds.create_registered_entry(new).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_filters() {
        let ds = service();

        let mut a = new_entry("spiffe://example.org/web");
        a.hint = "internal".to_string();
        ds.create_registered_entry(a).await.unwrap();

        let mut b = new_entry("spiffe://example.org/db");
        b.parent_id = "spiffe://example.org/agent/b".to_string();
        b.selectors = vec![Selector::new("k8s", "ns:prod")];
        ds.create_registered_entry(b).await.unwrap();

        let by_parent = ds
            .list_registered_entries(
                EntryFilter {
                    by_parent_id: Some("spiffe://example.org/agent/b".to_string()),
                    ..Default::default()
                },
                Pagination::first(10),
            )
            .await
            .unwrap();
        assert_eq!(by_parent.items.len(), 1);
        assert_eq!(by_parent.items[0].spiffe_id, "spiffe://example.org/db");

        let by_hint = ds
            .list_registered_entries(
                EntryFilter {
                    by_hint: Some("internal".to_string()),
                    ..Default::default()
                },
                Pagination::first(10),
            )
            .await
            .unwrap();
        assert_eq!(by_hint.items.len(), 1);
        assert_eq!(by_hint.items[0].spiffe_id, "spiffe://example.org/web");

        let by_prefix = ds
            .list_registered_entries(
                EntryFilter {
                    by_spiffe_id_prefix: Some("spiffe://example.org/".to_string()),
                    ..Default::default()
                },
                Pagination::first(10),
            )
            .await
            .unwrap();
        assert_eq!(by_prefix.items.len(), 2);
    }

    #[tokio::test]
    async fn test_list_selector_match_semantics() {
        let ds = service();

        let mut one = new_entry("spiffe://example.org/one");
        one.selectors = vec![Selector::new("unix", "uid:1000")];
        ds.create_registered_entry(one).await.unwrap();

        let mut two = new_entry("spiffe://example.org/two");
        two.selectors = vec![
            Selector::new("unix", "uid:1000"),
            Selector::new("k8s", "ns:prod"),
        ];
        ds.create_registered_entry(two).await.unwrap();

        // MatchAll: every entry selector must appear in the given set
        let workload_selectors = vec![Selector::new("unix", "uid:1000")];
        let all = ds
            .list_registered_entries(
                EntryFilter {
                    by_selectors: Some(SelectorMatch {
                        behavior: MatchBehavior::MatchAll,
                        selectors: workload_selectors.clone(),
                    }),
                    ..Default::default()
                },
                Pagination::first(10),
            )
            .await
            .unwrap();
        assert_eq!(all.items.len(), 1);
        assert_eq!(all.items[0].spiffe_id, "spiffe://example.org/one");

        // MatchAny: one shared selector suffices
        let any = ds
            .list_registered_entries(
                EntryFilter {
                    by_selectors: Some(SelectorMatch {
                        behavior: MatchBehavior::MatchAny,
                        selectors: workload_selectors,
                    }),
                    ..Default::default()
                },
                Pagination::first(10),
            )
            .await
            .unwrap();
        assert_eq!(any.items.len(), 2);
    }

    #[tokio::test]
    async fn test_prune_appends_one_removal_event_per_entry() {
        let ds = service();

        for name in ["a", "b", "c"] {
            let mut new = new_entry(&format!("spiffe://example.org/{name}"));
            new.entry_id = Some(name.to_string());
            new.expiry = Some(1_000);
            ds.create_registered_entry(new).await.unwrap();
        }

        let pruned = ds.prune_registered_entries(2_000).await.unwrap();
        assert_eq!(pruned, 3);

        // Three creations plus three removals, ids strictly increasing
        let events = ds.list_entry_events_since(0, 100).await.unwrap();
        assert_eq!(events.len(), 6);
        for pair in events.windows(2) {
            assert!(pair[0].event_id < pair[1].event_id);
        }
        let removed: Vec<_> = events[3..].iter().map(|e| e.entry_id.as_str()).collect();
        assert_eq!(removed, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_prune_deletes_only_expired_entries() {
        let ds = service();

        let mut expired = new_entry("spiffe://example.org/old");
        expired.expiry = Some(1_000);
        let expired = ds.create_registered_entry(expired).await.unwrap();

        let mut live = new_entry("spiffe://example.org/live");
        live.expiry = Some(3_000);
        let live = ds.create_registered_entry(live).await.unwrap();

        let unexpiring = ds
            .create_registered_entry(new_entry("spiffe://example.org/forever"))
            .await
            .unwrap();

        let pruned = ds.prune_registered_entries(2_000).await.unwrap();
        assert_eq!(pruned, 1);

        assert!(ds.get_registered_entry(&expired.entry_id).await.is_err());
        assert!(ds.get_registered_entry(&live.entry_id).await.is_ok());
        assert!(ds.get_registered_entry(&unexpiring.entry_id).await.is_ok());
    }
}
