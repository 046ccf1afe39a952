//! Trust bundle operations.

use crate::{errors::*, types::*};
use tracing::info;
use trustd_storage::{
    traits::BatchExt, Storage, CF_BUNDLES, CF_FEDERATED_ENTRIES, CF_REGISTERED_ENTRIES,
};
use uuid::Uuid;

use super::DataStoreService;

pub(crate) fn validate_trust_domain(trust_domain: &str) -> Result<()> {
    if trust_domain.is_empty() {
        return Err(DataStoreError::Invalid(
            "trust domain must not be empty".to_string(),
        ));
    }
    if trust_domain.chars().any(|c| c.is_whitespace()) {
        return Err(DataStoreError::Invalid(format!(
            "trust domain must not contain whitespace: {trust_domain:?}"
        )));
    }
    Ok(())
}

fn validate_bundle_data(data: &[u8]) -> Result<()> {
    if data.len() > MAX_BLOB_SIZE {
        return Err(DataStoreError::Invalid(format!(
            "bundle payload exceeds {MAX_BLOB_SIZE} bytes"
        )));
    }
    Ok(())
}

impl<S: Storage> DataStoreService<S> {
    pub(crate) async fn create_bundle_internal(
        &self,
        trust_domain: String,
        data: Vec<u8>,
    ) -> Result<Bundle> {
        validate_trust_domain(&trust_domain)?;
        validate_bundle_data(&data)?;

        let _guard = self.write_lock.lock().await;

        if self.storage.exists(CF_BUNDLES, &trust_domain).await? {
            return Err(DataStoreError::AlreadyExists(trust_domain));
        }

        let now = current_timestamp();
        let bundle = Bundle {
            id: Uuid::new_v4(),
            trust_domain: trust_domain.clone(),
            data,
            created_at: now,
            updated_at: now,
        };

        self.storage.put(CF_BUNDLES, &trust_domain, &bundle).await?;

        info!(trust_domain = %trust_domain, "Bundle created");
        Ok(bundle)
    }

    pub(crate) async fn update_bundle_internal(
        &self,
        trust_domain: &str,
        data: Vec<u8>,
    ) -> Result<Bundle> {
        validate_bundle_data(&data)?;

        let _guard = self.write_lock.lock().await;

        let mut bundle = self.fetch_bundle(trust_domain).await?;
        bundle.data = data;
        bundle.updated_at = current_timestamp();

        self.storage
            .put(CF_BUNDLES, &bundle.trust_domain, &bundle)
            .await?;

        info!(trust_domain = %trust_domain, "Bundle updated");
        Ok(bundle)
    }

    pub(crate) async fn set_bundle_internal(
        &self,
        trust_domain: String,
        data: Vec<u8>,
    ) -> Result<Bundle> {
        validate_trust_domain(&trust_domain)?;
        validate_bundle_data(&data)?;

        let _guard = self.write_lock.lock().await;

        let now = current_timestamp();
        let existing: Option<Bundle> = self.storage.get(CF_BUNDLES, &trust_domain).await?;

        let bundle = match existing {
            Some(mut bundle) => {
                bundle.data = data;
                bundle.updated_at = now;
                bundle
            }
            None => Bundle {
                id: Uuid::new_v4(),
                trust_domain: trust_domain.clone(),
                data,
                created_at: now,
                updated_at: now,
            },
        };

        self.storage.put(CF_BUNDLES, &trust_domain, &bundle).await?;

        info!(trust_domain = %trust_domain, "Bundle set");
        Ok(bundle)
    }

    pub(crate) async fn get_bundle_internal(&self, trust_domain: &str) -> Result<Bundle> {
        self.fetch_bundle(trust_domain).await
    }

    /// Delete a bundle and its federation association rows
    ///
    /// Referencing entries lose this trust domain from their federation
    /// lists but are otherwise untouched; their revision numbers do not
    /// change because the entries themselves were not updated by a caller.
    pub(crate) async fn delete_bundle_internal(&self, trust_domain: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        if !self.storage.exists(CF_BUNDLES, &trust_domain).await? {
            return Err(DataStoreError::NotFound(trust_domain.to_string()));
        }

        let mut batch = self.storage.batch();
        batch.delete(CF_BUNDLES, &trust_domain)?;

        // Association rows are keyed (trust_domain, entry_id) and carry the
        // entry id as their value.
        let associations: Vec<(Vec<u8>, String)> = self
            .stage_delete_prefix(&mut batch, CF_FEDERATED_ENTRIES, &trust_domain.to_string())
            .await?;

        for (_, entry_id) in &associations {
            let entry: Option<RegisteredEntry> =
                self.storage.get(CF_REGISTERED_ENTRIES, entry_id).await?;
            if let Some(mut entry) = entry {
                entry.federates_with.retain(|td| td != trust_domain);
                entry.updated_at = current_timestamp();
                batch.put(CF_REGISTERED_ENTRIES, entry_id, &entry)?;
            }
        }

        batch.commit().await?;

        info!(
            trust_domain = %trust_domain,
            associations = associations.len(),
            "Bundle deleted"
        );
        Ok(())
    }

    pub(crate) async fn list_bundles_internal(
        &self,
        pagination: Pagination,
    ) -> Result<Page<Bundle>> {
        self.list_page(
            CF_BUNDLES,
            pagination,
            |bundle: &Bundle| &bundle.trust_domain,
            |_| true,
        )
        .await
    }

    pub(crate) async fn fetch_bundle(&self, trust_domain: &str) -> Result<Bundle> {
        self.storage
            .get(CF_BUNDLES, &trust_domain)
            .await?
            .ok_or_else(|| DataStoreError::NotFound(trust_domain.to_string()))
    }
}
