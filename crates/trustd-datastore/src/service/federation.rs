//! Federated trust domain operations.
//!
//! These rows describe remote trust domains whose bundles are fetched over a
//! bundle endpoint; they are administrative configuration and independent of
//! the bundle rows themselves.

use crate::{errors::*, types::*};
use tracing::info;
use trustd_storage::{Storage, CF_FEDERATED_TRUST_DOMAINS};
use url::Url;
use uuid::Uuid;

use super::bundle::validate_trust_domain;
use super::DataStoreService;

fn validate_relationship(new: &NewFederatedTrustDomain) -> Result<()> {
    validate_trust_domain(&new.trust_domain)?;

    let endpoint = Url::parse(&new.bundle_endpoint_url).map_err(|e| {
        DataStoreError::Invalid(format!(
            "malformed bundle endpoint URL {:?}: {e}",
            new.bundle_endpoint_url
        ))
    })?;
    if endpoint.scheme() != "https" {
        return Err(DataStoreError::Invalid(format!(
            "bundle endpoint URL must use https: {:?}",
            new.bundle_endpoint_url
        )));
    }

    if let BundleEndpointProfile::HttpsSpiffe { endpoint_spiffe_id } = &new.bundle_endpoint_profile
    {
        if endpoint_spiffe_id.is_empty() {
            return Err(DataStoreError::Invalid(
                "https_spiffe profile requires an endpoint identity".to_string(),
            ));
        }
    }

    Ok(())
}

impl<S: Storage> DataStoreService<S> {
    pub(crate) async fn create_federated_trust_domain_internal(
        &self,
        new: NewFederatedTrustDomain,
    ) -> Result<FederatedTrustDomain> {
        validate_relationship(&new)?;

        let _guard = self.write_lock.lock().await;

        if self
            .storage
            .exists(CF_FEDERATED_TRUST_DOMAINS, &new.trust_domain)
            .await?
        {
            return Err(DataStoreError::AlreadyExists(new.trust_domain));
        }

        let now = current_timestamp();
        let relationship = FederatedTrustDomain {
            id: Uuid::new_v4(),
            trust_domain: new.trust_domain,
            bundle_endpoint_url: new.bundle_endpoint_url,
            bundle_endpoint_profile: new.bundle_endpoint_profile,
            implicit: new.implicit,
            created_at: now,
            updated_at: now,
        };

        self.storage
            .put(
                CF_FEDERATED_TRUST_DOMAINS,
                &relationship.trust_domain,
                &relationship,
            )
            .await?;

        info!(trust_domain = %relationship.trust_domain, "Federated trust domain created");
        Ok(relationship)
    }

    pub(crate) async fn update_federated_trust_domain_internal(
        &self,
        new: NewFederatedTrustDomain,
    ) -> Result<FederatedTrustDomain> {
        validate_relationship(&new)?;

        let _guard = self.write_lock.lock().await;

        let stored = self.fetch_relationship(&new.trust_domain).await?;

        let relationship = FederatedTrustDomain {
            id: stored.id,
            trust_domain: stored.trust_domain,
            bundle_endpoint_url: new.bundle_endpoint_url,
            bundle_endpoint_profile: new.bundle_endpoint_profile,
            implicit: new.implicit,
            created_at: stored.created_at,
            updated_at: current_timestamp(),
        };

        self.storage
            .put(
                CF_FEDERATED_TRUST_DOMAINS,
                &relationship.trust_domain,
                &relationship,
            )
            .await?;

        info!(trust_domain = %relationship.trust_domain, "Federated trust domain updated");
        Ok(relationship)
    }

    pub(crate) async fn get_federated_trust_domain_internal(
        &self,
        trust_domain: &str,
    ) -> Result<FederatedTrustDomain> {
        self.fetch_relationship(trust_domain).await
    }

    pub(crate) async fn delete_federated_trust_domain_internal(
        &self,
        trust_domain: &str,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        if !self
            .storage
            .exists(CF_FEDERATED_TRUST_DOMAINS, &trust_domain)
            .await?
        {
            return Err(DataStoreError::NotFound(trust_domain.to_string()));
        }

        self.storage
            .delete(CF_FEDERATED_TRUST_DOMAINS, &trust_domain)
            .await?;

        info!(trust_domain = %trust_domain, "Federated trust domain deleted");
        Ok(())
    }

    pub(crate) async fn list_federated_trust_domains_internal(
        &self,
        pagination: Pagination,
    ) -> Result<Page<FederatedTrustDomain>> {
        self.list_page(
            CF_FEDERATED_TRUST_DOMAINS,
            pagination,
            |r: &FederatedTrustDomain| &r.trust_domain,
            |_| true,
        )
        .await
    }

    async fn fetch_relationship(&self, trust_domain: &str) -> Result<FederatedTrustDomain> {
        self.storage
            .get(CF_FEDERATED_TRUST_DOMAINS, &trust_domain)
            .await?
            .ok_or_else(|| DataStoreError::NotFound(trust_domain.to_string()))
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

    fn new_relationship(trust_domain: &str) -> NewFederatedTrustDomain {
        NewFederatedTrustDomain {
            trust_domain: trust_domain.to_string(),
            bundle_endpoint_url: format!("https://{trust_domain}/bundle"),
            bundle_endpoint_profile: BundleEndpointProfile::HttpsWeb,
            implicit: false,
        }
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let ds = service();
        let created = ds
            .create_federated_trust_domain(new_relationship("partner.org"))
            .await
            .unwrap();

        let fetched = ds.get_federated_trust_domain("partner.org").await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn test_duplicate_create_is_already_exists() {
        let ds = service();
        ds.create_federated_trust_domain(new_relationship("partner.org"))
            .await
            .unwrap();
        let err = ds
            .create_federated_trust_domain(new_relationship("partner.org"))
            .await
            .unwrap_err();
        assert!(matches!(err, DataStoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_non_https_endpoint_is_invalid() {
        let ds = service();

        let mut plain = new_relationship("partner.org");
        plain.bundle_endpoint_url = "http://partner.org/bundle".to_string();
        assert!(matches!(
            ds.create_federated_trust_domain(plain).await.unwrap_err(),
            DataStoreError::Invalid(_)
        ));

        let mut garbled = new_relationship("partner.org");
        garbled.bundle_endpoint_url = "not a url".to_string();
        assert!(matches!(
            ds.create_federated_trust_domain(garbled).await.unwrap_err(),
            DataStoreError::Invalid(_)
        ));
    }

    #[tokio::test]
    async fn test_spiffe_profile_requires_endpoint_identity() {
        let ds = service();

        let mut rel = new_relationship("partner.org");
        rel.bundle_endpoint_profile = BundleEndpointProfile::HttpsSpiffe {
            endpoint_spiffe_id: String::new(),
        };
        assert!(matches!(
            ds.create_federated_trust_domain(rel).await.unwrap_err(),
            DataStoreError::Invalid(_)
        ));

        let mut rel = new_relationship("partner.org");
        rel.bundle_endpoint_profile = BundleEndpointProfile::HttpsSpiffe {
            endpoint_spiffe_id: "spiffe://partner.org/bundle-endpoint".to_string(),
        };
        ds.create_federated_trust_domain(rel).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_preserves_identity_and_creation_time() {
        let ds = service();
        let created = ds
            .create_federated_trust_domain(new_relationship("partner.org"))
            .await
            .unwrap();

        let mut update = new_relationship("partner.org");
        update.implicit = true;
        let updated = ds.update_federated_trust_domain(update).await.unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.implicit);
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let ds = service();
        let err = ds
            .update_federated_trust_domain(new_relationship("missing.org"))
            .await
            .unwrap_err();
        assert!(matches!(err, DataStoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_then_get_is_not_found() {
        let ds = service();
        ds.create_federated_trust_domain(new_relationship("partner.org"))
            .await
            .unwrap();
        ds.delete_federated_trust_domain("partner.org")
            .await
            .unwrap();

        assert!(matches!(
            ds.get_federated_trust_domain("partner.org")
                .await
                .unwrap_err(),
            DataStoreError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_list_in_trust_domain_order() {
        let ds = service();
        for td in ["c.org", "a.org", "b.org"] {
            ds.create_federated_trust_domain(new_relationship(td))
                .await
                .unwrap();
        }

        let page = ds
            .list_federated_trust_domains(Pagination::first(10))
            .await
            .unwrap();
        assert_eq!(
            page.items
                .iter()
                .map(|r| r.trust_domain.as_str())
                .collect::<Vec<_>>(),
            vec!["a.org", "b.org", "c.org"]
        );
    }
}
