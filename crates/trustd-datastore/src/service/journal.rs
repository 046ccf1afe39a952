//! CA journal operations.
//!
//! Each journal row tracks one server's signing-authority state across
//! rotations. The data blob is opaque; only the active authority ids are
//! lifted into indexed fields so a server restarting after a rotation can
//! find its journal by the authority it last signed with.

use crate::{errors::*, types::*};
use tracing::info;
use trustd_storage::{
    traits::BatchExt, Storage, CF_CA_JOURNALS, CF_CA_JOURNALS_BY_X509_AUTHORITY,
};
use uuid::Uuid;

use super::DataStoreService;

fn validate_journal(data: &[u8], x509_authority_id: &str, jwt_authority_id: &str) -> Result<()> {
    if data.len() > MAX_BLOB_SIZE {
        return Err(DataStoreError::Invalid(format!(
            "journal payload exceeds {MAX_BLOB_SIZE} bytes"
        )));
    }
    if x509_authority_id.is_empty() || jwt_authority_id.is_empty() {
        return Err(DataStoreError::Invalid(
            "active authority ids must not be empty".to_string(),
        ));
    }
    Ok(())
}

impl<S: Storage> DataStoreService<S> {
    /// Create a journal row, or replace one when an id is given
    ///
    /// The X.509 authority index row moves with the journal: a replace whose
    /// active X.509 id changed drops the old index row in the same batch.
    pub(crate) async fn set_ca_journal_internal(&self, journal: NewCaJournal) -> Result<CaJournal> {
        validate_journal(
            &journal.data,
            &journal.active_x509_authority_id,
            &journal.active_jwt_authority_id,
        )?;

        let _guard = self.write_lock.lock().await;

        let now = current_timestamp();
        let (id, created_at, previous_x509_id) = match journal.id {
            Some(id) => {
                let stored = self.fetch_journal(id).await?;
                (id, stored.created_at, Some(stored.active_x509_authority_id))
            }
            None => (Uuid::new_v4(), now, None),
        };

        let record = CaJournal {
            id,
            data: journal.data,
            active_x509_authority_id: journal.active_x509_authority_id,
            active_jwt_authority_id: journal.active_jwt_authority_id,
            created_at,
            updated_at: now,
        };

        let mut batch = self.storage.batch();
        if let Some(previous) = previous_x509_id {
            if previous != record.active_x509_authority_id {
                batch.delete(CF_CA_JOURNALS_BY_X509_AUTHORITY, &previous)?;
            }
        }
        batch.put(CF_CA_JOURNALS, &record.id, &record)?;
        batch.put(
            CF_CA_JOURNALS_BY_X509_AUTHORITY,
            &record.active_x509_authority_id,
            &record.id,
        )?;
        batch.commit().await?;

        info!(journal_id = %record.id, "CA journal set");
        Ok(record)
    }

    pub(crate) async fn get_ca_journal_internal(&self, journal_id: Uuid) -> Result<CaJournal> {
        self.fetch_journal(journal_id).await
    }

    pub(crate) async fn fetch_ca_journal_by_x509_authority_internal(
        &self,
        authority_id: &str,
    ) -> Result<Option<CaJournal>> {
        let journal_id: Option<Uuid> = self
            .storage
            .get(CF_CA_JOURNALS_BY_X509_AUTHORITY, &authority_id)
            .await?;
        match journal_id {
            Some(id) => Ok(self.storage.get(CF_CA_JOURNALS, &id).await?),
            None => Ok(None),
        }
    }

    /// Promote prepared authorities to active on an existing journal
    ///
    /// Only the indexed ids change; the data blob keeps describing the full
    /// authority history and is untouched here.
    pub(crate) async fn set_active_authorities_internal(
        &self,
        journal_id: Uuid,
        x509_authority_id: String,
        jwt_authority_id: String,
    ) -> Result<CaJournal> {
        if x509_authority_id.is_empty() || jwt_authority_id.is_empty() {
            return Err(DataStoreError::Invalid(
                "active authority ids must not be empty".to_string(),
            ));
        }

        let _guard = self.write_lock.lock().await;

        let mut record = self.fetch_journal(journal_id).await?;
        let previous_x509_id = record.active_x509_authority_id.clone();

        record.active_x509_authority_id = x509_authority_id;
        record.active_jwt_authority_id = jwt_authority_id;
        record.updated_at = current_timestamp();

        let mut batch = self.storage.batch();
        if previous_x509_id != record.active_x509_authority_id {
            batch.delete(CF_CA_JOURNALS_BY_X509_AUTHORITY, &previous_x509_id)?;
        }
        batch.put(CF_CA_JOURNALS, &record.id, &record)?;
        batch.put(
            CF_CA_JOURNALS_BY_X509_AUTHORITY,
            &record.active_x509_authority_id,
            &record.id,
        )?;
        batch.commit().await?;

        info!(
            journal_id = %record.id,
            x509_authority = %record.active_x509_authority_id,
            "Active authorities promoted"
        );
        Ok(record)
    }

    async fn fetch_journal(&self, journal_id: Uuid) -> Result<CaJournal> {
        self.storage
            .get(CF_CA_JOURNALS, &journal_id)
            .await?
            .ok_or_else(|| DataStoreError::NotFound(format!("CA journal {journal_id}")))
    }
}
