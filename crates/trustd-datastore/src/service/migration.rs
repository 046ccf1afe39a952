//! Schema version tracking.
//!
//! The store refuses to operate against data written by an incompatible
//! schema; migration itself runs out of band.

use crate::{errors::*, types::*};
use tracing::info;
use trustd_storage::{Storage, CF_MIGRATIONS};

use super::DataStoreService;

const VERSION_KEY: &str = "version";

impl<S: Storage> DataStoreService<S> {
    pub(crate) async fn get_schema_version_internal(&self) -> Result<Option<SchemaVersion>> {
        Ok(self.storage.get(CF_MIGRATIONS, &VERSION_KEY).await?)
    }

    pub(crate) async fn set_schema_version_internal(
        &self,
        version: u32,
        code_version: String,
    ) -> Result<SchemaVersion> {
        let _guard = self.write_lock.lock().await;

        let record = SchemaVersion {
            version,
            code_version,
            updated_at: current_timestamp(),
        };
        self.storage
            .put(CF_MIGRATIONS, &VERSION_KEY, &record)
            .await?;

        info!(version, "Schema version recorded");
        Ok(record)
    }

    /// Refuse startup against a missing or mismatched schema version
    pub(crate) async fn assert_schema_version_internal(&self, expected: u32) -> Result<()> {
        match self.get_schema_version_internal().await? {
            None => Err(DataStoreError::Fatal(
                "no schema version recorded; store was never initialized".to_string(),
            )),
            Some(recorded) if recorded.version != expected => Err(DataStoreError::Fatal(format!(
                "schema version mismatch: store has {}, code expects {expected}",
                recorded.version
            ))),
            Some(_) => Ok(()),
        }
    }
}
