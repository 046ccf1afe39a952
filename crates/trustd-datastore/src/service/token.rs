//! Join token operations.
//!
//! Tokens bootstrap a node's first attestation and are strictly single-use:
//! consume deletes the row in the same guarded section that read it.

use crate::{errors::*, types::*};
use tracing::info;
use trustd_storage::{traits::BatchExt, Storage, CF_JOIN_TOKENS};

use super::DataStoreService;

impl<S: Storage> DataStoreService<S> {
    pub(crate) async fn create_join_token_internal(
        &self,
        token: String,
        expiry: u64,
    ) -> Result<JoinToken> {
        if token.is_empty() {
            return Err(DataStoreError::Invalid(
                "join token must not be empty".to_string(),
            ));
        }

        let _guard = self.write_lock.lock().await;

        if self.storage.exists(CF_JOIN_TOKENS, &token).await? {
            return Err(DataStoreError::AlreadyExists(token));
        }

        let record = JoinToken {
            token: token.clone(),
            expiry,
            created_at: current_timestamp(),
        };
        self.storage.put(CF_JOIN_TOKENS, &token, &record).await?;

        info!("Join token created");
        Ok(record)
    }

    pub(crate) async fn fetch_join_token_internal(&self, token: &str) -> Result<Option<JoinToken>> {
        Ok(self.storage.get(CF_JOIN_TOKENS, &token).await?)
    }

    /// Consume a token exactly once
    ///
    /// Read and delete happen under the writer lock, so of two racing
    /// consumers exactly one receives the token and the other `NotFound`.
    pub(crate) async fn consume_join_token_internal(&self, token: &str) -> Result<JoinToken> {
        let _guard = self.write_lock.lock().await;

        let record: JoinToken = self
            .storage
            .get(CF_JOIN_TOKENS, &token)
            .await?
            .ok_or_else(|| DataStoreError::NotFound("join token".to_string()))?;

        self.storage.delete(CF_JOIN_TOKENS, &token).await?;

        info!("Join token consumed");
        Ok(record)
    }

    pub(crate) async fn prune_join_tokens_internal(&self, expires_before: u64) -> Result<usize> {
        let _guard = self.write_lock.lock().await;

        let mut expired = Vec::new();
        let mut after: Option<String> = None;

        loop {
            let chunk: Vec<(Vec<u8>, JoinToken)> = self
                .storage
                .scan_page(CF_JOIN_TOKENS, after.as_ref(), 256)
                .await?;
            let exhausted = chunk.len() < 256;

            for (_, record) in chunk {
                after = Some(record.token.clone());
                if record.expiry < expires_before {
                    expired.push(record.token);
                }
            }

            if exhausted {
                break;
            }
        }

        if expired.is_empty() {
            return Ok(0);
        }

        let mut batch = self.storage.batch();
        for token in &expired {
            batch.delete(CF_JOIN_TOKENS, token)?;
        }
        batch.commit().await?;

        info!(pruned = expired.len(), "Expired join tokens pruned");
        Ok(expired.len())
    }
}
