use std::sync::Arc;
use tokio::sync::RwLock;

use super::sdk::{HostSdk, HostSdkError};

/// Caches the host board id for the lifetime of its owner.
///
/// The cache is explicit state held by the adapter, so each adapter asks the
/// host at most once.
pub struct BoardContextCache {
    sdk: Arc<dyn HostSdk>,
    board_id: RwLock<Option<Option<String>>>,
}

impl BoardContextCache {
    pub fn new(sdk: Arc<dyn HostSdk>) -> Self {
        Self {
            sdk,
            board_id: RwLock::new(None),
        }
    }

    pub async fn board_id(&self) -> Result<Option<String>, HostSdkError> {
        if let Some(cached) = self.board_id.read().await.as_ref() {
            return Ok(cached.clone());
        }

        let mut slot = self.board_id.write().await;
        if let Some(cached) = slot.as_ref() {
            return Ok(cached.clone());
        }

        let board_id = self.sdk.context().await?.board_id;
        tracing::debug!(board_id = ?board_id, "Cached host board context");
        *slot = Some(board_id.clone());
        Ok(board_id)
    }

}
