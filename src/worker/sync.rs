//! Background sync extension point

use async_trait::async_trait;
use tracing::info;

/// Work performed when the reserved sync tag fires
#[async_trait]
pub trait SyncHandler: Send + Sync {
    async fn sync(&self, tag: &str) -> Result<(), String>;
}

/// Nutrition data sync that does nothing yet
///
/// Server synchronization will plug in here; for now the task only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderSync;

#[async_trait]
impl SyncHandler for PlaceholderSync {
    async fn sync(&self, tag: &str) -> Result<(), String> {
        info!(tag, "synchronizing nutrition data");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_placeholder_sync_succeeds() {
        assert!(PlaceholderSync.sync("sync-nutrition-data").await.is_ok());
    }
}
