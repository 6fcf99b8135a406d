//! Write-back to the parent order once a work item is done.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use papermill_shared::{OrderStatus, Result};
use papermill_storage::Storage;

/// The order aggregate as seen from the pipeline.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Deliver the finished text to one order item.
    async fn complete_item(&self, order_item_id: &str, content: &str) -> Result<()>;

    /// Whether every item of the order has been delivered.
    async fn order_finished(&self, order_id: &str) -> Result<bool>;

    /// Flip the order to completed. Returns `true` only the first time, so
    /// the caller notifies at most once.
    async fn mark_order_completed(&self, order_id: &str) -> Result<bool>;
}

/// Sends the completion notice for an order.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn order_completed(&self, order_id: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Built-in implementations
// ---------------------------------------------------------------------------

/// [`OrderGateway`] over the `orders` and `order_items` tables.
pub struct StorageOrderGateway {
    storage: Arc<Storage>,
}

impl StorageOrderGateway {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl OrderGateway for StorageOrderGateway {
    async fn complete_item(&self, order_item_id: &str, content: &str) -> Result<()> {
        self.storage
            .update_order_item(order_item_id, OrderStatus::Completed, Some(content))
            .await
    }

    async fn order_finished(&self, order_id: &str) -> Result<bool> {
        let items = self.storage.list_order_items(order_id).await?;
        Ok(!items.is_empty() && items.iter().all(|i| i.status == OrderStatus::Completed))
    }

    async fn mark_order_completed(&self, order_id: &str) -> Result<bool> {
        self.storage
            .update_order_status(order_id, OrderStatus::Completed)
            .await?;
        self.storage.mark_order_notified(order_id).await
    }
}

/// [`Notifier`] that only emits a structured log event.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn order_completed(&self, order_id: &str) -> Result<()> {
        info!(order_id, event = "order_completed", "order completed, customer notified");
        Ok(())
    }
}
