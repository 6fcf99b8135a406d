//! Minimal mirror of the external order aggregate.

use chrono::Utc;
use libsql::{Row, params};
use papermill_shared::{Order, OrderItem, OrderStatus, PapermillError, Result, new_id};

use crate::Storage;
use crate::rows;

impl Storage {
    // -----------------------------------------------------------------------
    // Orders
    // -----------------------------------------------------------------------

    pub async fn create_order(&self, customer_ref: Option<&str>) -> Result<Order> {
        let now = Utc::now();
        let order = Order {
            id: new_id(),
            customer_ref: customer_ref.map(str::to_string),
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
            notified_at: None,
        };
        self.write(
            "INSERT INTO orders (id, customer_ref, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![
                order.id.as_str(),
                customer_ref,
                order.status.as_str(),
                now.to_rfc3339(),
            ],
        )
        .await?;
        Ok(order)
    }

    pub async fn get_order(&self, id: &str) -> Result<Option<Order>> {
        self.query_one(
            "SELECT id, customer_ref, status, created_at, updated_at, notified_at
             FROM orders WHERE id = ?1",
            params![id],
            row_to_order,
        )
        .await
    }

    pub async fn update_order_status(&self, id: &str, status: OrderStatus) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let changed = self
            .write(
                "UPDATE orders SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), now.as_str(), id],
            )
            .await?;
        if changed == 0 {
            return Err(PapermillError::NotFound(format!("order {id}")));
        }
        Ok(())
    }

    /// Record that the completion notification went out.
    ///
    /// Returns `false` if the order had already been notified, so callers
    /// notify at most once.
    pub async fn mark_order_notified(&self, id: &str) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let changed = self
            .write(
                "UPDATE orders SET notified_at = ?1 WHERE id = ?2 AND notified_at IS NULL",
                params![now.as_str(), id],
            )
            .await?;
        Ok(changed == 1)
    }

    // -----------------------------------------------------------------------
    // Order items
    // -----------------------------------------------------------------------

    pub async fn create_order_item(&self, order_id: &str) -> Result<OrderItem> {
        let now = Utc::now();
        let item = OrderItem {
            id: new_id(),
            order_id: order_id.to_string(),
            status: OrderStatus::Pending,
            content: None,
            updated_at: now,
        };
        self.write(
            "INSERT INTO order_items (id, order_id, status, updated_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                item.id.as_str(),
                order_id,
                item.status.as_str(),
                now.to_rfc3339()
            ],
        )
        .await?;
        Ok(item)
    }

    pub async fn get_order_item(&self, id: &str) -> Result<Option<OrderItem>> {
        self.query_one(
            "SELECT id, order_id, status, content, updated_at FROM order_items WHERE id = ?1",
            params![id],
            row_to_order_item,
        )
        .await
    }

    pub async fn list_order_items(&self, order_id: &str) -> Result<Vec<OrderItem>> {
        self.query_all(
            "SELECT id, order_id, status, content, updated_at FROM order_items
             WHERE order_id = ?1 ORDER BY id",
            params![order_id],
            row_to_order_item,
        )
        .await
    }

    /// Set an order item's status and, when given, its delivered text.
    pub async fn update_order_item(
        &self,
        id: &str,
        status: OrderStatus,
        content: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let changed = self
            .write(
                "UPDATE order_items SET status = ?1, content = COALESCE(?2, content), updated_at = ?3
                 WHERE id = ?4",
                params![status.as_str(), content, now.as_str(), id],
            )
            .await?;
        if changed == 0 {
            return Err(PapermillError::NotFound(format!("order item {id}")));
        }
        Ok(())
    }
}

fn row_to_order(row: &Row) -> Result<Order> {
    Ok(Order {
        id: rows::text(row, 0)?,
        customer_ref: rows::opt_text(row, 1),
        status: rows::parsed(row, 2)?,
        created_at: rows::timestamp(row, 3)?,
        updated_at: rows::timestamp(row, 4)?,
        notified_at: rows::opt_timestamp(row, 5)?,
    })
}

fn row_to_order_item(row: &Row) -> Result<OrderItem> {
    Ok(OrderItem {
        id: rows::text(row, 0)?,
        order_id: rows::text(row, 1)?,
        status: rows::parsed(row, 2)?,
        content: rows::opt_text(row, 3),
        updated_at: rows::timestamp(row, 4)?,
    })
}
