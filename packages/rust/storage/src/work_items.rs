//! Work item records and their coarse status machine.

use chrono::Utc;
use libsql::{Row, params};
use papermill_shared::{PapermillError, Result, WorkItem, WorkItemStatus};

use crate::Storage;
use crate::rows;

const WORK_ITEM_COLUMNS: &str = "id, order_id, order_item_id, user_id, topic, target_length, \
     content_type, content_kind, language, style, guidelines, keywords_json, source_hints_json, \
     status, error_message, created_at, updated_at";

impl Storage {
    // -----------------------------------------------------------------------
    // Work item operations
    // -----------------------------------------------------------------------

    /// Insert a new work item.
    pub async fn create_work_item(&self, item: &WorkItem) -> Result<()> {
        let keywords = rows::to_json(&item.keywords)?;
        let hints = rows::to_json(&item.source_hints)?;
        self.write(
            &format!(
                "INSERT INTO work_items ({WORK_ITEM_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
            ),
            params![
                item.id.as_str(),
                item.order_id.as_deref(),
                item.order_item_id.as_deref(),
                item.user_id.as_deref(),
                item.topic.as_str(),
                i64::from(item.target_length),
                item.content_type.as_str(),
                item.content_kind.as_str(),
                item.language.as_str(),
                item.style.as_deref(),
                item.guidelines.as_deref(),
                keywords,
                hints,
                item.status.as_str(),
                item.error_message.as_deref(),
                item.created_at.to_rfc3339(),
                item.updated_at.to_rfc3339(),
            ],
        )
        .await?;
        Ok(())
    }

    /// Get a work item by ID.
    pub async fn get_work_item(&self, id: &str) -> Result<Option<WorkItem>> {
        self.query_one(
            &format!("SELECT {WORK_ITEM_COLUMNS} FROM work_items WHERE id = ?1"),
            params![id],
            row_to_work_item,
        )
        .await
    }

    /// Get a work item that must exist.
    pub async fn require_work_item(&self, id: &str) -> Result<WorkItem> {
        self.get_work_item(id)
            .await?
            .ok_or_else(|| PapermillError::NotFound(format!("work item {id}")))
    }

    /// List work items, newest first, optionally filtered by status.
    pub async fn list_work_items(&self, status: Option<WorkItemStatus>) -> Result<Vec<WorkItem>> {
        match status {
            Some(status) => {
                self.query_all(
                    &format!(
                        "SELECT {WORK_ITEM_COLUMNS} FROM work_items
                         WHERE status = ?1 ORDER BY created_at DESC"
                    ),
                    params![status.as_str()],
                    row_to_work_item,
                )
                .await
            }
            None => {
                self.query_all(
                    &format!("SELECT {WORK_ITEM_COLUMNS} FROM work_items ORDER BY created_at DESC"),
                    params![],
                    row_to_work_item,
                )
                .await
            }
        }
    }

    /// Advance a work item's status. Backward moves are refused.
    pub async fn update_work_item_status(&self, id: &str, next: WorkItemStatus) -> Result<()> {
        let current = self.require_work_item(id).await?.status;
        if !current.can_transition_to(next) {
            return Err(PapermillError::InvalidTransition {
                from: current.to_string(),
                to: next.to_string(),
            });
        }
        if current == next {
            return Ok(());
        }

        let now = Utc::now().to_rfc3339();
        self.write(
            "UPDATE work_items SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![next.as_str(), now.as_str(), id],
        )
        .await?;
        tracing::debug!(work_item_id = id, from = %current, to = %next, "work item status");
        Ok(())
    }

    /// Move a work item into `Cancelled` or `Error` with a message.
    pub async fn fail_work_item(
        &self,
        id: &str,
        status: WorkItemStatus,
        message: &str,
    ) -> Result<()> {
        if !status.is_failure() {
            return Err(PapermillError::validation(format!(
                "{status} is not a failure status"
            )));
        }
        let current = self.require_work_item(id).await?.status;
        if !current.can_transition_to(status) {
            return Err(PapermillError::InvalidTransition {
                from: current.to_string(),
                to: status.to_string(),
            });
        }

        let now = Utc::now().to_rfc3339();
        self.write(
            "UPDATE work_items SET status = ?1, error_message = ?2, updated_at = ?3 WHERE id = ?4",
            params![status.as_str(), message, now.as_str(), id],
        )
        .await?;
        Ok(())
    }

    /// Move a cancelled or errored work item back to `Pending`.
    ///
    /// This is the only backward transition. Completed stage records are
    /// kept so the next run resumes after them. A failed academic work is
    /// rewound to its last durable checkpoint.
    pub async fn reopen_work_item(&self, id: &str) -> Result<()> {
        let current = self.require_work_item(id).await?.status;
        if !current.is_failure() {
            return Err(PapermillError::InvalidTransition {
                from: current.to_string(),
                to: WorkItemStatus::Pending.to_string(),
            });
        }

        let now = Utc::now().to_rfc3339();
        self.write(
            "UPDATE work_items SET status = ?1, error_message = NULL, updated_at = ?2 WHERE id = ?3",
            params![WorkItemStatus::Pending.as_str(), now.as_str(), id],
        )
        .await?;
        self.rewind_failed_academic_work(id).await?;

        tracing::info!(work_item_id = id, from = %current, "reopened work item");
        Ok(())
    }
}

/// Convert a database row to a [`WorkItem`].
fn row_to_work_item(row: &Row) -> Result<WorkItem> {
    Ok(WorkItem {
        id: rows::text(row, 0)?,
        order_id: rows::opt_text(row, 1),
        order_item_id: rows::opt_text(row, 2),
        user_id: rows::opt_text(row, 3),
        topic: rows::text(row, 4)?,
        target_length: rows::int(row, 5)? as u32,
        content_type: rows::text(row, 6)?,
        content_kind: rows::parsed(row, 7)?,
        language: rows::text(row, 8)?,
        style: rows::opt_text(row, 9),
        guidelines: rows::opt_text(row, 10),
        keywords: rows::json(row, 11)?,
        source_hints: rows::json(row, 12)?,
        status: rows::parsed(row, 13)?,
        error_message: rows::opt_text(row, 14),
        created_at: rows::timestamp(row, 15)?,
        updated_at: rows::timestamp(row, 16)?,
    })
}
