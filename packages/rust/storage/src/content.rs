//! Generated content records (generic path).

use chrono::Utc;
use libsql::{Row, params};
use papermill_shared::{GeneratedContent, Result};

use crate::Storage;
use crate::rows;

const CONTENT_COLUMNS: &str = "id, work_item_id, body, sections_json, word_count, char_count, \
     delivered, status, prompt, tokens_in, tokens_out, error_message, created_at, updated_at";

impl Storage {
    pub async fn upsert_generated_content(&self, content: &GeneratedContent) -> Result<()> {
        let sections = rows::to_json(&content.sections)?;
        self.write(
            &format!(
                "INSERT INTO generated_contents ({CONTENT_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                 ON CONFLICT(work_item_id) DO UPDATE SET
                   body = excluded.body,
                   sections_json = excluded.sections_json,
                   word_count = excluded.word_count,
                   char_count = excluded.char_count,
                   delivered = excluded.delivered,
                   status = excluded.status,
                   prompt = excluded.prompt,
                   tokens_in = excluded.tokens_in,
                   tokens_out = excluded.tokens_out,
                   error_message = excluded.error_message,
                   updated_at = excluded.updated_at"
            ),
            params![
                content.id.as_str(),
                content.work_item_id.as_str(),
                content.body.as_str(),
                sections,
                content.word_count as i64,
                content.char_count as i64,
                i64::from(content.delivered),
                content.status.as_str(),
                content.prompt.as_deref(),
                i64::from(content.tokens_in),
                i64::from(content.tokens_out),
                content.error_message.as_deref(),
                content.created_at.to_rfc3339(),
                content.updated_at.to_rfc3339(),
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn get_generated_content(
        &self,
        work_item_id: &str,
    ) -> Result<Option<GeneratedContent>> {
        self.query_one(
            &format!("SELECT {CONTENT_COLUMNS} FROM generated_contents WHERE work_item_id = ?1"),
            params![work_item_id],
            row_to_generated_content,
        )
        .await
    }

    /// Flag the content as handed over to the order item.
    pub async fn mark_content_delivered(&self, work_item_id: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.write(
            "UPDATE generated_contents SET delivered = 1, updated_at = ?1 WHERE work_item_id = ?2",
            params![now.as_str(), work_item_id],
        )
        .await?;
        Ok(())
    }
}

fn row_to_generated_content(row: &Row) -> Result<GeneratedContent> {
    Ok(GeneratedContent {
        id: rows::text(row, 0)?,
        work_item_id: rows::text(row, 1)?,
        body: rows::text(row, 2)?,
        sections: rows::json(row, 3)?,
        word_count: rows::int(row, 4)? as usize,
        char_count: rows::int(row, 5)? as usize,
        delivered: rows::flag(row, 6)?,
        status: rows::parsed(row, 7)?,
        prompt: rows::opt_text(row, 8),
        tokens_in: rows::int(row, 9)? as u32,
        tokens_out: rows::int(row, 10)? as u32,
        error_message: rows::opt_text(row, 11),
        created_at: rows::timestamp(row, 12)?,
        updated_at: rows::timestamp(row, 13)?,
    })
}

#[cfg(test)]
mod tests {
    use papermill_shared::{RecordStatus, new_id};

    use crate::test_support::{seeded_item, test_storage};

    use super::*;

    #[tokio::test]
    async fn content_lifecycle() {
        let storage = test_storage().await;
        let item = seeded_item(&storage, "article").await;
        let now = Utc::now();

        assert!(storage.get_generated_content(&item.id).await.unwrap().is_none());

        let content = GeneratedContent {
            id: new_id(),
            work_item_id: item.id.clone(),
            body: "## One\ntext\n## Two\nmore".into(),
            sections: vec!["One".into(), "Two".into()],
            word_count: 4,
            char_count: 24,
            delivered: false,
            status: RecordStatus::Completed,
            prompt: Some("write".into()),
            tokens_in: 50,
            tokens_out: 12,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        storage.upsert_generated_content(&content).await.expect("insert");
        storage.mark_content_delivered(&item.id).await.expect("deliver");

        let found = storage.get_generated_content(&item.id).await.unwrap().unwrap();
        assert!(found.delivered);
        assert_eq!(found.sections, vec!["One", "Two"]);
        assert_eq!(found.status, RecordStatus::Completed);
    }
}
