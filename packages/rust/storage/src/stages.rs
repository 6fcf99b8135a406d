//! Search, scrape and source-selection records.

use chrono::Utc;
use libsql::{Row, params};
use papermill_shared::{
    PapermillError, Result, ScrapeStatus, ScrapedSource, SearchResultRecord,
    SourceSelectionRecord, new_id,
};

use crate::Storage;
use crate::rows;

const SEARCH_COLUMNS: &str = "id, work_item_id, query, fallback_query, language, entries_json, \
     total_results, status, error_message, created_at, updated_at";

const SCRAPED_COLUMNS: &str = "id, work_item_id, url, title, position, text, text_len, \
     content_hash, status, error_message, selected, selection_reason, created_at, updated_at";

const SELECTION_COLUMNS: &str =
    "id, work_item_id, prompt, response, selected_indices_json, fallback_used, created_at";

impl Storage {
    // -----------------------------------------------------------------------
    // Search results
    // -----------------------------------------------------------------------

    /// Insert or replace the search result of a work item.
    pub async fn upsert_search_result(&self, record: &SearchResultRecord) -> Result<()> {
        let entries = rows::to_json(&record.entries)?;
        self.write(
            &format!(
                "INSERT INTO search_results ({SEARCH_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(work_item_id) DO UPDATE SET
                   query = excluded.query,
                   fallback_query = excluded.fallback_query,
                   language = excluded.language,
                   entries_json = excluded.entries_json,
                   total_results = excluded.total_results,
                   status = excluded.status,
                   error_message = excluded.error_message,
                   updated_at = excluded.updated_at"
            ),
            params![
                record.id.as_str(),
                record.work_item_id.as_str(),
                record.query.as_str(),
                record.fallback_query.as_deref(),
                record.language.as_str(),
                entries,
                record.total_results.map(|t| t as i64),
                record.status.as_str(),
                record.error_message.as_deref(),
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn get_search_result(&self, work_item_id: &str) -> Result<Option<SearchResultRecord>> {
        self.query_one(
            &format!("SELECT {SEARCH_COLUMNS} FROM search_results WHERE work_item_id = ?1"),
            params![work_item_id],
            row_to_search_result,
        )
        .await
    }

    // -----------------------------------------------------------------------
    // Scraped sources
    // -----------------------------------------------------------------------

    /// Mark a URL as being scraped, creating its record if needed.
    ///
    /// A URL that already completed is returned untouched so the count of
    /// completed sources never decreases.
    pub async fn begin_scrape(
        &self,
        work_item_id: &str,
        url: &str,
        title: Option<&str>,
        position: u32,
    ) -> Result<ScrapedSource> {
        let now = Utc::now().to_rfc3339();
        let id = new_id();
        self.write(
            "INSERT INTO scraped_sources
               (id, work_item_id, url, title, position, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT(work_item_id, url) DO UPDATE SET
               status = excluded.status,
               error_message = NULL,
               updated_at = excluded.updated_at
             WHERE scraped_sources.status != 'completed'",
            params![
                id.as_str(),
                work_item_id,
                url,
                title,
                i64::from(position),
                ScrapeStatus::Scraping.as_str(),
                now.as_str(),
            ],
        )
        .await?;

        self.get_scraped_source_by_url(work_item_id, url)
            .await?
            .ok_or_else(|| PapermillError::NotFound(format!("scraped source {url}")))
    }

    /// Store extracted text and mark the source completed.
    pub async fn complete_scrape(
        &self,
        source_id: &str,
        text: &str,
        content_hash: &str,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.write(
            "UPDATE scraped_sources
             SET text = ?1, text_len = ?2, content_hash = ?3, status = ?4,
                 error_message = NULL, updated_at = ?5
             WHERE id = ?6",
            params![
                text,
                text.chars().count() as i64,
                content_hash,
                ScrapeStatus::Completed.as_str(),
                now.as_str(),
                source_id,
            ],
        )
        .await?;
        Ok(())
    }

    /// Mark a source failed. Completed sources are never downgraded.
    pub async fn fail_scrape(&self, source_id: &str, message: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.write(
            "UPDATE scraped_sources SET status = ?1, error_message = ?2, updated_at = ?3
             WHERE id = ?4 AND status != 'completed'",
            params![ScrapeStatus::Failed.as_str(), message, now.as_str(), source_id],
        )
        .await?;
        Ok(())
    }

    pub async fn get_scraped_source_by_url(
        &self,
        work_item_id: &str,
        url: &str,
    ) -> Result<Option<ScrapedSource>> {
        self.query_one(
            &format!(
                "SELECT {SCRAPED_COLUMNS} FROM scraped_sources
                 WHERE work_item_id = ?1 AND url = ?2"
            ),
            params![work_item_id, url],
            row_to_scraped_source,
        )
        .await
    }

    /// All sources of a work item in search-rank order.
    pub async fn list_scraped_sources(&self, work_item_id: &str) -> Result<Vec<ScrapedSource>> {
        self.query_all(
            &format!(
                "SELECT {SCRAPED_COLUMNS} FROM scraped_sources
                 WHERE work_item_id = ?1 ORDER BY position, created_at"
            ),
            params![work_item_id],
            row_to_scraped_source,
        )
        .await
    }

    /// Completed sources in search-rank order.
    pub async fn list_completed_sources(&self, work_item_id: &str) -> Result<Vec<ScrapedSource>> {
        self.query_all(
            &format!(
                "SELECT {SCRAPED_COLUMNS} FROM scraped_sources
                 WHERE work_item_id = ?1 AND status = 'completed' ORDER BY position, created_at"
            ),
            params![work_item_id],
            row_to_scraped_source,
        )
        .await
    }

    pub async fn list_selected_sources(&self, work_item_id: &str) -> Result<Vec<ScrapedSource>> {
        self.query_all(
            &format!(
                "SELECT {SCRAPED_COLUMNS} FROM scraped_sources
                 WHERE work_item_id = ?1 AND selected = 1 ORDER BY position, created_at"
            ),
            params![work_item_id],
            row_to_scraped_source,
        )
        .await
    }

    /// Replace the selection of a work item with `(source_id, reason)` pairs.
    ///
    /// Only completed sources can be selected. Returns how many rows were marked.
    pub async fn mark_selected(
        &self,
        work_item_id: &str,
        selections: &[(String, String)],
    ) -> Result<usize> {
        let now = Utc::now().to_rfc3339();
        self.write(
            "UPDATE scraped_sources SET selected = 0, selection_reason = NULL, updated_at = ?1
             WHERE work_item_id = ?2 AND selected = 1",
            params![now.as_str(), work_item_id],
        )
        .await?;

        let mut marked = 0;
        for (source_id, reason) in selections {
            marked += self
                .write(
                    "UPDATE scraped_sources SET selected = 1, selection_reason = ?1, updated_at = ?2
                     WHERE id = ?3 AND work_item_id = ?4 AND status = 'completed'",
                    params![reason.as_str(), now.as_str(), source_id.as_str(), work_item_id],
                )
                .await? as usize;
        }
        Ok(marked)
    }

    // -----------------------------------------------------------------------
    // Source selection audit
    // -----------------------------------------------------------------------

    pub async fn upsert_selection(&self, record: &SourceSelectionRecord) -> Result<()> {
        let indices = rows::to_json(&record.selected_indices)?;
        self.write(
            &format!(
                "INSERT INTO source_selections ({SELECTION_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(work_item_id) DO UPDATE SET
                   prompt = excluded.prompt,
                   response = excluded.response,
                   selected_indices_json = excluded.selected_indices_json,
                   fallback_used = excluded.fallback_used,
                   created_at = excluded.created_at"
            ),
            params![
                record.id.as_str(),
                record.work_item_id.as_str(),
                record.prompt.as_str(),
                record.response.as_str(),
                indices,
                i64::from(record.fallback_used),
                record.created_at.to_rfc3339(),
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn get_selection(&self, work_item_id: &str) -> Result<Option<SourceSelectionRecord>> {
        self.query_one(
            &format!("SELECT {SELECTION_COLUMNS} FROM source_selections WHERE work_item_id = ?1"),
            params![work_item_id],
            row_to_selection,
        )
        .await
    }
}

fn row_to_search_result(row: &Row) -> Result<SearchResultRecord> {
    Ok(SearchResultRecord {
        id: rows::text(row, 0)?,
        work_item_id: rows::text(row, 1)?,
        query: rows::text(row, 2)?,
        fallback_query: rows::opt_text(row, 3),
        language: rows::text(row, 4)?,
        entries: rows::json(row, 5)?,
        total_results: row.get::<i64>(6).ok().map(|v| v as u64),
        status: rows::parsed(row, 7)?,
        error_message: rows::opt_text(row, 8),
        created_at: rows::timestamp(row, 9)?,
        updated_at: rows::timestamp(row, 10)?,
    })
}

fn row_to_scraped_source(row: &Row) -> Result<ScrapedSource> {
    Ok(ScrapedSource {
        id: rows::text(row, 0)?,
        work_item_id: rows::text(row, 1)?,
        url: rows::text(row, 2)?,
        title: rows::opt_text(row, 3),
        position: rows::int(row, 4)? as u32,
        text: rows::opt_text(row, 5),
        text_len: rows::int(row, 6)? as usize,
        content_hash: rows::opt_text(row, 7),
        status: rows::parsed(row, 8)?,
        error_message: rows::opt_text(row, 9),
        selected: rows::flag(row, 10)?,
        selection_reason: rows::opt_text(row, 11),
        created_at: rows::timestamp(row, 12)?,
        updated_at: rows::timestamp(row, 13)?,
    })
}

fn row_to_selection(row: &Row) -> Result<SourceSelectionRecord> {
    Ok(SourceSelectionRecord {
        id: rows::text(row, 0)?,
        work_item_id: rows::text(row, 1)?,
        prompt: rows::text(row, 2)?,
        response: rows::text(row, 3)?,
        selected_indices: rows::json(row, 4)?,
        fallback_used: rows::flag(row, 5)?,
        created_at: rows::timestamp(row, 6)?,
    })
}
