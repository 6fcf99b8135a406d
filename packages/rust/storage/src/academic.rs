//! Outline and academic-work records (the structure stage).

use chrono::Utc;
use libsql::{Row, params};
use papermill_shared::{
    AcademicSection, AcademicStatus, AcademicWork, Outline, PapermillError, Result, SectionKind,
    StructureRecord,
};

use crate::Storage;
use crate::rows;

const OUTLINE_COLUMNS: &str = "id, work_item_id, structure, header_count, sources_used, status, \
     prompt, tokens_in, tokens_out, error_message, created_at, updated_at";

const ACADEMIC_COLUMNS: &str = "id, work_item_id, work_type, status, toc_display, toc_full, \
     toc_json, toc_prompt, final_text, error_message, created_at, updated_at, toc_tokens_in, \
     toc_tokens_out, toc_duration_ms, toc_char_count, final_char_count";

const SECTION_COLUMNS: &str = "id, academic_work_id, kind, number, title, chapter_kind, content, \
     prompt, char_count, tokens_in, tokens_out, duration_ms, status, error_message, created_at, \
     updated_at";

// Chapters first, then the parts in the order they are generated.
const SECTION_ORDER: &str = "CASE kind
       WHEN 'chapter' THEN 0
       WHEN 'introduction' THEN 1
       WHEN 'conclusion' THEN 2
       ELSE 3 END, number";

impl Storage {
    // -----------------------------------------------------------------------
    // Generic outline
    // -----------------------------------------------------------------------

    pub async fn upsert_outline(&self, outline: &Outline) -> Result<()> {
        self.write(
            &format!(
                "INSERT INTO outlines ({OUTLINE_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT(work_item_id) DO UPDATE SET
                   structure = excluded.structure,
                   header_count = excluded.header_count,
                   sources_used = excluded.sources_used,
                   status = excluded.status,
                   prompt = excluded.prompt,
                   tokens_in = excluded.tokens_in,
                   tokens_out = excluded.tokens_out,
                   error_message = excluded.error_message,
                   updated_at = excluded.updated_at"
            ),
            params![
                outline.id.as_str(),
                outline.work_item_id.as_str(),
                outline.structure.as_str(),
                i64::from(outline.header_count),
                outline.sources_used.as_str(),
                outline.status.as_str(),
                outline.prompt.as_deref(),
                i64::from(outline.tokens_in),
                i64::from(outline.tokens_out),
                outline.error_message.as_deref(),
                outline.created_at.to_rfc3339(),
                outline.updated_at.to_rfc3339(),
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn get_outline(&self, work_item_id: &str) -> Result<Option<Outline>> {
        self.query_one(
            &format!("SELECT {OUTLINE_COLUMNS} FROM outlines WHERE work_item_id = ?1"),
            params![work_item_id],
            row_to_outline,
        )
        .await
    }

    // -----------------------------------------------------------------------
    // Academic work
    // -----------------------------------------------------------------------

    /// Insert or update the academic work row. Sections are stored separately.
    pub async fn upsert_academic_work(&self, work: &AcademicWork) -> Result<()> {
        let toc = rows::to_json(&work.table_of_contents)?;
        self.write(
            &format!(
                "INSERT INTO academic_works ({ACADEMIC_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
                 ON CONFLICT(work_item_id) DO UPDATE SET
                   work_type = excluded.work_type,
                   status = excluded.status,
                   toc_display = excluded.toc_display,
                   toc_full = excluded.toc_full,
                   toc_json = excluded.toc_json,
                   toc_prompt = excluded.toc_prompt,
                   final_text = excluded.final_text,
                   error_message = excluded.error_message,
                   updated_at = excluded.updated_at,
                   toc_tokens_in = excluded.toc_tokens_in,
                   toc_tokens_out = excluded.toc_tokens_out,
                   toc_duration_ms = excluded.toc_duration_ms,
                   toc_char_count = excluded.toc_char_count,
                   final_char_count = excluded.final_char_count"
            ),
            params![
                work.id.as_str(),
                work.work_item_id.as_str(),
                work.work_type.as_str(),
                work.status.to_string(),
                work.toc_display.as_deref(),
                work.toc_full.as_deref(),
                toc,
                work.toc_prompt.as_deref(),
                work.final_text.as_deref(),
                work.error_message.as_deref(),
                work.created_at.to_rfc3339(),
                work.updated_at.to_rfc3339(),
                i64::from(work.toc_tokens_in),
                i64::from(work.toc_tokens_out),
                work.toc_duration_ms as i64,
                work.toc_char_count as i64,
                work.final_char_count as i64,
            ],
        )
        .await?;
        Ok(())
    }

    /// Load the academic work of a work item together with its sections.
    pub async fn get_academic_work(&self, work_item_id: &str) -> Result<Option<AcademicWork>> {
        let work = self
            .query_one(
                &format!("SELECT {ACADEMIC_COLUMNS} FROM academic_works WHERE work_item_id = ?1"),
                params![work_item_id],
                row_to_academic_work,
            )
            .await?;

        match work {
            Some(mut work) => {
                work.sections = self.list_sections(&work.id).await?;
                Ok(Some(work))
            }
            None => Ok(None),
        }
    }

    /// Advance the fine-grained status. Backward moves are refused.
    pub async fn update_academic_status(
        &self,
        academic_work_id: &str,
        next: AcademicStatus,
    ) -> Result<()> {
        let current = self
            .query_one(
                "SELECT status FROM academic_works WHERE id = ?1",
                params![academic_work_id],
                |row| rows::parsed::<AcademicStatus>(row, 0),
            )
            .await?
            .ok_or_else(|| PapermillError::NotFound(format!("academic work {academic_work_id}")))?;

        if !current.can_transition_to(next) {
            return Err(PapermillError::InvalidTransition {
                from: current.to_string(),
                to: next.to_string(),
            });
        }

        let now = Utc::now().to_rfc3339();
        self.write(
            "UPDATE academic_works SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![next.to_string(), now.as_str(), academic_work_id],
        )
        .await?;
        tracing::debug!(academic_work_id, from = %current, to = %next, "academic status");
        Ok(())
    }

    /// Mark the academic work failed with a message.
    pub async fn fail_academic_work(&self, academic_work_id: &str, message: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.write(
            "UPDATE academic_works SET status = ?1, error_message = ?2, updated_at = ?3
             WHERE id = ?4 AND status != 'completed'",
            params![
                AcademicStatus::Failed.to_string(),
                message,
                now.as_str(),
                academic_work_id
            ],
        )
        .await?;
        Ok(())
    }

    /// Rewind a failed academic work to its last checkpoint so a reopened
    /// work item can resume it.
    pub(crate) async fn rewind_failed_academic_work(&self, work_item_id: &str) -> Result<()> {
        let Some(work) = self.get_academic_work(work_item_id).await? else {
            return Ok(());
        };
        if work.status != AcademicStatus::Failed {
            return Ok(());
        }

        let checkpoint = if work.has_toc() {
            AcademicStatus::TocCompleted
        } else {
            AcademicStatus::GeneratingToc
        };
        let now = Utc::now().to_rfc3339();
        self.write(
            "UPDATE academic_works SET status = ?1, error_message = NULL, updated_at = ?2
             WHERE id = ?3",
            params![checkpoint.to_string(), now.as_str(), work.id.as_str()],
        )
        .await?;
        tracing::info!(academic_work_id = %work.id, to = %checkpoint, "rewound academic work");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Academic sections
    // -----------------------------------------------------------------------

    /// Insert or update a section, keyed by `(academic_work_id, kind, number)`.
    pub async fn upsert_section(&self, section: &AcademicSection) -> Result<()> {
        self.write(
            &format!(
                "INSERT INTO academic_sections ({SECTION_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                 ON CONFLICT(academic_work_id, kind, number) DO UPDATE SET
                   title = excluded.title,
                   chapter_kind = excluded.chapter_kind,
                   content = excluded.content,
                   prompt = excluded.prompt,
                   char_count = excluded.char_count,
                   tokens_in = excluded.tokens_in,
                   tokens_out = excluded.tokens_out,
                   duration_ms = excluded.duration_ms,
                   status = excluded.status,
                   error_message = excluded.error_message,
                   updated_at = excluded.updated_at"
            ),
            params![
                section.id.as_str(),
                section.academic_work_id.as_str(),
                section.kind.as_str(),
                i64::from(section.number),
                section.title.as_str(),
                section.chapter_kind.map(|k| k.as_str()),
                section.content.as_deref(),
                section.prompt.as_deref(),
                section.char_count as i64,
                i64::from(section.tokens_in),
                i64::from(section.tokens_out),
                section.duration_ms as i64,
                section.status.as_str(),
                section.error_message.as_deref(),
                section.created_at.to_rfc3339(),
                section.updated_at.to_rfc3339(),
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn list_sections(&self, academic_work_id: &str) -> Result<Vec<AcademicSection>> {
        self.query_all(
            &format!(
                "SELECT {SECTION_COLUMNS} FROM academic_sections
                 WHERE academic_work_id = ?1 ORDER BY {SECTION_ORDER}"
            ),
            params![academic_work_id],
            row_to_section,
        )
        .await
    }

    pub async fn get_section(
        &self,
        academic_work_id: &str,
        kind: SectionKind,
        number: u32,
    ) -> Result<Option<AcademicSection>> {
        self.query_one(
            &format!(
                "SELECT {SECTION_COLUMNS} FROM academic_sections
                 WHERE academic_work_id = ?1 AND kind = ?2 AND number = ?3"
            ),
            params![academic_work_id, kind.as_str(), i64::from(number)],
            row_to_section,
        )
        .await
    }

    // -----------------------------------------------------------------------
    // Structure (either shape)
    // -----------------------------------------------------------------------

    /// The structure record of a work item, whichever shape it has.
    pub async fn get_structure(&self, work_item_id: &str) -> Result<Option<StructureRecord>> {
        if let Some(work) = self.get_academic_work(work_item_id).await? {
            return Ok(Some(StructureRecord::Academic(work)));
        }
        Ok(self
            .get_outline(work_item_id)
            .await?
            .map(StructureRecord::Generic))
    }
}

fn row_to_outline(row: &Row) -> Result<Outline> {
    Ok(Outline {
        id: rows::text(row, 0)?,
        work_item_id: rows::text(row, 1)?,
        structure: rows::text(row, 2)?,
        header_count: rows::int(row, 3)? as u32,
        sources_used: rows::text(row, 4)?,
        status: rows::parsed(row, 5)?,
        prompt: rows::opt_text(row, 6),
        tokens_in: rows::int(row, 7)? as u32,
        tokens_out: rows::int(row, 8)? as u32,
        error_message: rows::opt_text(row, 9),
        created_at: rows::timestamp(row, 10)?,
        updated_at: rows::timestamp(row, 11)?,
    })
}

fn row_to_academic_work(row: &Row) -> Result<AcademicWork> {
    Ok(AcademicWork {
        id: rows::text(row, 0)?,
        work_item_id: rows::text(row, 1)?,
        work_type: rows::parsed(row, 2)?,
        status: rows::parsed(row, 3)?,
        toc_display: rows::opt_text(row, 4),
        toc_full: rows::opt_text(row, 5),
        table_of_contents: rows::json(row, 6)?,
        toc_prompt: rows::opt_text(row, 7),
        toc_tokens_in: rows::int(row, 12)? as u32,
        toc_tokens_out: rows::int(row, 13)? as u32,
        toc_duration_ms: rows::int(row, 14)? as u64,
        toc_char_count: rows::int(row, 15)? as usize,
        final_text: rows::opt_text(row, 8),
        final_char_count: rows::int(row, 16)? as usize,
        error_message: rows::opt_text(row, 9),
        sections: Vec::new(),
        created_at: rows::timestamp(row, 10)?,
        updated_at: rows::timestamp(row, 11)?,
    })
}

fn row_to_section(row: &Row) -> Result<AcademicSection> {
    Ok(AcademicSection {
        id: rows::text(row, 0)?,
        academic_work_id: rows::text(row, 1)?,
        kind: rows::parsed(row, 2)?,
        number: rows::int(row, 3)? as u32,
        title: rows::text(row, 4)?,
        chapter_kind: rows::opt_parsed(row, 5)?,
        content: rows::opt_text(row, 6),
        prompt: rows::opt_text(row, 7),
        char_count: rows::int(row, 8)? as usize,
        tokens_in: rows::int(row, 9)? as u32,
        tokens_out: rows::int(row, 10)? as u32,
        duration_ms: rows::int(row, 11)? as u64,
        status: rows::parsed(row, 12)?,
        error_message: rows::opt_text(row, 13),
        created_at: rows::timestamp(row, 14)?,
        updated_at: rows::timestamp(row, 15)?,
    })
}
