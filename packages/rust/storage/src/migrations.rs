//! SQL migration definitions for the papermill database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: orders, work items, stage records",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- External order aggregate (minimal mirror)
CREATE TABLE IF NOT EXISTS orders (
    id           TEXT PRIMARY KEY,
    customer_ref TEXT,
    status       TEXT NOT NULL,
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL,
    notified_at  TEXT
);

CREATE TABLE IF NOT EXISTS order_items (
    id         TEXT PRIMARY KEY,
    order_id   TEXT NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
    status     TEXT NOT NULL,
    content    TEXT,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_order_items_order ON order_items(order_id);

-- Commissioned work
CREATE TABLE IF NOT EXISTS work_items (
    id                TEXT PRIMARY KEY,
    order_id          TEXT,
    order_item_id     TEXT,
    user_id           TEXT,
    topic             TEXT NOT NULL,
    target_length     INTEGER NOT NULL,
    content_type      TEXT NOT NULL,
    content_kind      TEXT NOT NULL,
    language          TEXT NOT NULL,
    style             TEXT,
    guidelines        TEXT,
    keywords_json     TEXT NOT NULL DEFAULT '[]',
    source_hints_json TEXT NOT NULL DEFAULT '[]',
    status            TEXT NOT NULL,
    error_message     TEXT,
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_work_items_status ON work_items(status);

-- Stage: web search
CREATE TABLE IF NOT EXISTS search_results (
    id             TEXT PRIMARY KEY,
    work_item_id   TEXT NOT NULL UNIQUE REFERENCES work_items(id),
    query          TEXT NOT NULL,
    fallback_query TEXT,
    language       TEXT NOT NULL,
    entries_json   TEXT NOT NULL,
    total_results  INTEGER,
    status         TEXT NOT NULL,
    error_message  TEXT,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);

-- Stage: scraping (one row per URL)
CREATE TABLE IF NOT EXISTS scraped_sources (
    id               TEXT PRIMARY KEY,
    work_item_id     TEXT NOT NULL REFERENCES work_items(id),
    url              TEXT NOT NULL,
    title            TEXT,
    position         INTEGER NOT NULL,
    text             TEXT,
    text_len         INTEGER NOT NULL DEFAULT 0,
    content_hash     TEXT,
    status           TEXT NOT NULL,
    error_message    TEXT,
    selected         INTEGER NOT NULL DEFAULT 0,
    selection_reason TEXT,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL,
    UNIQUE(work_item_id, url)
);

CREATE INDEX IF NOT EXISTS idx_scraped_work_item ON scraped_sources(work_item_id);

-- Stage: source selection audit
CREATE TABLE IF NOT EXISTS source_selections (
    id                    TEXT PRIMARY KEY,
    work_item_id          TEXT NOT NULL UNIQUE REFERENCES work_items(id),
    prompt                TEXT NOT NULL,
    response              TEXT NOT NULL,
    selected_indices_json TEXT NOT NULL,
    fallback_used         INTEGER NOT NULL DEFAULT 0,
    created_at            TEXT NOT NULL
);

-- Stage: generic outline
CREATE TABLE IF NOT EXISTS outlines (
    id            TEXT PRIMARY KEY,
    work_item_id  TEXT NOT NULL UNIQUE REFERENCES work_items(id),
    structure     TEXT NOT NULL,
    header_count  INTEGER NOT NULL,
    sources_used  TEXT NOT NULL,
    status        TEXT NOT NULL,
    prompt        TEXT,
    tokens_in     INTEGER NOT NULL DEFAULT 0,
    tokens_out    INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

-- Stage: academic work aggregate
CREATE TABLE IF NOT EXISTS academic_works (
    id            TEXT PRIMARY KEY,
    work_item_id  TEXT NOT NULL UNIQUE REFERENCES work_items(id),
    work_type     TEXT NOT NULL,
    status        TEXT NOT NULL,
    toc_display   TEXT,
    toc_full      TEXT,
    toc_json      TEXT NOT NULL DEFAULT '[]',
    toc_prompt    TEXT,
    final_text    TEXT,
    error_message TEXT,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS academic_sections (
    id               TEXT PRIMARY KEY,
    academic_work_id TEXT NOT NULL REFERENCES academic_works(id) ON DELETE CASCADE,
    kind             TEXT NOT NULL,
    number           INTEGER NOT NULL,
    title            TEXT NOT NULL,
    chapter_kind     TEXT,
    content          TEXT,
    prompt           TEXT,
    char_count       INTEGER NOT NULL DEFAULT 0,
    tokens_in        INTEGER NOT NULL DEFAULT 0,
    tokens_out       INTEGER NOT NULL DEFAULT 0,
    duration_ms      INTEGER NOT NULL DEFAULT 0,
    status           TEXT NOT NULL,
    error_message    TEXT,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL,
    UNIQUE(academic_work_id, kind, number)
);

-- Stage: generic content
CREATE TABLE IF NOT EXISTS generated_contents (
    id            TEXT PRIMARY KEY,
    work_item_id  TEXT NOT NULL UNIQUE REFERENCES work_items(id),
    body          TEXT NOT NULL,
    sections_json TEXT NOT NULL DEFAULT '[]',
    word_count    INTEGER NOT NULL DEFAULT 0,
    char_count    INTEGER NOT NULL DEFAULT 0,
    delivered     INTEGER NOT NULL DEFAULT 0,
    status        TEXT NOT NULL,
    prompt        TEXT,
    tokens_in     INTEGER NOT NULL DEFAULT 0,
    tokens_out    INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Table-of-contents and assembly metrics on academic works",
            sql: r#"
ALTER TABLE academic_works ADD COLUMN toc_tokens_in INTEGER NOT NULL DEFAULT 0;
ALTER TABLE academic_works ADD COLUMN toc_tokens_out INTEGER NOT NULL DEFAULT 0;
ALTER TABLE academic_works ADD COLUMN toc_duration_ms INTEGER NOT NULL DEFAULT 0;
ALTER TABLE academic_works ADD COLUMN toc_char_count INTEGER NOT NULL DEFAULT 0;
ALTER TABLE academic_works ADD COLUMN final_char_count INTEGER NOT NULL DEFAULT 0;

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
