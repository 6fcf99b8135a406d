//! Shared types, error model, and configuration for papermill.
//!
//! This crate is the foundation depended on by all other papermill crates.
//! It provides:
//! - [`PapermillError`]: the unified error type
//! - Domain types ([`WorkItem`] and the per-stage records it owns)
//! - Status machines ([`WorkItemStatus`], [`AcademicStatus`], ...)
//! - Content classification ([`classify_content_type`])
//! - Configuration ([`AppConfig`], config loading)

#[macro_use]
mod macros;

pub mod classify;
pub mod config;
pub mod error;
pub mod status;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use classify::{ContentKind, WorkType, classify_content_type};
pub use config::{
    AppConfig, DefaultsConfig, GenerationConfig, OpenRouterConfig, ScraperConfig, SearchConfig,
    config_dir, config_file_path, expand_home, init_config, load_config, load_config_from,
    read_env_secret, validate_api_key,
};
pub use error::{PapermillError, Result};
pub use status::{AcademicStatus, OrderStatus, RecordStatus, ScrapeStatus, WorkItemStatus};
pub use types::{
    AcademicSection, AcademicWork, ChapterKind, GeneratedContent, MAX_SOURCE_HINTS, NewWorkItem,
    Order, OrderItem, Outline, ScrapedSource, SearchEntry, SearchResultRecord, SectionKind,
    SourceSelectionRecord, StructureRecord, TocChapter, WorkItem, new_id,
};
