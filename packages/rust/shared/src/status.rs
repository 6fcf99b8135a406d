//! Status machines for work items and stage records.
//!
//! Statuses are persisted as snake_case strings. Every enum round-trips
//! through [`std::str::FromStr`] and [`std::fmt::Display`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::PapermillError;

// ---------------------------------------------------------------------------
// WorkItemStatus
// ---------------------------------------------------------------------------

string_enum! {
    /// Coarse pipeline status of a work item.
    WorkItemStatus {
        Pending => "pending",
        InProgress => "in_progress",
        Searching => "searching",
        Scraping => "scraping",
        SourceSelection => "source_selection",
        StructureGeneration => "structure_generation",
        StructureReady => "structure_ready",
        ContentGeneration => "content_generation",
        Completed => "completed",
        Cancelled => "cancelled",
        Error => "error",
    }
}

impl WorkItemStatus {
    /// Position along the forward chain. Failure states share the last slot.
    fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::InProgress => 1,
            Self::Searching => 2,
            Self::Scraping => 3,
            Self::SourceSelection => 4,
            Self::StructureGeneration => 5,
            Self::StructureReady => 6,
            Self::ContentGeneration => 7,
            Self::Completed | Self::Cancelled | Self::Error => 8,
        }
    }

    /// Completed, Cancelled and Error end a pipeline run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Error)
    }

    /// Whether the pipeline ended without a deliverable.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Error)
    }

    /// Forward-only check. Staying in place is allowed so resumed stages
    /// can re-announce themselves.
    pub fn can_transition_to(&self, next: WorkItemStatus) -> bool {
        if self.is_terminal() {
            return *self == next;
        }
        if next.is_failure() {
            return true;
        }
        next.rank() >= self.rank()
    }
}

// ---------------------------------------------------------------------------
// Stage record statuses
// ---------------------------------------------------------------------------

string_enum! {
    /// Lifecycle of a single-shot stage record (search result, outline,
    /// academic section, generated content).
    RecordStatus {
        Pending => "pending",
        Generating => "generating",
        Completed => "completed",
        Failed => "failed",
    }
}

string_enum! {
    /// Lifecycle of one scraped URL.
    ScrapeStatus {
        Pending => "pending",
        Scraping => "scraping",
        Completed => "completed",
        Failed => "failed",
    }
}

string_enum! {
    /// Status of the parent order aggregate.
    OrderStatus {
        Pending => "pending",
        InProgress => "in_progress",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

// ---------------------------------------------------------------------------
// AcademicStatus
// ---------------------------------------------------------------------------

/// Fine-grained status of an academic work, one value per sub-stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AcademicStatus {
    GeneratingToc,
    TocCompleted,
    ChapterGenerating(u32),
    ChapterCompleted(u32),
    GeneratingIntroduction,
    IntroductionCompleted,
    GeneratingConclusion,
    ConclusionCompleted,
    GeneratingBibliography,
    BibliographyCompleted,
    Assembling,
    Completed,
    Failed,
}

impl AcademicStatus {
    /// Ordering key along the linear chain.
    fn progress_key(&self) -> (u8, u32, u8) {
        match *self {
            Self::GeneratingToc => (0, 0, 0),
            Self::TocCompleted => (0, 0, 1),
            Self::ChapterGenerating(n) => (1, n, 0),
            Self::ChapterCompleted(n) => (1, n, 1),
            Self::GeneratingIntroduction => (2, 0, 0),
            Self::IntroductionCompleted => (2, 0, 1),
            Self::GeneratingConclusion => (3, 0, 0),
            Self::ConclusionCompleted => (3, 0, 1),
            Self::GeneratingBibliography => (4, 0, 0),
            Self::BibliographyCompleted => (4, 0, 1),
            Self::Assembling => (5, 0, 0),
            Self::Completed | Self::Failed => (6, 0, 0),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Forward-only; `Failed` is reachable from every non-terminal state.
    pub fn can_transition_to(&self, next: AcademicStatus) -> bool {
        if self.is_terminal() {
            return *self == next;
        }
        if next == Self::Failed {
            return true;
        }
        next.progress_key() >= self.progress_key()
    }
}

impl fmt::Display for AcademicStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GeneratingToc => f.write_str("generating_toc"),
            Self::TocCompleted => f.write_str("toc_completed"),
            Self::ChapterGenerating(n) => write!(f, "chapter_{n}_generating"),
            Self::ChapterCompleted(n) => write!(f, "chapter_{n}_completed"),
            Self::GeneratingIntroduction => f.write_str("generating_introduction"),
            Self::IntroductionCompleted => f.write_str("introduction_completed"),
            Self::GeneratingConclusion => f.write_str("generating_conclusion"),
            Self::ConclusionCompleted => f.write_str("conclusion_completed"),
            Self::GeneratingBibliography => f.write_str("generating_bibliography"),
            Self::BibliographyCompleted => f.write_str("bibliography_completed"),
            Self::Assembling => f.write_str("assembling"),
            Self::Completed => f.write_str("completed"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

impl FromStr for AcademicStatus {
    type Err = PapermillError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let fixed = match s {
            "generating_toc" => Some(Self::GeneratingToc),
            "toc_completed" => Some(Self::TocCompleted),
            "generating_introduction" => Some(Self::GeneratingIntroduction),
            "introduction_completed" => Some(Self::IntroductionCompleted),
            "generating_conclusion" => Some(Self::GeneratingConclusion),
            "conclusion_completed" => Some(Self::ConclusionCompleted),
            "generating_bibliography" => Some(Self::GeneratingBibliography),
            "bibliography_completed" => Some(Self::BibliographyCompleted),
            "assembling" => Some(Self::Assembling),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        };
        if let Some(status) = fixed {
            return Ok(status);
        }

        let chapter = s
            .strip_prefix("chapter_")
            .and_then(|rest| rest.split_once('_'))
            .and_then(|(num, suffix)| num.parse::<u32>().ok().map(|n| (n, suffix)));

        match chapter {
            Some((n, "generating")) => Ok(Self::ChapterGenerating(n)),
            Some((n, "completed")) => Ok(Self::ChapterCompleted(n)),
            _ => Err(PapermillError::parse(format!(
                "unknown AcademicStatus '{s}'"
            ))),
        }
    }
}

impl Serialize for AcademicStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AcademicStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
