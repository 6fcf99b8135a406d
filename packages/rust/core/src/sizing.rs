//! Length arithmetic: header counts, section budgets, token caps.

use papermill_shared::{GenerationConfig, WorkType};

/// Rough characters per output token, on the low side for Polish text.
const CHARS_PER_TOKEN: u32 = 3;

/// Headroom added to every output cap.
const TOKEN_HEADROOM: u32 = 256;

/// One header per `chars_per_header` characters, clamped to the configured
/// floor and cap.
pub fn header_count(target_length: u32, config: &GenerationConfig) -> u32 {
    let per = config.chars_per_header.max(1);
    let raw = (f64::from(target_length) / f64::from(per)).round() as u32;
    raw.clamp(config.min_headers, config.max_headers.max(config.min_headers))
}

/// Characters available to each section of a generic document.
pub fn section_budget(target_length: u32, headers: u32) -> u32 {
    target_length / headers.max(1)
}

/// Output token cap for a text of `chars` characters plus tolerance.
pub fn output_tokens_for(chars: u32, tolerance: f64) -> u32 {
    let upper = (f64::from(chars) * (1.0 + tolerance)).ceil() as u32;
    upper / CHARS_PER_TOKEN + TOKEN_HEADROOM
}

/// Upper edge of the accepted length window.
pub fn upper_bound(chars: u32, tolerance: f64) -> u32 {
    (f64::from(chars) * (1.0 + tolerance)).round() as u32
}

/// Character budget of each part of an academic work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcademicBudget {
    pub introduction: u32,
    pub conclusion: u32,
    pub per_chapter: u32,
}

impl AcademicBudget {
    /// Introduction 8%, conclusion 7%, the rest split evenly over chapters.
    pub fn split(target_length: u32, work_type: WorkType) -> Self {
        let total = f64::from(target_length);
        let introduction = (total * 0.08).round() as u32;
        let conclusion = (total * 0.07).round() as u32;
        let chapters = (total * 0.85).round() as u32;
        Self {
            introduction,
            conclusion,
            per_chapter: chapters / work_type.chapter_count().max(1),
        }
    }
}
