//! Table of contents: prompt, parsing and display rendering.

use std::sync::LazyLock;

use regex::Regex;

use papermill_shared::{ChapterKind, PapermillError, Result, TocChapter, WorkItem, WorkType};

use crate::labels::{Labels, content_kind_name};
use crate::prompt::{brief, strip_code_fence};

pub(crate) fn build_prompt(item: &WorkItem, work_type: WorkType, sources: &str) -> String {
    let chapters = work_type.chapter_count();
    let roles = (1..=chapters)
        .map(|n| format!("- Chapter {n}: {}", chapter_role(ChapterKind::for_chapter(n))))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Create the table of contents of a {kind} titled \"{topic}\".\n\
         {brief}\n\
         The thesis has exactly {chapters} chapters, plus an introduction, a conclusion and a \
         bibliography that are not numbered.\n\
         Chapter roles:\n{roles}\n\n\
         Give each chapter 2 to 4 subsections. Use this format and nothing else:\n\
         1. Chapter title\n\
         1.1. Subsection title\n\
         1.2. Subsection title\n\
         Description: one sentence on what the chapter covers\n\n\
         Available sources:\n{sources}\n",
        kind = content_kind_name(item.content_kind),
        topic = item.topic,
        brief = brief(item),
    )
}

pub(crate) fn chapter_role(kind: ChapterKind) -> &'static str {
    match kind {
        ChapterKind::Theory => "theoretical: concepts, definitions and the state of research",
        ChapterKind::TheoryAndPractice => {
            "theoretical and practical: theory applied to real cases and practice"
        }
        ChapterKind::Empirical => {
            "empirical: research methodology, the author's own study and its results"
        }
    }
}

/// Parse a table-of-contents answer into exactly `expected` chapters.
///
/// Chapter lines look like `1. Title` (optionally prefixed with a heading
/// marker or a "Chapter"/"Rozdział" label), subsection lines like
/// `1.1. Title`. Chapters are renumbered in order of appearance; extra
/// chapters are dropped, missing ones are an error.
pub fn parse_toc(answer: &str, expected: u32) -> Result<Vec<TocChapter>> {
    static SUB_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^(?:#{1,6}\s*)?[-*]?\s*(\d+)\.(\d+)\.?\s+(.+)$").expect("valid regex")
    });
    static CHAPTER_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)^(?:#{1,6}\s*)?(?:(?:chapter|rozdział)\s+)?(\d+)[.:)]?\s+(.+)$")
            .expect("valid regex")
    });

    let mut chapters: Vec<TocChapter> = Vec::new();

    for line in strip_code_fence(answer).lines() {
        let line = line.trim().replace("**", "");
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(caps) = SUB_RE.captures(line) {
            if let Some(current) = chapters.last_mut() {
                current.subsections.push(clean_title(&caps[3]));
            }
            continue;
        }

        if let Some(caps) = CHAPTER_RE.captures(line) {
            let title = clean_title(&caps[2]);
            if !title.is_empty() {
                chapters.push(TocChapter {
                    number: chapters.len() as u32 + 1,
                    title,
                    subsections: Vec::new(),
                });
            }
        }
    }

    if chapters.len() < expected as usize {
        return Err(PapermillError::validation(format!(
            "table of contents has {} chapters, expected {expected}",
            chapters.len()
        )));
    }
    chapters.truncate(expected as usize);
    Ok(chapters)
}

fn clean_title(raw: &str) -> String {
    raw.trim()
        .trim_end_matches(':')
        .trim_matches(|c| c == '"' || c == '*')
        .trim()
        .to_string()
}

/// Detailed version fed to the chapter prompts: every chapter with its
/// role and subsections.
pub fn render_full(chapters: &[TocChapter]) -> String {
    chapters
        .iter()
        .map(|chapter| {
            let mut block = format!(
                "{}. {} ({})",
                chapter.number,
                chapter.title,
                chapter_role(ChapterKind::for_chapter(chapter.number))
            );
            for (i, sub) in chapter.subsections.iter().enumerate() {
                block.push_str(&format!("\n   {}.{}. {sub}", chapter.number, i + 1));
            }
            block
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Display version: unnumbered parts around numbered chapters.
pub fn render_display(chapters: &[TocChapter], labels: &Labels) -> String {
    let mut out = vec![labels.introduction.to_string()];
    for chapter in chapters {
        out.push(format!("{}. {}", chapter.number, chapter.title));
        for (i, sub) in chapter.subsections.iter().enumerate() {
            out.push(format!("   {}.{}. {sub}", chapter.number, i + 1));
        }
    }
    out.push(labels.conclusion.to_string());
    out.push(labels.bibliography.to_string());
    out.join("\n")
}
