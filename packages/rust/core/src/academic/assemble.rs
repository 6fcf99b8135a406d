//! Final document assembly and table-of-contents extraction.

use std::sync::LazyLock;

use regex::Regex;

use papermill_shared::{AcademicWork, SectionKind, TocChapter};
use papermill_text::headings_at_level;

use crate::labels::Labels;

/// Join the generated parts into one Markdown document.
///
/// Layout: title, table of contents, introduction, numbered chapters,
/// conclusion, bibliography. Headings inside the parts are pushed below
/// level 2 so the part headings stay the only `## ` lines.
pub fn assemble_document(topic: &str, labels: &Labels, work: &AcademicWork) -> String {
    let mut out = format!("# {}\n\n", topic.trim());

    out.push_str(&format!("## {}\n\n", labels.table_of_contents));
    out.push_str(work.toc_display.as_deref().unwrap_or_default().trim());
    out.push_str("\n\n");

    if let Some(intro) = work.part(SectionKind::Introduction) {
        push_part(&mut out, labels.introduction, intro.content_or_empty(), labels.introduction);
    }

    for chapter in work.chapters() {
        let heading = format!("{} {}. {}", labels.chapter, chapter.number, chapter.title);
        push_part(&mut out, &heading, chapter.content_or_empty(), &chapter.title);
    }

    if let Some(conclusion) = work.part(SectionKind::Conclusion) {
        push_part(
            &mut out,
            labels.conclusion,
            conclusion.content_or_empty(),
            labels.conclusion,
        );
    }

    if let Some(bibliography) = work.part(SectionKind::Bibliography) {
        push_part(
            &mut out,
            labels.bibliography,
            bibliography.content_or_empty(),
            labels.bibliography,
        );
    }

    out.trim_end().to_string() + "\n"
}

fn push_part(out: &mut String, heading: &str, body: &str, title: &str) {
    out.push_str(&format!("## {heading}\n\n"));
    let body = demote_headings(drop_repeated_title(body, title));
    let body = body.trim();
    if !body.is_empty() {
        out.push_str(body);
        out.push_str("\n\n");
    }
}

/// Remove a first-line heading that only repeats the part title.
fn drop_repeated_title<'a>(body: &'a str, title: &str) -> &'a str {
    let trimmed = body.trim_start();
    let (first, rest) = trimmed.split_once('\n').unwrap_or((trimmed, ""));
    let Some(heading) = first.strip_prefix('#') else {
        return body;
    };
    let heading = heading.trim_start_matches('#').trim().to_lowercase();
    let title = title.trim().to_lowercase();
    if !title.is_empty() && heading.contains(&title) {
        rest
    } else {
        body
    }
}

/// `#` and `##` headings become `###`.
fn demote_headings(body: &str) -> String {
    body.lines()
        .map(|line| {
            let hashes = line.chars().take_while(|&c| c == '#').count();
            if (1..=2).contains(&hashes) && line[hashes..].starts_with(' ') {
                format!("###{}", &line[hashes..])
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Chapters of an assembled document, read back from its level-2 headings.
///
/// Recognises the chapter label of every supported language, so a document
/// can be checked without knowing which language it was written in.
pub fn extract_table_of_contents(document: &str) -> Vec<TocChapter> {
    static CHAPTER_HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
        let labels = Labels::all()
            .iter()
            .map(|l| regex::escape(l.chapter))
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&format!(r"^(?:{labels})\s+(\d+)\.\s+(.+)$")).expect("valid regex")
    });

    let mut chapters = Vec::new();
    for heading in headings_at_level(document, 2) {
        let Some(caps) = CHAPTER_HEADING_RE.captures(heading.trim()) else {
            continue;
        };
        let Ok(number) = caps[1].parse::<u32>() else {
            continue;
        };
        chapters.push(TocChapter {
            number,
            title: caps[2].trim().to_string(),
            subsections: Vec::new(),
        });
    }
    chapters
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use papermill_shared::{
        AcademicSection, AcademicStatus, ChapterKind, RecordStatus, WorkType, new_id,
    };

    fn section(kind: SectionKind, number: u32, title: &str, content: &str) -> AcademicSection {
        AcademicSection {
            id: new_id(),
            academic_work_id: "w1".into(),
            kind,
            number,
            title: title.into(),
            chapter_kind: (kind == SectionKind::Chapter).then(|| ChapterKind::for_chapter(number)),
            content: Some(content.into()),
            prompt: None,
            char_count: content.chars().count(),
            tokens_in: 0,
            tokens_out: 0,
            duration_ms: 0,
            status: RecordStatus::Completed,
            error_message: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn work() -> AcademicWork {
        let toc = vec![
            TocChapter {
                number: 1,
                title: "Foundations".into(),
                subsections: vec!["Terms".into()],
            },
            TocChapter {
                number: 2,
                title: "Practice".into(),
                subsections: vec![],
            },
            TocChapter {
                number: 3,
                title: "Own research".into(),
                subsections: vec![],
            },
        ];
        AcademicWork {
            id: "w1".into(),
            work_item_id: "item".into(),
            work_type: WorkType::Bachelor,
            status: AcademicStatus::Assembling,
            toc_display: Some("Introduction\n1. Foundations\n2. Practice\n3. Own research".into()),
            toc_full: None,
            table_of_contents: toc,
            toc_prompt: None,
            toc_tokens_in: 0,
            toc_tokens_out: 0,
            toc_duration_ms: 0,
            toc_char_count: 0,
            final_char_count: 0,
            final_text: None,
            error_message: None,
            sections: vec![
                section(SectionKind::Chapter, 1, "Foundations", "## Foundations\n### 1.1. Terms\nText."),
                section(SectionKind::Chapter, 2, "Practice", "# Stray top heading\nCases."),
                section(SectionKind::Chapter, 3, "Own research", "Survey."),
                section(SectionKind::Introduction, 0, "Introduction", "Intro text."),
                section(SectionKind::Conclusion, 0, "Conclusion", "Closing."),
                section(SectionKind::Bibliography, 0, "Bibliography", "- Kowalski, A. (2020)."),
            ],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn document_layout() {
        let doc = assemble_document("Heat pumps", &Labels::for_language("en"), &work());
        let level2 = headings_at_level(&doc, 2);
        assert_eq!(
            level2,
            vec![
                "Table of Contents",
                "Introduction",
                "Chapter 1. Foundations",
                "Chapter 2. Practice",
                "Chapter 3. Own research",
                "Conclusion",
                "Bibliography",
            ]
        );
        assert!(doc.starts_with("# Heat pumps\n"));
        assert!(doc.contains("### Stray top heading"));
        assert!(doc.contains("### 1.1. Terms"));
        assert!(!doc.contains("## Foundations\n"));
    }

    #[test]
    fn toc_round_trips_through_the_document() {
        let work = work();
        for code in ["en", "pl"] {
            let doc = assemble_document("Heat pumps", &Labels::for_language(code), &work);
            let extracted = extract_table_of_contents(&doc);
            let expected: Vec<(u32, &str)> = work
                .table_of_contents
                .iter()
                .map(|c| (c.number, c.title.as_str()))
                .collect();
            let got: Vec<(u32, &str)> = extracted
                .iter()
                .map(|c| (c.number, c.title.as_str()))
                .collect();
            assert_eq!(got, expected, "language {code}");
        }
    }

    #[test]
    fn titles_ending_in_hash_survive_the_round_trip() {
        let mut work = work();
        work.table_of_contents[2].title = "Programming in C#".into();
        work.sections[2].title = "Programming in C#".into();

        let doc = assemble_document("Languages", &Labels::for_language("en"), &work);
        let titles: Vec<String> = extract_table_of_contents(&doc)
            .into_iter()
            .map(|c| c.title)
            .collect();
        assert_eq!(titles, vec!["Foundations", "Practice", "Programming in C#"]);
    }
}
