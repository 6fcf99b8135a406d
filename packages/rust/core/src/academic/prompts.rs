//! Prompts for the academic sub-stages.

use papermill_shared::{AcademicWork, ChapterKind, TocChapter, WorkItem};
use papermill_text::truncate_chars;

use crate::labels::content_kind_name;
use crate::prompt::brief;

/// Characters of each earlier chapter's ending shown to the next chapter.
const CONTINUITY_CHARS: usize = 1200;

/// Characters of each chapter's opening or ending shown to the
/// introduction and conclusion.
const EXCERPT_CHARS: usize = 800;

const INTRODUCTION_EXCERPT_CHARS: usize = 2000;

const CITATION_RULE: &str = "Cite sources in the text as (Surname, Year) or \
     (Surname et al., Year). Only cite works that appear in the sources.";

pub(crate) struct ChapterPrompt<'a> {
    pub item: &'a WorkItem,
    pub work: &'a AcademicWork,
    pub chapter: &'a TocChapter,
    pub kind: ChapterKind,
    pub budget: u32,
    pub upper: u32,
    pub sources: &'a str,
}

impl ChapterPrompt<'_> {
    pub fn render(&self) -> String {
        let subsections = self
            .chapter
            .subsections
            .iter()
            .enumerate()
            .map(|(i, s)| format!("### {}.{}. {s}", self.chapter.number, i + 1))
            .collect::<Vec<_>>()
            .join("\n");

        let mut prompt = format!(
            "You are writing chapter {number} of a {kind} titled \"{topic}\".\n\
             {brief}\n\
             Chapter title: {title}\n\
             Chapter type: {kind_rule}\n\
             Target length: {budget} characters, at most {upper}.\n\n\
             Full table of contents of the thesis:\n{toc}\n\n\
             Write the chapter body with these subsection headings:\n{subsections}\n\n\
             Do not repeat the chapter title. {CITATION_RULE}\n",
            number = self.chapter.number,
            kind = content_kind_name(self.item.content_kind),
            topic = self.item.topic,
            brief = brief(self.item),
            title = self.chapter.title,
            kind_rule = chapter_rule(self.kind),
            budget = self.budget,
            upper = self.upper,
            toc = self.work.toc_full.as_deref().unwrap_or_default(),
        );

        let earlier: Vec<String> = self
            .work
            .chapters()
            .filter(|c| c.number < self.chapter.number && c.is_completed())
            .map(|c| {
                format!(
                    "Chapter {} ({}) ends with:\n...{}",
                    c.number,
                    c.title,
                    tail_chars(c.content_or_empty(), CONTINUITY_CHARS)
                )
            })
            .collect();
        if !earlier.is_empty() {
            prompt.push_str(&format!(
                "\nContinue the line of argument of the earlier chapters:\n{}\n",
                earlier.join("\n\n")
            ));
        }

        prompt.push_str(&format!("\nSources:\n{}\n", self.sources));
        prompt
    }
}

fn chapter_rule(kind: ChapterKind) -> &'static str {
    match kind {
        ChapterKind::Theory => {
            "THEORETICAL. Present concepts, definitions and the current state of research. \
             Do not describe any study of your own."
        }
        ChapterKind::TheoryAndPractice => {
            "THEORETICAL AND PRACTICAL. Connect the theory with practice through real cases, \
             examples and applications."
        }
        ChapterKind::Empirical => {
            "EMPIRICAL. Describe the research problem, hypotheses, methods, tools and sample, \
             then present and discuss the results of the study."
        }
    }
}

pub(crate) fn introduction(item: &WorkItem, work: &AcademicWork, budget: u32) -> String {
    let openings = work
        .chapters()
        .map(|c| {
            format!(
                "Chapter {} ({}) opens with:\n{}...",
                c.number,
                c.title,
                truncate_chars(c.content_or_empty(), EXCERPT_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Write the introduction of a {kind} titled \"{topic}\".\n\
         {brief}\n\
         Target length: {budget} characters.\n\
         Present the subject, the aim of the work, the research questions and the methods, \
         and briefly describe what each chapter contains. {CITATION_RULE}\n\n\
         Table of contents:\n{toc}\n\n\
         {openings}\n",
        kind = content_kind_name(item.content_kind),
        topic = item.topic,
        brief = brief(item),
        toc = work.toc_full.as_deref().unwrap_or_default(),
    )
}

pub(crate) fn conclusion(
    item: &WorkItem,
    work: &AcademicWork,
    introduction: &str,
    budget: u32,
) -> String {
    let endings = work
        .chapters()
        .map(|c| {
            format!(
                "Chapter {} ({}) ends with:\n...{}",
                c.number,
                c.title,
                tail_chars(c.content_or_empty(), EXCERPT_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Write the conclusion of a {kind} titled \"{topic}\".\n\
         {brief}\n\
         Target length: {budget} characters.\n\
         Answer the aims and research questions stated in the introduction, summarize the \
         findings of each chapter and point to further research. Do not introduce new \
         material.\n\n\
         Introduction:\n{intro}\n\n\
         {endings}\n",
        kind = content_kind_name(item.content_kind),
        topic = item.topic,
        brief = brief(item),
        intro = truncate_chars(introduction, INTRODUCTION_EXCERPT_CHARS),
    )
}

pub(crate) fn bibliography(item: &WorkItem, citations: &[String], sources: &str) -> String {
    format!(
        "Format the bibliography of a thesis written in the language with code \"{language}\".\n\
         The text cites these works:\n{cited}\n\n\
         Write one full bibliography entry per cited work (author, year, title, publisher or \
         URL), using the sources below for details. One entry per line, no numbering, no \
         commentary.\n\n\
         Sources:\n{sources}\n",
        language = item.language,
        cited = citations
            .iter()
            .map(|c| format!("- {c}"))
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

/// Last `max_chars` characters of `s`.
pub(crate) fn tail_chars(s: &str, max_chars: usize) -> &str {
    let total = s.chars().count();
    if total <= max_chars {
        return s;
    }
    match s.char_indices().nth(total - max_chars) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_is_char_safe() {
        assert_eq!(tail_chars("zażółć", 3), "ółć");
        assert_eq!(tail_chars("abc", 10), "abc");
        assert_eq!(tail_chars("", 2), "");
    }
}
