//! The in-memory document model.

use chrono::{DateTime, Utc};
use docflow_protocol::{OutlineEntry, Statistics, Style, TextMatch};
use serde::{Deserialize, Serialize};

/// Words per minute used for reading-time estimates.
const READING_SPEED_WPM: usize = 200;

/// Bytes of context kept on each side of a search match.
const MATCH_CONTEXT: usize = 50;

/// One body element.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Block {
    /// A heading at level 1 through 9.
    Heading {
        /// Heading text.
        text: String,
        /// Outline level.
        level: u8,
    },

    /// A paragraph of body text.
    Paragraph {
        /// Paragraph text.
        text: String,
        /// Formatting overrides for this paragraph only.
        style: Option<Style>,
    },

    /// A table; rows may differ in length.
    Table {
        /// Cell text, row by row.
        rows: Vec<Vec<String>>,
    },

    /// A bulleted or numbered list.
    List {
        /// Item text in order.
        items: Vec<String>,
        /// Numbered if true.
        ordered: bool,
    },

    /// Starts a new page.
    PageBreak,
}

/// A document held by the service.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct Document {
    /// Body blocks in order.
    pub blocks: Vec<Block>,
    /// Text repeated at the top of every page.
    pub header: Option<String>,
    /// Text repeated at the bottom of every page.
    pub footer: Option<String>,
    /// Author property.
    pub author: Option<String>,
    /// Subject property.
    pub subject: Option<String>,
    /// When the document was first created.
    pub created_at: DateTime<Utc>,
    /// When the content last changed.
    pub modified_at: DateTime<Utc>,
}

impl Document {
    /// Creates an empty document.
    #[must_use]
    pub fn new(author: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            blocks: Vec::new(),
            header: None,
            footer: None,
            author,
            subject: None,
            created_at: now,
            modified_at: now,
        }
    }

    /// Appends a body block.
    pub fn push(&mut self, block: Block) {
        self.blocks.push(block);
        self.touch();
    }

    /// Replaces the header text.
    pub fn set_header(&mut self, text: String) {
        self.header = Some(text);
        self.touch();
    }

    /// Replaces the footer text.
    pub fn set_footer(&mut self, text: String) {
        self.footer = Some(text);
        self.touch();
    }

    /// Replaces every non-overlapping occurrence of `find` in every text
    /// run, header and footer included, and returns how many were replaced.
    ///
    /// Matching is case-sensitive and never spans two runs. With no matches
    /// the document is left untouched.
    pub fn replace_all(&mut self, find: &str, replace: &str) -> usize {
        if find.is_empty() {
            return 0;
        }

        let mut count = 0;
        for run in self.runs_mut() {
            let found = run.matches(find).count();
            if found > 0 {
                *run = run.replace(find, replace);
                count += found;
            }
        }

        if count > 0 {
            self.touch();
        }
        count
    }

    /// Plain text of the body in document order.
    ///
    /// One line per heading, paragraph, list item and table row; table
    /// cells are separated by a tab. Page breaks, header and footer add no
    /// text.
    #[must_use]
    pub fn extract_text(&self) -> String {
        self.text_lines().join("\n")
    }

    /// Body text lines, as joined by [`Document::extract_text`].
    #[must_use]
    pub fn text_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for block in &self.blocks {
            match block {
                Block::Heading { text, .. } | Block::Paragraph { text, .. } => {
                    lines.push(text.clone());
                }
                Block::Table { rows } => lines.extend(rows.iter().map(|row| row.join("\t"))),
                Block::List { items, .. } => lines.extend(items.iter().cloned()),
                Block::PageBreak => {}
            }
        }
        lines
    }

    /// Number of pages: one plus one per page break.
    #[must_use]
    pub fn page_count(&self) -> usize {
        1 + self
            .blocks
            .iter()
            .filter(|block| matches!(block, Block::PageBreak))
            .count()
    }

    /// The first level-1 heading, else the first heading of any level.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        let mut first = None;
        for block in &self.blocks {
            if let Block::Heading { text, level } = block {
                if *level == 1 {
                    return Some(text.as_str());
                }
                first.get_or_insert(text.as_str());
            }
        }
        first
    }

    /// Whitespace-separated words in the extracted text.
    #[must_use]
    pub fn word_count(&self) -> usize {
        self.extract_text().split_whitespace().count()
    }

    /// Counts over the extracted text.
    #[must_use]
    pub fn statistics(&self) -> Statistics {
        let text = self.extract_text();
        let words = text.split_whitespace().count();

        Statistics {
            words,
            characters: text.chars().count(),
            characters_no_spaces: text.chars().filter(|c| !c.is_whitespace()).count(),
            paragraphs: text.lines().filter(|line| !line.trim().is_empty()).count(),
            sentences: text
                .chars()
                .filter(|c| matches!(c, '.' | '!' | '?'))
                .count(),
            pages: self.page_count(),
            reading_time_minutes: words.div_ceil(READING_SPEED_WPM),
        }
    }

    /// Non-overlapping occurrences of `term` in the extracted text.
    ///
    /// With `whole_word`, an occurrence only counts when the characters on
    /// either side of it are not word characters.
    #[must_use]
    pub fn search(&self, term: &str, case_sensitive: bool, whole_word: bool) -> Vec<TextMatch> {
        let text = self.extract_text();
        let mut matches = Vec::new();
        if term.is_empty() {
            return matches;
        }

        let mut line = 1;
        let mut position = 0;
        while position < text.len() {
            let rest = &text[position..];
            let found = match_len(rest, term, case_sensitive)
                .filter(|&len| !whole_word || is_whole_word(&text, position, position + len));
            let advance = match found {
                Some(len) => {
                    matches.push(TextMatch {
                        position,
                        line,
                        context: context(&text, position, position + len).to_string(),
                    });
                    len
                }
                None => rest.chars().next().map_or(1, char::len_utf8),
            };
            line += text[position..position + advance].matches('\n').count();
            position += advance;
        }

        matches
    }

    /// Headings in document order, each with the number of blocks up to
    /// the next heading.
    #[must_use]
    pub fn outline(&self) -> Vec<OutlineEntry> {
        let mut outline: Vec<OutlineEntry> = Vec::new();
        for (index, block) in self.blocks.iter().enumerate() {
            match block {
                Block::Heading { text, level } => outline.push(OutlineEntry {
                    level: *level,
                    text: text.clone(),
                    block: index,
                    section_blocks: 0,
                }),
                _ => {
                    if let Some(current) = outline.last_mut() {
                        current.section_blocks += 1;
                    }
                }
            }
        }
        outline
    }

    fn runs_mut(&mut self) -> Vec<&mut String> {
        let mut runs = Vec::new();
        for block in &mut self.blocks {
            match block {
                Block::Heading { text, .. } | Block::Paragraph { text, .. } => runs.push(text),
                Block::Table { rows } => runs.extend(rows.iter_mut().flatten()),
                Block::List { items, .. } => runs.extend(items.iter_mut()),
                Block::PageBreak => {}
            }
        }
        runs.extend(self.header.iter_mut());
        runs.extend(self.footer.iter_mut());
        runs
    }

    fn touch(&mut self) {
        self.modified_at = Utc::now();
    }
}

/// Byte length of `needle` matched at the start of `haystack`, if it matches.
fn match_len(haystack: &str, needle: &str, case_sensitive: bool) -> Option<usize> {
    if case_sensitive {
        return haystack.starts_with(needle).then_some(needle.len());
    }

    let mut chars = haystack.char_indices();
    for expected in needle.chars() {
        let (_, actual) = chars.next()?;
        if !actual.to_lowercase().eq(expected.to_lowercase()) {
            return None;
        }
    }
    Some(chars.next().map_or(haystack.len(), |(index, _)| index))
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Whether `start..end` is not preceded or followed by a word character.
fn is_whole_word(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
}

/// Up to [`MATCH_CONTEXT`] bytes around `start..end`, widened to char
/// boundaries.
fn context(text: &str, start: usize, end: usize) -> &str {
    let mut from = start.saturating_sub(MATCH_CONTEXT);
    while !text.is_char_boundary(from) {
        from -= 1;
    }
    let mut to = (end + MATCH_CONTEXT).min(text.len());
    while !text.is_char_boundary(to) {
        to += 1;
    }
    &text[from..to]
}
