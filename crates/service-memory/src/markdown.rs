//! Markdown export.

use crate::document::{Block, Document};

/// Renders the document body as Markdown.
///
/// Headings become `#` repeated by level, lists `-` or `1.` items, tables
/// pipe tables whose first row is the header, and page breaks `---`. The
/// header and footer are page furniture and are left out. Blocks are
/// separated by a blank line.
#[must_use]
pub fn to_markdown(document: &Document) -> String {
    let mut blocks = Vec::with_capacity(document.blocks.len());

    for block in &document.blocks {
        let rendered = match block {
            Block::Heading { text, level } => {
                format!("{} {}", "#".repeat(usize::from(*level)), inline(text))
            }
            Block::Paragraph { text, style } => {
                match style.as_ref().and_then(|style| style.ordered) {
                    Some(true) => format!("1. {}", inline(text)),
                    Some(false) => format!("- {}", inline(text)),
                    None => inline(text),
                }
            }
            Block::Table { rows } if rows.is_empty() => continue,
            Block::Table { rows } => table(rows),
            Block::List { items, ordered } => items
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    if *ordered {
                        format!("{}. {}", index + 1, inline(item))
                    } else {
                        format!("- {}", inline(item))
                    }
                })
                .collect::<Vec<_>>()
                .join("\n"),
            Block::PageBreak => "---".to_string(),
        };
        blocks.push(rendered);
    }

    let mut markdown = blocks.join("\n\n");
    if !markdown.is_empty() {
        markdown.push('\n');
    }
    markdown
}

/// Collapses line breaks so one block stays one Markdown element.
fn inline(text: &str) -> String {
    text.lines().collect::<Vec<_>>().join(" ")
}

fn cell(text: &str) -> String {
    inline(text).replace('|', "\\|")
}

fn table(rows: &[Vec<String>]) -> String {
    let columns = rows.iter().map(Vec::len).max().unwrap_or(0).max(1);

    let row = |cells: &[String]| {
        let mut line = String::from("|");
        for index in 0..columns {
            line.push(' ');
            line.push_str(&cells.get(index).map(|text| cell(text)).unwrap_or_default());
            line.push_str(" |");
        }
        line
    };

    let Some((header, body)) = rows.split_first() else {
        return String::new();
    };

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(row(header));
    lines.push(format!("|{}", " --- |".repeat(columns)));
    lines.extend(body.iter().map(|cells| row(cells)));
    lines.join("\n")
}
