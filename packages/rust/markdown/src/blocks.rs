//! Line-based Markdown block parser.
//!
//! Produces the common [`Block`] model. Fenced code is kept verbatim, comments
//! and thematic breaks pass through as [`Block::Raw`], HTML blocks keep their
//! `href`/`src` values as references, and every other run of text is split
//! into inline spans so references can be resolved.

use std::sync::LazyLock;

use regex::Regex;

use docs2md_shared::{Block, ReferenceKind, ReferenceStyle, ResourceReference};

use crate::NormalizationWarning;
use crate::inline::{parse_html, parse_inline, standalone_reference};

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([ \t]*)(`{3,}|~{3,})(.*)$").expect("valid regex"));

static ATX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ {0,3}(#{1,6})(?:[ \t]+(.*?))?[ \t]*$").expect("valid regex")
});

static SETEXT_H1_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}=+[ \t]*$").expect("valid regex"));

static SETEXT_H2_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}-+[ \t]*$").expect("valid regex"));

static THEMATIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ {0,3}(?:(?:-[ \t]*){3,}|(?:\*[ \t]*){3,}|(?:_[ \t]*){3,})$").expect("valid regex")
});

static LIST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([ \t]*)([-*+]|\d{1,9}[.)])(?:[ \t]+(.*))?$").expect("valid regex")
});

static DEFINITION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^ {0,3}\[([^\]]+)\]:[ \t]*<?([^\s>]+)>?(?:[ \t]+(?:"([^"]*)"|'([^']*)'|\(([^)]*)\)))?[ \t]*$"#,
    )
    .expect("valid regex")
});

static HTML_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}<[A-Za-z/!?]").expect("valid regex"));

/// Parse Markdown text into blocks, appending any warnings.
pub(crate) fn parse_blocks(text: &str, warnings: &mut Vec<NormalizationWarning>) -> Vec<Block> {
    let lines: Vec<&str> = text.lines().collect();
    let mut builder = BlockBuilder::default();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i].trim_end();

        if line.trim().is_empty() {
            builder.flush();
            i += 1;
            continue;
        }

        // Fenced code
        if let Some(fence) = open_fence(line) {
            builder.flush();
            if fence.indent == 0 {
                builder.list_indents.clear();
            }
            match (i + 1..lines.len()).find(|&j| fence.closes(lines[j])) {
                Some(close) => {
                    builder.blocks.push(Block::CodeFence {
                        language: fence.language,
                        text: lines[i + 1..close].join("\n"),
                    });
                    i = close + 1;
                }
                None => {
                    warnings.push(NormalizationWarning::UnbalancedFence { line: i + 1 });
                    let mut raw = lines[i..].join("\n");
                    raw.push('\n');
                    raw.push_str(&fence.marker);
                    builder.blocks.push(Block::Raw { text: raw });
                    i = lines.len();
                }
            }
            continue;
        }

        // ATX heading
        if let Some(caps) = ATX_RE.captures(line) {
            builder.flush();
            builder.list_indents.clear();
            let level = caps[1].len() as u8;
            let text = strip_closing_hashes(caps.get(2).map_or("", |m| m.as_str()));
            builder.blocks.push(Block::Heading {
                level,
                text: text.to_string(),
            });
            i += 1;
            continue;
        }

        // Setext heading underline
        if !builder.paragraph.is_empty() && builder.list_item.is_none() {
            let level = if SETEXT_H1_RE.is_match(line) {
                Some(1)
            } else if SETEXT_H2_RE.is_match(line) {
                Some(2)
            } else {
                None
            };
            if let Some(level) = level {
                let text = builder
                    .paragraph
                    .iter()
                    .map(|l| l.trim())
                    .collect::<Vec<_>>()
                    .join(" ");
                builder.paragraph.clear();
                builder.blocks.push(Block::Heading { level, text });
                i += 1;
                continue;
            }
        }

        // Thematic break
        if THEMATIC_RE.is_match(line) {
            builder.flush();
            builder.list_indents.clear();
            builder.blocks.push(Block::raw(line.trim()));
            i += 1;
            continue;
        }

        // Leftover directive lines
        if line.trim_start().starts_with(":::") {
            builder.flush();
            builder.blocks.push(Block::raw(line.trim()));
            i += 1;
            continue;
        }

        // HTML block
        if HTML_START_RE.is_match(line) {
            builder.flush();
            let (raw, next) = collect_html_block(&lines, i);
            if raw.trim_start().starts_with("<!--") {
                builder.blocks.push(Block::Raw { text: raw });
            } else {
                builder.blocks.push(Block::Html {
                    spans: parse_html(&raw),
                });
            }
            i = next;
            continue;
        }

        // List item
        if let Some(caps) = LIST_RE.captures(line) {
            builder.flush();
            let indent = indent_width(&caps[1]);
            let depth = list_depth(&mut builder.list_indents, indent);
            builder.list_item = Some(PendingItem {
                depth,
                marker: caps[2].to_string(),
                text: caps.get(3).map_or("", |m| m.as_str()).to_string(),
            });
            i += 1;
            continue;
        }

        // Link reference definition
        if builder.paragraph.is_empty() {
            if let Some(block) = definition(line) {
                builder.flush();
                builder.blocks.push(block);
                i += 1;
                continue;
            }
        }

        // Continuation of the current list item
        if let Some(item) = builder.list_item.as_mut() {
            item.text.push('\n');
            item.text.push_str(line.trim_start());
            i += 1;
            continue;
        }

        if indent_width(line) == 0 {
            builder.list_indents.clear();
        }
        builder.paragraph.push(line.to_string());
        i += 1;
    }

    builder.flush();
    builder.blocks
}

// ---------------------------------------------------------------------------
// Builder state
// ---------------------------------------------------------------------------

struct PendingItem {
    depth: usize,
    marker: String,
    text: String,
}

#[derive(Default)]
struct BlockBuilder {
    blocks: Vec<Block>,
    paragraph: Vec<String>,
    list_item: Option<PendingItem>,
    /// Indentation of each open list level, outermost first.
    list_indents: Vec<usize>,
}

impl BlockBuilder {
    fn flush(&mut self) {
        if let Some(item) = self.list_item.take() {
            self.blocks.push(Block::ListItem {
                depth: item.depth,
                marker: item.marker,
                spans: parse_inline(&item.text),
            });
        }

        if self.paragraph.is_empty() {
            return;
        }
        let lines = std::mem::take(&mut self.paragraph);
        if lines.len() == 1 {
            if let Some(reference) = standalone_reference(&lines[0]) {
                self.blocks.push(Block::Resource { reference });
                return;
            }
        }
        self.blocks.push(Block::Paragraph {
            spans: parse_inline(&lines.join("\n")),
        });
    }
}

// ---------------------------------------------------------------------------
// Fences
// ---------------------------------------------------------------------------

struct OpenFence {
    indent: usize,
    ch: char,
    len: usize,
    marker: String,
    language: Option<String>,
}

impl OpenFence {
    fn closes(&self, line: &str) -> bool {
        let trimmed = line.trim();
        let run = trimmed.chars().take_while(|&c| c == self.ch).count();
        run >= self.len && run == trimmed.chars().count()
    }
}

fn open_fence(line: &str) -> Option<OpenFence> {
    let caps = FENCE_RE.captures(line)?;
    let marker = caps[2].to_string();
    let info = caps[3].trim();
    let ch = marker.chars().next()?;
    if ch == '`' && info.contains('`') {
        return None;
    }
    let language = info
        .split_whitespace()
        .next()
        .map(|l| l.trim_start_matches('{').trim_end_matches('}'))
        .filter(|l| !l.is_empty())
        .map(String::from);
    Some(OpenFence {
        indent: indent_width(&caps[1]),
        ch,
        len: marker.chars().count(),
        marker,
        language,
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn strip_closing_hashes(text: &str) -> &str {
    let text = text.trim();
    let stripped = text.trim_end_matches('#');
    if stripped.len() == text.len() {
        return text;
    }
    if stripped.is_empty() || stripped.ends_with([' ', '\t']) {
        stripped.trim_end()
    } else {
        text
    }
}

fn definition(line: &str) -> Option<Block> {
    let caps = DEFINITION_RE.captures(line)?;
    let label = caps[1].to_string();
    if label.starts_with('^') {
        return None;
    }
    let mut reference = ResourceReference::new(ReferenceKind::Link, &caps[2], label.clone());
    reference.title = caps
        .get(3)
        .or_else(|| caps.get(4))
        .or_else(|| caps.get(5))
        .map(|m| m.as_str().to_string());
    reference.style = ReferenceStyle::Definition(label);
    Some(Block::Resource { reference })
}

/// Collect an HTML block starting at `start`. Comments run to `-->`, other
/// blocks to the next blank line. Returns the text and the next line index.
fn collect_html_block(lines: &[&str], start: usize) -> (String, usize) {
    let is_comment = lines[start].trim_start().starts_with("<!--");
    let mut end = start;

    while end < lines.len() {
        let line = lines[end];
        if is_comment {
            end += 1;
            if line.contains("-->") {
                break;
            }
        } else {
            if line.trim().is_empty() {
                break;
            }
            end += 1;
        }
    }

    let text = lines[start..end]
        .iter()
        .map(|l| l.trim_end())
        .collect::<Vec<_>>()
        .join("\n");
    (text, end)
}

fn indent_width(s: &str) -> usize {
    s.chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

fn list_depth(stack: &mut Vec<usize>, indent: usize) -> usize {
    while stack.last().is_some_and(|&top| indent < top) {
        stack.pop();
    }
    match stack.last() {
        // Within two columns of the current level counts as a sibling.
        Some(&top) if indent < top + 2 => {}
        _ => stack.push(indent),
    }
    stack.len() - 1
}
