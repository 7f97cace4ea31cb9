//! Serialize [`Block`]s back to Markdown text.

use docs2md_shared::{Block, ReferenceStyle};

use crate::inline::{render_inline, render_reference};
use crate::mdx::longest_backtick_run;

/// Render blocks as Markdown. Blocks are separated by a blank line, except
/// consecutive list items which stay on adjacent lines.
pub fn render_blocks(blocks: &[Block]) -> String {
    let mut out = String::new();
    // Content column of each open list level.
    let mut list_columns: Vec<usize> = Vec::new();
    let mut prev_was_item = false;

    for block in blocks {
        let is_item = matches!(block, Block::ListItem { .. });
        if !out.is_empty() {
            out.push_str(if is_item && prev_was_item { "\n" } else { "\n\n" });
        }
        if !is_item {
            list_columns.clear();
        }
        render_block(block, &mut list_columns, &mut out);
        prev_was_item = is_item;
    }

    if !out.is_empty() {
        out.push('\n');
    }
    out
}

fn render_block(block: &Block, list_columns: &mut Vec<usize>, out: &mut String) {
    match block {
        Block::Heading { level, text } => {
            let level = (*level).clamp(1, 6) as usize;
            out.push_str(&"#".repeat(level));
            out.push(' ');
            out.push_str(text);
        }
        Block::Paragraph { spans } => render_inline(spans, out),
        Block::CodeFence { language, text } => {
            let fence = "`".repeat((longest_backtick_run(text) + 1).max(3));
            out.push_str(&fence);
            if let Some(lang) = language {
                out.push_str(lang);
            }
            out.push('\n');
            if !text.is_empty() {
                out.push_str(text);
                out.push('\n');
            }
            out.push_str(&fence);
        }
        Block::Resource { reference } => match &reference.style {
            ReferenceStyle::Inline | ReferenceStyle::HtmlAttribute => render_reference(reference, out),
            ReferenceStyle::Definition(label) => {
                out.push('[');
                out.push_str(label);
                out.push_str("]: ");
                out.push_str(&reference.target);
                if let Some(title) = &reference.title {
                    out.push_str(" \"");
                    out.push_str(title);
                    out.push('"');
                }
            }
        },
        Block::ListItem { depth, marker, spans } => {
            list_columns.truncate(*depth);
            while list_columns.len() < *depth {
                let pad = list_columns.last().copied().unwrap_or(0) + 2;
                list_columns.push(pad);
            }
            let indent = list_columns.last().copied().unwrap_or(0);
            let content_column = indent + marker.chars().count() + 1;
            list_columns.push(content_column);

            let mut body = String::new();
            render_inline(spans, &mut body);

            out.push_str(&" ".repeat(indent));
            out.push_str(marker);
            let mut lines = body.split('\n');
            if let Some(first) = lines.next() {
                if !first.is_empty() {
                    out.push(' ');
                    out.push_str(first);
                }
            }
            for line in lines {
                out.push('\n');
                if !line.is_empty() {
                    out.push_str(&" ".repeat(content_column));
                    out.push_str(line);
                }
            }
        }
        Block::Html { spans } => render_inline(spans, out),
        Block::Raw { text } => out.push_str(text),
    }
}
