//! Line fixes applied to Markdown converted from HTML, before block parsing.
//!
//! Blank-line runs, trailing whitespace and heading spacing are handled by
//! the block parser, so only converter artifacts are repaired here. Lines
//! inside fenced code are never touched.

use std::sync::LazyLock;

use regex::Regex;

/// Self-link that doc generators append to headings, e.g.
/// `[​](#install "Direct link to Install")` or `[¶](#usage)`.
static PERMALINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\s*\[(?:\x{200B}|#|¶|\\#)?\]\(#[^)\s]*(?:\s+"[^"]*")?\)\s*$"#).expect("valid regex")
});

/// Fence opener whose info string is a highlighter class (`language-js`).
static FENCE_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([ \t]*(?:`{3,}|~{3,}))(?:language-|lang-|highlight-|hljs-)([\w+#.-]+)").expect("valid regex")
});

/// Layout wrappers with no Markdown meaning.
static WRAPPER_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"</?(?:div|span|section|article|aside|header|footer|figure|figcaption|main|nav)(?:\s[^>]*)?>")
        .expect("valid regex")
});

/// Repair converter output line by line.
pub(crate) fn run_pipeline(md: &str) -> String {
    let mut out = Vec::new();
    let mut fence: Option<(char, usize)> = None;

    for line in md.lines() {
        let marker = fence_marker(line);
        match (fence, marker) {
            (Some((ch, len)), Some((c, n))) if c == ch && n >= len && is_bare_fence(line) => {
                fence = None;
                out.push(line.to_string());
            }
            (Some(_), _) => out.push(line.to_string()),
            (None, Some(open)) => {
                fence = Some(open);
                out.push(FENCE_CLASS_RE.replace(line, "$1$2").into_owned());
            }
            (None, None) => out.push(repair_text_line(line)),
        }
    }

    out.join("\n")
}

/// A line holding only wrapper tags becomes blank so the blocks around it
/// stay separate.
fn repair_text_line(line: &str) -> String {
    let line = if line.trim_start().starts_with('#') {
        PERMALINK_RE.replace(line, "")
    } else {
        line.into()
    };

    let stripped = WRAPPER_TAG_RE.replace_all(&line, "");
    if stripped.trim().is_empty() {
        String::new()
    } else {
        stripped.into_owned()
    }
}

/// Fence character and run length if `line` opens or closes a fence.
fn fence_marker(line: &str) -> Option<(char, usize)> {
    let trimmed = line.trim_start();
    let ch = trimmed.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let len = trimmed.chars().take_while(|c| *c == ch).count();
    (len >= 3).then_some((ch, len))
}

fn is_bare_fence(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.chars().all(|c| c == '`') || trimmed.chars().all(|c| c == '~')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_self_links_are_removed() {
        let md = "## Install[\u{200B}](#install \"Direct link to Install\")\n\nSee [x](#install)\n### Usage [¶](#usage)";
        assert_eq!(run_pipeline(md), "## Install\n\nSee [x](#install)\n### Usage");
    }

    #[test]
    fn highlighter_classes_become_languages() {
        assert_eq!(run_pipeline("```language-js\nlet a;\n```"), "```js\nlet a;\n```");
        assert_eq!(run_pipeline("~~~hljs-c++\nx\n~~~"), "~~~c++\nx\n~~~");
        assert_eq!(run_pipeline("```rust\nfn f() {}\n```"), "```rust\nfn f() {}\n```");
    }

    #[test]
    fn wrapper_tags_are_dropped_and_text_kept() {
        let md = "<div class=\"admonition\">\n<span>Note:</span> read this\n</div>\nafter";
        assert_eq!(run_pipeline(md), "\nNote: read this\n\nafter");
    }

    #[test]
    fn fenced_code_is_left_alone() {
        let md = "````html\n<div>kept</div>\n```\n## Not[¶](#x)\n````\n<div>gone</div>";
        assert_eq!(
            run_pipeline(md),
            "````html\n<div>kept</div>\n```\n## Not[¶](#x)\n````\ngone"
        );
    }

    #[test]
    fn relative_links_pass_through() {
        let md = "See [next](../next/) and ![a](img/a.png).";
        assert_eq!(run_pipeline(md), md);
    }
}
