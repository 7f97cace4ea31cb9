//! Inline span parsing: splits text into plain runs and resource references.

use std::sync::LazyLock;

use regex::Regex;

use docs2md_shared::{Inline, ReferenceKind, ReferenceStyle, ResourceReference};

/// `[![alt](image)](link)`, then `![alt](target "title")` or `[text](target "title")`.
static REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"\[\s*!\[(?P<alt>[^\[\]]*)\]\(\s*<?(?P<src>[^)\s>]*)>?(?:\s+"(?P<src_title>[^"]*)")?\s*\)\s*\]"#,
        r#"\(\s*<?(?P<href>[^)\s>]*)>?(?:\s+"(?P<href_title>[^"]*)")?\s*\)"#,
        r#"|(?P<bang>!?)\[(?P<text>[^\[\]]*)\]\(\s*<?(?P<target>[^)\s>]*)>?(?:\s+"(?P<title>[^"]*)")?\s*\)"#,
    ))
    .expect("valid regex")
});

/// Opening `<a>`, `<img>` or `<source>` tag.
static HTML_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<(a|img|source)\b[^>]*>").expect("valid regex"));

/// Quoted `href` or `src` attribute.
static HTML_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\s(href|src)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid regex")
});

/// Parse a run of Markdown text into spans. Code spans are never scanned for references.
pub(crate) fn parse_inline(text: &str) -> Vec<Inline> {
    let mut spans = Vec::new();
    for (segment, is_code) in split_code_spans(text) {
        if is_code {
            push_text(&mut spans, segment);
        } else {
            parse_references(segment, &mut spans);
        }
    }
    spans
}

/// If `text` is exactly one plain reference (surrounding whitespace aside), return it.
pub(crate) fn standalone_reference(text: &str) -> Option<ResourceReference> {
    let trimmed = text.trim();
    let caps = REFERENCE_RE.captures(trimmed)?;
    let whole = caps.get(0)?;
    if whole.start() != 0 || whole.end() != trimmed.len() {
        return None;
    }
    match span_from(&caps) {
        Inline::Reference(reference) => Some(reference),
        _ => None,
    }
}

/// Split an HTML block into verbatim text and the `href`/`src` values of
/// `<a>`, `<img>` and `<source>` tags.
pub(crate) fn parse_html(text: &str) -> Vec<Inline> {
    let mut spans = Vec::new();
    let mut last = 0;

    for tag in HTML_TAG_RE.captures_iter(text) {
        let (Some(whole), Some(name)) = (tag.get(0), tag.get(1)) else {
            continue;
        };
        let (wanted, kind) = if name.as_str().eq_ignore_ascii_case("a") {
            ("href", ReferenceKind::Link)
        } else {
            ("src", ReferenceKind::Image)
        };

        for attr in HTML_ATTR_RE.captures_iter(whole.as_str()) {
            if !attr[1].eq_ignore_ascii_case(wanted) {
                continue;
            }
            let Some(value) = attr.get(2).or_else(|| attr.get(3)) else {
                continue;
            };
            let start = whole.start() + value.start();
            push_text(&mut spans, &text[last..start]);
            let mut reference = ResourceReference::new(kind, value.as_str(), "");
            reference.style = ReferenceStyle::HtmlAttribute;
            spans.push(Inline::Reference(reference));
            last = whole.start() + value.end();
        }
    }
    push_text(&mut spans, &text[last..]);
    spans
}

fn parse_references(segment: &str, spans: &mut Vec<Inline>) {
    let mut last = 0;
    for caps in REFERENCE_RE.captures_iter(segment) {
        let Some(whole) = caps.get(0) else { continue };
        push_text(spans, &segment[last..whole.start()]);
        spans.push(span_from(&caps));
        last = whole.end();
    }
    push_text(spans, &segment[last..]);
}

fn span_from(caps: &regex::Captures<'_>) -> Inline {
    let get = |name: &str| caps.name(name).map_or("", |m| m.as_str());
    let title = |name: &str| caps.name(name).map(|m| m.as_str().to_string());

    if let Some(href) = caps.name("href") {
        let mut image = ResourceReference::new(ReferenceKind::Image, get("src"), get("alt"));
        image.title = title("src_title");
        let mut link = ResourceReference::new(ReferenceKind::Link, href.as_str(), get("alt"));
        link.title = title("href_title");
        return Inline::LinkedImage { image, link };
    }

    let kind = if get("bang").is_empty() {
        ReferenceKind::Link
    } else {
        ReferenceKind::Image
    };
    let mut reference = ResourceReference::new(kind, get("target"), get("text"));
    reference.title = title("title");
    Inline::Reference(reference)
}

fn push_text(spans: &mut Vec<Inline>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(Inline::Text(prev)) = spans.last_mut() {
        prev.push_str(text);
    } else {
        spans.push(Inline::Text(text.to_string()));
    }
}

/// Split text into `(segment, is_code_span)` pieces. A code span opens with a
/// run of N backticks and closes at the next run of exactly N.
fn split_code_spans(text: &str) -> Vec<(&str, bool)> {
    let bytes = text.as_bytes();
    let mut pieces = Vec::new();
    let mut plain_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'`' {
            i += 1;
            continue;
        }
        let run_start = i;
        while i < bytes.len() && bytes[i] == b'`' {
            i += 1;
        }
        let run_len = i - run_start;

        // Unmatched backticks are literal text.
        if let Some(close_end) = find_closing_run(bytes, i, run_len) {
            if plain_start < run_start {
                pieces.push((&text[plain_start..run_start], false));
            }
            pieces.push((&text[run_start..close_end], true));
            plain_start = close_end;
            i = close_end;
        }
    }

    if plain_start < text.len() {
        pieces.push((&text[plain_start..], false));
    }
    pieces
}

fn find_closing_run(bytes: &[u8], from: usize, run_len: usize) -> Option<usize> {
    let mut j = from;
    while j < bytes.len() {
        if bytes[j] != b'`' {
            j += 1;
            continue;
        }
        let start = j;
        while j < bytes.len() && bytes[j] == b'`' {
            j += 1;
        }
        if j - start == run_len {
            return Some(j);
        }
    }
    None
}

/// Render spans back to Markdown text.
pub(crate) fn render_inline(spans: &[Inline], out: &mut String) {
    for span in spans {
        match span {
            Inline::Text(text) => out.push_str(text),
            Inline::Reference(reference) => render_reference(reference, out),
            Inline::LinkedImage { image, link } => {
                out.push('[');
                render_reference(image, out);
                out.push_str("](");
                render_destination(link, out);
                out.push(')');
            }
        }
    }
}

pub(crate) fn render_reference(reference: &ResourceReference, out: &mut String) {
    if reference.style == ReferenceStyle::HtmlAttribute {
        out.push_str(&reference.target.replace('"', "&quot;").replace('\'', "&#39;"));
        return;
    }
    if reference.kind == ReferenceKind::Image {
        out.push('!');
    }
    out.push('[');
    out.push_str(&reference.text);
    out.push_str("](");
    render_destination(reference, out);
    out.push(')');
}

/// `target "title"`, with the target in angle brackets when it has spaces.
fn render_destination(reference: &ResourceReference, out: &mut String) {
    if reference.target.contains(' ') {
        out.push('<');
        out.push_str(&reference.target);
        out.push('>');
    } else {
        out.push_str(&reference.target);
    }
    if let Some(title) = &reference.title {
        out.push_str(" \"");
        out.push_str(title);
        out.push('"');
    }
}
