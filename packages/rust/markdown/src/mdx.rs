//! MDX-to-Markdown approximation.
//!
//! Strips `import`/`export` statements and `{/* */}` comments, and rewrites
//! the well-known documentation components into plain Markdown:
//!
//! | MDX                                   | Markdown                 |
//! |---------------------------------------|--------------------------|
//! | `<Note>`, `<Warning title="X">`, ...  | `**Note**` / `**X**` + body |
//! | `:::tip Title` ... `:::`              | `**Title**` + body       |
//! | `<Tabs>` / `<TabItem label="Y">`      | unwrapped, `**Y**` label |
//! | `<CodeBlock language="js">`           | fenced code block        |
//! | `<details>` / `<summary>S</summary>`  | unwrapped, `**S**` label |
//!
//! Anything else that looks like a component is left in place; the block
//! parser keeps it as raw text.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::NormalizationWarning;

const ADMONITIONS: &[&str] = &[
    "Note", "Tip", "Info", "Warning", "Caution", "Danger", "Callout", "Admonition", "Important",
];

const DIRECTIVES: &[&str] = &[
    "note", "tip", "info", "warning", "caution", "danger", "important", "success", "secondary",
];

static OPEN_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([ \t]*)<([A-Z][A-Za-z0-9.]*|details|summary)(\s[^>]*?)?(/?)>(.*)$")
        .expect("valid regex")
});

static CLOSE_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[ \t]*</([A-Z][A-Za-z0-9.]*|details|summary)>(.*)$").expect("valid regex")
});

static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(\w+)=(?:"([^"]*)"|'([^']*)'|\{["'`]([^"'`]*)["'`]\})"#).expect("valid regex")
});

static DIRECTIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[ \t]*:::([A-Za-z]+)?(?:\[([^\]]*)\])?[ \t]*(.*)$").expect("valid regex")
});

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t]*(`{3,}|~{3,})").expect("valid regex"));

/// Rewrite an MDX body into Markdown the block parser understands.
pub(crate) fn mdx_to_markdown(body: &str, warnings: &mut Vec<NormalizationWarning>) -> String {
    let body = strip_comments(body);
    let mut out: Vec<String> = Vec::new();
    let mut state = State::default();
    let lines: Vec<&str> = body.lines().collect();
    let mut i = 0;

    while i < lines.len() {
        let line = state.dedent(lines[i]);
        i += 1;

        // Fenced code passes through untouched.
        if let Some(fence) = state.fence.as_ref() {
            if line.trim().starts_with(fence.as_str()) {
                state.fence = None;
            }
            out.push(line);
            continue;
        }
        if let Some(caps) = FENCE_RE.captures(&line) {
            state.fence = Some(caps[1].to_string());
            out.push(line);
            continue;
        }

        if !state.seen_content && is_module_statement(&line) {
            i = skip_statement(&lines, i - 1);
            continue;
        }

        if let Some(caps) = CLOSE_TAG_RE.captures(&line) {
            let name = caps[1].to_string();
            if is_known(&name) {
                state.close_component();
                push_blank(&mut out);
                push_rest(&mut out, &caps[2]);
                continue;
            }
        }

        if let Some(caps) = OPEN_TAG_RE.captures(&line) {
            let indent = caps[1].len();
            let name = caps[2].to_string();
            let attrs = parse_attrs(caps.get(3).map_or("", |m| m.as_str()));
            let self_closing = &caps[4] == "/";
            let rest = caps[5].to_string();

            if name == "CodeBlock" {
                let (fence, next) = code_block(&attrs, &rest, &lines, i);
                push_blank(&mut out);
                out.extend(fence);
                push_blank(&mut out);
                i = next;
                state.seen_content = true;
                continue;
            }

            if let Some(label) = component_label(&name, &attrs) {
                if !self_closing {
                    state.open_component(indent);
                }
                push_blank(&mut out);
                if let Some(label) = label {
                    out.push(format!("**{label}**"));
                    push_blank(&mut out);
                }
                let rest = strip_closing_tag(&rest, &name);
                if rest.closed && !self_closing {
                    state.close_component();
                }
                push_rest(&mut out, &rest.text);
                if rest.closed {
                    push_blank(&mut out);
                }
                state.seen_content = true;
                continue;
            }

            if state.unknown.insert(name.clone()) {
                warnings.push(NormalizationWarning::UnknownComponent(name));
            }
        }

        if let Some(caps) = DIRECTIVE_RE.captures(&line) {
            match caps.get(1).map(|m| m.as_str()) {
                None => match state.directives.pop() {
                    Some(true) => {
                        push_blank(&mut out);
                        continue;
                    }
                    Some(false) | None => {}
                },
                Some(kind) if DIRECTIVES.contains(&kind.to_ascii_lowercase().as_str()) => {
                    let title = caps
                        .get(2)
                        .map(|m| m.as_str().trim())
                        .filter(|t| !t.is_empty())
                        .or_else(|| Some(caps[3].trim()).filter(|t| !t.is_empty()))
                        .map(String::from)
                        .unwrap_or_else(|| capitalize(kind));
                    state.directives.push(true);
                    push_blank(&mut out);
                    out.push(format!("**{title}**"));
                    push_blank(&mut out);
                    state.seen_content = true;
                    continue;
                }
                Some(kind) => {
                    state.directives.push(false);
                    if state.unknown.insert(format!(":::{kind}")) {
                        warnings.push(NormalizationWarning::UnknownDirective(kind.to_string()));
                    }
                }
            }
        }

        if !line.trim().is_empty() {
            state.seen_content = true;
        }
        out.push(line);
    }

    let mut text = out.join("\n");
    text.push('\n');
    text
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Default)]
struct State {
    /// Marker of the currently open code fence.
    fence: Option<String>,
    /// Indentation of each open known component.
    components: Vec<usize>,
    /// Open directives; `true` when recognized.
    directives: Vec<bool>,
    /// Unknown component and directive names already warned about.
    unknown: BTreeSet<String>,
    /// Whether any body content has been emitted (module statements lead).
    seen_content: bool,
}

impl State {
    fn open_component(&mut self, indent: usize) {
        self.components.push(indent);
    }

    fn close_component(&mut self) {
        self.components.pop();
    }

    /// Remove the indentation contributed by enclosing components.
    fn dedent(&self, line: &str) -> String {
        let Some(&top) = self.components.last() else {
            return line.to_string();
        };
        let leading = line.len() - line.trim_start_matches(' ').len();
        let strip = leading.min(top + 2);
        line[strip..].to_string()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Remove `{/* ... */}` comments, including multi-line ones, outside fences.
fn strip_comments(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut fence: Option<String> = None;
    let mut in_comment = false;

    for line in body.lines() {
        if !in_comment {
            if let Some(marker) = fence.as_ref() {
                if line.trim().starts_with(marker.as_str()) {
                    fence = None;
                }
                out.push_str(line);
                out.push('\n');
                continue;
            }
            if let Some(caps) = FENCE_RE.captures(line) {
                fence = Some(caps[1].to_string());
                out.push_str(line);
                out.push('\n');
                continue;
            }
        }

        let mut kept = String::new();
        let mut rest = line;
        loop {
            if in_comment {
                let Some(end) = rest.find("*/}") else { break };
                rest = &rest[end + 3..];
                in_comment = false;
            } else {
                match rest.find("{/*") {
                    Some(start) => {
                        kept.push_str(&rest[..start]);
                        rest = &rest[start + 3..];
                        in_comment = true;
                    }
                    None => {
                        kept.push_str(rest);
                        break;
                    }
                }
            }
        }

        if kept.trim().is_empty() && !line.trim().is_empty() {
            continue;
        }
        out.push_str(&kept);
        out.push('\n');
    }
    out
}

fn is_module_statement(line: &str) -> bool {
    line.starts_with("import ") || line.starts_with("export ") || line.starts_with("import{")
}

/// Skip a (possibly multi-line) import/export statement starting at `start`.
/// Returns the index of the first line after it.
fn skip_statement(lines: &[&str], start: usize) -> usize {
    let mut depth: i32 = 0;
    let mut i = start;
    while i < lines.len() {
        for c in lines[i].chars() {
            match c {
                '{' | '(' | '[' => depth += 1,
                '}' | ')' | ']' => depth -= 1,
                _ => {}
            }
        }
        i += 1;
        if depth <= 0 {
            break;
        }
    }
    i
}

fn is_known(name: &str) -> bool {
    ADMONITIONS.contains(&name)
        || matches!(name, "Tabs" | "TabItem" | "CodeBlock" | "details" | "summary")
}

/// For a recognized component, the bold label to emit (if any).
fn component_label(name: &str, attrs: &[(String, String)]) -> Option<Option<String>> {
    let attr = |key: &str| {
        attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    if ADMONITIONS.contains(&name) {
        let label = attr("title").unwrap_or_else(|| {
            if matches!(name, "Admonition" | "Callout") {
                attr("type").map(|t| capitalize(&t)).unwrap_or_else(|| name.to_string())
            } else {
                name.to_string()
            }
        });
        return Some(Some(label));
    }

    match name {
        "Tabs" | "details" => Some(None),
        "TabItem" => Some(attr("label").or_else(|| attr("value"))),
        // Summary text is the label; it is emitted from the tag body.
        "summary" => Some(None),
        _ => None,
    }
}

struct Rest {
    text: String,
    closed: bool,
}

/// Remove a trailing `</name>` from same-line content.
fn strip_closing_tag(rest: &str, name: &str) -> Rest {
    let close = format!("</{name}>");
    match rest.find(&close) {
        Some(pos) => {
            let mut text = rest[..pos].to_string();
            text.push_str(&rest[pos + close.len()..]);
            let text = text.trim().to_string();
            let text = if name == "summary" && !text.is_empty() {
                format!("**{text}**")
            } else {
                text
            };
            Rest { text, closed: true }
        }
        None => Rest {
            text: rest.trim().to_string(),
            closed: false,
        },
    }
}

/// Convert a `<CodeBlock>` element into fence lines. Returns the lines and
/// the index after the closing tag.
fn code_block(
    attrs: &[(String, String)],
    rest: &str,
    lines: &[&str],
    mut i: usize,
) -> (Vec<String>, usize) {
    let language = attrs
        .iter()
        .find(|(k, _)| k == "language" || k == "lang")
        .map(|(_, v)| v.clone())
        .unwrap_or_default();

    let mut body: Vec<String> = Vec::new();
    match rest.find("</CodeBlock>") {
        Some(pos) => body.push(rest[..pos].to_string()),
        None => {
            if !rest.trim().is_empty() {
                body.push(rest.to_string());
            }
            while i < lines.len() {
                let line = lines[i];
                i += 1;
                if let Some(pos) = line.find("</CodeBlock>") {
                    if !line[..pos].trim().is_empty() {
                        body.push(line[..pos].to_string());
                    }
                    break;
                }
                body.push(line.to_string());
            }
        }
    }

    // `{`...`}` template literal wrappers.
    if let Some(first) = body.first_mut() {
        let trimmed = first.trim_start();
        if let Some(stripped) = trimmed.strip_prefix("{`") {
            *first = stripped.to_string();
        }
    }
    if let Some(last) = body.last_mut() {
        let trimmed = last.trim_end();
        if let Some(stripped) = trimmed.strip_suffix("`}") {
            *last = stripped.to_string();
        }
    }
    while body.first().is_some_and(|l| l.trim().is_empty()) {
        body.remove(0);
    }
    while body.last().is_some_and(|l| l.trim().is_empty()) {
        body.pop();
    }

    let longest_run = body
        .iter()
        .map(|l| longest_backtick_run(l))
        .max()
        .unwrap_or(0);
    let fence = "`".repeat((longest_run + 1).max(3));

    let mut out = Vec::with_capacity(body.len() + 2);
    out.push(format!("{fence}{language}"));
    out.extend(body);
    out.push(fence);
    (out, i)
}

fn parse_attrs(raw: &str) -> Vec<(String, String)> {
    ATTR_RE
        .captures_iter(raw)
        .map(|caps| {
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map_or("", |m| m.as_str());
            (caps[1].to_string(), value.to_string())
        })
        .collect()
}

pub(crate) fn longest_backtick_run(s: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for c in s.chars() {
        if c == '`' {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
        None => String::new(),
    }
}

fn push_blank(out: &mut Vec<String>) {
    if out.last().is_some_and(|l| !l.trim().is_empty()) {
        out.push(String::new());
    }
}

fn push_rest(out: &mut Vec<String>, rest: &str) {
    let rest = rest.trim();
    if !rest.is_empty() {
        out.push(rest.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(input: &str) -> (String, Vec<NormalizationWarning>) {
        let mut warnings = Vec::new();
        let out = mdx_to_markdown(input, &mut warnings);
        (out, warnings)
    }

    #[test]
    fn strips_imports_exports_and_comments() {
        let input = "import Tabs from '@theme/Tabs';\nimport {\n  A,\n  B,\n} from './x';\nexport const meta = { a: 1 };\n\n# Title\n\n{/* hidden */}\nVisible {/* inline */} text\n{/*\nmulti\n*/}\nEnd";
        let (out, warnings) = convert(input);
        assert!(warnings.is_empty());
        assert!(!out.contains("import"));
        assert!(!out.contains("export"));
        assert!(!out.contains("hidden"));
        assert!(!out.contains("multi"));
        assert!(out.contains("# Title"));
        assert!(out.contains("Visible  text"));
        assert!(out.contains("End"));
    }

    #[test]
    fn admonition_becomes_bold_label() {
        let (out, _) = convert("<Warning title=\"Careful\">\n  Do not run this in production.\n</Warning>\n\n<Note>Inline note.</Note>");
        assert!(out.contains("**Careful**\n\nDo not run this in production.\n"));
        assert!(out.contains("**Note**\n\nInline note."));
        assert!(!out.contains('<'));
    }

    #[test]
    fn tabs_are_unwrapped() {
        let input = "<Tabs>\n  <TabItem value=\"npm\" label=\"npm\">\n\n  ```bash\n  npm install x\n  ```\n\n  </TabItem>\n  <TabItem value=\"yarn\">\n\n  yarn add x\n\n  </TabItem>\n</Tabs>";
        let (out, _) = convert(input);
        assert!(out.contains("**npm**"));
        assert!(out.contains("```bash\nnpm install x\n```"));
        assert!(out.contains("**yarn**"));
        assert!(!out.contains("TabItem"));
    }

    #[test]
    fn code_block_component_becomes_fence() {
        let (out, _) = convert("<CodeBlock language=\"js\">\n{`const a = 1;`}\n</CodeBlock>\nAfter");
        assert!(out.contains("```js\nconst a = 1;\n```"));
        assert!(out.contains("After"));
    }

    #[test]
    fn directives_map_like_admonitions() {
        let (out, warnings) = convert(":::tip Pro tip\nUse caching.\n:::\n\n:::custom\nodd\n:::");
        assert!(out.contains("**Pro tip**\n\nUse caching."));
        assert!(out.contains(":::custom"));
        assert_eq!(out.matches(":::").count(), 2);
        assert_eq!(warnings, vec![NormalizationWarning::UnknownDirective("custom".into())]);
    }

    #[test]
    fn unknown_components_are_kept_and_warned_once() {
        let (out, warnings) = convert("<Chart data={x} />\n\n<Chart data={y} />");
        assert_eq!(out.matches("<Chart").count(), 2);
        assert_eq!(warnings, vec![NormalizationWarning::UnknownComponent("Chart".into())]);
    }

    #[test]
    fn fenced_code_is_untouched() {
        let input = "```jsx\nimport X from 'x';\n<Note>literal</Note>\n{/* kept */}\n```";
        let (out, _) = convert(input);
        assert_eq!(out, format!("{input}\n"));
    }

    #[test]
    fn details_and_summary() {
        let (out, _) = convert("<details>\n<summary>More info</summary>\n\nHidden body.\n</details>");
        assert!(out.contains("**More info**"));
        assert!(out.contains("Hidden body."));
        assert!(!out.contains("details"));
    }
}
