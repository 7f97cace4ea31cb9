//! Titles derived from a document's place in the source hierarchy.

use docs2md_shared::HierarchyPosition;

/// Stems that name the landing page of their directory.
const INDEX_STEMS: &[&str] = &["index", "readme", "_index"];

/// Title for a document that carries none of its own.
///
/// `getting-started.md` becomes `Getting Started`; an index or README page
/// takes its directory's name, or `Overview` at the root.
pub fn title_from_position(position: &HierarchyPosition) -> String {
    let stem = file_stem(&position.name);
    if stem.is_empty() || is_index_stem(stem) {
        return position
            .ancestors
            .last()
            .map(|dir| humanize(file_stem(dir)))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Overview".to_string());
    }
    let title = humanize(stem);
    if title.is_empty() {
        "Overview".to_string()
    } else {
        title
    }
}

/// Whether `name` (with or without extension) is a directory landing page.
pub fn is_index_name(name: &str) -> bool {
    is_index_stem(file_stem(name))
}

fn is_index_stem(stem: &str) -> bool {
    INDEX_STEMS.iter().any(|s| stem.eq_ignore_ascii_case(s))
}

fn file_stem(name: &str) -> &str {
    match name.rfind('.') {
        Some(0) | None => name,
        Some(dot) => &name[..dot],
    }
}

/// `getting-started` / `getting_started` → `Getting Started`.
fn humanize(stem: &str) -> String {
    // Leading ordering prefixes such as `01-` are dropped.
    let stem = match stem.split_once(['-', '_']) {
        Some((prefix, rest)) if !rest.is_empty() && prefix.chars().all(|c| c.is_ascii_digit()) => {
            rest
        }
        _ => stem,
    };

    stem.split(['-', '_', ' '])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
