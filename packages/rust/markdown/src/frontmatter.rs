//! Metadata header extraction (`---` YAML-style or `+++` TOML).

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::NormalizationWarning;

static KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9_][A-Za-z0-9_.-]*)[ \t]*:(?:[ \t]+(.*)|[ \t]*)$").expect("valid regex")
});

/// A document split into its metadata header and body.
#[derive(Debug, Default)]
pub(crate) struct HeaderSplit<'a> {
    /// Parsed header fields.
    pub fields: BTreeMap<String, String>,
    /// Header text to keep verbatim when it could not be parsed.
    pub raw: Option<String>,
    pub body: &'a str,
    pub warnings: Vec<NormalizationWarning>,
}

/// Split a leading metadata header off `text`.
pub(crate) fn split_header(text: &str) -> HeaderSplit<'_> {
    let delimiter = match text.lines().next().map(str::trim_end) {
        Some("---") => "---",
        Some("+++") => "+++",
        _ => {
            return HeaderSplit {
                body: text,
                ..Default::default()
            };
        }
    };

    let Some((header, body)) = find_header_end(text, delimiter) else {
        return HeaderSplit {
            body: text,
            warnings: vec![NormalizationWarning::UnterminatedHeader],
            ..Default::default()
        };
    };

    let parsed = if delimiter == "+++" {
        parse_toml(header)
    } else {
        parse_yaml_like(header)
    };

    match parsed {
        Ok(fields) => HeaderSplit {
            fields,
            body,
            ..Default::default()
        },
        Err(message) => {
            let raw_len = text.len() - body.len();
            HeaderSplit {
                raw: Some(text[..raw_len].trim_end().to_string()),
                body,
                warnings: vec![NormalizationWarning::InvalidHeader {
                    format: if delimiter == "+++" { "TOML" } else { "YAML" },
                    message,
                }],
                ..Default::default()
            }
        }
    }
}

/// Locate the closing delimiter. Returns `(header contents, body)`.
fn find_header_end<'a>(text: &'a str, delimiter: &str) -> Option<(&'a str, &'a str)> {
    let first_break = text.find('\n')?;
    let contents_start = first_break + 1;
    let mut offset = contents_start;

    for line in text[contents_start..].split_inclusive('\n') {
        let trimmed = line.trim_end();
        let closes = trimmed == delimiter || (delimiter == "---" && trimmed == "...");
        if closes {
            let header = &text[contents_start..offset];
            let body = &text[offset + line.len()..];
            return Some((header, body));
        }
        offset += line.len();
    }
    None
}

/// Parse `key: value` lines. Indented lines continue the previous value and
/// `- item` lines are joined into a comma-separated list.
fn parse_yaml_like(header: &str) -> Result<BTreeMap<String, String>, String> {
    let mut fields: BTreeMap<String, String> = BTreeMap::new();
    let mut current: Option<String> = None;

    for (n, line) in header.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let is_continuation = line.starts_with([' ', '\t']) || trimmed.starts_with("- ") || trimmed == "-";
        if is_continuation {
            let Some(key) = current.as_ref() else {
                return Err(format!("line {}: continuation without a key", n + 1));
            };
            let value = fields.entry(key.clone()).or_default();
            let (piece, sep) = match trimmed.strip_prefix('-') {
                Some(item) => (unquote(item.trim()), ", "),
                None => (unquote(trimmed), " "),
            };
            if !value.is_empty() {
                value.push_str(sep);
            }
            value.push_str(&piece);
            continue;
        }

        let Some(caps) = KEY_RE.captures(line) else {
            return Err(format!("line {}: expected `key: value`", n + 1));
        };
        let key = caps[1].to_string();
        let value = caps.get(2).map_or(String::new(), |m| unquote(m.as_str().trim()));
        let value = strip_flow_list(&value);
        fields.insert(key.clone(), value);
        current = Some(key);
    }

    Ok(fields)
}

/// Parse a TOML header; scalar values are stringified, arrays of scalars joined.
fn parse_toml(header: &str) -> Result<BTreeMap<String, String>, String> {
    let table: toml::Table = toml::from_str(header).map_err(|e| e.message().to_string())?;
    let mut fields = BTreeMap::new();
    for (key, value) in table {
        if let Some(s) = toml_scalar(&value) {
            fields.insert(key, s);
        } else if let toml::Value::Array(items) = &value {
            let joined: Vec<String> = items.iter().filter_map(toml_scalar).collect();
            fields.insert(key, joined.join(", "));
        }
    }
    Ok(fields)
}

fn toml_scalar(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        toml::Value::Datetime(d) => Some(d.to_string()),
        toml::Value::Array(_) | toml::Value::Table(_) => None,
    }
}

fn unquote(value: &str) -> String {
    let v = value.trim();
    let quoted = v.len() >= 2
        && ((v.starts_with('"') && v.ends_with('"')) || (v.starts_with('\'') && v.ends_with('\'')));
    if quoted {
        v[1..v.len() - 1].to_string()
    } else {
        v.to_string()
    }
}

/// `[a, b]` flow sequences become `a, b`.
fn strip_flow_list(value: &str) -> String {
    match value.strip_prefix('[').and_then(|v| v.strip_suffix(']')) {
        Some(inner) => inner
            .split(',')
            .map(|item| unquote(item))
            .filter(|item| !item.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        None => value.to_string(),
    }
}
