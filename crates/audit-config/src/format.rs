//! The line-oriented `key=value` persisted config format: one assignment per
//! line, `#`-prefixed comments and blank lines ignored, string values
//! double-quoted (JSON string escaping), numeric/boolean scalars bare, arrays
//! written as `[item, item, ...]` with quoted string elements. This is both
//! the format the daemon reads its local config file in and the format the
//! Config Sync component rewrites after applying a remote envelope.

use serde_json::{Map, Value};

use crate::error::{ConfigError, Result};

pub fn parse(contents: &str) -> Result<Map<String, Value>> {
    let mut map = Map::new();
    for (idx, raw_line) in contents.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line.split_once('=').ok_or_else(|| ConfigError::Parse {
            line: line_no,
            message: "expected `key=value`".to_string(),
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(ConfigError::Parse {
                line: line_no,
                message: "empty key".to_string(),
            });
        }
        let value = parse_value(value.trim(), line_no)?;
        map.insert(key.to_string(), value);
    }
    Ok(map)
}

pub fn render(map: &Map<String, Value>) -> String {
    let mut out = String::new();
    for (key, value) in map {
        out.push_str(key);
        out.push('=');
        out.push_str(&render_value(value));
        out.push('\n');
    }
    out
}

fn parse_value(raw: &str, line_no: usize) -> Result<Value> {
    match raw {
        "true" => return Ok(Value::Bool(true)),
        "false" => return Ok(Value::Bool(false)),
        _ => {}
    }
    if raw.starts_with('"') && raw.ends_with('"') && raw.len() >= 2 {
        return serde_json::from_str::<String>(raw).map(Value::String).map_err(|e| ConfigError::Parse {
            line: line_no,
            message: format!("invalid quoted string: {e}"),
        });
    }
    if raw.starts_with('[') && raw.ends_with(']') {
        return parse_array(raw, line_no);
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Ok(Value::Number(i.into()));
    }
    if let Ok(f) = raw.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Ok(Value::Number(n));
        }
    }
    // Unknown keys round-trip verbatim even when they carry a shape this
    // format has no bare syntax for (objects, nulls); fall back to plain JSON.
    serde_json::from_str(raw).map_err(|e| ConfigError::Parse {
        line: line_no,
        message: format!("unrecognised value `{raw}`: {e}"),
    })
}

fn parse_array(raw: &str, line_no: usize) -> Result<Value> {
    let inner = raw[1..raw.len() - 1].trim();
    if inner.is_empty() {
        return Ok(Value::Array(Vec::new()));
    }
    let mut items = Vec::new();
    for part in split_top_level_commas(inner) {
        items.push(parse_value(part.trim(), line_no)?);
    }
    Ok(Value::Array(items))
}

/// Splits on commas that are not inside a quoted string.
fn split_top_level_commas(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => serde_json::to_string(s).unwrap_or_else(|_| format!("\"{s}\"")),
        Value::Array(items) if items.iter().all(Value::is_string) => {
            let rendered: Vec<String> = items.iter().map(render_value).collect();
            format!("[{}]", rendered.join(", "))
        }
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_lines_and_comments_are_ignored() {
        let map = parse("\n# a comment\n\nscan_enabled=true\n").unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map["scan_enabled"], Value::Bool(true));
    }

    #[test]
    fn parses_quoted_strings_bare_numbers_and_negative_numbers() {
        let map = parse(
            "storage_mod=\"minecraft\"\nscan_max_online_players=-1\nscan_max_avg_tick_ms=25.5\n",
        )
        .unwrap();
        assert_eq!(map["storage_mod"], Value::String("minecraft".to_string()));
        assert_eq!(map["scan_max_online_players"], Value::Number((-1).into()));
        assert_eq!(map["scan_max_avg_tick_ms"].as_f64(), Some(25.5));
    }

    #[test]
    fn parses_quoted_string_arrays() {
        let map = parse("scan_item_filter=[\"minecraft:diamond\", \"minecraft:netherite_ingot\"]\n").unwrap();
        let items = map["scan_item_filter"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], Value::String("minecraft:diamond".to_string()));
    }

    #[test]
    fn empty_array_round_trips() {
        let map = parse("scan_item_filter=[]\n").unwrap();
        assert_eq!(map["scan_item_filter"], Value::Array(Vec::new()));
        let rendered = render(&map);
        assert_eq!(rendered.trim(), "scan_item_filter=[]");
    }

    #[test]
    fn rejects_a_line_with_no_equals_sign() {
        let err = parse("not_an_assignment\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { line: 1, .. }));
    }

    #[test]
    fn render_then_parse_round_trips_a_scanner_config_shaped_map() {
        let cfg = audit_core::ScannerConfig::default();
        let value = serde_json::to_value(&cfg).unwrap();
        let original = value.as_object().unwrap().clone();
        let rendered = render(&original);
        let reparsed = parse(&rendered).unwrap();
        assert_eq!(original, reparsed);
    }
}
