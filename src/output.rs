//! Output parser — turns a command's stdout into a list of [`TableRecord`]s
//! for display, regardless of what shape the underlying tool chose to print
//! in.
//!
//! Four strategies are tried in order: JSON, a box-drawing table, an ASCII
//! separator-line table, and a pipe-separated table. If none match, the
//! whole text becomes a single `{"Output": text}` record — there is always
//! something to show.

use std::collections::BTreeMap;

/// One parsed row: an ordered sequence of (header, cell) pairs.
pub type TableRecord = Vec<(String, String)>;

const BOX_CHARS: &[char] = &['┌', '┬', '┐', '├', '┼', '┤', '└', '┴', '┘', '│', '─'];

/// Parse command output into structured records.
pub fn parse_records(text: &str) -> Vec<TableRecord> {
    let stripped = strip_ansi(text);
    let trimmed = stripped.trim();

    if trimmed.is_empty() {
        return vec![single_output_record("")];
    }

    if let Some(records) = try_json(trimmed) {
        return records;
    }
    if let Some(records) = try_boxed_table(&stripped) {
        return records;
    }
    if let Some(records) = try_ascii_table(&stripped) {
        return records;
    }
    if let Some(records) = try_pipe_table(&stripped) {
        return records;
    }

    vec![single_output_record(trimmed)]
}

fn single_output_record(text: &str) -> TableRecord {
    vec![("Output".to_string(), text.to_string())]
}

fn strip_ansi(text: &str) -> String {
    use regex::Regex;
    use std::sync::LazyLock;
    static ANSI_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").expect("valid regex"));
    ANSI_RE.replace_all(text, "").into_owned()
}

fn try_json(trimmed: &str) -> Option<Vec<TableRecord>> {
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(trimmed).ok()?;
    Some(flatten_json(value))
}

fn flatten_json(value: serde_json::Value) -> Vec<TableRecord> {
    match value {
        serde_json::Value::Array(items) => items.into_iter().map(json_value_to_record).collect(),
        other @ serde_json::Value::Object(_) => vec![json_value_to_record(other)],
        other => vec![single_output_record(&other.to_string())],
    }
}

fn json_value_to_record(value: serde_json::Value) -> TableRecord {
    match value {
        serde_json::Value::Object(map) => map
            .into_iter()
            .map(|(k, v)| (k, json_scalar_to_string(v)))
            .collect(),
        other => vec![("Output".to_string(), json_scalar_to_string(other))],
    }
}

fn json_scalar_to_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}

/// Detect a box-drawing table: a header row between two horizontal
/// separators, body rows split on `│`.
fn try_boxed_table(text: &str) -> Option<Vec<TableRecord>> {
    let lines: Vec<&str> = text.lines().collect();
    if !lines.iter().any(|l| l.chars().any(|c| BOX_CHARS.contains(&c))) {
        return None;
    }

    let is_separator = |l: &str| {
        !l.trim().is_empty() && l.chars().all(|c| matches!(c, '┌' | '┬' | '┐' | '├' | '┼' | '┤' | '└' | '┴' | '┘' | '─' | ' '))
    };

    let sep_positions: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, l)| is_separator(l))
        .map(|(i, _)| i)
        .collect();

    if sep_positions.len() < 2 {
        return None;
    }

    let header_idx = sep_positions[0] + 1;
    if header_idx >= lines.len() {
        return None;
    }
    let headers = split_box_row(lines[header_idx]);
    if headers.is_empty() {
        return None;
    }

    let body_start = sep_positions[1] + 1;
    let body_end = sep_positions.last().copied().unwrap_or(lines.len());

    let mut records = Vec::new();
    for &line in &lines[body_start..body_end.min(lines.len())] {
        if is_separator(line) || line.trim().is_empty() {
            continue;
        }
        let cells = split_box_row(line);
        records.push(zip_row(&headers, cells));
    }

    Some(records)
}

fn split_box_row(line: &str) -> Vec<String> {
    line.split('│')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Detect an ASCII separator-line table: a line of `-`/`─` runs (optionally
/// with `+` intersections) whose segments define column boundaries, with the
/// header on the line immediately above.
fn try_ascii_table(text: &str) -> Option<Vec<TableRecord>> {
    let lines: Vec<&str> = text.lines().collect();

    let sep_idx = lines.iter().position(|l| is_ascii_separator(l))?;
    if sep_idx == 0 {
        return None;
    }

    let header_line = lines[sep_idx - 1];
    let boundaries = column_boundaries(lines[sep_idx]);
    if boundaries.len() < 2 {
        return None;
    }

    let headers = split_by_boundaries(header_line, &boundaries);
    if headers.iter().all(|h| h.is_empty()) {
        return None;
    }

    let mut records = Vec::new();
    for &line in &lines[sep_idx + 1..] {
        if line.trim().is_empty() || is_ascii_separator(line) {
            continue;
        }
        let cells = split_by_boundaries(line, &boundaries);
        records.push(zip_row(&headers, cells));
    }

    Some(records)
}

fn is_ascii_separator(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.len() >= 3 && trimmed.chars().all(|c| matches!(c, '-' | '─' | '+' | ' '))
}

/// Column start offsets, derived from runs of `-`/`─` separated by whitespace
/// or `+`.
fn column_boundaries(separator_line: &str) -> Vec<usize> {
    let mut boundaries = Vec::new();
    let mut in_run = false;
    for (i, c) in separator_line.char_indices() {
        let is_dash = c == '-' || c == '─';
        if is_dash && !in_run {
            boundaries.push(i);
            in_run = true;
        } else if !is_dash {
            in_run = false;
        }
    }
    boundaries
}

fn split_by_boundaries(line: &str, boundaries: &[usize]) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    let mut cells = Vec::with_capacity(boundaries.len());
    for (idx, &start) in boundaries.iter().enumerate() {
        let end = boundaries.get(idx + 1).copied().unwrap_or(chars.len());
        let end = end.min(chars.len());
        let start = start.min(chars.len());
        let cell: String = chars.get(start..end).unwrap_or(&[]).iter().collect();
        cells.push(cell.trim().to_string());
    }
    cells
}

/// Detect a pipe-separated table: every body line contains `|`.
fn try_pipe_table(text: &str) -> Option<Vec<TableRecord>> {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.len() < 2 || !lines.iter().all(|l| l.contains('|')) {
        return None;
    }

    let headers: Vec<String> = lines[0].split('|').map(str::trim).map(str::to_string).collect();

    let mut records = Vec::new();
    for &line in &lines[1..] {
        let cells: Vec<String> = line.split('|').map(str::trim).map(str::to_string).collect();
        records.push(zip_row(&headers, cells));
    }

    Some(records)
}

fn zip_row(headers: &[String], cells: Vec<String>) -> TableRecord {
    let mut record: BTreeMap<usize, (String, String)> = BTreeMap::new();
    for (i, header) in headers.iter().enumerate() {
        let cell = cells.get(i).cloned().unwrap_or_else(|| "-".to_string());
        record.insert(i, (header.clone(), cell));
    }
    record.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_get<'a>(record: &'a TableRecord, key: &str) -> Option<&'a str> {
        record.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_json_array_of_objects() {
        let records = parse_records(r#"[{"name":"a","state":"on"},{"name":"b","state":"off"}]"#);
        assert_eq!(records.len(), 2);
        assert_eq!(record_get(&records[0], "name"), Some("a"));
    }

    #[test]
    fn test_boxed_table() {
        let text = "┌──────┬────────┐\n│ Name │ State  │\n├──────┼────────┤\n│ a    │ on     │\n│ b    │ off    │\n└──────┴────────┘";
        let records = parse_records(text);
        assert_eq!(records.len(), 2);
        assert_eq!(record_get(&records[0], "Name"), Some("a"));
        assert_eq!(record_get(&records[0], "State"), Some("on"));
        assert_eq!(record_get(&records[1], "Name"), Some("b"));
    }

    #[test]
    fn test_ascii_separator_table() {
        let text = "NAME   STATE\n----   -----\na      on\nb      off\n";
        let records = parse_records(text);
        assert_eq!(records.len(), 2);
        assert_eq!(record_get(&records[0], "NAME"), Some("a"));
    }

    #[test]
    fn test_pipe_separated_table() {
        let text = "Name | State\na | on\nb | off\n";
        let records = parse_records(text);
        assert_eq!(records.len(), 2);
        assert_eq!(record_get(&records[0], "Name"), Some("a"));
        assert_eq!(record_get(&records[1], "State"), Some("off"));
    }

    #[test]
    fn test_fallback_to_single_output_record() {
        let records = parse_records("just some plain text\nwith two lines\n");
        assert_eq!(records.len(), 1);
        assert!(record_get(&records[0], "Output").unwrap().contains("plain text"));
    }

    #[test]
    fn test_empty_text_still_yields_one_record() {
        let records = parse_records("");
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_json_single_object() {
        let records = parse_records(r#"{"ok": true, "count": 3}"#);
        assert_eq!(records.len(), 1);
        assert_eq!(record_get(&records[0], "ok"), Some("true"));
    }
}
