//! Markdown rendering for command results

use serde_json::Value;

/// Render `rows` as a markdown table with the given column order.
pub fn table_to_markdown(title: &str, rows: &[Value], headers: &[&str]) -> String {
    let mut md = String::new();
    if !title.is_empty() {
        md.push_str(&format!("### {}\n", title));
    }

    if rows.is_empty() {
        md.push_str("**No entries.**\n");
        return md;
    }

    md.push('|');
    md.push_str(&headers.join("|"));
    md.push_str("|\n|");
    md.push_str(&vec!["---"; headers.len()].join("|"));
    md.push_str("|\n");

    for row in rows {
        let cells: Vec<String> = headers
            .iter()
            .map(|h| row.get(*h).map(cell_text).unwrap_or_default())
            .collect();
        md.push_str("| ");
        md.push_str(&cells.join(" | "));
        md.push_str(" |\n");
    }

    md
}

fn cell_text(value: &Value) -> String {
    let text = match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(cell_text).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    };
    text.replace('|', "\\|").replace('\n', "<br>")
}
