//! Delimited input reading.

use anyhow::{Context, Result};
use normgraph_core::{TabularInput, TabularRow};
use std::path::Path;

/// Reads a CSV file whose leading `#` lines are comments.
pub fn read_csv(path: &Path) -> Result<TabularInput> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read `{}`", path.display()))?;
    parse_csv(&text).with_context(|| format!("failed to parse `{}`", path.display()))
}

pub fn parse_csv(text: &str) -> Result<TabularInput> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut comments = Vec::new();
    let mut body = text;
    while body.starts_with('#') {
        let end = body.find('\n').map(|index| index + 1).unwrap_or(body.len());
        comments.push(body[..end].to_string());
        body = &body[end..];
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(body.as_bytes());
    let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: TabularRow = columns
            .iter()
            .zip(record.iter())
            .map(|(column, value)| (column.clone(), value.to_string()))
            .collect();
        rows.push(row);
    }

    Ok(TabularInput {
        comments,
        columns,
        rows,
    })
}
