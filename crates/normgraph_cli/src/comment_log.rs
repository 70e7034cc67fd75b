//! Comment log recording how an import was invoked.
//!
//! The log lives next to the output store as `<outfile stem>.log` and holds
//! a header of the invocation parameters followed by the `#` comment lines
//! of the input file.

use std::path::{Path, PathBuf};

const HEADER_WIDTH: usize = 80;

/// One recorded argument value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    Text(String),
    Number(usize),
    /// Printed bare when set, omitted otherwise.
    Flag(bool),
    List(Vec<String>),
    Absent,
}

impl From<Option<String>> for ArgValue {
    fn from(value: Option<String>) -> Self {
        value.map(ArgValue::Text).unwrap_or(ArgValue::Absent)
    }
}

impl From<Option<&Path>> for ArgValue {
    fn from(value: Option<&Path>) -> Self {
        value
            .map(|path| ArgValue::Text(path.display().to_string()))
            .unwrap_or(ArgValue::Absent)
    }
}

impl From<Option<usize>> for ArgValue {
    fn from(value: Option<usize>) -> Self {
        value.map(ArgValue::Number).unwrap_or(ArgValue::Absent)
    }
}

pub fn log_path(outfile: &Path) -> PathBuf {
    outfile.with_extension("log")
}

/// Renders the header and appends `input_comments`.
pub fn render(
    outfile: &str,
    program: &str,
    args: &[(&str, ArgValue)],
    input_comments: &[String],
) -> String {
    let mut text = center(&format!(" {outfile} "), HEADER_WIDTH, '#');
    text.push('\n');
    text.push_str(&format!("# {program}\n"));

    for (name, value) in args {
        match value {
            ArgValue::Text(value) => text.push_str(&format!("#     --{name}=\"{value}\"\n")),
            ArgValue::Number(value) => text.push_str(&format!("#     --{name}={value}\n")),
            ArgValue::Flag(true) => text.push_str(&format!("#     --{name}\n")),
            ArgValue::List(items) => {
                for item in items {
                    text.push_str(&format!("#     --{name}=\"{item}\"\n"));
                }
            }
            ArgValue::Flag(false) | ArgValue::Absent => {}
        }
    }

    for line in input_comments {
        text.push_str(line);
        if !line.ends_with('\n') {
            text.push('\n');
        }
    }
    text
}

/// Pads `value` to `width` with `fill`; an odd remainder goes right.
fn center(value: &str, width: usize, fill: char) -> String {
    let len = value.chars().count();
    if len >= width {
        return value.to_string();
    }
    let margin = width - len;
    let left = margin / 2;
    let right = margin - left;
    let mut text = String::with_capacity(width);
    text.extend(std::iter::repeat(fill).take(left));
    text.push_str(value);
    text.extend(std::iter::repeat(fill).take(right));
    text
}
