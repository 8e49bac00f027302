use std::io::BufRead;

use serde::Serialize;

use crate::pipeline::Delimiter;

/// Rows shown when previewing an upload.
pub const UPLOAD_PREVIEW_ROWS: usize = 10;
/// Lines shown when previewing a finished result.
pub const RESULT_PREVIEW_LINES: usize = 8;

/// First few rows of a delimited file, for column selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePreview {
    pub filename: String,
    /// The first row; it may or may not be a real header.
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Number of rows in this preview, not in the file.
    pub total_rows: usize,
}

impl FilePreview {
    /// Splits up to `max_rows` non-blank lines into fields.
    pub fn from_reader<R: BufRead>(
        filename: &str,
        reader: R,
        delimiter: &Delimiter,
        max_rows: usize,
    ) -> std::io::Result<Self> {
        let rows: Vec<Vec<String>> = non_blank_lines(reader, max_rows)?
            .iter()
            .map(|line| {
                delimiter
                    .split(line)
                    .into_iter()
                    .map(str::to_string)
                    .collect()
            })
            .collect();

        Ok(Self {
            filename: filename.to_string(),
            headers: rows.first().cloned().unwrap_or_default(),
            total_rows: rows.len(),
            rows,
        })
    }

    /// Keeps whole lines as single-cell rows; result files are shown raw.
    pub fn from_result<R: BufRead>(
        filename: &str,
        reader: R,
        max_lines: usize,
    ) -> std::io::Result<Self> {
        let rows: Vec<Vec<String>> = non_blank_lines(reader, max_lines)?
            .into_iter()
            .map(|line| vec![line])
            .collect();

        Ok(Self {
            filename: filename.to_string(),
            headers: Vec::new(),
            total_rows: rows.len(),
            rows,
        })
    }
}

fn non_blank_lines<R: BufRead>(reader: R, limit: usize) -> std::io::Result<Vec<String>> {
    let mut lines = Vec::new();
    for line in reader.lines() {
        if lines.len() >= limit {
            break;
        }
        let line = line?;
        if !line.trim().is_empty() {
            lines.push(line);
        }
    }
    Ok(lines)
}
