use std::fmt;

use crate::error::RequestError;
use crate::sanitize;
use crate::transform::Mode;

/// Two-character escape accepted in place of a literal tab.
pub const TAB_ESCAPE: &str = "\\t";

/// Literal field separator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delimiter(String);

impl Delimiter {
    /// Accepts a literal delimiter or the `\t` escape.
    pub fn parse(raw: &str) -> Result<Self, RequestError> {
        if raw.is_empty() {
            return Err(RequestError::EmptyDelimiter);
        }
        if raw == TAB_ESCAPE {
            return Ok(Self("\t".to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits without a field limit; trailing empty fields are kept.
    pub fn split<'a>(&self, line: &'a str) -> Vec<&'a str> {
        line.split(self.0.as_str()).collect()
    }
}

impl Default for Delimiter {
    fn default() -> Self {
        Self(",".to_string())
    }
}

impl fmt::Display for Delimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable parameters of one file transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformRequest {
    pub mode: Mode,
    /// Zero-based, de-duplicated, in request order.
    pub columns: Vec<usize>,
    pub policy: String,
    pub delimiter: Delimiter,
    pub skip_header: bool,
}

impl TransformRequest {
    pub fn new(
        mode: Mode,
        columns: impl IntoIterator<Item = usize>,
        policy: impl Into<String>,
        delimiter: &str,
        skip_header: bool,
    ) -> Result<Self, RequestError> {
        let policy = policy.into();
        if policy.trim().is_empty() {
            return Err(RequestError::EmptyPolicy);
        }

        let mut unique = Vec::new();
        for column in columns {
            if !unique.contains(&column) {
                unique.push(column);
            }
        }

        Ok(Self {
            mode,
            columns: unique,
            policy,
            delimiter: Delimiter::parse(delimiter)?,
            skip_header,
        })
    }

    /// Parses the string form used by upload forms.
    pub fn parse(
        mode: &str,
        columns: &[usize],
        policy: &str,
        delimiter: &str,
        skip_header: bool,
    ) -> Result<Self, RequestError> {
        Self::new(
            mode.parse()?,
            columns.iter().copied(),
            policy,
            delimiter,
            skip_header,
        )
    }

    pub fn output_filename(&self, original: &str) -> String {
        output_filename(Some(self.mode), original)
    }
}

/// `<mode>_<name>`, or `processed_<name>` without a mode.
pub fn output_filename(mode: Option<Mode>, original: &str) -> String {
    let prefix = mode.map(|m| m.as_str()).unwrap_or("processed");
    format!("{}_{}", prefix, sanitize::safe_filename(original))
}
