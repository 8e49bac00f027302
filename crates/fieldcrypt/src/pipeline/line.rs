use std::sync::Arc;

use log::debug;

use super::request::{Delimiter, TransformRequest};
use crate::transform::{FieldTransform, Mode};

/// Substituted for a single field whose transform failed.
pub const FIELD_ERROR_SENTINEL: &str = "ERROR";

/// Result of transforming one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformedLine {
    pub line: String,
    /// At least one selected field failed and was replaced.
    pub field_error: bool,
}

/// Applies the field transform to the selected columns of a line.
pub struct LineTransformer {
    transform: Arc<dyn FieldTransform>,
    mode: Mode,
    columns: Vec<usize>,
    policy: String,
    delimiter: Delimiter,
}

impl LineTransformer {
    pub fn new(transform: Arc<dyn FieldTransform>, request: &TransformRequest) -> Self {
        Self {
            transform,
            mode: request.mode,
            columns: request.columns.clone(),
            policy: request.policy.clone(),
            delimiter: request.delimiter.clone(),
        }
    }

    /// Failures are field-scoped: a failing column becomes
    /// [`FIELD_ERROR_SENTINEL`] and the remaining columns are still processed.
    /// Out-of-range columns and empty fields are left untouched.
    pub fn transform(&self, line: &str) -> TransformedLine {
        let mut fields: Vec<String> = self
            .delimiter
            .split(line)
            .into_iter()
            .map(str::to_string)
            .collect();
        let mut field_error = false;

        for &column in &self.columns {
            let Some(field) = fields.get_mut(column) else {
                continue;
            };
            if field.is_empty() {
                continue;
            }

            match self.transform.apply(self.mode, field, &self.policy) {
                Ok(value) => *field = value,
                Err(e) => {
                    debug!("Column {} failed to {}: {}", column, self.mode, e);
                    *field = FIELD_ERROR_SENTINEL.to_string();
                    field_error = true;
                }
            }
        }

        TransformedLine {
            line: fields.join(self.delimiter.as_str()),
            field_error,
        }
    }
}
