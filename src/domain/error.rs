use thiserror::Error;

/// Data-shape failures raised while validating rows at the gateway boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("row from `{table}` is missing field `{field}`")]
    MissingField { table: String, field: &'static str },
    #[error("row from `{table}` has invalid field `{field}`: {reason}")]
    InvalidField {
        table: String,
        field: &'static str,
        reason: String,
    },
    #[error("unrecognised change operation `{operation}`")]
    UnknownOperation { operation: String },
}

impl DomainError {
    pub fn missing_field(table: impl Into<String>, field: &'static str) -> Self {
        Self::MissingField {
            table: table.into(),
            field,
        }
    }

    pub fn invalid_field(
        table: impl Into<String>,
        field: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidField {
            table: table.into(),
            field,
            reason: reason.into(),
        }
    }

    pub fn unknown_operation(operation: impl Into<String>) -> Self {
        Self::UnknownOperation {
            operation: operation.into(),
        }
    }
}
