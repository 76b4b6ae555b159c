//! Domain error types.

use std::fmt;

/// Why a single row did not produce a transaction.
///
/// Row problems never abort an import; the batch logs the reason and moves on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The row is valid but is not an execution (dividend, transfer, header repeat).
    NotATrade,
    /// An order row whose status is not filled/completed.
    Unfilled,
    MissingField(&'static str),
    InvalidNumber { field: &'static str, value: String },
    InvalidDate(String),
    ZeroQuantity,
    UnknownSide(String),
    /// Fills that merged with an earlier row sharing the same reference number.
    Merged,
}

impl SkipReason {
    /// Malformed rows are worth a warning; the rest is routine noise.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            SkipReason::MissingField(_)
                | SkipReason::InvalidNumber { .. }
                | SkipReason::InvalidDate(_)
                | SkipReason::UnknownSide(_)
        )
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotATrade => write!(f, "not a trade row"),
            SkipReason::Unfilled => write!(f, "order not filled"),
            SkipReason::MissingField(field) => write!(f, "missing {field}"),
            SkipReason::InvalidNumber { field, value } => {
                write!(f, "invalid {field} value '{value}'")
            }
            SkipReason::InvalidDate(value) => write!(f, "invalid or implausible date '{value}'"),
            SkipReason::ZeroQuantity => write!(f, "zero quantity"),
            SkipReason::UnknownSide(value) => write!(f, "cannot determine side from '{value}'"),
            SkipReason::Merged => write!(f, "merged into earlier fill"),
        }
    }
}

/// Top-level error type for tradeimport.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("{format} file is missing the '{section}' section")]
    MissingSection { format: String, section: String },

    #[error("{format} header row not found")]
    MissingHeader { format: String },

    #[error("{format} file has no '{column}' column")]
    MissingColumn { format: String, column: String },

    #[error("CSV error: {reason}")]
    Csv { reason: String },

    #[error("currency conversion from {currency} requires the currency conversion entitlement")]
    EntitlementRequired { currency: String },

    #[error("identifier resolution failed: {reason}")]
    IdentifierResolution { reason: String },

    #[error("currency conversion failed for {currency}: {reason}")]
    CurrencyConversion { currency: String, reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("JSON error: {reason}")]
    Json { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::Csv {
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ImportError {
    fn from(err: serde_json::Error) -> Self {
        ImportError::Json {
            reason: err.to_string(),
        }
    }
}

impl From<&ImportError> for std::process::ExitCode {
    fn from(err: &ImportError) -> Self {
        let code: u8 = match err {
            ImportError::Io(_) | ImportError::Json { .. } => 1,
            ImportError::ConfigParse { .. } | ImportError::ConfigInvalid { .. } => 2,
            ImportError::MissingSection { .. }
            | ImportError::MissingHeader { .. }
            | ImportError::MissingColumn { .. }
            | ImportError::Csv { .. } => 3,
            ImportError::EntitlementRequired { .. } => 4,
            ImportError::IdentifierResolution { .. } | ImportError::CurrencyConversion { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
