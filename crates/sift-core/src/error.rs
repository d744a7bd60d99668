//! Error types for sift operations.
//!
//! Errors carry a stable [`ErrorCode`] for programmatic handling and an
//! optional suggestion for the operator reading run output.

use thiserror::Error;

/// Result type alias for sift operations.
pub type SiftResult<T> = Result<T, SiftError>;

/// Main error type for all sift operations.
#[derive(Error, Debug)]
pub enum SiftError {
    /// An embedding is unusable: wrong dimension, empty, or non-finite.
    ///
    /// Fatal for the single article it belongs to, never for the run.
    #[error("Invalid vector{}: {message}", article_suffix(.article_id))]
    InvalidVector {
        message: String,
        code: ErrorCode,
        article_id: Option<String>,
    },

    /// A region has no configured dedup threshold.
    #[error("No dedup threshold configured for region '{region}'")]
    MissingRegionThreshold { region: String, code: ErrorCode },

    /// Input validation failed.
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        code: ErrorCode,
        suggestion: Option<String>,
    },

    /// Embedding provider call failed.
    #[error("Embedding error: {message}")]
    Embedding {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Merge-decision service call failed.
    #[error("Merge decision error: {message}")]
    MergeDecision { message: String, code: ErrorCode },

    /// Embedding store operation failed.
    #[error("Database error: {message}")]
    Database {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Provider not supported.
    #[error("Provider not supported: {provider}")]
    UnsupportedProvider { provider: String },

    /// Parse error.
    #[error("Parse error: {message}")]
    Parse { message: String, code: ErrorCode },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn article_suffix(article_id: &Option<String>) -> String {
    match article_id {
        Some(id) => format!(" for article '{}'", id),
        None => String::new(),
    }
}

/// Error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Vectors (VEC_xxx)
    VecDimensionMismatch,
    VecEmpty,
    VecNonFinite,

    // Configuration / thresholds (CFG_xxx)
    CfgMissingRegionThreshold,

    // Validation (VAL_xxx)
    ValInvalidInput,
    ValRunMismatch,

    // Embedding (EMB_xxx)
    EmbGenerationFailed,
    EmbCountMismatch,

    // Merge decisions (MRG_xxx)
    MrgDecisionFailed,

    // Database (DB_xxx)
    DbConnectionFailed,
    DbOperationFailed,
    DbCorruptRecord,

    // Parse (PARSE_xxx)
    ParseInvalidJson,
    ParseInvalidDate,

    // Internal
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::VecDimensionMismatch => "VEC_001",
            ErrorCode::VecEmpty => "VEC_002",
            ErrorCode::VecNonFinite => "VEC_003",
            ErrorCode::CfgMissingRegionThreshold => "CFG_001",
            ErrorCode::ValInvalidInput => "VAL_001",
            ErrorCode::ValRunMismatch => "VAL_002",
            ErrorCode::EmbGenerationFailed => "EMB_001",
            ErrorCode::EmbCountMismatch => "EMB_002",
            ErrorCode::MrgDecisionFailed => "MRG_001",
            ErrorCode::DbConnectionFailed => "DB_001",
            ErrorCode::DbOperationFailed => "DB_002",
            ErrorCode::DbCorruptRecord => "DB_003",
            ErrorCode::ParseInvalidJson => "PARSE_001",
            ErrorCode::ParseInvalidDate => "PARSE_002",
            ErrorCode::Internal => "INT_001",
        }
    }
}

impl SiftError {
    /// Create an invalid vector error.
    pub fn invalid_vector(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::InvalidVector {
            message: message.into(),
            code,
            article_id: None,
        }
    }

    /// Attach the offending article id to an invalid vector error.
    ///
    /// Other variants are returned unchanged.
    pub fn for_article(self, id: impl Into<String>) -> Self {
        match self {
            Self::InvalidVector { message, code, .. } => Self::InvalidVector {
                message,
                code,
                article_id: Some(id.into()),
            },
            other => other,
        }
    }

    /// Create a missing region threshold error.
    pub fn missing_region_threshold(region: impl Into<String>) -> Self {
        Self::MissingRegionThreshold {
            region: region.into(),
            code: ErrorCode::CfgMissingRegionThreshold,
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            code: ErrorCode::ValInvalidInput,
            suggestion: None,
        }
    }

    /// Create a validation error with suggestion.
    pub fn validation_with_suggestion(
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Validation {
            message: message.into(),
            code: ErrorCode::ValInvalidInput,
            suggestion: Some(suggestion.into()),
        }
    }

    /// Create an embedding error.
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
            code: ErrorCode::EmbGenerationFailed,
            source: None,
        }
    }

    /// Create a merge decision error.
    pub fn merge_decision(message: impl Into<String>) -> Self {
        Self::MergeDecision {
            message: message.into(),
            code: ErrorCode::MrgDecisionFailed,
        }
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            code: ErrorCode::DbOperationFailed,
            source: None,
        }
    }

    /// Create a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            code: ErrorCode::ParseInvalidJson,
        }
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidVector { code, .. } => *code,
            Self::MissingRegionThreshold { code, .. } => *code,
            Self::Validation { code, .. } => *code,
            Self::Embedding { code, .. } => *code,
            Self::MergeDecision { code, .. } => *code,
            Self::Database { code, .. } => *code,
            Self::Parse { code, .. } => *code,
            _ => ErrorCode::Internal,
        }
    }

    /// Get a user-friendly suggestion for resolving this error.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::InvalidVector { .. } => {
                Some("Re-embed the article; all vectors in a deployment must share one dimension")
            }
            Self::MissingRegionThreshold { .. } => {
                Some("Add the region to dedup.region_thresholds or rely on dedup.default_threshold")
            }
            Self::Validation { suggestion, .. } => suggestion.as_deref(),
            Self::Embedding { .. } => Some("Please check your embedding provider configuration"),
            Self::Database { .. } => Some("Please check the embedding store path and permissions"),
            _ => None,
        }
    }

    /// Whether the error is isolated to a single article.
    pub fn is_per_article(&self) -> bool {
        matches!(self, Self::InvalidVector { .. })
    }
}

impl From<rusqlite::Error> for SiftError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database {
            message: err.to_string(),
            code: ErrorCode::DbOperationFailed,
            source: Some(Box::new(err)),
        }
    }
}
