// src/error.rs

/// Result type used throughout the lookout library
pub type LookoutResult<T> = Result<T, LookoutError>;

/// All possible errors that can occur in the lookout library
#[derive(thiserror::Error, Debug)]
pub enum LookoutError {
    /// A date parameter could not be parsed
    #[error("Invalid date '{value}': expected {expected}")]
    InvalidDateFormat { value: String, expected: String },

    /// The end of the requested range is before its start
    #[error("Invalid range: end ({end}) must not be before start ({start})")]
    InvalidRange { start: String, end: String },

    /// The requested range spans more days than allowed
    #[error("Requested range spans {days} days, the maximum is {max_days}")]
    RangeTooLarge { days: i64, max_days: i64 },

    /// A category filter matched no records at all
    #[error("Category '{category}' not found")]
    CategoryNotFound { category: String },

    /// Forecasting model could not be fitted or could not predict
    #[error("Forecast model '{model}' failed: {message}")]
    ForecastFailure { model: String, message: String },

    /// Walk-forward validation could not be completed
    #[error("Quality evaluation failed: {message}")]
    QualityEvaluationFailure { message: String },

    /// Historical records or snapshots could not be read
    #[error("Upstream data unavailable from {source_name}: {message}")]
    UpstreamDataUnavailable { source_name: String, message: String },

    /// Cache backend failure
    #[error("Cache error: {message}")]
    Cache { message: String },

    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },
}

/// Helper methods for creating common errors
impl LookoutError {
    pub fn invalid_date_format<S: Into<String>>(value: S, expected: S) -> Self {
        Self::InvalidDateFormat {
            value: value.into(),
            expected: expected.into(),
        }
    }

    pub fn invalid_range<S: ToString>(start: S, end: S) -> Self {
        Self::InvalidRange {
            start: start.to_string(),
            end: end.to_string(),
        }
    }

    pub fn range_too_large(days: i64, max_days: i64) -> Self {
        Self::RangeTooLarge { days, max_days }
    }

    pub fn category_not_found<S: Into<String>>(category: S) -> Self {
        Self::CategoryNotFound {
            category: category.into(),
        }
    }

    pub fn forecast_failure<S: Into<String>>(model: S, message: S) -> Self {
        Self::ForecastFailure {
            model: model.into(),
            message: message.into(),
        }
    }

    pub fn quality_evaluation<S: Into<String>>(message: S) -> Self {
        Self::QualityEvaluationFailure {
            message: message.into(),
        }
    }

    pub fn upstream<S: Into<String>>(source_name: S, message: S) -> Self {
        Self::UpstreamDataUnavailable {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    pub fn cache<S: Into<String>>(message: S) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Stable, machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidDateFormat { .. } => "INVALID_DATE_FORMAT",
            Self::InvalidRange { .. } => "INVALID_RANGE",
            Self::RangeTooLarge { .. } => "RANGE_TOO_LARGE",
            Self::CategoryNotFound { .. } => "CATEGORY_NOT_FOUND",
            Self::ForecastFailure { .. } => "FORECAST_FAILURE",
            Self::QualityEvaluationFailure { .. } => "QUALITY_EVALUATION_FAILURE",
            Self::UpstreamDataUnavailable { .. } => "UPSTREAM_DATA_UNAVAILABLE",
            Self::Cache { .. } => "CACHE_ERROR",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Serialization { .. } => "SERIALIZATION_ERROR",
        }
    }

    /// True for errors caused by the request itself rather than the engine
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidDateFormat { .. }
                | Self::InvalidRange { .. }
                | Self::RangeTooLarge { .. }
                | Self::CategoryNotFound { .. }
        )
    }

    /// Wrap a collaborator error as `UpstreamDataUnavailable`, keeping one
    /// that already is.
    pub fn into_upstream(self, source_name: &str) -> Self {
        match self {
            Self::UpstreamDataUnavailable { .. } => self,
            other => Self::upstream(source_name.to_string(), other.to_string()),
        }
    }
}
