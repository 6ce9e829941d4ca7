//! Error types for the stacking engine

use thiserror::Error;

/// Result type alias for stackwise operations
pub type Result<T> = std::result::Result<T, StackError>;

/// Main error type for the stacking engine
#[derive(Error, Debug)]
pub enum StackError {
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Cyclic dependency: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Empty text in row {row}")]
    EmptyText { row: usize },

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    #[error("Model not fitted")]
    NotFitted,

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Build cancelled")]
    Cancelled,

    #[error("Failed to build model '{model}': {source}")]
    Build {
        model: String,
        #[source]
        source: Box<StackError>,
    },

    #[error("Data error: {0}")]
    Data(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StackError {
    /// Wrap an error with the name of the model whose build failed.
    ///
    /// Already-wrapped errors keep the innermost model name, which is the
    /// one that actually broke.
    pub fn in_model(self, model: &str) -> Self {
        match self {
            err @ StackError::Build { .. } => err,
            err @ StackError::Cancelled => err,
            other => StackError::Build {
                model: model.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The model this error is attributed to, if any.
    pub fn failed_model(&self) -> Option<&str> {
        match self {
            StackError::Build { model, .. } => Some(model),
            StackError::UnknownModel(name) => Some(name),
            _ => None,
        }
    }

    /// Innermost cause, unwrapping any `Build` layers.
    pub fn root(&self) -> &StackError {
        match self {
            StackError::Build { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<serde_json::Error> for StackError {
    fn from(err: serde_json::Error) -> Self {
        StackError::Serialization(err.to_string())
    }
}

impl From<ndarray::ShapeError> for StackError {
    fn from(err: ndarray::ShapeError) -> Self {
        StackError::ShapeMismatch {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

impl From<polars::error::PolarsError> for StackError {
    fn from(err: polars::error::PolarsError) -> Self {
        StackError::Data(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StackError::UnknownModel("lr2".to_string());
        assert_eq!(err.to_string(), "Unknown model: lr2");

        let err = StackError::CyclicDependency {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Cyclic dependency: a -> b -> a");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: StackError = io_err.into();
        assert!(matches!(err, StackError::Io(_)));
    }

    #[test]
    fn test_build_wrapping_keeps_innermost_model() {
        let err = StackError::InsufficientData("fold 2 is empty".into())
            .in_model("base1")
            .in_model("stack1");
        assert_eq!(err.failed_model(), Some("base1"));
        assert!(matches!(err.root(), StackError::InsufficientData(_)));
    }
}
