//! Error types for task compilation and execution.

use crate::backend::BackendError;

/// A configuration was rejected by the task compiler.
///
/// `position` identifies the offending spec, e.g. `timeSeries[0][1]` or
/// `freqDist[0].then`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Configuration text is not valid JSON
    InvalidJson(String),
    /// Configuration has no analysis entries
    EmptyConfig,
    /// A value that must be a JSON object is not one
    NotAnObject { position: String },
    /// Top-level key does not name a known analysis type
    UnknownAnalysisType { key: String },
    /// Required field absent from a spec
    MissingField { position: String, field: String },
    /// Field present but of the wrong type or out of range
    InvalidField {
        position: String,
        field: String,
        expected: String,
    },
    /// Sibling group without members
    EmptyGroup { position: String },
    /// Groups cannot contain groups
    NestedGroup { position: String },
    /// A `then` link would make the chain revisit one of its own leaves
    Cycle { position: String },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::InvalidJson(msg) => write!(f, "Invalid configuration JSON: {}", msg),
            ValidationError::EmptyConfig => write!(f, "Configuration contains no analyses"),
            ValidationError::NotAnObject { position } => {
                write!(f, "Expected an object at {}", position)
            }
            ValidationError::UnknownAnalysisType { key } => {
                write!(f, "Unknown analysis type: '{}'", key)
            }
            ValidationError::MissingField { position, field } => {
                write!(f, "Missing required field '{}' at {}", field, position)
            }
            ValidationError::InvalidField {
                position,
                field,
                expected,
            } => write!(
                f,
                "Invalid field '{}' at {}: expected {}",
                field, position, expected
            ),
            ValidationError::EmptyGroup { position } => {
                write!(f, "Empty sibling group at {}", position)
            }
            ValidationError::NestedGroup { position } => {
                write!(f, "Sibling groups cannot be nested (at {})", position)
            }
            ValidationError::Cycle { position } => {
                write!(f, "Chain cycle detected at {}", position)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<serde_json::Error> for ValidationError {
    fn from(err: serde_json::Error) -> Self {
        ValidationError::InvalidJson(err.to_string())
    }
}

/// Failure of one top-level task during execution or merging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A leaf's backend call failed
    Backend {
        position: String,
        source: BackendError,
    },
    /// Two results resolved to the same merge key within one scope
    MergeKeyCollision { key: String, position: String },
    /// Execution was cancelled before the task completed
    Cancelled,
    /// The task's worker terminated abnormally
    Aborted(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Backend { position, source } => {
                write!(f, "Backend error at {}: {}", position, source)
            }
            EngineError::MergeKeyCollision { key, position } => write!(
                f,
                "Merge key collision: '{}' at {} is already taken by a sibling",
                key, position
            ),
            EngineError::Cancelled => write!(f, "Execution cancelled"),
            EngineError::Aborted(msg) => write!(f, "Task aborted: {}", msg),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Backend { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_messages_name_field_and_position() {
        let err = ValidationError::MissingField {
            position: "timeSeries[0][1]".to_string(),
            field: "span".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Missing required field 'span' at timeSeries[0][1]"
        );
    }

    #[test]
    fn backend_errors_are_exposed_as_source() {
        use std::error::Error;

        let err = EngineError::Backend {
            position: "freqDist[0]".to_string(),
            source: BackendError::Unavailable("connection refused".to_string()),
        };
        assert!(err.source().is_some());
        assert!(err.to_string().contains("freqDist[0]"));
        assert!(EngineError::Cancelled.source().is_none());
    }

    #[test]
    fn json_errors_convert_to_invalid_json() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(
            ValidationError::from(err),
            ValidationError::InvalidJson(_)
        ));
    }
}
