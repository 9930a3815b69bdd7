//! Error types for graph-reform
//!
//! This module defines all error types used throughout the crate.
//!
//! Match-time predicate failures are *not* errors: a candidate node that
//! fails a structural, value, or shape check is simply rejected and the
//! scan continues. The variants below cover the fatal cases only:
//! configuration, materialization, and consistency problems that abort
//! the whole optimization run.

use thiserror::Error;

/// Main error type for graph reform operations
#[derive(Error, Debug)]
pub enum ReformError {
    /// A pattern node declared a structural constraint this engine does not know
    #[error("Unknown structural constraint: {0}")]
    UnknownConstraint(String),

    /// A rule asked for an attribute the matched operator does not carry
    #[error("Operator '{op_type}' has no attribute '{attr}'")]
    MissingAttribute {
        /// Operator type of the matched node
        op_type: String,
        /// Requested attribute name
        attr: String,
    },

    /// A NewConstant boundary must be materialized but carries no literal value
    #[error("New constant node must carry a tensor value (rule '{0}')")]
    MissingTensorValue(String),

    /// Two rule applications claimed the same qualified output identifier
    #[error("Rename map collision on key '{0}'")]
    RenameCollision(String),

    /// An attribute functor could not be evaluated
    #[error("Attribute functor failed: {0}")]
    AttrFunctor(String),

    /// The fixed-point loop exceeded its configured pass cap
    #[error("Optimization did not reach a fixed point within {0} passes")]
    NonTermination(usize),

    /// The graph violates an assumption of the engine
    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for reform operations
pub type ReformResult<T> = Result<T, ReformError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ReformError::UnknownConstraint("permute".to_string());
        assert!(err.to_string().contains("permute"));
    }

    #[test]
    fn test_missing_attribute() {
        let err = ReformError::MissingAttribute {
            op_type: "ReduceMean".to_string(),
            attr: "axes".to_string(),
        };
        assert!(err.to_string().contains("ReduceMean"));
        assert!(err.to_string().contains("axes"));
    }

    #[test]
    fn test_non_termination() {
        let err = ReformError::NonTermination(20);
        assert!(err.to_string().contains("20"));
    }
}
