//! Error types for the symbolic layer.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IrError {
    #[error("Domain {name} not found in vocabulary")]
    DomainNotFound { name: String },
    #[error("Domain {name} already exists in vocabulary")]
    DomainAlreadyExists { name: String },
    #[error("Function {name} not found in vocabulary")]
    FunctionNotFound { name: String },
    #[error("Function {name} already exists in vocabulary")]
    FunctionAlreadyExists { name: String },
    #[error("No object named {object} in domain {domain}")]
    UnknownObject { domain: String, object: String },
    #[error("Domain {domain} has no finite list of guaranteed objects")]
    NotEnumerable { domain: String },
    #[error("Function {name} arity mismatch: expected {expected}, got {actual}")]
    ArityMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("Function {name} argument {arg_index}: expected domain {expected}, got {actual}")]
    ArgumentDomainMismatch {
        name: String,
        arg_index: usize,
        expected: String,
        actual: String,
    },
    #[error("Logical variable {var} is not constrained here")]
    UnconstrainedVariable { var: String },
    #[error("Counting term {term} has a constraint that is not in normal form with respect to its parfactor: {reason}")]
    CountingConstraintNotNormal { term: String, reason: String },
    #[error("Trying to split {var} on a constraint with no overlap")]
    EmptyOverlap { var: String },
    #[error("Histogram index {index} out of range for {buckets} buckets with total {total}")]
    HistogramIndexOutOfRange {
        index: usize,
        buckets: usize,
        total: usize,
    },
    #[error("Histogram {counts:?} does not belong to a type with {buckets} buckets and total {total}")]
    HistogramMismatch {
        counts: Vec<usize>,
        buckets: usize,
        total: usize,
    },
    #[error("Non-random function {name} has no interpretation for the given arguments")]
    MissingInterpretation { name: String },
}

pub type Result<T> = std::result::Result<T, IrError>;
