//! Error types for lifted elimination.

use liftve_ir::IrError;
use thiserror::Error;

/// Errors that abort a lifted inference run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FoveError {
    /// A logical variable ranges over a domain with unknown objects
    #[error("Domain {domain} may contain objects beyond its guaranteed ones")]
    UnknownObjects { domain: String },
    /// A logical variable ranges over a domain without a finite enumeration
    #[error("Domain {domain} has no finite set of guaranteed objects")]
    InfiniteDomain { domain: String },
    #[error("Unsupported term {term}: {reason}")]
    UnsupportedTerm { term: String, reason: String },
    #[error("Query {query} is not a function application")]
    QueryNotFuncApp { query: String },
    #[error("Parfactor still has logical variables after elimination: {parfactor}")]
    ResidualLogicalVars { parfactor: String },
    #[error("Parfactor still has a non-query term after elimination: {parfactor}")]
    ResidualNonQueryTerm { parfactor: String },
    #[error("Parfactor couples more than one query term: {parfactor}")]
    QueryDependency { parfactor: String },
    #[error("No valid operator, but {remaining} parfactors still hold eliminable terms")]
    NoValidOperator { remaining: usize },
    #[error("Operator log-cost {log_cost} exceeds the budget {budget}")]
    CostBudgetExceeded { log_cost: f64, budget: f64 },
    #[error("Elimination stopped after {steps} operator applications")]
    StepLimitExceeded { steps: usize },
    #[error("Dimension mismatch: expected {expected:?}, got {got:?}")]
    DimensionMismatch { expected: Vec<usize>, got: Vec<usize> },
    #[error("Index {index:?} is outside a potential of shape {shape:?}")]
    IndexOutOfRange { index: Vec<usize>, shape: Vec<usize> },
    #[error("Shattering did not reach a fixed point within {limit} steps")]
    ShatterLimitExceeded { limit: usize },
    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),
    #[error("Invalid potential: {0}")]
    InvalidPotential(String),
    #[error(transparent)]
    Ir(#[from] IrError),
}

/// Result type for lifted elimination.
pub type Result<T> = std::result::Result<T, FoveError>;
