use thiserror::Error;

/// A label or field selector that cannot be evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("requirement on {key:?}: unknown operator {operator:?}")]
    UnknownOperator { key: String, operator: String },
    #[error("requirement on {key:?}: operator {operator} {reason}")]
    InvalidValues { key: String, operator: &'static str, reason: &'static str },
    #[error("requirement key must not be empty")]
    EmptyKey,
}

/// Field key outside [`crate::ClusterField::ALL`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown cluster field {0:?}")]
pub struct UnknownField(pub String);

/// Selector operator name outside the supported set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown operator {0:?}")]
pub struct UnknownOperator(pub String);

/// Structural problem with a spread constraint. The resolver skips such a constraint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstraintError {
    #[error("spreadByField and spreadByLabel are both set")]
    BothKeys,
    #[error("one of spreadByField or spreadByLabel must be set")]
    NoKey,
    #[error("spreadByField {0:?} is not one of cluster, provider, region, zone")]
    UnknownField(String),
    #[error("{bound} must not be negative (got {value})")]
    NegativeBound { bound: &'static str, value: i32 },
    #[error("minimum {minimum} exceeds maximum {maximum}")]
    MinimumAboveMaximum { minimum: i32, maximum: i32 },
}
