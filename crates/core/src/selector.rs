//! Key/value requirement matching shared by label and field selectors.
//!
//! A [`Selector`] is an AND of [`Requirement`]s evaluated against anything implementing
//! [`KeyValues`]. An empty selector matches everything. Label selectors accept the
//! Kubernetes set-based operators; field selectors additionally accept `Gt`/`Lt`.

#![forbid(unsafe_code)]

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use k8s_openapi::api::core::v1::NodeSelectorRequirement;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use smallvec::SmallVec;

use crate::error::{SelectorError, UnknownOperator};

/// Read-only key/value mapping a selector can be evaluated against.
pub trait KeyValues {
    fn lookup(&self, key: &str) -> Option<&str>;
}

impl KeyValues for BTreeMap<String, String> {
    fn lookup(&self, key: &str) -> Option<&str> { self.get(key).map(|s| s.as_str()) }
}

impl KeyValues for HashMap<String, String> {
    fn lookup(&self, key: &str) -> Option<&str> { self.get(key).map(|s| s.as_str()) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Equals,
    In,
    NotIn,
    Exists,
    DoesNotExist,
    Gt,
    Lt,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Equals => "Equals",
            Operator::In => "In",
            Operator::NotIn => "NotIn",
            Operator::Exists => "Exists",
            Operator::DoesNotExist => "DoesNotExist",
            Operator::Gt => "Gt",
            Operator::Lt => "Lt",
        }
    }

    /// Operators valid in a Kubernetes label selector expression.
    pub fn is_set_based(self) -> bool {
        matches!(self, Operator::In | Operator::NotIn | Operator::Exists | Operator::DoesNotExist)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Operator {
    type Err = UnknownOperator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Equals" => Ok(Operator::Equals),
            "In" => Ok(Operator::In),
            "NotIn" => Ok(Operator::NotIn),
            "Exists" => Ok(Operator::Exists),
            "DoesNotExist" => Ok(Operator::DoesNotExist),
            "Gt" => Ok(Operator::Gt),
            "Lt" => Ok(Operator::Lt),
            other => Err(UnknownOperator(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    key: String,
    op: Operator,
    values: SmallVec<[String; 4]>,
}

impl Requirement {
    pub fn new<I, S>(key: impl Into<String>, op: Operator, values: I) -> Result<Self, SelectorError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key = key.into();
        if key.is_empty() { return Err(SelectorError::EmptyKey); }
        let values: SmallVec<[String; 4]> = values.into_iter().map(Into::into).collect();
        let invalid = |reason| SelectorError::InvalidValues { key: key.clone(), operator: op.as_str(), reason };
        match op {
            Operator::Equals if values.len() != 1 => return Err(invalid("requires exactly one value")),
            Operator::In | Operator::NotIn if values.is_empty() => return Err(invalid("requires at least one value")),
            Operator::Exists | Operator::DoesNotExist if !values.is_empty() => return Err(invalid("takes no values")),
            Operator::Gt | Operator::Lt => {
                if values.len() != 1 || values[0].parse::<i64>().is_err() {
                    return Err(invalid("requires a single integer value"));
                }
            }
            _ => {}
        }
        Ok(Self { key, op, values })
    }

    pub fn equals(key: impl Into<String>, value: impl Into<String>) -> Result<Self, SelectorError> {
        Self::new(key, Operator::Equals, [value.into()])
    }

    pub fn key(&self) -> &str { &self.key }
    pub fn operator(&self) -> Operator { self.op }
    pub fn values(&self) -> &[String] { &self.values }

    pub fn matches<K: KeyValues + ?Sized>(&self, kv: &K) -> bool {
        let found = kv.lookup(&self.key);
        match self.op {
            Operator::Equals => found == Some(self.values[0].as_str()),
            Operator::In => found.map(|v| self.values.iter().any(|x| x == v)).unwrap_or(false),
            Operator::NotIn => found.map(|v| !self.values.iter().any(|x| x == v)).unwrap_or(true),
            Operator::Exists => found.is_some(),
            Operator::DoesNotExist => found.is_none(),
            Operator::Gt | Operator::Lt => {
                let (Some(have), Ok(want)) = (found.and_then(|v| v.parse::<i64>().ok()), self.values[0].parse::<i64>()) else {
                    return false;
                };
                if self.op == Operator::Gt { have > want } else { have < want }
            }
        }
    }
}

fn parse_operator(key: &str, operator: &str) -> Result<Operator, SelectorError> {
    operator
        .parse::<Operator>()
        .map_err(|_| SelectorError::UnknownOperator { key: key.to_string(), operator: operator.to_string() })
}

/// Conjunction of requirements. Empty matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    requirements: Vec<Requirement>,
}

impl Selector {
    pub fn everything() -> Self { Self::default() }

    pub fn new(requirements: Vec<Requirement>) -> Self { Self { requirements } }

    /// Compile a Kubernetes `LabelSelector`: `matchLabels` become equality requirements,
    /// `matchExpressions` accept In/NotIn/Exists/DoesNotExist.
    pub fn from_label_selector(sel: &LabelSelector) -> Result<Self, SelectorError> {
        let mut requirements = Vec::new();
        if let Some(labels) = sel.match_labels.as_ref() {
            for (k, v) in labels.iter() {
                requirements.push(Requirement::equals(k.clone(), v.clone())?);
            }
        }
        for expr in sel.match_expressions.iter().flatten() {
            let op = parse_operator(&expr.key, &expr.operator)?;
            if !op.is_set_based() {
                return Err(SelectorError::UnknownOperator { key: expr.key.clone(), operator: expr.operator.clone() });
            }
            requirements.push(Requirement::new(expr.key.clone(), op, expr.values.iter().flatten().cloned())?);
        }
        Ok(Self { requirements })
    }

    /// Compile a single `NodeSelectorRequirement`-style expression (all six operators).
    pub fn requirement_from_expression(expr: &NodeSelectorRequirement) -> Result<Requirement, SelectorError> {
        let op = parse_operator(&expr.key, &expr.operator)?;
        if op == Operator::Equals {
            return Err(SelectorError::UnknownOperator { key: expr.key.clone(), operator: expr.operator.clone() });
        }
        Requirement::new(expr.key.clone(), op, expr.values.iter().flatten().cloned())
    }

    pub fn requirements(&self) -> &[Requirement] { &self.requirements }
    pub fn is_empty(&self) -> bool { self.requirements.is_empty() }

    pub fn matches<K: KeyValues + ?Sized>(&self, kv: &K) -> bool {
        self.requirements.iter().all(|r| r.matches(kv))
    }
}
