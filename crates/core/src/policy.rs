//! Propagation policy schema: which resources to select and where to place them.

#![forbid(unsafe_code)]

use std::fmt;

use k8s_openapi::api::core::v1::{NodeSelectorRequirement, Toleration};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use serde::{Deserialize, Serialize};

use crate::error::ConstraintError;
use crate::fields::ClusterField;

/// Desired behavior of a propagation policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropagationSpec {
    /// `None` selects every resource; `Some(vec![])` selects none.
    #[serde(rename = "resourceSelector", default, skip_serializing_if = "Option::is_none")]
    pub resource_selectors: Option<Vec<ResourceSelector>>,
    /// Automatic inclusion of referenced resources. Carried but not acted on by the engine.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub association: bool,
    #[serde(default)]
    pub placement: Placement,
    /// Scheduler expected to handle this policy; empty means the default scheduler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduler_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSelector {
    pub api_version: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_namespaces: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_selector: Option<LabelSelector>,
}

impl ResourceSelector {
    pub fn new(api_version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self { api_version: api_version.into(), kind: kind.into(), ..Self::default() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    /// `None` means any cluster can be a candidate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_affinity: Option<ClusterAffinity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cluster_tolerations: Vec<Toleration>,
    /// Applied in declared order, each narrowing the previous result.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub spread_constraints: Vec<SpreadConstraint>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterAffinity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_selector: Option<LabelSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_selector: Option<FieldSelector>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cluster_names: Vec<String>,
    /// Deny-list; wins over every other field.
    #[serde(rename = "exclude", default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_clusters: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSelector {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_expressions: Vec<NodeSelectorRequirement>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpreadConstraint {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub spread_by_field: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub spread_by_label: String,
    /// 0 means unbounded.
    #[serde(default)]
    pub maximum: i32,
    /// 0 means no floor.
    #[serde(default)]
    pub minimum: i32,
}

/// Validated grouping key source of a spread constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SpreadBy {
    Field(ClusterField),
    Label(String),
}

impl fmt::Display for SpreadBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpreadBy::Field(field) => write!(f, "field:{}", field),
            SpreadBy::Label(key) => write!(f, "label:{}", key),
        }
    }
}

impl SpreadConstraint {
    pub fn by_field(field: ClusterField) -> Self {
        Self { spread_by_field: field.as_str().to_string(), ..Self::default() }
    }

    pub fn by_label(key: impl Into<String>) -> Self {
        Self { spread_by_label: key.into(), ..Self::default() }
    }

    pub fn with_bounds(mut self, minimum: i32, maximum: i32) -> Self {
        self.minimum = minimum;
        self.maximum = maximum;
        self
    }

    /// Key source of this constraint, checked for structural problems.
    pub fn spread_by(&self) -> Result<SpreadBy, ConstraintError> {
        let key = match (self.spread_by_field.is_empty(), self.spread_by_label.is_empty()) {
            (false, false) => return Err(ConstraintError::BothKeys),
            (true, true) => return Err(ConstraintError::NoKey),
            (false, true) => SpreadBy::Field(
                self.spread_by_field
                    .parse::<ClusterField>()
                    .map_err(|e| ConstraintError::UnknownField(e.0))?,
            ),
            (true, false) => SpreadBy::Label(self.spread_by_label.clone()),
        };
        self.bounds()?;
        Ok(key)
    }

    /// `(minimum, maximum)` as unsigned counts, checked for sign and ordering.
    pub fn bounds(&self) -> Result<(usize, usize), ConstraintError> {
        if self.minimum < 0 {
            return Err(ConstraintError::NegativeBound { bound: "minimum", value: self.minimum });
        }
        if self.maximum < 0 {
            return Err(ConstraintError::NegativeBound { bound: "maximum", value: self.maximum });
        }
        if self.minimum > 0 && self.maximum > 0 && self.minimum > self.maximum {
            return Err(ConstraintError::MinimumAboveMaximum { minimum: self.minimum, maximum: self.maximum });
        }
        Ok((self.minimum as usize, self.maximum as usize))
    }
}
