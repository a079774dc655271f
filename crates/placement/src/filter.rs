//! Cluster filter: affinity and toleration predicates over a single cluster.
//!
//! Evaluation order is fixed and short-circuits on the first failure:
//! exclude list → cluster name allow-list → label selector → field selector → taints.

#![forbid(unsafe_code)]

use std::fmt;

use fleetplan_core::fields::FieldView;
use fleetplan_core::toleration::first_untolerated;
use fleetplan_core::{ClusterAffinity, ClusterDescriptor, ClusterField, Requirement, Selector};
use k8s_openapi::api::core::v1::Toleration;
use rustc_hash::FxHashSet;
use serde::Serialize;
use tracing::{debug, warn};

/// Why a cluster is not part of the placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Exclusion {
    Excluded,
    NotInClusterNames,
    LabelSelectorMismatch,
    InvalidLabelSelector { error: String },
    FieldSelectorMismatch { key: String },
    UntoleratedTaint { key: String, effect: String },
    UnitNotSelected { constraint: usize, unit: String },
}

impl Exclusion {
    /// Short stable label, used as a metrics dimension.
    pub fn kind(&self) -> &'static str {
        match self {
            Exclusion::Excluded => "excluded",
            Exclusion::NotInClusterNames => "not_in_cluster_names",
            Exclusion::LabelSelectorMismatch => "label_selector",
            Exclusion::InvalidLabelSelector { .. } => "invalid_label_selector",
            Exclusion::FieldSelectorMismatch { .. } => "field_selector",
            Exclusion::UntoleratedTaint { .. } => "untolerated_taint",
            Exclusion::UnitNotSelected { .. } => "unit_not_selected",
        }
    }
}

impl fmt::Display for Exclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exclusion::Excluded => f.write_str("listed in affinity exclude"),
            Exclusion::NotInClusterNames => f.write_str("not listed in affinity clusterNames"),
            Exclusion::LabelSelectorMismatch => f.write_str("labels do not match affinity labelSelector"),
            Exclusion::InvalidLabelSelector { error } => write!(f, "affinity labelSelector is invalid: {}", error),
            Exclusion::FieldSelectorMismatch { key } => write!(f, "field selector expression on {:?} does not hold", key),
            Exclusion::UntoleratedTaint { key, effect } => write!(f, "taint {}:{} is not tolerated", key, effect),
            Exclusion::UnitNotSelected { constraint, unit } => {
                write!(f, "unit {:?} not selected by spread constraint #{}", unit, constraint)
            }
        }
    }
}

enum LabelFilter {
    Any,
    Match(Selector),
    Invalid(String),
}

/// One field selector expression. Expressions on unknown keys or with malformed
/// operators never hold.
enum FieldExpr {
    Usable(Requirement),
    Unusable(String),
}

impl FieldExpr {
    fn key(&self) -> &str {
        match self {
            FieldExpr::Usable(r) => r.key(),
            FieldExpr::Unusable(k) => k,
        }
    }

    fn holds(&self, cluster: &ClusterDescriptor) -> bool {
        match self {
            FieldExpr::Usable(r) => r.matches(&FieldView(cluster)),
            FieldExpr::Unusable(_) => false,
        }
    }
}

struct CompiledAffinity<'a> {
    exclude: FxHashSet<&'a str>,
    names: FxHashSet<&'a str>,
    labels: LabelFilter,
    fields: Vec<FieldExpr>,
}

impl<'a> CompiledAffinity<'a> {
    fn new(affinity: &'a ClusterAffinity) -> Self {
        let labels = match affinity.label_selector.as_ref().map(Selector::from_label_selector) {
            None => LabelFilter::Any,
            Some(Ok(s)) if s.is_empty() => LabelFilter::Any,
            Some(Ok(s)) => LabelFilter::Match(s),
            Some(Err(e)) => {
                warn!(error = %e, "invalid cluster affinity labelSelector; no cluster can match");
                LabelFilter::Invalid(e.to_string())
            }
        };
        let fields = affinity
            .field_selector
            .iter()
            .flat_map(|fs| fs.match_expressions.iter())
            .map(|expr| {
                if expr.key.parse::<ClusterField>().is_err() {
                    debug!(key = %expr.key, "field selector on unknown cluster field never holds");
                    return FieldExpr::Unusable(expr.key.clone());
                }
                match Selector::requirement_from_expression(expr) {
                    Ok(r) => FieldExpr::Usable(r),
                    Err(e) => {
                        warn!(key = %expr.key, error = %e, "malformed field selector expression never holds");
                        FieldExpr::Unusable(expr.key.clone())
                    }
                }
            })
            .collect();
        Self {
            exclude: affinity.exclude_clusters.iter().map(|s| s.as_str()).collect(),
            names: affinity.cluster_names.iter().map(|s| s.as_str()).collect(),
            labels,
            fields,
        }
    }

    fn check(&self, cluster: &ClusterDescriptor) -> Result<(), Exclusion> {
        if self.exclude.contains(cluster.name.as_str()) { return Err(Exclusion::Excluded); }
        if !self.names.is_empty() && !self.names.contains(cluster.name.as_str()) {
            return Err(Exclusion::NotInClusterNames);
        }
        match &self.labels {
            LabelFilter::Any => {}
            LabelFilter::Match(s) => {
                if !s.matches(&cluster.labels) { return Err(Exclusion::LabelSelectorMismatch); }
            }
            LabelFilter::Invalid(error) => return Err(Exclusion::InvalidLabelSelector { error: error.clone() }),
        }
        if let Some(failed) = self.fields.iter().find(|f| !f.holds(cluster)) {
            return Err(Exclusion::FieldSelectorMismatch { key: failed.key().to_string() });
        }
        Ok(())
    }
}

/// Affinity and tolerations of one policy, compiled once and applied to many clusters.
pub struct ClusterFilter<'a> {
    affinity: Option<CompiledAffinity<'a>>,
    tolerations: &'a [Toleration],
}

impl<'a> ClusterFilter<'a> {
    pub fn new(affinity: Option<&'a ClusterAffinity>, tolerations: &'a [Toleration]) -> Self {
        Self { affinity: affinity.map(CompiledAffinity::new), tolerations }
    }

    /// First failing step for `cluster`, or `Ok(())` when eligible.
    pub fn check(&self, cluster: &ClusterDescriptor) -> Result<(), Exclusion> {
        if let Some(aff) = self.affinity.as_ref() {
            aff.check(cluster)?;
        }
        if let Some(taint) = first_untolerated(&cluster.taints, self.tolerations) {
            return Err(Exclusion::UntoleratedTaint { key: taint.key.clone(), effect: taint.effect.clone() });
        }
        Ok(())
    }

    pub fn eligible(&self, cluster: &ClusterDescriptor) -> bool {
        self.check(cluster).is_ok()
    }
}

/// Single-cluster contract: is `cluster` eligible under `affinity` and `tolerations`?
pub fn eligible(cluster: &ClusterDescriptor, affinity: Option<&ClusterAffinity>, tolerations: &[Toleration]) -> bool {
    ClusterFilter::new(affinity, tolerations).eligible(cluster)
}
