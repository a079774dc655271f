//! Structural checks over a policy spec, reported up front instead of at resolve time.

use fleetplan_core::toleration::{EFFECT_NO_EXECUTE, EFFECT_NO_SCHEDULE, EFFECT_PREFER_NO_SCHEDULE};
use fleetplan_core::{ClusterField, PropagationSpec, Selector};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyIssue {
    /// JSON-style path into the spec, e.g. `placement.spreadConstraints[1]`.
    pub path: String,
    pub message: String,
}

impl PolicyIssue {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self { path: path.into(), message: message.into() }
    }
}

impl std::fmt::Display for PolicyIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

pub fn lint(spec: &PropagationSpec) -> Vec<PolicyIssue> {
    let mut issues = Vec::new();

    match spec.resource_selectors.as_deref() {
        Some([]) => issues.push(PolicyIssue::new("resourceSelector", "empty list selects no resources")),
        Some(selectors) => {
            for (i, sel) in selectors.iter().enumerate() {
                let path = format!("resourceSelector[{}]", i);
                if sel.api_version.is_empty() { issues.push(PolicyIssue::new(&path, "apiVersion is required")); }
                if sel.kind.is_empty() { issues.push(PolicyIssue::new(&path, "kind is required")); }
                if let Some(Err(e)) = sel.label_selector.as_ref().map(Selector::from_label_selector) {
                    issues.push(PolicyIssue::new(format!("{}.labelSelector", path), format!("{}; selector matches nothing", e)));
                }
                if sel.namespaces.iter().any(|ns| sel.exclude_namespaces.contains(ns)) {
                    issues.push(PolicyIssue::new(&path, "a namespace is both included and excluded"));
                }
            }
        }
        None => {}
    }

    let placement = &spec.placement;
    if let Some(aff) = placement.cluster_affinity.as_ref() {
        if let Some(Err(e)) = aff.label_selector.as_ref().map(Selector::from_label_selector) {
            issues.push(PolicyIssue::new(
                "placement.clusterAffinity.labelSelector",
                format!("{}; no cluster can match", e),
            ));
        }
        for (i, expr) in aff.field_selector.iter().flat_map(|fs| fs.match_expressions.iter()).enumerate() {
            let path = format!("placement.clusterAffinity.fieldSelector.matchExpressions[{}]", i);
            if expr.key.parse::<ClusterField>().is_err() {
                let known: Vec<&str> = ClusterField::ALL.iter().map(|f| f.as_str()).collect();
                issues.push(PolicyIssue::new(path, format!("unknown field {:?} (known: {})", expr.key, known.join(", "))));
            } else if let Err(e) = Selector::requirement_from_expression(expr) {
                issues.push(PolicyIssue::new(path, e.to_string()));
            }
        }
        if !aff.cluster_names.is_empty() && aff.cluster_names.iter().all(|c| aff.exclude_clusters.contains(c)) {
            issues.push(PolicyIssue::new("placement.clusterAffinity", "every listed cluster is also excluded"));
        }
    }

    for (i, tol) in placement.cluster_tolerations.iter().enumerate() {
        let path = format!("placement.clusterTolerations[{}]", i);
        match tol.operator.as_deref() {
            None | Some("") | Some("Equal") => {}
            Some("Exists") => {
                if tol.value.as_deref().map_or(false, |v| !v.is_empty()) {
                    issues.push(PolicyIssue::new(&path, "value must be empty when operator is Exists"));
                }
            }
            Some(other) => issues.push(PolicyIssue::new(&path, format!("unknown operator {:?}", other))),
        }
        match tol.effect.as_deref() {
            None | Some("") => {}
            Some(e) if e == EFFECT_NO_SCHEDULE || e == EFFECT_PREFER_NO_SCHEDULE || e == EFFECT_NO_EXECUTE => {}
            Some(other) => issues.push(PolicyIssue::new(&path, format!("unknown effect {:?}", other))),
        }
    }

    for (i, c) in placement.spread_constraints.iter().enumerate() {
        if let Err(e) = c.spread_by().and_then(|_| c.bounds()) {
            issues.push(PolicyIssue::new(format!("placement.spreadConstraints[{}]", i), e.to_string()));
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetplan_core::{ClusterAffinity, FieldSelector, ResourceSelector, SpreadConstraint};
    use k8s_openapi::api::core::v1::{NodeSelectorRequirement, Toleration};

    fn paths(issues: &[PolicyIssue]) -> Vec<&str> { issues.iter().map(|i| i.path.as_str()).collect() }

    #[test]
    fn clean_spec_has_no_issues() {
        let mut spec = PropagationSpec::default();
        spec.resource_selectors = Some(vec![ResourceSelector::new("apps/v1", "Deployment")]);
        spec.placement.spread_constraints = vec![SpreadConstraint::by_label("zone").with_bounds(1, 2)];
        assert!(lint(&spec).is_empty());
    }

    #[test]
    fn empty_selector_list_is_flagged() {
        let spec = PropagationSpec { resource_selectors: Some(Vec::new()), ..Default::default() };
        assert_eq!(paths(&lint(&spec)), vec!["resourceSelector"]);
    }

    #[test]
    fn structural_constraint_errors_are_reported_per_index() {
        let mut spec = PropagationSpec::default();
        spec.placement.spread_constraints = vec![
            SpreadConstraint::by_label("zone"),
            SpreadConstraint { spread_by_field: "rack".into(), ..Default::default() },
            SpreadConstraint::by_label("zone").with_bounds(3, 1),
        ];
        assert_eq!(paths(&lint(&spec)), vec!["placement.spreadConstraints[1]", "placement.spreadConstraints[2]"]);
    }

    #[test]
    fn field_selector_and_toleration_problems() {
        let mut spec = PropagationSpec::default();
        spec.placement.cluster_affinity = Some(ClusterAffinity {
            field_selector: Some(FieldSelector {
                match_expressions: vec![
                    NodeSelectorRequirement { key: "rack".into(), operator: "Exists".into(), values: None },
                    NodeSelectorRequirement { key: "region".into(), operator: "Sometimes".into(), values: None },
                ],
            }),
            ..Default::default()
        });
        spec.placement.cluster_tolerations = vec![Toleration {
            key: Some("gpu".into()),
            operator: Some("Exists".into()),
            value: Some("yes".into()),
            effect: Some("NoWay".into()),
            ..Default::default()
        }];
        let issues = lint(&spec);
        assert_eq!(issues.len(), 4);
        assert!(issues[0].message.contains("rack"));
        assert_eq!(issues[2].path, "placement.clusterTolerations[0]");
        assert!(issues[3].to_string().contains("NoWay"));
    }
}
