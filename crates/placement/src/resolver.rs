//! Placement resolver: cluster filtering followed by successive spread narrowing.

#![forbid(unsafe_code)]

use fleetplan_core::{ClusterDescriptor, PropagationSpec};
use rustc_hash::FxHashSet;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::filter::{ClusterFilter, Exclusion};
use crate::spread::{group_by, unit_key};
use crate::units::{select_units_ranked, LexicographicRanker, UnitRanker};

/// Outcome of one spread constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintDiagnostic {
    /// Position in the policy's `spreadConstraints` list.
    pub index: usize,
    /// `field:<name>` or `label:<key>`; `None` when the constraint is malformed.
    pub spread_by: Option<String>,
    pub units_found: usize,
    pub selected_units: Vec<String>,
    pub satisfied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ConstraintDiagnostic {
    pub fn units_selected(&self) -> usize { self.selected_units.len() }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterExclusion {
    pub cluster: String,
    pub reason: Exclusion,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementResult {
    /// Target clusters, lexicographic.
    pub selected_clusters: Vec<String>,
    pub diagnostics: Vec<ConstraintDiagnostic>,
    pub exclusions: Vec<ClusterExclusion>,
}

impl PlacementResult {
    pub fn is_empty(&self) -> bool { self.selected_clusters.is_empty() }

    pub fn all_satisfied(&self) -> bool { self.diagnostics.iter().all(|d| d.satisfied) }
}

/// Resolves a policy's placement against a cluster inventory snapshot.
pub struct Resolver<'r> {
    ranker: &'r dyn UnitRanker,
}

impl Default for Resolver<'static> {
    fn default() -> Self { Self { ranker: &LexicographicRanker } }
}

impl<'r> Resolver<'r> {
    pub fn with_ranker(ranker: &'r dyn UnitRanker) -> Self { Self { ranker } }

    pub fn resolve(&self, spec: &PropagationSpec, clusters: &[ClusterDescriptor]) -> PlacementResult {
        let started = std::time::Instant::now();
        let placement = &spec.placement;
        let filter = ClusterFilter::new(placement.cluster_affinity.as_ref(), &placement.cluster_tolerations);

        let mut exclusions: Vec<ClusterExclusion> = Vec::new();
        let mut surviving: Vec<&ClusterDescriptor> = Vec::with_capacity(clusters.len());
        for c in clusters {
            match filter.check(c) {
                Ok(()) => surviving.push(c),
                Err(reason) => {
                    debug!(cluster = %c.name, reason = %reason, "cluster filtered out");
                    metrics::counter!("placement_clusters_excluded_total", 1u64, "reason" => reason.kind());
                    exclusions.push(ClusterExclusion { cluster: c.name.clone(), reason });
                }
            }
        }
        let eligible = surviving.len();

        let mut diagnostics = Vec::with_capacity(placement.spread_constraints.len());
        for (index, constraint) in placement.spread_constraints.iter().enumerate() {
            let validated = constraint.spread_by().and_then(|by| constraint.bounds().map(|b| (by, b)));
            let (by, (minimum, maximum)) = match validated {
                Ok(v) => v,
                Err(e) => {
                    warn!(index, error = %e, "skipping malformed spread constraint");
                    metrics::counter!("placement_constraints_invalid_total", 1u64);
                    diagnostics.push(ConstraintDiagnostic {
                        index,
                        spread_by: None,
                        units_found: 0,
                        selected_units: Vec::new(),
                        satisfied: false,
                        reason: Some(e.to_string()),
                    });
                    continue;
                }
            };

            let groups = group_by(surviving.iter().copied(), &by);
            let selection = select_units_ranked(&groups, minimum, maximum, self.ranker);
            let reason = if selection.satisfied {
                None
            } else {
                warn!(index, spread_by = %by, units = groups.len(), minimum, "spread constraint minimum not reachable; keeping all units");
                metrics::counter!("placement_constraints_unsatisfied_total", 1u64);
                Some(format!("only {} unit(s) available, minimum is {}", groups.len(), minimum))
            };

            let chosen: FxHashSet<&str> = selection.units.iter().map(|s| s.as_str()).collect();
            surviving.retain(|c| {
                let unit = unit_key(c, &by);
                if chosen.contains(unit) { return true; }
                exclusions.push(ClusterExclusion {
                    cluster: c.name.clone(),
                    reason: Exclusion::UnitNotSelected { constraint: index, unit: unit.to_string() },
                });
                false
            });
            debug!(index, spread_by = %by, units = groups.len(), selected = selection.units.len(), remaining = surviving.len(), "spread constraint applied");

            diagnostics.push(ConstraintDiagnostic {
                index,
                spread_by: Some(by.to_string()),
                units_found: groups.len(),
                selected_units: selection.units,
                satisfied: selection.satisfied,
                reason,
            });
        }

        let mut selected_clusters: Vec<String> = surviving.iter().map(|c| c.name.clone()).collect();
        selected_clusters.sort();
        selected_clusters.dedup();

        info!(
            clusters = clusters.len(),
            eligible,
            selected = selected_clusters.len(),
            constraints = diagnostics.len(),
            "placement resolved"
        );
        metrics::counter!("placement_resolutions_total", 1u64);
        metrics::gauge!("placement_selected_clusters", selected_clusters.len() as f64);
        metrics::histogram!("placement_resolve_ms", started.elapsed().as_secs_f64() * 1_000.0);

        PlacementResult { selected_clusters, diagnostics, exclusions }
    }
}

/// Resolve with the default lexicographic unit order.
pub fn resolve(spec: &PropagationSpec, clusters: &[ClusterDescriptor]) -> PlacementResult {
    Resolver::default().resolve(spec, clusters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetplan_core::{ClusterAffinity, ClusterField, SpreadConstraint};

    fn spec_with(constraints: Vec<SpreadConstraint>) -> PropagationSpec {
        let mut spec = PropagationSpec::default();
        spec.placement.spread_constraints = constraints;
        spec
    }

    fn fleet() -> Vec<ClusterDescriptor> {
        vec![
            ClusterDescriptor::new("c1").with_field(ClusterField::Region, "east").with_label("zone", "a"),
            ClusterDescriptor::new("c2").with_field(ClusterField::Region, "east").with_label("zone", "b"),
            ClusterDescriptor::new("c3").with_field(ClusterField::Region, "west").with_label("zone", "a"),
        ]
    }

    #[test]
    fn no_constraints_returns_eligible_set() {
        let out = resolve(&PropagationSpec::default(), &fleet());
        assert_eq!(out.selected_clusters, vec!["c1", "c2", "c3"]);
        assert!(out.diagnostics.is_empty());
        assert!(out.all_satisfied());
    }

    #[test]
    fn malformed_constraint_is_skipped_without_blocking_others() {
        let bad = SpreadConstraint { spread_by_field: "region".into(), spread_by_label: "zone".into(), ..Default::default() };
        let good = SpreadConstraint::by_field(ClusterField::Region).with_bounds(0, 1);
        let out = resolve(&spec_with(vec![bad, good]), &fleet());
        assert_eq!(out.diagnostics.len(), 2);
        assert!(!out.diagnostics[0].satisfied);
        assert!(out.diagnostics[0].reason.is_some());
        assert_eq!(out.diagnostics[0].spread_by, None);
        assert!(out.diagnostics[1].satisfied);
        assert_eq!(out.selected_clusters, vec!["c1", "c2"]);
    }

    #[test]
    fn dropped_clusters_carry_unit_reason() {
        let out = resolve(&spec_with(vec![SpreadConstraint::by_field(ClusterField::Region).with_bounds(0, 1)]), &fleet());
        assert_eq!(
            out.exclusions,
            vec![ClusterExclusion { cluster: "c3".into(), reason: Exclusion::UnitNotSelected { constraint: 0, unit: "west".into() } }]
        );
    }

    #[test]
    fn constraints_narrow_successively() {
        let out = resolve(
            &spec_with(vec![
                SpreadConstraint::by_field(ClusterField::Region).with_bounds(0, 1),
                SpreadConstraint::by_label("zone").with_bounds(0, 1),
            ]),
            &fleet(),
        );
        // east → {c1, c2}; then zone "a" → {c1}
        assert_eq!(out.selected_clusters, vec!["c1"]);
        assert_eq!(out.diagnostics[1].units_found, 2);
        assert_eq!(out.diagnostics[1].selected_units, vec!["a".to_string()]);
    }

    #[test]
    fn empty_result_is_not_an_error() {
        let mut spec = PropagationSpec::default();
        spec.placement.cluster_affinity = Some(ClusterAffinity { cluster_names: vec!["nowhere".into()], ..Default::default() });
        let out = resolve(&spec, &fleet());
        assert!(out.is_empty());
        assert_eq!(out.exclusions.len(), 3);
    }

    #[test]
    fn custom_ranker_changes_choice() {
        let ranker = crate::units::LargestUnitFirst;
        let fleet = vec![
            ClusterDescriptor::new("a1").with_field(ClusterField::Zone, "a"),
            ClusterDescriptor::new("b1").with_field(ClusterField::Zone, "b"),
            ClusterDescriptor::new("b2").with_field(ClusterField::Zone, "b"),
        ];
        let spec = spec_with(vec![SpreadConstraint::by_field(ClusterField::Zone).with_bounds(0, 1)]);
        assert_eq!(resolve(&spec, &fleet).selected_clusters, vec!["a1"]);
        assert_eq!(Resolver::with_ranker(&ranker).resolve(&spec, &fleet).selected_clusters, vec!["b1", "b2"]);
    }
}
