//! Unit selector: chooses which spread units participate, under min/max bounds.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use rustc_hash::FxHashSet;
use serde::Serialize;

use crate::spread::Groups;

/// Orders candidate units by preference. The selector takes a prefix of this order.
///
/// Implementations may only reorder: keys not present in `groups` and duplicates are
/// ignored, and omitted keys are appended in lexicographic order.
pub trait UnitRanker: Send + Sync {
    fn rank(&self, groups: &Groups<'_>) -> Vec<String>;
}

/// Default ranker: ascending lexicographic key order.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicographicRanker;

impl UnitRanker for LexicographicRanker {
    fn rank(&self, groups: &Groups<'_>) -> Vec<String> {
        groups.keys().cloned().collect()
    }
}

/// Prefers units with more clusters; ties fall back to key order.
#[derive(Debug, Clone, Copy, Default)]
pub struct LargestUnitFirst;

impl UnitRanker for LargestUnitFirst {
    fn rank(&self, groups: &Groups<'_>) -> Vec<String> {
        let mut keys: Vec<(&String, usize)> = groups.iter().map(|(k, v)| (k, v.len())).collect();
        keys.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        keys.into_iter().map(|(k, _)| k.clone()).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitSelection {
    /// Selected unit keys in preference order.
    pub units: Vec<String>,
    /// False when fewer units exist than the constraint's minimum.
    pub satisfied: bool,
    /// Cluster count per selected unit.
    pub usable: BTreeMap<String, usize>,
}

fn sanitized_order(groups: &Groups<'_>, ranked: Vec<String>) -> Vec<String> {
    let mut seen: FxHashSet<String> = FxHashSet::default();
    let mut order: Vec<String> = Vec::with_capacity(groups.len());
    for key in ranked.into_iter().chain(groups.keys().cloned()) {
        if groups.contains_key(&key) && seen.insert(key.clone()) {
            order.push(key);
        }
    }
    order
}

/// Select units with the default lexicographic order.
pub fn select_units(groups: &Groups<'_>, minimum: usize, maximum: usize) -> UnitSelection {
    select_units_ranked(groups, minimum, maximum, &LexicographicRanker)
}

/// Select at most `maximum` units (0 = all) in `ranker` order. When fewer than `minimum`
/// units exist every unit is kept and the selection is reported unsatisfied.
pub fn select_units_ranked(groups: &Groups<'_>, minimum: usize, maximum: usize, ranker: &dyn UnitRanker) -> UnitSelection {
    let available = groups.len();
    let satisfied = minimum == 0 || available >= minimum;
    let take = if maximum > 0 { maximum.min(available) } else { available };
    let units: Vec<String> = sanitized_order(groups, ranker.rank(groups)).into_iter().take(take).collect();
    let usable = units.iter().map(|k| (k.clone(), groups.get(k).map(|v| v.len()).unwrap_or(0))).collect();
    UnitSelection { units, satisfied, usable }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetplan_core::ClusterDescriptor;

    fn groups<'a>(fleet: &'a [ClusterDescriptor], layout: &[(&str, Vec<usize>)]) -> Groups<'a> {
        layout
            .iter()
            .map(|(k, idx)| ((*k).to_string(), idx.iter().map(|i| &fleet[*i]).collect()))
            .collect()
    }

    fn fleet(n: usize) -> Vec<ClusterDescriptor> {
        (0..n).map(|i| ClusterDescriptor::new(format!("c{}", i))).collect()
    }

    #[test]
    fn maximum_takes_lexicographic_prefix() {
        let f = fleet(3);
        let g = groups(&f, &[("west", vec![2]), ("east", vec![0, 1])]);
        let sel = select_units(&g, 0, 1);
        assert_eq!(sel.units, vec!["east".to_string()]);
        assert!(sel.satisfied);
        assert_eq!(sel.usable.get("east"), Some(&2));
    }

    #[test]
    fn zero_maximum_selects_all() {
        let f = fleet(3);
        let g = groups(&f, &[("a", vec![0]), ("b", vec![1]), ("c", vec![2])]);
        assert_eq!(select_units(&g, 0, 0).units.len(), 3);
        assert_eq!(select_units(&g, 0, 10).units.len(), 3);
    }

    #[test]
    fn unreachable_minimum_keeps_everything_and_reports() {
        let f = fleet(2);
        let g = groups(&f, &[("a", vec![0]), ("b", vec![1])]);
        let sel = select_units(&g, 3, 0);
        assert!(!sel.satisfied);
        assert_eq!(sel.units, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn empty_groups_with_minimum_is_unsatisfied() {
        let g: Groups<'_> = Groups::new();
        let sel = select_units(&g, 1, 0);
        assert!(!sel.satisfied);
        assert!(sel.units.is_empty());
        assert!(select_units(&g, 0, 0).satisfied);
    }

    #[test]
    fn bounds_hold_for_every_combination() {
        let f = fleet(5);
        let g = groups(&f, &[("a", vec![0]), ("b", vec![1]), ("c", vec![2]), ("d", vec![3]), ("e", vec![4])]);
        for min in 0..=6 {
            for max in 0..=6 {
                if min > 0 && max > 0 && min > max { continue; }
                let sel = select_units(&g, min, max);
                if max > 0 { assert!(sel.units.len() <= max); }
                if g.len() >= min { assert!(sel.units.len() >= min); assert!(sel.satisfied); }
                for u in sel.units.iter() { assert!(g.contains_key(u)); }
            }
        }
    }

    struct Rogue;
    impl UnitRanker for Rogue {
        fn rank(&self, _groups: &Groups<'_>) -> Vec<String> {
            vec!["c".into(), "ghost".into(), "c".into()]
        }
    }

    #[test]
    fn ranker_can_only_reorder() {
        let f = fleet(3);
        let g = groups(&f, &[("a", vec![0]), ("b", vec![1]), ("c", vec![2])]);
        let sel = select_units_ranked(&g, 0, 0, &Rogue);
        assert_eq!(sel.units, vec!["c".to_string(), "a".to_string(), "b".to_string()]);
        let two = select_units_ranked(&g, 0, 2, &Rogue);
        assert_eq!(two.units, vec!["c".to_string(), "a".to_string()]);
    }

    #[test]
    fn largest_unit_first_prefers_bigger_units() {
        let f = fleet(4);
        let g = groups(&f, &[("a", vec![0]), ("b", vec![1, 2, 3])]);
        let sel = select_units_ranked(&g, 0, 1, &LargestUnitFirst);
        assert_eq!(sel.units, vec!["b".to_string()]);
    }
}
