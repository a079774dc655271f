//! Spread grouper: partitions clusters into units by a field or label value.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use fleetplan_core::{ClusterDescriptor, ConstraintError, SpreadBy, SpreadConstraint};

/// Unit key for clusters that lack the grouping field or label.
pub const UNKEYED_UNIT: &str = "";

/// Units keyed by field/label value; iteration is lexicographic on the key.
pub type Groups<'a> = BTreeMap<String, Vec<&'a ClusterDescriptor>>;

/// Grouping key of `cluster` under `by`; missing values map to [`UNKEYED_UNIT`].
pub fn unit_key<'c>(cluster: &'c ClusterDescriptor, by: &SpreadBy) -> &'c str {
    let value = match by {
        SpreadBy::Field(field) => cluster.field(*field),
        SpreadBy::Label(key) => cluster.labels.get(key).map(|s| s.as_str()),
    };
    value.unwrap_or(UNKEYED_UNIT)
}

/// Group `clusters` by an already validated key source. Every cluster lands in exactly
/// one unit; cluster order inside a unit follows input order.
pub fn group_by<'a, I>(clusters: I, by: &SpreadBy) -> Groups<'a>
where
    I: IntoIterator<Item = &'a ClusterDescriptor>,
{
    let mut groups: Groups<'a> = BTreeMap::new();
    for c in clusters {
        groups.entry(unit_key(c, by).to_string()).or_default().push(c);
    }
    groups
}

/// Contract form: validate `constraint` and group `clusters` by its key source.
pub fn group<'a, I>(clusters: I, constraint: &SpreadConstraint) -> Result<Groups<'a>, ConstraintError>
where
    I: IntoIterator<Item = &'a ClusterDescriptor>,
{
    let by = constraint.spread_by()?;
    Ok(group_by(clusters, &by))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetplan_core::ClusterField;

    fn fleet() -> Vec<ClusterDescriptor> {
        vec![
            ClusterDescriptor::new("c3").with_field(ClusterField::Region, "west").with_label("zone", "b"),
            ClusterDescriptor::new("c1").with_field(ClusterField::Region, "east").with_label("zone", "a"),
            ClusterDescriptor::new("c2").with_field(ClusterField::Region, "east"),
        ]
    }

    fn keys<'a>(g: &'a Groups<'_>) -> Vec<&'a str> { g.keys().map(|k| k.as_str()).collect() }

    #[test]
    fn groups_by_field_in_key_order() {
        let f = fleet();
        let g = group(&f, &SpreadConstraint::by_field(ClusterField::Region)).unwrap();
        assert_eq!(keys(&g), vec!["east", "west"]);
        let east: Vec<&str> = g["east"].iter().map(|c| c.name.as_str()).collect();
        assert_eq!(east, vec!["c1", "c2"]);
    }

    #[test]
    fn missing_label_lands_in_unkeyed_unit() {
        let f = fleet();
        let g = group(&f, &SpreadConstraint::by_label("zone")).unwrap();
        assert_eq!(keys(&g), vec![UNKEYED_UNIT, "a", "b"]);
        assert_eq!(g[UNKEYED_UNIT][0].name, "c2");
        assert_eq!(g.values().map(|v| v.len()).sum::<usize>(), f.len());
    }

    #[test]
    fn spreading_by_cluster_gives_one_unit_per_cluster() {
        let f = fleet();
        let g = group(&f, &SpreadConstraint::by_field(ClusterField::Cluster)).unwrap();
        assert_eq!(keys(&g), vec!["c1", "c2", "c3"]);
    }

    #[test]
    fn invalid_constraint_is_rejected() {
        let f = fleet();
        assert_eq!(group(&f, &SpreadConstraint::default()).err(), Some(ConstraintError::NoKey));
    }
}
