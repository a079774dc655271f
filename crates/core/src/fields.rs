//! Queryable cluster fields.
//!
//! This module provides:
//! - The closed set of field keys usable in field selectors and `spreadByField`
//! - The storage for the optional fields a cluster reports (provider/region/zone)

#![forbid(unsafe_code)]

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::UnknownField;

use crate::selector::KeyValues;
use crate::ClusterDescriptor;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterField {
    Cluster,
    Provider,
    Region,
    Zone,
}

impl ClusterField {
    pub const ALL: [ClusterField; 4] = [
        ClusterField::Cluster,
        ClusterField::Provider,
        ClusterField::Region,
        ClusterField::Zone,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ClusterField::Cluster => "cluster",
            ClusterField::Provider => "provider",
            ClusterField::Region => "region",
            ClusterField::Zone => "zone",
        }
    }
}

impl fmt::Display for ClusterField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClusterField {
    type Err = UnknownField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ClusterField::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| UnknownField(s.to_string()))
    }
}

/// Optional field values reported by a member cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
}

impl ClusterFields {
    /// `Cluster` is not stored here; see [`ClusterDescriptor::field`].
    pub fn get(&self, field: ClusterField) -> Option<&str> {
        match field {
            ClusterField::Cluster => None,
            ClusterField::Provider => self.provider.as_deref(),
            ClusterField::Region => self.region.as_deref(),
            ClusterField::Zone => self.zone.as_deref(),
        }
    }

    pub fn set(&mut self, field: ClusterField, value: impl Into<String>) {
        let slot = match field {
            ClusterField::Cluster => return,
            ClusterField::Provider => &mut self.provider,
            ClusterField::Region => &mut self.region,
            ClusterField::Zone => &mut self.zone,
        };
        *slot = Some(value.into());
    }
}

/// Field view of a cluster for selector evaluation. Unknown keys resolve to absent.
pub struct FieldView<'a>(pub &'a ClusterDescriptor);

impl KeyValues for FieldView<'_> {
    fn lookup(&self, key: &str) -> Option<&str> {
        let field = key.parse::<ClusterField>().ok()?;
        self.0.field(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_every_field() {
        for f in ClusterField::ALL {
            assert_eq!(f.as_str().parse::<ClusterField>(), Ok(f));
        }
        assert!("datacenter".parse::<ClusterField>().is_err());
        assert!("Region".parse::<ClusterField>().is_err());
        let err = "rack".parse::<ClusterField>().unwrap_err();
        assert_eq!(err, UnknownField("rack".into()));
        assert_eq!(err.to_string(), "unknown cluster field \"rack\"");
    }

    #[test]
    fn setting_cluster_field_is_ignored() {
        let mut fields = ClusterFields::default();
        fields.set(ClusterField::Cluster, "nope");
        assert_eq!(fields, ClusterFields::default());
    }

    #[test]
    fn field_view_resolves_known_keys_only() {
        let c = ClusterDescriptor::new("c1").with_field(ClusterField::Zone, "z1");
        let view = FieldView(&c);
        assert_eq!(view.lookup("zone"), Some("z1"));
        assert_eq!(view.lookup("cluster"), Some("c1"));
        assert_eq!(view.lookup("rack"), None);
    }
}
