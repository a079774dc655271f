//! fleetplan core types: inventory descriptors, the propagation policy schema and the
//! small matcher building blocks shared by the selector and placement crates.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Taint;
use serde::{Deserialize, Serialize};

pub mod error;
pub mod fields;
pub mod policy;
pub mod selector;
pub mod toleration;

pub use error::{ConstraintError, SelectorError, UnknownField, UnknownOperator};
pub use fields::{ClusterField, ClusterFields};
pub use policy::{
    ClusterAffinity, FieldSelector, Placement, PropagationSpec, ResourceSelector, SpreadBy,
    SpreadConstraint,
};
pub use selector::{KeyValues, Operator, Requirement, Selector};

/// Label map used by descriptors. Ordered so serialized output is stable.
pub type Labels = BTreeMap<String, String>;

/// Point-in-time view of a resource in the inventory feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    /// `None` for cluster-scoped objects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: Labels,
}

impl ResourceDescriptor {
    /// `namespace/name`, or just `name` when cluster-scoped.
    pub fn key(&self) -> String {
        match self.namespace.as_deref() {
            Some(ns) if !ns.is_empty() => format!("{}/{}", ns, self.name),
            _ => self.name.clone(),
        }
    }
}

/// Point-in-time view of a member cluster in the fleet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: Labels,
    #[serde(default)]
    pub fields: ClusterFields,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub taints: Vec<Taint>,
}

impl ClusterDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_field(mut self, field: ClusterField, value: impl Into<String>) -> Self {
        self.fields.set(field, value);
        self
    }

    pub fn with_taint(mut self, taint: Taint) -> Self {
        self.taints.push(taint);
        self
    }

    /// Resolve one of the queryable fields. `cluster` resolves to the cluster name.
    pub fn field(&self, field: ClusterField) -> Option<&str> {
        match field {
            ClusterField::Cluster => Some(self.name.as_str()),
            other => self.fields.get(other),
        }
    }
}

pub mod prelude {
    pub use super::{
        ClusterAffinity, ClusterDescriptor, ClusterField, ConstraintError, KeyValues, Labels,
        Placement, PropagationSpec, ResourceDescriptor, ResourceSelector, Selector,
        SelectorError, SpreadBy, SpreadConstraint,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_field_resolves_name_and_optional_fields() {
        let c = ClusterDescriptor::new("c1").with_field(ClusterField::Region, "east");
        assert_eq!(c.field(ClusterField::Cluster), Some("c1"));
        assert_eq!(c.field(ClusterField::Region), Some("east"));
        assert_eq!(c.field(ClusterField::Zone), None);
    }

    #[test]
    fn resource_key_omits_missing_namespace() {
        let mut r = ResourceDescriptor { name: "x".into(), ..Default::default() };
        assert_eq!(r.key(), "x");
        r.namespace = Some("ns-a".into());
        assert_eq!(r.key(), "ns-a/x");
    }

    #[test]
    fn cluster_descriptor_deserializes_with_defaults() {
        let c: ClusterDescriptor = serde_json::from_value(serde_json::json!({
            "name": "member-1",
            "labels": {"env": "prod"},
            "fields": {"region": "us-east", "provider": "aws"},
            "taints": [{"key": "dedicated", "value": "gpu", "effect": "NoSchedule"}]
        }))
        .unwrap();
        assert_eq!(c.name, "member-1");
        assert_eq!(c.field(ClusterField::Provider), Some("aws"));
        assert_eq!(c.taints.len(), 1);
        assert_eq!(c.taints[0].effect, "NoSchedule");
    }
}
