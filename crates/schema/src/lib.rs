//! fleetplan documents: the PropagationPolicy envelope and YAML/JSON loaders for policies,
//! cluster inventories and resource manifests.

#![forbid(unsafe_code)]

use anyhow::{anyhow, bail, Context, Result};
use fleetplan_core::{ClusterDescriptor, PropagationSpec, ResourceDescriptor};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ListMeta, ObjectMeta};
use serde::{Deserialize, Serialize};
use serde_yaml::Value as Yaml;
use tracing::debug;

mod lint;

pub use lint::{lint, PolicyIssue};

pub const API_VERSION: &str = "policy.fleetplan.io/v1alpha1";
pub const KIND_POLICY: &str = "PropagationPolicy";
pub const KIND_POLICY_LIST: &str = "PropagationPolicyList";

const DEFAULT_MAX_YAML_BYTES: usize = 1 << 20;

fn max_yaml_bytes() -> usize { parse_size_limit(std::env::var("FLEETPLAN_MAX_YAML_BYTES").ok().as_deref()) }

fn parse_size_limit(raw: Option<&str>) -> usize {
    raw.and_then(|s| s.trim().parse::<usize>().ok()).unwrap_or(DEFAULT_MAX_YAML_BYTES)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropagationPolicy {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PropagationSpec,
}

impl PropagationPolicy {
    pub fn new(name: impl Into<String>, spec: PropagationSpec) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND_POLICY.to_string(),
            metadata: ObjectMeta { name: Some(name.into()), ..Default::default() },
            spec,
        }
    }

    /// `namespace/name`, or `name` for policies without a namespace.
    pub fn key(&self) -> String {
        let name = self.metadata.name.as_deref().unwrap_or("<unnamed>");
        match self.metadata.namespace.as_deref() {
            Some(ns) if !ns.is_empty() => format!("{}/{}", ns, name),
            _ => name.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropagationPolicyList {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: ListMeta,
    #[serde(default)]
    pub items: Vec<PropagationPolicy>,
}

/// Split `text` into non-empty YAML documents. JSON input is a single YAML document.
fn documents(text: &str) -> Result<Vec<Yaml>> {
    if text.len() > max_yaml_bytes() {
        return Err(anyhow!("input too large (>{} bytes)", max_yaml_bytes()));
    }
    let mut docs = Vec::new();
    for (i, de) in serde_yaml::Deserializer::from_str(text).enumerate() {
        let v = Yaml::deserialize(de).with_context(|| format!("parsing document #{}", i + 1))?;
        if !v.is_null() { docs.push(v); }
    }
    Ok(docs)
}

fn kind_of(doc: &Yaml) -> Option<&str> { doc.get("kind").and_then(|k| k.as_str()) }

/// Policies from `PropagationPolicy` and `PropagationPolicyList` documents.
pub fn load_policies(text: &str) -> Result<Vec<PropagationPolicy>> {
    let mut out = Vec::new();
    for (i, doc) in documents(text)?.into_iter().enumerate() {
        let n = i + 1;
        let kind = kind_of(&doc).map(str::to_string);
        match kind.as_deref() {
            Some(KIND_POLICY) => {
                let p: PropagationPolicy = serde_yaml::from_value(doc).with_context(|| format!("document #{}: decoding {}", n, KIND_POLICY))?;
                out.push(p);
            }
            Some(KIND_POLICY_LIST) => {
                let list: PropagationPolicyList =
                    serde_yaml::from_value(doc).with_context(|| format!("document #{}: decoding {}", n, KIND_POLICY_LIST))?;
                out.extend(list.items);
            }
            Some(other) => bail!("document #{}: unsupported kind {:?}", n, other),
            None => bail!("document #{}: missing kind", n),
        }
    }
    debug!(policies = out.len(), "policies loaded");
    Ok(out)
}

/// Cluster inventory: a sequence of descriptors, an `{items: [...]}` wrapper or a single
/// descriptor per document.
pub fn load_clusters(text: &str) -> Result<Vec<ClusterDescriptor>> {
    let mut out: Vec<ClusterDescriptor> = Vec::new();
    for (i, doc) in documents(text)?.into_iter().enumerate() {
        let n = i + 1;
        let items = if doc.is_sequence() {
            doc
        } else if let Some(items) = doc.get("items").cloned() {
            items
        } else if doc.is_mapping() {
            Yaml::Sequence(vec![doc])
        } else {
            bail!("document #{}: expected a cluster list or mapping", n);
        };
        let clusters: Vec<ClusterDescriptor> =
            serde_yaml::from_value(items).with_context(|| format!("document #{}: decoding clusters", n))?;
        if let Some(c) = clusters.iter().find(|c| c.name.is_empty()) {
            bail!("document #{}: cluster without name (labels: {:?})", n, c.labels);
        }
        out.extend(clusters);
    }
    debug!(clusters = out.len(), "cluster inventory loaded");
    Ok(out)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Manifest {
    api_version: Option<String>,
    kind: Option<String>,
    #[serde(default)]
    metadata: ObjectMeta,
}

fn descriptor_from_manifest(doc: Yaml) -> Result<ResourceDescriptor> {
    let m: Manifest = serde_yaml::from_value(doc).context("decoding manifest")?;
    let api_version = m.api_version.filter(|s| !s.is_empty()).ok_or_else(|| anyhow!("manifest missing apiVersion"))?;
    let kind = m.kind.filter(|s| !s.is_empty()).ok_or_else(|| anyhow!("manifest missing kind"))?;
    let name = m.metadata.name.filter(|s| !s.is_empty()).ok_or_else(|| anyhow!("manifest missing metadata.name"))?;
    Ok(ResourceDescriptor {
        api_version,
        kind,
        name,
        namespace: m.metadata.namespace.filter(|s| !s.is_empty()),
        labels: m.metadata.labels.unwrap_or_default(),
    })
}

/// Resource inventory from Kubernetes manifests; a `kind: List` document contributes its items.
pub fn load_resources(text: &str) -> Result<Vec<ResourceDescriptor>> {
    let mut out = Vec::new();
    for (i, doc) in documents(text)?.into_iter().enumerate() {
        let n = i + 1;
        if kind_of(&doc) == Some("List") {
            let items = match doc.get("items") {
                Some(Yaml::Sequence(items)) => items.clone(),
                Some(Yaml::Null) | None => Vec::new(),
                Some(_) => bail!("document #{}: List items must be a sequence", n),
            };
            for (j, item) in items.into_iter().enumerate() {
                out.push(descriptor_from_manifest(item).with_context(|| format!("document #{}, item #{}", n, j + 1))?);
            }
        } else {
            out.push(descriptor_from_manifest(doc).with_context(|| format!("document #{}", n))?);
        }
    }
    debug!(resources = out.len(), "resource inventory loaded");
    Ok(out)
}
