//! fleetplan select: matches resource descriptors against policy resource selectors.
//! Stateless; every call works on a borrowed inventory snapshot.

#![forbid(unsafe_code)]

use fleetplan_core::{ResourceDescriptor, ResourceSelector, Selector, SelectorError};
use rustc_hash::FxHashSet;
use tracing::{debug, warn};

/// Single-resource contract: does `resource` satisfy `selector`?
pub fn matches(resource: &ResourceDescriptor, selector: &ResourceSelector) -> bool {
    CompiledSelector::new(selector).matches(resource)
}

/// Per-stage survivor counts, summed over every selector evaluated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MatchDebugInfo {
    pub total: usize,
    pub selectors: usize,
    pub after_kind: usize,
    pub after_names: usize,
    pub after_namespaces: usize,
    pub after_excluded: usize,
    pub after_labels: usize,
    pub matched: usize,
}

/// Stage at which a resource was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Kind,
    Name,
    Namespace,
    ExcludedNamespace,
    Labels,
}

enum LabelFilter {
    Any,
    Match(Selector),
    Invalid,
}

/// A `ResourceSelector` prepared for evaluation over many resources.
pub struct CompiledSelector<'s> {
    api_version: &'s str,
    kind: &'s str,
    names: FxHashSet<&'s str>,
    namespaces: FxHashSet<&'s str>,
    excluded: FxHashSet<&'s str>,
    labels: LabelFilter,
}

impl<'s> CompiledSelector<'s> {
    pub fn new(sel: &'s ResourceSelector) -> Self {
        let labels = match sel.label_selector.as_ref().map(Selector::from_label_selector) {
            None => LabelFilter::Any,
            Some(Ok(s)) if s.is_empty() => LabelFilter::Any,
            Some(Ok(s)) => LabelFilter::Match(s),
            Some(Err(e)) => {
                warn!(api_version = %sel.api_version, kind = %sel.kind, error = %e, "invalid label selector; selector matches nothing");
                LabelFilter::Invalid
            }
        };
        Self {
            api_version: &sel.api_version,
            kind: &sel.kind,
            names: sel.names.iter().map(|s| s.as_str()).collect(),
            namespaces: sel.namespaces.iter().map(|s| s.as_str()).collect(),
            excluded: sel.exclude_namespaces.iter().map(|s| s.as_str()).collect(),
            labels,
        }
    }

    /// Label selector compile error, if any.
    pub fn label_error(sel: &ResourceSelector) -> Option<SelectorError> {
        sel.label_selector.as_ref().and_then(|l| Selector::from_label_selector(l).err())
    }

    pub fn matches(&self, r: &ResourceDescriptor) -> bool {
        self.check(r).is_ok()
    }

    /// Evaluate in order kind → names → namespaces → exclusions → labels.
    pub fn check(&self, r: &ResourceDescriptor) -> Result<(), Rejection> {
        if r.api_version != self.api_version || r.kind != self.kind { return Err(Rejection::Kind); }
        if !self.names.is_empty() && !self.names.contains(r.name.as_str()) { return Err(Rejection::Name); }
        let ns = r.namespace.as_deref().filter(|s| !s.is_empty());
        if !self.namespaces.is_empty() && !ns.map(|n| self.namespaces.contains(n)).unwrap_or(false) {
            return Err(Rejection::Namespace);
        }
        if ns.map(|n| self.excluded.contains(n)).unwrap_or(false) { return Err(Rejection::ExcludedNamespace); }
        // An unlabeled resource only passes an absent or empty label selector.
        match &self.labels {
            LabelFilter::Any => Ok(()),
            LabelFilter::Match(s) if !r.labels.is_empty() && s.matches(&r.labels) => Ok(()),
            LabelFilter::Match(_) | LabelFilter::Invalid => Err(Rejection::Labels),
        }
    }
}

/// Resources matched by a policy, in (apiVersion, kind, namespace, name) order.
#[derive(Debug, Clone, Default)]
pub struct MatchedResources<'r> {
    pub items: Vec<&'r ResourceDescriptor>,
    pub debug: MatchDebugInfo,
}

impl MatchedResources<'_> {
    pub fn len(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
}

/// Apply a policy's selector list to an inventory.
///
/// `None` selects every resource, `Some(&[])` selects none; otherwise the result is the
/// de-duplicated union of each selector's matches.
pub fn select_resources<'r>(selectors: Option<&[ResourceSelector]>, resources: &'r [ResourceDescriptor]) -> MatchedResources<'r> {
    let started = std::time::Instant::now();
    let mut dbg = MatchDebugInfo { total: resources.len(), ..MatchDebugInfo::default() };

    let mut items: Vec<&'r ResourceDescriptor> = match selectors {
        None => {
            dbg.after_kind = resources.len();
            dbg.after_names = resources.len();
            dbg.after_namespaces = resources.len();
            dbg.after_excluded = resources.len();
            dbg.after_labels = resources.len();
            resources.iter().collect()
        }
        Some(list) => {
            dbg.selectors = list.len();
            let compiled: Vec<CompiledSelector<'_>> = list.iter().map(CompiledSelector::new).collect();
            let mut hit = vec![false; resources.len()];
            for sel in compiled.iter() {
                for (i, r) in resources.iter().enumerate() {
                    let outcome = sel.check(r);
                    let reached = match outcome {
                        Err(Rejection::Kind) => 0,
                        Err(Rejection::Name) => 1,
                        Err(Rejection::Namespace) => 2,
                        Err(Rejection::ExcludedNamespace) => 3,
                        Err(Rejection::Labels) => 4,
                        Ok(()) => 5,
                    };
                    if reached >= 1 { dbg.after_kind += 1; }
                    if reached >= 2 { dbg.after_names += 1; }
                    if reached >= 3 { dbg.after_namespaces += 1; }
                    if reached >= 4 { dbg.after_excluded += 1; }
                    if reached >= 5 {
                        dbg.after_labels += 1;
                        hit[i] = true;
                    }
                }
            }
            resources.iter().zip(hit).filter_map(|(r, h)| h.then_some(r)).collect()
        }
    };

    // Stable ordering independent of inventory order
    items.sort_by(|a, b| {
        a.api_version
            .cmp(&b.api_version)
            .then_with(|| a.kind.cmp(&b.kind))
            .then_with(|| a.namespace.cmp(&b.namespace))
            .then_with(|| a.name.cmp(&b.name))
    });
    items.dedup();
    dbg.matched = items.len();
    debug!(total = dbg.total, selectors = dbg.selectors, matched = dbg.matched, "resource selection evaluated");
    metrics::gauge!("select_resources_matched", items.len() as f64);
    metrics::histogram!("select_eval_ms", started.elapsed().as_secs_f64() * 1_000.0);
    MatchedResources { items, debug: dbg }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};

    fn res(kind: &str, ns: Option<&str>, name: &str, labels: &[(&str, &str)]) -> ResourceDescriptor {
        ResourceDescriptor {
            api_version: "apps/v1".into(),
            kind: kind.into(),
            name: name.into(),
            namespace: ns.map(|s| s.to_string()),
            labels: labels.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect(),
        }
    }

    fn deployments() -> ResourceSelector { ResourceSelector::new("apps/v1", "Deployment") }

    #[test]
    fn kind_and_version_are_exact() {
        let r = res("Deployment", Some("ns-a"), "x", &[]);
        assert!(matches(&r, &deployments()));
        assert!(!matches(&r, &ResourceSelector::new("apps/v1beta1", "Deployment")));
        assert!(!matches(&r, &ResourceSelector::new("apps/v1", "deployment")));
    }

    #[test]
    fn exclusion_vetoes_included_namespace() {
        let r = res("Deployment", Some("ns-a"), "x", &[]);
        let mut sel = deployments();
        sel.namespaces = vec!["ns-a".into()];
        sel.exclude_namespaces = vec!["ns-a".into()];
        assert!(!matches(&r, &sel));
        let mut all_but = deployments();
        all_but.exclude_namespaces = vec!["kube-system".into()];
        assert!(matches(&r, &all_but));
        assert!(!matches(&res("Deployment", Some("kube-system"), "y", &[]), &all_but));
    }

    #[test]
    fn cluster_scoped_resources_fail_namespace_allow_list() {
        let r = ResourceDescriptor { api_version: "v1".into(), kind: "Namespace".into(), name: "ns-a".into(), ..Default::default() };
        let mut sel = ResourceSelector::new("v1", "Namespace");
        assert!(matches(&r, &sel));
        sel.exclude_namespaces = vec!["ns-a".into()];
        assert!(matches(&r, &sel));
        sel.namespaces = vec!["ns-a".into()];
        assert!(!matches(&r, &sel));
    }

    #[test]
    fn names_allow_list() {
        let mut sel = deployments();
        sel.names = vec!["x".into()];
        assert!(matches(&res("Deployment", Some("a"), "x", &[]), &sel));
        assert!(!matches(&res("Deployment", Some("a"), "y", &[]), &sel));
    }

    #[test]
    fn label_selector_semantics() {
        let mut sel = deployments();
        sel.label_selector = Some(LabelSelector {
            match_labels: Some([("app".to_string(), "web".to_string())].into_iter().collect()),
            match_expressions: None,
        });
        assert!(matches(&res("Deployment", Some("a"), "x", &[("app", "web")]), &sel));
        assert!(!matches(&res("Deployment", Some("a"), "x", &[]), &sel));

        sel.label_selector = Some(LabelSelector::default());
        assert!(matches(&res("Deployment", Some("a"), "x", &[]), &sel));
    }

    #[test]
    fn unlabeled_resource_needs_an_empty_selector() {
        let bare = res("Deployment", Some("a"), "x", &[]);
        for (key, op, values) in [("canary", "DoesNotExist", vec![]), ("env", "NotIn", vec!["prod".to_string()])] {
            let mut sel = deployments();
            sel.label_selector = Some(LabelSelector {
                match_labels: None,
                match_expressions: Some(vec![LabelSelectorRequirement { key: key.into(), operator: op.into(), values: Some(values) }]),
            });
            assert!(!matches(&bare, &sel), "{} {}", op, key);
            assert!(matches(&res("Deployment", Some("a"), "x", &[("app", "web")]), &sel), "{} {}", op, key);
        }
    }

    #[test]
    fn invalid_label_selector_matches_nothing() {
        let mut sel = deployments();
        sel.label_selector = Some(LabelSelector {
            match_labels: None,
            match_expressions: Some(vec![LabelSelectorRequirement { key: "app".into(), operator: "Near".into(), values: None }]),
        });
        assert!(CompiledSelector::label_error(&sel).is_some());
        assert!(!matches(&res("Deployment", Some("a"), "x", &[("app", "web")]), &sel));
    }

    #[test]
    fn debug_counts_track_each_stage() {
        let inv = vec![
            res("Deployment", Some("ns-a"), "x", &[]),
            res("Deployment", Some("ns-b"), "y", &[]),
            res("StatefulSet", Some("ns-a"), "z", &[]),
        ];
        let mut sel = deployments();
        sel.namespaces = vec!["ns-a".into()];
        let out = select_resources(Some(std::slice::from_ref(&sel)), &inv);
        assert_eq!(out.debug.total, 3);
        assert_eq!(out.debug.after_kind, 2);
        assert_eq!(out.debug.after_names, 2);
        assert_eq!(out.debug.after_namespaces, 1);
        assert_eq!(out.debug.matched, 1);
        assert_eq!(out.items[0].name, "x");
    }

    #[test]
    fn overlapping_selectors_do_not_duplicate() {
        let inv = vec![res("Deployment", Some("ns-a"), "x", &[])];
        let out = select_resources(Some(&[deployments(), deployments()][..]), &inv);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn duplicate_inventory_entries_collapse() {
        let inv = vec![res("Deployment", Some("ns-a"), "x", &[]), res("Deployment", Some("ns-a"), "x", &[])];
        let all = select_resources(None, &inv);
        assert_eq!(all.len(), 1);
        assert_eq!(all.debug.matched, 1);
        assert_eq!(select_resources(Some(std::slice::from_ref(&deployments())), &inv).len(), 1);
    }
}
