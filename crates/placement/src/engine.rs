//! Engine: one entry point that answers "which resources, and which clusters".

#![forbid(unsafe_code)]

use fleetplan_core::{ClusterDescriptor, PropagationSpec, ResourceDescriptor};
use fleetplan_select::{select_resources, MatchedResources};
use tracing::{debug, info};

use crate::resolver::{PlacementResult, Resolver};
use crate::units::{LexicographicRanker, UnitRanker};

pub const DEFAULT_SCHEDULER_NAME: &str = "default-scheduler";
pub const SCHEDULER_NAME_ENV: &str = "FLEETPLAN_SCHEDULER_NAME";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Policies naming another scheduler are left alone.
    pub scheduler_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self { Self { scheduler_name: DEFAULT_SCHEDULER_NAME.to_string() } }
}

impl EngineConfig {
    /// Reads [`SCHEDULER_NAME_ENV`]; unset or blank means the default scheduler.
    pub fn from_env() -> Self { Self::named(std::env::var(SCHEDULER_NAME_ENV).ok().as_deref()) }

    /// Trimmed `name`, falling back to the default when it is missing or blank.
    pub fn named(name: Option<&str>) -> Self {
        match name.map(str::trim) {
            Some(v) if !v.is_empty() => Self { scheduler_name: v.to_string() },
            _ => Self::default(),
        }
    }
}

/// Result of evaluating one policy against both inventory snapshots.
#[derive(Debug, Clone)]
pub struct Evaluation<'r> {
    pub matched: MatchedResources<'r>,
    pub placement: PlacementResult,
}

pub struct Engine {
    config: EngineConfig,
    ranker: Box<dyn UnitRanker>,
}

impl Default for Engine {
    fn default() -> Self { Self::new(EngineConfig::default()) }
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self { Self { config, ranker: Box::new(LexicographicRanker) } }

    pub fn with_ranker(mut self, ranker: impl UnitRanker + 'static) -> Self {
        self.ranker = Box::new(ranker);
        self
    }

    pub fn config(&self) -> &EngineConfig { &self.config }

    /// Policies without a `schedulerName` are handled by every engine.
    pub fn owns(&self, spec: &PropagationSpec) -> bool {
        match spec.scheduler_name.as_deref() {
            None | Some("") => true,
            Some(name) => name == self.config.scheduler_name,
        }
    }

    pub fn resolve(&self, spec: &PropagationSpec, clusters: &[ClusterDescriptor]) -> PlacementResult {
        Resolver::with_ranker(self.ranker.as_ref()).resolve(spec, clusters)
    }

    pub fn evaluate<'r>(
        &self,
        spec: &PropagationSpec,
        clusters: &[ClusterDescriptor],
        resources: &'r [ResourceDescriptor],
    ) -> Evaluation<'r> {
        if spec.association {
            debug!("association requested; dependent resources are not followed");
        }
        let matched = select_resources(spec.resource_selectors.as_deref(), resources);
        let placement = self.resolve(spec, clusters);
        info!(resources = matched.len(), clusters = placement.selected_clusters.len(), "policy evaluated");
        Evaluation { matched, placement }
    }
}
