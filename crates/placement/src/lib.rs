//! fleetplan placement: decides which member clusters a policy targets.
//!
//! Pipeline per policy: [`ClusterFilter`] (affinity + tolerations) over the inventory,
//! then each spread constraint in order groups the survivors into units
//! ([`spread`]), picks units within bounds ([`units`]) and narrows the set.

#![forbid(unsafe_code)]

pub mod engine;
pub mod filter;
pub mod resolver;
pub mod spread;
pub mod units;

pub use engine::{Engine, EngineConfig, Evaluation, DEFAULT_SCHEDULER_NAME, SCHEDULER_NAME_ENV};
pub use filter::{eligible, ClusterFilter, Exclusion};
pub use resolver::{resolve, ClusterExclusion, ConstraintDiagnostic, PlacementResult, Resolver};
pub use spread::{group, group_by, unit_key, Groups, UNKEYED_UNIT};
pub use units::{select_units, select_units_ranked, LargestUnitFirst, LexicographicRanker, UnitRanker, UnitSelection};
