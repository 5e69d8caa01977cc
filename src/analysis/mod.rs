//! Root selection and reachability over the reference graph

mod cycles;
mod keep;
mod reachability;

pub use cycles::{CycleDetector, PrunedCycle};
pub use keep::{KeepPattern, KeepRuleEvaluator, KeepRules, KeepSet};
pub use reachability::{ReachabilityResolver, RetainedSet};
