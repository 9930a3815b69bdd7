//! Fixed-point optimization driver
//!
//! Runs the cleanup passes once, then iterates matcher + rewriter over the
//! configured rule list until a full pass over all rules produces zero
//! matches. Termination is only guaranteed for rule sets that strictly
//! reduce node count per application (a documented contract for rule
//! authors), so the loop is capped and exceeding the cap is reported as a
//! non-termination error instead of spinning forever.

use tracing::debug;

use crate::cleanup::{remove_cast, remove_duplicate};
use crate::error::{ReformError, ReformResult};
use crate::graph::Graph;
use crate::pattern::{find_matches, ReformRule};
use crate::rewrite::apply_matches;

pub use crate::rewrite::RenameMap;

/// Driver configuration
#[derive(Debug, Clone)]
pub struct ReformConfig {
    /// Maximum number of full passes over the rule list
    pub max_passes: usize,
}

impl Default for ReformConfig {
    fn default() -> Self {
        Self { max_passes: 100 }
    }
}

/// The optimization engine: a rule list and its driver loop
#[derive(Debug)]
pub struct ReformEngine {
    rules: Vec<ReformRule>,
    config: ReformConfig,
}

impl ReformEngine {
    /// Create an engine over the given rules, applied in list order
    pub fn new(rules: Vec<ReformRule>) -> Self {
        Self {
            rules,
            config: ReformConfig::default(),
        }
    }

    /// Override the default configuration
    pub fn with_config(mut self, config: ReformConfig) -> Self {
        self.config = config;
        self
    }

    /// The configured rules
    pub fn rules(&self) -> &[ReformRule] {
        &self.rules
    }

    /// Canonicalize the graph in place.
    ///
    /// Returns the rename map accumulated over all rule applications, for
    /// downstream metadata that must stay consistent with renamed tensors.
    pub fn run(&self, graph: &mut Graph) -> ReformResult<RenameMap> {
        remove_cast(graph);
        remove_duplicate(graph);

        let mut rename_map = RenameMap::new();
        let mut passes = 0usize;
        loop {
            let mut replaced = false;
            for rule in &self.rules {
                let matches = find_matches(graph, rule)?;
                if !matches.is_empty() {
                    replaced = true;
                }
                apply_matches(graph, &matches, &mut rename_map)?;
            }
            if !replaced {
                break;
            }
            passes += 1;
            debug!(pass = passes, nodes = graph.node_count(), "pass complete");
            if passes >= self.config.max_passes {
                return Err(ReformError::NonTermination(passes));
            }
        }
        Ok(rename_map)
    }
}
