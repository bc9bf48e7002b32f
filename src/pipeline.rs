//! Lowering pipeline.
//!
//! ```text
//! text ─► parse_graph ─► Graph
//!                          │
//!                          ▼
//!               guard-raise elimination ─► DCE ─► verify
//!                          │
//!                          ▼
//!          guarded-computation promotion ─► DCE ─► verify
//!                          │
//!                          ▼
//!                     print_graph
//! ```
//!
//! Which passes run, in which order, and whether DCE and verification follow
//! each of them is controlled by [`LoweringConfig`].

use std::fmt;
use std::path::Path;

use guardlift_ir::{Graph, OpName, parse_graph, print_graph, verify_graph};
use guardlift_passes::{
    DceConfig, DceResult, PassConfig, PassReport, PromotableKinds,
    eliminate_dead_code_with_config, eliminate_guard_raise_with_config,
    promote_guarded_computation_with_config,
};

use crate::error::{Error, Result};
use crate::logger::GraphLogger;

/// The rewrites the pipeline can schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    GuardRaise,
    Promote,
}

impl PassKind {
    pub fn name(self) -> &'static str {
        match self {
            PassKind::GuardRaise => "guard-raise",
            PassKind::Promote => "promote",
        }
    }
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Configuration for a pipeline run.
#[derive(Debug, Clone)]
pub struct LoweringConfig {
    /// Operators the promotion pass may hoist.
    pub promotable_kinds: PromotableKinds,
    /// Passes to run, in order. Default: guard-raise, then promote.
    pub passes: Vec<PassKind>,
    /// Run DCE after every pass. Default: true.
    pub run_dce: bool,
    /// Verify the graph after every pass. Default: on in debug builds.
    pub verify: bool,
    pub pass: PassConfig,
    pub dce: DceConfig,
}

impl Default for LoweringConfig {
    fn default() -> Self {
        Self {
            promotable_kinds: PromotableKinds::default(),
            passes: vec![PassKind::GuardRaise, PassKind::Promote],
            run_dce: true,
            verify: cfg!(debug_assertions),
            pass: PassConfig::default(),
            dce: DceConfig::default(),
        }
    }
}

impl LoweringConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the promotable operator set.
    pub fn promotable_kinds(mut self, kinds: PromotableKinds) -> Self {
        self.promotable_kinds = kinds;
        self
    }

    /// Add one operator to the promotable set.
    pub fn promote(mut self, kind: OpName) -> Self {
        self.promotable_kinds.insert(kind);
        self
    }

    /// Replace the pass list.
    pub fn passes(mut self, passes: impl IntoIterator<Item = PassKind>) -> Self {
        self.passes = passes.into_iter().collect();
        self
    }

    pub fn run_dce(mut self, enabled: bool) -> Self {
        self.run_dce = enabled;
        self
    }

    pub fn verify(mut self, enabled: bool) -> Self {
        self.verify = enabled;
        self
    }

    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.pass.max_iterations = max_iterations;
        self.dce.max_iterations = max_iterations;
        self
    }

    /// Mark an operator as side-effecting so DCE keeps it.
    pub fn impure(mut self, kind: OpName) -> Self {
        self.dce.impure.insert(kind);
        self
    }
}

/// What a single scheduled pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassOutcome {
    pub pass: PassKind,
    pub report: PassReport,
    pub dce: Option<DceResult>,
}

/// A lowered graph together with per-pass outcomes.
pub struct Lowered {
    pub graph: Graph,
    pub outcomes: Vec<PassOutcome>,
}

impl fmt::Debug for Lowered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lowered")
            .field("graph", &print_graph(&self.graph))
            .field("outcomes", &self.outcomes)
            .finish()
    }
}

/// Run the configured passes over `graph` in place.
pub fn run_pipeline(
    graph: &mut Graph,
    config: &LoweringConfig,
    logger: &dyn GraphLogger,
) -> Result<Vec<PassOutcome>> {
    let mut outcomes = Vec::with_capacity(config.passes.len());

    for &pass in &config.passes {
        logger.pass_started(pass.name(), graph);

        let report = match pass {
            PassKind::GuardRaise => eliminate_guard_raise_with_config(graph, &config.pass)?,
            PassKind::Promote => promote_guarded_computation_with_config(
                graph,
                &config.promotable_kinds,
                &config.pass,
            )?,
        };
        if !report.reached_fixpoint {
            tracing::warn!(
                %pass,
                iterations = report.iterations,
                "pass stopped before reaching a fixpoint"
            );
        }

        let dce = config
            .run_dce
            .then(|| eliminate_dead_code_with_config(graph, &config.dce));

        if config.verify {
            let result = verify_graph(graph);
            if !result.is_ok() {
                return Err(Error::Validation {
                    stage: pass.name(),
                    result,
                });
            }
        }

        tracing::info!(
            %pass,
            rewritten = report.rewritten,
            removed = dce.as_ref().map_or(0, |d| d.removed_count),
            "pass finished"
        );
        logger.pass_finished(pass.name(), graph);

        outcomes.push(PassOutcome { pass, report, dce });
    }

    Ok(outcomes)
}

/// Parse `source` and run the pipeline over it.
pub fn lower_text(
    source: &str,
    config: &LoweringConfig,
    logger: &dyn GraphLogger,
) -> Result<Lowered> {
    let mut graph = parse_graph(source)?;
    let outcomes = run_pipeline(&mut graph, config, logger)?;
    Ok(Lowered { graph, outcomes })
}

/// Read a graph from `path` and run the pipeline over it.
pub fn lower_file(
    path: &Path,
    config: &LoweringConfig,
    logger: &dyn GraphLogger,
) -> Result<Lowered> {
    let source = std::fs::read_to_string(path)?;
    lower_text(&source, config, logger)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::NoopLogger;

    #[test]
    fn default_config() {
        let config = LoweringConfig::default();
        assert_eq!(config.passes, [PassKind::GuardRaise, PassKind::Promote]);
        assert!(config.run_dce);
        assert_eq!(config.pass.max_iterations, 100);
        assert!(
            config
                .promotable_kinds
                .contains(&OpName::new("aten", "upsample_bilinear2d"))
        );
    }

    #[test]
    fn builder_overrides() {
        let config = LoweringConfig::new()
            .passes([PassKind::Promote])
            .promote(OpName::new("aten", "upsample_nearest2d"))
            .run_dce(false)
            .verify(true)
            .max_iterations(7)
            .impure(OpName::new("aten", "print"));

        assert_eq!(config.passes, [PassKind::Promote]);
        assert_eq!(config.promotable_kinds.len(), 2);
        assert!(!config.run_dce);
        assert!(config.verify);
        assert_eq!(config.pass.max_iterations, 7);
        assert_eq!(config.dce.max_iterations, 7);
        assert!(config.dce.impure.contains(&OpName::new("aten", "print")));
    }

    #[test]
    fn empty_pass_list_leaves_graph_alone() {
        let source = "graph(%x: core.tensor) {
  %0 = aten.abs(%x) : core.tensor
}
";
        let config = LoweringConfig::new().passes([]);
        let lowered = lower_text(source, &config, &NoopLogger).unwrap();
        assert!(lowered.outcomes.is_empty());
        assert_eq!(lowered.graph.live_node_count(), 1);
    }

    #[test]
    fn pass_kind_names() {
        assert_eq!(PassKind::GuardRaise.to_string(), "guard-raise");
        assert_eq!(PassKind::Promote.name(), "promote");
    }
}
