//! Shared fixpoint driver for the conditional rewrites.
//!
//! A pass first checks every conditional in the graph for arity mismatches
//! and fails before touching anything if one is found. It then runs in
//! rounds. Each round scans the whole graph read-only and collects every
//! candidate, then applies the rewrite to each one. Rounds repeat until a scan
//! finds nothing, so a rewrite that exposes another candidate is picked up by
//! the next round.

use std::convert::Infallible;
use std::ops::ControlFlow;

use guardlift_ir::walk::{self, WalkAction};
use guardlift_ir::{Graph, NodeRef};

use crate::arm::check_conditionals;
use crate::error::LoweringResult;

/// Configuration shared by the conditional rewrite passes.
#[derive(Debug, Clone)]
pub struct PassConfig {
    /// Maximum collect-then-apply rounds. Default: 100.
    pub max_iterations: usize,
}

impl Default for PassConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
        }
    }
}

/// Result of running a conditional rewrite pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    /// Total number of conditionals rewritten.
    pub rewritten: usize,
    /// Number of rounds performed, including the final empty scan.
    pub iterations: usize,
    /// Whether a round found no candidates before the iteration limit.
    pub reached_fixpoint: bool,
}

/// Collect candidates in pre-order. Matched nodes are not descended into.
fn scan<M>(graph: &Graph, mut matcher: impl FnMut(NodeRef) -> Option<M>) -> Vec<(NodeRef, M)> {
    let mut found = Vec::new();
    let _ = walk::walk_graph::<Infallible>(graph, &mut |node| {
        let action = match matcher(node) {
            Some(m) => {
                found.push((node, m));
                WalkAction::Skip
            }
            None => WalkAction::Advance,
        };
        ControlFlow::Continue(action)
    });
    found
}

/// Run scan/apply rounds until a scan comes back empty.
pub(crate) fn run_to_fixpoint<M>(
    graph: &mut Graph,
    config: &PassConfig,
    mut matcher: impl FnMut(&Graph, NodeRef) -> Option<M>,
    mut apply: impl FnMut(&mut Graph, NodeRef, M),
) -> LoweringResult<PassReport> {
    let max_iterations = if config.max_iterations == 0 {
        100
    } else {
        config.max_iterations
    };

    check_conditionals(graph)?;

    let mut rewritten = 0;
    for iteration in 0..max_iterations {
        let view: &Graph = graph;
        let candidates = scan(view, |node| matcher(view, node));
        if candidates.is_empty() {
            return Ok(PassReport {
                rewritten,
                iterations: iteration + 1,
                reached_fixpoint: true,
            });
        }
        rewritten += candidates.len();
        for (node, m) in candidates {
            apply(graph, node, m);
        }
    }

    Ok(PassReport {
        rewritten,
        iterations: max_iterations,
        reached_fixpoint: false,
    })
}
