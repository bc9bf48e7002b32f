//! Dead Code Elimination (DCE).
//!
//! Removes nodes whose outputs are never used and which have no side effects.
//! Raise and conditional nodes always count as side-effecting; ordinary
//! operators are pure unless listed in [`DceConfig::impure`].

use std::collections::HashSet;

use smallvec::SmallVec;

use guardlift_ir::{BlockRef, Graph, NodeKind, NodeRef, OpName, erase_node};

/// Configuration for dead code elimination.
#[derive(Debug, Clone)]
pub struct DceConfig {
    /// Maximum fixpoint iterations before giving up. Default: 100.
    pub max_iterations: usize,
    /// Operators that must be kept even when their outputs are unused.
    pub impure: HashSet<OpName>,
}

impl Default for DceConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            impure: HashSet::new(),
        }
    }
}

/// Result of running dead code elimination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DceResult {
    /// Total number of nodes removed.
    pub removed_count: usize,
    /// Number of fixpoint iterations performed.
    pub iterations: usize,
    /// Whether fixpoint was reached (no more changes possible).
    pub reached_fixpoint: bool,
}

/// Eliminate dead code using default configuration.
pub fn eliminate_dead_code(graph: &mut Graph) -> DceResult {
    eliminate_dead_code_with_config(graph, &DceConfig::default())
}

/// Eliminate dead code with custom configuration.
pub fn eliminate_dead_code_with_config(graph: &mut Graph, config: &DceConfig) -> DceResult {
    let max_iterations = if config.max_iterations == 0 {
        100
    } else {
        config.max_iterations
    };

    let mut total_removed = 0;

    for iteration in 0..max_iterations {
        let removed = sweep_block(graph, graph.top_block(), config);

        if removed == 0 {
            tracing::debug!(
                removed = total_removed,
                iterations = iteration + 1,
                "dead code elimination finished"
            );
            return DceResult {
                removed_count: total_removed,
                iterations: iteration + 1,
                reached_fixpoint: true,
            };
        }

        total_removed += removed;
    }

    DceResult {
        removed_count: total_removed,
        iterations: max_iterations,
        reached_fixpoint: false,
    }
}

/// Sweep a single block in reverse order, removing dead nodes.
///
/// Iterating in reverse maximizes cascade removal: if node C uses node B's
/// output and node B uses node A's output, removing C first frees B, then A.
fn sweep_block(graph: &mut Graph, block: BlockRef, config: &DceConfig) -> usize {
    let mut removed = 0;

    let nodes: SmallVec<[NodeRef; 8]> = graph.block_nodes(block).into();
    for node in nodes {
        let arms: SmallVec<[BlockRef; 2]> = graph.node_blocks(node).into();
        for arm in arms {
            removed += sweep_block(graph, arm, config);
        }
    }

    let nodes: SmallVec<[NodeRef; 8]> = graph.block_nodes(block).into();
    for &node in nodes.iter().rev() {
        if is_dead(graph, node, config) {
            erase_node(graph, node);
            removed += 1;
        }
    }

    removed
}

/// Check if a node is dead (pure + all outputs unused).
fn is_dead(graph: &Graph, node: NodeRef, config: &DceConfig) -> bool {
    let pure = match graph.node_kind(node) {
        NodeKind::If | NodeKind::Raise => false,
        NodeKind::Op(name) => !config.impure.contains(&name),
    };
    pure && graph
        .node_outputs(node)
        .iter()
        .all(|&output| !graph.has_uses(output))
}
