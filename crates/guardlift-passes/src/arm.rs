//! Shape classification of conditional arms.

use std::ops::ControlFlow;

use guardlift_ir::walk::{self, WalkAction};
use guardlift_ir::{BlockRef, Graph, NodeKind, NodeRef};

use crate::error::{LoweringError, LoweringResult};

/// What an arm's content ends in. The Return sentinel is not content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArmShape {
    /// No content at all.
    Empty,
    /// Last content node is a raise.
    Raises,
    /// Last content node is some other node, of the given kind.
    Computes(NodeKind),
}

pub(crate) fn classify(graph: &Graph, arm: BlockRef) -> ArmShape {
    match graph.last_node(arm) {
        None => ArmShape::Empty,
        Some(last) => match graph.node_kind(last) {
            NodeKind::Raise => ArmShape::Raises,
            kind => ArmShape::Computes(kind),
        },
    }
}

fn two_arms(graph: &Graph, node: NodeRef) -> Option<[BlockRef; 2]> {
    if !graph.node_kind(node).is_if() {
        return None;
    }
    match *graph.node_blocks(node) {
        [then_arm, else_arm] => Some([then_arm, else_arm]),
        _ => None,
    }
}

/// The two arms of a rewritable conditional, or `None` for anything else.
///
/// Arms that declare parameters are rejected: their content cannot be moved
/// out of the arm without leaving the parameters behind.
pub(crate) fn conditional_arms(graph: &Graph, node: NodeRef) -> Option<[BlockRef; 2]> {
    let arms = two_arms(graph, node)?;
    arms.iter()
        .all(|&arm| graph.block_params(arm).is_empty())
        .then_some(arms)
}

/// Check that every arm returns as many values as the conditional produces.
pub(crate) fn check_arity(graph: &Graph, node: NodeRef, arms: [BlockRef; 2]) -> LoweringResult<()> {
    let outputs = graph.node_outputs(node).len();
    for (arm, &block) in arms.iter().enumerate() {
        let returned = graph.block_outputs(block).len();
        if returned != outputs {
            return Err(LoweringError::ArityMismatch {
                node,
                arm,
                outputs,
                returned,
            });
        }
    }
    Ok(())
}

/// Check the arity of every two-armed conditional in the graph.
///
/// Runs before a pass mutates anything. Rewrites only erase conditionals or
/// clone already-checked ones, so later rounds cannot introduce a mismatch.
pub(crate) fn check_conditionals(graph: &Graph) -> LoweringResult<()> {
    let flow = walk::walk_graph::<LoweringError>(graph, &mut |node| {
        match two_arms(graph, node).map(|arms| check_arity(graph, node, arms)) {
            Some(Err(err)) => ControlFlow::Break(err),
            _ => ControlFlow::Continue(WalkAction::Advance),
        }
    });
    match flow {
        ControlFlow::Break(err) => Err(err),
        ControlFlow::Continue(()) => Ok(()),
    }
}
