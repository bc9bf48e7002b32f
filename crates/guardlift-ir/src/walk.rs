//! Recursive node traversal utilities.
//!
//! Walks are pre-order: a node is visited before the contents of the blocks
//! it owns, and the visitor decides per node whether to descend.

use std::ops::ControlFlow;

use crate::graph::Graph;
use crate::refs::{BlockRef, NodeRef};

/// Controls whether to descend into children during a walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkAction {
    /// Continue walking and descend into owned blocks.
    Advance,
    /// Skip the owned blocks of the current node.
    Skip,
}

/// Walk the whole graph starting at its top-level block.
pub fn walk_graph<B>(
    graph: &Graph,
    f: &mut dyn FnMut(NodeRef) -> ControlFlow<B, WalkAction>,
) -> ControlFlow<B, ()> {
    walk_block(graph, graph.top_block(), f)
}

/// Walk all nodes in a block recursively.
pub fn walk_block<B>(
    graph: &Graph,
    block: BlockRef,
    f: &mut dyn FnMut(NodeRef) -> ControlFlow<B, WalkAction>,
) -> ControlFlow<B, ()> {
    for &node in graph.block_nodes(block) {
        walk_node(graph, node, f)?;
    }
    ControlFlow::Continue(())
}

/// Walk a node and its owned blocks recursively.
pub fn walk_node<B>(
    graph: &Graph,
    node: NodeRef,
    f: &mut dyn FnMut(NodeRef) -> ControlFlow<B, WalkAction>,
) -> ControlFlow<B, ()> {
    match f(node) {
        ControlFlow::Break(b) => return ControlFlow::Break(b),
        ControlFlow::Continue(WalkAction::Skip) => return ControlFlow::Continue(()),
        ControlFlow::Continue(WalkAction::Advance) => {}
    }
    for &block in graph.node_blocks(node) {
        walk_block(graph, block, f)?;
    }
    ControlFlow::Continue(())
}
