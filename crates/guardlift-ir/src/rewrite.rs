//! Compound mutations built on top of the low-level `Graph` methods.

use std::collections::HashMap;

use smallvec::SmallVec;

use crate::graph::{Graph, NodeBuilder};
use crate::refs::{BlockRef, NodeRef, ValueRef};

/// Local value remap used while cloning.
///
/// Lookups fall back to the value itself, so values defined outside the
/// cloned region resolve unchanged.
#[derive(Debug, Default, Clone)]
pub struct ValueMap {
    map: HashMap<ValueRef, ValueRef>,
}

impl ValueMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, from: ValueRef, to: ValueRef) {
        self.map.insert(from, to);
    }

    /// Resolve `v` through the map, or return it unchanged.
    pub fn resolve(&self, v: ValueRef) -> ValueRef {
        self.map.get(&v).copied().unwrap_or(v)
    }
}

/// Clone `node` as a new detached node.
///
/// Inputs are resolved through `map`. Owned blocks are cloned recursively
/// with their parameters, content and Return sentinel. After the call, `map`
/// sends every output of `node` (and every value defined inside its blocks)
/// to its clone, and the clones carry the originals' metadata.
pub fn clone_node(graph: &mut Graph, node: NodeRef, map: &mut ValueMap) -> NodeRef {
    let kind = graph.node_kind(node);
    let inputs: SmallVec<[ValueRef; 8]> =
        graph.node_inputs(node).iter().map(|&v| map.resolve(v)).collect();
    let outputs: SmallVec<[ValueRef; 4]> = graph.node_outputs(node).into();
    let attributes = graph.node(node).attributes.clone();
    let blocks: SmallVec<[BlockRef; 2]> = graph.node_blocks(node).into();

    let mut builder = NodeBuilder::new(kind)
        .inputs(inputs)
        .outputs(outputs.iter().map(|&v| graph.value_meta(v)))
        .attrs(attributes);
    for block in blocks {
        builder = builder.block(clone_block(graph, block, map));
    }
    let clone = graph.create_node(builder);

    for (idx, &old) in outputs.iter().enumerate() {
        let new = graph.node_output(clone, idx as u32);
        graph.copy_metadata(old, new);
        map.insert(old, new);
    }

    clone
}

/// Clone a block into a new detached block, resolving through `map`.
fn clone_block(graph: &mut Graph, block: BlockRef, map: &mut ValueMap) -> BlockRef {
    let new_block = graph.create_block();

    let params: SmallVec<[ValueRef; 4]> = graph.block_params(block).into();
    for old in params {
        let meta = graph.value_meta(old);
        let new = graph.add_param(new_block, meta);
        map.insert(old, new);
    }

    let nodes: SmallVec<[NodeRef; 4]> = graph.block_nodes(block).into();
    for node in nodes {
        let clone = clone_node(graph, node, map);
        graph.push_node(new_block, clone);
    }

    let outputs: SmallVec<[ValueRef; 4]> = graph
        .block_outputs(block)
        .iter()
        .map(|&v| map.resolve(v))
        .collect();
    graph.set_block_outputs(new_block, outputs);

    new_block
}

/// Erase a node: detach it, release everything inside its owned blocks, and
/// release the node itself.
///
/// All outputs of `node` must have no remaining uses, otherwise this panics.
pub fn erase_node(graph: &mut Graph, node: NodeRef) {
    graph.detach_node(node);
    let blocks: SmallVec<[BlockRef; 2]> = graph.node_blocks(node).into();
    for block in blocks {
        erase_block_contents(graph, block);
        graph.release_block(block);
    }
    graph.remove_node(node);
}

/// Drop a block's Return sentinel values and erase its nodes in reverse
/// order, so every node's consumers are gone before the node itself.
fn erase_block_contents(graph: &mut Graph, block: BlockRef) {
    graph.set_block_outputs(block, std::iter::empty());
    let nodes: SmallVec<[NodeRef; 4]> = graph.block_nodes(block).into();
    for &node in nodes.iter().rev() {
        erase_node(graph, node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ValueMeta;
    use crate::symbol::Symbol;
    use crate::types::{Attribute, NodeKind, OpName};

    fn op(name: &'static str) -> NodeKind {
        NodeKind::Op(OpName::new("aten", name))
    }

    #[test]
    fn value_map_falls_back_to_identity() {
        let mut graph = Graph::new();
        let ty = graph.types.simple("core", "tensor");
        let top = graph.top_block();
        let a = graph.add_param(top, ValueMeta { ty, name: None });
        let b = graph.add_param(top, ValueMeta { ty, name: None });

        let mut map = ValueMap::new();
        assert_eq!(map.resolve(a), a);
        map.insert(a, b);
        assert_eq!(map.resolve(a), b);
        assert_eq!(map.resolve(b), b);
    }

    #[test]
    fn clone_node_remaps_inputs_and_copies_metadata() {
        let mut graph = Graph::new();
        let ty = graph.types.simple("core", "tensor");
        let top = graph.top_block();
        let x = graph.add_param(top, ValueMeta { ty, name: None });
        let y = graph.add_param(top, ValueMeta { ty, name: None });

        let original = NodeBuilder::new(op("relu"))
            .input(x)
            .output_meta(ValueMeta {
                ty,
                name: Some(Symbol::new("activated")),
            })
            .attr("inplace", Attribute::Bool(true))
            .build(&mut graph);
        graph.push_node(top, original);

        let mut map = ValueMap::new();
        map.insert(x, y);
        let clone = clone_node(&mut graph, original, &mut map);

        assert_eq!(graph.node_kind(clone), op("relu"));
        assert_eq!(graph.node_inputs(clone), &[y]);
        assert_eq!(graph.node(clone).parent_block, None);
        assert_eq!(
            graph.node(clone).attributes.get(&Symbol::new("inplace")),
            Some(&Attribute::Bool(true))
        );

        let old_out = graph.node_output(original, 0);
        let new_out = graph.node_output(clone, 0);
        assert_eq!(map.resolve(old_out), new_out);
        assert_eq!(graph.value(new_out).name, Some(Symbol::new("activated")));
        assert_eq!(graph.value_ty(new_out), ty);
    }

    #[test]
    fn clone_node_deep_clones_blocks() {
        let mut graph = Graph::new();
        let ty = graph.types.simple("core", "tensor");
        let bool_ty = graph.types.simple("core", "bool");
        let top = graph.top_block();
        let cond = graph.add_param(
            top,
            ValueMeta {
                ty: bool_ty,
                name: None,
            },
        );
        let x = graph.add_param(top, ValueMeta { ty, name: None });

        let then_arm = graph.create_block();
        let relu = NodeBuilder::new(op("relu"))
            .input(x)
            .output(ty)
            .build(&mut graph);
        graph.push_node(then_arm, relu);
        let relu_out = graph.node_output(relu, 0);
        graph.set_block_outputs(then_arm, [relu_out]);
        let else_arm = graph.create_block();
        graph.set_block_outputs(else_arm, [x]);

        let if_node = NodeBuilder::new(NodeKind::If)
            .input(cond)
            .output(ty)
            .block(then_arm)
            .block(else_arm)
            .build(&mut graph);
        graph.push_node(top, if_node);

        let mut map = ValueMap::new();
        let clone = clone_node(&mut graph, if_node, &mut map);

        let cloned_arms = graph.node_blocks(clone).to_vec();
        assert_eq!(cloned_arms.len(), 2);
        assert_ne!(cloned_arms[0], then_arm);
        assert_eq!(graph.block_owner(cloned_arms[0]), Some(clone));

        let cloned_relu = graph.block_nodes(cloned_arms[0])[0];
        assert_ne!(cloned_relu, relu);
        assert_eq!(graph.node_inputs(cloned_relu), &[x]);
        assert_eq!(
            graph.block_outputs(cloned_arms[0]),
            &[graph.node_output(cloned_relu, 0)]
        );
        assert_eq!(graph.block_outputs(cloned_arms[1]), &[x]);
    }

    #[test]
    fn erase_node_cascades_into_arms() {
        let mut graph = Graph::new();
        let ty = graph.types.simple("core", "tensor");
        let bool_ty = graph.types.simple("core", "bool");
        let top = graph.top_block();
        let cond = graph.add_param(
            top,
            ValueMeta {
                ty: bool_ty,
                name: None,
            },
        );
        let x = graph.add_param(top, ValueMeta { ty, name: None });

        let then_arm = graph.create_block();
        let a = NodeBuilder::new(op("abs"))
            .input(x)
            .output(ty)
            .build(&mut graph);
        graph.push_node(then_arm, a);
        let a_out = graph.node_output(a, 0);
        let b = NodeBuilder::new(op("neg"))
            .input(a_out)
            .output(ty)
            .build(&mut graph);
        graph.push_node(then_arm, b);
        let b_out = graph.node_output(b, 0);
        graph.set_block_outputs(then_arm, [b_out]);

        let else_arm = graph.create_block();
        let raise = NodeBuilder::new(NodeKind::Raise).build(&mut graph);
        graph.push_node(else_arm, raise);
        graph.set_block_outputs(else_arm, [x]);

        let if_node = NodeBuilder::new(NodeKind::If)
            .input(cond)
            .output(ty)
            .block(then_arm)
            .block(else_arm)
            .build(&mut graph);
        graph.push_node(top, if_node);
        assert_eq!(graph.live_node_count(), 4);

        erase_node(&mut graph, if_node);

        assert!(graph.block_nodes(top).is_empty());
        assert_eq!(graph.live_node_count(), 0);
        assert!(!graph.is_live(a));
        assert!(!graph.is_block_live(then_arm));
        assert!(!graph.is_block_live(else_arm));
        assert!(!graph.has_uses(cond));
        assert!(!graph.has_uses(x));
    }
}
