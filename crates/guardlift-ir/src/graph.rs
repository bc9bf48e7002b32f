//! Graph: arena-based mutable IR storage.
//!
//! All IR entities (nodes, values, blocks) are stored in `PrimaryMap`s owned
//! by `Graph`. Value lists (inputs, outputs, parameters, block returns) use
//! `EntityList + ListPool` for compact storage. Use-chains are maintained for
//! every node input and every Return sentinel slot.

use cranelift_entity::{EntityList, EntitySet, ListPool, PrimaryMap, SecondaryMap};
use smallvec::SmallVec;

use crate::refs::*;
use crate::symbol::Symbol;
use crate::types::{Attribute, Attributes, NodeKind, TypeInterner};

// ============================================================================
// Use-chain
// ============================================================================

/// A single use of a value: which node (or Return sentinel) consumes it, at
/// which slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Use {
    pub user: User,
    pub index: u32,
}

// ============================================================================
// Entity data types
// ============================================================================

/// Data for a single node in the arena.
#[derive(Debug)]
pub struct NodeData {
    pub kind: NodeKind,
    pub inputs: EntityList<ValueRef>,
    pub outputs: EntityList<ValueRef>,
    pub attributes: Attributes,
    /// Owned sub-blocks. Exactly two for `NodeKind::If`, empty otherwise.
    pub blocks: SmallVec<[BlockRef; 2]>,
    pub parent_block: Option<BlockRef>,
}

/// Data for a single value.
///
/// `ty` and `name` are opaque metadata carried across cloning.
#[derive(Debug)]
pub struct ValueData {
    pub def: ValueDef,
    pub ty: TypeRef,
    pub name: Option<Symbol>,
}

/// Data for a block.
///
/// `nodes` is the block's content. `outputs` is the implicit Return
/// sentinel: it is always present, possibly declaring zero values.
#[derive(Debug)]
pub struct BlockData {
    pub params: EntityList<ValueRef>,
    pub nodes: SmallVec<[NodeRef; 4]>,
    pub outputs: EntityList<ValueRef>,
    /// Owning conditional node, `None` for the graph's top-level block.
    pub owner: Option<NodeRef>,
}

/// Type and debug name for a node output or block parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValueMeta {
    pub ty: TypeRef,
    pub name: Option<Symbol>,
}

// ============================================================================
// Graph
// ============================================================================

/// Arena-based mutable graph.
///
/// Owns all IR entities plus exactly one top-level block. Provides methods for
/// creating, querying and mutating them; use-chains are kept in sync
/// automatically.
#[derive(Debug)]
pub struct Graph {
    nodes: PrimaryMap<NodeRef, NodeData>,
    values: PrimaryMap<ValueRef, ValueData>,
    blocks: PrimaryMap<BlockRef, BlockData>,

    /// Use-chain: for each value, the list of slots that consume it.
    uses: SecondaryMap<ValueRef, SmallVec<[Use; 2]>>,

    pub types: TypeInterner,

    /// Backing pool for EntityList storage.
    value_pool: ListPool<ValueRef>,

    /// Arena slots released by cascading deletion.
    released_nodes: EntitySet<NodeRef>,
    released_blocks: EntitySet<BlockRef>,

    top: BlockRef,
}

impl Graph {
    /// Create a new graph with an empty top-level block.
    pub fn new() -> Self {
        let mut blocks = PrimaryMap::new();
        let top = blocks.push(BlockData {
            params: EntityList::new(),
            nodes: SmallVec::new(),
            outputs: EntityList::new(),
            owner: None,
        });
        Self {
            nodes: PrimaryMap::new(),
            values: PrimaryMap::new(),
            blocks,
            uses: SecondaryMap::new(),
            types: TypeInterner::new(),
            value_pool: ListPool::new(),
            released_nodes: EntitySet::new(),
            released_blocks: EntitySet::new(),
            top,
        }
    }

    /// The graph's top-level block.
    pub fn top_block(&self) -> BlockRef {
        self.top
    }

    // ========================================================================
    // Node
    // ========================================================================

    /// Create a new node and allocate its output values.
    ///
    /// The node's inputs are registered in the use-chain and its owned blocks
    /// are back-linked to it. The node starts detached; use `push_node` or
    /// `insert_node_before` to place it.
    ///
    /// # Panics
    ///
    /// Panics if any block in `builder` already belongs to another node or is
    /// the top-level block.
    pub fn create_node(&mut self, builder: NodeBuilder) -> NodeRef {
        let NodeBuilder {
            kind,
            inputs,
            outputs,
            attributes,
            blocks,
        } = builder;

        let mut input_list = EntityList::new();
        for &v in &inputs {
            input_list.push(v, &mut self.value_pool);
        }

        let node = self.nodes.push(NodeData {
            kind,
            inputs: input_list,
            outputs: EntityList::new(),
            attributes,
            blocks: blocks.clone(),
            parent_block: None,
        });

        for &b in &blocks {
            assert!(
                b != self.top,
                "create_node: the top-level block cannot be owned by {node}"
            );
            if let Some(existing) = self.blocks[b].owner {
                panic!(
                    "create_node: block {b} already belongs to node {existing}; \
                     cannot reassign to {node}",
                );
            }
            self.blocks[b].owner = Some(node);
        }

        for (idx, &val) in inputs.iter().enumerate() {
            self.uses[val].push(Use {
                user: User::Node(node),
                index: idx as u32,
            });
        }

        let mut output_list = EntityList::new();
        for (idx, meta) in outputs.into_iter().enumerate() {
            let v = self.values.push(ValueData {
                def: ValueDef::NodeOutput(node, idx as u32),
                ty: meta.ty,
                name: meta.name,
            });
            output_list.push(v, &mut self.value_pool);
        }
        self.nodes[node].outputs = output_list;

        node
    }

    /// Get immutable reference to node data.
    pub fn node(&self, node: NodeRef) -> &NodeData {
        &self.nodes[node]
    }

    pub fn node_kind(&self, node: NodeRef) -> NodeKind {
        self.nodes[node].kind
    }

    /// Get the inputs of a node as a slice.
    pub fn node_inputs(&self, node: NodeRef) -> &[ValueRef] {
        self.nodes[node].inputs.as_slice(&self.value_pool)
    }

    /// Get all output values of a node.
    pub fn node_outputs(&self, node: NodeRef) -> &[ValueRef] {
        self.nodes[node].outputs.as_slice(&self.value_pool)
    }

    /// Get the i-th output value of a node.
    pub fn node_output(&self, node: NodeRef, index: u32) -> ValueRef {
        self.node_outputs(node)[index as usize]
    }

    /// Blocks owned by a node.
    pub fn node_blocks(&self, node: NodeRef) -> &[BlockRef] {
        &self.nodes[node].blocks
    }

    /// Whether the node's arena slot is still live.
    pub fn is_live(&self, node: NodeRef) -> bool {
        !self.released_nodes.contains(node)
    }

    /// Number of live nodes across all blocks.
    pub fn live_node_count(&self) -> usize {
        self.nodes
            .keys()
            .filter(|&n| !self.released_nodes.contains(n))
            .count()
    }

    /// Release a detached node, clearing its input use-chain entries.
    ///
    /// Does NOT detach it from its parent block and does NOT cascade into
    /// owned blocks; see `rewrite::erase_node` for the cascading version.
    ///
    /// # Panics
    ///
    /// Panics if the node is still attached, if any output still has uses, or
    /// if an owned block has not been released.
    pub fn remove_node(&mut self, node: NodeRef) {
        if let Some(parent) = self.nodes[node].parent_block {
            panic!(
                "remove_node: node {node} is still attached to {parent}; \
                 call detach_node first"
            );
        }

        let outputs: SmallVec<[ValueRef; 4]> = self.node_outputs(node).into();
        for &val in &outputs {
            assert!(
                self.uses[val].is_empty(),
                "remove_node: output {val} of {node} still has {} use(s); \
                 replace all uses before removing the node",
                self.uses[val].len()
            );
        }

        for &b in &self.nodes[node].blocks {
            assert!(
                self.released_blocks.contains(b),
                "remove_node: owned block {b} of {node} has not been released"
            );
        }

        let inputs: SmallVec<[ValueRef; 8]> = self.node_inputs(node).into();
        for (idx, &val) in inputs.iter().enumerate() {
            self.uses[val].retain(|u| !(u.user == User::Node(node) && u.index == idx as u32));
        }

        self.released_nodes.insert(node);
    }

    // ========================================================================
    // Value
    // ========================================================================

    /// Get immutable reference to value data.
    pub fn value(&self, v: ValueRef) -> &ValueData {
        &self.values[v]
    }

    pub fn value_ty(&self, v: ValueRef) -> TypeRef {
        self.values[v].ty
    }

    pub fn value_def(&self, v: ValueRef) -> ValueDef {
        self.values[v].def
    }

    pub fn value_meta(&self, v: ValueRef) -> ValueMeta {
        let data = &self.values[v];
        ValueMeta {
            ty: data.ty,
            name: data.name,
        }
    }

    /// Copy type and debug name from `from` onto `to`.
    pub fn copy_metadata(&mut self, from: ValueRef, to: ValueRef) {
        let meta = self.value_meta(from);
        let target = &mut self.values[to];
        target.ty = meta.ty;
        target.name = meta.name;
    }

    /// The node producing a value, if it is a node output.
    pub fn producer(&self, v: ValueRef) -> Option<NodeRef> {
        match self.values[v].def {
            ValueDef::NodeOutput(node, _) => Some(node),
            ValueDef::BlockParam(..) => None,
        }
    }

    // ========================================================================
    // Block
    // ========================================================================

    /// Create a new detached, empty block.
    pub fn create_block(&mut self) -> BlockRef {
        self.blocks.push(BlockData {
            params: EntityList::new(),
            nodes: SmallVec::new(),
            outputs: EntityList::new(),
            owner: None,
        })
    }

    /// Get immutable reference to block data.
    pub fn block(&self, b: BlockRef) -> &BlockData {
        &self.blocks[b]
    }

    /// The block's content nodes, Return sentinel excluded.
    pub fn block_nodes(&self, b: BlockRef) -> &[NodeRef] {
        &self.blocks[b].nodes
    }

    /// Last content node, or `None` for an empty block.
    pub fn last_node(&self, b: BlockRef) -> Option<NodeRef> {
        self.blocks[b].nodes.last().copied()
    }

    pub fn block_owner(&self, b: BlockRef) -> Option<NodeRef> {
        self.blocks[b].owner
    }

    /// Append a parameter to a block.
    pub fn add_param(&mut self, b: BlockRef, meta: ValueMeta) -> ValueRef {
        let idx = self.blocks[b].params.len(&self.value_pool) as u32;
        let v = self.values.push(ValueData {
            def: ValueDef::BlockParam(b, idx),
            ty: meta.ty,
            name: meta.name,
        });
        self.blocks[b].params.push(v, &mut self.value_pool);
        v
    }

    pub fn block_params(&self, b: BlockRef) -> &[ValueRef] {
        self.blocks[b].params.as_slice(&self.value_pool)
    }

    /// Values declared by the block's Return sentinel.
    pub fn block_outputs(&self, b: BlockRef) -> &[ValueRef] {
        self.blocks[b].outputs.as_slice(&self.value_pool)
    }

    /// Replace the values declared by the block's Return sentinel.
    pub fn set_block_outputs(&mut self, b: BlockRef, outputs: impl IntoIterator<Item = ValueRef>) {
        let old: SmallVec<[ValueRef; 4]> = self.block_outputs(b).into();
        for (idx, &val) in old.iter().enumerate() {
            self.uses[val].retain(|u| !(u.user == User::Return(b) && u.index == idx as u32));
        }

        let mut list = EntityList::new();
        for (idx, val) in outputs.into_iter().enumerate() {
            list.push(val, &mut self.value_pool);
            self.uses[val].push(Use {
                user: User::Return(b),
                index: idx as u32,
            });
        }
        let mut old_list = std::mem::replace(&mut self.blocks[b].outputs, list);
        old_list.clear(&mut self.value_pool);
    }

    /// Append a node to the end of a block.
    ///
    /// # Panics
    ///
    /// Panics if the node already belongs to a block.
    pub fn push_node(&mut self, block: BlockRef, node: NodeRef) {
        if let Some(parent) = self.nodes[node].parent_block {
            panic!(
                "push_node: node {node} already belongs to {parent}; \
                 remove it from the old block first"
            );
        }
        self.nodes[node].parent_block = Some(block);
        self.blocks[block].nodes.push(node);
    }

    /// Insert a node immediately before `anchor` in the anchor's block.
    ///
    /// # Panics
    ///
    /// Panics if the node already belongs to a block, or if `anchor` is
    /// detached.
    pub fn insert_node_before(&mut self, anchor: NodeRef, node: NodeRef) {
        if let Some(parent) = self.nodes[node].parent_block {
            panic!(
                "insert_node_before: node {node} already belongs to {parent}; \
                 remove it from the old block first"
            );
        }
        let block = self.nodes[anchor]
            .parent_block
            .unwrap_or_else(|| panic!("insert_node_before: anchor {anchor} is detached"));
        let nodes = &mut self.blocks[block].nodes;
        let pos = nodes
            .iter()
            .position(|&n| n == anchor)
            .expect("insert_node_before: anchor not found in its parent block");
        nodes.insert(pos, node);
        self.nodes[node].parent_block = Some(block);
    }

    /// Detach a node from its parent block (does not release it).
    pub fn detach_node(&mut self, node: NodeRef) {
        if let Some(block) = self.nodes[node].parent_block.take() {
            self.blocks[block].nodes.retain(|n| *n != node);
        }
    }

    /// Mark an emptied block's arena slot as released.
    ///
    /// # Panics
    ///
    /// Panics if the block still has content or declared outputs, or is the
    /// top-level block.
    pub fn release_block(&mut self, b: BlockRef) {
        assert!(b != self.top, "release_block: cannot release the top-level block");
        assert!(
            self.blocks[b].nodes.is_empty(),
            "release_block: {b} still has {} node(s)",
            self.blocks[b].nodes.len()
        );
        assert!(
            self.block_outputs(b).is_empty(),
            "release_block: {b} still declares outputs"
        );
        self.released_blocks.insert(b);
    }

    pub fn is_block_live(&self, b: BlockRef) -> bool {
        !self.released_blocks.contains(b)
    }

    // ========================================================================
    // Use-chain
    // ========================================================================

    /// Get all uses of a value.
    pub fn uses(&self, v: ValueRef) -> &[Use] {
        &self.uses[v]
    }

    /// Check if a value has any uses.
    pub fn has_uses(&self, v: ValueRef) -> bool {
        !self.uses[v].is_empty()
    }

    // ========================================================================
    // RAUW (Replace All Uses With)
    // ========================================================================

    /// Replace all uses of `old` with `new`, in node inputs and Return
    /// sentinels alike.
    pub fn replace_all_uses(&mut self, old: ValueRef, new: ValueRef) {
        if old == new {
            return;
        }
        let old_uses = std::mem::take(&mut self.uses[old]);

        for u in &old_uses {
            let list = match u.user {
                User::Node(node) => &mut self.nodes[node].inputs,
                User::Return(block) => &mut self.blocks[block].outputs,
            };
            let slice = list.as_mut_slice(&mut self.value_pool);
            debug_assert_eq!(slice[u.index as usize], old);
            slice[u.index as usize] = new;

            self.uses[new].push(*u);
        }
    }

    /// Iterate over every value slot in the arena, live or not.
    pub(crate) fn all_values(&self) -> impl Iterator<Item = ValueRef> + '_ {
        self.values.keys()
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// NodeBuilder
// ============================================================================

/// Builder collecting the pieces of a node before `Graph::create_node`.
pub struct NodeBuilder {
    kind: NodeKind,
    inputs: Vec<ValueRef>,
    outputs: Vec<ValueMeta>,
    attributes: Attributes,
    blocks: SmallVec<[BlockRef; 2]>,
}

impl NodeBuilder {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            inputs: Vec::new(),
            outputs: Vec::new(),
            attributes: Attributes::new(),
            blocks: SmallVec::new(),
        }
    }

    pub fn input(mut self, v: ValueRef) -> Self {
        self.inputs.push(v);
        self
    }

    pub fn inputs(mut self, vs: impl IntoIterator<Item = ValueRef>) -> Self {
        self.inputs.extend(vs);
        self
    }

    pub fn output(mut self, ty: TypeRef) -> Self {
        self.outputs.push(ValueMeta { ty, name: None });
        self
    }

    pub fn output_meta(mut self, meta: ValueMeta) -> Self {
        self.outputs.push(meta);
        self
    }

    pub fn outputs(mut self, metas: impl IntoIterator<Item = ValueMeta>) -> Self {
        self.outputs.extend(metas);
        self
    }

    pub fn attr(mut self, key: impl Into<Symbol>, val: Attribute) -> Self {
        self.attributes.insert(key.into(), val);
        self
    }

    pub fn attrs(mut self, attrs: Attributes) -> Self {
        self.attributes.extend(attrs);
        self
    }

    pub fn block(mut self, b: BlockRef) -> Self {
        self.blocks.push(b);
        self
    }

    /// Create the node in `graph` and return its reference.
    pub fn build(self, graph: &mut Graph) -> NodeRef {
        graph.create_node(self)
    }
}
