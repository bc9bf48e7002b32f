//! Entity references for the graph arenas.
//!
//! Each ref type is a thin `u32` wrapper providing type-safe indexing
//! into `PrimaryMap` storage in `Graph`.

use cranelift_entity::entity_impl;
use std::fmt;

/// Reference to a node in the arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef(u32);
entity_impl!(NodeRef, "node");

/// Reference to a single-assignment value in the arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueRef(u32);
entity_impl!(ValueRef, "v");

/// Reference to a block in the arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockRef(u32);
entity_impl!(BlockRef, "block");

/// Reference to an interned type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeRef(u32);
entity_impl!(TypeRef, "ty");

/// Where a value is defined: either a node output or a block parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueDef {
    /// Output of a node at the given index.
    NodeOutput(NodeRef, u32),
    /// Block parameter at the given index.
    BlockParam(BlockRef, u32),
}

impl fmt::Display for ValueDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueDef::NodeOutput(node, idx) => write!(f, "{}#{}", node, idx),
            ValueDef::BlockParam(block, idx) => write!(f, "{}#{}", block, idx),
        }
    }
}

/// The consumer side of a use: a node input slot or a block's Return sentinel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum User {
    Node(NodeRef),
    Return(BlockRef),
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            User::Node(node) => write!(f, "{}", node),
            User::Return(block) => write!(f, "return of {}", block),
        }
    }
}
