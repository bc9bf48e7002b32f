//! Arena-based graph IR for the guardlift passes.
//!
//! A [`Graph`] owns a single top-level block plus the arenas for nodes,
//! values and blocks. Nodes are addressed by [`NodeRef`], values by
//! [`ValueRef`], blocks by [`BlockRef`]. Conditional nodes own exactly two
//! arm blocks; every block carries an implicit Return sentinel listing its
//! output values.

pub mod graph;
pub mod parser;
pub mod printer;
pub mod refs;
pub mod rewrite;
pub mod symbol;
pub mod types;
pub mod validation;
pub mod walk;

pub use graph::{BlockData, Graph, NodeBuilder, NodeData, Use, ValueData, ValueMeta};
pub use parser::{ParseError, parse_graph};
pub use printer::{print_graph, print_node, print_type};
pub use refs::{BlockRef, NodeRef, TypeRef, User, ValueDef, ValueRef};
pub use rewrite::{ValueMap, clone_node, erase_node};
pub use symbol::Symbol;
pub use types::{Attribute, Attributes, NodeKind, OpName, TypeData, TypeDataBuilder, TypeInterner};
pub use validation::{ValidationError, ValidationResult, verify_graph};
pub use walk::WalkAction;
