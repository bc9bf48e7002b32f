//! Structural, scope and use-chain validation.
//!
//! Three kinds of checks are provided:
//!
//! 1. **Structure**: every conditional owns exactly two arms, and each arm's
//!    Return sentinel declares as many values as the conditional has outputs.
//!    Other node kinds own no blocks.
//! 2. **Scope**: every node input and every Return value references a value
//!    defined earlier in the same block or in an enclosing block. A
//!    conditional's own outputs are not visible inside its arms.
//! 3. **Use-chain consistency**: the use lists stored in `Graph` exactly
//!    match the inputs and Return values of the live structure.

use std::collections::HashSet;
use std::fmt;
use std::ops::ControlFlow;

use derive_more::{Display, Error};

use crate::graph::{Graph, Use};
use crate::refs::{BlockRef, NodeRef, User, ValueRef};
use crate::types::NodeKind;
use crate::walk::{self, WalkAction};

// ============================================================================
// Error types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum ValidationError {
    #[display("{node}: conditional owns {arms} arm(s), expected 2")]
    ArmCount { node: NodeRef, arms: usize },
    #[display("{node}: conditional has {outputs} output(s) but arm #{arm} returns {returned}")]
    ArmArity {
        node: NodeRef,
        arm: usize,
        outputs: usize,
        returned: usize,
    },
    #[display("{node}: {kind} node must not own blocks")]
    UnexpectedBlocks { node: NodeRef, kind: NodeKind },
    #[display("slot #{index} of {user} references {value}, which is not in scope")]
    OutOfScope {
        user: User,
        index: u32,
        value: ValueRef,
    },
    #[display("use-chain: {message}")]
    UseChain { message: String },
}

/// Result of validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ok() {
            return write!(f, "validation passed");
        }
        writeln!(f, "{} validation error(s) found:", self.errors.len())?;
        for err in &self.errors {
            writeln!(f, "  - {}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationResult {}

// ============================================================================
// Entry points
// ============================================================================

/// Run every check on the graph.
pub fn verify_graph(graph: &Graph) -> ValidationResult {
    let mut result = validate_structure(graph);
    result.merge(validate_scopes(graph));
    result.merge(validate_use_chains(graph));
    result
}

/// Check conditional arm counts and arities.
pub fn validate_structure(graph: &Graph) -> ValidationResult {
    let mut errors = Vec::new();
    let _ = walk::walk_graph::<std::convert::Infallible>(graph, &mut |node| {
        let blocks = graph.node_blocks(node);
        match graph.node_kind(node) {
            NodeKind::If => {
                if blocks.len() != 2 {
                    errors.push(ValidationError::ArmCount {
                        node,
                        arms: blocks.len(),
                    });
                }
                let outputs = graph.node_outputs(node).len();
                for (arm, &block) in blocks.iter().enumerate() {
                    let returned = graph.block_outputs(block).len();
                    if returned != outputs {
                        errors.push(ValidationError::ArmArity {
                            node,
                            arm,
                            outputs,
                            returned,
                        });
                    }
                }
            }
            kind @ (NodeKind::Raise | NodeKind::Op(_)) => {
                if !blocks.is_empty() {
                    errors.push(ValidationError::UnexpectedBlocks { node, kind });
                }
            }
        }
        ControlFlow::Continue(WalkAction::Advance)
    });
    ValidationResult { errors }
}

/// Check that every input and Return value is defined in an enclosing scope.
pub fn validate_scopes(graph: &Graph) -> ValidationResult {
    let mut errors = Vec::new();
    let mut visible = HashSet::new();
    check_block_scope(graph, graph.top_block(), &mut visible, &mut errors);
    ValidationResult { errors }
}

fn check_block_scope(
    graph: &Graph,
    block: BlockRef,
    visible: &mut HashSet<ValueRef>,
    errors: &mut Vec<ValidationError>,
) {
    let mut defined_here = Vec::new();
    let mut define = |v: ValueRef, visible: &mut HashSet<ValueRef>| {
        if visible.insert(v) {
            defined_here.push(v);
        }
    };

    for &param in graph.block_params(block) {
        define(param, visible);
    }

    for &node in graph.block_nodes(block) {
        for (index, &input) in graph.node_inputs(node).iter().enumerate() {
            if !visible.contains(&input) {
                errors.push(ValidationError::OutOfScope {
                    user: User::Node(node),
                    index: index as u32,
                    value: input,
                });
            }
        }
        for &arm in graph.node_blocks(node) {
            check_block_scope(graph, arm, visible, errors);
        }
        for &output in graph.node_outputs(node) {
            define(output, visible);
        }
    }

    for (index, &value) in graph.block_outputs(block).iter().enumerate() {
        if !visible.contains(&value) {
            errors.push(ValidationError::OutOfScope {
                user: User::Return(block),
                index: index as u32,
                value,
            });
        }
    }

    for v in defined_here {
        visible.remove(&v);
    }
}

/// Validate that the stored use-chains match the actual inputs and Return
/// values.
///
/// Checks two directions:
/// 1. Every input of every reachable node and every Return value of every
///    reachable block has a matching use-chain entry.
/// 2. Every use-chain entry points back to such a slot. Entries left behind
///    by released or detached nodes are reported.
pub fn validate_use_chains(graph: &Graph) -> ValidationResult {
    let mut errors = Vec::new();

    let mut actual: HashSet<(ValueRef, Use)> = HashSet::new();
    collect_block_uses(graph, graph.top_block(), &mut actual);

    // Direction 1: actual slot -> use-chain entry must exist
    for &(value, u) in &actual {
        if !graph.uses(value).contains(&u) {
            errors.push(ValidationError::UseChain {
                message: format!(
                    "slot #{} of {} uses {} but no use-chain entry exists",
                    u.index, u.user, value
                ),
            });
        }
    }

    // Direction 2: use-chain entry -> actual slot must exist
    for value in graph.all_values() {
        for &u in graph.uses(value) {
            if !actual.contains(&(value, u)) {
                errors.push(ValidationError::UseChain {
                    message: format!(
                        "stale use-chain entry: {} recorded as used by slot #{} of {}",
                        value, u.index, u.user
                    ),
                });
            }
        }
    }

    ValidationResult { errors }
}

fn collect_block_uses(graph: &Graph, block: BlockRef, actual: &mut HashSet<(ValueRef, Use)>) {
    for &node in graph.block_nodes(block) {
        for (index, &input) in graph.node_inputs(node).iter().enumerate() {
            actual.insert((
                input,
                Use {
                    user: User::Node(node),
                    index: index as u32,
                },
            ));
        }
        for &arm in graph.node_blocks(node) {
            collect_block_uses(graph, arm, actual);
        }
    }
    for (index, &value) in graph.block_outputs(block).iter().enumerate() {
        actual.insert((
            value,
            Use {
                user: User::Return(block),
                index: index as u32,
            },
        ));
    }
}
