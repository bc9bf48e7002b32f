//! Error types for the lowering passes.

use derive_more::{Display, Error};
use guardlift_ir::NodeRef;

pub type LoweringResult<T> = Result<T, LoweringError>;

/// Precondition violations found while scanning for candidates.
///
/// A pass that returns an error has not mutated the graph.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum LoweringError {
    #[display(
        "conditional {node} has {outputs} output(s) but arm #{arm} returns {returned} value(s)"
    )]
    ArityMismatch {
        node: NodeRef,
        arm: usize,
        outputs: usize,
        returned: usize,
    },
}
