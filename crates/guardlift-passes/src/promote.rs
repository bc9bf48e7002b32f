//! Guarded-computation promotion.
//!
//! A conditional whose one arm ends in a promotable computation and whose
//! other arm raises is replaced by the computation itself: the computing
//! arm's content is cloned in front of the conditional, the conditional's
//! consumers are redirected to the clones, and the conditional is erased.

use std::collections::BTreeSet;

use smallvec::SmallVec;

use guardlift_ir::{
    BlockRef, Graph, NodeKind, NodeRef, OpName, ValueMap, ValueRef, clone_node, erase_node,
    print_node,
};

use crate::arm::{ArmShape, classify, conditional_arms};
use crate::error::LoweringResult;
use crate::pass::{PassConfig, PassReport, run_to_fixpoint};

/// The operator kinds whose guarded computation may be promoted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotableKinds {
    kinds: BTreeSet<OpName>,
}

impl PromotableKinds {
    /// An empty set; nothing is promoted.
    pub fn new() -> Self {
        Self {
            kinds: BTreeSet::new(),
        }
    }

    pub fn with(mut self, kind: OpName) -> Self {
        self.insert(kind);
        self
    }

    pub fn insert(&mut self, kind: OpName) -> bool {
        self.kinds.insert(kind)
    }

    pub fn contains(&self, kind: &OpName) -> bool {
        self.kinds.contains(kind)
    }

    /// Whether a node kind names a promotable operator.
    pub fn contains_kind(&self, kind: NodeKind) -> bool {
        kind.op_name().is_some_and(|op| self.contains(&op))
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

/// Bilinear upsampling is the one kind promoted out of the box.
impl Default for PromotableKinds {
    fn default() -> Self {
        Self::new().with(OpName::new("aten", "upsample_bilinear2d"))
    }
}

impl FromIterator<OpName> for PromotableKinds {
    fn from_iter<I: IntoIterator<Item = OpName>>(iter: I) -> Self {
        Self {
            kinds: iter.into_iter().collect(),
        }
    }
}

impl Extend<OpName> for PromotableKinds {
    fn extend<I: IntoIterator<Item = OpName>>(&mut self, iter: I) {
        self.kinds.extend(iter);
    }
}

/// Promote guarded computations using default configuration.
pub fn promote_guarded_computation(
    graph: &mut Graph,
    kinds: &PromotableKinds,
) -> LoweringResult<PassReport> {
    promote_guarded_computation_with_config(graph, kinds, &PassConfig::default())
}

/// Promote guarded computations with custom configuration.
pub fn promote_guarded_computation_with_config(
    graph: &mut Graph,
    kinds: &PromotableKinds,
    config: &PassConfig,
) -> LoweringResult<PassReport> {
    let report = run_to_fixpoint(
        graph,
        config,
        |graph, node| match_guarded_computation(graph, node, kinds),
        |graph, node, compute_arm| {
            tracing::debug!(
                node = %node,
                ir = %print_node(graph, node),
                "promoting guarded computation"
            );
            promote(graph, node, compute_arm);
        },
    )?;
    tracing::debug!(
        rewritten = report.rewritten,
        iterations = report.iterations,
        "guarded-computation promotion finished"
    );
    Ok(report)
}

/// Returns the computing arm of a matching conditional.
fn match_guarded_computation(
    graph: &Graph,
    node: NodeRef,
    kinds: &PromotableKinds,
) -> Option<BlockRef> {
    let arms = conditional_arms(graph, node)?;
    match (classify(graph, arms[0]), classify(graph, arms[1])) {
        (ArmShape::Computes(kind), ArmShape::Raises) if kinds.contains_kind(kind) => Some(arms[0]),
        (ArmShape::Raises, ArmShape::Computes(kind)) if kinds.contains_kind(kind) => Some(arms[1]),
        _ => None,
    }
}

fn promote(graph: &mut Graph, node: NodeRef, compute_arm: BlockRef) {
    let mut map = ValueMap::new();
    let content: SmallVec<[NodeRef; 4]> = graph.block_nodes(compute_arm).into();
    for original in content {
        let clone = clone_node(graph, original, &mut map);
        graph.insert_node_before(node, clone);
    }

    let returned: SmallVec<[ValueRef; 4]> = graph
        .block_outputs(compute_arm)
        .iter()
        .map(|&v| map.resolve(v))
        .collect();
    for (index, new) in returned.into_iter().enumerate() {
        let old = graph.node_output(node, index as u32);
        graph.replace_all_uses(old, new);
    }

    erase_node(graph, node);
}
