//! Guard-raise elimination.
//!
//! Deletes conditionals that only exist to raise: no outputs, one arm ending
//! in a raise, the other arm with no content at all. The predicate and
//! whatever computed it are left behind for DCE.

use guardlift_ir::{Graph, NodeRef, erase_node, print_node};

use crate::arm::{ArmShape, classify, conditional_arms};
use crate::error::LoweringResult;
use crate::pass::{PassConfig, PassReport, run_to_fixpoint};

/// Eliminate guard-raise conditionals using default configuration.
pub fn eliminate_guard_raise(graph: &mut Graph) -> LoweringResult<PassReport> {
    eliminate_guard_raise_with_config(graph, &PassConfig::default())
}

/// Eliminate guard-raise conditionals with custom configuration.
pub fn eliminate_guard_raise_with_config(
    graph: &mut Graph,
    config: &PassConfig,
) -> LoweringResult<PassReport> {
    let report = run_to_fixpoint(graph, config, match_guard_raise, |graph, node, ()| {
        tracing::debug!(
            node = %node,
            ir = %print_node(graph, node),
            "eliminating guard-raise conditional"
        );
        erase_node(graph, node);
    })?;
    tracing::debug!(
        rewritten = report.rewritten,
        iterations = report.iterations,
        "guard-raise elimination finished"
    );
    Ok(report)
}

fn match_guard_raise(graph: &Graph, node: NodeRef) -> Option<()> {
    let arms = conditional_arms(graph, node)?;
    if !graph.node_outputs(node).is_empty() {
        return None;
    }
    matches!(
        (classify(graph, arms[0]), classify(graph, arms[1])),
        (ArmShape::Raises, ArmShape::Empty) | (ArmShape::Empty, ArmShape::Raises)
    )
    .then_some(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoweringError;
    use guardlift_ir::{parse_graph, print_graph, verify_graph};

    fn run(input: &str) -> (Graph, PassReport) {
        let mut graph = parse_graph(input).unwrap();
        let report = eliminate_guard_raise(&mut graph).unwrap();
        let validation = verify_graph(&graph);
        assert!(validation.is_ok(), "{validation}");
        (graph, report)
    }

    #[test]
    fn removes_raise_then_empty_else() {
        let (graph, report) = run("graph(%x: core.tensor) {
               %c = aten.is_valid(%x) : core.bool
               if(%c) {
                 raise()
               } else {
               }
               %y = aten.relu(%x) : core.tensor
               return %y
             }");

        assert_eq!(report.rewritten, 1);
        assert!(report.reached_fixpoint);
        insta::assert_snapshot!(print_graph(&graph), @r"
        graph(%0: core.tensor) {
          %1 = aten.is_valid(%0) : core.bool
          %2 = aten.relu(%0) : core.tensor
          return %2
        }
        ");
    }

    #[test]
    fn removes_empty_then_raise_else_with_cascade() {
        let mut graph = parse_graph(
            "graph(%c: core.bool) {
               if(%c) {
               } else {
                 %msg = aten.format() : core.str
                 raise(%msg) {kind = \"ValueError\"}
               }
             }",
        )
        .unwrap();
        let top = graph.top_block();
        let if_node = graph.block_nodes(top)[0];
        let arms = graph.node_blocks(if_node).to_vec();
        assert_eq!(graph.live_node_count(), 3);

        let report = eliminate_guard_raise(&mut graph).unwrap();

        assert_eq!(report.rewritten, 1);
        assert!(graph.block_nodes(top).is_empty());
        assert_eq!(graph.live_node_count(), 0);
        assert!(!graph.is_live(if_node));
        assert!(arms.iter().all(|&arm| !graph.is_block_live(arm)));
    }

    #[test]
    fn conditional_with_outputs_is_untouched() {
        let input = "graph(%c: core.bool, %x: core.tensor) {
  %0 = if(%c) : core.tensor {
    raise()
    return %x
  } else {
    return %x
  }
  %1 = aten.relu(%0) : core.tensor
  return %1
}
";
        let mut graph = parse_graph(input).unwrap();
        let before = print_graph(&graph);

        let report = eliminate_guard_raise(&mut graph).unwrap();

        assert_eq!(report.rewritten, 0);
        assert_eq!(print_graph(&graph), before);
    }

    #[test]
    fn non_matching_shapes_are_untouched() {
        let input = "graph(%c: core.bool, %x: core.tensor) {
               if(%c) {
                 raise()
               } else {
                 raise()
               }
               if(%c) {
                 raise()
               } else {
                 aten.print(%x)
               }
               if(%c) {
               } else {
               }
             }";
        let mut graph = parse_graph(input).unwrap();
        let before = print_graph(&graph);

        let report = eliminate_guard_raise(&mut graph).unwrap();

        assert_eq!(report.rewritten, 0);
        assert_eq!(report.iterations, 1);
        assert_eq!(print_graph(&graph), before);
    }

    #[test]
    fn nested_guards_inside_surviving_arms() {
        let (graph, report) = run("graph(%c: core.bool, %d: core.bool, %x: core.tensor) {
               %r = if(%c) : core.tensor {
                 if(%d) {
                   raise()
                 } else {
                 }
                 %y = aten.relu(%x) : core.tensor
                 return %y
               } else {
                 return %x
               }
               return %r
             }");

        assert_eq!(report.rewritten, 1);
        insta::assert_snapshot!(print_graph(&graph), @r"
        graph(%0: core.bool, %1: core.bool, %2: core.tensor) {
          %3 = if(%0) : core.tensor {
            %4 = aten.relu(%2) : core.tensor
            return %4
          } else {
            return %2
          }
          return %3
        }
        ");
    }

    #[test]
    fn inner_elimination_exposes_outer_guard() {
        let (graph, report) = run("graph(%c: core.bool, %d: core.bool) {
               if(%c) {
                 if(%d) {
                 } else {
                   raise()
                 }
               } else {
                 raise()
               }
             }");

        // The inner guard goes first; the outer one only matches once its
        // then-arm has become empty.
        assert_eq!(report.rewritten, 2);
        assert_eq!(report.iterations, 3);
        assert_eq!(graph.live_node_count(), 0);
    }

    #[test]
    fn elimination_is_idempotent() {
        let mut graph = parse_graph(
            "graph(%c: core.bool, %x: core.tensor) {
               if(%c) {
                 raise()
               } else {
               }
               return %x
             }",
        )
        .unwrap();
        eliminate_guard_raise(&mut graph).unwrap();
        let once = print_graph(&graph);

        let report = eliminate_guard_raise(&mut graph).unwrap();

        assert_eq!(report.rewritten, 0);
        assert_eq!(print_graph(&graph), once);
    }

    #[test]
    fn arity_mismatch_is_an_error() {
        let mut graph = parse_graph(
            "graph(%c: core.bool, %x: core.tensor) {
               if(%c) {
                 raise()
                 return %x
               } else {
               }
             }",
        )
        .unwrap();
        let before = print_graph(&graph);
        let if_node = graph.block_nodes(graph.top_block())[0];

        let err = eliminate_guard_raise(&mut graph).unwrap_err();

        assert_eq!(
            err,
            LoweringError::ArityMismatch {
                node: if_node,
                arm: 0,
                outputs: 0,
                returned: 1,
            }
        );
        assert_eq!(print_graph(&graph), before);
    }

    #[test]
    fn arity_mismatch_on_outer_guard_blocks_inner_rewrite() {
        let mut graph = parse_graph(
            "graph(%c: core.bool, %d: core.bool, %x: core.tensor) {
               if(%c) {
                 if(%d) {
                   raise()
                 } else {
                 }
               } else {
                 raise()
                 return %x
               }
             }",
        )
        .unwrap();
        let before = print_graph(&graph);
        let outer = graph.block_nodes(graph.top_block())[0];

        let err = eliminate_guard_raise(&mut graph).unwrap_err();

        // The inner guard alone would match in the first round; the outer
        // mismatch must still be reported before anything is erased.
        assert_eq!(
            err,
            LoweringError::ArityMismatch {
                node: outer,
                arm: 1,
                outputs: 0,
                returned: 1,
            }
        );
        assert_eq!(print_graph(&graph), before);
        assert_eq!(graph.live_node_count(), 4);
    }
}
