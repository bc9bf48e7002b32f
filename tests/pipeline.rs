//! End-to-end lowering through the full pass pipeline.

use std::cell::RefCell;

use guardlift::{Error, GraphLogger, LoweringConfig, NoopLogger, PassKind, lower_text};
use guardlift_ir::{Graph, OpName, parse_graph, print_graph, verify_graph};
use guardlift_passes::LoweringError;

const GUARDED_ASSERT: &str = "graph(%x: core.tensor) {
  %n = aten.numel(%x) : core.int
  %c = aten.eq(%n) : core.bool
  if(%c) {
    raise()
  } else {
  }
  %y = aten.relu(%x) : core.tensor
  return %y
}
";

const GUARDED_UPSAMPLE: &str = "graph(%a: core.tensor, %b: core.list(core.int)) {
  %ok = aten.is_valid(%a) : core.bool
  %r = if(%ok) : core.tensor {
    %v = aten.upsample_bilinear2d(%a, %b) : core.tensor
    return %v
  } else {
    raise()
    return %a
  }
  %y = aten.relu(%r) : core.tensor
  return %y
}
";

fn lower(source: &str) -> guardlift::Lowered {
    lower_text(source, &LoweringConfig::new().verify(true), &NoopLogger).unwrap()
}

#[test]
fn guard_and_its_predicate_disappear() {
    let lowered = lower(GUARDED_ASSERT);

    let guard = &lowered.outcomes[0];
    assert_eq!(guard.pass, PassKind::GuardRaise);
    assert_eq!(guard.report.rewritten, 1);
    assert_eq!(guard.dce.as_ref().unwrap().removed_count, 2);
    assert_eq!(lowered.outcomes[1].report.rewritten, 0);

    insta::assert_snapshot!(print_graph(&lowered.graph), @r"
    graph(%0: core.tensor) {
      %1 = aten.relu(%0) : core.tensor
      return %1
    }
    ");
}

#[test]
fn guarded_upsample_is_promoted() {
    let lowered = lower(GUARDED_UPSAMPLE);

    assert_eq!(lowered.outcomes[0].report.rewritten, 0);
    let promote = &lowered.outcomes[1];
    assert_eq!(promote.pass, PassKind::Promote);
    assert_eq!(promote.report.rewritten, 1);
    assert_eq!(promote.dce.as_ref().unwrap().removed_count, 1);

    insta::assert_snapshot!(print_graph(&lowered.graph), @r"
    graph(%0: core.tensor, %1: core.list(core.int)) {
      %2 = aten.upsample_bilinear2d(%0, %1) : core.tensor
      %3 = aten.relu(%2) : core.tensor
      return %3
    }
    ");
}

#[test]
fn conditional_with_outputs_survives_the_pipeline() {
    let source = "graph(%c: core.bool, %x: core.tensor) {
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
    let before = print_graph(&parse_graph(source).unwrap());
    let lowered = lower(source);

    assert!(lowered.outcomes.iter().all(|o| o.report.rewritten == 0));
    assert_eq!(print_graph(&lowered.graph), before);
}

#[test]
fn pipeline_is_idempotent() {
    let once = print_graph(&lower(GUARDED_UPSAMPLE).graph);
    let twice = lower(&once);

    assert!(twice.outcomes.iter().all(|o| o.report.rewritten == 0));
    assert_eq!(print_graph(&twice.graph), once);
}

#[test]
fn dce_can_be_disabled() {
    let config = LoweringConfig::new().run_dce(false);
    let lowered = lower_text(GUARDED_ASSERT, &config, &NoopLogger).unwrap();

    assert!(lowered.outcomes.iter().all(|o| o.dce.is_none()));
    // The predicate chain stays behind without a sweep.
    assert_eq!(lowered.graph.live_node_count(), 3);
    assert!(verify_graph(&lowered.graph).is_ok());
}

#[test]
fn promotion_only_with_custom_kind() {
    let source = GUARDED_UPSAMPLE.replace("upsample_bilinear2d", "upsample_nearest2d");

    let default = lower(&source);
    assert_eq!(default.outcomes[1].report.rewritten, 0);

    let config = LoweringConfig::new()
        .passes([PassKind::Promote])
        .promote(OpName::new("aten", "upsample_nearest2d"));
    let lowered = lower_text(&source, &config, &NoopLogger).unwrap();
    assert_eq!(lowered.outcomes.len(), 1);
    assert_eq!(lowered.outcomes[0].report.rewritten, 1);
}

#[test]
fn arity_mismatch_surfaces_as_lowering_error() {
    let source = "graph(%x: core.tensor, %c: core.bool) {
  %r = if(%c) : core.tensor {
    %v = aten.upsample_bilinear2d(%x) : core.tensor
    return %v, %x
  } else {
    raise()
    return %x
  }
  return %r
}
";
    let err = lower_text(source, &LoweringConfig::new(), &NoopLogger).unwrap_err();

    assert!(matches!(
        err,
        Error::Lowering(LoweringError::ArityMismatch { returned: 2, .. })
    ));
    assert!(err.to_string().starts_with("lowering failed:"));
}

#[test]
fn parse_errors_are_reported() {
    let err = lower_text("graph( {", &LoweringConfig::new(), &NoopLogger).unwrap_err();
    assert!(matches!(err, Error::Parse(_)));
}

#[derive(Default)]
struct RecordingLogger {
    events: RefCell<Vec<(String, &'static str, usize)>>,
}

impl GraphLogger for RecordingLogger {
    fn pass_started(&self, pass: &str, graph: &Graph) {
        self.events
            .borrow_mut()
            .push((pass.to_owned(), "start", graph.live_node_count()));
    }

    fn pass_finished(&self, pass: &str, graph: &Graph) {
        self.events
            .borrow_mut()
            .push((pass.to_owned(), "finish", graph.live_node_count()));
    }
}

#[test]
fn logger_sees_each_pass_entry_and_exit() {
    let logger = RecordingLogger::default();
    lower_text(GUARDED_ASSERT, &LoweringConfig::new(), &logger).unwrap();

    let events = logger.events.into_inner();
    assert_eq!(
        events,
        [
            ("guard-raise".to_owned(), "start", 5),
            ("guard-raise".to_owned(), "finish", 1),
            ("promote".to_owned(), "start", 1),
            ("promote".to_owned(), "finish", 1),
        ]
    );
}
