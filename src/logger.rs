//! Graph dump hooks invoked around each pass.

use guardlift_ir::{Graph, print_graph};

/// Observer notified at pass entry and exit.
///
/// The pipeline calls `pass_started` before a pass touches the graph and
/// `pass_finished` after the pass (and its DCE sweep, when enabled) is done.
pub trait GraphLogger {
    fn pass_started(&self, pass: &str, graph: &Graph);
    fn pass_finished(&self, pass: &str, graph: &Graph);
}

/// Emits full textual graph dumps at `debug` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl GraphLogger for TracingLogger {
    fn pass_started(&self, pass: &str, graph: &Graph) {
        tracing::debug!(pass, "Pre {pass}:\n{}", print_graph(graph));
    }

    fn pass_finished(&self, pass: &str, graph: &Graph) {
        tracing::debug!(pass, "Post {pass}:\n{}", print_graph(graph));
    }
}

/// Ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogger;

impl GraphLogger for NoopLogger {
    fn pass_started(&self, _pass: &str, _graph: &Graph) {}

    fn pass_finished(&self, _pass: &str, _graph: &Graph) {}
}
