//! Text format printer.
//!
//! ```text
//! graph(%0: core.tensor, %1: core.bool) {
//!   %2 = if(%1) : core.tensor {
//!     %3 = aten.upsample_bilinear2d(%0) {align_corners = false} : core.tensor
//!     return %3
//!   } else {
//!     raise()
//!     return %0
//!   }
//!   return %2
//! }
//! ```
//!
//! Values are numbered `%0, %1, ...` in definition order. Debug names are
//! not printed, so two graphs that differ only in names print identically.

use std::collections::HashMap;
use std::fmt;
use std::fmt::Write;

use crate::graph::Graph;
use crate::refs::*;
use crate::types::{Attribute, NodeKind};

/// Value numbering for a whole graph, assigned before anything is written.
struct PrintState<'a> {
    graph: &'a Graph,
    value_names: HashMap<ValueRef, usize>,
    next_value_num: usize,
}

impl<'a> PrintState<'a> {
    fn new(graph: &'a Graph) -> Self {
        let mut state = Self {
            graph,
            value_names: HashMap::new(),
            next_value_num: 0,
        };
        state.number_block(graph.top_block());
        state
    }

    fn assign(&mut self, v: ValueRef) {
        self.value_names.insert(v, self.next_value_num);
        self.next_value_num += 1;
    }

    /// Mirrors the order in which `write_block` defines values.
    fn number_block(&mut self, block: BlockRef) {
        let graph = self.graph;
        for &param in graph.block_params(block) {
            self.assign(param);
        }
        for &node in graph.block_nodes(block) {
            for &out in graph.node_outputs(node) {
                self.assign(out);
            }
            for &arm in graph.node_blocks(node) {
                self.number_block(arm);
            }
        }
    }

    fn write_value(&self, f: &mut impl Write, v: ValueRef) -> fmt::Result {
        match self.value_names.get(&v) {
            Some(n) => write!(f, "%{n}"),
            None => f.write_str("%?"),
        }
    }

    fn write_values(&self, f: &mut impl Write, vs: &[ValueRef]) -> fmt::Result {
        for (i, &v) in vs.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            self.write_value(f, v)?;
        }
        Ok(())
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Print a whole graph as IR text.
pub fn print_graph(graph: &Graph) -> String {
    let state = PrintState::new(graph);
    let mut out = String::new();
    write_graph(&state, &mut out).expect("fmt::Write to String never fails");
    out
}

/// Print a single node (and its arms) as IR text.
///
/// Values are numbered as they would be in `print_graph`, so the output
/// lines up with a full dump of the same graph.
pub fn print_node(graph: &Graph, node: NodeRef) -> String {
    let state = PrintState::new(graph);
    let mut out = String::new();
    write_node(&state, &mut out, node, 0).expect("fmt::Write to String never fails");
    out
}

/// Print a type as IR text.
pub fn print_type(graph: &Graph, ty: TypeRef) -> String {
    let mut out = String::new();
    write_type(graph, &mut out, ty).expect("fmt::Write to String never fails");
    out
}

// ============================================================================
// Type and attribute printing
// ============================================================================

fn write_type(graph: &Graph, f: &mut impl Write, ty: TypeRef) -> fmt::Result {
    let data = graph.types.get(ty);
    write!(f, "{}.{}", data.dialect, data.name)?;
    if !data.params.is_empty() {
        f.write_char('(')?;
        for (i, &param) in data.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write_type(graph, f, param)?;
        }
        f.write_char(')')?;
    }
    Ok(())
}

fn write_types(graph: &Graph, f: &mut impl Write, values: &[ValueRef]) -> fmt::Result {
    if values.is_empty() {
        return Ok(());
    }
    f.write_str(" : ")?;
    for (i, &v) in values.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write_type(graph, f, graph.value_ty(v))?;
    }
    Ok(())
}

fn write_attribute(graph: &Graph, f: &mut impl Write, attr: &Attribute) -> fmt::Result {
    match attr {
        Attribute::Unit => f.write_str("unit"),
        Attribute::Bool(b) => write!(f, "{b}"),
        Attribute::IntBits(v) => write!(f, "{}", *v as i64),
        Attribute::FloatBits(bits) => {
            let v = f64::from_bits(*bits);
            let s = format!("{v}");
            f.write_str(&s)?;
            // Keep whole numbers distinguishable from integers.
            if v.is_finite() && !s.contains('.') && !s.contains('e') {
                f.write_str(".0")?;
            }
            Ok(())
        }
        Attribute::String(s) => {
            f.write_char('"')?;
            write_escaped_string(f, s)?;
            f.write_char('"')
        }
        Attribute::Type(ty) => write_type(graph, f, *ty),
        Attribute::List(list) => {
            f.write_char('[')?;
            for (i, item) in list.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write_attribute(graph, f, item)?;
            }
            f.write_char(']')
        }
    }
}

fn write_escaped_string(f: &mut impl Write, s: &str) -> fmt::Result {
    for ch in s.chars() {
        match ch {
            '\\' => f.write_str("\\\\")?,
            '"' => f.write_str("\\\"")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            c => f.write_char(c)?,
        }
    }
    Ok(())
}

// ============================================================================
// Node and block printing
// ============================================================================

fn write_graph(state: &PrintState<'_>, f: &mut impl Write) -> fmt::Result {
    let graph = state.graph;
    let top = graph.top_block();
    f.write_str("graph(")?;
    write_params(state, f, graph.block_params(top))?;
    f.write_str(") {\n")?;
    write_block_body(state, f, top, 2)?;
    f.write_str("}\n")
}

fn write_params(state: &PrintState<'_>, f: &mut impl Write, params: &[ValueRef]) -> fmt::Result {
    for (i, &param) in params.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        state.write_value(f, param)?;
        f.write_str(": ")?;
        write_type(state.graph, f, state.graph.value_ty(param))?;
    }
    Ok(())
}

fn write_block_body(
    state: &PrintState<'_>,
    f: &mut impl Write,
    block: BlockRef,
    indent: usize,
) -> fmt::Result {
    let graph = state.graph;
    for &node in graph.block_nodes(block) {
        write_node(state, f, node, indent)?;
    }
    let outputs = graph.block_outputs(block);
    if !outputs.is_empty() {
        write!(f, "{:indent$}return ", "")?;
        state.write_values(f, outputs)?;
        f.write_char('\n')?;
    }
    Ok(())
}

/// Writes `{` ... `}` for an arm, without a trailing newline.
fn write_arm(
    state: &PrintState<'_>,
    f: &mut impl Write,
    block: BlockRef,
    indent: usize,
) -> fmt::Result {
    f.write_char('{')?;
    let params = state.graph.block_params(block);
    if !params.is_empty() {
        f.write_str(" ^(")?;
        write_params(state, f, params)?;
        f.write_char(')')?;
    }
    f.write_char('\n')?;
    write_block_body(state, f, block, indent + 2)?;
    write!(f, "{:indent$}}}", "")
}

fn write_node(
    state: &PrintState<'_>,
    f: &mut impl Write,
    node: NodeRef,
    indent: usize,
) -> fmt::Result {
    let graph = state.graph;
    write!(f, "{:indent$}", "")?;

    let outputs = graph.node_outputs(node);
    if !outputs.is_empty() {
        state.write_values(f, outputs)?;
        f.write_str(" = ")?;
    }

    let kind = graph.node_kind(node);
    write!(f, "{kind}(")?;
    state.write_values(f, graph.node_inputs(node))?;
    f.write_char(')')?;

    let attrs = &graph.node(node).attributes;
    if !attrs.is_empty() {
        f.write_str(" {")?;
        for (i, (key, val)) in attrs.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key} = ")?;
            write_attribute(graph, f, val)?;
        }
        f.write_char('}')?;
    }

    write_types(graph, f, outputs)?;

    match kind {
        NodeKind::If => {
            for (i, &arm) in graph.node_blocks(node).iter().enumerate() {
                f.write_str(if i == 0 { " " } else { " else " })?;
                write_arm(state, f, arm, indent)?;
            }
        }
        NodeKind::Raise | NodeKind::Op(_) => {}
    }
    f.write_char('\n')
}
