//! Text format parser.
//!
//! Parses the textual format produced by [`crate::printer`] back into a
//! [`Graph`].
//!
//! # Two-stage parsing
//!
//! 1. **Raw parse**: winnow combinators turn text into `Raw*` structures that
//!    borrow from the input.
//! 2. **Graph build**: `GraphBuilder` resolves value names against lexical
//!    scopes and creates nodes, blocks and values.
//!
//! Value names are kept as debug-name metadata unless they are purely numeric
//! (the printer's own `%N` numbering).

use std::collections::HashMap;

use derive_more::{Display, Error};
use winnow::ascii;
use winnow::combinator::{alt, delimited, opt, preceded, separated};
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::{any, one_of, take_till, take_while};

use crate::graph::{Graph, NodeBuilder, ValueMeta};
use crate::refs::{BlockRef, TypeRef, ValueRef};
use crate::symbol::Symbol;
use crate::types::{Attribute, Attributes, NodeKind, OpName, TypeDataBuilder};

/// Parse error for the text format.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
#[display("parse error at offset {offset}: {message}")]
pub struct ParseError {
    pub message: String,
    pub offset: usize,
}

// ============================================================================
// Raw (unresolved) structures
// ============================================================================

#[derive(Debug, Clone)]
struct RawGraph<'a> {
    params: Vec<(&'a str, RawType<'a>)>,
    body: RawBlock<'a>,
}

#[derive(Debug, Clone)]
struct RawBlock<'a> {
    params: Vec<(&'a str, RawType<'a>)>,
    nodes: Vec<RawNode<'a>>,
    outputs: Vec<&'a str>,
}

#[derive(Debug, Clone, Copy)]
enum RawKind<'a> {
    If,
    Raise,
    Op(&'a str, &'a str),
}

#[derive(Debug, Clone)]
struct RawNode<'a> {
    results: Vec<&'a str>,
    kind: RawKind<'a>,
    operands: Vec<&'a str>,
    attributes: Vec<(&'a str, RawAttribute<'a>)>,
    result_types: Vec<RawType<'a>>,
    arms: Vec<RawBlock<'a>>,
}

#[derive(Debug, Clone)]
struct RawType<'a> {
    dialect: &'a str,
    name: &'a str,
    params: Vec<RawType<'a>>,
}

#[derive(Debug, Clone)]
enum RawAttribute<'a> {
    Bool(bool),
    Int(u64),
    Float(f64),
    String(String),
    Type(RawType<'a>),
    List(Vec<RawAttribute<'a>>),
    Unit,
}

enum BlockItem<'a> {
    Node(RawNode<'a>),
    Return(Vec<&'a str>),
}

// ============================================================================
// Winnow parsers
// ============================================================================

/// Skip whitespace and `//` line comments.
fn ws(input: &mut &str) -> ModalResult<()> {
    loop {
        take_while(0.., |c: char| c.is_ascii_whitespace())
            .void()
            .parse_next(input)?;
        if input.starts_with("//") {
            take_till(0.., '\n').void().parse_next(input)?;
        } else {
            return Ok(());
        }
    }
}

/// Parse an identifier: [a-zA-Z_][a-zA-Z0-9_]*
fn ident<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    (
        one_of(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
        .take()
        .parse_next(input)
}

/// Parse a value reference: %name or %number
fn value_ref<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    preceded(
        '%',
        take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
    .parse_next(input)
}

/// Parse a dialect-qualified name: dialect.name
fn qualified_name<'a>(input: &mut &'a str) -> ModalResult<(&'a str, &'a str)> {
    (ident, '.', ident)
        .map(|(d, _, n)| (d, n))
        .parse_next(input)
}

/// Parse an integer literal (negative values are stored two's complement).
fn integer_lit(input: &mut &str) -> ModalResult<u64> {
    let negative = opt('-').parse_next(input)?.is_some();
    let value: u64 = ascii::dec_uint(input)?;
    if !negative {
        return Ok(value);
    }
    let i64_min_magnitude = i64::MAX as u64 + 1;
    if value > i64_min_magnitude {
        return Err(ErrMode::Backtrack(ContextError::new()));
    }
    Ok(value.wrapping_neg())
}

/// Parse a float literal that must contain a decimal point, so that `42`
/// stays an integer.
fn float_with_dot(input: &mut &str) -> ModalResult<f64> {
    let s = (
        opt('-'),
        take_while(1.., |c: char| c.is_ascii_digit()),
        '.',
        take_while(1.., |c: char| c.is_ascii_digit()),
        opt((
            one_of(['e', 'E']),
            opt(one_of(['+', '-'])),
            take_while(1.., |c: char| c.is_ascii_digit()),
        )),
    )
        .take()
        .parse_next(input)?;
    s.parse::<f64>()
        .map_err(|_| ErrMode::Backtrack(ContextError::new()))
}

/// Parse a string literal: "content"
fn string_lit(input: &mut &str) -> ModalResult<String> {
    '"'.parse_next(input)?;
    let mut result = String::new();
    loop {
        match any.parse_next(input)? {
            '"' => break,
            '\\' => match any.parse_next(input)? {
                '"' => result.push('"'),
                '\\' => result.push('\\'),
                'n' => result.push('\n'),
                't' => result.push('\t'),
                other => {
                    result.push('\\');
                    result.push(other);
                }
            },
            c => result.push(c),
        }
    }
    Ok(result)
}

/// Parse a type: `dialect.name` or `dialect.name(params)`.
fn raw_type<'a>(input: &mut &'a str) -> ModalResult<RawType<'a>> {
    let (dialect, name) = qualified_name.parse_next(input)?;
    let params = opt(delimited(
        ('(', ws),
        separated(0.., (ws, raw_type, ws).map(|(_, t, _)| t), ','),
        (ws, ')'),
    ))
    .parse_next(input)?
    .unwrap_or_default();
    Ok(RawType {
        dialect,
        name,
        params,
    })
}

fn raw_attr_value<'a>(input: &mut &'a str) -> ModalResult<RawAttribute<'a>> {
    alt((
        "true".value(RawAttribute::Bool(true)),
        "false".value(RawAttribute::Bool(false)),
        "unit".value(RawAttribute::Unit),
        string_lit.map(RawAttribute::String),
        delimited(
            ('[', ws),
            separated(0.., (ws, raw_attr_value, ws).map(|(_, a, _)| a), ','),
            (ws, ']'),
        )
        .map(RawAttribute::List),
        float_with_dot.map(RawAttribute::Float),
        integer_lit.map(RawAttribute::Int),
        raw_type.map(RawAttribute::Type),
    ))
    .parse_next(input)
}

/// Parse an attribute dict: {key = value, ...}
fn raw_attr_dict<'a>(input: &mut &'a str) -> ModalResult<Vec<(&'a str, RawAttribute<'a>)>> {
    delimited(
        ('{', ws),
        separated(
            0..,
            (ws, ident, ws, '=', ws, raw_attr_value, ws).map(|(_, k, _, _, _, v, _)| (k, v)),
            ',',
        ),
        (ws, '}'),
    )
    .parse_next(input)
}

/// Parse a comma-separated value list, possibly empty.
fn value_list<'a>(input: &mut &'a str) -> ModalResult<Vec<&'a str>> {
    separated(0.., (ws, value_ref, ws).map(|(_, v, _)| v), ',').parse_next(input)
}

/// Parse operands: (%a, %b)
fn operands<'a>(input: &mut &'a str) -> ModalResult<Vec<&'a str>> {
    delimited(('(', ws), value_list, (ws, ')')).parse_next(input)
}

/// Parse result list: %0 = or %0, %1 =
fn result_list<'a>(input: &mut &'a str) -> ModalResult<Vec<&'a str>> {
    let results: Vec<&str> =
        separated(1.., (ws, value_ref, ws).map(|(_, v, _)| v), ',').parse_next(input)?;
    '='.parse_next(input)?;
    Ok(results)
}

/// Parse type annotation: : type1, type2
fn type_annotation<'a>(input: &mut &'a str) -> ModalResult<Vec<RawType<'a>>> {
    preceded(
        (ws, ':', ws),
        separated(1.., (ws, raw_type, ws).map(|(_, t, _)| t), ','),
    )
    .parse_next(input)
}

/// Parse a parameter list: (%a: type, ...)
fn params<'a>(input: &mut &'a str) -> ModalResult<Vec<(&'a str, RawType<'a>)>> {
    delimited(
        ('(', ws),
        separated(
            0..,
            (ws, value_ref, ws, ':', ws, raw_type, ws).map(|(_, name, _, _, _, ty, _)| (name, ty)),
            ',',
        ),
        (ws, ')'),
    )
    .parse_next(input)
}

fn raw_op_node<'a>(input: &mut &'a str) -> ModalResult<RawNode<'a>> {
    let (dialect, name) = qualified_name.parse_next(input)?;
    ws.parse_next(input)?;
    let operands = operands.parse_next(input)?;
    let attributes = opt(preceded(ws, raw_attr_dict))
        .parse_next(input)?
        .unwrap_or_default();
    let result_types = opt(type_annotation).parse_next(input)?.unwrap_or_default();
    Ok(RawNode {
        results: Vec::new(),
        kind: RawKind::Op(dialect, name),
        operands,
        attributes,
        result_types,
        arms: Vec::new(),
    })
}

fn raw_if_node<'a>(input: &mut &'a str) -> ModalResult<RawNode<'a>> {
    ("if", ws).void().parse_next(input)?;
    let operands = operands.parse_next(input)?;
    let result_types = opt(type_annotation).parse_next(input)?.unwrap_or_default();
    ws.parse_next(input)?;
    let then_arm = raw_block.parse_next(input)?;
    (ws, "else", ws).void().parse_next(input)?;
    let else_arm = raw_block.parse_next(input)?;
    Ok(RawNode {
        results: Vec::new(),
        kind: RawKind::If,
        operands,
        attributes: Vec::new(),
        result_types,
        arms: vec![then_arm, else_arm],
    })
}

fn raw_raise_node<'a>(input: &mut &'a str) -> ModalResult<RawNode<'a>> {
    ("raise", ws).void().parse_next(input)?;
    let operands = operands.parse_next(input)?;
    let attributes = opt(preceded(ws, raw_attr_dict))
        .parse_next(input)?
        .unwrap_or_default();
    Ok(RawNode {
        results: Vec::new(),
        kind: RawKind::Raise,
        operands,
        attributes,
        result_types: Vec::new(),
        arms: Vec::new(),
    })
}

/// Parse a single node.
///
/// ```text
/// [results =] if(%c) [: types] { ... } else { ... }
/// [results =] raise(operands) [{attrs}]
/// [results =] dialect.name(operands) [{attrs}] [: types]
/// ```
fn raw_node<'a>(input: &mut &'a str) -> ModalResult<RawNode<'a>> {
    let results = opt(result_list).parse_next(input)?.unwrap_or_default();
    ws.parse_next(input)?;
    let mut node = alt((raw_op_node, raw_if_node, raw_raise_node)).parse_next(input)?;
    node.results = results;
    Ok(node)
}

fn raw_return<'a>(input: &mut &'a str) -> ModalResult<Vec<&'a str>> {
    preceded("return", value_list).parse_next(input)
}

/// Parse a block: { [^(params)] nodes... [return values] }
fn raw_block<'a>(input: &mut &'a str) -> ModalResult<RawBlock<'a>> {
    ('{', ws).void().parse_next(input)?;
    let params = opt(preceded('^', params))
        .parse_next(input)?
        .unwrap_or_default();

    let mut nodes = Vec::new();
    let mut outputs = Vec::new();
    loop {
        ws.parse_next(input)?;
        if input.starts_with('}') {
            break;
        }
        match alt((
            raw_node.map(BlockItem::Node),
            raw_return.map(BlockItem::Return),
        ))
        .parse_next(input)?
        {
            BlockItem::Node(node) => nodes.push(node),
            BlockItem::Return(values) => {
                outputs = values;
                ws.parse_next(input)?;
                break;
            }
        }
    }
    '}'.parse_next(input)?;

    Ok(RawBlock {
        params,
        nodes,
        outputs,
    })
}

fn raw_graph<'a>(input: &mut &'a str) -> ModalResult<RawGraph<'a>> {
    ("graph", ws).void().parse_next(input)?;
    let params = params.parse_next(input)?;
    ws.parse_next(input)?;
    let body = raw_block.parse_next(input)?;
    Ok(RawGraph { params, body })
}

// ============================================================================
// GraphBuilder (Raw -> Graph)
// ============================================================================

struct GraphBuilder<'s> {
    source: &'s str,
    graph: Graph,
    /// Maps visible value name (without %) -> ValueRef.
    scope: HashMap<&'s str, ValueRef>,
}

impl<'s> GraphBuilder<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            source,
            graph: Graph::new(),
            scope: HashMap::new(),
        }
    }

    /// Byte offset of a slice borrowed from the source text.
    fn offset_of(&self, part: &str) -> usize {
        (part.as_ptr() as usize).saturating_sub(self.source.as_ptr() as usize)
    }

    fn error(&self, at: &str, message: String) -> ParseError {
        ParseError {
            message,
            offset: self.offset_of(at),
        }
    }

    fn build_type(&mut self, raw: &RawType<'_>) -> TypeRef {
        let params: Vec<TypeRef> = raw.params.iter().map(|p| self.build_type(p)).collect();
        let data = TypeDataBuilder::new(
            Symbol::from_dynamic(raw.dialect),
            Symbol::from_dynamic(raw.name),
        )
        .params(params)
        .build();
        self.graph.types.intern(data)
    }

    fn build_attribute(&mut self, raw: &RawAttribute<'_>) -> Attribute {
        match raw {
            RawAttribute::Bool(b) => Attribute::Bool(*b),
            RawAttribute::Int(n) => Attribute::IntBits(*n),
            RawAttribute::Float(f) => Attribute::FloatBits(f.to_bits()),
            RawAttribute::String(s) => Attribute::String(s.clone()),
            RawAttribute::Type(t) => Attribute::Type(self.build_type(t)),
            RawAttribute::List(items) => {
                Attribute::List(items.iter().map(|a| self.build_attribute(a)).collect())
            }
            RawAttribute::Unit => Attribute::Unit,
        }
    }

    fn meta(&mut self, name: &str, ty: &RawType<'_>) -> ValueMeta {
        let is_numbered = name.chars().all(|c| c.is_ascii_digit());
        ValueMeta {
            ty: self.build_type(ty),
            name: (!is_numbered).then(|| Symbol::from_dynamic(name)),
        }
    }

    fn define(&mut self, name: &'s str, value: ValueRef) -> Result<(), ParseError> {
        if self.scope.insert(name, value).is_some() {
            return Err(self.error(name, format!("value %{name} is defined twice")));
        }
        Ok(())
    }

    fn resolve(&self, name: &'s str) -> Result<ValueRef, ParseError> {
        self.scope
            .get(name)
            .copied()
            .ok_or_else(|| self.error(name, format!("use of undefined value %{name}")))
    }

    fn build_graph(mut self, raw: &RawGraph<'s>) -> Result<Graph, ParseError> {
        let top = self.graph.top_block();
        self.fill_block(top, &raw.params, &raw.body)?;
        Ok(self.graph)
    }

    /// Build an arm in its own scope; names defined inside do not leak out.
    fn build_arm(&mut self, raw: &RawBlock<'s>) -> Result<BlockRef, ParseError> {
        let saved = self.scope.clone();
        let block = self.graph.create_block();
        let result = self.fill_block(block, &raw.params, raw);
        self.scope = saved;
        result.map(|()| block)
    }

    fn fill_block(
        &mut self,
        block: BlockRef,
        params: &[(&'s str, RawType<'s>)],
        raw: &RawBlock<'s>,
    ) -> Result<(), ParseError> {
        for (name, ty) in params {
            let meta = self.meta(name, ty);
            let value = self.graph.add_param(block, meta);
            self.define(*name, value)?;
        }
        for node in &raw.nodes {
            self.build_node(block, node)?;
        }
        let outputs = raw
            .outputs
            .iter()
            .map(|&name| self.resolve(name))
            .collect::<Result<Vec<_>, _>>()?;
        self.graph.set_block_outputs(block, outputs);
        Ok(())
    }

    fn build_node(&mut self, block: BlockRef, raw: &RawNode<'s>) -> Result<(), ParseError> {
        let anchor = raw.results.first().copied().unwrap_or(self.source);
        if raw.results.len() != raw.result_types.len() {
            return Err(self.error(
                anchor,
                format!(
                    "{} result(s) but {} result type(s)",
                    raw.results.len(),
                    raw.result_types.len()
                ),
            ));
        }

        let kind = match raw.kind {
            RawKind::If => NodeKind::If,
            RawKind::Raise => NodeKind::Raise,
            RawKind::Op(dialect, name) => NodeKind::Op(OpName::new(
                Symbol::from_dynamic(dialect),
                Symbol::from_dynamic(name),
            )),
        };
        if kind.is_raise() && !raw.results.is_empty() {
            return Err(self.error(anchor, "raise produces no values".to_string()));
        }

        let inputs = raw
            .operands
            .iter()
            .map(|&name| self.resolve(name))
            .collect::<Result<Vec<_>, _>>()?;
        let attributes: Attributes = raw
            .attributes
            .iter()
            .map(|(key, val)| (Symbol::from_dynamic(key), self.build_attribute(val)))
            .collect();
        let outputs: Vec<ValueMeta> = raw
            .results
            .iter()
            .zip(&raw.result_types)
            .map(|(name, ty)| self.meta(name, ty))
            .collect();

        let mut builder = NodeBuilder::new(kind)
            .inputs(inputs)
            .outputs(outputs)
            .attrs(attributes);
        for arm in &raw.arms {
            builder = builder.block(self.build_arm(arm)?);
        }
        let node = self.graph.create_node(builder);
        self.graph.push_node(block, node);

        for (idx, &name) in raw.results.iter().enumerate() {
            let value = self.graph.node_output(node, idx as u32);
            self.define(name, value)?;
        }
        Ok(())
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Parse a graph from its textual representation.
pub fn parse_graph(input: &str) -> Result<Graph, ParseError> {
    let mut remaining = input;
    let raw = (ws, raw_graph, ws)
        .map(|(_, g, _)| g)
        .parse_next(&mut remaining)
        .map_err(|e| ParseError {
            message: format!("syntax error: {e}"),
            offset: input.len() - remaining.len(),
        })?;

    if !remaining.is_empty() {
        return Err(ParseError {
            message: "trailing input after graph".to_string(),
            offset: input.len() - remaining.len(),
        });
    }

    GraphBuilder::new(input).build_graph(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::printer::print_graph;

    #[test]
    fn test_parse_round_trip() {
        let input = r#"graph(%0: core.tensor, %1: core.bool) {
  %2 = if(%1) : core.tensor {
    %3 = aten.upsample_bilinear2d(%0) {align_corners = false, scale = [2.0, 2.0]} : core.tensor
    return %3
  } else {
    raise() {message = "bad size"}
    return %0
  }
  return %2
}
"#;
        let graph = parse_graph(input).unwrap();
        assert_eq!(print_graph(&graph), input);
    }

    #[test]
    fn test_parse_keeps_debug_names() {
        let graph = parse_graph(
            "graph(%input: core.tensor) {
               // comment lines are skipped
               %out = aten.relu(%input) : core.tensor
               return %out
             }",
        )
        .unwrap();

        let top = graph.top_block();
        let input = graph.block_params(top)[0];
        assert_eq!(graph.value(input).name, Some(Symbol::new("input")));
        let out = graph.block_outputs(top)[0];
        assert_eq!(graph.value(out).name, Some(Symbol::new("out")));

        insta::assert_snapshot!(print_graph(&graph), @r"
        graph(%0: core.tensor) {
          %1 = aten.relu(%0) : core.tensor
          return %1
        }
        ");
    }

    #[test]
    fn test_parse_numbered_names_are_not_kept() {
        let graph = parse_graph("graph(%0: core.tensor) { return %0 }").unwrap();
        let param = graph.block_params(graph.top_block())[0];
        assert_eq!(graph.value(param).name, None);
    }

    #[test]
    fn test_parse_attribute_forms() {
        let graph = parse_graph(
            "graph() {
               aten.print() {a = -1, b = unit, c = core.list(core.tensor), d = true}
             }",
        )
        .unwrap();
        let node = graph.block_nodes(graph.top_block())[0];
        let attrs = &graph.node(node).attributes;
        assert_eq!(attrs[&Symbol::new("a")], Attribute::from(-1i64));
        assert_eq!(attrs[&Symbol::new("b")], Attribute::Unit);
        assert!(matches!(attrs[&Symbol::new("c")], Attribute::Type(_)));
        assert_eq!(attrs[&Symbol::new("d")], Attribute::Bool(true));
    }

    #[test]
    fn test_arm_values_do_not_leak() {
        let err = parse_graph(
            "graph(%c: core.bool) {
               if(%c) {
                 %inner = aten.zeros() : core.tensor
               } else {
               }
               aten.print(%inner)
             }",
        )
        .unwrap_err();
        assert!(err.message.contains("undefined value %inner"), "{err}");
    }

    #[test]
    fn test_parse_error_offsets() {
        let input = "graph() { aten.print(%missing) }";
        let err = parse_graph(input).unwrap_err();
        assert_eq!(err.offset, input.find("missing").unwrap());

        let err = parse_graph("graph() { } trailing").unwrap_err();
        assert_eq!(err.message, "trailing input after graph");
        assert_eq!(err.offset, 12);
    }

    #[test]
    fn test_duplicate_definition_rejected() {
        let err = parse_graph(
            "graph(%x: core.tensor) {
               %x = aten.relu(%x) : core.tensor
             }",
        )
        .unwrap_err();
        assert!(err.message.contains("defined twice"), "{err}");
    }

    #[test]
    fn test_result_type_count_mismatch() {
        let err = parse_graph(
            "graph(%x: core.tensor) {
               %a, %b = aten.split(%x) : core.tensor
             }",
        )
        .unwrap_err();
        assert!(err.message.contains("2 result(s) but 1"), "{err}");
    }
}
