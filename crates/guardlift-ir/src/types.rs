//! Type interning, attributes and operator kinds.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use cranelift_entity::PrimaryMap;
use smallvec::SmallVec;

use crate::refs::TypeRef;
use crate::symbol::Symbol;

// ============================================================================
// Attribute
// ============================================================================

/// Attribute values attached to nodes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Attribute {
    /// Unit/nil value.
    Unit,
    Bool(bool),
    /// Integer constant stored as raw bits (signless).
    IntBits(u64),
    /// Float constant stored as raw bits.
    FloatBits(u64),
    String(String),
    Type(TypeRef),
    /// List of attributes.
    List(Vec<Attribute>),
}

impl From<i64> for Attribute {
    fn from(value: i64) -> Self {
        Attribute::IntBits(value as u64)
    }
}

impl From<f64> for Attribute {
    fn from(value: f64) -> Self {
        Attribute::FloatBits(value.to_bits())
    }
}

impl From<&str> for Attribute {
    fn from(value: &str) -> Self {
        Attribute::String(value.to_string())
    }
}

pub type Attributes = BTreeMap<Symbol, Attribute>;

// ============================================================================
// Operator kinds
// ============================================================================

/// Dialect-qualified operator name, e.g. `aten.upsample_bilinear2d`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpName {
    pub dialect: Symbol,
    pub name: Symbol,
}

impl OpName {
    pub fn new(dialect: impl Into<Symbol>, name: impl Into<Symbol>) -> Self {
        Self {
            dialect: dialect.into(),
            name: name.into(),
        }
    }

    /// Parse `dialect.name`. Returns `None` when either half is missing.
    pub fn parse(text: &str) -> Option<Self> {
        let (dialect, name) = text.split_once('.')?;
        if dialect.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self {
            dialect: Symbol::from_dynamic(dialect),
            name: Symbol::from_dynamic(name),
        })
    }
}

impl fmt::Display for OpName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.dialect, self.name)
    }
}

/// The closed vocabulary of node kinds.
///
/// The Return sentinel is not a kind: every block carries one implicitly
/// (see `BlockData::outputs`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Two-armed conditional. Owns exactly two blocks.
    If,
    /// Unconditional runtime failure. Terminal within its block.
    Raise,
    /// Any other operator.
    Op(OpName),
}

impl NodeKind {
    pub fn is_if(self) -> bool {
        matches!(self, NodeKind::If)
    }

    pub fn is_raise(self) -> bool {
        matches!(self, NodeKind::Raise)
    }

    pub fn op_name(self) -> Option<OpName> {
        match self {
            NodeKind::Op(name) => Some(name),
            NodeKind::If | NodeKind::Raise => None,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::If => f.write_str("if"),
            NodeKind::Raise => f.write_str("raise"),
            NodeKind::Op(name) => write!(f, "{}", name),
        }
    }
}

// ============================================================================
// TypeData
// ============================================================================

/// Data for a single interned type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeData {
    pub dialect: Symbol,
    pub name: Symbol,
    pub params: SmallVec<[TypeRef; 4]>,
}

/// Builder for constructing `TypeData` with a fluent API.
pub struct TypeDataBuilder {
    dialect: Symbol,
    name: Symbol,
    params: SmallVec<[TypeRef; 4]>,
}

impl TypeDataBuilder {
    pub fn new(dialect: impl Into<Symbol>, name: impl Into<Symbol>) -> Self {
        Self {
            dialect: dialect.into(),
            name: name.into(),
            params: SmallVec::new(),
        }
    }

    pub fn param(mut self, ty: TypeRef) -> Self {
        self.params.push(ty);
        self
    }

    pub fn params(mut self, tys: impl IntoIterator<Item = TypeRef>) -> Self {
        self.params.extend(tys);
        self
    }

    pub fn build(self) -> TypeData {
        TypeData {
            dialect: self.dialect,
            name: self.name,
            params: self.params,
        }
    }
}

// ============================================================================
// TypeInterner
// ============================================================================

/// Deduplicating type interner. Same `TypeData` always yields the same `TypeRef`.
#[derive(Debug)]
pub struct TypeInterner {
    types: PrimaryMap<TypeRef, TypeData>,
    dedup: HashMap<TypeData, TypeRef>,
}

impl TypeInterner {
    pub fn new() -> Self {
        Self {
            types: PrimaryMap::new(),
            dedup: HashMap::default(),
        }
    }

    /// Intern a type, returning an existing ref if the data matches.
    pub fn intern(&mut self, data: TypeData) -> TypeRef {
        if let Some(&existing) = self.dedup.get(&data) {
            return existing;
        }
        let r = self.types.push(data.clone());
        self.dedup.insert(data, r);
        r
    }

    /// Shorthand for interning a parameterless `dialect.name` type.
    pub fn simple(&mut self, dialect: impl Into<Symbol>, name: impl Into<Symbol>) -> TypeRef {
        self.intern(TypeDataBuilder::new(dialect, name).build())
    }

    pub fn get(&self, r: TypeRef) -> &TypeData {
        &self.types[r]
    }
}

impl Default for TypeInterner {
    fn default() -> Self {
        Self::new()
    }
}
