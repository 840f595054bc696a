//! Abstract syntax tree for the catalog query language.
//!
//! A parsed query is a tree, never a graph: logical nodes own their operand
//! expressions, and sub-query targets own a full nested [`Query`]. All
//! variants are closed enums matched exhaustively by the evaluator.

use serde::{Deserialize, Serialize};

/// Hop bound applied to transitive relation traversal.
pub const DEFAULT_TRAVERSAL_DEPTH: usize = 10;

/// Root of one parsed query: an optional kind filter plus an optional
/// expression. The parser rejects a query with neither.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub kind: Option<String>,
    pub expression: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
    Not(Box<Expression>),

    /// `path op literal`
    AttributeCompare {
        path: String,
        op: CompareOp,
        value: Literal,
    },
    /// `path ?` — present and non-blank
    AttributeExists { path: String },
    /// `path in (lit, lit, …)`
    AttributeIn { path: String, values: Vec<Literal> },

    /// `kind == lit` / `kind =~ lit`
    KindCompare { op: CompareOp, value: Literal },
    /// `kind in (lit, …)`
    KindIn { values: Vec<Literal> },

    /// `name == lit` / `name != lit` / `name =~ lit`
    NameCompare { op: CompareOp, value: Literal },
    /// `name in (lit, …)`
    NameIn { values: Vec<Literal> },

    Relation(RelationExpression),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    /// `=~`
    Match,
    Gt,
    Lt,
    Ge,
    Le,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    String(String),
    Number(f64),
    Regex {
        pattern: String,
        case_insensitive: bool,
    },
}

/// One relation condition: `-> target`, `~> target`, `<- target`,
/// `<~ target`, optionally with a verb filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationExpression {
    pub direction: Direction,
    pub traversal: Traversal,
    pub verbs: Option<VerbFilter>,
    pub target: Target,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Outgoing,
    Incoming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Traversal {
    Direct,
    Transitive { max_depth: usize },
}

/// Allow- or deny-list over relation verbs, `{v, w}` / `{!v, w}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerbFilter {
    pub verbs: Vec<String>,
    pub negated: bool,
}

impl VerbFilter {
    /// Whether an edge with this verb passes the filter.
    pub fn allows(&self, verb: &str) -> bool {
        self.verbs.iter().any(|v| v == verb) != self.negated
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Target {
    /// Bare identifier: any instance of this kind.
    Kind(String),
    /// Quoted string: the instance with exactly this name.
    Instance(String),
    /// `none`: the instance has no relations of the given shape at all.
    NoRelations,
    /// `$( query )`: membership in the nested query's result set.
    Subquery(SubqueryTarget),
}

/// Nested query target. `id` is the sub-query's position in the parse
/// (dense, parse order); the evaluator uses it as the cache key when
/// materializing sub-query result sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubqueryTarget {
    pub id: usize,
    pub query: Box<Query>,
}
