//! # resgraph query engine
//!
//! A small query language over a catalog of typed, related resources.
//! Queries filter instances by kind, attribute value, name, and direct or
//! transitive graph relations, including nested sub-queries and relation-verb
//! filters:
//!
//! ```text
//! ApplicationComponent: activity/status == "active" AND -> Database
//! TechnologyArtifact: -> none
//! ~{uses}> $(kind == "Database" AND name =~ /legacy/i)
//! ```
//!
//! The pipeline is source string → [`lexer`] → [`parser`] → [`ast`] →
//! [`evaluator`]. Everything is synchronous and in-memory; the store is
//! treated as read-only for the duration of a call. Errors carry the source and a
//! character offset, see [`Error::annotate`].

pub mod ast;
pub mod error;
pub mod evaluator;
pub mod lexer;
pub mod parser;

pub use error::{Error, ErrorKind, Result};
pub use evaluator::Evaluator;

use resgraph_api::{Instance, ResourceGraph};

/// Parses a query source string into a reusable [`ParsedQuery`].
pub fn parse(source: &str) -> Result<ParsedQuery> {
    let root = parser::Parser::parse(source)?;
    Ok(ParsedQuery { root })
}

/// A parsed query, ready to run any number of times against any store.
///
/// Each `matches`/`filter` call owns a fresh evaluator (and with it a fresh
/// sub-query cache), so a `ParsedQuery` may be shared across threads querying
/// the same immutable store snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuery {
    root: ast::Query,
}

impl ParsedQuery {
    /// Tests a single instance.
    pub fn matches<S: ResourceGraph>(&self, graph: &S, instance: &Instance) -> bool {
        Evaluator::new(graph).matches(&self.root, instance)
    }

    /// Collects every matching instance, in store iteration order.
    pub fn filter<'g, S: ResourceGraph>(&self, graph: &'g S) -> Vec<&'g Instance> {
        Evaluator::new(graph).filter(&self.root)
    }

    /// The underlying syntax tree.
    pub fn root(&self) -> &ast::Query {
        &self.root
    }
}
