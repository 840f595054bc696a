//! Recursive-descent parser for the catalog query language.
//!
//! Precedence, lowest to highest: `OR`, `AND`, `NOT`, primary. The symbolic
//! forms `|`, `&`, `!` are accepted as synonyms for the keywords. A leading
//! uppercase identifier immediately followed by `:` is the kind filter.

use crate::ast::{
    CompareOp, DEFAULT_TRAVERSAL_DEPTH, Direction, Expression, Literal, Query,
    RelationExpression, SubqueryTarget, Target, Traversal, VerbFilter,
};
use crate::error::{Error, Result};
use crate::lexer::{Lexer, Token, TokenKind};

pub struct Parser;

impl Parser {
    pub fn parse(source: &str) -> Result<Query> {
        let tokens = Lexer::new(source).tokenize()?;
        let mut parser = TokenParser::new(tokens, source);
        let query = parser.parse_query("query")?;
        parser.expect_eof()?;
        Ok(query)
    }
}

struct TokenParser<'a> {
    tokens: Vec<Token>,
    position: usize,
    source: &'a str,
    next_subquery_id: usize,
}

impl<'a> TokenParser<'a> {
    fn new(tokens: Vec<Token>, source: &'a str) -> Self {
        Self {
            tokens,
            position: 0,
            source,
            next_subquery_id: 0,
        }
    }

    /// Parses one `[Kind ':'] [expr]` grammar instance. Used for the whole
    /// query and, recursively, for `$( … )` sub-query bodies; `context`
    /// names the construct in the empty-body error.
    fn parse_query(&mut self, context: &str) -> Result<Query> {
        let kind = self.parse_kind_prefix();

        let expression = if self.at_query_end() {
            None
        } else {
            Some(self.parse_expression()?)
        };

        if kind.is_none() && expression.is_none() {
            return Err(self.error(format!("empty {context}")));
        }

        Ok(Query { kind, expression })
    }

    /// A kind filter is only recognized when an uppercase-initial identifier
    /// is immediately followed by `:`. Anything else is left for the
    /// expression grammar (e.g. a bare-word name shortcut).
    fn parse_kind_prefix(&mut self) -> Option<String> {
        if let TokenKind::Identifier(name) = &self.peek().kind {
            let uppercase_initial = name.chars().next().is_some_and(char::is_uppercase);
            // Offsets are char positions, so the colon is adjacent exactly
            // when it starts where the identifier ends.
            let adjacent_colon = self.peek_next().kind == TokenKind::Colon
                && self.peek().offset + name.chars().count() == self.peek_next().offset;
            if uppercase_initial && adjacent_colon {
                let name = name.clone();
                self.advance();
                self.advance();
                return Some(name);
            }
        }
        None
    }

    fn at_query_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof | TokenKind::RightParen)
    }

    fn parse_expression(&mut self) -> Result<Expression> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expression> {
        let mut expr = self.parse_and()?;
        while self.match_kind(&TokenKind::Or) || self.match_kind(&TokenKind::Pipe) {
            let right = self.parse_and()?;
            expr = Expression::Or(Box::new(expr), Box::new(right));
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expression> {
        let mut expr = self.parse_unary()?;
        while self.match_kind(&TokenKind::And) || self.match_kind(&TokenKind::Amp) {
            let right = self.parse_unary()?;
            expr = Expression::And(Box::new(expr), Box::new(right));
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expression> {
        if self.match_kind(&TokenKind::Not) || self.match_kind(&TokenKind::Bang) {
            let operand = self.parse_primary()?;
            return Ok(Expression::Not(Box::new(operand)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expression> {
        match self.peek().kind.clone() {
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.consume(&TokenKind::RightParen, "expected ')'")?;
                Ok(expr)
            }

            TokenKind::Arrow => {
                self.advance();
                self.parse_relation(Direction::Outgoing, Self::direct(), None)
            }
            TokenKind::TildeArrow => {
                self.advance();
                self.parse_relation(Direction::Outgoing, Self::transitive(), None)
            }
            TokenKind::LeftArrow => {
                self.advance();
                self.parse_relation(Direction::Incoming, Self::direct(), None)
            }
            TokenKind::LeftTilde => {
                self.advance();
                self.parse_relation(Direction::Incoming, Self::transitive(), None)
            }

            // `-{verb}>`, `~{verb}>`, `<{verb}-`, `<{verb}~`
            TokenKind::Dash => {
                self.advance();
                let verbs = self.parse_verb_filter()?;
                self.consume(&TokenKind::Gt, "expected '>' after verb filter")?;
                self.parse_relation(Direction::Outgoing, Self::direct(), Some(verbs))
            }
            TokenKind::Tilde => {
                self.advance();
                let verbs = self.parse_verb_filter()?;
                self.consume(&TokenKind::Gt, "expected '>' after verb filter")?;
                self.parse_relation(Direction::Outgoing, Self::transitive(), Some(verbs))
            }
            TokenKind::Lt => {
                self.advance();
                let verbs = self.parse_verb_filter()?;
                let traversal = if self.match_kind(&TokenKind::Dash) {
                    Self::direct()
                } else if self.match_kind(&TokenKind::Tilde) {
                    Self::transitive()
                } else {
                    return Err(self.error("expected '-' or '~' after verb filter"));
                };
                self.parse_relation(Direction::Incoming, traversal, Some(verbs))
            }

            TokenKind::Kind => {
                self.advance();
                if self.match_kind(&TokenKind::In) {
                    let values = self.parse_literal_list()?;
                    return Ok(Expression::KindIn { values });
                }
                let op = if self.match_kind(&TokenKind::Eq) {
                    CompareOp::Eq
                } else if self.match_kind(&TokenKind::Match) {
                    CompareOp::Match
                } else {
                    return Err(self.error("expected '==', '=~' or 'in' after 'kind'"));
                };
                let value = self.parse_literal()?;
                Ok(Expression::KindCompare { op, value })
            }

            TokenKind::Name => {
                self.advance();
                if self.match_kind(&TokenKind::In) {
                    let values = self.parse_literal_list()?;
                    return Ok(Expression::NameIn { values });
                }
                let op = if self.match_kind(&TokenKind::Eq) {
                    CompareOp::Eq
                } else if self.match_kind(&TokenKind::Ne) {
                    CompareOp::Ne
                } else if self.match_kind(&TokenKind::Match) {
                    CompareOp::Match
                } else {
                    return Err(self.error("expected '==', '!=', '=~' or 'in' after 'name'"));
                };
                let value = self.parse_literal()?;
                Ok(Expression::NameCompare { op, value })
            }

            TokenKind::Identifier(word) => {
                self.advance();
                if let Some(condition) = self.parse_attribute_condition(&word)? {
                    return Ok(condition);
                }
                // Bare word: shorthand for a case-insensitive name match.
                Ok(Expression::NameCompare {
                    op: CompareOp::Match,
                    value: Literal::String(word),
                })
            }

            // Quoted attribute path; no bare-word fallback here.
            TokenKind::Str(path) => {
                self.advance();
                match self.parse_attribute_condition(&path)? {
                    Some(condition) => Ok(condition),
                    None => Err(self.error("expected comparison, '?' or 'in' after attribute path")),
                }
            }

            _ => Err(self.error(format!("unexpected {}", describe(&self.peek().kind)))),
        }
    }

    /// The three condition forms shared by bare identifiers and quoted
    /// paths: comparison, existence (`?`), membership (`in`). Returns
    /// `None` when the lookahead starts none of them.
    fn parse_attribute_condition(&mut self, path: &str) -> Result<Option<Expression>> {
        if self.match_kind(&TokenKind::Question) {
            return Ok(Some(Expression::AttributeExists {
                path: path.to_string(),
            }));
        }
        if self.match_kind(&TokenKind::In) {
            let values = self.parse_literal_list()?;
            return Ok(Some(Expression::AttributeIn {
                path: path.to_string(),
                values,
            }));
        }
        if let Some(op) = self.match_compare_op() {
            let value = self.parse_literal()?;
            return Ok(Some(Expression::AttributeCompare {
                path: path.to_string(),
                op,
                value,
            }));
        }
        Ok(None)
    }

    fn match_compare_op(&mut self) -> Option<CompareOp> {
        let op = match self.peek().kind {
            TokenKind::Eq => CompareOp::Eq,
            TokenKind::Ne => CompareOp::Ne,
            TokenKind::Match => CompareOp::Match,
            TokenKind::Gt => CompareOp::Gt,
            TokenKind::Lt => CompareOp::Lt,
            TokenKind::Ge => CompareOp::Ge,
            TokenKind::Le => CompareOp::Le,
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn parse_relation(
        &mut self,
        direction: Direction,
        traversal: Traversal,
        verbs: Option<VerbFilter>,
    ) -> Result<Expression> {
        let target = match self.peek().kind.clone() {
            TokenKind::Str(name) => {
                self.advance();
                Target::Instance(name)
            }
            TokenKind::Identifier(kind) => {
                self.advance();
                Target::Kind(kind)
            }
            TokenKind::None => {
                self.advance();
                Target::NoRelations
            }
            TokenKind::SubqueryStart => {
                self.advance();
                let id = self.next_subquery_id;
                self.next_subquery_id += 1;
                let query = self.parse_query("sub-query")?;
                self.consume(&TokenKind::RightParen, "expected ')' after sub-query")?;
                Target::Subquery(SubqueryTarget {
                    id,
                    query: Box::new(query),
                })
            }
            _ => return Err(self.error("expected relation target")),
        };

        Ok(Expression::Relation(RelationExpression {
            direction,
            traversal,
            verbs,
            target,
        }))
    }

    fn parse_verb_filter(&mut self) -> Result<VerbFilter> {
        self.consume(&TokenKind::LeftBrace, "expected '{'")?;
        let negated = self.match_kind(&TokenKind::Bang);
        let mut verbs = Vec::new();
        loop {
            match self.peek().kind.clone() {
                TokenKind::Identifier(verb) => {
                    self.advance();
                    verbs.push(verb);
                }
                _ => return Err(self.error("expected relation verb")),
            }
            if !self.match_kind(&TokenKind::Comma) {
                break;
            }
        }
        self.consume(&TokenKind::RightBrace, "expected '}' after verb filter")?;
        Ok(VerbFilter { verbs, negated })
    }

    fn parse_literal(&mut self) -> Result<Literal> {
        match self.peek().kind.clone() {
            TokenKind::Str(value) => {
                self.advance();
                Ok(Literal::String(value))
            }
            TokenKind::Number(value) => {
                self.advance();
                Ok(Literal::Number(value))
            }
            TokenKind::Regex {
                pattern,
                case_insensitive,
            } => {
                self.advance();
                Ok(Literal::Regex {
                    pattern,
                    case_insensitive,
                })
            }
            _ => Err(self.error("expected string, number or regex literal")),
        }
    }

    fn parse_literal_list(&mut self) -> Result<Vec<Literal>> {
        self.consume(&TokenKind::LeftParen, "expected '(' after 'in'")?;
        let mut values = Vec::new();
        loop {
            values.push(self.parse_literal()?);
            if !self.match_kind(&TokenKind::Comma) {
                break;
            }
        }
        self.consume(&TokenKind::RightParen, "expected ')' after literal list")?;
        Ok(values)
    }

    fn direct() -> Traversal {
        Traversal::Direct
    }

    fn transitive() -> Traversal {
        Traversal::Transitive {
            max_depth: DEFAULT_TRAVERSAL_DEPTH,
        }
    }

    fn expect_eof(&mut self) -> Result<()> {
        if self.is_at_end() {
            Ok(())
        } else {
            Err(self.error(format!("unexpected {}", describe(&self.peek().kind))))
        }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::parse(message, self.peek().offset, self.source)
    }

    fn match_kind(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(kind) == std::mem::discriminant(&self.peek().kind)
    }

    fn consume(&mut self, kind: &TokenKind, message: &str) -> Result<()> {
        if self.check(kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(message))
        }
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.position]
    }

    fn peek_next(&self) -> &Token {
        if self.position + 1 < self.tokens.len() {
            &self.tokens[self.position + 1]
        } else {
            &self.tokens[self.tokens.len() - 1]
        }
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.position += 1;
        }
        &self.tokens[self.position - 1]
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Identifier(name) => format!("identifier '{name}'"),
        TokenKind::Str(value) => format!("string \"{value}\""),
        TokenKind::Number(value) => format!("number {value}"),
        TokenKind::Eof => "end of query".to_string(),
        other => format!("token {other:?}"),
    }
}
