//! Tokenizer for the catalog query language.
//!
//! Produces a flat token stream terminated by [`TokenKind::Eof`]. Every token
//! records the character offset it started at, so parse errors can point back
//! into the source.

use std::iter::Peekable;
use std::str::Chars;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Keywords (matched case-insensitively)
    And,
    Or,
    Not,
    Kind,
    Name,
    None,
    In,

    // Literals
    Identifier(String),
    Str(String),
    Number(f64),
    Regex { pattern: String, case_insensitive: bool },

    // Comparison operators
    Eq,
    Ne,
    Match,
    Gt,
    Lt,
    Ge,
    Le,

    // Relation operators
    Arrow,      // ->
    TildeArrow, // ~>
    LeftArrow,  // <-
    LeftTilde,  // <~
    Dash,       // - (verb-filter bracket form)
    Tilde,      // ~ (verb-filter bracket form)

    // Symbolic logic operators
    Amp,
    Pipe,
    Bang,

    // Punctuation
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    Colon,
    Comma,
    Question,
    SubqueryStart, // $(

    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub offset: usize,
}

pub struct Lexer<'a> {
    source: &'a str,
    chars: Peekable<Chars<'a>>,
    position: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().peekable(),
            position: 0,
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        tokens.push(Token {
            kind: TokenKind::Eof,
            offset: self.position,
        });
        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Option<Token>> {
        self.skip_whitespace();

        if self.chars.peek().is_none() {
            return Ok(None);
        }

        let start = self.position;
        let char = self.advance().unwrap();

        // String literals
        if char == '"' || char == '\'' {
            return Ok(Some(self.read_string(char, start)?));
        }

        // Regex literals. Identifiers may contain '/' but never start with
        // one, so a leading slash is unambiguous.
        if char == '/' {
            return Ok(Some(self.read_regex(start)?));
        }

        // Number literals
        if char.is_ascii_digit() {
            return Ok(Some(self.read_number(char, start)?));
        }

        // Identifiers and keywords
        if char.is_alphabetic() || char == '_' {
            return Ok(Some(self.read_identifier(char, start)));
        }

        let kind = match char {
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            '{' => TokenKind::LeftBrace,
            '}' => TokenKind::RightBrace,
            ':' => TokenKind::Colon,
            ',' => TokenKind::Comma,
            '?' => TokenKind::Question,
            '&' => TokenKind::Amp,
            '|' => TokenKind::Pipe,
            '-' => {
                // `-{verb}>` needs a bare dash; `->` is the arrow; a digit
                // starts a negative number.
                match self.chars.peek() {
                    Some(&'>') => {
                        self.advance();
                        TokenKind::Arrow
                    }
                    Some(c) if c.is_ascii_digit() => {
                        return Ok(Some(self.read_number('-', start)?));
                    }
                    _ => TokenKind::Dash,
                }
            }
            '~' => {
                if let Some(&'>') = self.chars.peek() {
                    self.advance();
                    TokenKind::TildeArrow
                } else {
                    TokenKind::Tilde
                }
            }
            '<' => match self.chars.peek() {
                // `<{verb}-` keeps the '<' standalone
                Some(&'{') => TokenKind::Lt,
                Some(&'-') => {
                    self.advance();
                    TokenKind::LeftArrow
                }
                Some(&'~') => {
                    self.advance();
                    TokenKind::LeftTilde
                }
                Some(&'=') => {
                    self.advance();
                    TokenKind::Le
                }
                _ => TokenKind::Lt,
            },
            '>' => {
                if let Some(&'=') = self.chars.peek() {
                    self.advance();
                    TokenKind::Ge
                } else {
                    TokenKind::Gt
                }
            }
            '=' => match self.chars.peek() {
                Some(&'=') => {
                    self.advance();
                    TokenKind::Eq
                }
                Some(&'~') => {
                    self.advance();
                    TokenKind::Match
                }
                _ => {
                    return Err(Error::lex("unexpected character '='", start, self.source));
                }
            },
            '!' => {
                if let Some(&'=') = self.chars.peek() {
                    self.advance();
                    TokenKind::Ne
                } else {
                    TokenKind::Bang
                }
            }
            '$' => {
                if let Some(&'(') = self.chars.peek() {
                    self.advance();
                    TokenKind::SubqueryStart
                } else {
                    return Err(Error::lex("expected '(' after '$'", start, self.source));
                }
            }
            other => {
                return Err(Error::lex(
                    format!("unexpected character '{other}'"),
                    start,
                    self.source,
                ));
            }
        };

        Ok(Some(Token { kind, offset: start }))
    }

    fn advance(&mut self) -> Option<char> {
        let char = self.chars.next();
        if char.is_some() {
            self.position += 1;
        }
        char
    }

    fn skip_whitespace(&mut self) {
        while let Some(&char) = self.chars.peek() {
            if char.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_string(&mut self, quote: char, start: usize) -> Result<Token> {
        let mut value = String::new();
        loop {
            let Some(char) = self.advance() else {
                return Err(Error::lex("unterminated string", start, self.source));
            };
            if char == quote {
                break;
            }
            // Escapes are honored in double-quoted strings only.
            if char == '\\' && quote == '"' {
                let Some(escaped) = self.advance() else {
                    return Err(Error::lex("unterminated string", start, self.source));
                };
                value.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                });
                continue;
            }
            value.push(char);
        }
        Ok(Token {
            kind: TokenKind::Str(value),
            offset: start,
        })
    }

    fn read_regex(&mut self, start: usize) -> Result<Token> {
        let mut pattern = String::new();
        loop {
            let Some(char) = self.advance() else {
                return Err(Error::lex(
                    "unterminated regular expression",
                    start,
                    self.source,
                ));
            };
            if char == '/' {
                break;
            }
            if char == '\\' {
                let Some(escaped) = self.advance() else {
                    return Err(Error::lex(
                        "unterminated regular expression",
                        start,
                        self.source,
                    ));
                };
                // An escaped delimiter becomes a literal '/'; everything else
                // stays an escape sequence for the regex engine.
                if escaped == '/' {
                    pattern.push('/');
                } else {
                    pattern.push('\\');
                    pattern.push(escaped);
                }
                continue;
            }
            pattern.push(char);
        }

        // Trailing flags; only `i` changes evaluation semantics.
        let mut case_insensitive = false;
        while let Some(&flag) = self.chars.peek() {
            match flag {
                'i' => case_insensitive = true,
                'm' | 'x' => {}
                _ => break,
            }
            self.advance();
        }

        if let Err(err) = regex::Regex::new(&pattern) {
            return Err(Error::lex(
                format!("invalid regular expression: {err}"),
                start,
                self.source,
            ));
        }

        Ok(Token {
            kind: TokenKind::Regex {
                pattern,
                case_insensitive,
            },
            offset: start,
        })
    }

    fn read_number(&mut self, first: char, start: usize) -> Result<Token> {
        let mut value = String::new();
        value.push(first);
        let mut has_dot = false;
        while let Some(&char) = self.chars.peek() {
            if char.is_ascii_digit() {
                value.push(char);
                self.advance();
            } else if char == '.' && !has_dot {
                has_dot = true;
                value.push(char);
                self.advance();
            } else {
                break;
            }
        }
        let number = value
            .parse::<f64>()
            .map_err(|_| Error::lex(format!("invalid number '{value}'"), start, self.source))?;
        Ok(Token {
            kind: TokenKind::Number(number),
            offset: start,
        })
    }

    fn read_identifier(&mut self, first: char, start: usize) -> Token {
        let mut value = String::new();
        value.push(first);
        while let Some(&char) = self.chars.peek() {
            if char.is_alphanumeric() || char == '_' || char == '/' || char == '.' {
                value.push(char);
                self.advance();
            } else if char == '-' {
                // Hyphens belong to hierarchical identifiers (`foo-bar`)
                // unless they start an arrow or a verb-filter bracket.
                let mut lookahead = self.chars.clone();
                lookahead.next();
                if matches!(lookahead.next(), Some('>') | Some('{')) {
                    break;
                }
                value.push(char);
                self.advance();
            } else {
                break;
            }
        }

        let kind = match value.to_lowercase().as_str() {
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            "kind" => TokenKind::Kind,
            "name" => TokenKind::Name,
            "none" => TokenKind::None,
            "in" => TokenKind::In,
            _ => TokenKind::Identifier(value),
        };

        Token {
            kind,
            offset: start,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn operators_are_matched_greedily() {
        assert_eq!(
            kinds("== != =~ >= <= -> ~> <- <~"),
            vec![
                TokenKind::Eq,
                TokenKind::Ne,
                TokenKind::Match,
                TokenKind::Ge,
                TokenKind::Le,
                TokenKind::Arrow,
                TokenKind::TildeArrow,
                TokenKind::LeftArrow,
                TokenKind::LeftTilde,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn verb_filter_brackets_split_the_relation_operator() {
        assert_eq!(
            kinds("-{uses}>"),
            vec![
                TokenKind::Dash,
                TokenKind::LeftBrace,
                TokenKind::Identifier("uses".into()),
                TokenKind::RightBrace,
                TokenKind::Gt,
                TokenKind::Eof,
            ]
        );
        assert_eq!(
            kinds("<{uses}~"),
            vec![
                TokenKind::Lt,
                TokenKind::LeftBrace,
                TokenKind::Identifier("uses".into()),
                TokenKind::RightBrace,
                TokenKind::Tilde,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn hierarchical_identifiers_and_keywords() {
        assert_eq!(
            kinds("activity/status AND x_1.y-z"),
            vec![
                TokenKind::Identifier("activity/status".into()),
                TokenKind::And,
                TokenKind::Identifier("x_1.y-z".into()),
                TokenKind::Eof,
            ]
        );
        // Keywords are case-insensitive
        assert_eq!(kinds("NoT")[0], TokenKind::Not);
        assert_eq!(kinds("NONE")[0], TokenKind::None);
    }

    #[test]
    fn strings_escape_only_when_double_quoted() {
        assert_eq!(
            kinds(r#""a\"b""#)[0],
            TokenKind::Str(r#"a"b"#.into())
        );
        assert_eq!(kinds(r"'a\b'")[0], TokenKind::Str(r"a\b".into()));
    }

    #[test]
    fn regex_literal_with_flags() {
        assert_eq!(
            kinds(r"/foo\/bar/i")[0],
            TokenKind::Regex {
                pattern: "foo/bar".into(),
                case_insensitive: true,
            }
        );
    }

    #[test]
    fn negative_numbers_and_fractions() {
        assert_eq!(kinds("-1.5")[0], TokenKind::Number(-1.5));
        assert_eq!(kinds("42")[0], TokenKind::Number(42.0));
    }

    #[test]
    fn unterminated_string_reports_start_offset() {
        let err = Lexer::new("a == \"oops").tokenize().unwrap_err();
        assert_eq!(err.offset, 5);
        assert!(err.message.contains("unterminated string"));
    }

    #[test]
    fn invalid_regex_is_rejected_at_lex_time() {
        let err = Lexer::new("name =~ /(/").tokenize().unwrap_err();
        assert!(err.message.contains("invalid regular expression"));
    }
}
