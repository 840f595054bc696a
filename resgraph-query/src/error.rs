//! Error and result types for the query crate.

pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline stage an [`Error`] originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Tokenization failed (unexpected character, unterminated string/regex).
    Lex,
    /// The token stream is structurally invalid.
    Parse,
    /// The evaluator hit an internal invariant violation.
    ///
    /// Reserved: the AST is a closed enum matched exhaustively, so this does
    /// not surface from queries produced by this crate's parser.
    Evaluation,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Lex => write!(f, "syntax error"),
            ErrorKind::Parse => write!(f, "parse error"),
            ErrorKind::Evaluation => write!(f, "evaluation error"),
        }
    }
}

/// A positioned query error.
///
/// Carries the original query source and the character offset of the
/// offending position so callers can render a pointer under it, see
/// [`Error::annotate`].
#[derive(Debug, Clone, PartialEq)]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    pub offset: usize,
    pub source: String,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} at offset {}", self.kind, self.message, self.offset)
    }
}

impl std::error::Error for Error {}

impl Error {
    pub fn lex(message: impl Into<String>, offset: usize, source: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Lex,
            message: message.into(),
            offset,
            source: source.into(),
        }
    }

    pub fn parse(message: impl Into<String>, offset: usize, source: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Parse,
            message: message.into(),
            offset,
            source: source.into(),
        }
    }

    pub fn evaluation(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Evaluation,
            message: message.into(),
            offset: 0,
            source: String::new(),
        }
    }

    /// Renders the source with a `^` pointer under the offending character.
    ///
    /// ```text
    /// kind == == "x"
    ///         ^
    /// ```
    pub fn annotate(&self) -> String {
        let mut out = String::with_capacity(self.source.len() + self.offset + 2);
        out.push_str(&self.source);
        out.push('\n');
        for _ in 0..self.offset {
            out.push(' ');
        }
        out.push('^');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotate_points_at_offset() {
        let err = Error::parse("unexpected token", 5, "a == ==");
        assert_eq!(err.annotate(), "a == ==\n     ^");
        assert_eq!(err.to_string(), "parse error: unexpected token at offset 5");
    }

    #[test]
    fn error_is_a_std_error_and_keeps_the_query_source() {
        let err = Error::lex("unexpected character '%'", 2, "a %");
        assert_eq!(err.source, "a %");

        // Callers hand these up as ordinary boxed errors.
        let boxed: Box<dyn std::error::Error> = Box::new(err);
        assert_eq!(
            boxed.to_string(),
            "syntax error: unexpected character '%' at offset 2"
        );
    }
}
