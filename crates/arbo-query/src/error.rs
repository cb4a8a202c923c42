use annotate_snippets::{Level, Renderer, Snippet};

/// A pattern that failed to parse or resolve against the grammar.
///
/// `offset` is the byte position in the query source where the problem was
/// detected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}")]
pub struct QueryError {
    pub offset: usize,
    pub kind: QueryErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryErrorKind {
    #[error("unexpected end of query")]
    UnexpectedEof,
    #[error("unexpected `{0}`")]
    Unexpected(char),
    #[error("unknown node kind `{0}`")]
    UnknownNodeKind(Box<str>),
    #[error("unknown field `{0}`")]
    UnknownField(Box<str>),
    #[error("predicate arguments must be captures or strings")]
    InvalidPredicateArg,
    #[error("alternations expand to too many combinations")]
    TooManyVariants,
}

impl QueryError {
    pub(crate) fn new(offset: usize, kind: QueryErrorKind) -> Self {
        Self { offset, kind }
    }

    /// Renders the error as an annotated excerpt of the query source.
    pub fn render(&self, renderer: &Renderer, origin: &str, source: &str) -> String {
        let title = self.kind.to_string();
        let start = self.offset.min(source.len());
        let end = source[start..]
            .chars()
            .next()
            .map_or(start, |ch| start + ch.len_utf8());

        let message = Level::Error.title(&title).snippet(
            Snippet::source(source)
                .origin(origin)
                .annotation(Level::Error.span(start..end).label("here"))
                .fold(true),
        );

        renderer.render(message).to_string()
    }
}
