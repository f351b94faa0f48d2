use std::fmt;

/// A lexed token with its byte offset in the rule text.
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: usize,
    /// The exact source slice the token was scanned from.
    pub text: String,
}

impl Token {
    #[must_use]
    pub fn new(kind: TokenKind, pos: usize, text: impl Into<String>) -> Self {
        Self {
            kind,
            pos,
            text: text.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    /// Bare identifier such as `host` or `cpu_total`.
    Ident(String),
    /// Quoted string, escapes already decoded.
    String(String),
    /// Backtick-delimited string, kept verbatim.
    RawString(String),
    /// Numeric literal text, interpreted by the parser.
    Number(String),
    /// Duration literal such as `5m` or `3m47s`.
    Duration(String),

    // Keywords used by the filter grammar
    And,
    Or,
    In,
    NotIn,
    Re,
    True,
    False,
    Nil,
    /// Keyword of the wider query language that filters never use.
    Reserved(String),

    // Comparison operators
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,

    // Arithmetic
    Plus,
    Minus,
    Mul,
    Div,
    Mod,
    Pow,

    // Punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Colon,
    Dot,

    /// `#` line comment, text after the marker.
    Comment(String),
    Error(String),
    Eof,
}

impl TokenKind {
    /// Maps a word to its keyword kind. Keywords are case-insensitive.
    #[must_use]
    pub fn keyword(word: &str) -> Option<TokenKind> {
        let lower = word.to_ascii_lowercase();
        let kind = match lower.as_str() {
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "in" => TokenKind::In,
            "notin" => TokenKind::NotIn,
            "re" => TokenKind::Re,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "nil" | "null" => TokenKind::Nil,
            "as" | "asc" | "auto" | "by" | "desc" | "filter" | "identifier" | "limit" | "link"
            | "offset" | "with" | "order" | "int" | "float" | "slimit" | "soffset" | "tz" => {
                TokenKind::Reserved(lower)
            }
            _ => return None,
        };
        Some(kind)
    }

    #[must_use]
    pub fn is_trivia(&self) -> bool {
        matches!(self, TokenKind::Comment(_))
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident(s) => write!(f, "identifier `{s}`"),
            TokenKind::String(_) => write!(f, "string"),
            TokenKind::RawString(_) => write!(f, "raw string"),
            TokenKind::Number(n) => write!(f, "number {n}"),
            TokenKind::Duration(d) => write!(f, "duration {d}"),
            TokenKind::And => write!(f, "`and`"),
            TokenKind::Or => write!(f, "`or`"),
            TokenKind::In => write!(f, "`in`"),
            TokenKind::NotIn => write!(f, "`notin`"),
            TokenKind::Re => write!(f, "`re`"),
            TokenKind::True => write!(f, "`true`"),
            TokenKind::False => write!(f, "`false`"),
            TokenKind::Nil => write!(f, "`nil`"),
            TokenKind::Reserved(k) => write!(f, "reserved keyword `{k}`"),
            TokenKind::Eq => write!(f, "`=`"),
            TokenKind::Neq => write!(f, "`!=`"),
            TokenKind::Lt => write!(f, "`<`"),
            TokenKind::Lte => write!(f, "`<=`"),
            TokenKind::Gt => write!(f, "`>`"),
            TokenKind::Gte => write!(f, "`>=`"),
            TokenKind::Plus => write!(f, "`+`"),
            TokenKind::Minus => write!(f, "`-`"),
            TokenKind::Mul => write!(f, "`*`"),
            TokenKind::Div => write!(f, "`/`"),
            TokenKind::Mod => write!(f, "`%`"),
            TokenKind::Pow => write!(f, "`^`"),
            TokenKind::LParen => write!(f, "`(`"),
            TokenKind::RParen => write!(f, "`)`"),
            TokenKind::LBrace => write!(f, "`{{`"),
            TokenKind::RBrace => write!(f, "`}}`"),
            TokenKind::LBracket => write!(f, "`[`"),
            TokenKind::RBracket => write!(f, "`]`"),
            TokenKind::Comma => write!(f, "`,`"),
            TokenKind::Semicolon => write!(f, "`;`"),
            TokenKind::Colon => write!(f, "`:`"),
            TokenKind::Dot => write!(f, "`.`"),
            TokenKind::Comment(_) => write!(f, "comment"),
            TokenKind::Error(msg) => write!(f, "error: {msg}"),
            TokenKind::Eof => write!(f, "end of input"),
        }
    }
}
