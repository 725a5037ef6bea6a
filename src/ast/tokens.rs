use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    /// Decimal number with a fraction or exponent
    ///
    /// # Examples
    /// ```text
    /// 3.14
    /// 1e-3
    /// ```
    Float(f64),

    /// Integer literal; the sign is a separate token
    Integer(i64),

    /// Quoted text, single or double quoted
    ///
    /// Serves both as a string literal and as a quoted name, depending on
    /// where it appears.
    ///
    /// # Examples
    /// ```text
    /// 'hello'
    /// "it''s"
    /// select count(user) as 'users'
    /// ```
    String(String),

    /// `true` / `false`, any case
    Boolean(bool),

    /// `null`, any case
    Null,

    /// Parameter reference
    ///
    /// # Examples
    /// ```text
    /// $limit
    /// user.sessions.events.id in $ids
    /// ```
    Parameter(String),

    /// Bare word: a path component, keyword or function name
    ///
    /// Keywords are matched by the parser ignoring case, so `SELECT`,
    /// `select` and `Select` read the same.
    Identifier(String),

    // Punctuation
    Dot,
    Comma,
    Semicolon,
    Colon,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    /// `==`
    EqEq,
    /// `=`, a target name assignment or an equality comparison
    Assign,
    /// `!=` or `<>`
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    /// `&&`
    AndAnd,
    /// `||`
    OrOr,
    /// `!`
    Bang,
    /// `^`, negation of a funnel bracket list
    Caret,
    /// `|`, funnel alternative
    Pipe,
    /// `?`, optional funnel repeat
    Question,

    Eof,
}

impl Token {
    /// True when this is the bare word `word`, ignoring case.
    pub fn is_word(&self, word: &str) -> bool {
        matches!(self, Token::Identifier(w) if w.eq_ignore_ascii_case(word))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Token::Float(v) => return write!(f, "{v}"),
            Token::Integer(v) => return write!(f, "{v}"),
            Token::String(s) => return write!(f, "'{s}'"),
            Token::Boolean(b) => return write!(f, "{b}"),
            Token::Parameter(p) => return write!(f, "${p}"),
            Token::Identifier(w) => return write!(f, "{w}"),
            Token::Null => "null",
            Token::Dot => ".",
            Token::Comma => ",",
            Token::Semicolon => ";",
            Token::Colon => ":",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::EqEq => "==",
            Token::Assign => "=",
            Token::NotEq => "!=",
            Token::Lt => "<",
            Token::LtEq => "<=",
            Token::Gt => ">",
            Token::GtEq => ">=",
            Token::AndAnd => "&&",
            Token::OrOr => "||",
            Token::Bang => "!",
            Token::Caret => "^",
            Token::Pipe => "|",
            Token::Question => "?",
            Token::Eof => "end of input",
        };
        f.write_str(text)
    }
}
