use crate::ast::Token;
use crate::error::{Location, MotifError, Result};

#[derive(Debug, Clone)]
pub struct Lexer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
    token_start: Location,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Lexer {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
            token_start: Location::new(1, 1),
        }
    }

    /// Where the most recently returned token starts.
    pub fn location(&self) -> Location {
        self.token_start
    }

    fn here(&self) -> Location {
        Location::new(self.line, self.column)
    }

    fn current_char(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_char(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.position += 1;
    }

    fn skip_whitespace(&mut self) {
        loop {
            match self.current_char() {
                Some(ch) if ch.is_whitespace() => self.advance(),
                Some('-') if self.peek_char(1) == Some('-') => self.skip_line(),
                Some('/') if self.peek_char(1) == Some('/') => self.skip_line(),
                _ => break,
            }
        }
    }

    fn skip_line(&mut self) {
        while let Some(ch) = self.current_char() {
            if ch == '\n' {
                break;
            }
            self.advance();
        }
    }

    fn read_identifier(&mut self) -> String {
        let mut result = String::new();
        while let Some(ch) = self.current_char() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                result.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        result
    }

    fn read_string(&mut self, quote: char) -> Result<String> {
        let start = self.here();
        let mut result = String::new();
        self.advance(); // opening quote

        while let Some(ch) = self.current_char() {
            match ch {
                c if c == quote => {
                    // a doubled quote is an escaped quote
                    if self.peek_char(1) == Some(quote) {
                        result.push(quote);
                        self.advance();
                        self.advance();
                        continue;
                    }
                    self.advance();
                    return Ok(result);
                }
                '\\' => {
                    self.advance();
                    match self.current_char() {
                        Some('n') => result.push('\n'),
                        Some('t') => result.push('\t'),
                        Some('r') => result.push('\r'),
                        Some('\\') => result.push('\\'),
                        Some(c) if c == '"' || c == '\'' => result.push(c),
                        Some(c) => {
                            return Err(MotifError::parse(
                                self.here(),
                                format!("invalid escape sequence '\\{c}'"),
                            ));
                        }
                        None => break,
                    }
                    self.advance();
                }
                _ => {
                    result.push(ch);
                    self.advance();
                }
            }
        }

        Err(MotifError::parse(start, "unterminated string"))
    }

    fn read_number(&mut self) -> Result<Token> {
        let start = self.here();
        let mut number = String::new();
        let mut is_float = false;

        while let Some(ch) = self.current_char() {
            if ch.is_ascii_digit() {
                number.push(ch);
                self.advance();
            } else if ch == '.'
                && !is_float
                && self.peek_char(1).is_some_and(|c| c.is_ascii_digit())
            {
                is_float = true;
                number.push(ch);
                self.advance();
            } else if (ch == 'e' || ch == 'E')
                && (self.peek_char(1).is_some_and(|c| c.is_ascii_digit())
                    || (matches!(self.peek_char(1), Some('+') | Some('-'))
                        && self.peek_char(2).is_some_and(|c| c.is_ascii_digit())))
            {
                is_float = true;
                number.push(ch);
                self.advance();
                if let Some(sign) = self.current_char().filter(|c| *c == '+' || *c == '-') {
                    number.push(sign);
                    self.advance();
                }
                while let Some(d) = self.current_char().filter(|c| c.is_ascii_digit()) {
                    number.push(d);
                    self.advance();
                }
                break;
            } else {
                break;
            }
        }

        if is_float {
            number
                .parse::<f64>()
                .map(Token::Float)
                .map_err(|_| MotifError::parse(start, format!("invalid number '{number}'")))
        } else {
            number
                .parse::<i64>()
                .map(Token::Integer)
                .map_err(|_| MotifError::parse(start, format!("integer '{number}' is out of range")))
        }
    }

    fn single(&mut self, token: Token) -> Result<Token> {
        self.advance();
        Ok(token)
    }

    fn double(&mut self, token: Token) -> Result<Token> {
        self.advance();
        self.advance();
        Ok(token)
    }

    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace();
        self.token_start = self.here();

        match self.current_char() {
            None => Ok(Token::Eof),
            Some('$') => {
                if self
                    .peek_char(1)
                    .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                {
                    self.advance();
                    Ok(Token::Parameter(self.read_identifier()))
                } else if let Some(quote @ ('\'' | '"')) = self.peek_char(1) {
                    self.advance();
                    Ok(Token::Parameter(self.read_string(quote)?))
                } else {
                    Err(MotifError::parse(self.here(), "expected a parameter name after '$'"))
                }
            }
            Some('.') => self.single(Token::Dot),
            Some(',') => self.single(Token::Comma),
            Some(';') => self.single(Token::Semicolon),
            Some(':') => self.single(Token::Colon),
            Some('(') => self.single(Token::LParen),
            Some(')') => self.single(Token::RParen),
            Some('[') => self.single(Token::LBracket),
            Some(']') => self.single(Token::RBracket),
            Some('{') => self.single(Token::LBrace),
            Some('}') => self.single(Token::RBrace),
            Some('+') => self.single(Token::Plus),
            Some('-') => self.single(Token::Minus),
            Some('*') => self.single(Token::Star),
            Some('/') => self.single(Token::Slash),
            Some('%') => self.single(Token::Percent),
            Some('^') => self.single(Token::Caret),
            Some('?') => self.single(Token::Question),
            Some('=') => {
                if self.peek_char(1) == Some('=') {
                    self.double(Token::EqEq)
                } else {
                    self.single(Token::Assign)
                }
            }
            Some('!') => {
                if self.peek_char(1) == Some('=') {
                    self.double(Token::NotEq)
                } else {
                    self.single(Token::Bang)
                }
            }
            Some('<') => match self.peek_char(1) {
                Some('=') => self.double(Token::LtEq),
                Some('>') => self.double(Token::NotEq),
                _ => self.single(Token::Lt),
            },
            Some('>') => {
                if self.peek_char(1) == Some('=') {
                    self.double(Token::GtEq)
                } else {
                    self.single(Token::Gt)
                }
            }
            Some('&') => {
                if self.peek_char(1) == Some('&') {
                    self.double(Token::AndAnd)
                } else {
                    Err(MotifError::parse(self.here(), "unexpected '&' (did you mean '&&'?)"))
                }
            }
            Some('|') => {
                if self.peek_char(1) == Some('|') {
                    self.double(Token::OrOr)
                } else {
                    self.single(Token::Pipe)
                }
            }
            Some('"') => Ok(Token::String(self.read_string('"')?)),
            Some('\'') => Ok(Token::String(self.read_string('\'')?)),
            Some(ch) if ch.is_ascii_alphabetic() || ch == '_' => {
                let ident = self.read_identifier();
                let token = match ident.to_ascii_lowercase().as_str() {
                    "true" => Token::Boolean(true),
                    "false" => Token::Boolean(false),
                    "null" => Token::Null,
                    _ => Token::Identifier(ident),
                };
                Ok(token)
            }
            Some(ch) if ch.is_ascii_digit() => self.read_number(),
            Some(ch) => Err(MotifError::parse(
                self.here(),
                format!("unexpected character '{ch}'"),
            )),
        }
    }
}

#[test]
fn test_keywords_ignore_case() {
    let mut lexer = Lexer::new("TRUE false Null select");
    assert_eq!(lexer.next_token().unwrap(), Token::Boolean(true));
    assert_eq!(lexer.next_token().unwrap(), Token::Boolean(false));
    assert_eq!(lexer.next_token().unwrap(), Token::Null);
    assert!(lexer.next_token().unwrap().is_word("SELECT"));
}

#[test]
fn test_locations_track_lines() {
    let mut lexer = Lexer::new("select\n  count(user)");
    lexer.next_token().unwrap();
    assert_eq!((lexer.location().line, lexer.location().column), (1, 1));
    lexer.next_token().unwrap();
    assert_eq!((lexer.location().line, lexer.location().column), (2, 3));
}

#[test]
fn test_comments_are_skipped() {
    let mut lexer = Lexer::new("a -- trailing\n// whole line\n- b");
    assert_eq!(lexer.next_token().unwrap(), Token::Identifier("a".into()));
    assert_eq!(lexer.next_token().unwrap(), Token::Minus);
    assert_eq!(lexer.next_token().unwrap(), Token::Identifier("b".into()));
    assert_eq!(lexer.next_token().unwrap(), Token::Eof);
}

#[test]
fn test_strings_and_numbers() {
    let mut lexer = Lexer::new("'it''s' \"a\\tb\" 42 3.5 1e3 $ids <>");
    assert_eq!(lexer.next_token().unwrap(), Token::String("it's".into()));
    assert_eq!(lexer.next_token().unwrap(), Token::String("a\tb".into()));
    assert_eq!(lexer.next_token().unwrap(), Token::Integer(42));
    assert_eq!(lexer.next_token().unwrap(), Token::Float(3.5));
    assert_eq!(lexer.next_token().unwrap(), Token::Float(1000.0));
    assert_eq!(lexer.next_token().unwrap(), Token::Parameter("ids".into()));
    assert_eq!(lexer.next_token().unwrap(), Token::NotEq);
}

#[test]
fn test_unterminated_string_fails() {
    let mut lexer = Lexer::new("'open");
    assert!(lexer.next_token().is_err());
}
