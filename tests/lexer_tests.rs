// tests/lexer_tests.rs

use motif_lang::ast::Token;
use motif_lang::lexer::Lexer;
use motif_lang::MotifError;

fn tokens(input: &str) -> Vec<Token> {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token().unwrap();
        if token == Token::Eof {
            break;
        }
        tokens.push(token);
    }
    tokens
}

// ============================================================================
// Single Character Tokens
// ============================================================================

#[test]
fn test_single_char_tokens() {
    let test_cases = vec![
        (".", Token::Dot),
        (",", Token::Comma),
        (";", Token::Semicolon),
        (":", Token::Colon),
        ("(", Token::LParen),
        (")", Token::RParen),
        ("[", Token::LBracket),
        ("]", Token::RBracket),
        ("{", Token::LBrace),
        ("}", Token::RBrace),
        ("+", Token::Plus),
        ("-", Token::Minus),
        ("*", Token::Star),
        ("/", Token::Slash),
        ("%", Token::Percent),
        ("=", Token::Assign),
        ("<", Token::Lt),
        (">", Token::Gt),
        ("!", Token::Bang),
        ("^", Token::Caret),
        ("|", Token::Pipe),
        ("?", Token::Question),
    ];

    for (input, expected) in test_cases {
        let mut lexer = Lexer::new(input);
        let token = lexer.next_token().unwrap();
        assert_eq!(token, expected, "Failed for input: {}", input);
        assert_eq!(lexer.next_token().unwrap(), Token::Eof);
    }
}

// ============================================================================
// Two Character Tokens
// ============================================================================

#[test]
fn test_two_char_tokens() {
    let test_cases = vec![
        ("==", Token::EqEq),
        ("!=", Token::NotEq),
        ("<>", Token::NotEq),
        ("<=", Token::LtEq),
        (">=", Token::GtEq),
        ("&&", Token::AndAnd),
        ("||", Token::OrOr),
    ];

    for (input, expected) in test_cases {
        let mut lexer = Lexer::new(input);
        let token = lexer.next_token().unwrap();
        assert_eq!(token, expected, "Failed for input: {}", input);
        assert_eq!(lexer.next_token().unwrap(), Token::Eof);
    }
}

#[test]
fn test_lone_ampersand_fails() {
    let mut lexer = Lexer::new("a & b");
    lexer.next_token().unwrap();
    assert!(matches!(lexer.next_token(), Err(MotifError::Parse { .. })));
}

// ============================================================================
// Literals
// ============================================================================

#[test]
fn test_numbers() {
    let test_cases = vec![
        ("0", Token::Integer(0)),
        ("604800000", Token::Integer(604_800_000)),
        ("0.25", Token::Float(0.25)),
        ("2.5e2", Token::Float(250.0)),
        ("1E-2", Token::Float(0.01)),
    ];

    for (input, expected) in test_cases {
        assert_eq!(tokens(input), vec![expected], "Failed for input: {}", input);
    }
}

#[test]
fn test_negative_numbers_are_two_tokens() {
    assert_eq!(tokens("-5"), vec![Token::Minus, Token::Integer(5)]);
}

#[test]
fn test_integer_out_of_range() {
    let mut lexer = Lexer::new("99999999999999999999");
    let Err(MotifError::Parse { message, .. }) = lexer.next_token() else {
        panic!("Expected a parse error");
    };
    assert!(message.contains("out of range"));
}

#[test]
fn test_trailing_dot_is_a_path_separator() {
    // `1.` followed by a name is not a float
    assert_eq!(
        tokens("1.key"),
        vec![Token::Integer(1), Token::Dot, Token::Identifier("key".into())]
    );
}

#[test]
fn test_strings() {
    let test_cases = vec![
        ("'hello'", "hello"),
        ("\"hello\"", "hello"),
        ("'it''s'", "it's"),
        ("\"say \"\"hi\"\"\"", "say \"hi\""),
        ("'tab\\there'", "tab\there"),
        ("'quote\\''", "quote'"),
        ("''", ""),
    ];

    for (input, expected) in test_cases {
        assert_eq!(tokens(input), vec![Token::String(expected.into())], "Failed for input: {}", input);
    }
}

#[test]
fn test_bad_escape_fails() {
    let mut lexer = Lexer::new("'\\q'");
    let Err(MotifError::Parse { message, .. }) = lexer.next_token() else {
        panic!("Expected a parse error");
    };
    assert!(message.contains("invalid escape sequence"));
}

#[test]
fn test_booleans_and_null() {
    assert_eq!(
        tokens("true FALSE Null"),
        vec![Token::Boolean(true), Token::Boolean(false), Token::Null]
    );
}

// ============================================================================
// Names and parameters
// ============================================================================

#[test]
fn test_identifiers_keep_their_case() {
    assert_eq!(
        tokens("Select flurry_id"),
        vec![Token::Identifier("Select".into()), Token::Identifier("flurry_id".into())]
    );
}

#[test]
fn test_parameters() {
    assert_eq!(tokens("$ids"), vec![Token::Parameter("ids".into())]);
    assert_eq!(tokens("$'odd name'"), vec![Token::Parameter("odd name".into())]);
}

#[test]
fn test_dollar_without_a_name_fails() {
    let mut lexer = Lexer::new("$ 5");
    assert!(lexer.next_token().is_err());
}

#[test]
fn test_unexpected_character() {
    let mut lexer = Lexer::new("user @ 5");
    lexer.next_token().unwrap();
    let Err(MotifError::Parse { location, message }) = lexer.next_token() else {
        panic!("Expected a parse error");
    };
    assert_eq!(message, "unexpected character '@'");
    assert_eq!(location.column, 6);
}

// ============================================================================
// Whole inputs
// ============================================================================

#[test]
fn test_path_expression() {
    assert_eq!(
        tokens("user.parameters['plan'] == 'pro'"),
        vec![
            Token::Identifier("user".into()),
            Token::Dot,
            Token::Identifier("parameters".into()),
            Token::LBracket,
            Token::String("plan".into()),
            Token::RBracket,
            Token::EqEq,
            Token::String("pro".into()),
        ]
    );
}

#[test]
fn test_funnel_match_definition() {
    assert_eq!(
        tokens("1 : {[^2 3]*} : (2 | 3)[1:4] : 3?"),
        vec![
            Token::Integer(1),
            Token::Colon,
            Token::LBrace,
            Token::LBracket,
            Token::Caret,
            Token::Integer(2),
            Token::Integer(3),
            Token::RBracket,
            Token::Star,
            Token::RBrace,
            Token::Colon,
            Token::LParen,
            Token::Integer(2),
            Token::Pipe,
            Token::Integer(3),
            Token::RParen,
            Token::LBracket,
            Token::Integer(1),
            Token::Colon,
            Token::Integer(4),
            Token::RBracket,
            Token::Colon,
            Token::Integer(3),
            Token::Question,
        ]
    );
}

#[test]
fn test_comments_run_to_end_of_line() {
    let input = "select count(user) -- how many\n// from here\nfrom schema quo";
    let words: Vec<Token> = tokens(input)
        .into_iter()
        .filter(|t| matches!(t, Token::Identifier(_)))
        .collect();
    assert_eq!(words.len(), 6);
}

#[test]
fn test_locations_after_newlines() {
    let mut lexer = Lexer::new("view v {\n    include user\n}");
    for _ in 0..3 {
        lexer.next_token().unwrap();
    }
    let token = lexer.next_token().unwrap();
    assert!(token.is_word("include"));
    assert_eq!((lexer.location().line, lexer.location().column), (2, 5));
}
