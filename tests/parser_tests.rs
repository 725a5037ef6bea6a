// tests/parser_tests.rs

use motif_lang::ast::statements::{MatchOp, MatchRepeat};
use motif_lang::ast::{
    AggregationOp, BoolOp, BoundsOp, CompareOp, Constant, EditAction, Expr, FilterRule, FunnelType,
    MatchDefinition, MembershipOp, NullTestOp, Source, Statement, ValueOp,
};
use motif_lang::parser::Parser;
use motif_lang::MotifError;

fn parse(text: &str) -> Expr {
    let mut parser = Parser::new(text).unwrap();
    let expr = parser.parse_expression().unwrap();
    parser.finish().unwrap();
    expr
}

fn parse_error(text: &str) -> String {
    let result = Parser::new(text).and_then(|mut parser| {
        parser.parse_expression()?;
        parser.finish()
    });
    match result {
        Err(MotifError::Parse { message, .. }) => message,
        other => panic!("Expected a parse error, got {:?}", other),
    }
}

// ============================================================================
// Simple tests
// ============================================================================

#[test]
fn test_comparison() {
    let expr = parse("user.flurryId > 100");

    assert!(matches!(
        expr,
        Expr::Comparison(ref c) if c.op == CompareOp::Gt
    ));
}

#[test]
fn test_single_equals_compares() {
    assert!(matches!(parse("user.id = 'a'"), Expr::Comparison(ref c) if c.op == CompareOp::Eq));
    assert!(matches!(parse("user.id <> 'a'"), Expr::Comparison(ref c) if c.op == CompareOp::Neq));
}

#[test]
fn test_parentheses() {
    let expr = parse("(1 + 2) * 3");

    // Should be: Multiply(Plus(1, 2), 3)
    match expr {
        Expr::BinaryValue(mul) => {
            assert_eq!(mul.op, ValueOp::Multiply);
            match *mul.left {
                Expr::BinaryValue(ref add) => assert_eq!(add.op, ValueOp::Plus),
                _ => panic!("Expected addition in left"),
            }
            assert_eq!(mul.right.as_constant(), Some(&Constant::Byte(3)));
        }
        _ => panic!("Expected multiplication"),
    }
}

#[test]
fn test_arithmetic_precedence() {
    let expr = parse("a.b + a.c % 7");
    let Expr::BinaryValue(add) = expr else {
        panic!("Expected addition");
    };
    assert_eq!(add.op, ValueOp::Plus);
    assert!(matches!(*add.right, Expr::BinaryValue(ref m) if m.op == ValueOp::Modulo));
}

#[test]
fn test_subtraction_is_left_associative() {
    let Expr::BinaryValue(outer) = parse("10 - 4 - 3") else {
        panic!("Expected subtraction");
    };
    assert!(matches!(*outer.left, Expr::BinaryValue(ref inner) if inner.op == ValueOp::Minus));
    assert_eq!(outer.right.as_constant(), Some(&Constant::Byte(3)));
}

// ============================================================================
// Literals
// ============================================================================

#[test]
fn test_integer_literals_take_the_narrowest_type() {
    let test_cases = vec![
        ("7", Constant::Byte(7)),
        ("300", Constant::Short(300)),
        ("70000", Constant::Integer(70000)),
        ("604800000", Constant::Integer(604_800_000)),
        ("6048000000", Constant::Long(6_048_000_000)),
        ("-129", Constant::Short(-129)),
    ];

    for (input, expected) in test_cases {
        assert_eq!(parse(input).as_constant(), Some(&expected), "Failed for input: {}", input);
    }
}

#[test]
fn test_other_literals() {
    assert_eq!(parse("2.5").as_constant(), Some(&Constant::Double(2.5)));
    assert_eq!(parse("-0.5").as_constant(), Some(&Constant::Double(-0.5)));
    assert_eq!(parse("'pro'").as_constant(), Some(&Constant::String("pro".into())));
    assert_eq!(parse("TRUE").as_constant(), Some(&Constant::Boolean(true)));
    assert_eq!(parse("null").as_constant(), Some(&Constant::Null));
}

#[test]
fn test_parameter_reference() {
    let Expr::Parameter(p) = parse("$threshold") else {
        panic!("Expected a parameter");
    };
    assert_eq!(p.name, "threshold");
    assert!(p.definition.is_none());
}

// ============================================================================
// Boolean operators
// ============================================================================

#[test]
fn test_word_and_symbol_operators_match() {
    assert_eq!(
        parse("a.b > 1 and a.c < 2 or not a.d == 3"),
        parse("a.b > 1 && a.c < 2 || !a.d == 3")
    );
}

#[test]
fn test_and_binds_tighter_than_or() {
    let Expr::BinaryBoolean(or) = parse("a.b == 1 OR a.c == 2 AND a.d == 3") else {
        panic!("Expected OR");
    };
    assert_eq!(or.op, BoolOp::Or);
    assert!(matches!(*or.left, Expr::Comparison(_)));
    assert!(matches!(*or.right, Expr::BinaryBoolean(ref and) if and.op == BoolOp::And));
}

#[test]
fn test_not_wraps_a_comparison() {
    let Expr::Not(not) = parse("not a.b > 1") else {
        panic!("Expected NOT");
    };
    assert!(matches!(*not.expr, Expr::Comparison(_)));
}

#[test]
fn test_values_in_boolean_position_are_wrapped() {
    let Expr::BinaryBoolean(and) = parse("f.paths.isComplete and a.b > 1") else {
        panic!("Expected AND");
    };
    assert!(matches!(*and.left, Expr::BooleanValue(_)));
}

// ============================================================================
// Tests: IN, IS NULL, BETWEEN
// ============================================================================

#[test]
fn test_explicit_membership() {
    let Expr::ExplicitMembership(m) = parse("a.b in (1, 2, a.c)") else {
        panic!("Expected membership");
    };
    assert_eq!(m.op, MembershipOp::In);
    assert_eq!(m.members.len(), 3);
}

#[test]
fn test_not_in_vector() {
    let Expr::VectorMembership(m) = parse("a.b not in $ids") else {
        panic!("Expected vector membership");
    };
    assert_eq!(m.op, MembershipOp::NotIn);
    assert!(matches!(*m.vector, Expr::Parameter(_)));
}

#[test]
fn test_null_tests() {
    assert!(matches!(parse("a.b is null"), Expr::NullTest(ref n) if n.op == NullTestOp::IsNull));
    assert!(matches!(parse("a.b IS NOT NULL"), Expr::NullTest(ref n) if n.op == NullTestOp::IsNotNull));
}

#[test]
fn test_between_consumes_its_and() {
    let Expr::BinaryBoolean(and) = parse("x.y not between 1 and 5 and x.z == 2") else {
        panic!("Expected AND");
    };
    assert!(matches!(*and.left, Expr::Bounds(ref b) if b.op == BoundsOp::NotBetween));
}

#[test]
fn test_not_without_in_or_between_is_left_over() {
    let message = parse_error("a.b not 5");
    assert!(message.contains("end of input"));
}

// ============================================================================
// Keyword constructs
// ============================================================================

#[test]
fn test_aggregation_clauses() {
    let Expr::Aggregation(agg) = parse("sum(a.b.c) scope a.b rolling 3 where a.b.d == 1") else {
        panic!("Expected an aggregation");
    };
    assert_eq!(agg.op, AggregationOp::Sum);
    assert!(agg.scope.is_some());
    assert!(agg.quanta.is_some());
    assert!(agg.filter.is_some());
}

#[test]
fn test_top_takes_a_size() {
    assert!(matches!(parse("top[3](a.b)"), Expr::Aggregation(ref a) if a.size == Some(3)));
    assert!(parse_error("top[-1](a.b)").contains("top size"));
}

#[test]
fn test_now_is_a_keyword_unless_called() {
    assert!(matches!(parse("NOW"), Expr::Now(_)));
    assert!(matches!(parse("now.later"), Expr::Path(_)));
}

#[test]
fn test_quantum_timezones() {
    let Expr::Quantum(named) = parse("week(a.t, 'Europe/Paris')") else {
        panic!("Expected a quantum");
    };
    assert_eq!(named.timezone.as_deref(), Some("Europe/Paris"));

    let Expr::Quantum(offset) = parse("hour(a.t, 5)") else {
        panic!("Expected a quantum");
    };
    assert_eq!(offset.timezone.as_deref(), Some("+05:00"));

    let Expr::Quantum(none) = parse("month(a.t)") else {
        panic!("Expected a quantum");
    };
    assert!(none.timezone.is_none());
}

#[test]
fn test_unknown_calls_are_functions() {
    let Expr::Function(call) = parse("split(a.b, 0, 10, 20)") else {
        panic!("Expected a function");
    };
    assert_eq!(call.name, "split");
    assert_eq!(call.args.len(), 4);
    assert!(call.function.is_none());
}

#[test]
fn test_cast_needs_a_value_type() {
    assert!(matches!(parse("CAST(a.b AS string)"), Expr::Cast(_)));
    assert!(parse_error("CAST(a.b AS thing)").contains("unknown value type"));
}

#[test]
fn test_map_key_on_a_path() {
    let Expr::Path(path) = parse("a.params['campaign']") else {
        panic!("Expected a path");
    };
    assert_eq!(path.full_path(), "a.params");
    assert!(path.key.is_some());
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_missing_operand() {
    let message = parse_error("a.b >");
    assert!(message.contains("expected an expression"));
}

#[test]
fn test_trailing_tokens() {
    let message = parse_error("a.b > 1 )");
    assert!(message.contains("end of input"));
}

#[test]
fn test_error_location() {
    let result = Parser::new("a.b >\n  ]").and_then(|mut parser| parser.parse_expression());
    let Err(MotifError::Parse { location, .. }) = result else {
        panic!("Expected a parse error");
    };
    assert_eq!((location.line, location.column), (2, 3));
}

#[test]
fn test_depth_limit() {
    let text = format!("{}a.b", "not ".repeat(30));
    let mut parser = Parser::new(&text).unwrap().with_max_depth(10);
    assert!(parser.parse_expression().is_err());
}

// ============================================================================
// Views
// ============================================================================

#[test]
fn test_view_rules() {
    let mut parser = Parser::new(
        "view 'v' {
            include user where user.a > 1;
            exclude user.sessions
            presample(0.5) user.sessions where user.sessions.id > 0
            postsample(100)
        }",
    )
    .unwrap();
    let view = parser.parse_view().unwrap();
    assert_eq!(view.name, "v");
    assert_eq!(view.rules.len(), 4);
    assert!(matches!(&view.rules[0], FilterRule::Edit(r) if r.action == EditAction::Include));
    let FilterRule::Edit(exclude) = &view.rules[1] else {
        panic!("Expected an edit rule");
    };
    assert_eq!(exclude.predicate.as_constant(), Some(&Constant::Boolean(true)));
    assert!(matches!(&view.rules[2], FilterRule::Presample(s) if s.target.is_some()));
    assert!(matches!(&view.rules[3], FilterRule::Postsample(s) if s.target.is_none()));
}

#[test]
fn test_view_needs_a_name() {
    let result = Parser::new("view '' { include user }").and_then(|mut parser| parser.parse_view());
    assert!(matches!(result, Err(MotifError::Parse { message, .. }) if message == "View requires a complete name"));
}

// ============================================================================
// Statements
// ============================================================================

#[test]
fn test_query_clauses() {
    let mut parser = Parser::new(
        "select (n: long) a = count(user), user.id as 'id' \
         from schema quo as q where user.a > $n limit 10",
    )
    .unwrap();
    let query = parser.parse_query().unwrap();
    assert_eq!(query.parameters[0].name, "n");
    assert_eq!(query.selects[0].targets[0].name, "a");
    assert_eq!(query.selects[0].targets[1].name, "id");
    assert!(matches!(&query.sources[0], Source::Schema(s) if s.alias.as_deref() == Some("q")));
    assert!(query.filter.is_some());
    assert_eq!(query.limit, Some(10));
}

#[test]
fn test_beside_after_the_query_clauses() {
    let mut parser = Parser::new("select count(user) from schema quo beside select count(user.sessions)").unwrap();
    let query = parser.parse_query().unwrap();
    assert_eq!(query.selects.len(), 2);
    assert_eq!(query.selects[1].name, "query_2");
}

#[test]
fn test_only_the_first_select_takes_parameters() {
    let result = Parser::new("select count(user) beside select (n: long) count(user) from schema quo")
        .and_then(|mut parser| parser.parse_query());
    assert!(matches!(result, Err(MotifError::Parse { message, .. }) if message.contains("only the first select")));
}

#[test]
fn test_statement_list() {
    let mut parser = Parser::new(
        ";; segment s { segment 1 when user.a > 1 } from schema quo;
         funnel f transaction within DAYS(1) limit 3 { step 1 when user.b.c == 1 1+ } from schema quo;
         select count(user) from schema quo, funnel f, segment s(1, 2) as x;",
    )
    .unwrap();
    let statements = parser.parse_statements().unwrap();
    assert_eq!(statements.statements.len(), 3);

    let Statement::Funnel(funnel) = &statements.statements[1] else {
        panic!("Expected a funnel");
    };
    assert_eq!(funnel.funnel_type, FunnelType::Transaction);
    assert_eq!(funnel.limit, Some(3));
    assert!(funnel.within.is_some());
    assert!(matches!(&funnel.definition, MatchDefinition::Repeat(MatchRepeat { min: 1, max: None, .. })));

    let Statement::Query(query) = &statements.statements[2] else {
        panic!("Expected a query");
    };
    assert!(matches!(&query.sources[2], Source::Segment(s) if s.args.len() == 2));
}

#[test]
fn test_step_clauses() {
    let mut parser = Parser::new(
        "funnel f { step 1 when a.b.c == 1 timing on a.b.t after MINUTES(5) within HOURS(1) 1 } from schema quo",
    )
    .unwrap();
    let statements = parser.parse_statements().unwrap();
    let Statement::Funnel(funnel) = &statements.statements[0] else {
        panic!("Expected a funnel");
    };
    let step = &funnel.steps[0];
    assert_eq!(step.id, 1);
    assert!(step.timing.is_some());
    assert!(step.after.is_some());
    assert!(step.within.is_some());
}

#[test]
fn test_match_alternatives() {
    let mut parser = Parser::new(
        "funnel f { step 1 when a.b == 1 step 2 when a.b == 2 1 : 2 | 2 : 1 } from schema quo",
    )
    .unwrap();
    let statements = parser.parse_statements().unwrap();
    let Statement::Funnel(funnel) = &statements.statements[0] else {
        panic!("Expected a funnel");
    };
    let MatchDefinition::List(list) = &funnel.definition else {
        panic!("Expected a list");
    };
    assert_eq!(list.op, MatchOp::Or);
    assert_eq!(list.items.len(), 2);
}

#[test]
fn test_unknown_statement() {
    let result = Parser::new("delete user").and_then(|mut parser| parser.parse_statements());
    assert!(matches!(result, Err(MotifError::Parse { message, .. }) if message.contains("'SELECT', 'FUNNEL' or 'SEGMENT'")));
}
