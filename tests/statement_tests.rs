// tests/statement_tests.rs

use motif_lang::ast::{Expr, Funnel, FunnelType, Segment, Source};
use motif_lang::{JsonNode, Motif, MotifError, Query, Statement, Statements};

const QUO: &str = include_str!("fixtures/quo.motif");

const PURCHASES: &str = "funnel purchases within DAYS(7) {
    step 1 when user.sessions.events.eventId == 10
    step 2 when user.sessions.events.eventId == 20 within HOURS(2)
    1 : 2
} from schema quo";

fn motif() -> Motif {
    let motif = Motif::new();
    let schema = motif.parse_schema(QUO).unwrap();
    motif.register_schema(schema);
    motif
}

fn statements(source: &str) -> Statements {
    motif().parse_motif_statements(source).unwrap()
}

fn statements_error(source: &str) -> String {
    match motif().parse_motif_statements(source) {
        Err(MotifError::Parse { message, .. }) => message,
        other => panic!("Expected a parse error, got {:?}", other),
    }
}

fn query(source: &str) -> Query {
    motif().parse_motif_query(source).unwrap()
}

fn funnel(statements: &Statements, index: usize) -> &Funnel {
    match &statements.statements[index] {
        Statement::Funnel(f) => f,
        other => panic!("Expected a funnel, got {:?}", other),
    }
}

fn segment(statements: &Statements, index: usize) -> &Segment {
    match &statements.statements[index] {
        Statement::Segment(s) => s,
        other => panic!("Expected a segment, got {:?}", other),
    }
}

// ============================================================================
// Queries
// ============================================================================

#[test]
fn test_simple_query() {
    let query = query("select count(user) as users from schema quo where user.flurryId > 10 limit 5");
    assert_eq!(query.selects.len(), 1);
    assert_eq!(query.selects[0].name, "query_1");
    assert_eq!(query.selects[0].targets[0].name, "users");
    assert_eq!(query.limit, Some(5));
    assert!(matches!(query.filter, Some(Expr::Comparison(_))));
}

#[test]
fn test_unnamed_targets_are_numbered() {
    let query = query("select user.flurryId, sessions = count(user.sessions), max(user.sessions.startTime) from schema quo");
    let names: Vec<&str> = query.selects[0].targets.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["target_1", "sessions", "target_3"]);
}

#[test]
fn test_beside_selects_are_numbered() {
    let query = query("select count(user) beside select count(user.sessions) where user.sessions.id > 2 from schema quo");
    assert_eq!(query.selects.len(), 2);
    assert_eq!(query.selects[1].name, "query_2");
    assert!(query.selects[1].filter.is_some());
}

#[test]
fn test_select_where_is_not_taken_by_an_aggregation() {
    let query = query("select count(user.sessions) where user.flurryId > 1 from schema quo");
    assert!(query.selects[0].filter.is_some());
    let Expr::Aggregation(count) = &query.selects[0].targets[0].expr else {
        panic!("Expected an aggregation");
    };
    assert!(count.filter.is_none());
}

#[test]
fn test_frequency_in_a_target() {
    let query = query("select frequency(user.sessions, user.flurryId) as f from schema quo");
    assert!(matches!(query.selects[0].targets[0].expr, Expr::Function(_)));
}

#[test]
fn test_parameters_bind_in_the_query() {
    let query = query(
        "select (threshold: long, ids: vector[long]) count(user) from schema quo \
         where user.flurryId > $threshold and user.sessions.events.eventId in $ids",
    );
    assert_eq!(query.parameters.len(), 2);
    assert!(query.parameters[1].vector);
    assert!(matches!(query.filter, Some(Expr::BinaryBoolean(_))));
}

#[test]
fn test_parameters_do_not_leak_between_statements() {
    let message = statements_error(
        "select (t: long) count(user) from schema quo where user.flurryId > $t;
         select count(user) from schema quo where user.flurryId > $t",
    );
    assert!(message.contains("'t'"));
}

#[test]
fn test_query_needs_one_schema() {
    let message = statements_error("select count(user) from schema quo, schema quo as other");
    assert_eq!(message, "query must have one schema source");
}

#[test]
fn test_unknown_schema() {
    let message = statements_error("select count(user) from schema nope");
    assert_eq!(message, "schema 'nope' is not defined");
}

#[test]
fn test_schema_names_ignore_case() {
    assert!(motif().parse_motif_query("select count(user) from schema QUO").is_ok());
}

#[test]
fn test_limit_must_be_positive() {
    let message = statements_error("select count(user) from schema quo limit 0");
    assert_eq!(message, "limit '0' is not a positive integer");
}

#[test]
fn test_query_where_must_be_boolean() {
    let message = statements_error("select count(user) from schema quo where user.flurryId + 1");
    assert!(message.contains("must be a boolean"));
}

#[test]
fn test_alias_clash() {
    let message = statements_error(
        "segment s { segment 1 when user.flurryId > 1 } from schema quo;
         select count(user) from schema quo, segment s as quo",
    );
    assert!(message.contains("is already defined"));
}

#[test]
fn test_single_query_rejects_trailing_input() {
    let result = motif().parse_motif_query("select count(user) from schema quo; select");
    assert!(matches!(result, Err(MotifError::Parse { .. })));
}

// ============================================================================
// Segments
// ============================================================================

#[test]
fn test_segment_as_a_source() {
    let statements = statements(
        "segment active {
            segment 1 when count(user.sessions) > 10
            segment 2 when user.flurryId > 0
         } from schema quo;
         select count(user) from schema quo, segment active as a where a.members.id == 1",
    );
    let active = segment(&statements, 0);
    assert_eq!(active.definitions.len(), 2);
    assert_eq!(active.definitions[1].id, "2");
    let Statement::Query(query) = &statements.statements[1] else {
        panic!("Expected a query");
    };
    assert!(matches!(&query.sources[1], Source::Segment(s) if s.alias.as_deref() == Some("a")));
}

#[test]
fn test_duplicate_segment_ids() {
    let message = statements_error(
        "segment s { segment 1 when user.flurryId > 1 segment 1 when user.flurryId > 2 } from schema quo",
    );
    assert_eq!(message, "segment identifier '1' is defined more than once");
}

#[test]
fn test_segment_ids_are_longs() {
    let message = statements_error("segment s { segment heavy when user.flurryId > 1 } from schema quo");
    assert_eq!(message, "segment identifier 'heavy' must be a long");
}

#[test]
fn test_unknown_segment_source() {
    let message = statements_error("select count(user) from schema quo, segment missing");
    assert_eq!(message, "segment missing not found");
}

#[test]
fn test_segment_arguments_are_checked() {
    let defined = "segment s (min: long) { segment 1 when user.flurryId > $min } from schema quo;";

    assert!(motif()
        .parse_motif_statements(&format!("{defined} select count(user) from schema quo, segment s(5)"))
        .is_ok());

    let message = statements_error(&format!("{defined} select count(user) from schema quo, segment s"));
    assert_eq!(message, "argument count mismatch to segment s");

    let message = statements_error(&format!("{defined} select count(user) from schema quo, segment s('five')"));
    assert!(message.contains("is not compatible with parameter min"));
}

// ============================================================================
// Funnels
// ============================================================================

#[test]
fn test_funnel_timing_is_inferred() {
    let statements = statements(PURCHASES);
    let purchases = funnel(&statements, 0);
    assert_eq!(purchases.funnel_type, FunnelType::Conversion);
    assert_eq!(purchases.steps.len(), 2);
    let timing = purchases.steps[0].timing.as_ref().unwrap();
    assert_eq!(timing.motif(), "user.sessions.events.startTime");
    assert!(purchases.within.as_ref().unwrap().can_reduce_to_constant());
}

#[test]
fn test_funnel_as_a_source() {
    let text = format!(
        "{PURCHASES};
         select lastPathIsComplete(purchases) as done, count(purchases.paths.steps) as steps
         from schema quo, funnel purchases"
    );
    let statements = statements(&text);
    assert_eq!(statements.statements.len(), 2);
}

#[test]
fn test_funnels_are_only_visible_after_their_definition() {
    let text = format!("select count(user) from schema quo, funnel purchases; {PURCHASES}");
    assert_eq!(statements_error(&text), "funnel purchases not found");
}

#[test]
fn test_funnel_paths_are_validated() {
    let text = format!("{PURCHASES}; select count(purchases.paths.nope) from schema quo, funnel purchases");
    assert!(statements_error(&text).contains("Invalid field 'nope'"));
}

#[test]
fn test_undefined_match_step() {
    let message = statements_error(
        "funnel f { step 1 when user.sessions.id > 1 1 : 3 } from schema quo",
    );
    assert_eq!(message, "Step 3 isn't defined");
}

#[test]
fn test_duplicate_steps() {
    let message = statements_error(
        "funnel f { step 1 when user.sessions.id > 1 step 1 when user.sessions.id > 2 1 } from schema quo",
    );
    assert_eq!(message, "Step 1 is defined more than once");
}

#[test]
fn test_step_timing_must_be_a_long() {
    let message = statements_error("funnel f { step 1 when user.flurryId > 1 1 } from schema quo");
    assert!(message.contains("must be compatible with LONG"));
}

#[test]
fn test_step_durations_are_non_negative() {
    let message = statements_error(
        "funnel f { step 1 when user.sessions.id > 1 after -5 1 } from schema quo",
    );
    assert!(message.contains("must be a non-negative constant"));
}

#[test]
fn test_boundaries_in_steps() {
    let statements = statements(
        "funnel f transaction { step 1 when START OF user.sessions step 2 when END OF user.sessions 1 : 2+ } from schema quo",
    );
    assert_eq!(funnel(&statements, 0).funnel_type, FunnelType::Transaction);
}

#[test]
fn test_match_must_not_start_without_capture() {
    let message = statements_error(
        "funnel f { step 1 when user.sessions.id > 1 step 2 when user.sessions.id > 2 {1} : 2 } from schema quo",
    );
    assert!(message.contains("cannot start with a non-capturing group"));
}

#[test]
fn test_funnel_needs_a_match() {
    let result = motif().parse_motif_statements("funnel f { step 1 when user.sessions.id > 1 } from schema quo");
    assert!(matches!(result, Err(MotifError::Parse { .. })));
}

// ============================================================================
// Output
// ============================================================================

#[test]
fn test_generated_statements_reparse() {
    let text = format!(
        "segment active (min: long) {{ segment 1 when count(user.sessions) > $min }} from schema quo;
         {PURCHASES};
         select (floor: long) count(user) as users beside select sum(user.sessions.events.duration)
         from schema quo, segment active($floor) as a, funnel purchases
         where a.members.id == 1 and user.flurryId > $floor limit 10"
    );
    let first = statements(&text);
    let generated = first.generate_motif();
    let second = statements(&generated);
    assert_eq!(first, second, "{}", generated);
}

#[test]
fn test_generated_match_definitions() {
    let text = "funnel f {
        step 1 when user.sessions.id > 1
        step 2 when user.sessions.id > 2
        step 3 when user.sessions.id > 3
        1 : {[^2 3]*} : (2 | 3)[1:4] : 3?
    } from schema quo";
    let first = statements(text);
    let generated = first.generate_motif();
    assert!(generated.contains("{[^2 3]*}"));
    assert!(generated.contains("[1:4]"));
    assert_eq!(statements(&generated), first);
}

#[test]
fn test_statements_survive_json() {
    let first = statements(&format!("{PURCHASES}; select count(purchases.paths) from schema quo, funnel purchases"));
    let json = first.to_json_pretty().unwrap();
    assert_eq!(Statements::from_json(&json).unwrap(), first);
}

#[test]
fn test_explain_motif() {
    let text = motif().explain_motif(PURCHASES).unwrap();
    assert!(text.starts_with("Statements(\n"));
    assert!(text.contains("StepDefinition(1\n"));
    assert!(text.contains("Timing("));
}
