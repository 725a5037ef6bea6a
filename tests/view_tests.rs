// tests/view_tests.rs

use motif_lang::ast::{BoolOp, Constant, EditAction, FilterRule};
use motif_lang::{Expr, JsonNode, Motif, MotifError, View};

const QUO: &str = include_str!("fixtures/quo.motif");

fn motif() -> Motif {
    let motif = Motif::new();
    let schema = motif.parse_schema(QUO).unwrap();
    motif.register_schema(schema);
    motif
}

fn view(source: &str) -> View {
    motif().parse_view("quo", source).unwrap()
}

fn view_error(source: &str) -> String {
    match motif().parse_view("quo", source) {
        Err(MotifError::Parse { message, .. }) => message,
        other => panic!("Expected a parse error, got {:?}", other),
    }
}

fn only_predicate(view: &View) -> &Expr {
    assert_eq!(view.rules.len(), 1);
    match &view.rules[0] {
        FilterRule::Edit(rule) => &rule.predicate,
        other => panic!("Expected an edit rule, got {:?}", other),
    }
}

fn only_predicate_of(view: &View, index: usize) -> &Expr {
    match &view.rules[index] {
        FilterRule::Edit(rule) => &rule.predicate,
        other => panic!("Expected an edit rule, got {:?}", other),
    }
}

// ============================================================================
// Constant reduction
// ============================================================================

#[test]
fn test_null_test_on_a_path_does_not_reduce() {
    let motif = Motif::new();
    let schema = motif
        .parse_schema("schema tiny { root) user : User structure User { 0) flurryId : long } }")
        .unwrap();
    motif.register_schema(schema);

    let view = motif
        .parse_view("tiny", "view v { include user where user.flurryId is null }")
        .unwrap();
    let predicate = only_predicate(&view);
    assert!(!predicate.can_reduce_to_constant());
    assert!(matches!(predicate, Expr::NullTest(_)));
}

#[test]
fn test_constant_arithmetic_reduces() {
    let view = view("view v { include user where (5999 % 34) == 0 }");
    let predicate = only_predicate(&view);
    assert!(predicate.can_reduce_to_constant());
    assert_eq!(predicate.as_constant(), Some(&Constant::Boolean(false)));

    let view = self::view("view v { include user where (5984 % 34) == 0 }");
    assert_eq!(only_predicate(&view).as_constant(), Some(&Constant::Boolean(true)));
}

#[test]
fn test_constant_side_of_and_drops_away() {
    let view = view("view v { include user where true and user.flurryId > 10 }");
    assert!(matches!(only_predicate(&view), Expr::Comparison(_)));
}

// ============================================================================
// Sample rules
// ============================================================================

#[test]
fn test_presample_ratio_out_of_range() {
    let message = view_error("view v { presample(1.5) }");
    assert!(message.contains("must evaluate to a numeric constant <= 1.0 and >= 0.0"));
}

#[test]
fn test_presample_ratio_must_be_constant() {
    let message = view_error("view v { presample(user.flurryId) }");
    assert!(message.contains("must evaluate to a numeric constant"));
}

#[test]
fn test_presample_defaults_to_the_root() {
    let view = view("view v { presample(0.25) }");
    let rule = view.presample().unwrap();
    assert_eq!(rule.target.as_ref().unwrap().full_path(), "user");
}

#[test]
fn test_postsample_needs_a_non_negative_count() {
    let message = view_error("view v { postsample(-1) }");
    assert!(message.contains("must evaluate to a numeric constant >= 0"));
    assert!(motif().parse_view("quo", "view v { postsample(4096) }").is_ok());
}

#[test]
fn test_only_one_presample() {
    let message = view_error("view v { presample(0.5) presample(0.1) }");
    assert_eq!(message, "Only one presample rule is allowed");
}

// ============================================================================
// Rule validation
// ============================================================================

#[test]
fn test_duplicate_target_paths_are_rejected() {
    let message = view_error(
        "view v { include user.sessions where user.sessions.id > 1; exclude user.sessions }",
    );
    assert!(message.contains("'user.sessions'"));
}

#[test]
fn test_target_must_be_an_instance() {
    let message = view_error("view v { include user.flurryId where user.flurryId > 1 }");
    assert!(message.contains("must be an instance reference"));
}

#[test]
fn test_where_must_be_boolean() {
    let message = view_error("view v { include user where user.flurryId + 1 }");
    assert!(message.contains("must be a boolean"));
}

#[test]
fn test_bounds_across_unrelated_branches_fail() {
    let message = view_error(
        "view v { include user where user.sessions.startTime between user.segments.startTime and 10 }",
    );
    assert!(message.contains("not on the same axis"));
}

#[test]
fn test_where_below_an_unrelated_target_fails() {
    let message = view_error("view v { include user.segments where user.sessions.id > 3 }");
    assert!(message.contains("not on the same axis"));
}

#[test]
fn test_unknown_paths_fail() {
    let message = view_error("view v { include user where user.nothing > 3 }");
    assert!(message.contains("nothing"));
}

// ============================================================================
// View algebra
// ============================================================================

#[test]
fn test_union_absorbs_a_true_side() {
    let narrow = view("view a { include user where user.flurryId > 10 }");
    let everything = view("view b { include user where true }");

    let union = narrow.union_view(&everything);
    assert_eq!(only_predicate(&union).as_constant(), Some(&Constant::Boolean(true)));

    let intersection = narrow.intersect_view(&everything);
    assert_eq!(only_predicate(&intersection), only_predicate(&narrow));
}

#[test]
fn test_a_true_side_absorbs_from_the_left() {
    let narrow = view("view a { include user where user.flurryId > 10 }");
    let everything = view("view b { include user where true }");

    let union = everything.union_view(&narrow);
    assert_eq!(only_predicate(&union).as_constant(), Some(&Constant::Boolean(true)));

    let intersection = everything.intersect_view(&narrow);
    assert_eq!(only_predicate(&intersection), only_predicate(&narrow));
}

#[test]
fn test_intersection_absorbs_a_false_side() {
    let narrow = view("view a { include user where user.flurryId > 10 }");
    let nothing = view("view b { include user where false }");

    for intersection in [narrow.intersect_view(&nothing), nothing.intersect_view(&narrow)] {
        assert_eq!(only_predicate(&intersection).as_constant(), Some(&Constant::Boolean(false)));
    }
    for union in [narrow.union_view(&nothing), nothing.union_view(&narrow)] {
        assert_eq!(only_predicate(&union), only_predicate(&narrow));
    }
}

#[test]
fn test_union_with_itself_keeps_one_rule_per_target() {
    let v = view("view v { include user where user.flurryId > 10; include user.sessions }");
    let union = v.union_view(&v);
    assert_eq!(union.name, "v⋃v");
    assert_eq!(union.edit_rules().count(), v.edit_rules().count());

    let FilterRule::Edit(rule) = &union.rules[0] else {
        panic!("Expected an edit rule");
    };
    let original = only_predicate_of(&v, 0);
    assert!(matches!(
        &rule.predicate,
        Expr::BinaryBoolean(b) if b.op == BoolOp::Or && *b.left == *original && *b.right == *original
    ));
}

#[test]
fn test_long_or_chains_are_rejected() {
    let clauses = vec!["user.flurryId > 0"; 5000].join(" or ");
    let message = view_error(&format!("view v {{ include user where {clauses} }}"));
    assert_eq!(message, "expression too deep");
}

#[test]
fn test_union_ors_open_predicates() {
    let a = view("view a { include user where user.flurryId > 10 }");
    let b = view("view b { include user where user.deviceModelId == 3 }");
    let union = a.union_view(&b);
    assert!(matches!(only_predicate(&union), Expr::BinaryBoolean(_)));
    assert_eq!(union.name, "a⋃b");
}

#[test]
fn test_combining_keeps_one_sided_rules() {
    let a = view("view a { include user where user.flurryId > 10 }");
    let b = view("view b { include user.sessions where user.sessions.id > 2; presample(0.5) }");
    let intersection = a.intersect_view(&b);
    assert_eq!(intersection.edit_rules().count(), 2);
    assert!(intersection.presample().is_some());
}

#[test]
fn test_exclude_rules_combine_as_negations() {
    let a = view("view a { exclude user where user.flurryId > 10 }");
    let b = view("view b { include user where user.deviceModelId == 3 }");
    let intersection = a.intersect_view(&b);
    let FilterRule::Edit(rule) = &intersection.rules[0] else {
        panic!("Expected an edit rule");
    };
    assert_eq!(rule.action, EditAction::Include);
    assert!(rule.predicate.motif().starts_with("(NOT ("));
}

#[test]
fn test_complement_twice_restores_root_predicates() {
    let original = view("view v { include user where user.flurryId > 10; include user.sessions }");
    let twice = original.complement_view().complement_view();
    assert_eq!(twice.rules, original.rules);
}

#[test]
fn test_complement_leaves_descendants_alone() {
    let original = view("view v { include user where user.flurryId > 10; include user.sessions where user.sessions.id > 3 }");
    let complement = original.complement_view();
    assert!(matches!(&complement.rules[0], FilterRule::Edit(r) if matches!(r.predicate, Expr::Not(_))));
    assert_eq!(complement.rules[1], original.rules[1]);
}

#[test]
fn test_complement_of_exclude_is_include() {
    let original = view("view v { exclude user where user.flurryId > 10 }");
    let complement = original.complement_view();
    let FilterRule::Edit(rule) = &complement.rules[0] else {
        panic!("Expected an edit rule");
    };
    assert_eq!(rule.action, EditAction::Include);
    assert!(matches!(rule.predicate, Expr::Comparison(_)));
}

#[test]
fn test_root_filter_predicate() {
    let included = view("view v { include user where user.flurryId > 10 }");
    assert!(matches!(included.root_filter_predicate(), Expr::Comparison(_)));

    let excluded = view("view v { exclude user where user.flurryId > 10 }");
    assert!(matches!(excluded.root_filter_predicate(), Expr::Not(_)));

    let open = view("view v { include user.sessions }");
    assert_eq!(open.root_filter_predicate().as_constant(), Some(&Constant::Boolean(true)));
}

// ============================================================================
// Output
// ============================================================================

#[test]
fn test_generated_text_reparses() {
    let source = "view 'recent users' {
        include user where user.flurryId > 10 and user.parameters['plan'] == 'pro';
        exclude user.sessions where user.sessions.startTime < NOW - DAYS(30);
        presample(0.5)
    }";
    let original = view(source);
    let text = original.generate_motif();
    assert!(text.starts_with("VIEW \"recent users\" {"));
    assert_eq!(view(&text), original);
}

#[test]
fn test_bound_view_survives_json() {
    let original = view("view v { include user.sessions.events where user.sessions.events.eventId in (1, 2, 3) }");
    let json = original.to_json().unwrap();
    assert_eq!(View::from_json(&json).unwrap(), original);
}

#[test]
fn test_explain_names_every_rule() {
    let text = motif()
        .explain_view("quo", "view v { include user where user.flurryId > 10; postsample(100) }")
        .unwrap();
    assert!(text.starts_with("View('v'\n"));
    assert!(text.contains("EditRule("));
    assert!(text.contains("PostsampleRule("));
}
