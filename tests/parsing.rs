use kscope::ast::Item;
use kscope::parser::{ParseError, Parser, Session};

fn parse_all(source: &str) -> Result<Vec<Item>, ParseError> {
    let mut session = Session::new();
    let mut parser = Parser::new(source, &mut session);
    let mut items = Vec::new();
    while let Some(item) = parser.parse_item()? {
        items.push(item);
    }
    Ok(items)
}

/// Parses a single top-level expression and renders its tree as an
/// s-expression.
fn expr_sexpr(source: &str) -> String {
    let items = parse_all(source).unwrap();
    match items.as_slice() {
        [Item::Expression(func)] => func.body.to_string(),
        other => panic!("expected a single top-level expression, got {:?}", other),
    }
}

#[test]
fn test_equal_precedence_associates_left() {
    insta::assert_snapshot!(expr_sexpr("1 - 2 + 3"), @"(+ (- 1 2) 3)");
}

#[test]
fn test_tighter_operator_binds_first() {
    insta::assert_snapshot!(expr_sexpr("1 + 2 * 3"), @"(+ 1 (* 2 3))");
}

#[test]
fn test_parentheses_override_precedence() {
    insta::assert_snapshot!(expr_sexpr("(1 + 2) * 3"), @"(* (+ 1 2) 3)");
}

#[test]
fn test_mixed_precedence_chain() {
    insta::assert_snapshot!(
        expr_sexpr("1 + 2 * 3 - 4 * 5 < 6"),
        @"(< (- (+ 1 (* 2 3)) (* 4 5)) 6)"
    );
}

#[test]
fn test_assignment_binds_loosest() {
    insta::assert_snapshot!(expr_sexpr("a = b < c + 1"), @"(= a (< b (+ c 1)))");
}

#[test]
fn test_number_literal_forms() {
    insta::assert_snapshot!(expr_sexpr("1. + .5"), @"(+ 1 0.5)");
}

#[test]
fn test_comments_are_ignored() {
    insta::assert_snapshot!(expr_sexpr("# heading\n42 # trailing"), @"42");
}

#[test]
fn test_call_arguments_are_comma_separated() {
    insta::assert_snapshot!(expr_sexpr("f(1, x + 2, g())"), @"(f 1 (+ x 2) (g))");
}

#[test]
fn test_if_requires_all_three_arms() {
    insta::assert_snapshot!(expr_sexpr("if x < 3 then 1 else 2"), @"(if (< x 3) 1 2)");
}

#[test]
fn test_if_nests_in_either_arm() {
    insta::assert_snapshot!(
        expr_sexpr("if a then if b then 1 else 2 else 3"),
        @"(if a (if b 1 2) 3)"
    );
}

#[test]
fn test_for_defaults_step_to_one() {
    insta::assert_snapshot!(
        expr_sexpr("for i = 1, i < 10 in f(i)"),
        @"(for i 1 (< i 10) 1 (f i))"
    );
}

#[test]
fn test_for_with_explicit_step() {
    insta::assert_snapshot!(
        expr_sexpr("for i = 0, 10, 1 + 1 in f(i)"),
        @"(for i 0 10 (+ 1 1) (f i))"
    );
}

#[test]
fn test_var_defaults_init_to_zero() {
    insta::assert_snapshot!(
        expr_sexpr("var a = 1, b in a + b"),
        @"(var ((a 1) (b 0)) (+ a b))"
    );
}

#[test]
fn test_def_yields_definition_item() {
    let items = parse_all("def add(a b) a + b").unwrap();
    match items.as_slice() {
        [Item::Definition(func)] => {
            assert_eq!(func.proto.name, "add");
            assert_eq!(func.proto.params, vec!["a".to_string(), "b".to_string()]);
            insta::assert_snapshot!(func.body.to_string(), @"(+ a b)");
        }
        other => panic!("expected a definition, got {:?}", other),
    }
}

#[test]
fn test_extern_yields_prototype_item() {
    let items = parse_all("extern sin(x)").unwrap();
    match items.as_slice() {
        [Item::Extern(proto)] => {
            assert_eq!(proto.name, "sin");
            assert_eq!(proto.params, vec!["x".to_string()]);
        }
        other => panic!("expected an extern, got {:?}", other),
    }
}

#[test]
fn test_toplevel_expression_becomes_anonymous_function() {
    let items = parse_all("1 + 2").unwrap();
    match items.as_slice() {
        [Item::Expression(func)] => {
            assert!(func.proto.name.starts_with("__anon_expr_"));
            assert!(func.proto.params.is_empty());
        }
        other => panic!("expected an expression, got {:?}", other),
    }
}

#[test]
fn test_semicolons_separate_units() {
    let items = parse_all("def f(x) x; f(1); extern g()").unwrap();
    assert_eq!(items.len(), 3);
    assert!(matches!(items[0], Item::Definition(_)));
    assert!(matches!(items[1], Item::Expression(_)));
    assert!(matches!(items[2], Item::Extern(_)));
}

#[test]
fn test_missing_then_is_a_syntax_error() {
    let err = parse_all("if 1 2 else 3").unwrap_err();
    match err {
        ParseError::UnexpectedToken { expected, .. } => {
            assert!(expected.contains("then"), "got expected = {:?}", expected);
        }
        other => panic!("expected a syntax error, got {:?}", other),
    }
}

#[test]
fn test_missing_closing_paren_is_a_syntax_error() {
    let err = parse_all("(1 + 2").unwrap_err();
    match err {
        ParseError::UnexpectedToken { expected, .. } => {
            assert!(expected.contains(")"), "got expected = {:?}", expected);
        }
        other => panic!("expected a syntax error, got {:?}", other),
    }
}

#[test]
fn test_operand_missing_after_operator() {
    let err = parse_all("def f() )").unwrap_err();
    assert!(matches!(err, ParseError::ExpectedExpression { .. }));
}

#[test]
fn test_malformed_number_surfaces_as_lex_error() {
    let err = parse_all("1.2.3").unwrap_err();
    assert!(matches!(err, ParseError::Lex(_)));
}

#[test]
fn test_units_after_a_malformed_leading_token_still_parse() {
    let mut session = Session::new();
    let mut parser = Parser::new("1.2.3 def ok(x) x", &mut session);

    let err = parser.parse_item().unwrap_err();
    assert!(matches!(err, ParseError::Lex(_)));

    parser.skip_to_next_item();
    match parser.parse_item().unwrap() {
        Some(Item::Definition(func)) => assert_eq!(func.proto.name, "ok"),
        other => panic!("expected a definition, got {:?}", other),
    }
    assert!(parser.parse_item().unwrap().is_none());
}
