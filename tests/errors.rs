use inkwell::context::Context;
use kscope::codegen::{CodeGenError, Compiler};
use kscope::lexer::{LexError, Lexer, TokenKind};
use kscope::parser::{ParseError, Parser, Session};

/// Compiles units until one fails and returns that error.
fn first_codegen_error(source: &str) -> CodeGenError {
    let context = Context::create();
    let mut compiler = Compiler::new(&context);
    let mut session = Session::new();
    let mut parser = Parser::new(source, &mut session);
    while let Some(item) = parser.parse_item().unwrap() {
        if let Err(err) = compiler.compile_item(&item) {
            return err;
        }
    }
    panic!("expected a code generation error from {:?}", source);
}

fn parse_error(source: &str) -> ParseError {
    let mut session = Session::new();
    let mut parser = Parser::new(source, &mut session);
    loop {
        match parser.parse_item() {
            Ok(Some(_)) => {}
            Ok(None) => panic!("expected a syntax error from {:?}", source),
            Err(err) => return err,
        }
    }
}

#[test]
fn test_unknown_variable() {
    match first_codegen_error("def f(x) y") {
        CodeGenError::UnknownSymbol(name) => assert_eq!(name, "y"),
        other => panic!("expected an unknown symbol, got {:?}", other),
    }
}

#[test]
fn test_unknown_function() {
    match first_codegen_error("def f(x) g(x)") {
        CodeGenError::UnknownFunction(name) => assert_eq!(name, "g"),
        other => panic!("expected an unknown function, got {:?}", other),
    }
}

#[test]
fn test_assignment_needs_a_variable_target() {
    assert!(matches!(
        first_codegen_error("def f(a) (a + 1) = 2"),
        CodeGenError::InvalidAssignment
    ));
}

#[test]
fn test_assignment_to_unbound_name() {
    match first_codegen_error("def f(a) b = 1") {
        CodeGenError::UnknownSymbol(name) => assert_eq!(name, "b"),
        other => panic!("expected an unknown symbol, got {:?}", other),
    }
}

#[test]
fn test_var_bindings_are_invisible_outside_the_body() {
    match first_codegen_error("def f() (var a = 1 in a) + a") {
        CodeGenError::UnknownSymbol(name) => assert_eq!(name, "a"),
        other => panic!("expected an unknown symbol, got {:?}", other),
    }
}

#[test]
fn test_registered_operator_without_a_function_body() {
    // The operator registers when its prototype parses, but the failed body
    // removes the function again; a later use parses fine and then fails at
    // generation time.
    let context = Context::create();
    let mut compiler = Compiler::new(&context);
    let mut session = Session::new();
    let mut parser = Parser::new("def binary^ 5 (a b) nosuch; 1 ^ 2", &mut session);

    let failed_definition = parser.parse_item().unwrap().unwrap();
    assert!(matches!(
        compiler.compile_item(&failed_definition),
        Err(CodeGenError::UnknownSymbol(_))
    ));

    let use_site = parser.parse_item().unwrap().unwrap();
    match compiler.compile_item(&use_site) {
        Err(CodeGenError::UnknownOperator(op)) => assert_eq!(op, '^'),
        other => panic!("expected an unknown operator, got {:?}", other),
    }
}

#[test]
fn test_lexer_rejects_malformed_numbers() {
    let mut lexer = Lexer::new("1.2.3");
    match lexer.next_token() {
        Err(LexError::MalformedNumber { literal, .. }) => assert_eq!(literal, "1.2.3"),
        other => panic!("expected a malformed number, got {:?}", other),
    }
}

#[test]
fn test_syntax_error_reports_expected_and_found() {
    match parse_error("def f(x") {
        ParseError::UnexpectedToken {
            expected, found, ..
        } => {
            assert!(expected.contains(")"), "got expected = {:?}", expected);
            assert_eq!(found, TokenKind::Eof);
        }
        other => panic!("expected a syntax error, got {:?}", other),
    }
}

#[test]
fn test_missing_in_after_var_bindings() {
    match parse_error("def f() var a = 1 a") {
        ParseError::UnexpectedToken { expected, .. } => {
            assert!(expected.contains("in"), "got expected = {:?}", expected);
        }
        other => panic!("expected a syntax error, got {:?}", other),
    }
}

#[test]
fn test_error_spans_point_into_the_source() {
    let source = "if 1 2 else 3";
    let err = parse_error(source);
    let span = err.span();
    assert_eq!(&source[span.range()], "2");
}

#[test]
fn test_lex_error_span_covers_the_literal() {
    let source = "x + 1.2.3";
    let err = parse_error(source);
    assert!(matches!(err, ParseError::Lex(_)));
    assert_eq!(&source[err.span().range()], "1.2.3");
}

#[test]
fn test_errors_render_their_context() {
    let err = parse_error("if 1 2 else 3");
    let message = err.to_string();
    assert!(message.contains("then"), "got message = {:?}", message);
    assert!(message.contains("number 2"), "got message = {:?}", message);

    let err = first_codegen_error("def f(a b) a; f(1)");
    let message = err.to_string();
    assert!(message.contains("'f'"), "got message = {:?}", message);
    assert!(message.contains("2"), "got message = {:?}", message);
    assert!(message.contains("1"), "got message = {:?}", message);
}
