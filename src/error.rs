use ariadne::{Color, Label, Report, ReportKind, Source};

use crate::codegen::CodeGenError;
use crate::parser::ParseError;

/// Display a syntax error with ariadne formatting, pointing at the
/// offending lexeme.
pub fn display_parse_error(source: &str, filename: &str, error: &ParseError) {
    let span = error.span();
    let mut line = 1;
    let mut column = 1;

    // Spans are char offsets, the same unit ariadne indexes sources by.
    for (i, ch) in source.chars().enumerate() {
        if i >= span.start {
            break;
        }
        if ch == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }

    let len = source.chars().count();
    let end = span.end.max(span.start + 1).min(len);

    Report::build(ReportKind::Error, filename, span.start)
        .with_message(format!("Syntax error: {}", error))
        .with_label(
            Label::new((filename, span.start..end))
                .with_message(format!("{}:{}: {}", line, column, error))
                .with_color(Color::Red),
        )
        .finish()
        .eprint((filename, Source::from(source)))
        .unwrap();
}

/// Display a code generation error with ariadne formatting. Generation
/// works on the tree, so there is no precise source location to point at.
pub fn display_codegen_error(source: &str, filename: &str, error: &CodeGenError) {
    let end = std::cmp::min(1, source.chars().count());

    Report::build(ReportKind::Error, filename, 0)
        .with_message("Code generation error")
        .with_label(
            Label::new((filename, 0..end))
                .with_message(error.to_string())
                .with_color(Color::Red),
        )
        .finish()
        .eprint((filename, Source::from(source)))
        .unwrap();
}
