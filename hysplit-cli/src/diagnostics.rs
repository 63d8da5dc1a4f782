//! Rich rendering of parse failures.
use ariadne::{ColorGenerator, Label, Report, ReportKind, Source};
use hyir::utils::{Error, ParserError};

fn render_parser_error(error: &ParserError, color: ariadne::Color) {
    let file = error.file.clone().unwrap_or_else(|| "<input>".to_string());
    let source = std::fs::read_to_string(&file).unwrap_or_default();
    // Clamp to the text actually read.
    let end = error.end.min(source.len());
    let span = (file.clone(), error.start.min(end)..end);

    let printed = Report::build(ReportKind::Error, span.clone())
        .with_message(&error.message)
        .with_label(
            Label::new(span)
                .with_message("the error occurred here")
                .with_color(color),
        )
        .finish()
        .eprint((file, Source::from(source)));
    if printed.is_err() {
        eprintln!("{}", error);
    }
}

/// Print a load failure: parse errors get source snippets, anything else a
/// single line.
pub fn render_load_error(error: &Error) {
    match error {
        Error::ParserErrors { errors } => {
            let mut colors = ColorGenerator::new();
            let color = colors.next();
            for error in errors {
                render_parser_error(error, color);
            }
        }
        other => eprintln!("error: {}", other),
    }
}
