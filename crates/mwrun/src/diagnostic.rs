use std::fmt::Write;

use mwasm::LoadError;

/// Formats a compiler-style diagnostic for a program that failed to load.
pub fn render(file: &str, source: &str, err: &LoadError) -> String {
    let mut diag = String::new();
    _ = writeln!(&mut diag, "error: {err}");

    let Some(line) = err.line() else {
        _ = writeln!(&mut diag, " --> {file}");
        return diag;
    };

    let gutter = " ".repeat(line.to_string().len());
    _ = writeln!(&mut diag, "{gutter}--> {file}:{line}");

    if let Some(raw_line) = source.lines().nth(line.saturating_sub(1)) {
        let text = raw_line.trim_end_matches('\r');
        // underline the code, not the comment after it
        let code = text.split([';', '#']).next().unwrap_or("").trim_end();
        let indent = code.len() - code.trim_start().len();
        let width = code.trim_start().chars().count().max(1);

        _ = writeln!(&mut diag, "{gutter} |");
        _ = writeln!(&mut diag, "{line} | {text}");
        _ = writeln!(
            &mut diag,
            "{gutter} | {}{}",
            " ".repeat(indent),
            "^".repeat(width)
        );
    }

    diag
}
