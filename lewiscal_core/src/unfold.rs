//! Line unfolding.
//!
//! Long content lines are folded by breaking them and starting the next physical line with
//! a single space or tab. Unfolding drops that one character and glues the rest onto the
//! previous line.

fn is_fold_marker(c: char) -> bool {
    c == ' ' || c == '\t'
}

/// Split `text` into logical lines, merging folded continuation lines.
///
/// Both `\r\n` and bare `\n` end a line, as does a trailing `\r` at the end of the input.
/// Empty lines are kept as empty logical lines.
pub fn unfold(text: &str) -> Vec<String> {
    let mut logical_lines: Vec<String> = vec![];
    for raw_line in text.lines() {
        let raw_line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
        match raw_line.strip_prefix(is_fold_marker) {
            Some(continuation) => match logical_lines.last_mut() {
                Some(previous) => previous.push_str(continuation),
                None => logical_lines.push(continuation.to_string()),
            },
            None => logical_lines.push(raw_line.to_string()),
        }
    }
    logical_lines
}
