/// Removes full-line comments from a configuration file.
///
/// A line is a comment if it starts with `#` after leading whitespace.
/// Every other line, blank ones included, is kept in order together with its terminator.
pub fn normalize(text: &str) -> String {
    text.split_inclusive('\n')
        .filter(|line| !line.trim_start().starts_with('#'))
        .collect()
}
