//! Node-list parsing: one `host:port` per line, `#` starts a comment.

use std::io;
use std::path::Path;

/// Parse node addresses from text.
///
/// Lines are trimmed of surrounding whitespace (including carriage returns);
/// empty lines and lines starting with `#` are skipped.
pub fn parse_node_list(input: &str) -> Vec<String> {
    input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_owned)
        .collect()
}

/// Load node addresses from a file, one per line.
pub fn read_node_list(path: impl AsRef<Path>) -> io::Result<Vec<String>> {
    Ok(parse_node_list(&std::fs::read_to_string(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_blank_lines_and_comments() {
        let input = "10.0.0.1:9000\n\n# a comment\n10.0.0.2:9000\n   \n#another\n";
        assert_eq!(
            parse_node_list(input),
            vec!["10.0.0.1:9000".to_owned(), "10.0.0.2:9000".to_owned()]
        );
    }

    #[test]
    fn trims_whitespace_and_carriage_returns() {
        let input = "  10.0.0.1:9000 \r\n\t10.0.0.2:9001\r\n";
        assert_eq!(
            parse_node_list(input),
            vec!["10.0.0.1:9000".to_owned(), "10.0.0.2:9001".to_owned()]
        );
    }

    #[test]
    fn empty_input_yields_no_entries() {
        assert!(parse_node_list("").is_empty());
        assert!(parse_node_list("\n# only comments\n\n").is_empty());
    }

    #[test]
    fn duplicates_are_preserved() {
        let input = "10.0.0.1:9000\n10.0.0.1:9000\n";
        assert_eq!(parse_node_list(input).len(), 2);
    }
}
