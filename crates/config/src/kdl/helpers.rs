//! KDL parsing helper functions.
//!
//! Common utilities for extracting values from KDL nodes.

/// Convert a byte offset to line and column numbers (1-indexed)
pub fn offset_to_line_col(content: &str, offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut col = 1;
    for (i, ch) in content.char_indices() {
        if i >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

/// Helper to get a string entry from a KDL node
pub fn get_string_entry(node: &kdl::KdlNode, name: &str) -> Option<String> {
    node.children()
        .and_then(|children| children.get(name))
        .and_then(|n| n.entries().first())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

/// Helper to get an integer entry from a KDL node
pub fn get_int_entry(node: &kdl::KdlNode, name: &str) -> Option<i128> {
    node.children()
        .and_then(|children| children.get(name))
        .and_then(|n| n.entries().first())
        .and_then(|e| e.value().as_integer())
}

/// Helper to get every string argument of a child node
///
/// `nameservers "8.8.8.8" "1.1.1.1"` yields both addresses.
pub fn get_string_args(node: &kdl::KdlNode, name: &str) -> Vec<String> {
    node.children()
        .and_then(|children| children.get(name))
        .map(|n| {
            n.entries()
                .iter()
                .filter_map(|e| e.value().as_string())
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// Helper to get a non-negative integer entry, rejecting negatives
pub fn get_unsigned_entry(node: &kdl::KdlNode, name: &str) -> anyhow::Result<Option<u64>> {
    match get_int_entry(node, name) {
        Some(v) => u64::try_from(v)
            .map(Some)
            .map_err(|_| anyhow::anyhow!("'{}' must be a non-negative integer, got {}", name, v)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_to_line_col() {
        let content = "a\nbc\nd";
        assert_eq!(offset_to_line_col(content, 0), (1, 1));
        assert_eq!(offset_to_line_col(content, 3), (2, 2));
        assert_eq!(offset_to_line_col(content, 5), (3, 1));
    }

    #[test]
    fn test_offset_to_line_col_multibyte() {
        // 'é' is two bytes; offsets are byte offsets
        let content = "é\nx é y";
        assert_eq!(offset_to_line_col(content, 2), (1, 2));
        assert_eq!(offset_to_line_col(content, 3), (2, 1));
        assert_eq!(offset_to_line_col(content, 8), (2, 5));
    }

    #[test]
    fn test_entry_helpers() {
        let doc: kdl::KdlDocument = r#"block { name "x"; count 3; list "a" "b"; neg -1 }"#
            .parse()
            .unwrap();
        let node = doc.get("block").unwrap();

        assert_eq!(get_string_entry(node, "name").as_deref(), Some("x"));
        assert_eq!(get_int_entry(node, "count"), Some(3));
        assert_eq!(get_string_args(node, "list"), vec!["a", "b"]);
        assert!(get_string_args(node, "missing").is_empty());
        assert_eq!(get_unsigned_entry(node, "count").unwrap(), Some(3));
        assert!(get_unsigned_entry(node, "neg").is_err());
        assert_eq!(get_unsigned_entry(node, "missing").unwrap(), None);
    }
}
