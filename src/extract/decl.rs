//! Textual parsing of VHDL declaration bodies.
//!
//! Interface lists and object declarations have a rigid surface syntax
//! (`names : [mode] type [:= default]`), so the row fields are recovered
//! from the declaration text itself. This keeps the extractor tolerant of
//! grammar-tree shape differences: node boundaries come from the CST, the
//! fields from the text.

use crate::facts::Direction;

/// A parsed `names : [mode] type [:= default]` declaration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectDecl {
    pub names: Vec<String>,
    pub direction: Direction,
    pub type_text: String,
    pub default: String,
}

/// Parse one interface or object declaration entry.
///
/// Leading object-class keywords (`signal`, `constant`, `variable`,
/// `shared`, `file`) are skipped; a mode keyword after the colon becomes
/// the direction. Returns `None` when there is no name/type separator.
pub fn parse_object_decl(text: &str) -> Option<ObjectDecl> {
    let text = text.trim().trim_end_matches(';').trim();
    let colon = find_type_colon(text)?;
    let (left, right) = (text[..colon].trim(), text[colon + 1..].trim());

    let mut names: Vec<String> = left
        .split(',')
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();
    // Drop a leading object-class keyword from the first name
    if let Some(first) = names.first_mut() {
        for keyword in ["signal", "constant", "variable", "shared", "file"] {
            if let Some(rest) = strip_keyword(first, keyword) {
                *first = rest;
            }
        }
        if first.is_empty() {
            names.remove(0);
        }
    }
    if names.is_empty() {
        return None;
    }

    let (mut type_part, default) = match split_once_top_level(right, ":=") {
        Some((t, d)) => (t.trim().to_string(), d.trim().to_string()),
        None => (right.to_string(), String::new()),
    };

    let mut direction = Direction::Unspecified;
    let first_word = type_part
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_string();
    if let Some(dir) = Direction::parse(&first_word) {
        direction = dir;
        type_part = type_part[first_word.len()..].trim().to_string();
    }

    Some(ObjectDecl {
        names,
        direction,
        type_text: normalize_ws(&type_part),
        default,
    })
}

/// Split a declaration body into entries at top-level semicolons
/// (parentheses-aware, for defaults like `f(a; b)` never but `f(a, b)`
/// and nested constraint parens).
pub fn split_entries(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, ch) in text.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ';' if depth == 0 => {
                out.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out.into_iter()
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .collect()
}

/// Position of the name/type separator: the first top-level `:` that is
/// not part of `:=`.
fn find_type_colon(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b':' if depth == 0 && bytes.get(i + 1) != Some(&b'=') => return Some(i),
            _ => {}
        }
    }
    None
}

fn split_once_top_level<'a>(text: &'a str, separator: &str) -> Option<(&'a str, &'a str)> {
    let mut depth = 0usize;
    let bytes = text.as_bytes();
    let sep = separator.as_bytes();
    let mut i = 0;
    while i + sep.len() <= bytes.len() {
        match bytes[i] {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            _ => {}
        }
        if depth == 0 && &bytes[i..i + sep.len()] == sep {
            return Some((&text[..i], &text[i + sep.len()..]));
        }
        i += 1;
    }
    None
}

fn strip_keyword<'a>(text: &'a str, keyword: &str) -> Option<String> {
    let lower = text.to_ascii_lowercase();
    let rest = lower.strip_prefix(keyword)?;
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(text[keyword.len()..].trim().to_string())
    } else {
        None
    }
}

/// Collapse internal whitespace runs to single spaces.
pub fn normalize_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_port_entry() {
        let decl = parse_object_decl("clk : in std_logic").unwrap();
        assert_eq!(decl.names, vec!["clk"]);
        assert_eq!(decl.direction, Direction::In);
        assert_eq!(decl.type_text, "std_logic");
        assert_eq!(decl.default, "");
    }

    #[test]
    fn multi_name_with_default() {
        let decl = parse_object_decl("a, b : out std_logic_vector(7 downto 0) := (others => '0')")
            .unwrap();
        assert_eq!(decl.names, vec!["a", "b"]);
        assert_eq!(decl.direction, Direction::Out);
        assert_eq!(decl.type_text, "std_logic_vector(7 downto 0)");
        assert_eq!(decl.default, "(others => '0')");
    }

    #[test]
    fn signal_keyword_is_dropped() {
        let decl = parse_object_decl("signal count : unsigned(3 downto 0);").unwrap();
        assert_eq!(decl.names, vec!["count"]);
        assert_eq!(decl.direction, Direction::Unspecified);
        assert_eq!(decl.type_text, "unsigned(3 downto 0)");
    }

    #[test]
    fn generic_without_mode() {
        let decl = parse_object_decl("WIDTH : integer := 8").unwrap();
        assert_eq!(decl.names, vec!["WIDTH"]);
        assert_eq!(decl.direction, Direction::Unspecified);
        assert_eq!(decl.type_text, "integer");
        assert_eq!(decl.default, "8");
    }

    #[test]
    fn entries_split_is_paren_aware() {
        let entries = split_entries("a : in t1; b : out t2(3 downto 0); c : inout t3");
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1], "b : out t2(3 downto 0)");
    }

    #[test]
    fn no_colon_means_no_decl() {
        assert_eq!(parse_object_decl("begin"), None);
    }
}
