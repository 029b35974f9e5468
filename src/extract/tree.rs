//! Small helpers over the tree-sitter CST shared by the extraction passes.

use regex::Regex;
use std::sync::OnceLock;
use tree_sitter::Node;

/// Maximum recursion depth for CST traversal. Deeply nested trees beyond
/// this are skipped rather than risking stack overflow.
pub const MAX_TREE_DEPTH: usize = 512;

pub fn node_text<'a>(node: Node, src: &'a str) -> &'a str {
    src.get(node.byte_range()).unwrap_or("")
}

/// 1-based line of a node's start.
pub fn line_of(node: Node) -> usize {
    node.start_position().row + 1
}

/// Text of the first direct named child with one of the given kinds.
pub fn first_child_of_kinds<'a>(node: Node, kinds: &[&str], src: &'a str) -> Option<&'a str> {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if kinds.contains(&child.kind()) {
            return Some(node_text(child, src));
        }
    }
    None
}

/// Collect all descendant nodes of a kind, in document order.
pub fn descendants_of_kind<'t>(node: Node<'t>, kind: &str) -> Vec<Node<'t>> {
    let mut out = Vec::new();
    collect_descendants(node, kind, 0, &mut out);
    out
}

fn collect_descendants<'t>(node: Node<'t>, kind: &str, depth: usize, out: &mut Vec<Node<'t>>) {
    if depth > MAX_TREE_DEPTH {
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == kind {
            out.push(child);
        }
        collect_descendants(child, kind, depth + 1, out);
    }
}

/// Reserved words that identifier harvesting must skip.
pub const VHDL_KEYWORDS: &[&str] = &[
    "abs", "access", "after", "alias", "all", "and", "architecture", "array", "assert",
    "attribute", "begin", "block", "body", "buffer", "bus", "case", "component",
    "configuration", "constant", "context", "disconnect", "downto", "else", "elsif", "end",
    "entity", "exit", "file", "for", "force", "function", "generate", "generic", "group",
    "guarded", "if", "impure", "in", "inertial", "inout", "is", "label", "library", "linkage",
    "literal", "loop", "map", "mod", "nand", "new", "next", "nor", "not", "null", "of", "on",
    "open", "or", "others", "out", "package", "parameter", "port", "postponed", "procedure",
    "process", "protected", "pure", "range", "record", "register", "reject", "release", "rem",
    "report", "return", "rol", "ror", "select", "severity", "shared", "signal", "sla", "sll",
    "sra", "srl", "subtype", "then", "to", "transport", "type", "unaffected", "units", "until",
    "use", "variable", "wait", "when", "while", "with", "xnor", "xor",
];

fn identifier_pattern() -> &'static Regex {
    static IDENT: OnceLock<Regex> = OnceLock::new();
    IDENT.get_or_init(|| Regex::new(r"[A-Za-z][A-Za-z0-9_]*").expect("identifier pattern"))
}

/// Harvest identifiers from a text fragment, skipping reserved words.
/// Order of first occurrence, deduplicated case-insensitively.
pub fn identifiers_in(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for m in identifier_pattern().find_iter(text) {
        let word = m.as_str();
        let lower = word.to_ascii_lowercase();
        if VHDL_KEYWORDS.contains(&lower.as_str()) {
            continue;
        }
        // Skip character/bit literals right after a quote
        if m.start() > 0 && text.as_bytes()[m.start() - 1] == b'\'' {
            continue;
        }
        if seen.insert(lower) {
            out.push(word.to_string());
        }
    }
    out
}
