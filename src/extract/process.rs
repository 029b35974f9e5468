//! Process statement analysis.
//!
//! Classifies each process as sequential or combinational, recovers clock
//! and reset information, and harvests the declarations, calls, waits, and
//! read/write sets the policy layer keys on.
//!
//! A process is sequential iff its body contains a clock-edge test:
//! `rising_edge(x)`, `falling_edge(x)`, or `x'event and x = '0'|'1'`.

use crate::extract::decl::parse_object_decl;
use crate::extract::extractor::extract_case;
use crate::extract::tree::{
    descendants_of_kind, first_child_of_kinds, identifiers_in, line_of, node_text,
};
use crate::facts::{
    ClockEdge, ConstantRow, FileFacts, NameUseRow, ProcessRow, ResetKind, WaitKind, WaitRow,
};
use regex::Regex;
use std::sync::OnceLock;
use tree_sitter::Node;

pub(super) struct ProcessScope<'a> {
    pub file: &'a str,
    pub in_arch: &'a str,
}

fn rising_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)rising_edge\s*\(\s*([A-Za-z][A-Za-z0-9_.]*)").expect("rising pattern")
    })
}

fn falling_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)falling_edge\s*\(\s*([A-Za-z][A-Za-z0-9_.]*)").expect("falling pattern")
    })
}

fn event_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)([A-Za-z][A-Za-z0-9_.]*)'event\s+and\s+([A-Za-z][A-Za-z0-9_.]*)\s*=\s*'([01])'",
        )
        .expect("event pattern")
    })
}

fn branch_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)\b(elsif|if)\s+(.+?)\s+then\b").expect("branch pattern")
    })
}

/// The detected clock test: signal, edge, byte position in the body text.
struct ClockTest {
    signal: String,
    edge: ClockEdge,
    position: usize,
}

fn find_clock_test(body: &str) -> Option<ClockTest> {
    let mut best: Option<ClockTest> = None;
    let mut consider = |candidate: ClockTest| {
        if best.as_ref().is_none_or(|b| candidate.position < b.position) {
            best = Some(candidate);
        }
    };
    if let Some(captures) = rising_pattern().captures(body) {
        consider(ClockTest {
            signal: captures[1].to_string(),
            edge: ClockEdge::Rising,
            position: captures.get(0).map(|m| m.start()).unwrap_or(0),
        });
    }
    if let Some(captures) = falling_pattern().captures(body) {
        consider(ClockTest {
            signal: captures[1].to_string(),
            edge: ClockEdge::Falling,
            position: captures.get(0).map(|m| m.start()).unwrap_or(0),
        });
    }
    if let Some(captures) = event_pattern().captures(body) {
        if captures[1].eq_ignore_ascii_case(&captures[2]) {
            let edge = if &captures[3] == "1" {
                ClockEdge::Rising
            } else {
                ClockEdge::Falling
            };
            consider(ClockTest {
                signal: captures[1].to_string(),
                edge,
                position: captures.get(0).map(|m| m.start()).unwrap_or(0),
            });
        }
    }
    best
}

/// Locate the reset path around a clock test.
///
/// Async: the clock test lives in an `elsif` and an earlier `if` condition
/// names the reset. Sync: the clock test is the outer `if` and a nested
/// `if` inside the clocked branch tests a reset-looking signal.
fn find_reset(body: &str, clock: &ClockTest) -> (String, ResetKind) {
    let branches: Vec<(usize, &str, &str)> = branch_pattern()
        .captures_iter(body)
        .filter_map(|c| {
            let whole = c.get(0)?;
            Some((
                whole.start(),
                c.get(1).map(|m| m.as_str()).unwrap_or(""),
                c.get(2).map(|m| m.as_str()).unwrap_or(""),
            ))
        })
        .collect();

    // The branch whose condition spans the clock test
    let Some(clock_branch) = branches
        .iter()
        .position(|(start, _, condition)| {
            *start <= clock.position && clock.position < start + condition.len() + 16
        })
    else {
        return (String::new(), ResetKind::None);
    };

    let (_, keyword, _) = branches[clock_branch];
    if keyword.eq_ignore_ascii_case("elsif") && clock_branch > 0 {
        let (_, _, reset_condition) = branches[clock_branch - 1];
        let signal = identifiers_in(reset_condition)
            .into_iter()
            .next()
            .unwrap_or_default();
        if !signal.is_empty() {
            return (signal, ResetKind::Async);
        }
        return (String::new(), ResetKind::None);
    }

    // Synchronous form: first simple single-signal test after the clock
    // branch whose name looks like a reset
    for (start, _, condition) in branches.iter().skip(clock_branch + 1) {
        if *start < clock.position {
            continue;
        }
        let idents = identifiers_in(condition);
        if idents.len() == 1 {
            let lower = idents[0].to_ascii_lowercase();
            if lower.contains("rst") || lower.contains("reset") {
                return (idents[0].clone(), ResetKind::Sync);
            }
        }
    }
    (String::new(), ResetKind::None)
}

fn wait_kind(text: &str) -> WaitKind {
    let lower = text.to_ascii_lowercase();
    let after = lower.trim_start().strip_prefix("wait").unwrap_or(&lower);
    for (needle, kind) in [
        (" on ", WaitKind::On),
        (" until ", WaitKind::Until),
        (" for ", WaitKind::For),
    ] {
        if after.starts_with(needle.trim_start_matches(' ')) || after.contains(needle) {
            return kind;
        }
    }
    WaitKind::Plain
}

/// Extract one process statement into fact rows.
pub(super) fn extract_process(node: Node, src: &str, scope: &ProcessScope, facts: &mut FileFacts) {
    let body = node_text(node, src);
    let line = line_of(node);
    let label = first_child_of_kinds(node, &["label"], src)
        .map(|text| text.trim_end_matches(':').trim().to_string())
        .unwrap_or_default();

    // Sensitivity list, `all` included
    let mut sensitivity = Vec::new();
    let mut sensitivity_all = false;
    let sensitivity_text = descendants_of_kind(node, "sensitivity_list")
        .first()
        .map(|n| node_text(*n, src).to_string())
        .or_else(|| header_sensitivity(body));
    if let Some(text) = sensitivity_text {
        let trimmed = text.trim().trim_start_matches('(').trim_end_matches(')');
        if trimmed.trim().eq_ignore_ascii_case("all") {
            sensitivity_all = true;
        } else {
            sensitivity = trimmed
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
    }

    let clock = find_clock_test(body);
    let (reset_signal, reset_kind) = clock
        .as_ref()
        .map(|c| find_reset(body, c))
        .unwrap_or((String::new(), ResetKind::None));

    // Declarative part
    let mut variables = Vec::new();
    for decl_node in descendants_of_kind(node, "variable_declaration") {
        if let Some(decl) = parse_object_decl(node_text(decl_node, src)) {
            variables.extend(decl.names);
        }
    }
    for decl_node in descendants_of_kind(node, "constant_declaration") {
        if let Some(decl) = parse_object_decl(node_text(decl_node, src)) {
            for name in decl.names {
                facts.constants.push(ConstantRow {
                    name,
                    const_type: decl.type_text.clone(),
                    value: decl.default.clone(),
                    file: scope.file.to_string(),
                    line: line_of(decl_node),
                    in_arch: scope.in_arch.to_string(),
                    in_process: label.clone(),
                    ..Default::default()
                });
            }
        }
    }

    // Calls
    let mut calls = Vec::new();
    for call in descendants_of_kind(node, "procedure_call_statement") {
        if let Some(name) = identifiers_in(node_text(call, src)).into_iter().next() {
            if !calls.iter().any(|c: &String| c.eq_ignore_ascii_case(&name)) {
                calls.push(name.clone());
            }
            facts.name_uses.push(NameUseRow {
                name,
                access: "call".into(),
                file: scope.file.to_string(),
                line: line_of(call),
                in_process: label.clone(),
                in_arch: scope.in_arch.to_string(),
            });
        }
    }

    // Waits
    let waits: Vec<WaitRow> = descendants_of_kind(node, "wait_statement")
        .into_iter()
        .map(|w| WaitRow {
            kind: wait_kind(node_text(w, src)),
            line: line_of(w),
        })
        .collect();

    // Read/write sets from assignment statements
    let mut reads: Vec<String> = Vec::new();
    let mut writes: Vec<String> = Vec::new();
    let mut push_unique = |set: &mut Vec<String>, name: &str| {
        if !set.iter().any(|existing| existing.eq_ignore_ascii_case(name)) {
            set.push(name.to_string());
        }
    };
    for kind in [
        "simple_waveform_assignment",
        "conditional_waveform_assignment",
        "selected_waveform_assignment",
        "simple_variable_assignment",
        "conditional_variable_assignment",
        "selected_variable_assignment",
    ] {
        for assignment in descendants_of_kind(node, kind) {
            let text = node_text(assignment, src);
            let Some(split) = text.find("<=").or_else(|| text.find(":=")) else {
                continue;
            };
            let (target, rhs) = (&text[..split], &text[split + 2..]);
            if let Some(name) = identifiers_in(target).into_iter().next() {
                push_unique(&mut writes, &name);
                facts.name_uses.push(NameUseRow {
                    name,
                    access: "write".into(),
                    file: scope.file.to_string(),
                    line: line_of(assignment),
                    in_process: label.clone(),
                    in_arch: scope.in_arch.to_string(),
                });
            }
            for name in identifiers_in(rhs) {
                push_unique(&mut reads, &name);
            }
        }
    }
    // Branch conditions are reads too
    for captures in branch_pattern().captures_iter(body) {
        if let Some(condition) = captures.get(2) {
            for name in identifiers_in(condition.as_str()) {
                push_unique(&mut reads, &name);
            }
        }
    }

    // Case statements inside the process
    for case in descendants_of_kind(node, "case_statement") {
        extract_case(case, src, scope.file, &label, scope.in_arch, facts);
    }

    let is_sequential = clock.is_some();
    facts.processes.push(ProcessRow {
        label,
        file: scope.file.to_string(),
        line,
        in_arch: scope.in_arch.to_string(),
        is_sequential,
        is_combinational: !is_sequential,
        clock_signal: clock.as_ref().map(|c| c.signal.clone()).unwrap_or_default(),
        clock_edge: clock.as_ref().map(|c| c.edge).unwrap_or(ClockEdge::None),
        reset_signal,
        reset_kind,
        sensitivity,
        sensitivity_all,
        variables,
        calls,
        waits,
        reads,
        writes,
    });
}

/// Fallback sensitivity parse from the process header text.
fn header_sensitivity(body: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?is)\bprocess\s*\(([^)]*)\)").expect("sensitivity fallback pattern")
    });
    re.captures(body).map(|c| c[1].to_string())
}
