//! Verification tag parsing.
//!
//! Tags are single-line comments of the form
//! `--@check id=<id> scope=<entity|arch>:<name> [key=value]*`. Malformed
//! tags become tag-error rows with a message a human can act on; they never
//! abort extraction.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Check ids with required bindings. A tag naming one of these ids must
/// carry every listed binding; unknown ids accept any bindings.
pub const KNOWN_CHECKS: &[(&str, &[&str])] =
    &[("fsm.legal_state", &["state"]), ("cdc.sync", &["from", "to"])];

/// Parsed tag contents: id, scope, and extra bindings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTag {
    pub id: String,
    pub scope: String,
    pub bindings: BTreeMap<String, String>,
}

fn scope_pattern() -> &'static Regex {
    static SCOPE: OnceLock<Regex> = OnceLock::new();
    SCOPE.get_or_init(|| Regex::new(r"^(entity|arch):.+$").expect("scope pattern compiles"))
}

/// Whether a comment line carries a verification tag at all.
pub fn is_verification_tag(comment: &str) -> bool {
    comment.trim_start().starts_with("--@check")
}

/// Parse the body of a `--@check` comment.
///
/// Returns the parsed tag or a human-readable message describing what is
/// wrong with it.
pub fn parse_verification_tag(comment: &str) -> Result<ParsedTag, String> {
    let body = comment
        .trim_start()
        .strip_prefix("--@check")
        .unwrap_or(comment)
        .trim();

    let mut id = None;
    let mut scope = None;
    let mut bindings = BTreeMap::new();

    for token in body.split_whitespace() {
        let Some((key, value)) = token.split_once('=') else {
            return Err(format!(
                "malformed binding '{token}': expected key=value"
            ));
        };
        if key.is_empty() || value.is_empty() {
            return Err(format!(
                "malformed binding '{token}': empty key or value"
            ));
        }
        match key {
            "id" => id = Some(value.to_string()),
            "scope" => scope = Some(value.to_string()),
            _ => {
                bindings.insert(key.to_string(), value.to_string());
            }
        }
    }

    let id = id.ok_or_else(|| "missing id= field".to_string())?;
    let scope = scope.ok_or_else(|| format!("check '{id}' is missing a scope= field"))?;
    if !scope_pattern().is_match(&scope) {
        return Err(format!(
            "invalid scope '{scope}': expected entity:<name> or arch:<name>"
        ));
    }

    if let Some((_, required)) = KNOWN_CHECKS.iter().find(|(known, _)| *known == id) {
        for binding in *required {
            if !bindings.contains_key(*binding) {
                return Err(format!(
                    "check '{id}' requires a '{binding}=' binding"
                ));
            }
        }
    }

    Ok(ParsedTag { id, scope, bindings })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_tag() {
        let tag = parse_verification_tag(
            "--@check id=fsm.legal_state scope=arch:rtl state=current_state",
        )
        .unwrap();
        assert_eq!(tag.id, "fsm.legal_state");
        assert_eq!(tag.scope, "arch:rtl");
        assert_eq!(tag.bindings["state"], "current_state");
    }

    #[test]
    fn missing_required_binding_names_it() {
        let err =
            parse_verification_tag("--@check id=fsm.legal_state scope=arch:rtl").unwrap_err();
        assert!(err.contains("state"), "message should name the binding: {err}");
    }

    #[test]
    fn unknown_id_accepts_any_bindings() {
        let tag =
            parse_verification_tag("--@check id=custom.thing scope=entity:top foo=bar").unwrap();
        assert_eq!(tag.bindings["foo"], "bar");
    }

    #[test]
    fn bad_scope_is_reported() {
        let err = parse_verification_tag("--@check id=x.y scope=module:top").unwrap_err();
        assert!(err.contains("invalid scope"));
    }

    #[test]
    fn missing_id_is_reported() {
        let err = parse_verification_tag("--@check scope=arch:rtl").unwrap_err();
        assert!(err.contains("missing id="));
    }

    #[test]
    fn stray_token_is_reported() {
        let err = parse_verification_tag("--@check id=a.b scope=arch:rtl oops").unwrap_err();
        assert!(err.contains("malformed binding 'oops'"));
    }

    #[test]
    fn tag_detection() {
        assert!(is_verification_tag("  --@check id=a scope=arch:b"));
        assert!(!is_verification_tag("-- plain comment"));
    }
}
