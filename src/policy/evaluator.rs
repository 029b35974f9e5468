//! Policy evaluator subprocess.
//!
//! The evaluator is a black box: it reads the policy input as JSON on
//! stdin and writes a result document to stdout. A non-zero exit or
//! malformed output is a fatal run error; the core makes no attempt to
//! interpret rule semantics.

use crate::error::{AnalyzeError, AnalyzeResult};
use crate::policy::PolicyInput;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Environment variable naming the evaluator binary. Required.
pub const POLICY_BIN_ENV: &str = "VHDL_POLICY_BIN";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub rule: String,
    pub severity: String,
    pub file: String,
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total_violations: usize,
    pub errors: usize,
    pub warnings: usize,
    pub info: usize,
}

/// The evaluator's result document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorReport {
    pub violations: Vec<Violation>,
    #[serde(default)]
    pub summary: Summary,
}

/// Capability the indexer uses to run policy evaluation. Test doubles
/// substitute this; production uses [`SubprocessEvaluator`].
pub trait PolicyEvaluator: Send + Sync {
    fn evaluate(&self, input: &PolicyInput) -> AnalyzeResult<EvaluatorReport>;
}

/// Runs the external evaluator named by `VHDL_POLICY_BIN` (or an explicit
/// binary path).
#[derive(Debug, Default)]
pub struct SubprocessEvaluator {
    bin: Option<PathBuf>,
}

impl SubprocessEvaluator {
    /// Resolve the binary from the environment at evaluation time.
    pub fn from_env() -> Self {
        Self { bin: None }
    }

    pub fn with_binary(bin: impl Into<PathBuf>) -> Self {
        Self {
            bin: Some(bin.into()),
        }
    }

    fn binary(&self) -> AnalyzeResult<PathBuf> {
        if let Some(bin) = &self.bin {
            return Ok(bin.clone());
        }
        std::env::var_os(POLICY_BIN_ENV)
            .map(PathBuf::from)
            .ok_or_else(|| AnalyzeError::Evaluator {
                reason: format!("{POLICY_BIN_ENV} is not set"),
            })
    }
}

impl PolicyEvaluator for SubprocessEvaluator {
    fn evaluate(&self, input: &PolicyInput) -> AnalyzeResult<EvaluatorReport> {
        let bin = self.binary()?;
        let payload = serde_json::to_vec(input).map_err(|e| AnalyzeError::Evaluator {
            reason: format!("cannot serialize policy input: {e}"),
        })?;

        tracing::debug!(target: "policy", "invoking evaluator: {}", bin.display());
        let mut child = Command::new(&bin)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AnalyzeError::Evaluator {
                reason: format!("cannot spawn '{}': {e}", bin.display()),
            })?;

        {
            let mut stdin = child.stdin.take().ok_or_else(|| AnalyzeError::Evaluator {
                reason: "evaluator stdin unavailable".into(),
            })?;
            stdin.write_all(&payload).map_err(|e| AnalyzeError::Evaluator {
                reason: format!("cannot write policy input: {e}"),
            })?;
            // Drop closes the pipe so the evaluator sees EOF
        }

        let output = child
            .wait_with_output()
            .map_err(|e| AnalyzeError::Evaluator {
                reason: format!("evaluator did not finish: {e}"),
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AnalyzeError::Evaluator {
                reason: format!(
                    "evaluator exited with {}: {}",
                    output.status,
                    stderr.trim()
                ),
            });
        }

        serde_json::from_slice(&output.stdout).map_err(|e| AnalyzeError::Evaluator {
            reason: format!("malformed evaluator output: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    fn fake_evaluator(dir: &std::path::Path, script_body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake_evaluator.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{script_body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn well_formed_output_round_trips() {
        let temp = tempfile::TempDir::new().unwrap();
        let bin = fake_evaluator(
            temp.path(),
            r#"cat > /dev/null
echo '{"violations":[{"rule":"entity_has_ports","severity":"warning","file":"a.vhd","line":3,"message":"no ports"}],"summary":{"total_violations":1,"errors":0,"warnings":1,"info":0}}'"#,
        );
        let evaluator = SubprocessEvaluator::with_binary(bin);
        let report = evaluator.evaluate(&PolicyInput::default()).unwrap();
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].rule, "entity_has_ports");
        assert_eq!(report.summary.warnings, 1);
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_is_fatal() {
        let temp = tempfile::TempDir::new().unwrap();
        let bin = fake_evaluator(temp.path(), "cat > /dev/null\nexit 3");
        let evaluator = SubprocessEvaluator::with_binary(bin);
        let err = evaluator.evaluate(&PolicyInput::default()).unwrap_err();
        assert!(matches!(err, AnalyzeError::Evaluator { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn malformed_output_is_fatal() {
        let temp = tempfile::TempDir::new().unwrap();
        let bin = fake_evaluator(temp.path(), "cat > /dev/null\necho 'not json'");
        let evaluator = SubprocessEvaluator::with_binary(bin);
        let err = evaluator.evaluate(&PolicyInput::default()).unwrap_err();
        match err {
            AnalyzeError::Evaluator { reason } => assert!(reason.contains("malformed")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_binary_is_fatal() {
        let evaluator = SubprocessEvaluator::with_binary("/nonexistent/evaluator-binary");
        let err = evaluator.evaluate(&PolicyInput::default()).unwrap_err();
        assert!(matches!(err, AnalyzeError::Evaluator { .. }));
    }
}
