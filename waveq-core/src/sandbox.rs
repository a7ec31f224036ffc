//! Python execution sandbox.
//!
//! Each call runs one short-lived interpreter process. Bindings are written
//! to a JSON file in a fresh temporary directory and loaded into the
//! fragment's globals by a small prelude, so nothing survives between calls.
//! Figures go to a single artifact path fixed at construction time.

use crate::config::SandboxConfig;
use crate::error::{Error, Result};
use crate::guard::CodeGuard;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Named values injected before a fragment runs
pub type Bindings = BTreeMap<String, Value>;

/// Captured stdout is cut at this many bytes
const MAX_OUTPUT_BYTES: usize = 64 * 1024;

const BINDINGS_ENV: &str = "WAVEQ_BINDINGS";

/// Loads bindings into globals; `data` rows become tuples.
const PRELUDE: &str = r#"import json as _waveq_json, os as _waveq_os
with open(_waveq_os.environ["WAVEQ_BINDINGS"], encoding="utf-8") as _waveq_f:
    globals().update(_waveq_json.load(_waveq_f))
if isinstance(globals().get("data"), list):
    data = [tuple(_r) if isinstance(_r, list) else _r for _r in data]
del _waveq_json, _waveq_os, _waveq_f
"#;

/// What a fragment produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxOutput {
    pub stdout: String,
    /// Set when the fragment wrote the artifact
    pub artifact: Option<PathBuf>,
}

impl SandboxOutput {
    /// Plain text handed back to the agent
    pub fn observation(&self) -> String {
        let mut text = self.stdout.trim_end().to_string();
        if let Some(path) = &self.artifact {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&format!("Chart saved to {}", path.display()));
        }
        text
    }
}

/// Runs code fragments with injected bindings
#[allow(async_fn_in_trait)]
pub trait Sandbox {
    /// Where figures are written
    fn artifact_path(&self) -> &Path;

    /// The file name fragments pass to `savefig`, relative to the workdir
    fn artifact_name(&self) -> &str;

    async fn run(&self, code: &str, bindings: &Bindings) -> Result<SandboxOutput>;
}

/// Runs fragments with an external Python interpreter.
#[derive(Debug, Clone)]
pub struct PythonSandbox {
    interpreter: String,
    workdir: PathBuf,
    artifact: PathBuf,
    timeout: Duration,
    guard: CodeGuard,
}

impl PythonSandbox {
    /// `workdir` is where fragments run and where the artifact lands.
    pub fn new(config: &SandboxConfig, workdir: impl Into<PathBuf>) -> Self {
        let workdir = workdir.into();
        let artifact_name = config.artifact.to_string_lossy().into_owned();
        Self {
            interpreter: config.python.clone(),
            artifact: workdir.join(&config.artifact),
            workdir,
            timeout: config.timeout,
            guard: CodeGuard::new(artifact_name),
        }
    }

    /// Remove a stale chart and make sure its directory exists
    fn clear_artifact(&self) -> Result<()> {
        if let Some(parent) = self.artifact.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::from(e)
                    .with_operation("sandbox::clear_artifact")
                    .with_context("path", parent.display().to_string())
            })?;
        }
        match std::fs::remove_file(&self.artifact) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::from(e)
                .with_operation("sandbox::clear_artifact")
                .with_context("path", self.artifact.display().to_string())),
        }
    }
}

impl Sandbox for PythonSandbox {
    fn artifact_path(&self) -> &Path {
        &self.artifact
    }

    fn artifact_name(&self) -> &str {
        self.guard.artifact_name()
    }

    async fn run(&self, code: &str, bindings: &Bindings) -> Result<SandboxOutput> {
        self.guard.check(code)?;
        // a chart from an earlier fragment stays until a new one replaces it
        let saves_figure = self.guard.saves_figure(code);
        if saves_figure {
            self.clear_artifact()?;
        }

        let scratch = tempfile::tempdir().map_err(|e| Error::from(e).with_operation("sandbox::run"))?;
        let bindings_path = scratch.path().join("bindings.json");
        let script_path = scratch.path().join("fragment.py");

        let encoded = serde_json::to_vec(bindings)
            .map_err(|e| Error::unexpected(format!("cannot encode bindings: {}", e)).set_source(e))?;
        std::fs::write(&bindings_path, encoded).map_err(Error::from)?;
        std::fs::write(&script_path, format!("{}\n{}\n", PRELUDE, code)).map_err(Error::from)?;

        debug!(interpreter = %self.interpreter, bindings = bindings.len(), "running fragment");

        let child = Command::new(&self.interpreter)
            .arg(&script_path)
            .current_dir(&self.workdir)
            .env(BINDINGS_ENV, &bindings_path)
            .env("MPLBACKEND", "Agg")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::sandbox_failed(format!("cannot start '{}': {}", self.interpreter, e))
                    .with_operation("sandbox::spawn")
                    .set_source(e)
            })?;

        // dropping the future on timeout kills the child
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| Error::from(e).with_operation("sandbox::wait"))?,
            Err(_) => {
                warn!(secs = self.timeout.as_secs(), "fragment timed out");
                return Err(Error::sandbox_timeout(self.timeout.as_secs()));
            }
        };

        let mut stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if stdout.len() > MAX_OUTPUT_BYTES {
            let mut cut = MAX_OUTPUT_BYTES;
            while !stdout.is_char_boundary(cut) {
                cut -= 1;
            }
            stdout.truncate(cut);
            stdout.push_str("\n... (output truncated)");
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("interpreter exited with an error")
                .trim()
                .to_string();
            return Err(Error::sandbox_failed(message).with_context(
                "exit_code",
                output.status.code().map(|c| c.to_string()).unwrap_or_else(|| "signal".into()),
            ));
        }

        let artifact = (saves_figure && self.artifact.is_file()).then(|| self.artifact.clone());
        if stdout.trim().is_empty() && artifact.is_none() {
            return Err(Error::sandbox_failed(format!(
                "fragment printed nothing and did not save {}",
                self.artifact.display()
            )));
        }

        Ok(SandboxOutput { stdout, artifact })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::QueryResult;
    use crate::ErrorKind;
    use serde_json::json;

    fn sandbox(dir: &Path, timeout: u64) -> PythonSandbox {
        let config = SandboxConfig {
            timeout: Duration::from_secs(timeout),
            ..SandboxConfig::default()
        };
        PythonSandbox::new(&config, dir)
    }

    #[tokio::test]
    async fn test_guard_runs_before_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let config = SandboxConfig {
            python: "waveq-no-such-python".into(),
            ..SandboxConfig::default()
        };
        let sandbox = PythonSandbox::new(&config, dir.path());

        let err = sandbox.run("import subprocess", &Bindings::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SandboxRejected);

        let err = sandbox.run("plt.savefig('other.png')", &Bindings::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SandboxRejected);
    }

    #[tokio::test]
    async fn test_fragment_without_savefig_keeps_chart() {
        let dir = tempfile::tempdir().unwrap();
        let config = SandboxConfig {
            python: "waveq-no-such-python".into(),
            ..SandboxConfig::default()
        };
        let sandbox = PythonSandbox::new(&config, dir.path());
        std::fs::write(sandbox.artifact_path(), b"png").unwrap();

        // spawn fails after the artifact decision has been made
        let err = sandbox.run("print(42)", &Bindings::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SandboxFailed);
        assert!(sandbox.artifact_path().is_file());

        let err = sandbox
            .run("plt.savefig(\"grafico.png\")", &Bindings::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SandboxFailed);
        assert!(!sandbox.artifact_path().exists());
    }

    #[tokio::test]
    async fn test_nested_artifact_name_matches_guard() {
        let dir = tempfile::tempdir().unwrap();
        let config = SandboxConfig {
            python: "waveq-no-such-python".into(),
            artifact: PathBuf::from("charts/x.png"),
            ..SandboxConfig::default()
        };
        let sandbox = PythonSandbox::new(&config, dir.path());
        assert_eq!(sandbox.artifact_name(), "charts/x.png");
        assert_eq!(sandbox.artifact_path(), dir.path().join("charts/x.png"));

        // accepted by the guard, then fails to spawn
        let err = sandbox
            .run("plt.savefig(\"charts/x.png\")", &Bindings::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SandboxFailed);
        assert!(dir.path().join("charts").is_dir());
    }

    #[tokio::test]
    async fn test_missing_interpreter() {
        let dir = tempfile::tempdir().unwrap();
        let config = SandboxConfig {
            python: "waveq-no-such-python".into(),
            ..SandboxConfig::default()
        };
        let err = PythonSandbox::new(&config, dir.path())
            .run("print(1)", &Bindings::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SandboxFailed);
    }

    #[test]
    fn test_observation_mentions_chart() {
        let output = SandboxOutput {
            stdout: "ok\n".into(),
            artifact: Some(PathBuf::from("grafico.png")),
        };
        assert_eq!(output.observation(), "ok\nChart saved to grafico.png");
    }

    #[tokio::test]
    #[ignore = "needs python3 on PATH"]
    async fn test_data_binding_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let result = QueryResult::new(
            vec!["X-Axis".into(), "Condition".into()],
            vec![
                vec![json!(0.0), json!("HEALTHY")],
                vec![json!(0.0002), json!("OUTER_RACEWAY")],
                vec![json!(0.0004), Value::Null],
            ],
        );
        let mut bindings = Bindings::new();
        bindings.insert("data".into(), result.to_binding());
        bindings.insert("columns".into(), json!(result.columns));

        let code = "import json\nassert all(isinstance(r, tuple) for r in data)\nprint(json.dumps([list(r) for r in data]))";
        let output = sandbox(dir.path(), 30).run(code, &bindings).await.unwrap();

        let echoed: Value = serde_json::from_str(output.stdout.trim()).unwrap();
        let rebuilt = QueryResult::from_binding(result.columns.clone(), &echoed).unwrap();
        assert_eq!(rebuilt, result);
        assert!(output.artifact.is_none());
    }

    #[tokio::test]
    #[ignore = "needs python3 on PATH"]
    async fn test_exception_message_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        let err = sandbox(dir.path(), 30)
            .run("raise ValueError('bad column')", &Bindings::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SandboxFailed);
        assert_eq!(err.message(), "ValueError: bad column");
    }

    #[tokio::test]
    #[ignore = "needs python3 on PATH"]
    async fn test_silent_fragment_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = sandbox(dir.path(), 30).run("x = 1", &Bindings::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SandboxFailed);
    }

    #[tokio::test]
    #[ignore = "needs python3 on PATH"]
    async fn test_no_state_between_calls() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = sandbox(dir.path(), 30);
        sandbox.run("x = 41\nprint(x)", &Bindings::new()).await.unwrap();
        let output = sandbox
            .run("print('x' in globals())", &Bindings::new())
            .await
            .unwrap();
        assert_eq!(output.stdout.trim(), "False");
    }

    #[tokio::test]
    #[ignore = "needs python3 with matplotlib on PATH"]
    async fn test_chart_survives_later_fragments() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = sandbox(dir.path(), 60);
        let plot = "import matplotlib.pyplot as plt\nplt.plot([1, 2])\nplt.savefig(\"grafico.png\")";
        let first = sandbox.run(plot, &Bindings::new()).await.unwrap();
        assert_eq!(first.artifact.as_deref(), Some(sandbox.artifact_path()));

        let second = sandbox.run("print(42)", &Bindings::new()).await.unwrap();
        assert!(second.artifact.is_none());
        assert!(sandbox.artifact_path().is_file());
    }

    #[tokio::test]
    #[ignore = "needs python3 on PATH"]
    async fn test_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let err = sandbox(dir.path(), 1)
            .run("while True:\n    pass", &Bindings::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SandboxTimeout);
    }
}
