//! Export rendering: runs a candidate with an export snippet appended and
//! keeps the exported model files for inspection.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use tracing::{info, warn};

use crate::io::history::{CODE_FILE, FEEDBACK_FILE, RECORD_FILE};
use crate::io::prompt::PromptEngine;
use crate::io::sandbox::Sandbox;

/// Default snippet appended to candidates before export.
pub const DEFAULT_EXPORT_TEMPLATE: &str = "from build123d import export_{{ format }}\n\
export_{{ format }}(to_export={{ target }}, file_path=\"./{{ file_name }}\")\n";

const PATCHED_CODE_FILE: &str = "code_with_export.py";

/// Names in the iteration directory owned by the renderer and the history writer.
/// Produced files with these names are not copied.
const RESERVED_NAMES: &[&str] = &[CODE_FILE, PATCHED_CODE_FILE, FEEDBACK_FILE, RECORD_FILE];

/// Model file extensions, most preferred first.
const MODEL_EXTENSIONS: &[&str] = &["stl", "step", "obj"];

/// Structured render result. Failures are reported here, never as errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderOutcome {
    pub ok: bool,
    pub message: String,
    pub artifact_dir: PathBuf,
    /// Exported model files inside `artifact_dir`, most preferred format first.
    pub artifacts: Vec<PathBuf>,
}

/// Turns a candidate into an inspectable artifact.
pub trait Renderer: Send + Sync {
    fn render(&self, candidate: &str, target_dir: &Path, format: &str) -> RenderOutcome;
}

/// Renderer that appends an export snippet and executes the result in a sandbox.
pub struct ExportRenderer {
    sandbox: Arc<dyn Sandbox>,
    prompts: Arc<PromptEngine>,
    export_template: String,
    export_target: String,
    timeout: Duration,
}

impl ExportRenderer {
    pub fn new(sandbox: Arc<dyn Sandbox>, prompts: Arc<PromptEngine>) -> Self {
        Self {
            sandbox,
            prompts,
            export_template: DEFAULT_EXPORT_TEMPLATE.to_string(),
            export_target: "result".to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_export_template(mut self, template: impl Into<String>) -> Self {
        self.export_template = template.into();
        self
    }

    pub fn with_export_target(mut self, target: impl Into<String>) -> Self {
        self.export_target = target.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Candidate text with the export snippet appended.
    pub fn patch(&self, candidate: &str, format: &str) -> Result<String> {
        let file_name = format!("exported_model.{format}");
        let snippet = self.prompts.export_snippet(
            &self.export_template,
            format,
            &self.export_target,
            &file_name,
        )?;
        Ok(format!("{}\n\n{}\n", candidate.trim_end(), snippet.trim_end()))
    }

    fn try_render(&self, candidate: &str, target_dir: &Path, format: &str) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(target_dir)
            .with_context(|| format!("create render dir {}", target_dir.display()))?;
        let patched = self.patch(candidate, format)?;
        write_file(&target_dir.join(CODE_FILE), candidate.as_bytes())?;
        write_file(&target_dir.join(PATCHED_CODE_FILE), patched.as_bytes())?;

        let result = self.sandbox.execute(&patched, self.timeout);
        if !result.is_success() {
            return Err(anyhow!("{}: {}", result.status.as_str(), result.message));
        }

        let mut artifacts = Vec::new();
        for (name, bytes) in &result.produced_files {
            if RESERVED_NAMES.contains(&name.as_str()) {
                warn!(stage = "render", file = %name, "skipping produced file with a reserved name");
                continue;
            }
            let path = target_dir.join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
            }
            write_file(&path, bytes)?;
            if model_rank(&path).is_some() {
                artifacts.push(path);
            }
        }
        if artifacts.is_empty() {
            return Err(anyhow!("execution produced no model file"));
        }
        artifacts.sort_by_key(|path| model_rank(path));
        Ok(artifacts)
    }
}

impl Renderer for ExportRenderer {
    fn render(&self, candidate: &str, target_dir: &Path, format: &str) -> RenderOutcome {
        match self.try_render(candidate, target_dir, format) {
            Ok(artifacts) => {
                info!(stage = "render", artifacts = artifacts.len(), "rendered candidate");
                RenderOutcome {
                    ok: true,
                    message: format!("exported {} model file(s)", artifacts.len()),
                    artifact_dir: target_dir.to_path_buf(),
                    artifacts,
                }
            }
            Err(e) => {
                warn!(stage = "render", err = %e, "render failed");
                RenderOutcome {
                    ok: false,
                    message: format!("{e:#}"),
                    artifact_dir: target_dir.to_path_buf(),
                    artifacts: Vec::new(),
                }
            }
        }
    }
}

fn model_rank(path: &Path) -> Option<usize> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    MODEL_EXTENSIONS.iter().position(|known| *known == ext)
}

fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::core::types::ExecutionResult;
    use crate::test_support::FixedSandbox;

    fn renderer(result: ExecutionResult) -> (ExportRenderer, FixedSandbox) {
        let sandbox = FixedSandbox::new(result);
        let renderer = ExportRenderer::new(
            Arc::new(sandbox.clone()),
            Arc::new(PromptEngine::new().expect("templates")),
        );
        (renderer, sandbox)
    }

    #[test]
    fn patch_appends_default_export_snippet() {
        let (renderer, _) = renderer(ExecutionResult::success(String::new(), BTreeMap::new()));
        let patched = renderer.patch("result = Box(1, 1, 1)\n", "stl").expect("patch");
        assert_eq!(
            patched,
            "result = Box(1, 1, 1)\n\nfrom build123d import export_stl\n\
             export_stl(to_export=result, file_path=\"./exported_model.stl\")\n"
        );
    }

    #[test]
    fn successful_render_writes_code_and_artifacts() {
        let mut files = BTreeMap::new();
        files.insert("exported_model.stl".to_string(), b"solid".to_vec());
        files.insert("notes.txt".to_string(), b"n".to_vec());
        let (renderer, sandbox) = renderer(ExecutionResult::success(String::new(), files));
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("iteration_1");

        let outcome = renderer.render("result = 1", &target, "stl");

        assert!(outcome.ok, "{}", outcome.message);
        assert_eq!(outcome.artifacts, vec![target.join("exported_model.stl")]);
        assert!(target.join("code.py").is_file());
        assert!(target.join("code_with_export.py").is_file());
        assert!(target.join("notes.txt").is_file());
        assert!(sandbox.calls()[0].contains("export_stl"));
    }

    #[test]
    fn produced_files_never_replace_iteration_records() {
        let mut files = BTreeMap::new();
        files.insert("exported_model.stl".to_string(), b"solid".to_vec());
        files.insert("code.py".to_string(), b"clobbered".to_vec());
        files.insert("record.json".to_string(), b"clobbered".to_vec());
        files.insert("feedback.txt".to_string(), b"clobbered".to_vec());
        files.insert("sub/code.py".to_string(), b"nested".to_vec());
        let (renderer, _) = renderer(ExecutionResult::success(String::new(), files));
        let dir = tempfile::tempdir().expect("tempdir");

        let outcome = renderer.render("result = 1", dir.path(), "stl");

        assert!(outcome.ok, "{}", outcome.message);
        assert_eq!(
            fs::read_to_string(dir.path().join("code.py")).expect("code"),
            "result = 1"
        );
        assert!(!dir.path().join("record.json").exists());
        assert!(!dir.path().join("feedback.txt").exists());
        assert!(dir.path().join("sub/code.py").is_file());
    }

    #[test]
    fn execution_failure_is_a_structured_outcome() {
        let (renderer, _) = renderer(ExecutionResult::runtime_error("NameError: result"));
        let dir = tempfile::tempdir().expect("tempdir");

        let outcome = renderer.render("x = 1", dir.path(), "stl");

        assert!(!outcome.ok);
        assert!(outcome.message.contains("NameError"));
        assert!(outcome.artifacts.is_empty());
    }

    #[test]
    fn missing_model_file_fails_render() {
        let (renderer, _) = renderer(ExecutionResult::success(String::new(), BTreeMap::new()));
        let dir = tempfile::tempdir().expect("tempdir");
        let outcome = renderer.render("result = 1", dir.path(), "stl");
        assert!(!outcome.ok);
        assert!(outcome.message.contains("no model file"));
    }

    #[test]
    fn artifacts_prefer_stl() {
        let mut paths = vec![PathBuf::from("a.obj"), PathBuf::from("b.STL"), PathBuf::from("c.step")];
        paths.sort_by_key(|p| model_rank(p));
        assert_eq!(
            paths,
            vec![PathBuf::from("b.STL"), PathBuf::from("c.step"), PathBuf::from("a.obj")]
        );
    }
}
