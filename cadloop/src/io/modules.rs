//! Importable-module index used by dependency validation.
//!
//! The index is built once, when a loop is constructed, by probing the
//! configured interpreter for its builtin and standard-library module names
//! and its `sys.path`. Lookups afterwards only stat the filesystem; they never
//! spawn a process.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::io::process::run_command_with_timeout;
use crate::io::sandbox::Interpreter;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

const PROBE_SCRIPT: &str = r#"import json, sys
print(json.dumps({
    "path": [p for p in sys.path if p],
    "builtin": sorted(sys.builtin_module_names),
    "stdlib": sorted(getattr(sys, "stdlib_module_names", ())),
}))
"#;

/// Standard-library names assumed present when the interpreter cannot be probed.
const STDLIB_FALLBACK: &[&str] = &[
    "__future__", "abc", "argparse", "array", "ast", "asyncio", "base64", "bisect", "builtins",
    "calendar", "cmath", "collections", "concurrent", "contextlib", "copy", "csv", "ctypes",
    "dataclasses", "datetime", "decimal", "difflib", "enum", "errno", "fractions", "functools",
    "gc", "getopt", "glob", "gzip", "hashlib", "heapq", "hmac", "html", "http", "importlib",
    "inspect", "io", "itertools", "json", "logging", "math", "multiprocessing", "numbers",
    "operator", "os", "pathlib", "pickle", "platform", "pprint", "queue", "random", "re",
    "shutil", "signal", "socket", "sqlite3", "statistics", "string", "struct", "subprocess",
    "sys", "tempfile", "textwrap", "threading", "time", "timeit", "traceback", "types",
    "typing", "unittest", "urllib", "uuid", "warnings", "weakref", "xml", "zipfile", "zlib",
];

#[derive(Debug, Deserialize)]
struct Probe {
    path: Vec<PathBuf>,
    builtin: Vec<String>,
    stdlib: Vec<String>,
}

/// Known module names plus directories searched for third-party packages.
#[derive(Debug, Clone, Default)]
pub struct ModuleIndex {
    known: BTreeSet<String>,
    search_paths: Vec<PathBuf>,
}

impl ModuleIndex {
    /// Index containing only the fallback standard-library table.
    pub fn stdlib_only() -> Self {
        Self {
            known: STDLIB_FALLBACK.iter().map(|s| (*s).to_string()).collect(),
            search_paths: Vec::new(),
        }
    }

    /// Probe `interpreter` once. Falls back to [`ModuleIndex::stdlib_only`] when the probe fails.
    #[instrument(skip_all, fields(interpreter = %interpreter.program))]
    pub fn discover(interpreter: &Interpreter) -> Self {
        match probe(interpreter) {
            Ok(probe) => {
                info!(
                    builtin = probe.builtin.len(),
                    stdlib = probe.stdlib.len(),
                    search_paths = probe.path.len(),
                    "probed interpreter modules"
                );
                let mut index = Self::stdlib_only();
                index.known.extend(probe.builtin);
                index.known.extend(probe.stdlib);
                index.search_paths = probe.path;
                index
            }
            Err(e) => {
                warn!(err = %e, "interpreter probe failed, using builtin module table");
                Self::stdlib_only()
            }
        }
    }

    pub fn with_modules<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_search_paths<I>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
    {
        self.search_paths.extend(paths);
        self
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Whether the top-level module `name` can be imported.
    pub fn is_available(&self, name: &str) -> bool {
        self.known.contains(name)
            || self
                .search_paths
                .iter()
                .any(|dir| module_in_dir(dir, name))
    }

    /// The subset of `names` that cannot be resolved, in input order.
    pub fn missing<'a>(&self, names: &'a [String]) -> Vec<&'a str> {
        names
            .iter()
            .map(String::as_str)
            .filter(|name| !self.is_available(name))
            .collect()
    }
}

fn probe(interpreter: &Interpreter) -> Result<Probe> {
    let mut cmd = interpreter.command();
    cmd.arg("-c").arg(PROBE_SCRIPT);
    let output = run_command_with_timeout(cmd, None, PROBE_TIMEOUT, 4 * 1024 * 1024, false)
        .context("run module probe")?;
    if output.timed_out {
        return Err(anyhow!("module probe timed out"));
    }
    if !output.status.success() {
        return Err(anyhow!(
            "module probe failed with status {:?}: {}",
            output.status.code(),
            output.stderr_lossy().trim()
        ));
    }
    serde_json::from_slice(&output.stdout).context("parse module probe output")
}

fn module_in_dir(dir: &Path, name: &str) -> bool {
    if dir.join(name).is_dir() || dir.join(format!("{name}.py")).is_file() {
        return true;
    }
    let Ok(entries) = fs::read_dir(dir) else {
        return false;
    };
    let prefix = format!("{name}.");
    entries.flatten().any(|entry| {
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        let is_extension = file_name.ends_with(".so") || file_name.ends_with(".pyd");
        let matched = file_name.starts_with(&prefix) && is_extension;
        if matched {
            debug!(module = name, file = %file_name, "resolved extension module");
        }
        matched
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_table_knows_common_stdlib() {
        let index = ModuleIndex::stdlib_only();
        assert!(index.is_available("os"));
        assert!(index.is_available("json"));
        assert!(!index.is_available("definitely_not_a_module"));
    }

    #[test]
    fn search_paths_resolve_packages_modules_and_extensions() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir(dir.path().join("pkg")).expect("mkdir");
        fs::write(dir.path().join("single.py"), "").expect("write");
        fs::write(dir.path().join("fast.cpython-311-x86_64-linux-gnu.so"), "").expect("write");

        let index = ModuleIndex::default().with_search_paths([dir.path().to_path_buf()]);
        assert!(index.is_available("pkg"));
        assert!(index.is_available("single"));
        assert!(index.is_available("fast"));
        assert!(!index.is_available("missing"));
    }

    #[test]
    fn missing_preserves_order() {
        let index = ModuleIndex::stdlib_only().with_modules(["build123d"]);
        let names = vec![
            "zzz".to_string(),
            "os".to_string(),
            "build123d".to_string(),
            "aaa".to_string(),
        ];
        assert_eq!(index.missing(&names), vec!["zzz", "aaa"]);
    }

    #[test]
    fn failed_probe_falls_back_to_table() {
        let index = ModuleIndex::discover(&Interpreter::new("no-such-interpreter-xyz"));
        assert!(index.is_available("sys"));
        assert!(index.search_paths().is_empty());
    }
}
