//! Append-only run history under the output directory.
//!
//! Records are handed to a background writer thread; callers never wait for
//! disk I/O and never read records back. Write failures are logged and dropped.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, warn};

use crate::core::types::{DesignGoal, RefinedDesignGoal};

/// Outcome of one design iteration as recorded in history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationStage {
    NoCandidate,
    RenderFailed,
    FeedbackFailed,
    Judged,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterationRecord {
    pub goal: String,
    /// One-based iteration number, matching the `iteration_<n>` directory.
    pub iteration: usize,
    pub stage: IterationStage,
    pub candidate: Option<String>,
    pub feedback: Option<String>,
    pub score: Option<f64>,
    pub adopted: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HistoryEvent {
    InitialGoal(DesignGoal),
    RefinedGoal(RefinedDesignGoal),
    Iteration(IterationRecord),
}

/// Fire-and-forget sink for run history.
pub trait HistorySink: Send + Sync {
    fn record(&self, event: HistoryEvent);
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullHistory;

impl HistorySink for NullHistory {
    fn record(&self, _event: HistoryEvent) {}
}

pub const CODE_FILE: &str = "code.py";
pub const FEEDBACK_FILE: &str = "feedback.txt";
pub const RECORD_FILE: &str = "record.json";

/// Paths for one iteration directory.
#[derive(Debug, Clone)]
pub struct IterationPaths {
    pub dir: PathBuf,
    pub code_path: PathBuf,
    pub feedback_path: PathBuf,
    pub record_path: PathBuf,
}

impl IterationPaths {
    pub fn new(root: &Path, iteration: usize) -> Self {
        let dir = root.join(format!("iteration_{iteration}"));
        Self {
            code_path: dir.join(CODE_FILE),
            feedback_path: dir.join(FEEDBACK_FILE),
            record_path: dir.join(RECORD_FILE),
            dir,
        }
    }
}

/// Writes history into `root` from a background thread.
pub struct IterationLog {
    sender: Mutex<Option<Sender<HistoryEvent>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl IterationLog {
    pub fn spawn(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let (tx, rx) = mpsc::channel::<HistoryEvent>();
        let worker = thread::spawn(move || {
            for event in rx {
                if let Err(e) = write_event(&root, &event) {
                    warn!(err = %e, "failed to write history record");
                }
            }
        });
        Self {
            sender: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Stop accepting records and wait for pending writes.
    pub fn close(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        let worker = self.worker.lock().ok().and_then(|mut w| w.take());
        if let Some(worker) = worker
            && worker.join().is_err()
        {
            warn!("history writer thread panicked");
        }
    }
}

impl HistorySink for IterationLog {
    fn record(&self, event: HistoryEvent) {
        let Ok(sender) = self.sender.lock() else {
            return;
        };
        match sender.as_ref() {
            Some(tx) => {
                if tx.send(event).is_err() {
                    warn!("history writer is gone, dropping record");
                }
            }
            None => debug!("history closed, dropping record"),
        }
    }
}

impl Drop for IterationLog {
    fn drop(&mut self) {
        self.close();
    }
}

fn write_event(root: &Path, event: &HistoryEvent) -> Result<()> {
    fs::create_dir_all(root).with_context(|| format!("create {}", root.display()))?;
    match event {
        HistoryEvent::InitialGoal(goal) => write_json(&root.join("initial_design_goal.json"), goal),
        HistoryEvent::RefinedGoal(goal) => write_json(&root.join("refined_design_goal.json"), goal),
        HistoryEvent::Iteration(record) => {
            let paths = IterationPaths::new(root, record.iteration);
            fs::create_dir_all(&paths.dir)
                .with_context(|| format!("create iteration dir {}", paths.dir.display()))?;
            if let Some(code) = &record.candidate {
                write_text(&paths.code_path, code)?;
            }
            if let Some(feedback) = &record.feedback {
                write_text(&paths.feedback_path, feedback)?;
            }
            write_json(&paths.record_path, record)
        }
    }
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    write_text(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iteration_paths_are_stable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = IterationPaths::new(temp.path(), 3);
        assert!(paths.dir.ends_with("iteration_3"));
        assert!(paths.code_path.ends_with("iteration_3/code.py"));
        assert!(paths.feedback_path.ends_with("feedback.txt"));
        assert!(paths.record_path.ends_with("record.json"));
    }

    #[test]
    fn writes_goals_and_iterations_after_close() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = IterationLog::spawn(temp.path());
        let goal = DesignGoal::new("a stool");

        log.record(HistoryEvent::InitialGoal(goal.clone()));
        log.record(HistoryEvent::RefinedGoal(RefinedDesignGoal::unrefined(&goal)));
        log.record(HistoryEvent::Iteration(IterationRecord {
            goal: "a stool".to_string(),
            iteration: 1,
            stage: IterationStage::Judged,
            candidate: Some("result = 1\n".to_string()),
            feedback: Some("legs too short".to_string()),
            score: Some(0.4),
            adopted: true,
        }));
        log.close();

        assert!(temp.path().join("initial_design_goal.json").is_file());
        assert!(temp.path().join("refined_design_goal.json").is_file());
        let paths = IterationPaths::new(temp.path(), 1);
        assert_eq!(
            fs::read_to_string(&paths.code_path).expect("code"),
            "result = 1\n"
        );
        assert_eq!(
            fs::read_to_string(&paths.feedback_path).expect("feedback"),
            "legs too short"
        );
        let record: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&paths.record_path).expect("record"))
                .expect("json");
        assert_eq!(record["stage"], "judged");
        assert_eq!(record["adopted"], true);
    }

    #[test]
    fn records_after_close_are_dropped() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = IterationLog::spawn(temp.path().join("out"));
        log.close();
        log.record(HistoryEvent::InitialGoal(DesignGoal::new("x")));
        assert!(!temp.path().join("out").exists());
    }
}
