//! Live filesystem monitoring.
//!
//! A thin wrapper around `notify` that converts raw filesystem
//! notifications into scan tasks, accumulates them over a bounded batch
//! window, optimizes each batch into a minimal task set, and dispatches
//! the result onto the scan engine. One consumer processes one batch at
//! a time; batches never overlap, and shutdown is cooperative between
//! batches.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{LibraryError, Result};
use crate::scanner::{LibraryScanner, is_comic_file, is_ignored};

/// Configuration knobs for event batching.
///
/// The batch window groups bursts of unrelated events; the modified
/// debounce suppresses duplicate editor saves per path. They serve
/// different purposes and are configured independently.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Bounded accumulation window opened by the first raw event.
    pub batch_window: Duration,
    /// Minimum re-fire interval for modified events on the same path.
    pub modified_debounce: Duration,
    /// Capacity of the raw task channel.
    pub channel_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            batch_window: Duration::from_secs(1),
            modified_debounce: Duration::from_secs(2),
            channel_capacity: 1024,
        }
    }
}

/// One unit of work derived from raw filesystem events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorTask {
    ScanFolder(PathBuf),
    ScanFile(PathBuf),
    Delete(PathBuf),
    Move { from: PathBuf, to: PathBuf },
}

/// Optimize a batch into a minimal, correctly ordered task set.
///
/// A folder scan covers every file/folder scan under it; a delete covers
/// every delete under it; moves are never merged or dropped. Dispatch
/// order is deletes, moves, folder scans (shallowest first), file scans.
pub fn optimize_tasks(tasks: Vec<MonitorTask>) -> Vec<MonitorTask> {
    if tasks.is_empty() {
        return tasks;
    }

    let mut folder_scans: BTreeMap<PathBuf, MonitorTask> = BTreeMap::new();
    let mut file_scans: BTreeMap<PathBuf, MonitorTask> = BTreeMap::new();
    let mut deletes: BTreeMap<PathBuf, MonitorTask> = BTreeMap::new();
    let mut moves = Vec::new();

    for task in tasks {
        match &task {
            MonitorTask::ScanFolder(path) => {
                folder_scans.insert(path.clone(), task);
            }
            MonitorTask::ScanFile(path) => {
                file_scans.insert(path.clone(), task);
            }
            MonitorTask::Delete(path) => {
                deletes.insert(path.clone(), task);
            }
            MonitorTask::Move { .. } => moves.push(task),
        }
    }

    // BTreeMap iterates parents before their children, so one pass with
    // an accepted-ancestors check is enough.
    let kept_folders = drop_covered(folder_scans);
    let kept_deletes = drop_covered(deletes);

    let kept_files: Vec<MonitorTask> = file_scans
        .into_values()
        .filter(|task| {
            let MonitorTask::ScanFile(path) = task else {
                return true;
            };
            !kept_folders
                .iter()
                .any(|(folder, _)| path.starts_with(folder))
        })
        .collect();

    let mut optimized = Vec::new();
    optimized.extend(kept_deletes.into_iter().map(|(_, task)| task));
    optimized.extend(moves);
    optimized.extend(kept_folders.into_iter().map(|(_, task)| task));
    optimized.extend(kept_files);
    optimized
}

/// Keep only tasks whose path is not under an already kept path.
fn drop_covered(tasks: BTreeMap<PathBuf, MonitorTask>) -> Vec<(PathBuf, MonitorTask)> {
    let mut kept: Vec<(PathBuf, MonitorTask)> = Vec::new();
    for (path, task) in tasks {
        let covered = kept
            .iter()
            .any(|(parent, _)| path != *parent && path.starts_with(parent));
        if !covered {
            kept.push((path, task));
        }
    }
    kept
}

/// Watches the library root and keeps the index in sync.
#[derive(Debug)]
pub struct LibraryMonitor {
    // Dropping the watcher stops the notify stream and closes the task
    // channel behind it.
    watcher: RecommendedWatcher,
    worker: JoinHandle<()>,
    cancel: CancellationToken,
}

impl LibraryMonitor {
    /// Attach a recursive watcher to the scanner's library root and start
    /// the single consumer task.
    pub fn start(
        scanner: Arc<LibraryScanner>,
        config: MonitorConfig,
    ) -> Result<Self> {
        let root = scanner.repository().library_root().to_path_buf();
        if !root.exists() {
            return Err(LibraryError::NotFound(format!(
                "library path does not exist: {}",
                root.display()
            )));
        }

        let (tx, rx) = mpsc::channel::<MonitorTask>(config.channel_capacity.max(1));
        let cancel = CancellationToken::new();

        let worker = tokio::spawn(run_worker(
            rx,
            Arc::clone(&scanner),
            config.clone(),
            cancel.clone(),
        ));

        let mut converter = EventConverter::new(
            scanner.ignore_patterns().to_vec(),
            config.modified_debounce,
        );
        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| match res {
                Ok(event) => {
                    for task in converter.convert(event) {
                        if tx.blocking_send(task).is_err() {
                            warn!("monitor channel closed, dropping event");
                        }
                    }
                }
                Err(err) => warn!("watch error: {err}"),
            },
            NotifyConfig::default(),
        )
        .map_err(|err| {
            LibraryError::Internal(format!("failed to create watcher: {err}"))
        })?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|err| {
                LibraryError::Internal(format!(
                    "failed to watch {}: {err}",
                    root.display()
                ))
            })?;

        info!("monitoring {}", root.display());
        Ok(Self {
            watcher,
            worker,
            cancel,
        })
    }

    /// Stop watching. The signal is honored between batches; an in-flight
    /// batch always runs to completion first.
    pub async fn shutdown(self) {
        drop(self.watcher);
        self.cancel.cancel();
        if let Err(err) = self.worker.await {
            warn!("monitor worker ended abnormally: {err}");
        }
    }
}

/// The batch cycle: idle on the channel, accumulate over the batch
/// window, optimize, dispatch, repeat.
async fn run_worker(
    mut rx: mpsc::Receiver<MonitorTask>,
    scanner: Arc<LibraryScanner>,
    config: MonitorConfig,
    cancel: CancellationToken,
) {
    loop {
        let first = tokio::select! {
            _ = cancel.cancelled() => break,
            task = rx.recv() => match task {
                Some(task) => task,
                None => break,
            },
        };

        let mut batch = vec![first];
        let deadline = Instant::now() + config.batch_window;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match timeout(remaining, rx.recv()).await {
                Ok(Some(task)) => batch.push(task),
                // Source closed or the window elapsed.
                Ok(None) => break,
                Err(_) => break,
            }
        }

        let raw = batch.len();
        let tasks = optimize_tasks(batch);
        debug!("dispatching {} tasks ({raw} raw events)", tasks.len());

        for task in tasks {
            if let Err(err) = dispatch(&scanner, &task).await {
                // One failed task never takes the rest of the batch down.
                error!("task {task:?} failed: {err}");
            }
        }

        if cancel.is_cancelled() {
            break;
        }
    }
    debug!("monitor worker stopped");
}

async fn dispatch(scanner: &LibraryScanner, task: &MonitorTask) -> Result<()> {
    match task {
        MonitorTask::ScanFolder(path) => scanner.scan_folder(path).await,
        MonitorTask::ScanFile(path) => scanner.scan_file(path).await,
        MonitorTask::Delete(path) => scanner.delete_path(path).await,
        MonitorTask::Move { from, to } => scanner.move_path(from, to).await,
    }
}

/// Turns raw notify events into tasks, filtering platform noise and
/// debouncing modified events per path.
struct EventConverter {
    ignore_patterns: Vec<String>,
    modified_debounce: Duration,
    last_modified: HashMap<PathBuf, Instant>,
}

impl EventConverter {
    fn new(ignore_patterns: Vec<String>, modified_debounce: Duration) -> Self {
        Self {
            ignore_patterns,
            modified_debounce,
            last_modified: HashMap::new(),
        }
    }

    fn ignored(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| is_ignored(name, &self.ignore_patterns))
    }

    fn convert(&mut self, event: Event) -> Vec<MonitorTask> {
        let Some(path) = event.paths.first().cloned() else {
            return Vec::new();
        };
        if self.ignored(&path) {
            return Vec::new();
        }

        match event.kind {
            EventKind::Create(_) => {
                if path.is_dir() {
                    vec![MonitorTask::ScanFolder(path)]
                } else if is_comic_file(&path) {
                    vec![MonitorTask::ScanFile(path)]
                } else {
                    Vec::new()
                }
            }
            EventKind::Remove(_) => vec![MonitorTask::Delete(path)],
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                match event.paths.get(1).cloned() {
                    Some(to) if !self.ignored(&to) => {
                        vec![MonitorTask::Move { from: path, to }]
                    }
                    Some(_) => Vec::new(),
                    // Rename pair without a destination: the entry is gone
                    // from its old path as far as the index is concerned.
                    None => vec![MonitorTask::Delete(path)],
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                vec![MonitorTask::Delete(path)]
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                if path.is_dir() {
                    vec![MonitorTask::ScanFolder(path)]
                } else if is_comic_file(&path) {
                    vec![MonitorTask::ScanFile(path)]
                } else {
                    Vec::new()
                }
            }
            EventKind::Modify(
                ModifyKind::Data(_) | ModifyKind::Metadata(_) | ModifyKind::Any,
            ) => self.modified(path),
            _ => Vec::new(),
        }
    }

    /// Per-path debounce for modified events, independent of the batch
    /// window: editors love saving the same file several times in a row.
    fn modified(&mut self, path: PathBuf) -> Vec<MonitorTask> {
        if path.is_dir() || !is_comic_file(&path) {
            return Vec::new();
        }

        let now = Instant::now();
        if let Some(last) = self.last_modified.get(&path)
            && now.duration_since(*last) < self.modified_debounce
        {
            return Vec::new();
        }
        self.last_modified.insert(path.clone(), now);

        // Opportunistically prune stale entries.
        let cutoff = self.modified_debounce * 2;
        self.last_modified
            .retain(|_, seen| now.duration_since(*seen) <= cutoff);

        vec![MonitorTask::ScanFile(path)]
    }
}
