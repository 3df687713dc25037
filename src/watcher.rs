//! Session watcher: recursive filesystem observation feeding the indexing
//! service.
//!
//! On startup every existing file under the watched roots is reported as an
//! `Add`; live events map to `Add`/`Change`. Dot-prefixed path segments are
//! ignored except the known tool roots (`.claude`, `.cursor`, `.codex`,
//! `.opencode`). Paths can be added and removed without restarting the
//! observer thread.

use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use notify_debouncer_full::{new_debouncer, DebouncedEvent, FileIdMap};
use tokio::sync::mpsc;
use walkdir::WalkDir;

use crate::error::{EngramError, Result};
use crate::indexing::{FileEvent, IndexingService};

/// Hidden roots that stay visible to the watcher.
const ALLOWED_HIDDEN_ROOTS: &[&str] = &[".claude", ".cursor", ".codex", ".opencode"];

/// Default recursive scan depth.
pub const DEFAULT_SCAN_DEPTH: usize = 5;

/// Scans never go shallower than this.
pub const MIN_SCAN_DEPTH: usize = 3;

const DEBOUNCE_DURATION: Duration = Duration::from_millis(500);

/// One file for the indexing service.
#[derive(Debug, Clone)]
pub struct WatchedFile {
    pub path: PathBuf,
    pub event: FileEvent,
}

enum WatchControl {
    Watch(PathBuf),
    Unwatch(PathBuf),
}

/// Recursive multi-root filesystem watcher.
pub struct SessionWatcher {
    paths: Vec<PathBuf>,
    depth: usize,
    running: Arc<AtomicBool>,
    control_tx: Option<std::sync::mpsc::Sender<WatchControl>>,
}

impl SessionWatcher {
    pub fn new(paths: Vec<PathBuf>, depth: usize) -> Self {
        Self {
            paths,
            depth: depth.max(MIN_SCAN_DEPTH),
            running: Arc::new(AtomicBool::new(false)),
            control_tx: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Start the observer thread. The initial scan fires `Add` for every
    /// existing file before live events flow.
    pub fn start(&mut self) -> Result<mpsc::Receiver<WatchedFile>> {
        if self.is_running() {
            return Err(EngramError::Config("watcher already running".into()));
        }

        let (tx, rx) = mpsc::channel(1024);
        let (control_tx, control_rx) = std::sync::mpsc::channel();
        self.control_tx = Some(control_tx);
        self.running.store(true, Ordering::Relaxed);

        let paths = self.paths.clone();
        let depth = self.depth;
        let running = self.running.clone();

        std::thread::spawn(move || {
            if let Err(e) = run_watcher(paths, depth, tx, control_rx, running) {
                tracing::error!(error = %e, "session watcher stopped");
            }
        });

        Ok(rx)
    }

    /// Watch an additional root. Its existing files are scanned on the
    /// observer thread like at startup.
    pub fn add_path(&mut self, path: PathBuf) -> Result<()> {
        if self.paths.contains(&path) {
            return Ok(());
        }
        self.paths.push(path.clone());
        if let Some(tx) = &self.control_tx {
            tx.send(WatchControl::Watch(path))
                .map_err(|_| EngramError::Config("watcher thread has exited".into()))?;
        }
        Ok(())
    }

    /// Stop watching a root. Already-delivered events are not recalled.
    pub fn remove_path(&mut self, path: &Path) -> Result<()> {
        self.paths.retain(|p| p != path);
        if let Some(tx) = &self.control_tx {
            tx.send(WatchControl::Unwatch(path.to_path_buf()))
                .map_err(|_| EngramError::Config("watcher thread has exited".into()))?;
        }
        Ok(())
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        self.control_tx = None;
    }
}

impl Drop for SessionWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Drain watcher events into the indexing service. The indexer's own
/// suspension points keep this loop from blocking the observer thread.
pub async fn drive(indexer: Arc<IndexingService>, mut rx: mpsc::Receiver<WatchedFile>) {
    while let Some(file) = rx.recv().await {
        indexer.ingest_file(&file.path, file.event).await;
    }
    tracing::debug!("watcher channel closed; indexing drive loop done");
}

/// True when any path segment is dot-prefixed and not an allow-listed tool
/// root. The check is on each component's basename.
pub fn is_ignored(path: &Path) -> bool {
    path.components().any(|component| {
        let Component::Normal(name) = component else {
            return false;
        };
        let name = name.to_string_lossy();
        name.starts_with('.') && !ALLOWED_HIDDEN_ROOTS.contains(&name.as_ref())
    })
}

/// Observer thread body: initial scan, then debounced live events with
/// watch/unwatch control handling.
fn run_watcher(
    paths: Vec<PathBuf>,
    depth: usize,
    tx: mpsc::Sender<WatchedFile>,
    control_rx: std::sync::mpsc::Receiver<WatchControl>,
    running: Arc<AtomicBool>,
) -> Result<()> {
    let (debounce_tx, debounce_rx) = std::sync::mpsc::channel();
    let mut debouncer = new_debouncer(DEBOUNCE_DURATION, None, debounce_tx)
        .map_err(|e| EngramError::Config(format!("watcher init failed: {e}")))?;

    for path in &paths {
        scan_existing(path, depth, &tx);
        watch_root(&mut debouncer, path);
    }

    while running.load(Ordering::Relaxed) {
        while let Ok(control) = control_rx.try_recv() {
            match control {
                WatchControl::Watch(path) => {
                    scan_existing(&path, depth, &tx);
                    watch_root(&mut debouncer, &path);
                }
                WatchControl::Unwatch(path) => {
                    if let Err(e) = debouncer.watcher().unwatch(&path) {
                        tracing::warn!(path = %path.display(), error = %e, "unwatch failed");
                    }
                }
            }
        }

        match debounce_rx.recv_timeout(Duration::from_millis(500)) {
            Ok(Ok(events)) => {
                for event in events {
                    if let Some(file) = map_event(&event) {
                        if tx.blocking_send(file).is_err() {
                            return Ok(()); // consumer gone
                        }
                    }
                }
            }
            Ok(Err(errors)) => {
                for error in errors {
                    tracing::warn!(error = %error, "watcher event error");
                }
            }
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    Ok(())
}

type Debouncer = notify_debouncer_full::Debouncer<RecommendedWatcher, FileIdMap>;

fn watch_root(debouncer: &mut Debouncer, path: &Path) {
    if let Err(e) = debouncer.watcher().watch(path, RecursiveMode::Recursive) {
        tracing::warn!(path = %path.display(), error = %e, "watch failed");
    } else {
        tracing::info!(path = %path.display(), "watching");
    }
}

/// Walk a root and report every existing visible file as an `Add`.
fn scan_existing(root: &Path, depth: usize, tx: &mpsc::Sender<WatchedFile>) {
    let walker = WalkDir::new(root)
        .max_depth(depth)
        .into_iter()
        .filter_entry(|entry| {
            // Prune hidden directories at descent, same allow-list as
            // events. The watch root itself is exempt: the user chose it.
            if entry.depth() == 0 {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            !(name.starts_with('.') && !ALLOWED_HIDDEN_ROOTS.contains(&name.as_ref()))
        });

    for entry in walker.filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let file = WatchedFile {
            path: entry.into_path(),
            event: FileEvent::Add,
        };
        if tx.blocking_send(file).is_err() {
            return;
        }
    }
}

/// Map a debounced notify event to an ingest event. Removals are not
/// indexable and are dropped.
fn map_event(event: &DebouncedEvent) -> Option<WatchedFile> {
    let path = event.paths.first()?;
    if is_ignored(path) || !path.is_file() {
        return None;
    }

    let kind = match &event.kind {
        EventKind::Create(_) => FileEvent::Add,
        EventKind::Modify(_) => FileEvent::Change,
        _ => return None,
    };

    Some(WatchedFile {
        path: path.clone(),
        event: kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotfiles_are_ignored_except_tool_roots() {
        assert!(is_ignored(Path::new("/home/u/.ssh/id_rsa")));
        assert!(is_ignored(Path::new("/home/u/proj/.git/HEAD")));
        assert!(is_ignored(Path::new("/home/u/.hidden/notes.jsonl")));

        assert!(!is_ignored(Path::new(
            "/home/u/.claude/projects/p/session.jsonl"
        )));
        assert!(!is_ignored(Path::new("/home/u/.cursor/chat.json")));
        assert!(!is_ignored(Path::new("/home/u/.codex/run.json")));
        assert!(!is_ignored(Path::new("/home/u/.opencode/history/c.json")));
        assert!(!is_ignored(Path::new("/home/u/plain/file.jsonl")));

        // A disallowed hidden segment anywhere on the path hides the file.
        assert!(is_ignored(Path::new("/home/u/.config/app/.claude/s.jsonl")));
    }

    #[test]
    fn depth_is_clamped_to_minimum() {
        let watcher = SessionWatcher::new(vec![], 1);
        assert_eq!(watcher.depth, MIN_SCAN_DEPTH);
        let watcher = SessionWatcher::new(vec![], 7);
        assert_eq!(watcher.depth, 7);
    }

    fn watch_dir() -> tempfile::TempDir {
        // A non-hidden prefix: tempfile's default `.tmp` would trip the
        // dotfile filter on every contained path.
        tempfile::Builder::new()
            .prefix("engram-watch")
            .tempdir()
            .unwrap()
    }

    #[tokio::test]
    async fn initial_scan_reports_existing_visible_files() {
        let dir = watch_dir();
        let sessions = dir.path().join(".claude/projects/p");
        std::fs::create_dir_all(&sessions).unwrap();
        std::fs::write(sessions.join("one.jsonl"), "{}").unwrap();
        std::fs::write(sessions.join("two.jsonl"), "{}").unwrap();

        let hidden = dir.path().join(".git");
        std::fs::create_dir_all(&hidden).unwrap();
        std::fs::write(hidden.join("config"), "x").unwrap();

        let mut watcher = SessionWatcher::new(vec![dir.path().to_path_buf()], 5);
        let mut rx = watcher.start().unwrap();

        let mut seen = Vec::new();
        for _ in 0..2 {
            let file = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("scan should deliver files")
                .expect("channel open");
            assert_eq!(file.event, FileEvent::Add);
            seen.push(file.path);
        }

        let names: Vec<String> = seen
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert!(names.contains(&"one.jsonl".to_string()));
        assert!(names.contains(&"two.jsonl".to_string()));

        watcher.stop();
    }

    #[tokio::test]
    async fn double_start_is_rejected() {
        let dir = watch_dir();
        let mut watcher = SessionWatcher::new(vec![dir.path().to_path_buf()], 5);
        let _rx = watcher.start().unwrap();
        assert!(watcher.start().is_err());
        watcher.stop();
    }

    #[tokio::test]
    async fn add_path_scans_the_new_root() {
        let first = watch_dir();
        let second = watch_dir();
        std::fs::write(second.path().join("late.jsonl"), "{}").unwrap();

        let mut watcher = SessionWatcher::new(vec![first.path().to_path_buf()], 5);
        let mut rx = watcher.start().unwrap();

        watcher.add_path(second.path().to_path_buf()).unwrap();

        let file = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("added path should be scanned")
            .expect("channel open");
        assert_eq!(
            file.path.file_name().unwrap().to_string_lossy(),
            "late.jsonl"
        );

        watcher.stop();
    }
}
