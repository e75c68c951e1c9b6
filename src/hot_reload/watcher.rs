use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

#[cfg(feature = "native")]
use crossbeam_channel::{unbounded, Receiver};
#[cfg(feature = "native")]
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
#[cfg(feature = "native")]
use std::sync::Arc;

#[cfg(feature = "native")]
use super::error::{watch_error, HotReloadErrorContext, HotReloadResult};

/// Type of file change event
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEventType {
    Created,
    Modified,
    Deleted,
}

/// File watch event
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub event_type: WatchEventType,
    pub timestamp: Instant,
}

#[cfg(feature = "native")]
type DebounceMap = Arc<Mutex<FxHashMap<PathBuf, Instant>>>;

/// Drop events for a path seen less than `window` ago
#[cfg_attr(not(feature = "native"), allow(dead_code))]
fn debounce(map: &Mutex<FxHashMap<PathBuf, Instant>>, path: &Path, now: Instant, window: Duration) -> bool {
    let mut map = map.lock();
    if let Some(last) = map.get(path) {
        if now.duration_since(*last) < window {
            return false;
        }
    }
    map.insert(path.to_path_buf(), now);
    true
}

/// Shader directory watcher with debouncing
///
/// notify delivers events on its own thread; they are filtered and debounced there
/// and handed over through a channel. The main thread drains it with `poll_events`.
#[cfg(feature = "native")]
pub struct ShaderWatcher {
    watcher: RecommendedWatcher,
    rx: Receiver<WatchEvent>,
    debounce_map: DebounceMap,
    watched_paths: Vec<PathBuf>,
}

#[cfg(feature = "native")]
impl ShaderWatcher {
    pub fn new(debounce_ms: u64) -> HotReloadResult<Self> {
        Self::with_filter(debounce_ms, FileFilter::shaders())
    }

    pub fn with_filter(debounce_ms: u64, filter: FileFilter) -> HotReloadResult<Self> {
        let (tx, rx) = unbounded();
        let debounce_map: DebounceMap = Arc::new(Mutex::new(FxHashMap::default()));
        let debounce_map_clone = debounce_map.clone();
        let window = Duration::from_millis(debounce_ms);

        let watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    log::warn!("[ShaderWatcher] Watch error: {}", e);
                    return;
                }
            };

            let event_type = match event.kind {
                EventKind::Create(_) => WatchEventType::Created,
                EventKind::Modify(_) => WatchEventType::Modified,
                EventKind::Remove(_) => WatchEventType::Deleted,
                _ => return,
            };

            let now = Instant::now();
            for path in event.paths {
                if !filter.matches(&path) || !debounce(&debounce_map_clone, &path, now, window) {
                    continue;
                }
                let watch_event = WatchEvent {
                    path,
                    event_type: event_type.clone(),
                    timestamp: now,
                };
                if tx.send(watch_event).is_err() {
                    // Receiver dropped with the watcher
                    return;
                }
            }
        })
        .map_err(|e| watch_error(Path::new("<watcher>"), e))?;

        Ok(Self {
            watcher,
            rx,
            debounce_map,
            watched_paths: Vec::new(),
        })
    }

    /// Watch a directory recursively
    pub fn watch_dir(&mut self, path: impl AsRef<Path>) -> HotReloadResult<()> {
        let path = path.as_ref().to_path_buf();
        self.watcher
            .watch(&path, RecursiveMode::Recursive)
            .hot_reload_context(&path)?;
        log::info!("[ShaderWatcher::watch_dir] Watching {}", path.display());
        self.watched_paths.push(path);
        Ok(())
    }

    /// Stop watching a path
    pub fn unwatch(&mut self, path: impl AsRef<Path>) -> HotReloadResult<()> {
        let path = path.as_ref();
        self.watcher.unwatch(path).hot_reload_context(path)?;
        self.watched_paths.retain(|p| p != path);
        Ok(())
    }

    /// Drain pending events (non-blocking)
    pub fn poll_events(&self) -> Vec<WatchEvent> {
        self.rx.try_iter().collect()
    }

    /// Wait up to `timeout` for the next event
    pub fn wait_event(&self, timeout: Duration) -> Option<WatchEvent> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Distinct paths changed since the last poll, sorted
    pub fn changed_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.poll_events().into_iter().map(|e| e.path).collect();
        paths.sort();
        paths.dedup();
        paths
    }

    pub fn watched_paths(&self) -> &[PathBuf] {
        &self.watched_paths
    }

    pub fn clear_debounce(&self) {
        self.debounce_map.lock().clear();
    }
}

/// File filter for specific extensions
#[derive(Debug, Clone)]
pub struct FileFilter {
    extensions: Vec<String>,
}

impl FileFilter {
    pub fn new(extensions: Vec<&str>) -> Self {
        Self {
            extensions: extensions.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Shader sources and include files
    pub fn shaders() -> Self {
        Self::new(vec!["vert", "frag", "geom", "comp", "glsl"])
    }

    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.iter().any(|e| e == ext))
            .unwrap_or(false)
    }
}
