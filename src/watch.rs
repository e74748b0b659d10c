//! Directory watcher. Reports when image files appear, vanish or change.
//!
//! notify::RecommendedWatcher runs callbacks on an internal thread.
//! DirWatcher bridges change notifications to the main thread via mpsc::channel.

use std::path::Path;
use std::sync::mpsc;

use anyhow::Result;
use log::trace;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::model::is_image_path;

pub struct DirWatcher {
    rx: mpsc::Receiver<()>,
    _watcher: RecommendedWatcher, // Drop stops watching
}

impl DirWatcher {
    /// Watch `dir` (NonRecursive) for image files being created, removed,
    /// renamed or rewritten.
    pub fn new(dir: &Path) -> Result<Self> {
        let canonical = dir.canonicalize()?;
        let (tx, rx) = mpsc::channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<notify::Event, notify::Error>| {
                let Ok(event) = res else {
                    return;
                };
                let relevant = matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(_)
                ) && event.paths.iter().any(|p| is_image_path(p));
                if relevant {
                    trace!("watch: {:?} {:?}", event.kind, event.paths);
                    let _ = tx.send(());
                }
            },
            notify::Config::default(),
        )?;
        watcher.watch(&canonical, RecursiveMode::NonRecursive)?;

        Ok(Self { rx, _watcher: watcher })
    }

    /// Return true if the directory has changed since last check (non-blocking).
    /// Multiple queued notifications are collapsed into a single true.
    pub fn has_changed(&self) -> bool {
        let mut changed = false;
        while self.rx.try_recv().is_ok() {
            changed = true;
        }
        changed
    }
}
