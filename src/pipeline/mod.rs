//! Visibility-driven image loading.
//!
//! State machine, driven from one control thread:
//!
//! ```text
//!   Idle ──trigger──▶ PendingDebounce ──debounce expires──▶ Running(g)
//!    ▲                  ▲ (re-trigger restarts the timer)     │ result lands
//!    │                  │                                     ▼
//!    └── batch drained ─┴──────────────────────────────── Draining(g)
//! ```
//!
//! When the debounce fires, the visible range is snapshotted, every visible
//! key is `take`n out of the cache and becomes a load task tagged with a new
//! generation. Tasks whose taken entry is already resolved complete at once;
//! the rest go to the [`Executor`]. Results come back over an mpsc channel
//! and are buffered for one window before being applied together: cache
//! insert, then a single repaint of the union of their tiles.
//!
//! A newer generation makes older results no-ops. Decodes already running
//! are left alone and their results dropped on arrival; queued decodes that
//! have not started check the published generation and skip the work.
//!
//! Every time-dependent call takes `now` explicitly, so the control loop
//! decides what clock to use. See [`crate::session`] for the real-clock loop.

pub mod executor;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use log::{debug, trace, warn};

use crate::cache::{ImageCache, Resolved, TileState};
use crate::decode::ImageSource;
use crate::geometry::{Rect, TileGeometry, Viewport, VisibleRange};

pub use executor::{DecodePool, Executor, Job};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);
pub const DEFAULT_BUFFER_WINDOW: Duration = Duration::from_millis(250);
pub const DEFAULT_OVERSCAN: usize = 5;
pub const DEFAULT_COLUMNS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Quiet period after the last trigger before a snapshot is taken.
    pub debounce: Duration,
    /// How long completed results are collected before being applied.
    pub buffer_window: Duration,
    /// Cache capacity as a multiple of the visible tile count.
    pub overscan: usize,
    pub columns: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            buffer_window: DEFAULT_BUFFER_WINDOW,
            overscan: DEFAULT_OVERSCAN,
            columns: DEFAULT_COLUMNS,
        }
    }
}

/// The view that owns the grid.
///
/// Called only from the control thread.
pub trait Host {
    /// Current viewport size and scroll position.
    fn viewport(&self) -> Viewport;
    fn row_count(&self) -> usize;
    /// Image key of the item at `index`, if it has one.
    fn key_for_index(&self, index: usize) -> Option<String>;
    /// Redraw `rect` (viewport coordinates).
    fn repaint(&mut self, rect: Rect);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    PendingDebounce,
    /// Tasks in flight, nothing buffered yet.
    Running(u64),
    /// Results buffered, waiting for the window to close.
    Draining(u64),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
    pub generations: u64,
    /// Tasks sent to the executor (reused entries are not counted).
    pub dispatched: u64,
    pub reused: u64,
    pub applied: u64,
    pub stale_dropped: u64,
    pub repaints: u64,
}

/// One item to resolve for the current snapshot.
#[derive(Debug)]
pub struct LoadTask {
    pub index: usize,
    pub key: String,
    /// Entry taken out of the cache, if any.
    pub existing: Option<Resolved>,
}

impl LoadTask {
    /// The entry taken from the cache, if it can stand in for a decode.
    ///
    /// Failures count as resolved so broken files are not retried on every
    /// scroll.
    fn into_reusable(self) -> Result<(usize, String, Resolved), (usize, String)> {
        match self.existing {
            Some(Resolved::Loaded(image)) if !image.is_empty() => {
                Ok((self.index, self.key, Resolved::Loaded(image)))
            }
            Some(failed @ Resolved::Failed(_)) => Ok((self.index, self.key, failed)),
            _ => Err((self.index, self.key)),
        }
    }
}

struct Completion {
    generation: u64,
    index: usize,
    key: String,
    outcome: Resolved,
}

struct ActiveBatch {
    generation: u64,
    pending: usize,
    buffer: Vec<Completion>,
    window_closes: Option<Instant>,
}

pub struct LoadPipeline {
    config: PipelineConfig,
    cache: ImageCache,
    source: Arc<dyn ImageSource>,
    executor: Arc<dyn Executor>,
    generation: u64,
    /// Generation visible to decode workers.
    published: Arc<AtomicU64>,
    debounce_until: Option<Instant>,
    active: Option<ActiveBatch>,
    tx: mpsc::Sender<Completion>,
    rx: mpsc::Receiver<Completion>,
    inbox: Vec<Completion>,
    stats: PipelineStats,
}

impl LoadPipeline {
    pub fn new(
        config: PipelineConfig,
        source: Arc<dyn ImageSource>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            config,
            cache: ImageCache::new(0),
            source,
            executor,
            generation: 0,
            published: Arc::new(AtomicU64::new(0)),
            debounce_until: None,
            active: None,
            tx,
            rx,
            inbox: Vec::new(),
            stats: PipelineStats::default(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cache(&self) -> &ImageCache {
        &self.cache
    }

    pub fn columns(&self) -> usize {
        self.config.columns
    }

    /// Paint-path probe. `NotLoaded` means draw a placeholder.
    pub fn probe(&mut self, key: &str) -> TileState<'_> {
        self.cache.state(key)
    }

    pub fn state(&self) -> PipelineState {
        if self.debounce_until.is_some() {
            return PipelineState::PendingDebounce;
        }
        match &self.active {
            None => PipelineState::Idle,
            Some(batch) if batch.buffer.is_empty() => PipelineState::Running(batch.generation),
            Some(batch) => PipelineState::Draining(batch.generation),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state() == PipelineState::Idle
    }

    /// Tasks of the current generation that have not reported back.
    pub fn pending_tasks(&self) -> usize {
        self.active.as_ref().map_or(0, |b| b.pending)
    }

    /// Earliest moment `tick` has timer work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        let window = self.active.as_ref().and_then(|b| b.window_closes);
        match (self.debounce_until, window) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    // -----------------------------------------------------------------------
    // Triggers
    // -----------------------------------------------------------------------

    /// Visibility may have changed. Restarts the debounce timer.
    pub fn notify(&mut self, now: Instant) {
        trace!("trigger: debounce restarted");
        self.debounce_until = Some(now + self.config.debounce);
    }

    /// The viewport scrolled.
    pub fn scrolled(&mut self, now: Instant) {
        self.notify(now);
    }

    /// The viewport was resized: capacity changes with it.
    pub fn viewport_changed(&mut self, now: Instant, viewport: Viewport) {
        self.update_capacity(viewport);
        self.notify(now);
    }

    /// The backing list was replaced or reset. Drops every cached entry.
    pub fn reset(&mut self, now: Instant, viewport: Viewport) {
        debug!("reset: clearing {} cached entries", self.cache.len());
        self.cache.clear();
        self.update_capacity(viewport);
        self.notify(now);
    }

    pub fn set_column_count(&mut self, columns: usize, now: Instant, viewport: Viewport) {
        if columns == 0 {
            warn!("column count 0: grid will show nothing");
        }
        debug!("columns: {} -> {columns}", self.config.columns);
        self.config.columns = columns;
        self.reset(now, viewport);
    }

    fn update_capacity(&mut self, viewport: Viewport) {
        let visible = TileGeometry::new(viewport, self.config.columns)
            .map_or(0, |g| g.visible_capacity());
        let max_cost = visible.saturating_mul(self.config.overscan);
        if max_cost != self.cache.capacity() {
            debug!(
                "cache: capacity {} -> {max_cost} ({visible} visible tiles)",
                self.cache.capacity()
            );
            self.cache.set_capacity(max_cost);
        }
    }

    // -----------------------------------------------------------------------
    // Control loop
    // -----------------------------------------------------------------------

    /// Advance the state machine to `now`.
    pub fn tick(&mut self, now: Instant, host: &mut dyn Host) {
        while let Ok(completion) = self.rx.try_recv() {
            self.inbox.push(completion);
        }
        self.accept(now);

        if self
            .active
            .as_ref()
            .and_then(|b| b.window_closes)
            .is_some_and(|closes| closes <= now)
        {
            self.flush(host);
        }

        if self.debounce_until.is_some_and(|until| until <= now) {
            self.debounce_until = None;
            self.start_generation(host);
        }
    }

    /// Block until a result arrives or `timeout` passes. Returns whether a
    /// result arrived; it is processed by the next `tick`.
    pub fn wait_for_completion(&mut self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(completion) => {
                self.inbox.push(completion);
                true
            }
            Err(_) => false,
        }
    }

    fn accept(&mut self, now: Instant) {
        for completion in self.inbox.drain(..) {
            match self.active.as_mut() {
                Some(batch) if batch.generation == completion.generation => {
                    batch.pending = batch.pending.saturating_sub(1);
                    batch.buffer.push(completion);
                    if batch.window_closes.is_none() {
                        batch.window_closes = Some(now + self.config.buffer_window);
                    }
                }
                _ => {
                    trace!(
                        "generation {}: dropping stale result for {}",
                        completion.generation, completion.key
                    );
                    self.stats.stale_dropped += 1;
                }
            }
        }
    }

    fn start_generation(&mut self, host: &mut dyn Host) {
        self.generation += 1;
        let generation = self.generation;
        self.published.store(generation, Ordering::Release);
        self.stats.generations += 1;

        if let Some(old) = self.active.take() {
            debug!(
                "generation {}: superseded ({} pending, {} buffered)",
                old.generation,
                old.pending,
                old.buffer.len()
            );
            self.stats.stale_dropped += old.buffer.len() as u64;
        }

        let viewport = host.viewport();
        self.update_capacity(viewport);
        let range = TileGeometry::new(viewport, self.config.columns)
            .map_or(VisibleRange::EMPTY, |g| g.visible_range(host.row_count()));

        let tasks: Vec<LoadTask> = range
            .indices()
            .filter_map(|index| {
                let key = host.key_for_index(index)?;
                let existing = self.cache.take(&key);
                Some(LoadTask {
                    index,
                    key,
                    existing,
                })
            })
            .collect();

        debug!(
            "generation {generation}: range {}..{}, {} tasks",
            range.first,
            range.end,
            tasks.len()
        );
        if tasks.is_empty() {
            return;
        }

        self.active = Some(ActiveBatch {
            generation,
            pending: tasks.len(),
            buffer: Vec::new(),
            window_closes: None,
        });
        for task in tasks {
            self.dispatch(generation, task);
        }
    }

    fn dispatch(&mut self, generation: u64, task: LoadTask) {
        let (index, key) = match task.into_reusable() {
            Ok((index, key, outcome)) => {
                self.stats.reused += 1;
                let _ = self.tx.send(Completion {
                    generation,
                    index,
                    key,
                    outcome,
                });
                return;
            }
            Err(miss) => miss,
        };

        self.stats.dispatched += 1;
        let tx = self.tx.clone();
        let source = Arc::clone(&self.source);
        let published = Arc::clone(&self.published);
        self.executor.execute(Box::new(move || {
            if published.load(Ordering::Acquire) != generation {
                trace!("generation {generation}: skipping {key}, superseded before start");
                return;
            }
            // A panicking decoder still owes the batch its completion.
            let outcome = match panic::catch_unwind(AssertUnwindSafe(|| source.load(&key))) {
                Ok(Ok(image)) => Resolved::Loaded(image),
                Ok(Err(e)) => {
                    debug!("decode failed: {e}");
                    Resolved::Failed(e.to_string())
                }
                Err(_) => {
                    warn!("decode panicked: {key}");
                    Resolved::Failed("decoder panicked".into())
                }
            };
            let _ = tx.send(Completion {
                generation,
                index,
                key,
                outcome,
            });
        }));
    }

    /// Apply everything buffered for the current generation.
    fn flush(&mut self, host: &mut dyn Host) {
        let Some(batch) = self.active.as_mut() else {
            return;
        };
        let buffer = std::mem::take(&mut batch.buffer);
        batch.window_closes = None;
        let generation = batch.generation;
        let done = batch.pending == 0;

        let viewport = host.viewport();
        let geometry = TileGeometry::new(viewport, self.config.columns);
        let mut damage = Rect::default();
        let count = buffer.len();
        for completion in buffer {
            if let Some(g) = &geometry {
                damage = damage.union(&g.rect_for_index(completion.index));
            }
            self.cache.insert(completion.key, completion.outcome);
        }
        self.stats.applied += count as u64;

        if damage.intersects(&viewport.rect()) {
            trace!("generation {generation}: repaint {damage:?}");
            host.repaint(damage);
            self.stats.repaints += 1;
        }
        debug!(
            "generation {generation}: applied {count} results, cache {}/{}",
            self.cache.total_cost(),
            self.cache.capacity()
        );

        if done {
            debug!("generation {generation}: complete");
            self.active = None;
        }
    }
}
