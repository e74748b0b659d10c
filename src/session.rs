//! Headless grid session: a directory-backed host plus a real-clock control
//! loop for the pipeline.
//!
//! The loop never sleeps blindly. It waits on the pipeline's completion
//! channel until the next timer deadline, so a finished decode wakes it up
//! immediately.

use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use log::debug;

use crate::cache::TileState;
use crate::geometry::{Rect, TileGeometry, Viewport, VisibleRange};
use crate::model::DirectoryModel;
use crate::pipeline::{Host, LoadPipeline};

/// Upper bound on a single wait, so a loop with no deadline still checks
/// its overall timeout.
const POLL_CAP: Duration = Duration::from_millis(100);

pub struct GridSession {
    model: DirectoryModel,
    viewport: Viewport,
    repaints: Vec<Rect>,
}

/// What the viewport shows after the pipeline settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub scroll_y: u32,
    pub range: VisibleRange,
    pub loaded: usize,
    pub failed: usize,
    pub not_loaded: usize,
    pub repaints: Vec<Rect>,
}

impl GridSession {
    pub fn new(model: DirectoryModel, viewport: Viewport) -> Self {
        Self {
            model,
            viewport,
            repaints: Vec::new(),
        }
    }

    pub fn model(&self) -> &DirectoryModel {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut DirectoryModel {
        &mut self.model
    }

    /// Scroll to `y`, clamped to the scrollable extent. Returns the offset
    /// actually applied.
    pub fn scroll_to(&mut self, y: u32, columns: usize) -> u32 {
        let max = TileGeometry::new(self.viewport, columns)
            .map_or(0, |g| g.max_scroll(self.model.len()));
        self.viewport.scroll_y = y.min(max);
        self.viewport.scroll_y
    }

    pub fn take_repaints(&mut self) -> Vec<Rect> {
        std::mem::take(&mut self.repaints)
    }

    /// Summarize what the paint path would draw right now.
    pub fn report(&mut self, pipeline: &mut LoadPipeline) -> Report {
        let range = TileGeometry::new(self.viewport, pipeline.columns())
            .map_or(VisibleRange::EMPTY, |g| g.visible_range(self.model.len()));
        let (mut loaded, mut failed, mut not_loaded) = (0, 0, 0);
        for index in range.indices() {
            let Some(key) = self.model.key(index) else {
                continue;
            };
            match pipeline.probe(&key) {
                TileState::Loaded(_) => loaded += 1,
                TileState::Failed => failed += 1,
                TileState::NotLoaded => not_loaded += 1,
            }
        }
        Report {
            scroll_y: self.viewport.scroll_y,
            range,
            loaded,
            failed,
            not_loaded,
            repaints: self.take_repaints(),
        }
    }
}

impl Host for GridSession {
    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn row_count(&self) -> usize {
        self.model.len()
    }

    fn key_for_index(&self, index: usize) -> Option<String> {
        self.model.key(index)
    }

    fn repaint(&mut self, rect: Rect) {
        self.repaints.push(rect);
    }
}

/// Drive `pipeline` on the real clock until it is idle.
pub fn run_until_idle(
    pipeline: &mut LoadPipeline,
    host: &mut dyn Host,
    timeout: Duration,
) -> Result<()> {
    let started = Instant::now();
    loop {
        let now = Instant::now();
        pipeline.tick(now, host);
        if pipeline.is_idle() {
            debug!(
                "session: idle after {:.1}ms",
                started.elapsed().as_secs_f64() * 1000.0
            );
            return Ok(());
        }
        let elapsed = now.duration_since(started);
        if elapsed >= timeout {
            bail!(
                "pipeline did not settle within {}ms (state {:?}, {} pending)",
                timeout.as_millis(),
                pipeline.state(),
                pipeline.pending_tasks()
            );
        }
        let wait = pipeline
            .next_deadline()
            .map_or(POLL_CAP, |d| d.saturating_duration_since(now))
            .min(POLL_CAP)
            .min(timeout - elapsed);
        pipeline.wait_for_completion(wait);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{Image, ImageSource, LoadError};
    use crate::pipeline::{Executor, Job, PipelineConfig};
    use image::{DynamicImage, RgbaImage};
    use std::sync::Arc;

    struct InlineExecutor;

    impl Executor for InlineExecutor {
        fn execute(&self, job: Job) {
            job();
        }
    }

    fn session_with(
        name: &str,
        count: usize,
        viewport: Viewport,
    ) -> (GridSession, std::path::PathBuf) {
        let dir =
            std::env::temp_dir().join(format!("gridload-session-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        for i in 0..count {
            std::fs::write(dir.join(format!("{i:03}.png")), b"stub").unwrap();
        }
        let model = DirectoryModel::scan(&dir).unwrap();
        (GridSession::new(model, viewport), dir)
    }

    fn fast_pipeline() -> LoadPipeline {
        let source: Arc<dyn ImageSource> = Arc::new(|key: &str| -> Result<Image, LoadError> {
            if key.ends_with("003.png") {
                return Err(LoadError::Empty {
                    key: key.to_string(),
                });
            }
            Ok(Image::new(DynamicImage::ImageRgba8(RgbaImage::new(1, 1))))
        });
        let config = PipelineConfig {
            debounce: Duration::from_millis(10),
            buffer_window: Duration::from_millis(10),
            ..Default::default()
        };
        LoadPipeline::new(config, source, Arc::new(InlineExecutor))
    }

    #[test]
    fn settles_and_reports_visible_tiles() {
        let (mut session, dir) = session_with("settle", 12, Viewport::new(500, 200));
        let mut pipeline = fast_pipeline();
        pipeline.viewport_changed(Instant::now(), session.viewport());
        run_until_idle(&mut pipeline, &mut session, Duration::from_secs(5)).unwrap();

        let report = session.report(&mut pipeline);
        assert_eq!(report.range, VisibleRange::new(0, 10));
        assert_eq!(report.loaded, 9);
        assert_eq!(report.failed, 1);
        assert_eq!(report.not_loaded, 0);
        assert_eq!(report.repaints, [Rect::new(0, 0, 500, 200)]);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn scroll_is_clamped_to_content() {
        let (mut session, dir) = session_with("clamp", 12, Viewport::new(500, 200));
        assert_eq!(session.scroll_to(1000, 5), 100);
        assert_eq!(session.scroll_to(40, 5), 40);
        assert_eq!(session.scroll_to(40, 0), 0);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn idle_pipeline_returns_immediately() {
        let (mut session, dir) = session_with("idle", 3, Viewport::new(300, 100));
        let mut pipeline = fast_pipeline();
        run_until_idle(&mut pipeline, &mut session, Duration::from_millis(1)).unwrap();
        assert_eq!(pipeline.stats().generations, 0);
        std::fs::remove_dir_all(&dir).ok();
    }
}
