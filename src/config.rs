use std::path::PathBuf;
use std::time::Duration;

use log::{debug, info};
use serde::Deserialize;

use crate::geometry::Viewport;
use crate::pipeline::{
    DEFAULT_BUFFER_WINDOW, DEFAULT_COLUMNS, DEFAULT_DEBOUNCE, DEFAULT_OVERSCAN, PipelineConfig,
};

pub const DEFAULT_DECODE_THREADS: usize = 4;
pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1000;
pub const DEFAULT_VIEWPORT_HEIGHT: u32 = 600;

// ---------------------------------------------------------------------------
// ConfigFile: deserialized from TOML (all fields optional)
// ---------------------------------------------------------------------------

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub columns: Option<usize>,
    pub decode_threads: Option<usize>,
    #[serde(default)]
    pub pipeline: PipelineConfigFile,
    #[serde(default)]
    pub viewport: ViewportConfigFile,
}

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct PipelineConfigFile {
    pub debounce_ms: Option<u64>,
    pub buffer_window_ms: Option<u64>,
    pub overscan: Option<usize>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct ViewportConfigFile {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

// ---------------------------------------------------------------------------
// Config: resolved (all fields concrete)
// ---------------------------------------------------------------------------

pub struct Config {
    pub decode_threads: usize,
    /// Column count lives in `pipeline.columns`.
    pub pipeline: PipelineConfig,
    pub viewport: Viewport,
}

impl ConfigFile {
    /// Merge CLI values (overwrites non-None fields).
    pub fn merge_cli(&mut self, columns: Option<usize>, width: Option<u32>, height: Option<u32>) {
        if let Some(v) = columns {
            debug!("config: CLI override columns={v}");
            self.columns = columns;
        }
        if let Some(v) = width {
            debug!("config: CLI override width={v}");
            self.viewport.width = width;
        }
        if let Some(v) = height {
            debug!("config: CLI override height={v}");
            self.viewport.height = height;
        }
    }

    /// Resolve to a Config by applying defaults to missing fields.
    pub fn resolve(self) -> Config {
        let config = Config {
            decode_threads: self.decode_threads.unwrap_or(DEFAULT_DECODE_THREADS).max(1),
            pipeline: PipelineConfig {
                debounce: self
                    .pipeline
                    .debounce_ms
                    .map_or(DEFAULT_DEBOUNCE, Duration::from_millis),
                buffer_window: self
                    .pipeline
                    .buffer_window_ms
                    .map_or(DEFAULT_BUFFER_WINDOW, Duration::from_millis),
                overscan: self.pipeline.overscan.unwrap_or(DEFAULT_OVERSCAN).max(1),
                columns: self.columns.unwrap_or(DEFAULT_COLUMNS).max(1),
            },
            viewport: Viewport::new(
                self.viewport.width.unwrap_or(DEFAULT_VIEWPORT_WIDTH),
                self.viewport.height.unwrap_or(DEFAULT_VIEWPORT_HEIGHT),
            ),
        };
        info!(
            "config: resolved columns={}, decode_threads={}, debounce={}ms, \
             buffer_window={}ms, overscan={}, viewport={}x{}",
            config.pipeline.columns,
            config.decode_threads,
            config.pipeline.debounce.as_millis(),
            config.pipeline.buffer_window.as_millis(),
            config.pipeline.overscan,
            config.viewport.width,
            config.viewport.height,
        );
        config
    }
}

/// Resolve the XDG config path for gridload.
fn config_path() -> Option<PathBuf> {
    let config_dir = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
    Some(config_dir.join("gridload").join("config.toml"))
}

/// Load config file. Returns `ConfigFile::default()` if no file exists.
/// Returns an error if the file exists but cannot be parsed.
pub fn load_config() -> anyhow::Result<ConfigFile> {
    let path = match config_path() {
        Some(p) => p,
        None => {
            info!("config: no HOME or XDG_CONFIG_HOME set, using defaults");
            return Ok(ConfigFile::default());
        }
    };
    debug!("config: looking for {}", path.display());
    match std::fs::read_to_string(&path) {
        Ok(text) => {
            info!("config: loaded from {}", path.display());
            let cfg: ConfigFile = toml::from_str(&text)
                .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))?;
            Ok(cfg)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("config: {} not found, using defaults", path.display());
            Ok(ConfigFile::default())
        }
        Err(e) => Err(anyhow::anyhow!("failed to read {}: {e}", path.display())),
    }
}
