use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    chunker::ChunkConfig,
    errors::Error,
    reverse::DEFAULT_BUFFER_SIZE,
    trend::{SmoothingParams, DEFAULT_EMA_ALPHA, DEFAULT_SMA_WINDOW},
    utils::parse_duration,
    Result,
};

/// Typed configuration for the export tools.
///
/// Values come from the process environment, optionally seeded from a `.env`
/// file. The binary applies command-line overrides on top.
#[derive(Clone, Debug)]
pub struct Config {
    // Chunking
    pub chunk_count_min: usize,
    pub chunk_count_max: usize,
    pub chunk_time_min: Duration,
    pub chunk_time_max: Duration,

    // Reverse reading
    pub read_buffer: usize,

    // Trend smoothing
    pub sma_window: usize,
    pub ema_alpha: f64,

    // Chunk reports
    pub report_dir: PathBuf,
    pub report_json: bool,
    pub report_max_text: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_count_min: 10,
            chunk_count_max: 100,
            chunk_time_min: Duration::ZERO,
            chunk_time_max: Duration::from_secs(3600),
            read_buffer: DEFAULT_BUFFER_SIZE,
            sma_window: DEFAULT_SMA_WINDOW,
            ema_alpha: DEFAULT_EMA_ALPHA,
            report_dir: PathBuf::from("tmp/logs"),
            report_json: true,
            report_max_text: 500,
        }
    }
}

impl Config {
    /// Load from `.env` in the working directory plus the environment.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(".env"))
    }

    pub fn load_from(dotenv: &Path) -> Result<Self> {
        load_dotenv_if_present(dotenv);
        let d = Self::default();

        // Chunk bounds: four independent keys.
        let chunk_count_min = env_usize("TGX_CHUNK_COUNT_MIN")?.unwrap_or(d.chunk_count_min);
        let chunk_count_max = env_usize("TGX_CHUNK_COUNT_MAX")?.unwrap_or(d.chunk_count_max);
        let chunk_time_min = env_duration("TGX_CHUNK_TIME_MIN")?.unwrap_or(d.chunk_time_min);
        let chunk_time_max = env_duration("TGX_CHUNK_TIME_MAX")?.unwrap_or(d.chunk_time_max);

        let read_buffer = env_usize("TGX_READ_BUFFER")?.unwrap_or(d.read_buffer);

        let sma_window = env_usize("TGX_SMA_WINDOW")?.unwrap_or(d.sma_window);
        let ema_alpha = env_f64("TGX_EMA_ALPHA")?.unwrap_or(d.ema_alpha);

        let report_dir = env_path("TGX_REPORT_DIR").unwrap_or(d.report_dir);
        let report_json = env_bool("TGX_REPORT_JSON").unwrap_or(d.report_json);
        let report_max_text = env_usize("TGX_REPORT_MAX_TEXT")?.unwrap_or(d.report_max_text);

        Ok(Self {
            chunk_count_min,
            chunk_count_max,
            chunk_time_min,
            chunk_time_max,
            read_buffer,
            sma_window,
            ema_alpha,
            report_dir,
            report_json,
            report_max_text,
        })
    }

    /// Validated chunker bounds.
    pub fn chunk_config(&self) -> Result<ChunkConfig> {
        ChunkConfig::new(
            self.chunk_count_min,
            self.chunk_count_max,
            self.chunk_time_min,
            self.chunk_time_max,
        )
    }

    /// Validated smoothing parameters.
    pub fn smoothing(&self) -> Result<SmoothingParams> {
        SmoothingParams::new(self.sma_window, self.ema_alpha)
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.trim().is_empty())
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        env::set_var(key, unquote(v.trim()));
    }
}

fn unquote(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return &val[1..val.len() - 1];
    }
    val
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_usize(key: &str) -> Result<Option<usize>> {
    env_str(key)
        .map(|s| {
            s.trim()
                .parse::<usize>()
                .map_err(|_| Error::Config(format!("{key} must be a non-negative integer, got {s:?}")))
        })
        .transpose()
}

fn env_f64(key: &str) -> Result<Option<f64>> {
    env_str(key)
        .map(|s| {
            s.trim()
                .parse::<f64>()
                .map_err(|_| Error::Config(format!("{key} must be a number, got {s:?}")))
        })
        .transpose()
}

fn env_duration(key: &str) -> Result<Option<Duration>> {
    env_str(key)
        .map(|s| parse_duration(&s).map_err(|e| Error::Config(format!("{key}: {e}"))))
        .transpose()
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}
