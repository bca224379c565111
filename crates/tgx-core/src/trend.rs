//! Inter-arrival smoothing for activity trend plots.

use chrono::{DateTime, FixedOffset};

use crate::{errors::Error, Result};

pub const DEFAULT_SMA_WINDOW: usize = 10;
pub const DEFAULT_EMA_ALPHA: f64 = 0.1;

/// Smoothing parameters: SMA window `W` and EMA factor `alpha`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SmoothingParams {
    window: usize,
    alpha: f64,
}

impl Default for SmoothingParams {
    fn default() -> Self {
        Self {
            window: DEFAULT_SMA_WINDOW,
            alpha: DEFAULT_EMA_ALPHA,
        }
    }
}

impl SmoothingParams {
    pub fn new(window: usize, alpha: f64) -> Result<Self> {
        if window == 0 {
            return Err(Error::InvalidArgument(
                "SMA window must be at least 1".to_string(),
            ));
        }
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(Error::InvalidArgument(format!(
                "EMA alpha must be in (0, 1], got {alpha}"
            )));
        }
        Ok(Self { window, alpha })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }
}

/// Derived series, all index-aligned with the input timestamps.
#[derive(Clone, Debug, PartialEq)]
pub struct SmoothedSeries {
    /// Seconds since the first timestamp.
    pub elapsed: Vec<f64>,
    /// Seconds since the previous timestamp; `gaps[0]` is 0.
    pub gaps: Vec<f64>,
    pub sma: Vec<f64>,
    pub ema: Vec<f64>,
}

impl SmoothedSeries {
    pub fn len(&self) -> usize {
        self.gaps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gaps.is_empty()
    }
}

/// Compute inter-arrival gaps for `timestamps` and smooth them.
pub fn analyze(
    timestamps: &[DateTime<FixedOffset>],
    params: SmoothingParams,
) -> Result<SmoothedSeries> {
    let Some(first) = timestamps.first() else {
        return Err(Error::InvalidArgument(
            "trend analysis needs at least one timestamp".to_string(),
        ));
    };

    let elapsed: Vec<f64> = timestamps
        .iter()
        .map(|t| (*t - *first).num_milliseconds() as f64 / 1000.0)
        .collect();
    let gaps = inter_arrival_gaps(&elapsed);
    let sma = simple_moving_average(&gaps, params.window);
    let ema = exponential_moving_average(&gaps, params.alpha);

    Ok(SmoothedSeries {
        elapsed,
        gaps,
        sma,
        ema,
    })
}

/// Differences between consecutive values, with an implicit leading 0.
///
/// For an elapsed series this gives `gaps[0] == 0`.
pub fn inter_arrival_gaps(elapsed: &[f64]) -> Vec<f64> {
    let mut prev = 0.0;
    elapsed
        .iter()
        .map(|&e| {
            let gap = e - prev;
            prev = e;
            gap
        })
        .collect()
}

/// Trailing mean over `window` values. The first `window - 1` slots are 0.
pub fn simple_moving_average(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    (0..values.len())
        .map(|i| {
            if i + 1 < window {
                return 0.0;
            }
            let sum: f64 = values[i + 1 - window..=i].iter().sum();
            sum / window as f64
        })
        .collect()
}

/// `ema[0] = values[0]`, `ema[i] = alpha * values[i] + (1 - alpha) * ema[i - 1]`.
pub fn exponential_moving_average(values: &[f64], alpha: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    for (i, &v) in values.iter().enumerate() {
        let next = match i {
            0 => v,
            _ => alpha * v + (1.0 - alpha) * out[i - 1],
        };
        out.push(next);
    }
    out
}
