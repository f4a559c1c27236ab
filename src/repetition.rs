//! Timing harness for running one operation repeatedly.

use std::fmt;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

/// Summary of the wall-clock time of repeated runs, in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RepetitionStats {
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    /// Population variance.
    pub variance: f64,
}

impl RepetitionStats {
    /// `None` when there are no samples.
    ///
    /// For an even count the quartiles average the two samples around `n/4`
    /// and `3n/4`, for an odd count they take the sample at those indices.
    pub fn from_samples(mut samples: Vec<f64>) -> Option<Self> {
        let n = samples.len();
        if n == 0 {
            return None;
        }

        let mean = samples.iter().sum::<f64>() / n as f64;
        let variance = samples.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n as f64;
        samples.sort_by(f64::total_cmp);

        let around = |i: usize| {
            if n % 2 == 0 {
                (samples[i.saturating_sub(1)] + samples[i]) / 2.0
            } else {
                samples[i]
            }
        };

        Some(RepetitionStats {
            min: samples[0],
            q1: around(n / 4),
            median: around(n / 2),
            q3: around(3 * n / 4),
            max: samples[n - 1],
            count: n,
            mean,
            std_dev: variance.sqrt(),
            variance,
        })
    }
}

impl fmt::Display for RepetitionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Min: {}", self.min)?;
        writeln!(f, "First Quartile (Q1): {}", self.q1)?;
        writeln!(f, "Median: {}", self.median)?;
        writeln!(f, "Third Quartile (Q3): {}", self.q3)?;
        writeln!(f, "Max: {}", self.max)?;
        writeln!(f, "Number of measurements: {}", self.count)?;
        writeln!(f, "Average: {}", self.mean)?;
        writeln!(f, "Standard Deviation: {}", self.std_dev)?;
        write!(f, "Variance: {}", self.variance)
    }
}

/// Outcome of [`run_repeated`].
#[derive(Debug)]
pub struct Repetition<E> {
    /// Timings of the successful runs.
    pub stats: Option<RepetitionStats>,
    /// The error that stopped the runs early.
    pub error: Option<E>,
}

impl<E> Repetition<E> {
    pub fn completed(&self) -> usize {
        self.stats.map_or(0, |s| s.count)
    }
}

/// Call `f` up to `n` times, stopping at the first error, and time each successful call.
pub fn run_repeated<T, E, F>(n: usize, mut f: F) -> Repetition<E>
where
    E: fmt::Display,
    F: FnMut() -> Result<T, E>,
{
    let mut samples = Vec::with_capacity(n);
    let mut error = None;

    for run in 0..n {
        let start = Instant::now();
        match f() {
            Ok(_) => samples.push(start.elapsed().as_secs_f64() * 1e6),
            Err(e) => {
                warn!(run, error = %e, "repeated operation failed");
                error = Some(e);
                break;
            }
        }
    }

    let stats = RepetitionStats::from_samples(samples);
    if let Some(stats) = &stats {
        info!(count = stats.count, mean_us = stats.mean, median_us = stats.median, "repetitions finished");
    }
    Repetition { stats, error }
}
