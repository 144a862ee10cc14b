//! Uniform reservoir sample backing every histogram
//!
//! Keeps at most `capacity` observations. Once full, each new observation
//! replaces a uniformly chosen slot with probability `capacity / seen`
//! (Vitter's algorithm R), so the surviving values stay a statistically
//! representative sample of everything observed. Evicted values are lost;
//! that approximation is the price of bounded memory.

use rand::Rng;

/// Fixed-capacity uniform random sample of `i64` observations
#[derive(Debug, Clone)]
pub struct UniformSample {
    capacity: usize,
    seen: u64,
    values: Vec<i64>,
}

impl UniformSample {
    /// Create an empty sample holding at most `capacity` values
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            seen: 0,
            values: Vec::with_capacity(capacity.min(4096)),
        }
    }

    /// Record one observation
    pub fn update(&mut self, value: i64) {
        self.seen += 1;
        if self.values.len() < self.capacity {
            self.values.push(value);
            return;
        }
        let slot = rand::thread_rng().gen_range(0..self.seen);
        if (slot as usize) < self.capacity {
            self.values[slot as usize] = value;
        }
    }

    /// Drop every observation
    pub fn clear(&mut self) {
        self.seen = 0;
        self.values.clear();
    }

    /// Total observations recorded since creation or the last clear
    pub fn count(&self) -> u64 {
        self.seen
    }

    /// Number of observations currently retained
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Copy of the retained observations
    pub fn values(&self) -> Vec<i64> {
        self.values.clone()
    }
}

/// Summary statistics computed over a set of retained observations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleStats {
    pub max: i64,
    pub min: i64,
    pub sum: i64,
    pub mean: f64,
    pub stddev: f64,
    pub variance: f64,
    pub percentiles: Vec<f64>,
}

impl SampleStats {
    /// Compute statistics over `values` and the requested quantiles
    ///
    /// An empty input yields zeros everywhere (one zero per quantile).
    pub fn compute(mut values: Vec<i64>, quantiles: &[f64]) -> Self {
        if values.is_empty() {
            return Self {
                percentiles: vec![0.0; quantiles.len()],
                ..Self::default()
            };
        }

        values.sort_unstable();

        let len = values.len() as f64;
        let sum = values.iter().fold(0i64, |acc, v| acc.saturating_add(*v));
        let mean = values.iter().map(|v| *v as f64).sum::<f64>() / len;
        let variance = values
            .iter()
            .map(|v| {
                let diff = *v as f64 - mean;
                diff * diff
            })
            .sum::<f64>()
            / len;

        Self {
            max: values[values.len() - 1],
            min: values[0],
            sum,
            mean,
            stddev: variance.sqrt(),
            variance,
            percentiles: quantiles.iter().map(|q| percentile(&values, *q)).collect(),
        }
    }
}

/// Interpolated quantile over an ascending slice
///
/// Uses the `q * (n + 1)` rank: ranks below the first element clamp to the
/// minimum, ranks past the last clamp to the maximum, anything in between is
/// linearly interpolated between its two neighbours.
pub fn percentile(sorted: &[i64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let len = sorted.len();
    let pos = q * (len as f64 + 1.0);
    if pos < 1.0 {
        sorted[0] as f64
    } else if pos >= len as f64 {
        sorted[len - 1] as f64
    } else {
        let lower = sorted[pos as usize - 1] as f64;
        let upper = sorted[pos as usize] as f64;
        lower + (pos - pos.floor()) * (upper - lower)
    }
}
