//! Multivariate Gaussian micro-model
//!
//! Keeps count, sum and sum of outer products per partition. The
//! covariance estimate blends in one pseudo-observation of unit variance,
//! so an untrained (or single-sample) partition is still a proper
//! distribution. Anomaly is the chi-square tail surprise of the squared
//! Mahalanobis distance.

use super::special::{chi_square_anomaly, chi_square_radius};
use super::{like, FeatureRange, FeatureSummary, PartitionSet, SufficientStatistics};
use crate::codec::Scalar;
use crate::persist::{ModelExporter, ModelImporter};
use crate::Result;
use std::f64::consts::PI;

/// Weight of the prior pseudo-observation
pub const PRIOR_WEIGHT: f64 = 1.0;
/// Variance of the prior pseudo-observation
pub const PRIOR_VARIANCE: f64 = 1.0;

const HOLD_TOLERANCE: f64 = 1e-9;

const JITTER: [f64; 5] = [0.0, 1e-9, 1e-6, 1e-3, 1.0];

/// Sufficient statistics of one partition
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianStats {
    count: i64,
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
}

impl GaussianStats {
    /// Empty statistics over `dim` variables
    #[must_use]
    pub fn new(dim: usize) -> Self {
        Self {
            count: 0,
            sum: vec![0.0; dim],
            sum_sq: vec![0.0; dim * dim],
        }
    }

    /// Number of variables
    #[must_use]
    pub fn dim(&self) -> usize {
        self.sum.len()
    }

    /// Number of trained observations
    #[must_use]
    pub const fn count(&self) -> i64 {
        self.count
    }

    /// Running sum per variable
    #[must_use]
    pub fn sum(&self) -> &[f64] {
        &self.sum
    }

    /// Running sum of outer products (row-major)
    #[must_use]
    pub fn sum_sq(&self) -> &[f64] {
        &self.sum_sq
    }

    fn accumulate(&mut self, x: &[f64], sign: f64) {
        let d = self.dim();
        for i in 0..d {
            self.sum[i] += sign * x[i];
            for j in 0..d {
                self.sum_sq[i * d + j] += sign * x[i] * x[j];
            }
        }
    }

    /// Mean vector and covariance matrix (row-major)
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn estimate(&self) -> (Vec<f64>, Vec<f64>) {
        let d = self.dim();
        let n = self.count.max(0) as f64;
        let mean: Vec<f64> = if n > 0.0 {
            self.sum.iter().map(|s| s / n).collect()
        } else {
            vec![0.0; d]
        };

        let mut cov = vec![0.0; d * d];
        for i in 0..d {
            for j in 0..d {
                let prior = if i == j { PRIOR_WEIGHT * PRIOR_VARIANCE } else { 0.0 };
                let scatter = self.sum_sq[i * d + j] - n * mean[i] * mean[j];
                cov[i * d + j] = (scatter + prior) / (n + PRIOR_WEIGHT);
            }
        }
        (mean, cov)
    }

    fn fit(&self) -> Fitted {
        let (mean, cov) = self.estimate();
        let d = self.dim();
        let chol = JITTER
            .iter()
            .find_map(|&eps| {
                let mut a = cov.clone();
                for i in 0..d {
                    a[i * d + i] += eps;
                }
                cholesky(&a, d)
            })
            .unwrap_or_else(|| identity(d));
        Fitted { mean, cov, chol }
    }
}

impl SufficientStatistics for GaussianStats {
    fn export(&self, exporter: &mut dyn ModelExporter) -> Result<()> {
        exporter.add_int("count", self.count)?;
        exporter.add_double_array("sum", &self.sum)?;
        exporter.add_double_array("sum_sq", &self.sum_sq)
    }

    fn import(&mut self, importer: &dyn ModelImporter) -> Result<()> {
        self.count = importer.get_int("count")?;
        importer.get_double_array("sum", &mut self.sum)?;
        importer.get_double_array("sum_sq", &mut self.sum_sq)
    }
}

fn identity(d: usize) -> Vec<f64> {
    let mut m = vec![0.0; d * d];
    for i in 0..d {
        m[i * d + i] = 1.0;
    }
    m
}

/// Lower Cholesky factor of a symmetric positive definite matrix
fn cholesky(a: &[f64], d: usize) -> Option<Vec<f64>> {
    let mut l = vec![0.0; d * d];
    for i in 0..d {
        for j in 0..=i {
            let mut s = a[i * d + j];
            for k in 0..j {
                s -= l[i * d + k] * l[j * d + k];
            }
            if i == j {
                if s <= 0.0 || !s.is_finite() {
                    return None;
                }
                l[i * d + i] = s.sqrt();
            } else {
                l[i * d + j] = s / l[j * d + j];
            }
        }
    }
    Some(l)
}

/// Estimated parameters of one partition, ready for scoring
struct Fitted {
    mean: Vec<f64>,
    cov: Vec<f64>,
    chol: Vec<f64>,
}

impl Fitted {
    fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Squared Mahalanobis distance of `x`
    fn mahalanobis(&self, x: &[f64]) -> f64 {
        let d = self.dim();
        let mut y = vec![0.0; d];
        for i in 0..d {
            let mut s = x[i] - self.mean[i];
            for k in 0..i {
                s -= self.chol[i * d + k] * y[k];
            }
            y[i] = s / self.chol[i * d + i];
        }
        y.iter().map(|v| v * v).sum()
    }

    fn ln_det(&self) -> f64 {
        let d = self.dim();
        (0..d).map(|i| 2.0 * self.chol[i * d + i].ln()).sum()
    }
}

fn values(slice: &[Scalar]) -> Vec<f64> {
    slice.iter().map(|v| v.as_f64()).collect()
}

fn score(stats: &GaussianStats, x: &[f64]) -> f64 {
    if x.iter().any(|v| !v.is_finite()) {
        return 0.0;
    }
    let fitted = stats.fit();
    chi_square_anomaly(fitted.dim(), fitted.mahalanobis(x))
}

/// Multivariate Gaussian micro-model
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianModel {
    features: FeatureRange,
    partitions: PartitionSet<GaussianStats>,
}

impl GaussianModel {
    /// Create an untrained model over `features`
    #[must_use]
    pub fn new(features: FeatureRange) -> Self {
        let dim = features.len();
        Self {
            features,
            partitions: PartitionSet::new(GaussianStats::new(dim)),
        }
    }

    /// Feature columns
    #[must_use]
    pub const fn features(&self) -> &FeatureRange {
        &self.features
    }

    /// Statistics of `partition` (the prior when absent)
    #[must_use]
    pub fn stats(&self, partition: Option<usize>) -> &GaussianStats {
        self.partitions.get(partition)
    }

    pub(crate) const fn partitions(&self) -> &PartitionSet<GaussianStats> {
        &self.partitions
    }

    pub(crate) fn partitions_mut(&mut self) -> &mut PartitionSet<GaussianStats> {
        &mut self.partitions
    }

    pub(crate) fn train(&mut self, partition: usize, slice: &[Scalar]) {
        let x = values(slice);
        let stats = self.partitions.get_mut(partition);
        stats.accumulate(&x, 1.0);
        stats.count += 1;
    }

    pub(crate) fn untrain(&mut self, partition: usize, slice: &[Scalar]) {
        let x = values(slice);
        let stats = self.partitions.get_mut(partition);
        stats.accumulate(&x, -1.0);
        stats.count -= 1;
    }

    pub(crate) fn anomaly(&self, partition: Option<usize>, slice: &[Scalar]) -> f64 {
        score(self.stats(partition), &values(slice))
    }

    /// Whether `partition` can contain `slice`: taking it out leaves a
    /// non-negative count and non-negative variances
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn could_hold(&self, partition: usize, slice: &[Scalar]) -> bool {
        let stats = self.stats(Some(partition));
        if stats.count < 1 {
            return false;
        }
        let x = values(slice);
        let d = stats.dim();
        let n = (stats.count - 1) as f64;
        (0..d).all(|i| {
            let sum = stats.sum[i] - x[i];
            let sum_sq = stats.sum_sq[i * d + i] - x[i] * x[i];
            let tolerance = HOLD_TOLERANCE * stats.sum_sq[i * d + i].abs().max(1.0);
            if n > 0.0 {
                sum_sq - sum * sum / n >= -tolerance
            } else {
                sum.abs() <= tolerance && sum_sq.abs() <= tolerance
            }
        })
    }

    /// Anomaly of `slice` against `partition` with `slice` taken out of it
    pub(crate) fn anomaly_without(&self, partition: usize, slice: &[Scalar]) -> f64 {
        let x = values(slice);
        let mut stats = self.stats(Some(partition)).clone();
        stats.accumulate(&x, -1.0);
        stats.count -= 1;
        score(&stats, &x)
    }

    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn log_probability(&self, partition: Option<usize>, slice: &[Scalar]) -> f64 {
        let x = values(slice);
        let fitted = self.stats(partition).fit();
        let d = fitted.dim() as f64;
        -0.5 * (d * (2.0 * PI).ln() + fitted.ln_det() + fitted.mahalanobis(&x))
    }

    pub(crate) fn describe(
        &self,
        partition: Option<usize>,
        slice: &[Scalar],
        threshold: f64,
    ) -> Vec<FeatureSummary> {
        let fitted = self.stats(partition).fit();
        let d = fitted.dim();
        let radius = chi_square_radius(threshold);

        slice
            .iter()
            .enumerate()
            .map(|(i, &template)| {
                let mean = fitted.mean[i];
                let variance = fitted.cov[i * d + i];
                let spread = radius * variance.sqrt();
                FeatureSummary {
                    peak: like(template, mean),
                    min: like(template, mean - spread),
                    max: like(template, mean + spread),
                    expectation: mean,
                    variance,
                }
            })
            .collect()
    }
}
