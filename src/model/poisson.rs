//! Poisson-Gamma micro-model over a `(frequency, period)` column pair
//!
//! The event rate gets a Gamma prior; the predictive distribution of the
//! frequency observed over a period is negative binomial. Anomaly is the
//! two-sided tail surprise of the observed frequency. The one-sided flavour
//! ignores frequencies below the trained rate.

use super::special::NegativeBinomial;
use super::{like, FeatureRange, FeatureSummary, PartitionSet, SufficientStatistics};
use crate::codec::Scalar;
use crate::persist::{ModelExporter, ModelImporter};
use crate::Result;

/// Gamma prior shape (pseudo-events)
///
/// Kept small so a partition trained on a single row already fits that row.
pub const PRIOR_SHAPE: f64 = 0.01;
/// Gamma prior rate (pseudo-period)
pub const PRIOR_RATE: f64 = 0.01;

const HOLD_TOLERANCE: f64 = 1e-9;

/// Sufficient statistics of one partition
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PoissonStats {
    sum_frequency: f64,
    sum_period: f64,
    count: i64,
}

impl PoissonStats {
    /// Total observed frequency
    #[must_use]
    pub const fn sum_frequency(&self) -> f64 {
        self.sum_frequency
    }

    /// Total observed period
    #[must_use]
    pub const fn sum_period(&self) -> f64 {
        self.sum_period
    }

    /// Number of trained observations
    #[must_use]
    pub const fn count(&self) -> i64 {
        self.count
    }

    fn predictive(&self, period: f64) -> NegativeBinomial {
        let rate = PRIOR_RATE + self.sum_period;
        NegativeBinomial::new(PRIOR_SHAPE + self.sum_frequency, rate / (rate + period))
    }

    /// Whether `frequency / period` lies below the posterior mean rate
    ///
    /// The comparison uses the prior-adjusted sums rather than the raw
    /// trained sums, so an untrained partition has a defined rate of
    /// `PRIOR_SHAPE / PRIOR_RATE`.
    fn below_trained_rate(&self, frequency: f64, period: f64) -> bool {
        frequency * (PRIOR_RATE + self.sum_period) < (PRIOR_SHAPE + self.sum_frequency) * period
    }

    fn add(&mut self, frequency: f64, period: f64, sign: i64) {
        #[allow(clippy::cast_precision_loss)]
        let weight = sign as f64;
        self.sum_frequency += weight * frequency;
        self.sum_period += weight * period;
        self.count += sign;
    }

    fn anomaly(&self, frequency: f64, period: f64) -> f64 {
        if period <= 0.0 || !period.is_finite() {
            return 0.0;
        }
        self.predictive(period).two_sided_anomaly(as_count(frequency))
    }

    fn one_sided_anomaly(&self, frequency: f64, period: f64) -> f64 {
        if self.below_trained_rate(frequency, period) {
            0.0
        } else {
            self.anomaly(frequency, period)
        }
    }
}

impl SufficientStatistics for PoissonStats {
    fn export(&self, exporter: &mut dyn ModelExporter) -> Result<()> {
        exporter.add_double("sum_frequency", self.sum_frequency)?;
        exporter.add_double("sum_period", self.sum_period)?;
        exporter.add_int("count", self.count)
    }

    fn import(&mut self, importer: &dyn ModelImporter) -> Result<()> {
        self.sum_frequency = importer.get_double("sum_frequency")?;
        self.sum_period = importer.get_double("sum_period")?;
        self.count = importer.get_int("count")?;
        Ok(())
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn as_count(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value.round() as u64
    } else {
        0
    }
}

/// Poisson micro-model (shared by the two-sided and one-sided kinds)
#[derive(Debug, Clone, PartialEq)]
pub struct PoissonModel {
    features: FeatureRange,
    partitions: PartitionSet<PoissonStats>,
}

impl PoissonModel {
    /// Create an untrained model reading `features = [frequency, period]`
    #[must_use]
    pub fn new(features: FeatureRange) -> Self {
        Self {
            features,
            partitions: PartitionSet::new(PoissonStats::default()),
        }
    }

    /// Feature columns `[frequency, period]`
    #[must_use]
    pub const fn features(&self) -> &FeatureRange {
        &self.features
    }

    /// Statistics of `partition` (the prior when absent)
    #[must_use]
    pub fn stats(&self, partition: Option<usize>) -> &PoissonStats {
        self.partitions.get(partition)
    }

    pub(crate) const fn partitions(&self) -> &PartitionSet<PoissonStats> {
        &self.partitions
    }

    pub(crate) fn partitions_mut(&mut self) -> &mut PartitionSet<PoissonStats> {
        &mut self.partitions
    }

    fn split(slice: &[Scalar]) -> (f64, f64) {
        (slice[0].as_f64(), slice[1].as_f64())
    }

    pub(crate) fn train(&mut self, partition: usize, slice: &[Scalar]) {
        let (frequency, period) = Self::split(slice);
        self.partitions.get_mut(partition).add(frequency, period, 1);
    }

    pub(crate) fn untrain(&mut self, partition: usize, slice: &[Scalar]) {
        let (frequency, period) = Self::split(slice);
        self.partitions.get_mut(partition).add(frequency, period, -1);
    }

    pub(crate) fn anomaly(&self, partition: Option<usize>, slice: &[Scalar]) -> f64 {
        let (frequency, period) = Self::split(slice);
        self.stats(partition).anomaly(frequency, period)
    }

    pub(crate) fn one_sided_anomaly(&self, partition: Option<usize>, slice: &[Scalar]) -> f64 {
        let (frequency, period) = Self::split(slice);
        self.stats(partition).one_sided_anomaly(frequency, period)
    }

    /// Whether `partition` can contain `slice`: taking it out leaves no
    /// negative sum
    pub(crate) fn could_hold(&self, partition: usize, slice: &[Scalar]) -> bool {
        let (frequency, period) = Self::split(slice);
        let stats = self.stats(Some(partition));
        let fits = |total: f64, value: f64| total - value >= -HOLD_TOLERANCE * total.abs().max(1.0);
        stats.count >= 1 && fits(stats.sum_frequency, frequency) && fits(stats.sum_period, period)
    }

    /// Anomaly of `slice` against `partition` with `slice` taken out of it
    pub(crate) fn anomaly_without(&self, partition: usize, slice: &[Scalar], one_sided: bool) -> f64 {
        let (frequency, period) = Self::split(slice);
        let mut stats = *self.stats(Some(partition));
        stats.add(frequency, period, -1);
        if one_sided {
            stats.one_sided_anomaly(frequency, period)
        } else {
            stats.anomaly(frequency, period)
        }
    }

    pub(crate) fn log_probability(&self, partition: Option<usize>, slice: &[Scalar]) -> f64 {
        let (frequency, period) = Self::split(slice);
        if period <= 0.0 || !period.is_finite() {
            return if as_count(frequency) == 0 { 0.0 } else { f64::NEG_INFINITY };
        }
        self.stats(partition)
            .predictive(period)
            .ln_pmf(as_count(frequency))
    }

    pub(crate) fn describe(
        &self,
        partition: Option<usize>,
        slice: &[Scalar],
        threshold: f64,
        one_sided: bool,
    ) -> Vec<FeatureSummary> {
        let (_, period) = Self::split(slice);
        let period_summary = FeatureSummary::fixed(slice[1]);

        if period <= 0.0 || !period.is_finite() {
            return vec![FeatureSummary::fixed(like(slice[0], 0.0)), period_summary];
        }

        let stats = self.stats(partition);
        let nb = stats.predictive(period);
        let peak = nb.mode();
        let acceptable = |k: u64| {
            #[allow(clippy::cast_precision_loss)]
            let kf = k as f64;
            if one_sided && stats.below_trained_rate(kf, period) {
                true
            } else {
                nb.two_sided_anomaly(k) <= threshold
            }
        };

        // Acceptability only changes once on each side of the mode
        let mut min = peak;
        if min > 0 && acceptable(min - 1) {
            let (mut lo, mut hi) = (0, min - 1);
            while lo < hi {
                let mid = lo + (hi - lo) / 2;
                if acceptable(mid) {
                    hi = mid;
                } else {
                    lo = mid + 1;
                }
            }
            min = lo;
        }

        let mut max = peak;
        if acceptable(max.saturating_add(1)) {
            let mut step = 1_u64;
            let mut lo = max.saturating_add(1);
            let mut hi = lo;
            while hi < u64::MAX && acceptable(hi) {
                lo = hi;
                step = step.saturating_mul(2);
                hi = hi.saturating_add(step);
            }
            if acceptable(hi) {
                lo = hi;
            }
            while hi - lo > 1 {
                let mid = lo + (hi - lo) / 2;
                if acceptable(mid) {
                    lo = mid;
                } else {
                    hi = mid;
                }
            }
            max = lo;
        }

        #[allow(clippy::cast_precision_loss)]
        let frequency_summary = FeatureSummary {
            peak: like(slice[0], peak as f64),
            min: like(slice[0], min as f64),
            max: like(slice[0], max as f64),
            expectation: nb.mean(),
            variance: nb.variance(),
        };
        vec![frequency_summary, period_summary]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> PoissonModel {
        PoissonModel::new(FeatureRange::new(vec![0, 1]).unwrap())
    }

    fn obs(frequency: i64, period: i64) -> [Scalar; 2] {
        [Scalar::Int(frequency), Scalar::Int(period)]
    }

    #[test]
    fn test_train_untrain_restores_stats() {
        let mut m = model();
        m.train(0, &obs(5, 2));
        let before = *m.stats(Some(0));
        m.train(0, &obs(3, 1));
        m.untrain(0, &obs(3, 1));
        assert_eq!(*m.stats(Some(0)), before);
        assert_eq!(before.count(), 1);
    }

    #[test]
    fn test_anomaly_grows_with_surprise() {
        let mut m = model();
        for _ in 0..50 {
            m.train(0, &obs(10, 1));
        }
        let typical = m.anomaly(Some(0), &obs(10, 1));
        let high = m.anomaly(Some(0), &obs(30, 1));
        let low = m.anomaly(Some(0), &obs(0, 1));

        assert!(typical >= 0.0);
        assert!(high > typical + 3.0);
        assert!(low > typical + 3.0);
    }

    #[test]
    fn test_one_sided_ignores_low_counts() {
        let mut m = model();
        for _ in 0..50 {
            m.train(0, &obs(10, 1));
        }
        assert!(m.one_sided_anomaly(Some(0), &obs(0, 1)).abs() < f64::EPSILON);
        let high = m.one_sided_anomaly(Some(0), &obs(30, 1));
        assert!((high - m.anomaly(Some(0), &obs(30, 1))).abs() < 1e-12);
    }

    #[test]
    fn test_zero_period_scores_zero() {
        let m = model();
        assert!(m.anomaly(None, &obs(100, 0)).abs() < f64::EPSILON);
    }

    #[test]
    fn test_describe_brackets_peak() {
        let mut m = model();
        for _ in 0..20 {
            m.train(0, &obs(8, 2));
        }
        let summary = m.describe(Some(0), &obs(8, 2), 2.0, false);

        assert_eq!(summary.len(), 2);
        let freq = &summary[0];
        assert!(freq.min.as_f64() <= freq.peak.as_f64());
        assert!(freq.peak.as_f64() <= freq.max.as_f64());
        assert!((freq.expectation - 8.0).abs() < 0.5);
        assert_eq!(summary[1].peak, Scalar::Int(2));
    }

    #[test]
    fn test_log_probability_is_log_mass() {
        let mut m = model();
        m.train(0, &obs(4, 1));
        let total: f64 = (0..200)
            .map(|k| m.log_probability(Some(0), &obs(k, 1)).exp())
            .sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_row_partition_fits_that_row() {
        let mut m = model();
        m.train(0, &obs(100, 1));
        assert!(m.anomaly(Some(0), &obs(100, 1)) < 1.0);
        assert!(m.anomaly(None, &obs(100, 1)) > m.anomaly(Some(0), &obs(100, 1)));
    }

    #[test]
    fn test_anomaly_without_matches_untrained_state() {
        let mut m = model();
        for _ in 0..5 {
            m.train(0, &obs(70, 1));
        }
        let before = m.anomaly(Some(0), &obs(100, 1));
        m.train(0, &obs(100, 1));
        let without = m.anomaly_without(0, &obs(100, 1), false);
        assert!((without - before).abs() < 1e-9);
    }

    #[test]
    fn test_huge_frequency_is_bounded() {
        let mut m = model();
        for _ in 0..10 {
            m.train(0, &obs(7, 1));
        }
        let start = std::time::Instant::now();
        for frequency in [50_000_000, i64::MAX] {
            let anomaly = m.anomaly(Some(0), &obs(frequency, 1));
            assert!(anomaly.is_finite());
            assert!(anomaly > 100.0);
            let summary = m.describe(Some(0), &obs(frequency, 1), 3.0, false);
            assert!(summary[0].max.as_f64() < 100.0);
        }
        let summary = m.describe(None, &obs(50_000_000, 1), 3.0, false);
        assert!(summary[0].min.as_f64() <= summary[0].max.as_f64());
        assert!(start.elapsed() < std::time::Duration::from_secs(1));
    }
}
