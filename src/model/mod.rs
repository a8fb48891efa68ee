//! Micro-models: per-feature-group probabilistic components
//!
//! A micro-model scores one group of feature columns. The set of kinds is
//! closed, so [`MicroModel`] is a tagged enum and dispatch is a `match`.
//!
//! ## Partitions
//!
//! Each micro-model keeps one set of sufficient statistics per partition
//! (a known class and/or a discovered cluster) plus an untrained prior.
//! The detector owns the partition directory and passes partition indices
//! down; the micro-model only stores numbers.
//!
//! ```text
//! MicroModel ──┬── features: FeatureRange   (columns it reads)
//!              └── partitions: PartitionSet
//!                     ├── prior             (untrained statistics)
//!                     ├── 0 ──> stats
//!                     └── 1 ──> stats
//! ```

mod gaussian;
mod poisson;
pub mod special;

pub use gaussian::{GaussianModel, GaussianStats};
pub use poisson::{PoissonModel, PoissonStats};

use crate::codec::Scalar;
use crate::persist::{Key, ModelExporter, ModelImporter, PersistentModel};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of distribution kinds
///
/// Deserializes from any name [`FromStr`] accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum DistributionKind {
    /// Multivariate Gaussian over one or more columns
    Gaussian,
    /// Poisson over a `(frequency, period)` pair, two-sided
    Poisson,
    /// Poisson over a `(frequency, period)` pair, high frequencies only
    PoissonOneside,
}

impl DistributionKind {
    /// Map a legacy integer code to a kind
    ///
    /// Codes: 0 = Gaussian, 1 = Poisson, 2 = `PoissonOneside`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownDistribution`] for any other code
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            0 => Ok(Self::Gaussian),
            1 => Ok(Self::Poisson),
            2 => Ok(Self::PoissonOneside),
            other => Err(Error::UnknownDistribution(format!("code {other}"))),
        }
    }

    /// Legacy integer code
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Gaussian => 0,
            Self::Poisson => 1,
            Self::PoissonOneside => 2,
        }
    }
}

impl fmt::Display for DistributionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Gaussian => "gaussian",
            Self::Poisson => "poisson",
            Self::PoissonOneside => "poisson_oneside",
        })
    }
}

impl FromStr for DistributionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gaussian" | "normal" => Ok(Self::Gaussian),
            "poisson" => Ok(Self::Poisson),
            "poisson_oneside" | "poisson_onesided" => Ok(Self::PoissonOneside),
            other => Err(Error::UnknownDistribution(other.to_string())),
        }
    }
}

impl TryFrom<String> for DistributionKind {
    type Error = Error;

    fn try_from(name: String) -> Result<Self> {
        name.parse()
    }
}

/// Fixed set of absolute column indices read by one component
///
/// Built once, never resized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<usize>", into = "Vec<usize>")]
pub struct FeatureRange(Box<[usize]>);

impl FeatureRange {
    /// Create a range from column indices
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFeatures`] if `columns` is empty or lists a
    /// column twice
    pub fn new(columns: Vec<usize>) -> Result<Self> {
        if columns.is_empty() {
            return Err(Error::InvalidFeatures(
                "feature range needs at least one column".to_string(),
            ));
        }
        for (i, c) in columns.iter().enumerate() {
            if columns[..i].contains(c) {
                return Err(Error::InvalidFeatures(format!(
                    "feature range lists column {c} twice"
                )));
            }
        }
        Ok(Self(columns.into_boxed_slice()))
    }

    /// Column indices
    #[must_use]
    pub fn columns(&self) -> &[usize] {
        &self.0
    }

    /// Number of columns
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false (ranges are non-empty by construction)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Largest column index
    #[must_use]
    pub fn max_column(&self) -> usize {
        self.0.iter().copied().max().unwrap_or(0)
    }

    /// Smallest column index
    #[must_use]
    pub fn min_column(&self) -> usize {
        self.0.iter().copied().min().unwrap_or(0)
    }

    /// Copy this range's values out of `row` into `out`
    ///
    /// `row` must be at least `max_column() + 1` wide; the detector checks
    /// this once at construction.
    pub fn gather(&self, row: &[Scalar], out: &mut Vec<Scalar>) {
        out.clear();
        out.extend(self.0.iter().map(|&c| row[c]));
    }

    fn as_i64_vec(&self) -> Vec<i64> {
        self.0
            .iter()
            .map(|&c| i64::try_from(c).unwrap_or(i64::MAX))
            .collect()
    }
}

impl TryFrom<Vec<usize>> for FeatureRange {
    type Error = Error;

    fn try_from(columns: Vec<usize>) -> Result<Self> {
        Self::new(columns)
    }
}

impl From<FeatureRange> for Vec<usize> {
    fn from(range: FeatureRange) -> Self {
        range.0.into_vec()
    }
}

/// Per-column diagnostic produced by [`MicroModel::describe`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureSummary {
    /// Most probable value
    pub peak: Scalar,
    /// Smallest value whose anomaly stays within the threshold
    pub min: Scalar,
    /// Largest value whose anomaly stays within the threshold
    pub max: Scalar,
    /// Predictive mean
    pub expectation: f64,
    /// Predictive variance
    pub variance: f64,
}

impl FeatureSummary {
    /// Summary of a column the model conditions on rather than predicts
    #[must_use]
    pub fn fixed(value: Scalar) -> Self {
        Self {
            peak: value,
            min: value,
            max: value,
            expectation: value.as_f64(),
            variance: 0.0,
        }
    }
}

/// Scalar of the same kind as `template` carrying `value`
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn like(template: Scalar, value: f64) -> Scalar {
    match template {
        Scalar::Int(_) => Scalar::Int(value.round() as i64),
        Scalar::Float(_) => Scalar::Float(value),
    }
}

/// Per-partition statistics that can be persisted
pub(crate) trait SufficientStatistics: Clone {
    fn export(&self, exporter: &mut dyn ModelExporter) -> Result<()>;
    fn import(&mut self, importer: &dyn ModelImporter) -> Result<()>;
}

/// Growable list of partition statistics with a shared prior
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PartitionSet<S> {
    prior: S,
    items: Vec<S>,
}

impl<S: SufficientStatistics> PartitionSet<S> {
    pub(crate) const fn new(prior: S) -> Self {
        Self {
            prior,
            items: Vec::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    /// Statistics of `partition`; the prior for `None` or unknown indices
    pub(crate) fn get(&self, partition: Option<usize>) -> &S {
        partition
            .and_then(|p| self.items.get(p))
            .unwrap_or(&self.prior)
    }

    /// Mutable statistics of `partition`, growing the set as needed
    pub(crate) fn get_mut(&mut self, partition: usize) -> &mut S {
        if partition >= self.items.len() {
            self.items.resize(partition + 1, self.prior.clone());
        }
        &mut self.items[partition]
    }

    pub(crate) fn resize(&mut self, len: usize) {
        self.items.resize(len, self.prior.clone());
    }

    pub(crate) fn clear(&mut self) {
        self.items.clear();
    }

    fn export(&self, exporter: &mut dyn ModelExporter) -> Result<()> {
        exporter.add_int("partitions", i64::try_from(self.items.len()).unwrap_or(i64::MAX))?;
        for (index, stats) in self.items.iter().enumerate() {
            let mut child = exporter.create_child(Key::Index(index))?;
            stats.export(child.as_mut())?;
        }
        Ok(())
    }

    fn import(&mut self, importer: &dyn ModelImporter) -> Result<()> {
        let count = usize::try_from(importer.get_int("partitions")?).map_err(|_| {
            Error::ModelMismatch("negative partition count".to_string())
        })?;
        let mut items = Vec::with_capacity(count);
        for index in 0..count {
            let child = importer.get_child(Key::Index(index))?;
            let mut stats = self.prior.clone();
            stats.import(child.as_ref())?;
            items.push(stats);
        }
        self.items = items;
        Ok(())
    }
}

/// One mixture component: a micro-model of a closed set of kinds
#[derive(Debug, Clone, PartialEq)]
pub enum MicroModel {
    /// Multivariate Gaussian
    Gaussian(GaussianModel),
    /// Two-sided Poisson
    Poisson(PoissonModel),
    /// One-sided (high frequency) Poisson
    PoissonOneside(PoissonModel),
}

impl MicroModel {
    /// Distribution kind of this component
    #[must_use]
    pub const fn kind(&self) -> DistributionKind {
        match self {
            Self::Gaussian(_) => DistributionKind::Gaussian,
            Self::Poisson(_) => DistributionKind::Poisson,
            Self::PoissonOneside(_) => DistributionKind::PoissonOneside,
        }
    }

    /// Columns this component reads
    #[must_use]
    pub const fn features(&self) -> &FeatureRange {
        match self {
            Self::Gaussian(m) => m.features(),
            Self::Poisson(m) | Self::PoissonOneside(m) => m.features(),
        }
    }

    /// Number of partitions holding statistics
    #[must_use]
    pub fn partition_count(&self) -> usize {
        match self {
            Self::Gaussian(m) => m.partitions().len(),
            Self::Poisson(m) | Self::PoissonOneside(m) => m.partitions().len(),
        }
    }

    /// Grow or shrink to exactly `len` partitions (new ones start at the prior)
    pub fn resize_partitions(&mut self, len: usize) {
        match self {
            Self::Gaussian(m) => m.partitions_mut().resize(len),
            Self::Poisson(m) | Self::PoissonOneside(m) => m.partitions_mut().resize(len),
        }
    }

    /// Drop all trained statistics
    pub fn reset(&mut self) {
        match self {
            Self::Gaussian(m) => m.partitions_mut().clear(),
            Self::Poisson(m) | Self::PoissonOneside(m) => m.partitions_mut().clear(),
        }
    }

    /// Add one observation (the component's slice of a row) to `partition`
    pub fn train(&mut self, partition: usize, slice: &[Scalar]) {
        match self {
            Self::Gaussian(m) => m.train(partition, slice),
            Self::Poisson(m) | Self::PoissonOneside(m) => m.train(partition, slice),
        }
    }

    /// Remove one previously trained observation from `partition`
    pub fn untrain(&mut self, partition: usize, slice: &[Scalar]) {
        match self {
            Self::Gaussian(m) => m.untrain(partition, slice),
            Self::Poisson(m) | Self::PoissonOneside(m) => m.untrain(partition, slice),
        }
    }

    /// Non-negative anomaly score of `slice` against `partition`
    ///
    /// `None` (or an unknown partition) scores against the untrained prior.
    #[must_use]
    pub fn anomaly(&self, partition: Option<usize>, slice: &[Scalar]) -> f64 {
        match self {
            Self::Gaussian(m) => m.anomaly(partition, slice),
            Self::Poisson(m) => m.anomaly(partition, slice),
            Self::PoissonOneside(m) => m.one_sided_anomaly(partition, slice),
        }
    }

    /// Whether `slice` can be one of the observations trained into
    /// `partition`
    #[must_use]
    pub fn could_hold(&self, partition: usize, slice: &[Scalar]) -> bool {
        match self {
            Self::Gaussian(m) => m.could_hold(partition, slice),
            Self::Poisson(m) | Self::PoissonOneside(m) => m.could_hold(partition, slice),
        }
    }

    /// Anomaly of `slice` against `partition` as it was before `slice` was
    /// trained into it
    #[must_use]
    pub fn anomaly_without(&self, partition: usize, slice: &[Scalar]) -> f64 {
        match self {
            Self::Gaussian(m) => m.anomaly_without(partition, slice),
            Self::Poisson(m) => m.anomaly_without(partition, slice, false),
            Self::PoissonOneside(m) => m.anomaly_without(partition, slice, true),
        }
    }

    /// Natural log of the predictive probability (density) of `slice`
    #[must_use]
    pub fn log_probability(&self, partition: Option<usize>, slice: &[Scalar]) -> f64 {
        match self {
            Self::Gaussian(m) => m.log_probability(partition, slice),
            Self::Poisson(m) | Self::PoissonOneside(m) => m.log_probability(partition, slice),
        }
    }

    /// Per-column peak, acceptable range, mean and variance
    #[must_use]
    pub fn describe(
        &self,
        partition: Option<usize>,
        slice: &[Scalar],
        threshold: f64,
    ) -> Vec<FeatureSummary> {
        match self {
            Self::Gaussian(m) => m.describe(partition, slice, threshold),
            Self::Poisson(m) => m.describe(partition, slice, threshold, false),
            Self::PoissonOneside(m) => m.describe(partition, slice, threshold, true),
        }
    }
}

impl PersistentModel for MicroModel {
    fn export_state(&self, exporter: &mut dyn ModelExporter) -> Result<()> {
        exporter.add_int("distribution", self.kind().code())?;
        exporter.add_int_array("features", &self.features().as_i64_vec())?;
        match self {
            Self::Gaussian(m) => m.partitions().export(exporter),
            Self::Poisson(m) | Self::PoissonOneside(m) => m.partitions().export(exporter),
        }
    }

    fn import_state(&mut self, importer: &dyn ModelImporter) -> Result<()> {
        let kind = DistributionKind::from_code(importer.get_int("distribution")?)?;
        if kind != self.kind() {
            return Err(Error::ModelMismatch(format!(
                "document holds a {kind} component, detector expects {}",
                self.kind()
            )));
        }

        let mut features = vec![0i64; self.features().len()];
        importer.get_int_array("features", &mut features)?;
        if features != self.features().as_i64_vec() {
            return Err(Error::ModelMismatch(format!(
                "document component reads columns {features:?}, detector expects {:?}",
                self.features().columns()
            )));
        }

        match self {
            Self::Gaussian(m) => m.partitions_mut().import(importer),
            Self::Poisson(m) | Self::PoissonOneside(m) => m.partitions_mut().import(importer),
        }
    }
}
