//! Mixture Orchestrator
//!
//! Toyota Way: Jidoka (stop on the first bad row, never score garbage)
//!
//! [`AnomalyDetector`] owns a fixed list of micro-models, slices each row
//! into their feature columns and merges the per-component anomalies with a
//! static [`CombinationRule`].
//!
//! ## Partitions
//!
//! Rows are grouped into partitions. A partition is a `(class, cluster)`
//! pair: the class comes from the split column (if any), the cluster from
//! online clustering (if enabled). Every micro-model keeps one set of
//! statistics per partition, indexed identically.
//!
//! ```text
//! row ──> class = row[split] ──> candidate partitions of that class
//!                                   │
//!                     clustering ───┤ best fit <= threshold ? join : open
//!                                   ▼
//!         component 0 ─ stats[p]   component 1 ─ stats[p]   ...
//! ```
//!
//! ## Example
//!
//! ```rust
//! use trueno_isc::codec::RowCodec;
//! use trueno_isc::detector::{AnomalyDetector, CombinationRule, ComponentSpec, DetectorConfig};
//! use trueno_isc::format::{ColumnType, Format};
//!
//! # fn main() -> trueno_isc::Result<()> {
//! let format = Format::new()
//!     .with_column("events", ColumnType::Discrete)
//!     .with_column("hours", ColumnType::Discrete)
//!     .with_column("latency", ColumnType::Continuous);
//!
//! let specs = vec![ComponentSpec::poisson(0, 1)?, ComponentSpec::gaussian(vec![2])?];
//! let config = DetectorConfig::builder()
//!     .combination_rule(CombinationRule::Plus)
//!     .build()?;
//! let mut detector = AnomalyDetector::new(&format, &specs, config)?;
//!
//! for values in [[4.0, 1.0, 0.9], [5.0, 1.0, 1.1], [6.0, 1.0, 1.0]] {
//!     detector.train(&RowCodec::encode(&format, &values)?)?;
//! }
//! let usual = detector.score(&RowCodec::encode(&format, &[5.0, 1.0, 1.0])?)?;
//! let odd = detector.score(&RowCodec::encode(&format, &[40.0, 1.0, 9.0])?)?;
//! assert!(odd > usual);
//! # Ok(())
//! # }
//! ```

pub mod factory;

pub use factory::{create_micro_model, ComponentFactory, ComponentSpec, SpecFactory};

use crate::codec::{Row, Scalar};
use crate::format::Format;
use crate::model::special::ln_add;
use crate::model::{DistributionKind, FeatureRange, FeatureSummary, MicroModel};
use crate::persist::{JsonDocument, Key, ModelExporter, ModelImporter, PersistentModel};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Name of the document section holding detector configuration
pub const DETECTOR_SECTION: &str = "AnomalyDetector";

/// How per-component anomalies merge into one score
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombinationRule {
    /// Largest component anomaly
    #[default]
    Max,
    /// Sum of component anomalies
    #[serde(alias = "sum")]
    Plus,
}

impl CombinationRule {
    /// Map a persisted integer code to a rule (0 = max, 1 = plus)
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for any other code
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            0 => Ok(Self::Max),
            1 => Ok(Self::Plus),
            other => Err(Error::InvalidConfig(format!(
                "unknown combination rule code {other}"
            ))),
        }
    }

    /// Persisted integer code
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Max => 0,
            Self::Plus => 1,
        }
    }

    /// Merge component anomalies
    ///
    /// Anomalies are non-negative, so an empty set merges to 0 under both
    /// rules.
    #[must_use]
    pub fn combine<I: IntoIterator<Item = f64>>(self, scores: I) -> f64 {
        let scores = scores.into_iter();
        match self {
            Self::Max => scores.fold(0.0, f64::max),
            Self::Plus => scores.sum(),
        }
    }
}

impl fmt::Display for CombinationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Max => "max",
            Self::Plus => "plus",
        })
    }
}

impl FromStr for CombinationRule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "max" => Ok(Self::Max),
            "plus" | "sum" => Ok(Self::Plus),
            other => Err(Error::InvalidConfig(format!(
                "unknown combination rule '{other}' (expected max or plus)"
            ))),
        }
    }
}

/// Detector configuration
///
/// `offset` is the first column any component may read; columns before it
/// carry row metadata such as the class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// First feature column
    pub offset: usize,
    /// Class column (`None` = no classes)
    pub split_attribute: Option<usize>,
    /// Anomaly at or below which a row joins an existing cluster
    pub threshold: f64,
    /// Discover clusters inside each class while training
    pub clustering: bool,
    /// Merge rule for component anomalies
    pub combination_rule: CombinationRule,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            offset: 0,
            split_attribute: None,
            threshold: 0.0,
            clustering: false,
            combination_rule: CombinationRule::Max,
        }
    }
}

impl DetectorConfig {
    /// Create a builder starting from the defaults
    #[must_use]
    pub fn builder() -> DetectorConfigBuilder {
        DetectorConfigBuilder::default()
    }

    /// Set the class column from a legacy index where `-1` means none
    #[must_use]
    pub fn with_legacy_split(mut self, index: i64) -> Self {
        self.split_attribute = usize::try_from(index).ok();
        self
    }

    /// Class column as a legacy index (`-1` when there is none)
    #[must_use]
    pub fn legacy_split(&self) -> i64 {
        self.split_attribute.map_or(-1, to_i64)
    }

    /// Check the values that do not depend on the row schema
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the threshold is negative or not
    /// finite
    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "threshold must be finite and non-negative, got {}",
                self.threshold
            )));
        }
        Ok(())
    }

    /// Check offset, class column and component columns against the schema
    fn validate_layout(&self, width: usize, components: &[MicroModel]) -> Result<()> {
        if self.offset > width {
            return Err(Error::InvalidConfig(format!(
                "offset {} lies past the last column ({width} columns)",
                self.offset
            )));
        }
        if let Some(split) = self.split_attribute {
            if split >= width {
                return Err(Error::InvalidConfig(format!(
                    "split attribute {split} lies past the last column ({width} columns)"
                )));
            }
        }
        for (component, model) in components.iter().enumerate() {
            for &column in model.features().columns() {
                if column >= width {
                    return Err(Error::FeatureOutOfBounds {
                        component,
                        column,
                        width,
                    });
                }
                if column < self.offset {
                    return Err(Error::InvalidFeatureRange {
                        component,
                        reason: format!("column {column} precedes offset {}", self.offset),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Builder for [`DetectorConfig`]
#[derive(Debug, Default)]
pub struct DetectorConfigBuilder {
    config: DetectorConfig,
}

impl DetectorConfigBuilder {
    /// Set the first feature column
    #[must_use]
    pub const fn offset(mut self, offset: usize) -> Self {
        self.config.offset = offset;
        self
    }

    /// Set the class column
    #[must_use]
    pub const fn split_attribute(mut self, column: usize) -> Self {
        self.config.split_attribute = Some(column);
        self
    }

    /// Set the class column from a legacy index (`-1` = none)
    #[must_use]
    pub fn legacy_split(mut self, index: i64) -> Self {
        self.config = self.config.with_legacy_split(index);
        self
    }

    /// Set the cluster admission threshold
    #[must_use]
    pub const fn threshold(mut self, threshold: f64) -> Self {
        self.config.threshold = threshold;
        self
    }

    /// Enable or disable clustering
    #[must_use]
    pub const fn clustering(mut self, enabled: bool) -> Self {
        self.config.clustering = enabled;
        self
    }

    /// Set the combination rule
    #[must_use]
    pub const fn combination_rule(mut self, rule: CombinationRule) -> Self {
        self.config.combination_rule = rule;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the threshold is invalid
    pub fn build(self) -> Result<DetectorConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// One entry of the partition directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    /// Class value (`None` without a split column)
    pub class: Option<i64>,
    /// Cluster ordinal within the class
    pub cluster: usize,
    /// Rows currently trained into this partition
    pub count: i64,
}

/// Which optional outputs [`AnomalyDetector::score_details`] computes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetailRequest {
    /// Predicted class
    pub class: bool,
    /// Predicted cluster
    pub cluster: bool,
    /// Per-component anomaly
    pub deviations: bool,
    /// Per-column peak, range, expectation and variance
    pub summaries: bool,
}

impl DetailRequest {
    /// Request every optional output
    #[must_use]
    pub const fn all() -> Self {
        Self {
            class: true,
            cluster: true,
            deviations: true,
            summaries: true,
        }
    }
}

/// Output of [`AnomalyDetector::score_details`]
///
/// Optional fields are `None` when not requested (or not applicable).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Details {
    /// Combined anomaly, as returned by [`AnomalyDetector::score`]
    pub anomaly: f64,
    /// Class of the best-fitting partition
    pub class: Option<i64>,
    /// Cluster of the best-fitting partition
    pub cluster: Option<usize>,
    /// Anomaly of each component
    pub deviations: Option<Vec<f64>>,
    /// One summary per row column; unread columns echo the input
    pub summaries: Option<Vec<FeatureSummary>>,
}

/// Output of [`AnomalyDetector::classify`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Classification {
    /// Class of the best-fitting partition
    pub class: Option<i64>,
    /// Cluster of the best-fitting partition (clustering only)
    pub cluster: Option<usize>,
    /// Combined anomaly against that partition
    pub anomaly: f64,
}

/// Full detector description: configuration plus component specs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorSpec {
    /// Detector configuration
    #[serde(default)]
    pub config: DetectorConfig,
    /// One spec per mixture component
    pub components: Vec<ComponentSpec>,
}

impl DetectorSpec {
    /// Parse a description from JSON
    ///
    /// Component kinds may be names or legacy integer codes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownDistribution`] for an unknown kind,
    /// [`Error::InvalidFeatures`] for an empty or repeating column list, or
    /// [`Error::Json`] for any other malformed document
    pub fn from_json(json: &str) -> Result<Self> {
        let mut value: serde_json::Value = serde_json::from_str(json)?;
        let components = value
            .get_mut("components")
            .and_then(serde_json::Value::as_array_mut);
        for component in components.into_iter().flatten() {
            if let Some(kind) = component.get_mut("kind") {
                let parsed = match kind {
                    serde_json::Value::String(name) => name.parse::<DistributionKind>()?,
                    serde_json::Value::Number(code) => {
                        let code = code
                            .as_i64()
                            .ok_or_else(|| Error::UnknownDistribution(format!("code {code}")))?;
                        DistributionKind::from_code(code)?
                    }
                    _ => continue,
                };
                *kind = serde_json::Value::String(parsed.to_string());
            }

            let columns = component
                .get("features")
                .and_then(serde_json::Value::as_array)
                .and_then(|features| {
                    features
                        .iter()
                        .map(|c| c.as_u64().and_then(|c| usize::try_from(c).ok()))
                        .collect::<Option<Vec<_>>>()
                });
            if let Some(columns) = columns {
                FeatureRange::new(columns)?;
            }
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Build an untrained detector over `format`
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the description does not fit `format`
    pub fn build(&self, format: &Format) -> Result<AnomalyDetector> {
        AnomalyDetector::new(format, &self.components, self.config.clone())
    }
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn to_usize(value: i64, what: &str) -> Result<usize> {
    usize::try_from(value).map_err(|_| Error::ModelMismatch(format!("negative {what}: {value}")))
}

/// Mixture-of-micro-models anomaly detector
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    width: usize,
    initial: DetectorConfig,
    config: DetectorConfig,
    components: Vec<MicroModel>,
    partitions: Vec<Partition>,
}

impl AnomalyDetector {
    /// Build an untrained detector from component specs
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid spec, a column outside
    /// `format`, or an invalid configuration
    pub fn new(format: &Format, specs: &[ComponentSpec], config: DetectorConfig) -> Result<Self> {
        Self::with_factory(format, &SpecFactory::new(specs), config)
    }

    /// Build an untrained detector, asking `factory` for each component once
    ///
    /// # Errors
    ///
    /// Returns the factory's error, or a configuration error if a component
    /// reads outside `format`
    pub fn with_factory(
        format: &Format,
        factory: &dyn ComponentFactory,
        config: DetectorConfig,
    ) -> Result<Self> {
        config.validate()?;
        let count = factory.component_count();
        if count == 0 {
            return Err(Error::InvalidConfig(
                "detector needs at least one component".to_string(),
            ));
        }

        let components = (0..count)
            .map(|i| factory.create(i))
            .collect::<Result<Vec<_>>>()?;
        let width = format.len();
        config.validate_layout(width, &components)?;

        info!(
            components = count,
            width,
            rule = %config.combination_rule,
            clustering = config.clustering,
            "anomaly detector created"
        );
        Ok(Self {
            width,
            initial: config.clone(),
            config,
            components,
            partitions: Vec::new(),
        })
    }

    /// Row width the detector accepts
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Current configuration
    #[must_use]
    pub const fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Number of mixture components (fixed at construction)
    #[must_use]
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Mixture components in order
    #[must_use]
    pub fn components(&self) -> &[MicroModel] {
        &self.components
    }

    /// Partition directory
    #[must_use]
    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    fn check_row(&self, row: &[Scalar]) -> Result<()> {
        if row.len() == self.width {
            Ok(())
        } else {
            Err(Error::LengthMismatch {
                what: "row",
                expected: self.width,
                actual: row.len(),
            })
        }
    }

    fn check_rows(&self, rows: &[Row]) -> Result<()> {
        rows.iter().try_for_each(|row| self.check_row(row))
    }

    fn class_of(&self, row: &[Scalar]) -> Option<i64> {
        self.config.split_attribute.map(|column| row[column].as_i64())
    }

    fn slices(&self, row: &[Scalar]) -> Vec<Vec<Scalar>> {
        self.components
            .iter()
            .map(|model| {
                let mut slice = Vec::with_capacity(model.features().len());
                model.features().gather(row, &mut slice);
                slice
            })
            .collect()
    }

    fn deviations<'a>(
        &'a self,
        partition: Option<usize>,
        slices: &'a [Vec<Scalar>],
    ) -> impl Iterator<Item = f64> + 'a {
        self.components
            .iter()
            .zip(slices.iter())
            .map(move |(model, slice)| model.anomaly(partition, slice))
    }

    fn combined(&self, partition: Option<usize>, slices: &[Vec<Scalar>]) -> f64 {
        self.config
            .combination_rule
            .combine(self.deviations(partition, slices))
    }

    fn class_partitions(&self, class: Option<i64>) -> impl Iterator<Item = usize> + '_ {
        self.partitions
            .iter()
            .enumerate()
            .filter(move |(_, p)| p.class == class)
            .map(|(i, _)| i)
    }

    fn live_partitions(&self, class: Option<i64>) -> impl Iterator<Item = usize> + '_ {
        self.class_partitions(class)
            .filter(move |&p| self.partitions[p].count > 0)
    }

    /// Lowest combined anomaly among `candidates` (first wins ties)
    fn best_of(
        &self,
        candidates: impl Iterator<Item = usize>,
        slices: &[Vec<Scalar>],
    ) -> Option<(usize, f64)> {
        candidates
            .map(|p| (p, self.combined(Some(p), slices)))
            .fold(None, |best, (p, anomaly)| match best {
                Some((_, lowest)) if lowest <= anomaly => best,
                _ => Some((p, anomaly)),
            })
    }

    /// Best partition of `class` and its anomaly; the prior when the class
    /// has no partition yet
    fn score_slices(&self, class: Option<i64>, slices: &[Vec<Scalar>]) -> (Option<usize>, f64) {
        self.best_of(self.class_partitions(class), slices).map_or_else(
            || (None, self.combined(None, slices)),
            |(p, anomaly)| (Some(p), anomaly),
        )
    }

    fn resize_components(&mut self) {
        let len = self.partitions.len();
        for model in &mut self.components {
            model.resize_partitions(len);
        }
    }

    fn open_partition(&mut self, class: Option<i64>) -> usize {
        let cluster = self.class_partitions(class).count();
        self.partitions.push(Partition {
            class,
            cluster,
            count: 0,
        });
        self.resize_components();
        debug!(?class, cluster, partitions = self.partitions.len(), "opened partition");
        self.partitions.len() - 1
    }

    /// Add one row to the model
    ///
    /// # Errors
    ///
    /// Returns [`Error::LengthMismatch`] if the row width differs from the
    /// schema
    pub fn train(&mut self, row: &[Scalar]) -> Result<()> {
        self.check_row(row)?;
        let class = self.class_of(row);
        let slices = self.slices(row);

        let target = if self.config.clustering {
            match self.best_of(self.class_partitions(class), &slices) {
                Some((p, anomaly)) if anomaly <= self.config.threshold => Some(p),
                _ => None,
            }
        } else {
            self.class_partitions(class).next()
        };
        let partition = match target {
            Some(p) => p,
            None => self.open_partition(class),
        };

        for (model, slice) in self.components.iter_mut().zip(&slices) {
            model.train(partition, slice);
        }
        self.partitions[partition].count += 1;
        Ok(())
    }

    /// Combined anomaly of `slices` against `partition` with the row taken
    /// out of it
    fn combined_without(&self, partition: usize, slices: &[Vec<Scalar>]) -> f64 {
        self.config.combination_rule.combine(
            self.components
                .iter()
                .zip(slices)
                .map(|(model, slice)| model.anomaly_without(partition, slice)),
        )
    }

    /// Partition that `train` placed this row in
    ///
    /// A live partition `q` that can hold the row qualifies when training the
    /// row on the state without it would have picked `q` again: either `q`
    /// wins (first index on ties) within the threshold, or no other partition
    /// of the class fits and `q` is the class's newest single-row partition.
    /// Among several qualifying partitions the one fitting the row best now
    /// wins. Rows matching no partition leave the best-fitting live one.
    fn untrain_target(&self, class: Option<i64>, slices: &[Vec<Scalar>]) -> Option<usize> {
        if !self.config.clustering {
            return self.live_partitions(class).next();
        }

        let threshold = self.config.threshold;
        let scores: Vec<(usize, f64)> = self
            .class_partitions(class)
            .map(|p| (p, self.combined(Some(p), slices)))
            .collect();
        let newest_single = self
            .class_partitions(class)
            .filter(|&p| self.partitions[p].count > 0)
            .last()
            .filter(|&p| self.partitions[p].count == 1);

        let mut joined: Option<(usize, f64)> = None;
        let mut opened = None;
        for &(q, current) in &scores {
            let holds = self.partitions[q].count > 0
                && self
                    .components
                    .iter()
                    .zip(slices)
                    .all(|(model, slice)| model.could_hold(q, slice));
            if !holds {
                continue;
            }

            let without = self.combined_without(q, slices);
            let beaten = scores
                .iter()
                .any(|&(r, score)| r != q && (score < without || (r < q && score <= without)));
            if without <= threshold && !beaten && joined.map_or(true, |(_, best)| current < best) {
                joined = Some((q, current));
            }
            if Some(q) == newest_single
                && scores.iter().all(|&(r, score)| r == q || score > threshold)
            {
                opened = Some(q);
            }
        }

        joined
            .map(|(p, _)| p)
            .or(opened)
            .or_else(|| self.best_of(self.live_partitions(class), slices).map(|(p, _)| p))
    }

    /// Remove one previously trained row from the model
    ///
    /// The row leaves the partition `train` put it in, so `train(r)` then
    /// `untrain(r)` restores the model. An emptied trailing partition is
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LengthMismatch`] for a wrong row width, or
    /// [`Error::InvalidInput`] if the row's class holds no trained rows
    pub fn untrain(&mut self, row: &[Scalar]) -> Result<()> {
        self.check_row(row)?;
        let class = self.class_of(row);
        let slices = self.slices(row);

        let Some(partition) = self.untrain_target(class, &slices) else {
            return Err(Error::InvalidInput(format!(
                "cannot untrain: no trained partition for class {class:?}"
            )));
        };

        for (model, slice) in self.components.iter_mut().zip(&slices) {
            model.untrain(partition, slice);
        }
        self.partitions[partition].count -= 1;

        let before = self.partitions.len();
        while self.partitions.last().is_some_and(|p| p.count == 0) {
            self.partitions.pop();
        }
        if self.partitions.len() != before {
            self.resize_components();
            debug!(partitions = self.partitions.len(), "dropped emptied partitions");
        }
        Ok(())
    }

    /// Train on every row in order
    ///
    /// All row widths are checked before any row is trained.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LengthMismatch`] if any row has the wrong width
    pub fn train_batch(&mut self, rows: &[Row]) -> Result<()> {
        self.check_rows(rows)?;
        rows.iter().try_for_each(|row| self.train(row))?;
        debug!(rows = rows.len(), partitions = self.partitions.len(), "trained batch");
        Ok(())
    }

    /// Untrain every row in order
    ///
    /// # Errors
    ///
    /// Returns error as [`untrain`](Self::untrain); rows before the failing
    /// one stay untrained
    pub fn untrain_batch(&mut self, rows: &[Row]) -> Result<()> {
        self.check_rows(rows)?;
        rows.iter().try_for_each(|row| self.untrain(row))
    }

    /// Combined anomaly of `row` (non-negative, higher is more anomalous)
    ///
    /// The row is scored against the partitions of its own class and the
    /// lowest anomaly wins; a class never trained scores against the prior.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LengthMismatch`] for a wrong row width
    pub fn score(&self, row: &[Scalar]) -> Result<f64> {
        self.check_row(row)?;
        let slices = self.slices(row);
        Ok(self.score_slices(self.class_of(row), &slices).1)
    }

    /// Score every row in order
    ///
    /// # Errors
    ///
    /// Returns [`Error::LengthMismatch`] if any row has the wrong width
    pub fn score_batch(&self, rows: &[Row]) -> Result<Vec<f64>> {
        rows.iter().map(|row| self.score(row)).collect()
    }

    /// Score every row into a caller buffer of exactly `rows.len()`
    ///
    /// # Errors
    ///
    /// Returns [`Error::LengthMismatch`] if `out` and `rows` differ in
    /// length, or a row has the wrong width
    pub fn score_batch_into(&self, rows: &[Row], out: &mut [f64]) -> Result<()> {
        if out.len() != rows.len() {
            return Err(Error::LengthMismatch {
                what: "anomaly output",
                expected: rows.len(),
                actual: out.len(),
            });
        }
        for (slot, row) in out.iter_mut().zip(rows) {
            *slot = self.score(row)?;
        }
        Ok(())
    }

    fn classify_slices(&self, slices: &[Vec<Scalar>]) -> Classification {
        match self.best_of(0..self.partitions.len(), slices) {
            Some((p, anomaly)) => {
                let partition = &self.partitions[p];
                Classification {
                    class: partition.class,
                    cluster: self.config.clustering.then_some(partition.cluster),
                    anomaly,
                }
            }
            None => Classification {
                class: None,
                cluster: None,
                anomaly: self.combined(None, slices),
            },
        }
    }

    /// Predict class and cluster of one row from its best-fitting partition
    ///
    /// # Errors
    ///
    /// Returns [`Error::LengthMismatch`] for a wrong row width
    pub fn classify_row(&self, row: &[Scalar]) -> Result<Classification> {
        self.check_row(row)?;
        Ok(self.classify_slices(&self.slices(row)))
    }

    /// Classify every row in order
    ///
    /// # Errors
    ///
    /// Returns [`Error::LengthMismatch`] if any row has the wrong width
    pub fn classify(&self, rows: &[Row]) -> Result<Vec<Classification>> {
        rows.iter().map(|row| self.classify_row(row)).collect()
    }

    /// Classify every row into a caller buffer of exactly `rows.len()`
    ///
    /// # Errors
    ///
    /// Returns [`Error::LengthMismatch`] if `out` and `rows` differ in
    /// length, or a row has the wrong width
    pub fn classify_into(&self, rows: &[Row], out: &mut [Classification]) -> Result<()> {
        if out.len() != rows.len() {
            return Err(Error::LengthMismatch {
                what: "classification output",
                expected: rows.len(),
                actual: out.len(),
            });
        }
        for (slot, row) in out.iter_mut().zip(rows) {
            *slot = self.classify_row(row)?;
        }
        Ok(())
    }

    /// Combined anomaly plus the outputs selected by `request`
    ///
    /// Outputs not requested are not computed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LengthMismatch`] for a wrong row width
    pub fn score_details(&self, row: &[Scalar], request: DetailRequest) -> Result<Details> {
        self.check_row(row)?;
        let slices = self.slices(row);
        let (partition, anomaly) = self.score_slices(self.class_of(row), &slices);

        let predicted = (request.class || request.cluster).then(|| self.classify_slices(&slices));
        let class = predicted.filter(|_| request.class).and_then(|c| c.class);
        let cluster = predicted.filter(|_| request.cluster).and_then(|c| c.cluster);

        let deviations = request
            .deviations
            .then(|| self.deviations(partition, &slices).collect::<Vec<_>>());
        let summaries = request
            .summaries
            .then(|| self.summaries(partition, row, &slices));

        Ok(Details {
            anomaly,
            class,
            cluster,
            deviations,
            summaries,
        })
    }

    fn summaries(
        &self,
        partition: Option<usize>,
        row: &[Scalar],
        slices: &[Vec<Scalar>],
    ) -> Vec<FeatureSummary> {
        let mut out: Vec<FeatureSummary> = row.iter().copied().map(FeatureSummary::fixed).collect();
        for (model, slice) in self.components.iter().zip(slices) {
            let described = model.describe(partition, slice, self.config.threshold);
            for (&column, summary) in model.features().columns().iter().zip(described) {
                out[column] = summary;
            }
        }
        out
    }

    /// Natural log of the predictive probability of `row`
    ///
    /// Mixes the partitions of the row's class weighted by their row counts;
    /// an untrained class uses the prior.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LengthMismatch`] for a wrong row width
    #[allow(clippy::cast_precision_loss)]
    pub fn log_probability(&self, row: &[Scalar]) -> Result<f64> {
        self.check_row(row)?;
        let slices = self.slices(row);
        let joint = |partition: Option<usize>| -> f64 {
            self.components
                .iter()
                .zip(&slices)
                .map(|(model, slice)| model.log_probability(partition, slice))
                .sum()
        };

        let class = self.class_of(row);
        let total: i64 = self
            .live_partitions(class)
            .map(|p| self.partitions[p].count)
            .sum();
        if total <= 0 {
            return Ok(joint(None));
        }

        let ln_total = (total as f64).ln();
        Ok(self.live_partitions(class).fold(f64::NEG_INFINITY, |acc, p| {
            let weight = (self.partitions[p].count as f64).ln() - ln_total;
            ln_add(acc, weight + joint(Some(p)))
        }))
    }

    /// Log probability of every row in order
    ///
    /// # Errors
    ///
    /// Returns [`Error::LengthMismatch`] if any row has the wrong width
    pub fn log_probability_batch(&self, rows: &[Row]) -> Result<Vec<f64>> {
        rows.iter().map(|row| self.log_probability(row)).collect()
    }

    /// Forget all training and restore the construction-time configuration
    pub fn reset(&mut self) {
        for model in &mut self.components {
            model.reset();
        }
        self.partitions.clear();
        self.config = self.initial.clone();
        info!("anomaly detector reset");
    }

    /// Change layout and sensitivity without rebuilding components
    ///
    /// The combination rule is fixed at construction.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the new layout does not fit the
    /// schema or components; the detector is unchanged on error
    pub fn set_params(
        &mut self,
        offset: usize,
        split_attribute: Option<usize>,
        threshold: f64,
        clustering: bool,
    ) -> Result<()> {
        let config = DetectorConfig {
            offset,
            split_attribute,
            threshold,
            clustering,
            combination_rule: self.config.combination_rule,
        };
        config.validate()?;
        config.validate_layout(self.width, &self.components)?;

        if !self.partitions.is_empty()
            && (split_attribute != self.config.split_attribute || clustering != self.config.clustering)
        {
            warn!(
                partitions = self.partitions.len(),
                "partition layout changed on a trained detector; existing partitions are kept"
            );
        }
        info!(offset, ?split_attribute, threshold, clustering, "detector parameters set");
        self.config = config;
        Ok(())
    }

    /// Export the whole model as a pretty JSON document
    ///
    /// # Errors
    ///
    /// Returns error if a statistic is not finite
    pub fn export_json(&self) -> Result<String> {
        let mut doc = JsonDocument::new();
        self.export_state(&mut doc.exporter())?;
        doc.to_json_string()
    }

    /// Restore the model from a JSON document produced by
    /// [`export_json`](Self::export_json)
    ///
    /// # Errors
    ///
    /// Returns a persistence error if the document is malformed or describes
    /// a different detector; the detector is unchanged on error
    pub fn import_json(&mut self, json: &str) -> Result<()> {
        let doc = JsonDocument::parse(json)?;
        self.import_state(&doc.importer())
    }

    /// Write the model to a JSON file
    ///
    /// # Errors
    ///
    /// Returns error if export fails or the file cannot be written
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut doc = JsonDocument::new();
        self.export_state(&mut doc.exporter())?;
        doc.save(path)
    }

    /// Restore the model from a JSON file written by [`save`](Self::save)
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or its document does not
    /// match this detector
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let doc = JsonDocument::load(path)?;
        self.import_state(&doc.importer())
    }
}

impl PersistentModel for AnomalyDetector {
    fn export_state(&self, exporter: &mut dyn ModelExporter) -> Result<()> {
        {
            let mut section = exporter.create_child(Key::Name(DETECTOR_SECTION))?;
            section.add_int("component_count", to_i64(self.components.len()))?;
            section.add_int("width", to_i64(self.width))?;
            section.add_int("offset", to_i64(self.config.offset))?;
            section.add_int("split_attribute", self.config.legacy_split())?;
            section.add_double("threshold", self.config.threshold)?;
            section.add_int("clustering", i64::from(self.config.clustering))?;
            section.add_int("combination_rule", self.config.combination_rule.code())?;

            let classes: Vec<i64> = self.partitions.iter().map(|p| p.class.unwrap_or(0)).collect();
            let classified: Vec<i64> = self
                .partitions
                .iter()
                .map(|p| i64::from(p.class.is_some()))
                .collect();
            let clusters: Vec<i64> = self.partitions.iter().map(|p| to_i64(p.cluster)).collect();
            let counts: Vec<i64> = self.partitions.iter().map(|p| p.count).collect();
            section.add_int("partitions", to_i64(self.partitions.len()))?;
            section.add_int_array("partition_classes", &classes)?;
            section.add_int_array("partition_classified", &classified)?;
            section.add_int_array("partition_clusters", &clusters)?;
            section.add_int_array("partition_counts", &counts)?;
        }

        for (index, model) in self.components.iter().enumerate() {
            let mut child = exporter.create_child(Key::Index(index))?;
            model.export_state(child.as_mut())?;
        }
        debug!(
            components = self.components.len(),
            partitions = self.partitions.len(),
            "exported anomaly detector"
        );
        Ok(())
    }

    fn import_state(&mut self, importer: &dyn ModelImporter) -> Result<()> {
        let section = importer.get_child(Key::Name(DETECTOR_SECTION))?;

        let count = section.get_int("component_count")?;
        if count != to_i64(self.components.len()) {
            return Err(Error::ModelMismatch(format!(
                "document holds {count} components, detector has {}",
                self.components.len()
            )));
        }
        let width = section.get_int("width")?;
        if width != to_i64(self.width) {
            return Err(Error::ModelMismatch(format!(
                "document rows are {width} columns wide, detector expects {}",
                self.width
            )));
        }

        let config = DetectorConfig {
            offset: to_usize(section.get_int("offset")?, "offset")?,
            split_attribute: None,
            threshold: section.get_double("threshold")?,
            clustering: section.get_int("clustering")? != 0,
            combination_rule: CombinationRule::from_code(section.get_int("combination_rule")?)?,
        }
        .with_legacy_split(section.get_int("split_attribute")?);
        config.validate()?;
        config.validate_layout(self.width, &self.components)?;

        let len = to_usize(section.get_int("partitions")?, "partition count")?;
        let mut classes = vec![0; len];
        let mut classified = vec![0; len];
        let mut clusters = vec![0; len];
        let mut counts = vec![0; len];
        section.get_int_array("partition_classes", &mut classes)?;
        section.get_int_array("partition_classified", &mut classified)?;
        section.get_int_array("partition_clusters", &mut clusters)?;
        section.get_int_array("partition_counts", &mut counts)?;
        let partitions = (0..len)
            .map(|i| {
                Ok(Partition {
                    class: (classified[i] != 0).then_some(classes[i]),
                    cluster: to_usize(clusters[i], "cluster")?,
                    count: counts[i],
                })
            })
            .collect::<Result<Vec<_>>>()?;
        drop(section);

        let mut components = self.components.clone();
        for (index, model) in components.iter_mut().enumerate() {
            let child = importer.get_child(Key::Index(index))?;
            model.import_state(child.as_ref())?;
            if model.partition_count() > len {
                return Err(Error::ModelMismatch(format!(
                    "component {index} holds {} partitions, directory lists {len}",
                    model.partition_count()
                )));
            }
            model.resize_partitions(len);
        }

        self.config = config;
        self.partitions = partitions;
        self.components = components;
        info!(
            components = self.components.len(),
            partitions = len,
            "imported anomaly detector"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::RowCodec;
    use crate::format::ColumnType;

    fn value_format() -> Format {
        Format::new()
            .with_column("class", ColumnType::Discrete)
            .with_column("value", ColumnType::Continuous)
    }

    fn row(format: &Format, values: &[f64]) -> Row {
        RowCodec::encode(format, values).unwrap()
    }

    fn gaussian_detector(config: DetectorConfig) -> (Format, AnomalyDetector) {
        let format = value_format();
        let specs = vec![ComponentSpec::gaussian(vec![1]).unwrap()];
        let detector = AnomalyDetector::new(&format, &specs, config).unwrap();
        (format, detector)
    }

    // ========================================================================
    // Combination rule
    // ========================================================================

    #[test]
    fn test_combine_rules() {
        let scores = [0.5, 2.0, 1.25];
        assert!((CombinationRule::Plus.combine(scores) - 3.75).abs() < 1e-12);
        assert!((CombinationRule::Max.combine(scores) - 2.0).abs() < 1e-12);
        assert!(CombinationRule::Max.combine(std::iter::empty()).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rule_parsing() {
        assert_eq!("sum".parse::<CombinationRule>().unwrap(), CombinationRule::Plus);
        assert_eq!("MAX".parse::<CombinationRule>().unwrap(), CombinationRule::Max);
        assert!("min".parse::<CombinationRule>().is_err());
        assert!(CombinationRule::from_code(5).is_err());
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    #[test]
    fn test_builder_rejects_bad_threshold() {
        assert!(DetectorConfig::builder().threshold(-1.0).build().is_err());
        assert!(DetectorConfig::builder().threshold(f64::NAN).build().is_err());
        let config = DetectorConfig::builder().threshold(1.5).build().unwrap();
        assert!((config.threshold - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_legacy_split() {
        let config = DetectorConfig::default().with_legacy_split(-1);
        assert_eq!(config.split_attribute, None);
        assert_eq!(config.legacy_split(), -1);

        let config = DetectorConfig::builder().legacy_split(3).build().unwrap();
        assert_eq!(config.split_attribute, Some(3));
        assert_eq!(config.legacy_split(), 3);
    }

    #[test]
    fn test_feature_before_offset_rejected() {
        let format = value_format();
        let specs = vec![ComponentSpec::gaussian(vec![0, 1]).unwrap()];
        let config = DetectorConfig::builder().offset(1).build().unwrap();
        let err = AnomalyDetector::new(&format, &specs, config).unwrap_err();
        assert!(matches!(err, Error::InvalidFeatureRange { component: 0, .. }));
    }

    #[test]
    fn test_split_past_schema_rejected() {
        let format = value_format();
        let specs = vec![ComponentSpec::gaussian(vec![1]).unwrap()];
        let config = DetectorConfig::builder().split_attribute(2).build().unwrap();
        assert!(matches!(
            AnomalyDetector::new(&format, &specs, config),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_spec_from_json() {
        let spec = DetectorSpec::from_json(
            r#"{
                "config": {"offset": 1, "threshold": 2.0, "combination_rule": "sum"},
                "components": [{"kind": "gaussian", "features": [1]}]
            }"#,
        )
        .unwrap();
        let detector = spec.build(&value_format()).unwrap();
        assert_eq!(detector.config().combination_rule, CombinationRule::Plus);
        assert_eq!(detector.config().offset, 1);
        assert_eq!(detector.component_count(), 1);
    }

    #[test]
    fn test_spec_from_json_accepts_codes() {
        let spec = DetectorSpec::from_json(
            r#"{"components": [{"kind": 1, "features": [0, 1]}, {"kind": "normal", "features": [2]}]}"#,
        )
        .unwrap();
        assert_eq!(spec.components[0].kind, DistributionKind::Poisson);
        assert_eq!(spec.components[1].kind, DistributionKind::Gaussian);
    }

    #[test]
    fn test_spec_from_json_configuration_errors() {
        for json in [
            r#"{"components": [{"kind": "weibull", "features": [1]}]}"#,
            r#"{"components": [{"kind": 7, "features": [1]}]}"#,
        ] {
            let err = DetectorSpec::from_json(json).unwrap_err();
            assert!(matches!(err, Error::UnknownDistribution(_)), "{json}: {err:?}");
            assert!(err.is_configuration());
        }

        let err = DetectorSpec::from_json(r#"{"components": [{"kind": "gaussian", "features": []}]}"#)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidFeatures(_)));
        assert!(err.is_configuration());

        let err = DetectorSpec::from_json(r#"{"components": 3}"#).unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    // ========================================================================
    // Training and partitions
    // ========================================================================

    #[test]
    fn test_untrain_drops_emptied_partition() {
        let (format, mut detector) = gaussian_detector(DetectorConfig::default());
        let r = row(&format, &[0.0, 1.5]);
        detector.train(&r).unwrap();
        assert_eq!(detector.partitions().len(), 1);
        detector.untrain(&r).unwrap();
        assert!(detector.partitions().is_empty());
        assert_eq!(detector.components()[0].partition_count(), 0);
    }

    #[test]
    fn test_untrain_unknown_class_fails() {
        let config = DetectorConfig::builder().split_attribute(0).offset(1).build().unwrap();
        let (format, mut detector) = gaussian_detector(config);
        detector.train(&row(&format, &[1.0, 0.0])).unwrap();
        assert!(matches!(
            detector.untrain(&row(&format, &[2.0, 0.0])),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_clustering_opens_new_cluster() {
        let config = DetectorConfig::builder()
            .offset(1)
            .clustering(true)
            .threshold(1.0)
            .build()
            .unwrap();
        let (format, mut detector) = gaussian_detector(config);

        detector.train(&row(&format, &[0.0, 0.0])).unwrap();
        detector.train(&row(&format, &[0.0, 100.0])).unwrap();
        detector.train(&row(&format, &[0.0, 0.1])).unwrap();

        let partitions = detector.partitions();
        assert_eq!(partitions.len(), 2);
        assert_eq!(partitions[0].count, 2);
        assert_eq!(partitions[1].cluster, 1);

        let far = detector.classify_row(&row(&format, &[0.0, 100.2])).unwrap();
        assert_eq!(far.cluster, Some(1));
    }

    fn poisson_detector(config: DetectorConfig) -> (Format, AnomalyDetector) {
        let format = Format::new()
            .with_column("events", ColumnType::Discrete)
            .with_column("hours", ColumnType::Discrete);
        let specs = vec![ComponentSpec::poisson(0, 1).unwrap()];
        let detector = AnomalyDetector::new(&format, &specs, config).unwrap();
        (format, detector)
    }

    #[test]
    fn test_identical_counts_share_a_cluster() {
        let config = DetectorConfig::builder()
            .clustering(true)
            .threshold(3.0)
            .build()
            .unwrap();
        let (format, mut detector) = poisson_detector(config);
        for _ in 0..10 {
            detector.train(&row(&format, &[100.0, 1.0])).unwrap();
        }
        assert_eq!(detector.partitions().len(), 1);
        assert_eq!(detector.partitions()[0].count, 10);
    }

    #[test]
    fn test_untrain_reverses_rejected_row_under_clustering() {
        let (format, mut detector) = poisson_detector(DetectorConfig::default());
        for events in [66.0, 68.0, 69.0, 70.0, 70.0, 71.0, 72.0, 74.0] {
            detector.train(&row(&format, &[events, 1.0])).unwrap();
        }
        detector.set_params(0, None, 1.0, true).unwrap();

        let before = detector.clone();
        let usual = row(&format, &[70.0, 1.0]);
        let burst = row(&format, &[100.0, 1.0]);

        detector.train(&burst).unwrap();
        assert_eq!(detector.partitions().len(), 2);
        detector.untrain(&burst).unwrap();

        assert_eq!(detector.partitions(), before.partitions());
        assert_eq!(detector.components(), before.components());
        let a = detector.score(&usual).unwrap();
        let b = before.score(&usual).unwrap();
        assert!((a - b).abs() < 1e-12, "{a} != {b}");
    }

    #[test]
    fn test_untrain_reverses_joined_row_under_clustering() {
        let config = DetectorConfig::builder()
            .offset(1)
            .clustering(true)
            .threshold(2.0)
            .build()
            .unwrap();
        let (format, mut detector) = gaussian_detector(config);
        for value in [0.0, 0.3, -0.2, 50.0, 50.4, 49.8] {
            detector.train(&row(&format, &[0.0, value])).unwrap();
        }
        assert_eq!(detector.partitions().len(), 2);

        let before = detector.partitions().to_vec();
        let joiner = row(&format, &[0.0, 49.9]);
        detector.train(&joiner).unwrap();
        detector.untrain(&joiner).unwrap();
        assert_eq!(detector.partitions(), before.as_slice());
    }

    #[test]
    fn test_classes_are_scored_separately() {
        let config = DetectorConfig::builder().offset(1).split_attribute(0).build().unwrap();
        let (format, mut detector) = gaussian_detector(config);
        for i in 0..20 {
            let jitter = f64::from(i % 5) * 0.1;
            detector.train(&row(&format, &[1.0, jitter])).unwrap();
            detector.train(&row(&format, &[2.0, 10.0 + jitter])).unwrap();
        }

        let own = detector.score(&row(&format, &[2.0, 10.2])).unwrap();
        let other = detector.score(&row(&format, &[1.0, 10.2])).unwrap();
        assert!(other > own + 5.0);

        let predicted = detector.classify_row(&row(&format, &[1.0, 10.2])).unwrap();
        assert_eq!(predicted.class, Some(2));
        assert_eq!(predicted.cluster, None);
    }

    #[test]
    fn test_unseen_class_scores_against_prior() {
        let config = DetectorConfig::builder().offset(1).split_attribute(0).build().unwrap();
        let (format, mut detector) = gaussian_detector(config);
        detector.train(&row(&format, &[1.0, 50.0])).unwrap();
        // Prior is a standard normal centred on 0
        assert!(detector.score(&row(&format, &[7.0, 0.0])).unwrap().abs() < 1e-12);
    }

    // ========================================================================
    // Outputs
    // ========================================================================

    #[test]
    fn test_batch_output_length_checked() {
        let (format, detector) = gaussian_detector(DetectorConfig::default());
        let rows = vec![row(&format, &[0.0, 1.0]), row(&format, &[0.0, 2.0])];

        let mut short = [0.0; 1];
        assert!(matches!(
            detector.score_batch_into(&rows, &mut short),
            Err(Error::LengthMismatch { expected: 2, actual: 1, .. })
        ));
        let mut long = vec![Classification::default(); 3];
        assert!(detector.classify_into(&rows, &mut long).is_err());

        let mut out = [0.0; 2];
        detector.score_batch_into(&rows, &mut out).unwrap();
        assert_eq!(out.to_vec(), detector.score_batch(&rows).unwrap());
    }

    #[test]
    fn test_wrong_row_width() {
        let (_, mut detector) = gaussian_detector(DetectorConfig::default());
        let short = Row::from(vec![Scalar::Float(1.0)]);
        assert!(matches!(
            detector.train(&short),
            Err(Error::LengthMismatch { what: "row", .. })
        ));
        assert!(detector.score(&short).is_err());
    }

    #[test]
    fn test_details_skip_unrequested() {
        let (format, mut detector) = gaussian_detector(DetectorConfig::default());
        detector.train(&row(&format, &[0.0, 1.0])).unwrap();
        let r = row(&format, &[0.0, 1.4]);

        let bare = detector.score_details(&r, DetailRequest::default()).unwrap();
        assert!((bare.anomaly - detector.score(&r).unwrap()).abs() < 1e-12);
        assert!(bare.deviations.is_none());
        assert!(bare.summaries.is_none());

        let full = detector.score_details(&r, DetailRequest::all()).unwrap();
        assert_eq!(full.deviations.as_ref().map(Vec::len), Some(1));
        let summaries = full.summaries.unwrap();
        assert_eq!(summaries.len(), 2);
        // Column 0 is not read by any component
        assert_eq!(summaries[0], FeatureSummary::fixed(Scalar::Int(0)));
    }

    #[test]
    fn test_log_probability_untrained_is_prior() {
        let (format, detector) = gaussian_detector(DetectorConfig::default());
        let lp = detector.log_probability(&row(&format, &[0.0, 0.0])).unwrap();
        assert!((lp + 0.5 * (2.0 * std::f64::consts::PI).ln()).abs() < 1e-12);
    }

    // ========================================================================
    // Reset and parameters
    // ========================================================================

    #[test]
    fn test_reset_restores_construction_config() {
        let (format, mut detector) = gaussian_detector(DetectorConfig::default());
        let untrained = detector.score(&row(&format, &[0.0, 3.0])).unwrap();

        detector.train(&row(&format, &[0.0, 3.0])).unwrap();
        detector.set_params(1, None, 4.0, true).unwrap();
        detector.reset();

        assert_eq!(detector.config(), &DetectorConfig::default());
        assert!(detector.partitions().is_empty());
        let after = detector.score(&row(&format, &[0.0, 3.0])).unwrap();
        assert!((after - untrained).abs() < 1e-12);
    }

    #[test]
    fn test_set_params_validates_layout() {
        let (_, mut detector) = gaussian_detector(DetectorConfig::default());
        assert!(detector.set_params(2, None, 1.0, false).is_err());
        assert!(detector.set_params(0, Some(5), 1.0, false).is_err());
        assert!(detector.set_params(0, None, -0.5, false).is_err());
        assert_eq!(detector.config(), &DetectorConfig::default());
    }
}
