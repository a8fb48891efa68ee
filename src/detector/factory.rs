//! Component Factory: builds one micro-model per mixture component
//!
//! The detector asks its factory for each component exactly once, at
//! construction time. [`SpecFactory`] covers the usual case of a static
//! list of [`ComponentSpec`]s; custom factories implement
//! [`ComponentFactory`].

use crate::model::{DistributionKind, FeatureRange, GaussianModel, MicroModel, PoissonModel};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Columns a Poisson component reads: `[frequency, period]`
pub const POISSON_FEATURES: usize = 2;

/// One mixture component: distribution kind plus the columns it consumes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentSpec {
    /// Distribution kind
    pub kind: DistributionKind,
    /// Absolute column indices read by the component
    pub features: FeatureRange,
}

impl ComponentSpec {
    /// Create a spec
    #[must_use]
    pub const fn new(kind: DistributionKind, features: FeatureRange) -> Self {
        Self { kind, features }
    }

    /// Create a spec from a legacy integer kind code
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownDistribution`] for an unknown code, or
    /// [`Error::InvalidFeatures`] for an empty or repeating column list
    pub fn from_code(code: i64, columns: Vec<usize>) -> Result<Self> {
        Ok(Self {
            kind: DistributionKind::from_code(code)?,
            features: FeatureRange::new(columns)?,
        })
    }

    /// Gaussian component over `columns`
    ///
    /// # Errors
    ///
    /// Returns error if `columns` is empty or repeats a column
    pub fn gaussian(columns: Vec<usize>) -> Result<Self> {
        Ok(Self::new(DistributionKind::Gaussian, FeatureRange::new(columns)?))
    }

    /// Two-sided Poisson component over `[frequency, period]`
    ///
    /// # Errors
    ///
    /// Returns error if the two columns are equal
    pub fn poisson(frequency: usize, period: usize) -> Result<Self> {
        Ok(Self::new(
            DistributionKind::Poisson,
            FeatureRange::new(vec![frequency, period])?,
        ))
    }

    /// One-sided Poisson component over `[frequency, period]`
    ///
    /// # Errors
    ///
    /// Returns error if the two columns are equal
    pub fn poisson_oneside(frequency: usize, period: usize) -> Result<Self> {
        Ok(Self::new(
            DistributionKind::PoissonOneside,
            FeatureRange::new(vec![frequency, period])?,
        ))
    }
}

/// Builds the micro-model of each mixture component
pub trait ComponentFactory {
    /// Number of components this factory builds
    fn component_count(&self) -> usize;

    /// Build the micro-model of component `component`
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the component cannot be built
    fn create(&self, component: usize) -> Result<MicroModel>;
}

/// Factory over a static list of component specs
#[derive(Debug, Clone, Copy)]
pub struct SpecFactory<'a> {
    specs: &'a [ComponentSpec],
}

impl<'a> SpecFactory<'a> {
    /// Create a factory over `specs`
    #[must_use]
    pub const fn new(specs: &'a [ComponentSpec]) -> Self {
        Self { specs }
    }
}

impl ComponentFactory for SpecFactory<'_> {
    fn component_count(&self) -> usize {
        self.specs.len()
    }

    fn create(&self, component: usize) -> Result<MicroModel> {
        let spec = self.specs.get(component).ok_or_else(|| {
            Error::InvalidConfig(format!(
                "component {component} requested from a factory of {} specs",
                self.specs.len()
            ))
        })?;
        create_micro_model(component, spec)
    }
}

/// Build the micro-model for `spec`, checking its column count
///
/// # Errors
///
/// Returns [`Error::InvalidFeatureRange`] if a Poisson kind does not read
/// exactly two columns
pub fn create_micro_model(component: usize, spec: &ComponentSpec) -> Result<MicroModel> {
    let features = spec.features.clone();
    match spec.kind {
        DistributionKind::Gaussian => Ok(MicroModel::Gaussian(GaussianModel::new(features))),
        DistributionKind::Poisson | DistributionKind::PoissonOneside => {
            if features.len() != POISSON_FEATURES {
                return Err(Error::InvalidFeatureRange {
                    component,
                    reason: format!(
                        "{} needs {POISSON_FEATURES} columns (frequency, period), got {}",
                        spec.kind,
                        features.len()
                    ),
                });
            }
            let model = PoissonModel::new(features);
            Ok(if spec.kind == DistributionKind::Poisson {
                MicroModel::Poisson(model)
            } else {
                MicroModel::PoissonOneside(model)
            })
        }
    }
}
