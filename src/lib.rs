//! # Trueno-ISC: Online Mixture-of-Micro-Models Anomaly Detection
//!
//! **Version**: 0.1.0
//!
//! Trueno-ISC scores rows of mixed discrete/continuous data against a
//! mixture of small probabilistic models ("micro-models"), one per group of
//! feature columns. Models learn online (`train`/`untrain`), combine their
//! per-component surprise under a static rule, and persist the whole
//! component tree through a recursive export/import protocol.
//!
//! ## Design Principles (Toyota Way Aligned)
//!
//! - **Poka-Yoke safety**: layout errors fail once, at construction
//! - **Jidoka**: wrong-length buffers stop the call with a typed error
//! - **Genchi Genbutsu**: anomaly is `-ln(p-value)`, a measurable surprise
//! - **Kaizen**: `untrain` supports sliding-window models
//!
//! ## Example Usage
//!
//! ```rust
//! use trueno_isc::codec::RowCodec;
//! use trueno_isc::detector::{AnomalyDetector, ComponentSpec, DetectorConfig};
//! use trueno_isc::format::{ColumnType, Format};
//!
//! # fn main() -> trueno_isc::Result<()> {
//! let format = Format::new()
//!     .with_column("x", ColumnType::Continuous)
//!     .with_column("y", ColumnType::Continuous);
//! let specs = vec![ComponentSpec::gaussian(vec![0, 1])?];
//! let mut detector = AnomalyDetector::new(&format, &specs, DetectorConfig::default())?;
//!
//! for i in 0..50 {
//!     let t = f64::from(i) / 10.0;
//!     detector.train(&RowCodec::encode(&format, &[t, 2.0 * t])?)?;
//! }
//! let anomaly = detector.score(&RowCodec::encode(&format, &[2.0, -3.0])?)?;
//! assert!(anomaly > 10.0);
//!
//! // Snapshot and restore
//! let json = detector.export_json()?;
//! let mut restored = AnomalyDetector::new(&format, &specs, DetectorConfig::default())?;
//! restored.import_json(&json)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod codec;
pub mod detector;
pub mod error;
pub mod format;
pub mod model;
pub mod persist;

pub use codec::{DataObject, Row, RowCodec, Scalar};
pub use detector::{
    AnomalyDetector, Classification, CombinationRule, ComponentSpec, DetailRequest, Details,
    DetectorConfig, DetectorSpec,
};
pub use error::{Error, Result};
pub use format::{ColumnType, Format};
pub use model::{DistributionKind, FeatureRange, MicroModel};
