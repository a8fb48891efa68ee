//! End-to-end detector scenarios
//!
//! Run with `RUST_LOG=trueno_isc=debug cargo test --test scenario_test -- --nocapture`
//! to see the detector's tracing output.

use trueno_isc::codec::{DataObject, RowCodec};
use trueno_isc::detector::{
    AnomalyDetector, CombinationRule, ComponentSpec, DetailRequest, DetectorConfig,
};
use trueno_isc::format::{ColumnType, Format};
use trueno_isc::{DistributionKind, Error, Row};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Columns 0-3 discrete (two metadata columns, then frequency/period),
/// columns 4-5 continuous
fn mixed_format() -> Format {
    Format::new()
        .with_column("id", ColumnType::Discrete)
        .with_column("class", ColumnType::Discrete)
        .with_column("events", ColumnType::Discrete)
        .with_column("hours", ColumnType::Discrete)
        .with_column("x", ColumnType::Continuous)
        .with_column("y", ColumnType::Continuous)
}

fn mixed_specs() -> Vec<ComponentSpec> {
    vec![
        ComponentSpec::poisson(2, 3).unwrap(),
        ComponentSpec::gaussian(vec![4, 5]).unwrap(),
    ]
}

fn mixed_config(rule: CombinationRule) -> DetectorConfig {
    DetectorConfig::builder()
        .offset(2)
        .legacy_split(-1)
        .threshold(1.5)
        .combination_rule(rule)
        .build()
        .unwrap()
}

fn row(format: &Format, values: &[f64]) -> Row {
    RowCodec::encode(format, values).unwrap()
}

// ============================================================================
// Two-component mixture
// ============================================================================

#[test]
fn test_poisson_gaussian_mixture_scores_deterministically() {
    init_tracing();
    let format = mixed_format();
    let mut detector =
        AnomalyDetector::new(&format, &mixed_specs(), mixed_config(CombinationRule::Plus)).unwrap();

    detector.train(&row(&format, &[0.0, 0.0, 5.0, 2.0, 1.0, 2.0])).unwrap();
    detector.train(&row(&format, &[0.0, 0.0, 3.0, 1.0, 1.5, 1.8])).unwrap();

    let probe = row(&format, &[0.0, 0.0, 4.0, 2.0, 1.2, 1.9]);
    let first = detector.score(&probe).unwrap();
    let second = detector.score(&probe).unwrap();

    assert!(first.is_finite());
    assert!(first >= 0.0);
    assert_eq!(first.to_bits(), second.to_bits());
}

#[test]
fn test_plus_is_sum_of_deviations() {
    let format = mixed_format();
    let mut detector =
        AnomalyDetector::new(&format, &mixed_specs(), mixed_config(CombinationRule::Plus)).unwrap();
    detector.train(&row(&format, &[0.0, 0.0, 5.0, 2.0, 1.0, 2.0])).unwrap();
    detector.train(&row(&format, &[0.0, 0.0, 3.0, 1.0, 1.5, 1.8])).unwrap();

    let probe = row(&format, &[0.0, 0.0, 9.0, 1.0, 3.0, 0.0]);
    let details = detector
        .score_details(
            &probe,
            DetailRequest {
                deviations: true,
                ..DetailRequest::default()
            },
        )
        .unwrap();
    let deviations = details.deviations.unwrap();

    assert_eq!(deviations.len(), 2);
    assert!((details.anomaly - deviations.iter().sum::<f64>()).abs() < 1e-12);
    assert!(details.summaries.is_none());
}

#[test]
fn test_changing_rule_changes_only_the_combination() {
    let format = mixed_format();
    let rows = vec![
        row(&format, &[0.0, 0.0, 5.0, 2.0, 1.0, 2.0]),
        row(&format, &[0.0, 0.0, 3.0, 1.0, 1.5, 1.8]),
        row(&format, &[0.0, 0.0, 4.0, 2.0, 1.1, 2.1]),
    ];
    let mut plus =
        AnomalyDetector::new(&format, &mixed_specs(), mixed_config(CombinationRule::Plus)).unwrap();
    let mut max =
        AnomalyDetector::new(&format, &mixed_specs(), mixed_config(CombinationRule::Max)).unwrap();
    plus.train_batch(&rows).unwrap();
    max.train_batch(&rows).unwrap();

    assert_eq!(plus.components(), max.components());

    let probe = row(&format, &[0.0, 0.0, 12.0, 1.0, 0.0, 4.0]);
    let deviations = plus
        .score_details(&probe, DetailRequest { deviations: true, ..DetailRequest::default() })
        .unwrap()
        .deviations
        .unwrap();
    let highest = deviations.iter().copied().fold(0.0, f64::max);

    assert!((max.score(&probe).unwrap() - highest).abs() < 1e-12);
    assert!(plus.score(&probe).unwrap() >= max.score(&probe).unwrap());
}

#[test]
fn test_summaries_cover_component_columns() {
    let format = mixed_format();
    let mut detector =
        AnomalyDetector::new(&format, &mixed_specs(), mixed_config(CombinationRule::Plus)).unwrap();
    for i in 0..30 {
        let t = f64::from(i % 6);
        detector
            .train(&row(&format, &[0.0, 0.0, 4.0 + t, 2.0, 1.0 + 0.1 * t, 2.0 - 0.1 * t]))
            .unwrap();
    }

    let probe = row(&format, &[7.0, 0.0, 6.0, 2.0, 1.2, 1.8]);
    let summaries = detector
        .score_details(&probe, DetailRequest::all())
        .unwrap()
        .summaries
        .unwrap();

    assert_eq!(summaries.len(), format.len());
    // Untouched metadata column echoes the input
    assert!((summaries[0].expectation - 7.0).abs() < f64::EPSILON);
    // Period column is conditioned on, not predicted
    assert!(summaries[3].variance.abs() < f64::EPSILON);
    for column in [2, 4, 5] {
        let s = &summaries[column];
        assert!(s.min.as_f64() <= s.peak.as_f64(), "column {column}");
        assert!(s.peak.as_f64() <= s.max.as_f64(), "column {column}");
        assert!(s.variance > 0.0, "column {column}");
    }
}

// ============================================================================
// Sliding window
// ============================================================================

#[test]
fn test_sliding_window_forgets_old_rows() {
    let format = mixed_format();
    let mut detector =
        AnomalyDetector::new(&format, &mixed_specs(), mixed_config(CombinationRule::Max)).unwrap();

    let old: Vec<Row> = (0..20)
        .map(|_| row(&format, &[0.0, 0.0, 2.0, 1.0, 0.0, 0.0]))
        .collect();
    let new: Vec<Row> = (0..20)
        .map(|_| row(&format, &[0.0, 0.0, 40.0, 1.0, 10.0, 10.0]))
        .collect();

    detector.train_batch(&old).unwrap();
    detector.train_batch(&new).unwrap();
    detector.untrain_batch(&old).unwrap();

    let mut fresh =
        AnomalyDetector::new(&format, &mixed_specs(), mixed_config(CombinationRule::Max)).unwrap();
    fresh.train_batch(&new).unwrap();

    let probe = row(&format, &[0.0, 0.0, 38.0, 1.0, 9.5, 10.2]);
    let windowed = detector.score(&probe).unwrap();
    let expected = fresh.score(&probe).unwrap();
    assert!((windowed - expected).abs() < 1e-6);
}

// ============================================================================
// Classes, clusters and data objects
// ============================================================================

#[test]
fn test_classify_batch_from_data_object() {
    let format = std::sync::Arc::new(
        Format::new()
            .with_column("class", ColumnType::Discrete)
            .with_column("x", ColumnType::Continuous),
    );
    let specs = vec![ComponentSpec::new(
        DistributionKind::Gaussian,
        trueno_isc::FeatureRange::new(vec![1]).unwrap(),
    )];
    let config = DetectorConfig::builder().offset(1).split_attribute(0).build().unwrap();
    let mut detector = AnomalyDetector::new(&format, &specs, config).unwrap();

    let mut flat = Vec::new();
    for i in 0..30 {
        let jitter = f64::from(i % 3) * 0.2;
        flat.extend_from_slice(&[0.0, -5.0 + jitter, 1.0, 5.0 + jitter]);
    }
    let training = DataObject::from_flat(format.clone(), &flat, 60, 2).unwrap();
    detector.train_batch(training.rows()).unwrap();
    assert_eq!(detector.partitions().len(), 2);

    let queries = DataObject::from_flat(format, &[9.0, -4.9, 9.0, 5.1], 2, 2).unwrap();
    let predicted = detector.classify(queries.rows()).unwrap();
    assert_eq!(predicted.len(), 2);
    assert_eq!(predicted[0].class, Some(0));
    assert_eq!(predicted[1].class, Some(1));
}

#[test]
fn test_oneside_poisson_only_flags_bursts() {
    let format = Format::new()
        .with_column("events", ColumnType::Discrete)
        .with_column("hours", ColumnType::Discrete);
    let specs = vec![ComponentSpec::poisson_oneside(0, 1).unwrap()];
    let mut detector = AnomalyDetector::new(&format, &specs, DetectorConfig::default()).unwrap();
    for _ in 0..40 {
        detector.train(&row(&format, &[10.0, 1.0])).unwrap();
    }

    assert!(detector.score(&row(&format, &[0.0, 1.0])).unwrap().abs() < f64::EPSILON);
    assert!(detector.score(&row(&format, &[35.0, 1.0])).unwrap() > 5.0);
}

#[test]
fn test_layout_errors_fail_at_construction() {
    let format = mixed_format();
    let specs = vec![ComponentSpec::gaussian(vec![4, 9]).unwrap()];
    let err = AnomalyDetector::new(&format, &specs, DetectorConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        Error::FeatureOutOfBounds {
            component: 0,
            column: 9,
            width: 6
        }
    ));
    assert!(err.is_configuration());
}
