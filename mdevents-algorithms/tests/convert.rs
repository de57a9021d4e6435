#![allow(clippy::uninlined_format_args)]
use approx::assert_relative_eq;
use mdevents_algorithms::{
    convert_to_md, k_from_energy, AnalysisMode, ConversionInput, ConversionRegistry,
    ConversionTags, DetectorSpectrum, QMode, RawEvent, UnitConversion,
};
use mdevents_core::{BoxControllerConfig, Error, Progress, SplitInto, WorkspaceDescriptor};
use std::sync::{Arc, Mutex};

fn raw(x: f64) -> RawEvent {
    RawEvent {
        x,
        signal: 1.0,
        error_sq: 1.0,
    }
}

fn spectrum(direction: [f64; 3], xs: &[f64]) -> DetectorSpectrum {
    DetectorSpectrum {
        direction,
        l2: 2.0,
        events: xs.iter().copied().map(raw).collect(),
    }
}

fn config() -> BoxControllerConfig {
    BoxControllerConfig::new()
        .with_split_into(SplitInto::Uniform(4))
        .with_split_threshold(50)
        .with_max_depth(4)
}

#[test]
fn test_noq_copies_values_and_skips_outside() {
    let registry = ConversionRegistry::with_defaults();
    let tags = ConversionTags::new(QMode::NoQ, AnalysisMode::Any, UnitConversion::None);
    let input = ConversionInput {
        spectra: vec![
            spectrum([0.0, 0.0, 1.0], &[0.5, 1.5, 2.5]),
            spectrum([0.0, 0.0, 1.0], &[9.5, 12.0, -1.0]),
        ],
        ..ConversionInput::default()
    };
    let descriptor = WorkspaceDescriptor::from_ranges(&[0.0], &[10.0], 10).unwrap();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&calls);
    let progress = Progress::new(2).with_callback(move |done, total| {
        seen.lock().unwrap().push((done, total));
    });

    let (ws, summary) =
        convert_to_md(&registry, tags, &input, descriptor, config(), &progress).unwrap();
    assert_eq!(summary.converted, 4);
    assert_eq!(summary.skipped, 2);
    assert_eq!(ws.n_points(), 4);
    assert_eq!(ws.descriptor().dimensions[0].id, "Dim0");
    assert_eq!(ws.descriptor().dimensions[0].name, "Dim0");
    // The root is always split once before insertion.
    assert_eq!(ws.tree().root().num_children(), 4);
    assert_eq!(*calls.lock().unwrap(), vec![(1, 2), (2, 2)]);
}

#[test]
fn test_q3d_elastic_back_scattering() {
    let registry = ConversionRegistry::with_defaults();
    let tags = ConversionTags::new(QMode::Q3D, AnalysisMode::Elastic, UnitConversion::None);
    let input = ConversionInput {
        spectra: vec![spectrum([0.0, 0.0, -1.0], &[1.0, 2.0])],
        ..ConversionInput::default()
    };
    let descriptor =
        WorkspaceDescriptor::from_ranges(&[-5.0, -5.0, -5.0], &[5.0, 5.0, 5.0], 10).unwrap();
    let (ws, summary) =
        convert_to_md(&registry, tags, &input, descriptor, config(), &Progress::silent()).unwrap();
    assert_eq!(summary.converted, 2);
    let names: Vec<&str> = ws
        .descriptor()
        .dimensions
        .iter()
        .map(|d| d.name.as_str())
        .collect();
    assert_eq!(names, ["[Q_h,0,0]", "[0,Q_k,0]", "[0,0,Q_l]"]);

    // Q = ki - kf * (0, 0, -1) = (0, 0, 2k)
    let events = ws.tree().collect_events().unwrap().to_sorted_events();
    assert_relative_eq!(f64::from(events[0].center(2)), 2.0, epsilon = 1e-6);
    assert_relative_eq!(f64::from(events[1].center(2)), 4.0, epsilon = 1e-6);
    assert_relative_eq!(f64::from(events[1].center(0)), 0.0, epsilon = 1e-6);
}

#[test]
fn test_modq_direct_with_extra_dimension() {
    let registry = ConversionRegistry::with_defaults();
    let tags = ConversionTags::new(QMode::ModQ, AnalysisMode::Direct, UnitConversion::None);
    let efixed = 20.0;
    let input = ConversionInput {
        spectra: vec![spectrum([1.0, 0.0, 0.0], &[0.0, 5.0, 25.0])],
        efixed: Some(efixed),
        other_values: vec![300.0],
        ..ConversionInput::default()
    };
    let descriptor =
        WorkspaceDescriptor::from_ranges(&[0.0, -10.0, 0.0], &[10.0, 19.0, 500.0], 10).unwrap();
    let (ws, summary) =
        convert_to_md(&registry, tags, &input, descriptor, config(), &Progress::silent()).unwrap();
    // 25 meV transfer exceeds the incident energy.
    assert_eq!(summary.converted, 2);
    assert_eq!(summary.skipped, 1);

    let events = ws.tree().collect_events().unwrap().to_sorted_events();
    let (elastic, inelastic): (Vec<_>, Vec<_>) =
        events.iter().partition(|e| e.center(1).abs() < 1e-6);
    assert_eq!((elastic.len(), inelastic.len()), (1, 1));
    let ki = k_from_energy(efixed);
    let kf = k_from_energy(efixed - 5.0);
    // 90 degree scattering: |Q|^2 = ki^2 + kf^2.
    assert_relative_eq!(
        f64::from(elastic[0].center(0)),
        std::f64::consts::SQRT_2 * ki,
        epsilon = 1e-5
    );
    assert_relative_eq!(
        f64::from(inelastic[0].center(0)),
        (ki * ki + kf * kf).sqrt(),
        epsilon = 1e-5
    );
    assert_relative_eq!(f64::from(inelastic[0].center(1)), 5.0, epsilon = 1e-6);
    assert_relative_eq!(f64::from(inelastic[0].center(2)), 300.0, epsilon = 1e-4);
}

#[test]
fn test_inelastic_needs_fixed_energy() {
    let registry = ConversionRegistry::with_defaults();
    let tags = ConversionTags::new(QMode::ModQ, AnalysisMode::Indirect, UnitConversion::None);
    let descriptor = WorkspaceDescriptor::from_ranges(&[0.0, -5.0], &[5.0, 5.0], 10).unwrap();
    let err = convert_to_md(
        &registry,
        tags,
        &ConversionInput::default(),
        descriptor,
        config(),
        &Progress::silent(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)), "{:?}", err);
}

#[test]
fn test_wrong_dimension_count_is_rejected() {
    let registry = ConversionRegistry::with_defaults();
    let tags = ConversionTags::new(QMode::Q3D, AnalysisMode::Elastic, UnitConversion::None);
    let descriptor = WorkspaceDescriptor::from_ranges(&[0.0, 0.0], &[1.0, 1.0], 10).unwrap();
    let result = convert_to_md(
        &registry,
        tags,
        &ConversionInput::default(),
        descriptor,
        config(),
        &Progress::silent(),
    );
    assert!(matches!(result, Err(Error::Configuration(_))));
}

#[test]
fn test_min_depth_above_max_depth_fails_before_conversion() {
    let registry = ConversionRegistry::with_defaults();
    let tags = ConversionTags::new(QMode::NoQ, AnalysisMode::Any, UnitConversion::None);
    let descriptor = WorkspaceDescriptor::from_ranges(&[0.0], &[1.0], 10).unwrap();
    let config = config().with_max_depth(1).with_min_depth(2);
    let result = convert_to_md(
        &registry,
        tags,
        &ConversionInput::default(),
        descriptor,
        config,
        &Progress::silent(),
    );
    assert!(matches!(result, Err(Error::Configuration(_))));
}

#[test]
fn test_lost_detector_info_blocks_momentum_modes() {
    let registry = ConversionRegistry::with_defaults();
    let tags = ConversionTags::new(QMode::ModQ, AnalysisMode::Elastic, UnitConversion::None);
    let mut descriptor = WorkspaceDescriptor::from_ranges(&[0.0], &[1.0], 10).unwrap();
    descriptor.det_info_lost = true;
    let result = convert_to_md(
        &registry,
        tags,
        &ConversionInput::default(),
        descriptor,
        config(),
        &Progress::silent(),
    );
    assert!(matches!(result, Err(Error::Configuration(_))));
}

#[test]
fn test_unregistered_tags() {
    let registry = ConversionRegistry::new();
    let tags = ConversionTags::new(QMode::NoQ, AnalysisMode::Any, UnitConversion::None);
    let descriptor = WorkspaceDescriptor::from_ranges(&[0.0], &[1.0], 10).unwrap();
    let err = convert_to_md(
        &registry,
        tags,
        &ConversionInput::default(),
        descriptor,
        config(),
        &Progress::silent(),
    )
    .unwrap_err();
    assert!(err.to_string().contains("NoQAnyCnvNo"), "{}", err);
}
