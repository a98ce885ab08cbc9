//! Statistical properties of the engine on seeded synthetic streams.

use cadence_core::simulation::{AmplitudeModel, StreamSpec, generate};
use cadence_core::{DetectionResult, EngineConfig, FingerprintEngine, WindowConfig};

fn engine() -> FingerprintEngine {
    FingerprintEngine::new(EngineConfig {
        tick_cooldown_ms: 0,
        ..EngineConfig::default()
    })
}

fn detect(engine: &FingerprintEngine, source: &str, spec: &StreamSpec) -> DetectionResult {
    for event in generate(spec) {
        engine.add_event(source, event.timestamp, event.value);
    }
    engine.tick(source)
}

#[test]
fn test_accuracy_with_moderate_jitter() {
    for (period, count, seed) in [(10.0, 120, 1), (41.0, 60, 2), (60.0, 55, 3), (8.7, 300, 4)] {
        let spec = StreamSpec::new(period, count).jitter(0.04).seed(seed);
        let result = detect(&engine(), "acc", &spec);
        assert!(result.is_success());
        let error = (result.period - period).abs() / period;
        assert!(error < 0.05, "period {} detected as {}", period, result.period);
        assert!(
            result.confidence > 80.0,
            "period {} confidence {}",
            period,
            result.confidence
        );
    }
}

#[test]
fn test_confidence_non_increasing_in_jitter() {
    let mut previous: Option<f64> = None;
    for jitter in [0.01, 0.02, 0.04, 0.08] {
        let spec = StreamSpec::new(20.0, 120).jitter(jitter).seed(11);
        let confidence = detect(&engine(), "mono", &spec).confidence;
        if let Some(prev) = previous {
            assert!(
                confidence <= prev + 2.0,
                "jitter {} raised confidence {} -> {}",
                jitter,
                prev,
                confidence
            );
        }
        previous = Some(confidence);
    }
}

#[test]
fn test_repeated_tick_is_idempotent() {
    let e = engine();
    let first = detect(&e, "idem", &StreamSpec::new(15.0, 100).jitter(0.03).seed(5));
    let second = e.tick("idem");
    let third = e.tick_uncached("idem");
    assert_eq!(first.dominant_frequency_hz, second.dominant_frequency_hz);
    assert_eq!(first.dominant_frequency_hz, third.dominant_frequency_hz);
    assert_eq!(first.matched_name, third.matched_name);
}

#[test]
fn test_identical_input_gives_identical_output() {
    let spec = StreamSpec::new(23.5, 90).jitter(0.03).seed(21);
    let a = detect(&engine(), "det", &spec);
    let b = detect(&engine(), "det", &spec);
    assert_eq!(a.matched_name, b.matched_name);
    assert_eq!(a.period.to_bits(), b.period.to_bits());
    assert_eq!(a, b);
}

#[test]
fn test_spurious_gaps_barely_move_the_period() {
    let config = EngineConfig {
        tick_cooldown_ms: 0,
        window: WindowConfig {
            horizon_secs: 100_000.0,
            ..WindowConfig::default()
        },
        ..EngineConfig::default()
    };
    let clean_spec = StreamSpec::new(41.0, 120).jitter(0.02).seed(8);
    let gappy_spec = clean_spec.clone().gaps(0.1, 10.0);

    let clean = detect(&FingerprintEngine::new(config.clone()), "c", &clean_spec);
    let gappy = detect(&FingerprintEngine::new(config), "g", &gappy_spec);
    assert!(gappy.is_success());
    let shift = (gappy.period - clean.period).abs() / clean.period;
    assert!(shift < 0.02, "clean {} gappy {}", clean.period, gappy.period);
    assert_eq!(gappy.matched_name, "cadence_41s");
}

#[test]
fn test_perfect_stream_with_gaussian_sizes_is_flagged() {
    let spec = StreamSpec::new(5.0, 400)
        .amplitude(AmplitudeModel::Gaussian {
            mean: 100.0,
            std_dev: 10.0,
        })
        .seed(17);
    let result = detect(&engine(), "bot", &spec);
    assert_eq!(result.matched_name, "cadence_5s");
    assert!(result.spoof_flag, "reasons {:?}", result.spoof_reasons);
    assert!(result.spoof_reasons.contains(&"perfect_periodicity".to_string()));
    assert!(result.spoof_reasons.contains(&"gaussian_amplitudes".to_string()));
}

#[test]
fn test_organic_stream_is_not_flagged() {
    let spec = StreamSpec::new(5.0, 400).jitter(0.03).seed(17);
    let result = detect(&engine(), "organic", &spec);
    assert_eq!(result.matched_name, "cadence_5s");
    assert!(!result.spoof_flag, "reasons {:?}", result.spoof_reasons);
}
