use std::io;

use ndarray::{Array, ArrayD, IxDyn};
use num_complex::Complex64;

use signal_mva::bss::BssOptions;
use signal_mva::{DecompositionOptions, LearningResults, Signal};

fn data() -> ArrayD<f64> {
    Array::from_shape_fn(IxDyn(&[5, 6, 30]), |ix| {
        let (x, y, e) = (ix[0] as f64, ix[1] as f64, ix[2] as f64);
        3.0 + (e * 0.31).sin() * (x + 1.0) + (e * 0.17).cos() * (y * 0.5 - 1.0) + 0.01 * (x * y)
    })
}

fn decomposed_with_bss() -> Signal<f64> {
    let mut s = Signal::new(data()).title("archive");
    s.decomposition_to(
        DecompositionOptions::new().output_dimension(3).print_info(false),
        &mut io::sink(),
    )
    .unwrap();
    s.blind_source_separation_to(BssOptions::new().print_info(false), &mut io::sink())
        .unwrap();
    s
}

#[test]
fn test_learning_results_round_trip_is_exact() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("learning_results.json");
    let s = decomposed_with_bss();
    s.learning_results().save(&path).unwrap();

    let mut loaded = LearningResults::<f64>::new();
    loaded.load(&path).unwrap();
    assert_eq!(&loaded, s.learning_results());
    assert_eq!(loaded.decomposition_algorithm, Some("svd".to_string()));
    assert_eq!(loaded.bss_algorithm, Some("fast_ica".to_string()));

    let text = std::fs::read_to_string(&path).unwrap();
    for key in [
        "factors",
        "loadings",
        "bss_factors",
        "bss_loadings",
        "explained_variance",
        "explained_variance_ratio",
        "decomposition_algorithm",
    ] {
        assert!(text.contains(&format!("\"{key}\"")), "missing {key}");
    }
}

#[test]
fn test_loading_then_saving_signal_keeps_both_archives() {
    let dir = tempfile::tempdir().unwrap();
    let results_path = dir.path().join("results.json");
    let signal_path = dir.path().join("signal.json");

    decomposed_with_bss()
        .learning_results()
        .save(&results_path)
        .unwrap();
    let archived = std::fs::read(&results_path).unwrap();

    let mut fresh = Signal::new(data()).title("archive");
    fresh.learning_results_mut().load(&results_path).unwrap();
    fresh.save(&signal_path).unwrap();

    assert_eq!(std::fs::read(&results_path).unwrap(), archived);
    let reloaded = Signal::<f64>::load(&signal_path).unwrap();
    assert_eq!(reloaded, fresh);

    let model = reloaded.get_decomposition_model(None).unwrap();
    let original = decomposed_with_bss().get_decomposition_model(None).unwrap();
    assert_eq!(model.data(), original.data());
}

#[test]
fn test_archive_before_bss_has_no_bss_keys() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("no_bss.json");
    let mut s = Signal::new(data());
    s.decomposition_to(DecompositionOptions::new().print_info(false), &mut io::sink())
        .unwrap();
    s.learning_results().save(&path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(!text.contains("bss_factors"));
    let loaded = LearningResults::<f64>::from_file(&path).unwrap();
    assert!(loaded.bss_factors.is_none());
    assert_eq!(&loaded, s.learning_results());
}

#[test]
fn test_complex_signal_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("complex.json");
    let mut s = Signal::new(data().mapv(|x| Complex64::new(x, -0.5 * x)));
    s.decomposition_to(
        DecompositionOptions::new().output_dimension(2).print_info(false),
        &mut io::sink(),
    )
    .unwrap();
    s.save(&path).unwrap();
    let loaded = Signal::<Complex64>::load(&path).unwrap();
    assert_eq!(loaded, s);
}
