use std::io;

use ndarray::{Array, Array2, ArrayD, Axis, IxDyn};
use ndarray_rand::RandomExt;
use ndarray_rand::rand_distr::Uniform;
use rand::SeedableRng;
use rand::rngs::StdRng;

use signal_mva::decomposition::{Algorithm, PCA};
use signal_mva::{DecompositionOptions, MvaError, Signal};

fn random_data(shape: &[usize], seed: u64) -> ArrayD<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array::random_using(IxDyn(shape), Uniform::new(1.0, 10.0), &mut rng)
}

fn quiet() -> DecompositionOptions {
    DecompositionOptions::new().print_info(false)
}

fn max_abs_diff(a: &Array2<f64>, b: &Array2<f64>) -> f64 {
    assert_eq!(a.dim(), b.dim());
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).fold(0.0, f64::max)
}

fn assert_roles_swap_components(normalize_poissonian_noise: bool) {
    let data = random_data(&[2, 3, 4, 3, 2], 7);
    let mut s = Signal::from_roles(data, &[true, true, false, false, false]).unwrap();
    let mut t = s.transpose_roles();
    assert_eq!(t.navigation_shape(), vec![4, 3, 2]);

    for signal in [&mut s, &mut t] {
        signal
            .decomposition_to(
                quiet().normalize_poissonian_noise(normalize_poissonian_noise),
                &mut io::sink(),
            )
            .unwrap();
    }
    let (a, b) = (s.learning_results(), t.learning_results());
    let tol = 1e-10;
    assert!(max_abs_diff(a.factors.as_ref().unwrap(), b.loadings.as_ref().unwrap()) < tol);
    assert!(max_abs_diff(a.loadings.as_ref().unwrap(), b.factors.as_ref().unwrap()) < tol);
}

#[test]
fn test_swapping_axis_roles_swaps_factors_and_loadings() {
    assert_roles_swap_components(false);
}

#[test]
fn test_swapping_axis_roles_with_poissonian_normalization() {
    assert_roles_swap_components(true);
}

#[test]
fn test_sub_views_are_unchanged_by_decomposition() {
    let data = random_data(&[4, 5, 6], 3);
    let mut s = Signal::new(data);
    let sub = s.inav(&[1, 2]).unwrap();
    let plane = s.data().index_axis(Axis(0), 3).to_owned();

    s.decomposition_to(quiet().normalize_poissonian_noise(true), &mut io::sink())
        .unwrap();

    assert_eq!(s.inav(&[1, 2]).unwrap().data(), sub.data());
    assert_eq!(s.data().index_axis(Axis(0), 3), plane);
}

#[test]
fn test_significant_components_reset_by_non_estimating_algorithm() {
    let mut rng = StdRng::seed_from_u64(0);
    let data = Array::random_using(IxDyn(&[20, 100]), Uniform::new(0.0, 1.0), &mut rng);
    let mut s = Signal::new(data);

    s.decomposition_to(quiet(), &mut io::sink()).unwrap();
    assert_eq!(s.learning_results().number_significant_components, Some(2));

    s.decomposition_to(
        quiet().algorithm(Algorithm::Nmf).output_dimension(2),
        &mut io::sink(),
    )
    .unwrap();
    assert_eq!(s.learning_results().number_significant_components, None);
    assert_eq!(s.learning_results().decomposition_algorithm.as_deref(), Some("nmf"));
}

#[test]
fn test_robust_algorithms_require_output_dimension() {
    let mut s = Signal::new(random_data(&[20, 100], 1));
    for algorithm in [Algorithm::RpcaGoDec, Algorithm::Orpca, Algorithm::Ornmf] {
        for return_info in [true, false] {
            let err = s
                .decomposition_to(
                    quiet().algorithm(algorithm).return_info(return_info),
                    &mut io::sink(),
                )
                .unwrap_err();
            assert!(matches!(err, MvaError::Configuration(_)));
            assert!(err.to_string().contains("output_dimension must be specified"));
        }
    }
}

#[test]
fn test_integer_signal_is_rejected_before_computation() {
    let data = Array::from_shape_fn(IxDyn(&[5, 8]), |ix| (ix[0] * 8 + ix[1]) as i64);
    let mut s = Signal::new(data);
    let mut report = Vec::new();
    let err = s
        .decomposition_to(DecompositionOptions::new(), &mut report)
        .unwrap_err();
    assert!(matches!(err, MvaError::Type { .. }));
    assert!(err.to_string().contains("int64"));
    assert!(report.is_empty());
}

#[test]
fn test_print_info_controls_report() {
    let mut s = Signal::new(random_data(&[6, 10], 2));

    let mut report = Vec::new();
    s.decomposition_to(DecompositionOptions::new(), &mut report)
        .unwrap();
    let text = String::from_utf8(report).unwrap();
    assert!(text.contains("Decomposition info:"));
    assert!(!text.contains("Delegate estimator:"));

    let mut report = Vec::new();
    s.decomposition_to(DecompositionOptions::new().print_info(false), &mut report)
        .unwrap();
    assert!(report.is_empty());

    let mut report = Vec::new();
    s.decomposition_to(
        DecompositionOptions::new().algorithm(Algorithm::Pca),
        &mut report,
    )
    .unwrap();
    let text = String::from_utf8(report).unwrap();
    assert!(text.contains("Decomposition info:"));
    assert!(text.contains("Delegate estimator:"));
    assert!(text.contains("PCA("));
}

#[test]
fn test_return_info() {
    let mut s = Signal::new(random_data(&[6, 10], 4));

    let info = s.decomposition_to(quiet().return_info(true), &mut io::sink()).unwrap();
    assert!(info.is_none());

    let info = s
        .decomposition_to(
            quiet()
                .algorithm(Algorithm::RpcaGoDec)
                .output_dimension(2)
                .return_info(true),
            &mut io::sink(),
        )
        .unwrap()
        .unwrap();
    let robust = info.robust().unwrap();
    assert_eq!(robust.low_rank.dim(), (6, 10));
    assert_eq!(robust.sparse_error.dim(), (6, 10));

    let info = s
        .decomposition_to(
            quiet().algorithm(Algorithm::Pca).output_dimension(3).return_info(true),
            &mut io::sink(),
        )
        .unwrap()
        .unwrap();
    let pca = info.estimator().and_then(|e| e.downcast_ref::<PCA>()).unwrap();
    assert_eq!(pca.components.as_ref().unwrap().dim(), (3, 10));

    for algorithm in [Algorithm::Pca, Algorithm::RpcaGoDec, Algorithm::Orpca] {
        let info = s
            .decomposition_to(
                quiet().algorithm(algorithm).output_dimension(2).return_info(false),
                &mut io::sink(),
            )
            .unwrap();
        assert!(info.is_none());
    }
}

#[test]
fn test_every_real_algorithm_stores_consistent_shapes() {
    let data = random_data(&[5, 4, 12], 9);
    for algorithm in Algorithm::ALL {
        if algorithm == Algorithm::Custom {
            continue;
        }
        let mut s = Signal::new(data.clone());
        s.decomposition_to(
            quiet().algorithm(algorithm).output_dimension(3),
            &mut io::sink(),
        )
        .unwrap();
        let results = s.learning_results();
        assert_eq!(results.factors.as_ref().unwrap().dim(), (12, 3), "{algorithm}");
        assert_eq!(results.loadings.as_ref().unwrap().dim(), (20, 3), "{algorithm}");
        assert_eq!(
            results.decomposition_algorithm.as_deref(),
            Some(algorithm.name())
        );
    }
}

#[test]
fn test_custom_estimator() {
    let mut s = Signal::new(random_data(&[6, 10], 5));
    let estimator = Box::new(PCA::new());
    s.decomposition_to(
        quiet().estimator(estimator).output_dimension(2),
        &mut io::sink(),
    )
    .unwrap();
    assert_eq!(s.learning_results().decomposition_algorithm.as_deref(), Some("custom"));
    assert_eq!(s.learning_results().factors.as_ref().unwrap().ncols(), 2);
}

#[test]
fn test_options_from_json() {
    let options = DecompositionOptions::from_json(
        r#"{"algorithm": "sklearn_pca", "output_dimension": 2, "print_info": false}"#,
    )
    .unwrap();
    let mut s = Signal::new(random_data(&[6, 10], 6));
    s.decomposition_to(options, &mut io::sink()).unwrap();
    assert_eq!(s.learning_results().decomposition_algorithm.as_deref(), Some("pca"));
}
