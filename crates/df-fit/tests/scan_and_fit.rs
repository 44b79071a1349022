//! End-to-end properties of the assembler and the scan orchestrator.

use approx::assert_relative_eq;
use df_core::{
    Error, ParameterSet, ParameterType, PhysicsParameter, ScanParam, FIT_CONVERGED, FIT_FAILED,
    LLSCAN_FIT_FAILURE_VALUE,
};
use df_fit::{
    contour_scan, do_scan, single_scan, toy_study, toy_study_parallel, FitAssembler,
    FitFunctionConfiguration, MinimiseConfig, MinimiserConfiguration, OutputConfiguration,
};
use df_model::{
    ConstraintFunction, DataRecipe, DataSet, DecayTimePdf, ExternalConstraint, Pdf, PdfWithData,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn minimiser_config() -> MinimiserConfiguration {
    MinimiserConfiguration::new("lbfgs", MinimiseConfig::default())
}

fn add_param(set: &mut ParameterSet, name: &str, value: f64, lo: f64, hi: f64, ptype: ParameterType) {
    set.add(PhysicsParameter::new(name, value, lo, hi, ptype, "ps^{-1}").unwrap()).unwrap();
}

/// gamma free, deltaGamma free, plus a fixed parameter no PDF asks for.
fn healthy_params() -> ParameterSet {
    let mut set = ParameterSet::new();
    add_param(&mut set, "gamma", 0.8, 0.2, 2.0, ParameterType::Free);
    add_param(&mut set, "deltaGamma", 0.0, -0.3, 0.3, ParameterType::Free);
    add_param(&mut set, "tagEff", 0.3, 0.0, 1.0, ParameterType::Fixed);
    set
}

/// deltaGamma pinned at an unphysical value: every normalisation fails.
fn broken_params() -> ParameterSet {
    let mut set = ParameterSet::new();
    add_param(&mut set, "gamma", 0.3, 0.01, 0.5, ParameterType::Free);
    add_param(&mut set, "deltaGamma", 1.2, -2.0, 2.0, ParameterType::Fixed);
    set
}

fn sample_times() -> Vec<f64> {
    vec![
        0.2, 0.5, 0.9, 1.3, 1.8, 2.4, 3.1, 4.0, 5.2, 0.7, 1.1, 2.9, 0.4, 1.6, 2.1, 0.3, 3.6,
        1.0, 0.8, 2.7, 1.4, 0.6, 4.4, 1.9, 2.2, 0.9, 1.2, 3.3, 0.5, 1.7,
    ]
}

fn provided_pdf_with_data() -> PdfWithData {
    let data = DataSet::new(
        vec![("time".to_string(), sample_times())],
        vec![("time".to_string(), (0.0, 20.0))],
    )
    .unwrap();
    PdfWithData::new(Box::new(DecayTimePdf::new()), DataRecipe::Provided(data))
}

fn toy_pdf_with_data(seed: u64) -> PdfWithData {
    PdfWithData::new(
        Box::new(DecayTimePdf::new()),
        DataRecipe::Toy {
            bounds: vec![("time".to_string(), (0.0, 12.0))],
            n_events: 150,
            seed,
        },
    )
}

/// A model whose normalisation always fails, counting every attempt.
///
/// One normalisation call per fit attempt: the objective evaluates the
/// normalisation first and aborts the fit on the error.
#[derive(Clone)]
struct UnnormalisablePdf {
    parameters: Vec<String>,
    observables: Vec<String>,
    attempts: Arc<AtomicUsize>,
}

impl UnnormalisablePdf {
    fn new(attempts: Arc<AtomicUsize>) -> Self {
        Self {
            parameters: vec!["gamma".to_string()],
            observables: vec!["time".to_string()],
            attempts,
        }
    }
}

impl Pdf for UnnormalisablePdf {
    fn parameter_names(&self) -> &[String] {
        &self.parameters
    }

    fn observable_names(&self) -> &[String] {
        &self.observables
    }

    fn set_physics_parameters(&mut self, _params: &ParameterSet) -> df_core::Result<()> {
        Ok(())
    }

    fn evaluate(&self, _data: &DataSet, _event: usize) -> df_core::Result<f64> {
        Ok(1.0)
    }

    fn normalisation(&self, _data: &DataSet) -> df_core::Result<f64> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        Err(Error::Integration("normalisation always fails".to_string()))
    }

    fn clone_box(&self) -> Box<dyn Pdf> {
        Box::new(self.clone())
    }
}

#[test]
fn scan_retry_budget_is_one_straight_retry_and_nineteen_wiggles() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let mut params = ParameterSet::new();
    add_param(&mut params, "gamma", 0.4, 0.2, 2.0, ParameterType::Free);

    let data = DataSet::new(
        vec![("time".to_string(), vec![1.0])],
        vec![("time".to_string(), (0.0, 20.0))],
    )
    .unwrap();
    let mut pdf_data = vec![PdfWithData::new(
        Box::new(UnnormalisablePdf::new(attempts.clone())),
        DataRecipe::Provided(data),
    )];
    let scan = ScanParam::new("gamma", 0.4, 0.4, 1).unwrap();

    let results = do_scan(
        &minimiser_config(),
        &FitFunctionConfiguration::new(),
        &mut params,
        &mut pdf_data,
        &[],
        &scan,
        -1,
    )
    .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results.result(0).unwrap().status, FIT_FAILED);
    // The never-converging point gets the initial fit, one straight retry
    // and nineteen wiggle fits before the budget cuts it off.
    assert_eq!(attempts.load(Ordering::Relaxed), 21);
}

#[test]
fn scan_restores_parameter_and_stamps_grid_values() {
    let mut params = healthy_params();
    let mut pdf_data = vec![provided_pdf_with_data()];
    let scan = ScanParam::new("gamma", 0.5, 0.7, 3).unwrap();

    let results = do_scan(
        &minimiser_config(),
        &FitFunctionConfiguration::new(),
        &mut params,
        &mut pdf_data,
        &[],
        &scan,
        -1,
    )
    .unwrap();

    assert_eq!(results.len(), 3);
    for i in 0..3 {
        let result = results.result(i).unwrap();
        assert_eq!(result.status, FIT_CONVERGED);
        let scanned = result.params.get("gamma").unwrap();
        assert_relative_eq!(scanned.value, 0.5 + 0.1 * i as f64, epsilon = 1e-12);
        assert!(scanned.scanned);
        assert_relative_eq!(scanned.error, 0.0);
    }

    // Restoration invariant: type and value exactly as before the scan.
    let gamma = params.get("gamma").unwrap();
    assert_eq!(gamma.ptype(), ParameterType::Free);
    assert_relative_eq!(gamma.value(), 0.8, epsilon = 1e-12);
}

#[test]
fn scan_results_share_a_uniform_schema() {
    let mut params = healthy_params();
    let mut pdf_data = vec![provided_pdf_with_data()];
    let scan = ScanParam::new("gamma", 0.5, 0.7, 3).unwrap();

    let results = do_scan(
        &minimiser_config(),
        &FitFunctionConfiguration::new(),
        &mut params,
        &mut pdf_data,
        &[],
        &scan,
        -1,
    )
    .unwrap();

    let mut reference = results.result(0).unwrap().params.names();
    reference.sort();
    // The fixed parameter no PDF uses is re-injected everywhere.
    assert!(reference.contains(&"tagEff".to_string()));
    for i in 1..results.len() {
        let mut names = results.result(i).unwrap().params.names();
        names.sort();
        assert_eq!(names, reference);
    }
}

#[test]
fn scan_over_failing_fits_terminates_with_sentinel_results() {
    let mut params = broken_params();
    let mut pdf_data = vec![provided_pdf_with_data()];
    let scan = ScanParam::new("gamma", 0.1, 0.2, 2).unwrap();

    // Every fit fails; the bounded retry policy must still terminate and
    // hand back one (sentinel) result per grid point.
    let results = do_scan(
        &minimiser_config(),
        &FitFunctionConfiguration::new(),
        &mut params,
        &mut pdf_data,
        &[],
        &scan,
        -1,
    )
    .unwrap();

    assert_eq!(results.len(), 2);
    for i in 0..2 {
        let result = results.result(i).unwrap();
        assert_eq!(result.status, FIT_FAILED);
        assert_relative_eq!(result.minimum, LLSCAN_FIT_FAILURE_VALUE);
        // Grid fidelity holds even for failed points.
        let scanned = result.params.get("gamma").unwrap();
        assert_relative_eq!(scanned.value, 0.1 + 0.1 * i as f64, epsilon = 1e-12);
        assert!(scanned.scanned);
    }

    // Restoration also holds on the all-failures path.
    let gamma = params.get("gamma").unwrap();
    assert_eq!(gamma.ptype(), ParameterType::Free);
    assert_relative_eq!(gamma.value(), 0.3, epsilon = 1e-12);
}

#[test]
fn contour_scan_has_outer_by_inner_shape() {
    let mut params = healthy_params();
    let mut pdf_data = vec![provided_pdf_with_data()];

    let mut output = OutputConfiguration::new();
    output.add_scan_param(ScanParam::new("gamma", 0.5, 0.6, 2).unwrap());
    output.add_scan_param(ScanParam::new("deltaGamma", -0.1, 0.1, 3).unwrap());

    let grids = contour_scan(
        &minimiser_config(),
        &FitFunctionConfiguration::new(),
        &output,
        &mut params,
        &mut pdf_data,
        &[],
        "gamma",
        "deltaGamma",
        -1,
    )
    .unwrap();

    assert_eq!(grids.len(), 2);
    for (i, vector) in grids.iter().enumerate() {
        assert_eq!(vector.len(), 3);
        let outer_value = 0.5 + 0.1 * i as f64;
        for (j, result) in vector.iter().enumerate() {
            let outer = result.params.get("gamma").unwrap();
            assert_relative_eq!(outer.value, outer_value, epsilon = 1e-12);
            assert!(outer.scanned);
            let inner = result.params.get("deltaGamma").unwrap();
            assert_relative_eq!(inner.value, -0.1 + 0.1 * j as f64, epsilon = 1e-12);
            assert!(inner.scanned);
            assert_eq!(result.status, FIT_CONVERGED);
        }
    }

    // Both scanned parameters restored.
    assert_eq!(params.get("gamma").unwrap().ptype(), ParameterType::Free);
    assert_eq!(params.get("deltaGamma").unwrap().ptype(), ParameterType::Free);
}

#[test]
fn single_scan_resolves_the_descriptor_by_name() {
    let mut params = healthy_params();
    let mut pdf_data = vec![provided_pdf_with_data()];
    let mut output = OutputConfiguration::new();
    output.add_scan_param(ScanParam::new("gamma", 0.5, 0.7, 2).unwrap());

    let results = single_scan(
        &minimiser_config(),
        &FitFunctionConfiguration::new(),
        &output,
        &mut params,
        &mut pdf_data,
        &[],
        "gamma",
        -1,
    )
    .unwrap();
    assert_eq!(results.len(), 2);

    let missing = single_scan(
        &minimiser_config(),
        &FitFunctionConfiguration::new(),
        &output,
        &mut params,
        &mut pdf_data,
        &[],
        "phi_s",
        -1,
    );
    assert!(matches!(missing, Err(Error::Validation(_))));
}

#[test]
fn safe_fit_converts_numerical_failure_into_a_sentinel_result() {
    let params = broken_params();
    let mut pdf_data = vec![provided_pdf_with_data()];

    let result = FitAssembler::do_safe_fit(
        &minimiser_config(),
        &FitFunctionConfiguration::new(),
        &params,
        &mut pdf_data,
        &[],
        -1,
    )
    .unwrap();

    assert_eq!(result.status, FIT_FAILED);
    assert_relative_eq!(result.minimum, LLSCAN_FIT_FAILURE_VALUE);
    // The sentinel carries the full input schema.
    assert_eq!(result.params.names(), params.names());
}

#[test]
fn safe_fit_propagates_caller_contract_errors() {
    // deltaGamma required by the PDF is missing entirely.
    let mut params = ParameterSet::new();
    add_param(&mut params, "gamma", 0.8, 0.2, 2.0, ParameterType::Free);
    let mut pdf_data = vec![provided_pdf_with_data()];

    let outcome = FitAssembler::do_safe_fit(
        &minimiser_config(),
        &FitFunctionConfiguration::new(),
        &params,
        &mut pdf_data,
        &[],
        -1,
    );
    assert!(matches!(outcome, Err(Error::Validation(_))));
}

#[test]
fn fit_with_constraint_converges() {
    let params = healthy_params();
    let mut pdf_data = vec![provided_pdf_with_data()];
    let constraint = ConstraintFunction::new(vec![
        ExternalConstraint::new("GammaL", 0.7, 0.05).unwrap(),
    ]);

    let result = FitAssembler::do_fit(
        &minimiser_config(),
        &FitFunctionConfiguration::new(),
        &params,
        &mut pdf_data,
        &[constraint],
    )
    .unwrap();

    assert_eq!(result.status, FIT_CONVERGED);
    let gamma = result.params.get("gamma").unwrap();
    assert!(gamma.error > 0.0);
    assert!(gamma.value > 0.2 && gamma.value < 2.0);
}

#[test]
fn petes_strategy_without_phase_parameters_is_plain_safe_fit() {
    let params = healthy_params();
    let mut pdf_data = vec![provided_pdf_with_data()];

    let result = FitAssembler::petes_do_safe_fit(
        &minimiser_config(),
        &FitFunctionConfiguration::new(),
        &params,
        &mut pdf_data,
        &[],
        -1,
    )
    .unwrap();
    assert_eq!(result.status, FIT_CONVERGED);
}

#[test]
fn robs_strategy_probes_mirrored_starts_and_keeps_the_base_minimum() {
    // Both ambiguity pairs present: phases for the strong-phase flip,
    // deltaGamma/phi_s for the width flip, plus their combination.
    let mut params = healthy_params();
    add_param(&mut params, "delta_perp", 0.5, -7.0, 7.0, ParameterType::Fixed);
    add_param(&mut params, "delta_para", 0.3, -7.0, 7.0, ParameterType::Fixed);
    add_param(&mut params, "phi_s", 0.1, -7.0, 7.0, ParameterType::Fixed);
    let mut pdf_data = vec![provided_pdf_with_data()];

    let result = FitAssembler::robs_do_safe_fit(
        &minimiser_config(),
        &FitFunctionConfiguration::new(),
        &params,
        &mut pdf_data,
        &[],
        -1,
    )
    .unwrap();

    assert_eq!(result.status, FIT_CONVERGED);
    let gamma = result.params.get("gamma").unwrap();
    assert!(gamma.error > 0.0);
    // The decay-time model ignores the phases, so every mirrored start
    // reaches the same minimum and the base result is kept with the
    // un-flipped input values in its schema.
    assert_relative_eq!(result.params.get("delta_perp").unwrap().value, 0.5);
    assert_relative_eq!(result.params.get("delta_para").unwrap().value, 0.3);
    assert_relative_eq!(result.params.get("phi_s").unwrap().value, 0.1);
}

#[test]
fn toy_study_sequential_and_parallel_agree() {
    let params = healthy_params();
    let constraints: Vec<ConstraintFunction> = Vec::new();

    let mut sequential_data = vec![toy_pdf_with_data(1)];
    let sequential = toy_study(
        &minimiser_config(),
        &FitFunctionConfiguration::new(),
        &params,
        &mut sequential_data,
        &constraints,
        3,
        99,
        -1,
    )
    .unwrap();

    let parallel_data = vec![toy_pdf_with_data(1)];
    let parallel = toy_study_parallel(
        &minimiser_config(),
        &FitFunctionConfiguration::new(),
        &params,
        &parallel_data,
        &constraints,
        3,
        99,
        -1,
    )
    .unwrap();

    assert_eq!(sequential.len(), 3);
    assert_eq!(parallel.len(), 3);
    for i in 0..3 {
        let a = sequential.result(i).unwrap();
        let b = parallel.result(i).unwrap();
        assert_eq!(a.status, FIT_CONVERGED);
        assert_relative_eq!(
            a.params.get("gamma").unwrap().value,
            b.params.get("gamma").unwrap().value,
            epsilon = 1e-9
        );
    }

    // Different repeats see different data, so the estimates differ.
    let first = sequential.result(0).unwrap().params.get("gamma").unwrap().value;
    let second = sequential.result(1).unwrap().params.get("gamma").unwrap().value;
    assert!((first - second).abs() > 1e-12);
}
