//! Minimiser implementations behind one trait, wrapping argmin solvers.

use crate::fit_function::FitFunction;
use crate::objective::{MinimiseConfig, MinimiseResult, MinimiseStatus, ObjectiveFunction};
use argmin::core::{CostFunction, Executor, Gradient, State, TerminationReason, TerminationStatus};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::neldermead::NelderMead;
use argmin::solver::quasinewton::LBFGS;
use df_core::{
    Error, FitResult, FunctionContour, ResultParameter, ResultParameterSet, Result,
    FIT_CONVERGED,
};
use nalgebra::DMatrix;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Status code for a fit that finished without converging.
const FIT_NOT_CONVERGED: i32 = 0;

/// A stateful minimiser: minimise first, then extract the fit result.
///
/// `minimise` returns `Err` only for caller-contract violations; numerical
/// failures end up as a tagged [`MinimiseStatus`] on the stored outcome and
/// surface when the result is extracted.
pub trait Minimiser {
    /// Run the minimisation and store the outcome.
    fn minimise(&mut self, function: &FitFunction) -> Result<()>;

    /// Build the [`FitResult`] from the stored outcome.
    ///
    /// Converged and cleanly non-converged outcomes produce a result;
    /// integration and generic failures are returned as errors for the
    /// assembler tiers to handle.
    fn fit_result(&self, function: &FitFunction) -> Result<FitResult>;

    /// Request covariance-ellipse contours for these parameter pairs.
    fn set_contour_pairs(&mut self, pairs: &[(String, String)]);
}

fn clamp_params(params: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    params.iter().zip(bounds.iter()).map(|(&v, &(lo, hi))| v.clamp(lo, hi)).collect()
}

#[derive(Default)]
struct FuncCounts {
    cost: AtomicUsize,
    grad: AtomicUsize,
}

/// Adapter exposing a [`FitFunction`] to argmin with bound clamping.
struct ArgminProblem<'a> {
    objective: &'a FitFunction,
    bounds: &'a [(f64, f64)],
    counts: Arc<FuncCounts>,
}

impl CostFunction for ArgminProblem<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, params: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
        self.counts.cost.fetch_add(1, Ordering::Relaxed);
        let clamped = clamp_params(params, self.bounds);
        self.objective.eval(&clamped).map_err(|e| argmin::core::Error::msg(e.to_string()))
    }
}

impl Gradient for ArgminProblem<'_> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(
        &self,
        params: &Self::Param,
    ) -> std::result::Result<Self::Gradient, argmin::core::Error> {
        self.counts.grad.fetch_add(1, Ordering::Relaxed);
        let clamped = clamp_params(params, self.bounds);
        let mut g = self
            .objective
            .gradient(&clamped)
            .map_err(|e| argmin::core::Error::msg(e.to_string()))?;

        // Projected-gradient heuristic: if we are at a bound and the gradient
        // would push further outside, zero that component so the line search
        // does not keep stepping into flat clamped regions.
        const EPS: f64 = 1e-12;
        for (i, (&x, &(lo, hi))) in clamped.iter().zip(self.bounds.iter()).enumerate() {
            if x <= lo + EPS && g[i] > 0.0 {
                g[i] = 0.0;
            }
            if x >= hi - EPS && g[i] < 0.0 {
                g[i] = 0.0;
            }
        }

        Ok(g)
    }
}

/// Classify a solver abort using the failure the objective recorded.
fn classify_abort(function: &FitFunction, solver_message: String) -> MinimiseStatus {
    match function.take_failure() {
        Some(status) => status,
        None => MinimiseStatus::GenericFailure(solver_message),
    }
}

/// Outcome for a fit with no free parameters: a single evaluation.
///
/// A scan that fixes the last free parameter still needs the objective value
/// at the grid point.
fn evaluate_fixed_point(function: &FitFunction) -> MinimiseResult {
    match function.eval(&[]) {
        Ok(value) => MinimiseResult {
            parameters: Vec::new(),
            minimum: value,
            n_iter: 0,
            n_fev: 1,
            n_gev: 0,
            status: MinimiseStatus::Converged,
        },
        Err(e) => MinimiseResult {
            parameters: Vec::new(),
            minimum: f64::NAN,
            n_iter: 0,
            n_fev: 1,
            n_gev: 0,
            status: classify_abort(function, e.to_string()),
        },
    }
}

/// L-BFGS with More-Thuente line search and box constraints via clamping.
pub struct LbfgsMinimiser {
    config: MinimiseConfig,
    contour_pairs: Vec<(String, String)>,
    outcome: Option<MinimiseResult>,
}

impl LbfgsMinimiser {
    /// Create the minimiser with the given numerical configuration.
    pub fn new(config: MinimiseConfig) -> Self {
        Self { config, contour_pairs: Vec::new(), outcome: None }
    }
}

impl Default for LbfgsMinimiser {
    fn default() -> Self {
        Self::new(MinimiseConfig::default())
    }
}

impl Minimiser for LbfgsMinimiser {
    fn minimise(&mut self, function: &FitFunction) -> Result<()> {
        let bounds = function.bounds();
        let init = clamp_params(function.initial_values(), bounds);
        if init.is_empty() {
            self.outcome = Some(evaluate_fixed_point(function));
            return Ok(());
        }

        let counts = Arc::new(FuncCounts::default());
        let problem =
            ArgminProblem { objective: function, bounds, counts: counts.clone() };

        let linesearch = MoreThuenteLineSearch::new();
        // Argmin's default cost tolerance is ~EPS, too strict for NLL scales;
        // it leads to unnecessary max-iter terminations.
        let tol_cost =
            if self.config.tol == 0.0 { 0.0 } else { (0.1 * self.config.tol).max(1e-12) };
        let solver = LBFGS::new(linesearch, self.config.m)
            .with_tolerance_grad(self.config.tol)
            .map_err(|e| {
                Error::Validation(format!("invalid minimiser configuration (tol): {e}"))
            })?
            .with_tolerance_cost(tol_cost)
            .map_err(|e| {
                Error::Validation(format!("invalid minimiser configuration (tol_cost): {e}"))
            })?;

        let run = Executor::new(problem, solver)
            .configure(|state| state.param(init.clone()).max_iters(self.config.max_iter))
            .run();

        self.outcome = Some(match run {
            Ok(res) => {
                let state = res.state();
                let best = state
                    .get_best_param()
                    .map(|p| clamp_params(p, bounds))
                    .unwrap_or(init);
                let termination = state.get_termination_status();
                let converged = matches!(
                    termination,
                    TerminationStatus::Terminated(TerminationReason::SolverConverged)
                        | TerminationStatus::Terminated(TerminationReason::TargetCostReached)
                );
                MinimiseResult {
                    parameters: best,
                    minimum: state.get_best_cost(),
                    n_iter: state.get_iter(),
                    n_fev: counts.cost.load(Ordering::Relaxed),
                    n_gev: counts.grad.load(Ordering::Relaxed),
                    status: if converged {
                        MinimiseStatus::Converged
                    } else {
                        MinimiseStatus::NotConverged
                    },
                }
            }
            Err(e) => MinimiseResult {
                parameters: init,
                minimum: f64::NAN,
                n_iter: 0,
                n_fev: counts.cost.load(Ordering::Relaxed),
                n_gev: counts.grad.load(Ordering::Relaxed),
                status: classify_abort(function, e.to_string()),
            },
        });
        Ok(())
    }

    fn fit_result(&self, function: &FitFunction) -> Result<FitResult> {
        let outcome = self.outcome.as_ref().ok_or_else(|| {
            Error::Validation("fit_result called before minimise".to_string())
        })?;
        build_fit_result(function, outcome, &self.contour_pairs)
    }

    fn set_contour_pairs(&mut self, pairs: &[(String, String)]) {
        self.contour_pairs = pairs.to_vec();
    }
}

/// Gradient-free Nelder-Mead fallback.
pub struct NelderMeadMinimiser {
    config: MinimiseConfig,
    contour_pairs: Vec<(String, String)>,
    outcome: Option<MinimiseResult>,
}

impl NelderMeadMinimiser {
    /// Create the minimiser with the given numerical configuration.
    pub fn new(config: MinimiseConfig) -> Self {
        Self { config, contour_pairs: Vec::new(), outcome: None }
    }

    /// Initial simplex: the starting point plus one offset vertex per axis,
    /// all clamped into the bounds box.
    fn simplex(init: &[f64], bounds: &[(f64, f64)]) -> Vec<Vec<f64>> {
        let mut vertices = vec![init.to_vec()];
        for i in 0..init.len() {
            let mut vertex = init.to_vec();
            let (lo, hi) = bounds[i];
            let offset = 0.1 * init[i].abs().max(1.0);
            // Step away from the nearer bound so the vertex stays distinct.
            vertex[i] = if init[i] + offset <= hi {
                init[i] + offset
            } else {
                (init[i] - offset).max(lo)
            };
            vertices.push(vertex);
        }
        vertices
    }
}

impl Default for NelderMeadMinimiser {
    fn default() -> Self {
        Self::new(MinimiseConfig::default())
    }
}

impl Minimiser for NelderMeadMinimiser {
    fn minimise(&mut self, function: &FitFunction) -> Result<()> {
        let bounds = function.bounds();
        let init = clamp_params(function.initial_values(), bounds);
        if init.is_empty() {
            self.outcome = Some(evaluate_fixed_point(function));
            return Ok(());
        }

        let counts = Arc::new(FuncCounts::default());
        let problem =
            ArgminProblem { objective: function, bounds, counts: counts.clone() };

        let solver = NelderMead::new(Self::simplex(&init, bounds))
            .with_sd_tolerance(self.config.tol)
            .map_err(|e| {
                Error::Validation(format!("invalid minimiser configuration (tol): {e}"))
            })?;

        let run = Executor::new(problem, solver)
            .configure(|state| state.max_iters(self.config.max_iter))
            .run();

        self.outcome = Some(match run {
            Ok(res) => {
                let state = res.state();
                let best = state
                    .get_best_param()
                    .map(|p| clamp_params(p, bounds))
                    .unwrap_or(init);
                let termination = state.get_termination_status();
                let converged = matches!(
                    termination,
                    TerminationStatus::Terminated(TerminationReason::SolverConverged)
                        | TerminationStatus::Terminated(TerminationReason::TargetCostReached)
                );
                MinimiseResult {
                    parameters: best,
                    minimum: state.get_best_cost(),
                    n_iter: state.get_iter(),
                    n_fev: counts.cost.load(Ordering::Relaxed),
                    n_gev: 0,
                    status: if converged {
                        MinimiseStatus::Converged
                    } else {
                        MinimiseStatus::NotConverged
                    },
                }
            }
            Err(e) => MinimiseResult {
                parameters: init,
                minimum: f64::NAN,
                n_iter: 0,
                n_fev: counts.cost.load(Ordering::Relaxed),
                n_gev: 0,
                status: classify_abort(function, e.to_string()),
            },
        });
        Ok(())
    }

    fn fit_result(&self, function: &FitFunction) -> Result<FitResult> {
        let outcome = self.outcome.as_ref().ok_or_else(|| {
            Error::Validation("fit_result called before minimise".to_string())
        })?;
        build_fit_result(function, outcome, &self.contour_pairs)
    }

    fn set_contour_pairs(&mut self, pairs: &[(String, String)]) {
        self.contour_pairs = pairs.to_vec();
    }
}

/// Turn a stored minimisation outcome into a [`FitResult`].
///
/// Fails with the tagged error for integration/generic failures so the
/// assembler's safe tier can synthesise a sentinel result instead.
fn build_fit_result(
    function: &FitFunction,
    outcome: &MinimiseResult,
    contour_pairs: &[(String, String)],
) -> Result<FitResult> {
    match &outcome.status {
        MinimiseStatus::IntegrationFailure(msg) => {
            return Err(Error::Integration(msg.clone()));
        }
        MinimiseStatus::GenericFailure(msg) => {
            return Err(Error::Computation(format!("minimisation failed: {msg}")));
        }
        MinimiseStatus::Converged | MinimiseStatus::NotConverged => {}
    }

    let n = function.n_free();
    let (covariance, errors) = if n == 0 {
        (None, Vec::new())
    } else {
        let hessian = compute_hessian(function, &outcome.parameters)?;
        let covariance = invert_hessian(&hessian, n);
        let errors: Vec<f64> = match &covariance {
            Some(cov) => (0..n).map(|i| cov[(i, i)].sqrt()).collect(),
            None => {
                log::warn!("covariance estimation failed, falling back to diagonal errors");
                diagonal_uncertainties(&hessian, n)
            }
        };
        (covariance, errors)
    };

    // Result schema: every bottle parameter in insertion order; free
    // parameters carry fitted values and errors, the rest error 0.
    let params = function.parameters();
    let free_names = function.free_names();
    let mut result_params = ResultParameterSet::new();
    for p in params.iter() {
        let (value, error) = match free_names.iter().position(|n| n == p.name()) {
            Some(i) => (outcome.parameters[i], errors[i]),
            None => (p.value(), 0.0),
        };
        result_params.set(ResultParameter::new(
            p.name(),
            value,
            error,
            p.minimum(),
            p.maximum(),
            p.ptype(),
            p.unit(),
        ));
    }

    let status = if outcome.status == MinimiseStatus::Converged {
        FIT_CONVERGED
    } else {
        FIT_NOT_CONVERGED
    };

    let mut result = FitResult::new(outcome.minimum, status, result_params);
    if let Some(cov) = &covariance {
        result = result.with_covariance(pack_lower_triangular(cov, n));
        let contours = ellipse_contours(function, outcome, cov, contour_pairs);
        if !contours.is_empty() {
            result = result.with_contours(contours);
        }
    }
    Ok(result)
}

/// Hessian via forward differences of the gradient, symmetrised.
fn compute_hessian(function: &FitFunction, best: &[f64]) -> Result<DMatrix<f64>> {
    let n = best.len();
    let grad_center = function.gradient(best)?;

    let mut hessian = DMatrix::zeros(n, n);
    for j in 0..n {
        let eps = 1e-4 * best[j].abs().max(1.0);

        let mut params_plus = best.to_vec();
        params_plus[j] += eps;
        let grad_plus = function.gradient(&params_plus)?;

        for i in 0..n {
            hessian[(i, j)] = (grad_plus[i] - grad_center[i]) / eps;
        }
    }

    // Symmetrise: H = (H + H^T) / 2
    let ht = hessian.transpose();
    hessian = (&hessian + &ht) * 0.5;
    Ok(hessian)
}

/// Invert the Hessian to a covariance matrix via damped Cholesky.
///
/// Even at a valid minimum the numerically estimated Hessian can be slightly
/// indefinite; diagonal damping is escalated geometrically before falling
/// back to an LU inverse. Returns `None` when no positive inverse exists.
fn invert_hessian(hessian: &DMatrix<f64>, n: usize) -> Option<DMatrix<f64>> {
    let identity = DMatrix::identity(n, n);

    // Scale damping to the Hessian diagonal to be unit-ish across models.
    let diag_scale = (0..n).map(|i| hessian[(i, i)].abs()).fold(0.0_f64, f64::max).max(1.0);

    let mut h_damped = hessian.clone();
    let mut damping = 0.0_f64;
    let max_attempts = 10;

    for attempt in 0..max_attempts {
        if let Some(chol) = nalgebra::linalg::Cholesky::new(h_damped.clone()) {
            return Some(chol.solve(&identity));
        }
        if attempt + 1 == max_attempts {
            break;
        }
        let next_damping = if damping == 0.0 { diag_scale * 1e-9 } else { damping * 10.0 };
        let add = next_damping - damping;
        for i in 0..n {
            h_damped[(i, i)] += add;
        }
        damping = next_damping;
    }

    let cov = h_damped.lu().try_inverse()?;
    for i in 0..n {
        let v = cov[(i, i)];
        if !(v.is_finite() && v > 0.0) {
            return None;
        }
    }
    Some(cov)
}

/// Per-parameter uncertainties from the Hessian diagonal (fallback).
fn diagonal_uncertainties(hessian: &DMatrix<f64>, n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let hess_ii = hessian[(i, i)];
            let denom = hess_ii.abs().max(1e-12);
            1.0 / denom.sqrt()
        })
        .collect()
}

/// Pack the lower triangle of a symmetric matrix row-major.
fn pack_lower_triangular(matrix: &DMatrix<f64>, n: usize) -> Vec<f64> {
    let mut packed = Vec::with_capacity(n * (n + 1) / 2);
    for row in 0..n {
        for col in 0..=row {
            packed.push(matrix[(row, col)]);
        }
    }
    packed
}

/// Number of points per covariance-ellipse ring.
const CONTOUR_POINTS: usize = 40;

/// Covariance ellipses at 1 and 2 sigma for each requested parameter pair.
///
/// Pairs naming a parameter that is not free in this fit are skipped with a
/// warning rather than failing the whole result.
fn ellipse_contours(
    function: &FitFunction,
    outcome: &MinimiseResult,
    covariance: &DMatrix<f64>,
    pairs: &[(String, String)],
) -> Vec<FunctionContour> {
    let free_names = function.free_names();
    let mut contours = Vec::new();

    for (x_name, y_name) in pairs {
        let (xi, yi) = match (
            free_names.iter().position(|n| n == x_name),
            free_names.iter().position(|n| n == y_name),
        ) {
            (Some(xi), Some(yi)) => (xi, yi),
            _ => {
                log::warn!("contour pair ({x_name}, {y_name}) is not free in this fit, skipping");
                continue;
            }
        };

        let sub = nalgebra::Matrix2::new(
            covariance[(xi, xi)],
            covariance[(xi, yi)],
            covariance[(yi, xi)],
            covariance[(yi, yi)],
        );
        let Some(chol) = sub.cholesky() else {
            log::warn!("covariance block for ({x_name}, {y_name}) not positive definite");
            continue;
        };
        let l = chol.l();
        let center = (outcome.parameters[xi], outcome.parameters[yi]);

        let mut contour = FunctionContour::new(x_name.clone(), y_name.clone(), 2);
        for sigma in 1..=2 {
            let ring = (0..CONTOUR_POINTS)
                .map(|k| {
                    let theta = 2.0 * std::f64::consts::PI * k as f64 / CONTOUR_POINTS as f64;
                    let (c, s) = (theta.cos(), theta.sin());
                    let dx = l[(0, 0)] * c;
                    let dy = l[(1, 0)] * c + l[(1, 1)] * s;
                    (center.0 + sigma as f64 * dx, center.1 + sigma as f64 * dy)
                })
                .collect();
            // Sigma indices 1 and 2 always exist on a 2-level contour.
            let _ = contour.set_level(sigma, ring);
        }
        contours.push(contour);
    }
    contours
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use df_core::{ParameterSet, ParameterType, PhysicsParameter};
    use df_model::{DataSet, DecayTimePdf, PhysicsBottle};

    fn exp_fit_function(gamma_start: f64, times: Vec<f64>) -> FitFunction {
        let mut set = ParameterSet::new();
        set.add(
            PhysicsParameter::new("gamma", gamma_start, 0.01, 3.0, ParameterType::Free, "ps^{-1}")
                .unwrap(),
        )
        .unwrap();
        set.add(
            PhysicsParameter::new("deltaGamma", 0.0, -1.0, 1.0, ParameterType::Fixed, "ps^{-1}")
                .unwrap(),
        )
        .unwrap();

        let data = DataSet::new(
            vec![("time".to_string(), times)],
            vec![("time".to_string(), (0.0, 50.0))],
        )
        .unwrap();
        let mut bottle = PhysicsBottle::new(set);
        bottle.add_result(Box::new(DecayTimePdf::new()), data);
        bottle.finalise().unwrap();
        FitFunction::new(bottle, None, false).unwrap()
    }

    // Events drawn conceptually from gamma = 0.5; with a wide window the MLE
    // is close to 1/mean(t).
    fn sample_times() -> Vec<f64> {
        vec![0.2, 0.5, 0.9, 1.3, 1.8, 2.4, 3.1, 4.0, 5.2, 0.7, 1.1, 2.9]
    }

    #[test]
    fn test_lbfgs_recovers_exponential_rate() {
        let times = sample_times();
        let mean: f64 = times.iter().sum::<f64>() / times.len() as f64;
        let function = exp_fit_function(1.5, times);

        let mut minimiser = LbfgsMinimiser::default();
        minimiser.minimise(&function).unwrap();
        let result = minimiser.fit_result(&function).unwrap();

        assert_eq!(result.status, FIT_CONVERGED);
        let gamma = result.params.get("gamma").unwrap();
        // Window [0, 50] is effectively infinite, so MLE ~ 1/mean.
        assert_relative_eq!(gamma.value, 1.0 / mean, epsilon = 1e-3);
        assert!(gamma.error > 0.0);
        // Fixed parameter reported with zero error.
        assert_relative_eq!(result.params.get("deltaGamma").unwrap().error, 0.0);
        assert!(result.covariance.is_some());
    }

    #[test]
    fn test_neldermead_agrees_with_lbfgs() {
        let times = sample_times();
        let function = exp_fit_function(1.5, times.clone());
        let mut lbfgs = LbfgsMinimiser::default();
        lbfgs.minimise(&function).unwrap();
        let reference = lbfgs.fit_result(&function).unwrap();

        let function = exp_fit_function(1.5, times);
        let mut nm = NelderMeadMinimiser::default();
        nm.minimise(&function).unwrap();
        let result = nm.fit_result(&function).unwrap();

        assert_relative_eq!(
            result.params.get("gamma").unwrap().value,
            reference.params.get("gamma").unwrap().value,
            epsilon = 1e-3
        );
    }

    #[test]
    fn test_fit_result_before_minimise_is_an_error() {
        let function = exp_fit_function(1.0, sample_times());
        let minimiser = LbfgsMinimiser::default();
        assert!(minimiser.fit_result(&function).is_err());
    }

    #[test]
    fn test_pack_lower_triangular() {
        let m = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 9.0]);
        assert_eq!(pack_lower_triangular(&m, 2), vec![4.0, 1.0, 9.0]);
    }

    #[test]
    fn test_invert_hessian_simple() {
        let h = DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 4.0]);
        let cov = invert_hessian(&h, 2).unwrap();
        assert_relative_eq!(cov[(0, 0)], 0.5, epsilon = 1e-12);
        assert_relative_eq!(cov[(1, 1)], 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_diagonal_uncertainties_abs_diag() {
        let h = DMatrix::from_row_slice(2, 2, &[4.0, 0.0, 0.0, -16.0]);
        let u = diagonal_uncertainties(&h, 2);
        assert_relative_eq!(u[0], 0.5, epsilon = 1e-12);
        assert_relative_eq!(u[1], 0.25, epsilon = 1e-12);
    }
}
