//! Objective-function contract shared by all minimisers.

use df_core::Result;
use std::fmt;

/// Scalar objective over a free-parameter vector.
///
/// The gradient defaults to central differences; implementations with an
/// analytic gradient override it.
pub trait ObjectiveFunction: Send + Sync {
    /// Evaluate the objective at the given parameter vector.
    fn eval(&self, params: &[f64]) -> Result<f64>;

    /// Gradient at the given parameter vector (numerical if not overridden).
    fn gradient(&self, params: &[f64]) -> Result<Vec<f64>> {
        let n = params.len();
        let mut grad = vec![0.0; n];

        for i in 0..n {
            // Adaptive step size: eps = sqrt(machine_epsilon) * max(|x_i|, 1)
            let eps = 1e-8 * params[i].abs().max(1.0);

            let mut params_plus = params.to_vec();
            params_plus[i] += eps;
            let f_plus = self.eval(&params_plus)?;

            let mut params_minus = params.to_vec();
            params_minus[i] -= eps;
            let f_minus = self.eval(&params_minus)?;

            grad[i] = (f_plus - f_minus) / (2.0 * eps);
        }

        Ok(grad)
    }
}

/// Numerical configuration for a minimiser.
#[derive(Debug, Clone)]
pub struct MinimiseConfig {
    /// Maximum number of iterations.
    pub max_iter: u64,
    /// Convergence tolerance for the gradient norm.
    pub tol: f64,
    /// Number of corrections kept for the inverse-Hessian approximation.
    pub m: usize,
}

impl Default for MinimiseConfig {
    fn default() -> Self {
        Self { max_iter: 1000, tol: 1e-6, m: 10 }
    }
}

/// How a minimisation attempt ended.
///
/// Numerical failures are values here, not errors: the strict fit tier turns
/// them into errors, the safe tier turns them into sentinel results.
#[derive(Debug, Clone, PartialEq)]
pub enum MinimiseStatus {
    /// Gradient/cost tolerance reached.
    Converged,
    /// Terminated without converging (iteration limit).
    NotConverged,
    /// A PDF normalisation failed during evaluation.
    IntegrationFailure(String),
    /// Any other numerical failure inside the objective or solver.
    GenericFailure(String),
}

/// Outcome of one minimisation attempt.
#[derive(Debug, Clone)]
pub struct MinimiseResult {
    /// Best-fit free-parameter vector.
    pub parameters: Vec<f64>,
    /// Objective value at the minimum.
    pub minimum: f64,
    /// Number of solver iterations.
    pub n_iter: u64,
    /// Number of objective evaluations.
    pub n_fev: usize,
    /// Number of gradient evaluations.
    pub n_gev: usize,
    /// Termination classification.
    pub status: MinimiseStatus,
}

impl fmt::Display for MinimiseResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MinimiseResult(minimum={:.6}, n_iter={}, n_fev={}, n_gev={}, status={:?})",
            self.minimum, self.n_iter, self.n_fev, self.n_gev, self.status
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    struct Quadratic;

    impl ObjectiveFunction for Quadratic {
        fn eval(&self, params: &[f64]) -> Result<f64> {
            Ok((params[0] - 2.0).powi(2) + (params[1] - 3.0).powi(2))
        }
    }

    #[test]
    fn test_default_gradient_matches_analytic() {
        let grad = Quadratic.gradient(&[0.0, 0.0]).unwrap();
        assert_relative_eq!(grad[0], -4.0, epsilon = 1e-5);
        assert_relative_eq!(grad[1], -6.0, epsilon = 1e-5);
    }
}
