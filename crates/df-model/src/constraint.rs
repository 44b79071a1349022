//! External experimental constraints added as Gaussian penalty terms.

use df_core::{Error, ParameterSet, Result};

/// One external measurement: a target value with an uncertainty.
#[derive(Debug, Clone)]
pub struct ExternalConstraint {
    name: String,
    value: f64,
    error: f64,
}

impl ExternalConstraint {
    /// Create a constraint; the error must be positive.
    pub fn new(name: impl Into<String>, value: f64, error: f64) -> Result<Self> {
        let name = name.into();
        if !(error.is_finite() && error > 0.0) {
            return Err(Error::Validation(format!(
                "constraint '{name}': error must be positive, got {error}"
            )));
        }
        Ok(Self { name, value, error })
    }

    /// Constrained quantity name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Measured central value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Measurement uncertainty.
    pub fn error(&self) -> f64 {
        self.error
    }
}

/// Additive likelihood penalty from a set of external constraints.
///
/// Two derived physical combinations are understood besides direct parameter
/// constraints:
///
/// - `GammaL = gamma + deltaGamma/2`
/// - `GammaObs`, the effective single-exponential width
///   `gamma * (1 - (dg/2g)^2) / (1 + (dg/2g)^2)`
///
/// Constraints naming a parameter absent from the set are skipped.
#[derive(Debug, Clone, Default)]
pub struct ConstraintFunction {
    constraints: Vec<ExternalConstraint>,
}

impl ConstraintFunction {
    /// Create a penalty over the given constraints.
    pub fn new(constraints: Vec<ExternalConstraint>) -> Self {
        Self { constraints }
    }

    /// The constraints this function evaluates.
    pub fn constraints(&self) -> &[ExternalConstraint] {
        &self.constraints
    }

    /// Evaluate `0.5 * sum(((fit - target) / error)^2)` over all constraints.
    pub fn evaluate(&self, params: &ParameterSet) -> Result<f64> {
        let mut total = 0.0;

        for constraint in &self.constraints {
            let fit_value = match constraint.name() {
                "GammaL" => {
                    let gamma = params.get("gamma")?.value();
                    let dgam = params.get("deltaGamma")?.value();
                    Some(gamma + dgam / 2.0)
                }
                "GammaObs" => {
                    let gamma = params.get("gamma")?.value();
                    let dgam = params.get("deltaGamma")?.value();
                    let ratio_sq = (dgam / 2.0 / gamma) * (dgam / 2.0 / gamma);
                    Some(gamma * (1.0 - ratio_sq) / (1.0 + ratio_sq))
                }
                name if params.contains(name) => Some(params.get(name)?.value()),
                _ => None,
            };

            if let Some(fit_value) = fit_value {
                let pull = (fit_value - constraint.value()) / constraint.error();
                total += pull * pull;
            }
        }

        Ok(0.5 * total)
    }
}
