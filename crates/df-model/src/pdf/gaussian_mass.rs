//! Gaussian signal-mass model.

use crate::data::DataSet;
use crate::pdf::Pdf;
use df_core::{Error, ParameterSet, Result};
use statrs::function::erf::erf;

/// Gaussian density over the reconstructed mass, truncated to the mass window.
#[derive(Debug, Clone)]
pub struct GaussianMassPdf {
    parameters: [String; 2],
    observables: [String; 1],
    mean: f64,
    sigma: f64,
}

impl GaussianMassPdf {
    /// Create the model with unset (NaN) parameter values.
    pub fn new() -> Self {
        Self {
            parameters: ["massMean".to_string(), "massSigma".to_string()],
            observables: ["mass".to_string()],
            mean: f64::NAN,
            sigma: f64::NAN,
        }
    }
}

impl Default for GaussianMassPdf {
    fn default() -> Self {
        Self::new()
    }
}

impl Pdf for GaussianMassPdf {
    fn parameter_names(&self) -> &[String] {
        &self.parameters
    }

    fn observable_names(&self) -> &[String] {
        &self.observables
    }

    fn set_physics_parameters(&mut self, params: &ParameterSet) -> Result<()> {
        self.mean = params.get("massMean")?.value();
        self.sigma = params.get("massSigma")?.value();
        Ok(())
    }

    fn evaluate(&self, data: &DataSet, event: usize) -> Result<f64> {
        if !(self.sigma.is_finite() && self.sigma > 0.0) {
            return Err(Error::Computation(format!(
                "massSigma must be positive, got {}",
                self.sigma
            )));
        }
        let m = data.value("mass", event)?;
        let z = (m - self.mean) / self.sigma;
        Ok((-0.5 * z * z).exp())
    }

    fn normalisation(&self, data: &DataSet) -> Result<f64> {
        if !(self.sigma.is_finite() && self.sigma > 0.0) {
            return Err(Error::Integration(format!(
                "massSigma must be positive, got {}",
                self.sigma
            )));
        }
        let (low, high) = data
            .bounds("mass")
            .ok_or_else(|| Error::Validation("missing bounds for 'mass'".to_string()))?;

        let scaled = |x: f64| (x - self.mean) / (self.sigma * std::f64::consts::SQRT_2);
        let norm = self.sigma
            * (std::f64::consts::PI / 2.0).sqrt()
            * (erf(scaled(high)) - erf(scaled(low)));
        if !(norm.is_finite() && norm > 0.0) {
            return Err(Error::Integration(format!(
                "Gaussian mass normalisation not positive: {norm}"
            )));
        }
        Ok(norm)
    }

    fn clone_box(&self) -> Box<dyn Pdf> {
        Box::new(self.clone())
    }
}
