//! Two-lifetime decay-time model.

use crate::data::DataSet;
use crate::pdf::Pdf;
use df_core::{Error, ParameterSet, Result};

/// Decay-time density for a neutral B meson with width splitting.
///
/// The light and heavy mass eigenstates decay with widths
/// `Gamma_L = gamma + deltaGamma/2` and `Gamma_H = gamma - deltaGamma/2`;
/// the untagged density is the even mixture of the two exponentials,
/// normalised analytically over the decay-time window.
#[derive(Debug, Clone)]
pub struct DecayTimePdf {
    parameters: [String; 2],
    observables: [String; 1],
    gamma: f64,
    delta_gamma: f64,
}

impl DecayTimePdf {
    /// Create the model with unset (NaN) parameter values.
    pub fn new() -> Self {
        Self {
            parameters: ["gamma".to_string(), "deltaGamma".to_string()],
            observables: ["time".to_string()],
            gamma: f64::NAN,
            delta_gamma: f64::NAN,
        }
    }

    fn widths(&self) -> Result<(f64, f64)> {
        let gamma_l = self.gamma + self.delta_gamma / 2.0;
        let gamma_h = self.gamma - self.delta_gamma / 2.0;
        if !(gamma_l.is_finite() && gamma_h.is_finite() && gamma_l > 0.0 && gamma_h > 0.0) {
            return Err(Error::Integration(format!(
                "decay widths must be positive, got Gamma_L={gamma_l}, Gamma_H={gamma_h}"
            )));
        }
        Ok((gamma_l, gamma_h))
    }
}

impl Default for DecayTimePdf {
    fn default() -> Self {
        Self::new()
    }
}

impl Pdf for DecayTimePdf {
    fn parameter_names(&self) -> &[String] {
        &self.parameters
    }

    fn observable_names(&self) -> &[String] {
        &self.observables
    }

    fn set_physics_parameters(&mut self, params: &ParameterSet) -> Result<()> {
        self.gamma = params.get("gamma")?.value();
        self.delta_gamma = params.get("deltaGamma")?.value();
        Ok(())
    }

    fn evaluate(&self, data: &DataSet, event: usize) -> Result<f64> {
        let (gamma_l, gamma_h) = self.widths()?;
        let t = data.value("time", event)?;
        Ok(0.5 * ((-gamma_l * t).exp() + (-gamma_h * t).exp()))
    }

    fn normalisation(&self, data: &DataSet) -> Result<f64> {
        let (gamma_l, gamma_h) = self.widths()?;
        let (low, high) = data
            .bounds("time")
            .ok_or_else(|| Error::Validation("missing bounds for 'time'".to_string()))?;

        let integral = |g: f64| ((-g * low).exp() - (-g * high).exp()) / g;
        let norm = 0.5 * (integral(gamma_l) + integral(gamma_h));
        if !(norm.is_finite() && norm > 0.0) {
            return Err(Error::Integration(format!(
                "decay-time normalisation not positive: {norm}"
            )));
        }
        Ok(norm)
    }

    fn clone_box(&self) -> Box<dyn Pdf> {
        Box::new(self.clone())
    }
}
