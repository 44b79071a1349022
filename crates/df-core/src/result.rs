//! Fit result records: fitted parameters, status, covariance, contours.

use crate::contour::FunctionContour;
use crate::parameter::ParameterType;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Minuit-convention status code for a fully converged fit.
pub const FIT_CONVERGED: i32 = 3;

/// Status code stamped on synthetic safe-fit failure results.
pub const FIT_FAILED: i32 = -1;

/// Sentinel objective value reported for a failed scan-point fit.
pub const LLSCAN_FIT_FAILURE_VALUE: f64 = 9999.0;

/// One parameter as reported by a finished fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultParameter {
    /// Parameter name.
    pub name: String,
    /// Fitted (or stamped) value.
    pub value: f64,
    /// Symmetric uncertainty; 0 for fixed or stamped parameters.
    pub error: f64,
    /// Lower bound used in the fit.
    pub minimum: f64,
    /// Upper bound used in the fit.
    pub maximum: f64,
    /// Status the parameter had during the fit.
    pub ptype: ParameterType,
    /// Physical unit label.
    pub unit: String,
    /// True when this parameter was the scanned axis of a scan point.
    pub scanned: bool,
}

impl ResultParameter {
    /// Create a result parameter with `scanned = false`.
    pub fn new(
        name: impl Into<String>,
        value: f64,
        error: f64,
        minimum: f64,
        maximum: f64,
        ptype: ParameterType,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value,
            error,
            minimum,
            maximum,
            ptype,
            unit: unit.into(),
            scanned: false,
        }
    }
}

/// Ordered set of [`ResultParameter`], the output schema of one fit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultParameterSet {
    parameters: Vec<ResultParameter>,
}

impl ResultParameterSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// All parameter names in order.
    pub fn names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    /// True if no parameters are recorded.
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Look up a parameter by name.
    pub fn get(&self, name: &str) -> Option<&ResultParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Look up a parameter mutably by name.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut ResultParameter> {
        self.parameters.iter_mut().find(|p| p.name == name)
    }

    /// Overwrite an existing entry, or append when the name is new.
    ///
    /// The scan orchestrator uses this to stamp the intended grid value onto
    /// an accepted scan-point result.
    pub fn set(&mut self, parameter: ResultParameter) {
        match self.get_mut(&parameter.name) {
            Some(existing) => *existing = parameter,
            None => self.parameters.push(parameter),
        }
    }

    /// Append a parameter that the minimiser never saw.
    ///
    /// Used to re-inject input parameters that were fixed and dropped from
    /// the fit, keeping the result schema uniform across a scan.
    pub fn force_new(&mut self, parameter: ResultParameter) -> Result<()> {
        if self.get(&parameter.name).is_some() {
            return Err(Error::Validation(format!(
                "result parameter '{}' already present",
                parameter.name
            )));
        }
        self.parameters.push(parameter);
        Ok(())
    }

    /// Iterate over the parameters in order.
    pub fn iter(&self) -> impl Iterator<Item = &ResultParameter> {
        self.parameters.iter()
    }
}

/// Immutable-after-construction record of one minimisation attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitResult {
    /// Objective value at the minimum (or [`LLSCAN_FIT_FAILURE_VALUE`]).
    pub minimum: f64,
    /// Status code; [`FIT_CONVERGED`] on success, negative on failure.
    pub status: i32,
    /// Fitted parameter values, errors and bounds.
    pub params: ResultParameterSet,
    /// Covariance matrix packed lower-triangular, row-major, over the free
    /// parameters in result order. `None` when unavailable.
    pub covariance: Option<Vec<f64>>,
    /// Contour plots produced by the minimiser, if requested.
    pub contours: Vec<FunctionContour>,
}

impl FitResult {
    /// Create a result without covariance or contours.
    pub fn new(minimum: f64, status: i32, params: ResultParameterSet) -> Self {
        Self { minimum, status, params, covariance: None, contours: Vec::new() }
    }

    /// Attach a packed lower-triangular covariance matrix.
    pub fn with_covariance(mut self, covariance: Vec<f64>) -> Self {
        self.covariance = Some(covariance);
        self
    }

    /// Attach contour plots.
    pub fn with_contours(mut self, contours: Vec<FunctionContour>) -> Self {
        self.contours = contours;
        self
    }

    /// True when the fit reached [`FIT_CONVERGED`].
    pub fn converged(&self) -> bool {
        self.status == FIT_CONVERGED
    }

    /// Covariance element (i, j) over the free parameters, if available.
    pub fn covariance_element(&self, i: usize, j: usize) -> Option<f64> {
        let cov = self.covariance.as_ref()?;
        let (row, col) = if i >= j { (i, j) } else { (j, i) };
        // Packed lower triangle: element (row, col) sits at row*(row+1)/2 + col.
        cov.get(row * (row + 1) / 2 + col).copied()
    }

    /// Write the result as JSON to `path`.
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Read a result back from a JSON file written by [`FitResult::save`].
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Correlation coefficient between free parameters i and j, if available.
    pub fn correlation(&self, i: usize, j: usize) -> Option<f64> {
        let cij = self.covariance_element(i, j)?;
        let cii = self.covariance_element(i, i)?;
        let cjj = self.covariance_element(j, j)?;
        if cii <= 0.0 || cjj <= 0.0 {
            return None;
        }
        Some(cij / (cii * cjj).sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn rp(name: &str, value: f64) -> ResultParameter {
        ResultParameter::new(name, value, 0.1, -1.0, 1.0, ParameterType::Free, "")
    }

    #[test]
    fn test_set_overwrites_and_appends() {
        let mut set = ResultParameterSet::new();
        set.set(rp("gamma", 0.6));
        set.set(rp("gamma", 0.7));
        assert_eq!(set.len(), 1);
        assert_relative_eq!(set.get("gamma").unwrap().value, 0.7);

        set.set(rp("deltaGamma", 0.1));
        assert_eq!(set.names(), vec!["gamma", "deltaGamma"]);
    }

    #[test]
    fn test_force_new_rejects_existing() {
        let mut set = ResultParameterSet::new();
        set.set(rp("gamma", 0.6));
        assert!(set.force_new(rp("gamma", 0.5)).is_err());
        assert!(set.force_new(rp("tagEff", 0.3)).is_ok());
    }

    #[test]
    fn test_packed_covariance_lookup() {
        let mut set = ResultParameterSet::new();
        set.set(rp("a", 1.0));
        set.set(rp("b", 2.0));
        // [[4, 1], [1, 9]] packed lower-triangular: [4, 1, 9]
        let result =
            FitResult::new(0.0, FIT_CONVERGED, set).with_covariance(vec![4.0, 1.0, 9.0]);

        assert_relative_eq!(result.covariance_element(0, 0).unwrap(), 4.0);
        assert_relative_eq!(result.covariance_element(0, 1).unwrap(), 1.0);
        assert_relative_eq!(result.covariance_element(1, 0).unwrap(), 1.0);
        assert_relative_eq!(result.correlation(0, 1).unwrap(), 1.0 / 6.0);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let mut set = ResultParameterSet::new();
        set.set(rp("gamma", 0.66));
        let result = FitResult::new(-3.0, FIT_CONVERGED, set);

        let path = std::env::temp_dir().join("decayfit_result_roundtrip.json");
        result.save(&path).unwrap();
        let back = FitResult::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert!(back.converged());
        assert_relative_eq!(back.params.get("gamma").unwrap().value, 0.66);
    }

    #[test]
    fn test_result_serialises() {
        let mut set = ResultParameterSet::new();
        set.set(rp("gamma", 0.66));
        let result = FitResult::new(-12.5, FIT_CONVERGED, set);
        let json = serde_json::to_string(&result).unwrap();
        let back: FitResult = serde_json::from_str(&json).unwrap();
        assert!(back.converged());
        assert_relative_eq!(back.minimum, -12.5);
    }
}
