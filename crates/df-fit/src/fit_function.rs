//! The scalar objective handed to the minimiser: total negative
//! log-likelihood over the bottle plus the constraint penalty.

use crate::objective::{MinimiseStatus, ObjectiveFunction};
use df_core::{Error, ParameterSet, Result};
use df_model::PhysicsBottle;
use std::cell::RefCell;

/// Negative log-likelihood over a finalised [`PhysicsBottle`].
///
/// Owns the bottle for the duration of one minimisation. The free-parameter
/// vector layout follows the bottle parameter set's insertion order,
/// restricted to `Free` parameters.
pub struct FitFunction {
    bottle: RefCell<PhysicsBottle>,
    free_names: Vec<String>,
    initial_values: Vec<f64>,
    bounds: Vec<(f64, f64)>,
    weight_name: Option<String>,
    last_failure: RefCell<Option<MinimiseStatus>>,
}

// SAFETY: the minimisers are single-threaded within one minimise() call.
// The RefCells are never shared across threads.
unsafe impl Send for FitFunction {}
unsafe impl Sync for FitFunction {}

impl FitFunction {
    /// Bind the objective to a finalised bottle.
    ///
    /// With `integrator_test` set, every PDF normalisation is evaluated once
    /// up front so that a broken phase-space configuration fails here rather
    /// than deep inside the solver.
    pub fn new(
        bottle: PhysicsBottle,
        weight_name: Option<String>,
        integrator_test: bool,
    ) -> Result<Self> {
        if !bottle.is_finalised() {
            return Err(Error::Validation(
                "fit function requires a finalised bottle".to_string(),
            ));
        }

        if let Some(weight) = &weight_name {
            for index in 0..bottle.n_results() {
                let (_, data) = bottle.result(index)?;
                if !data.has_observable(weight) {
                    return Err(Error::Validation(format!(
                        "weight column '{weight}' missing from dataset {index}"
                    )));
                }
            }
        }

        if integrator_test {
            for index in 0..bottle.n_results() {
                let (pdf, data) = bottle.result(index)?;
                let norm = pdf.normalisation(data)?;
                if !(norm.is_finite() && norm > 0.0) {
                    return Err(Error::Integration(format!(
                        "normalisation test failed for pair {index}: {norm}"
                    )));
                }
            }
        }

        let params = bottle.parameters();
        let free_names = params.free_names();
        let mut initial_values = Vec::with_capacity(free_names.len());
        let mut bounds = Vec::with_capacity(free_names.len());
        for name in &free_names {
            let p = params.get(name)?;
            initial_values.push(p.value());
            bounds.push((p.minimum(), p.maximum()));
        }

        Ok(Self {
            bottle: RefCell::new(bottle),
            free_names,
            initial_values,
            bounds,
            weight_name,
            last_failure: RefCell::new(None),
        })
    }

    /// Free-parameter names, in vector order.
    pub fn free_names(&self) -> &[String] {
        &self.free_names
    }

    /// Starting point of the minimisation.
    pub fn initial_values(&self) -> &[f64] {
        &self.initial_values
    }

    /// Box bounds per free parameter.
    pub fn bounds(&self) -> &[(f64, f64)] {
        &self.bounds
    }

    /// Number of free parameters.
    pub fn n_free(&self) -> usize {
        self.free_names.len()
    }

    /// Snapshot of the bottle's parameter set.
    pub fn parameters(&self) -> ParameterSet {
        self.bottle.borrow().parameters().clone()
    }

    /// The failure recorded by the most recent objective evaluation, if any.
    ///
    /// The minimiser inspects this after a solver abort to classify the
    /// termination status.
    pub fn take_failure(&self) -> Option<MinimiseStatus> {
        self.last_failure.borrow_mut().take()
    }

    fn remember_failure(&self, error: &Error) {
        let status = match error {
            Error::Integration(msg) => MinimiseStatus::IntegrationFailure(msg.clone()),
            other => MinimiseStatus::GenericFailure(other.to_string()),
        };
        *self.last_failure.borrow_mut() = Some(status);
    }

    fn nll(&self, free_values: &[f64]) -> Result<f64> {
        let mut bottle = self.bottle.borrow_mut();

        let mut updated = bottle.parameters().clone();
        for (name, &value) in self.free_names.iter().zip(free_values) {
            updated.get_mut(name)?.set_value(value);
        }
        bottle.update_parameters(&updated)?;

        let mut total = 0.0;
        for index in 0..bottle.n_results() {
            let (pdf, data) = bottle.result(index)?;
            let norm = pdf.normalisation(data)?;
            let log_norm = norm.ln();
            for event in 0..data.n_events() {
                let density = pdf.evaluate(data, event)?;
                if !(density.is_finite() && density > 0.0) {
                    return Err(Error::Computation(format!(
                        "non-positive density {density} at event {event} of pair {index}"
                    )));
                }
                let weight = match &self.weight_name {
                    Some(w) => data.value(w, event)?,
                    None => 1.0,
                };
                total -= weight * (density.ln() - log_norm);
            }
        }

        for constraint in bottle.constraints() {
            total += constraint.evaluate(&updated)?;
        }

        Ok(total)
    }
}

impl ObjectiveFunction for FitFunction {
    fn eval(&self, params: &[f64]) -> Result<f64> {
        match self.nll(params) {
            Ok(value) => Ok(value),
            Err(e) => {
                self.remember_failure(&e);
                Err(e)
            }
        }
    }
}
