//! Fit assembly: from raw inputs to a [`FitResult`], in two tiers of
//! strictness.

use crate::config::{FitFunctionConfiguration, MinimiserConfiguration};
use df_core::{
    Error, FitResult, ParameterSet, Result, ResultParameter, ResultParameterSet, FIT_FAILED,
    LLSCAN_FIT_FAILURE_VALUE,
};
use df_model::{ConstraintFunction, DataSet, Pdf, PdfWithData, PhysicsBottle};

/// Static entry points that assemble and run one minimisation.
///
/// `do_fit` is the strict tier: every failure propagates. `do_safe_fit`
/// wraps it with error isolation and always hands back a result object,
/// which is what the scan orchestrator relies on.
pub struct FitAssembler;

impl FitAssembler {
    /// Reduce the given parameter set to exactly what the PDFs require, in
    /// PDF-declared order.
    ///
    /// A PDF-required parameter missing from `given` is a fatal
    /// configuration error naming the parameter.
    pub fn check_input_params(
        given: &ParameterSet,
        pdfs: &[&dyn Pdf],
    ) -> Result<ParameterSet> {
        let mut reduced = ParameterSet::new();
        for pdf in pdfs {
            for name in pdf.parameter_names() {
                if reduced.contains(name) {
                    continue;
                }
                let parameter = given.get(name).map_err(|_| {
                    Error::Validation(format!(
                        "PDF requires parameter '{name}' which is not in the input set"
                    ))
                })?;
                reduced.add(parameter.clone())?;
            }
        }
        Ok(reduced)
    }

    /// Validate PDF/dataset observable compatibility before any fit attempt.
    pub fn check_input_obs(
        pairs: &[(&dyn Pdf, &DataSet)],
        weight_name: Option<&str>,
    ) -> Result<()> {
        for (index, (pdf, data)) in pairs.iter().enumerate() {
            for name in pdf.observable_names() {
                if !data.has_observable(name) {
                    return Err(Error::Validation(format!(
                        "dataset {index} is missing observable '{name}' required by its PDF"
                    )));
                }
            }
            if let Some(weight) = weight_name {
                if !data.has_observable(weight) {
                    return Err(Error::Validation(format!(
                        "dataset {index} is missing weight column '{weight}'"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Strict fit: build the bottle, minimise, extract the result.
    ///
    /// Lazy data generation happens here, when each [`PdfWithData`] is
    /// realised. All failures propagate, including numerical ones.
    pub fn do_fit(
        minimiser_config: &MinimiserConfiguration,
        function_config: &FitFunctionConfiguration,
        parameters: &ParameterSet,
        pdf_data: &mut [PdfWithData],
        constraints: &[ConstraintFunction],
    ) -> Result<FitResult> {
        let prototypes: Vec<&dyn Pdf> = pdf_data.iter().map(|p| p.pdf()).collect();
        let reduced = Self::check_input_params(parameters, &prototypes)?;

        let mut realised = Vec::with_capacity(pdf_data.len());
        for pwd in pdf_data.iter_mut() {
            realised.push(pwd.realise(&reduced)?);
        }
        let pairs: Vec<(&dyn Pdf, &DataSet)> =
            realised.iter().map(|(pdf, data)| (pdf.as_ref(), data)).collect();
        Self::check_input_obs(&pairs, function_config.weight_name())?;

        let mut bottle = PhysicsBottle::new(reduced);
        for (pdf, data) in realised {
            bottle.add_result(pdf, data);
        }
        for constraint in constraints {
            bottle.add_constraint(constraint.clone());
        }
        bottle.finalise()?;

        let n_free = bottle.parameters().float_count();
        let mut minimiser = minimiser_config.minimiser(n_free)?;
        let function = function_config.fit_function(bottle)?;

        minimiser.minimise(&function)?;
        let mut result = minimiser.fit_result(&function)?;

        Self::check_parameter_set(&mut result, parameters)?;
        Ok(result)
    }

    /// Error-isolated fit: always returns a result object for well-formed
    /// inputs.
    ///
    /// Numerical failures (integration errors, solver divergence) are
    /// logged and converted into a sentinel result carrying the input
    /// parameter schema, [`LLSCAN_FIT_FAILURE_VALUE`] and a negative status.
    /// Only caller-contract violations escape as errors. `output_level`
    /// gates logging verbosity, never control flow.
    pub fn do_safe_fit(
        minimiser_config: &MinimiserConfiguration,
        function_config: &FitFunctionConfiguration,
        parameters: &ParameterSet,
        pdf_data: &mut [PdfWithData],
        constraints: &[ConstraintFunction],
        output_level: i32,
    ) -> Result<FitResult> {
        match Self::do_fit(minimiser_config, function_config, parameters, pdf_data, constraints)
        {
            Ok(result) => Ok(result),
            Err(e @ (Error::Integration(_) | Error::Computation(_))) => {
                if output_level >= 0 {
                    log::warn!("fit failed, returning sentinel result: {e}");
                } else {
                    log::debug!("fit failed, returning sentinel result: {e}");
                }
                Ok(Self::sentinel_result(parameters))
            }
            Err(other) => Err(other),
        }
    }

    /// Pete's strategy: after a converged base fit, re-probe the strong-phase
    /// sign ambiguity and keep the lower minimum.
    pub fn petes_do_safe_fit(
        minimiser_config: &MinimiserConfiguration,
        function_config: &FitFunctionConfiguration,
        parameters: &ParameterSet,
        pdf_data: &mut [PdfWithData],
        constraints: &[ConstraintFunction],
        output_level: i32,
    ) -> Result<FitResult> {
        let base = Self::do_safe_fit(
            minimiser_config,
            function_config,
            parameters,
            pdf_data,
            constraints,
            output_level,
        )?;
        if !base.converged() {
            return Ok(base);
        }

        let Some(flipped) = flip_strong_phases(parameters)? else {
            return Ok(base);
        };
        log::info!("re-fitting from mirrored strong phases");
        let alternate = Self::do_safe_fit(
            minimiser_config,
            function_config,
            &flipped,
            pdf_data,
            constraints,
            output_level,
        )?;
        Ok(lower_minimum(base, alternate))
    }

    /// Rob's strategy: probe the strong-phase ambiguity and the
    /// (`deltaGamma`, `phi_s`) sign ambiguity, separately and combined, and
    /// keep the overall lowest minimum.
    pub fn robs_do_safe_fit(
        minimiser_config: &MinimiserConfiguration,
        function_config: &FitFunctionConfiguration,
        parameters: &ParameterSet,
        pdf_data: &mut [PdfWithData],
        constraints: &[ConstraintFunction],
        output_level: i32,
    ) -> Result<FitResult> {
        let mut best = Self::do_safe_fit(
            minimiser_config,
            function_config,
            parameters,
            pdf_data,
            constraints,
            output_level,
        )?;
        if !best.converged() {
            return Ok(best);
        }

        let phases = flip_strong_phases(parameters)?;
        let widths = flip_width_and_phase(parameters)?;
        let combined = match &phases {
            Some(flipped) => flip_width_and_phase(flipped)?,
            None => None,
        };

        for start in [phases, widths, combined].into_iter().flatten() {
            log::info!("re-fitting from mirrored starting point");
            let alternate = Self::do_safe_fit(
                minimiser_config,
                function_config,
                &start,
                pdf_data,
                constraints,
                output_level,
            )?;
            best = lower_minimum(best, alternate);
        }
        Ok(best)
    }

    /// Re-inject input parameters the minimiser never saw, so every result
    /// from one analysis carries a uniform parameter schema.
    fn check_parameter_set(result: &mut FitResult, given: &ParameterSet) -> Result<()> {
        for parameter in given.iter() {
            if result.params.get(parameter.name()).is_none() {
                result.params.force_new(ResultParameter::new(
                    parameter.name(),
                    parameter.value(),
                    0.0,
                    parameter.value(),
                    parameter.value(),
                    parameter.ptype(),
                    parameter.unit(),
                ))?;
            }
        }
        Ok(())
    }

    /// Synthetic failure result with the input parameter schema.
    fn sentinel_result(parameters: &ParameterSet) -> FitResult {
        let mut params = ResultParameterSet::new();
        for parameter in parameters.iter() {
            params.set(ResultParameter::new(
                parameter.name(),
                parameter.value(),
                0.0,
                parameter.minimum(),
                parameter.maximum(),
                parameter.ptype(),
                parameter.unit(),
            ));
        }
        FitResult::new(LLSCAN_FIT_FAILURE_VALUE, FIT_FAILED, params)
    }
}

fn lower_minimum(base: FitResult, alternate: FitResult) -> FitResult {
    if alternate.converged() && alternate.minimum < base.minimum {
        log::info!(
            "alternate minimum is lower ({} < {}), keeping it",
            alternate.minimum,
            base.minimum
        );
        alternate
    } else {
        base
    }
}

/// Mirror the strong phases: `delta_perp -> pi - delta_perp`,
/// `delta_para -> -delta_para`. Returns `None` when either is absent.
fn flip_strong_phases(parameters: &ParameterSet) -> Result<Option<ParameterSet>> {
    if !(parameters.contains("delta_perp") && parameters.contains("delta_para")) {
        return Ok(None);
    }
    let mut flipped = parameters.clone();
    flip_value(&mut flipped, "delta_perp", |v| std::f64::consts::PI - v)?;
    flip_value(&mut flipped, "delta_para", |v| -v)?;
    Ok(Some(flipped))
}

/// Mirror the width difference and weak phase: `deltaGamma -> -deltaGamma`,
/// `phi_s -> pi - phi_s`. Returns `None` when either is absent.
fn flip_width_and_phase(parameters: &ParameterSet) -> Result<Option<ParameterSet>> {
    if !(parameters.contains("deltaGamma") && parameters.contains("phi_s")) {
        return Ok(None);
    }
    let mut flipped = parameters.clone();
    flip_value(&mut flipped, "deltaGamma", |v| -v)?;
    flip_value(&mut flipped, "phi_s", |v| std::f64::consts::PI - v)?;
    Ok(Some(flipped))
}

fn flip_value(
    parameters: &mut ParameterSet,
    name: &str,
    f: impl Fn(f64) -> f64,
) -> Result<()> {
    let parameter = parameters.get_mut(name)?;
    let flipped = f(parameter.value()).clamp(parameter.minimum(), parameter.maximum());
    parameter.set_value(flipped);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use df_core::{ParameterType, PhysicsParameter};
    use df_model::DecayTimePdf;

    fn params(entries: &[(&str, f64, f64, f64, ParameterType)]) -> ParameterSet {
        let mut set = ParameterSet::new();
        for &(name, value, lo, hi, ptype) in entries {
            set.add(PhysicsParameter::new(name, value, lo, hi, ptype, "").unwrap()).unwrap();
        }
        set
    }

    #[test]
    fn test_check_input_params_reduces_and_orders() {
        let given = params(&[
            ("unrelated", 1.0, 0.0, 2.0, ParameterType::Fixed),
            ("deltaGamma", 0.1, -1.0, 1.0, ParameterType::Free),
            ("gamma", 0.66, 0.01, 2.0, ParameterType::Free),
        ]);
        let pdf = DecayTimePdf::new();
        let pdfs: Vec<&dyn Pdf> = vec![&pdf];
        let reduced = FitAssembler::check_input_params(&given, &pdfs).unwrap();
        // PDF-declared order, unrelated parameter dropped.
        assert_eq!(reduced.names(), vec!["gamma", "deltaGamma"]);
    }

    #[test]
    fn test_check_input_params_names_the_missing_parameter() {
        let given = params(&[("gamma", 0.66, 0.01, 2.0, ParameterType::Free)]);
        let pdf = DecayTimePdf::new();
        let pdfs: Vec<&dyn Pdf> = vec![&pdf];
        let err = FitAssembler::check_input_params(&given, &pdfs).unwrap_err();
        assert!(err.to_string().contains("deltaGamma"));
    }

    #[test]
    fn test_check_input_obs_rejects_missing_observable() {
        let pdf = DecayTimePdf::new();
        let data = DataSet::new(
            vec![("mass".to_string(), vec![5.3])],
            vec![("mass".to_string(), (5.0, 5.6))],
        )
        .unwrap();
        let pairs: Vec<(&dyn Pdf, &DataSet)> = vec![(&pdf, &data)];
        assert!(FitAssembler::check_input_obs(&pairs, None).is_err());
    }

    #[test]
    fn test_strong_phase_flip() {
        let set = params(&[
            ("delta_perp", 0.5, -7.0, 7.0, ParameterType::Free),
            ("delta_para", 0.3, -7.0, 7.0, ParameterType::Free),
        ]);
        let flipped = flip_strong_phases(&set).unwrap().unwrap();
        assert!((flipped.get("delta_perp").unwrap().value()
            - (std::f64::consts::PI - 0.5))
            .abs()
            < 1e-12);
        assert!((flipped.get("delta_para").unwrap().value() + 0.3).abs() < 1e-12);

        // Absent phases mean no alternate starting point.
        let plain = params(&[("gamma", 0.66, 0.01, 2.0, ParameterType::Free)]);
        assert!(flip_strong_phases(&plain).unwrap().is_none());
    }
}
