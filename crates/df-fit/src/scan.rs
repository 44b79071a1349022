//! Profile-likelihood scans: fix a parameter on a grid, re-fit at each
//! point, retry non-converged points with a bounded wiggle search.

use crate::assembler::FitAssembler;
use crate::config::{FitFunctionConfiguration, MinimiserConfiguration, OutputConfiguration};
use df_core::{
    FitResultVector, ParameterSet, ParameterType, Result, ResultParameter, ScanParam,
};
use df_model::{ConstraintFunction, PdfWithData};

/// Wiggle displacements are in units of `step / WIGGLE_DIVISOR`.
const WIGGLE_DIVISOR: f64 = 20.0;

/// Hard cap on wiggle attempts per scan point.
const MAX_WIGGLE_STEPS: u32 = 20;

/// Exclusive-mutation guard for the scanned parameter.
///
/// Forces the parameter to `Fixed` on acquisition and restores the original
/// type and blinded value when dropped, so the restoration happens on every
/// exit path, early `?` returns included.
pub struct ScopedFix<'a> {
    parameters: &'a mut ParameterSet,
    name: String,
    original_blinded: f64,
    original_type: ParameterType,
}

impl<'a> ScopedFix<'a> {
    /// Acquire the named parameter and fix it.
    pub fn new(parameters: &'a mut ParameterSet, name: &str) -> Result<Self> {
        let (original_blinded, original_type) = {
            let parameter = parameters.get_mut(name)?;
            let snapshot = (parameter.blinded_value(), parameter.ptype());
            parameter.set_ptype(ParameterType::Fixed);
            snapshot
        };
        Ok(Self { parameters, name: name.to_string(), original_blinded, original_type })
    }

    /// Move the fixed parameter to a new blinded value.
    pub fn set_value(&mut self, blinded: f64) -> Result<()> {
        self.parameters.get_mut(&self.name)?.set_blinded_value(blinded);
        Ok(())
    }

    /// The full parameter set, with the scanned parameter fixed.
    pub fn params(&self) -> &ParameterSet {
        self.parameters
    }

    /// Mutable access for nesting an inner scan.
    pub fn params_mut(&mut self) -> &mut ParameterSet {
        self.parameters
    }
}

impl Drop for ScopedFix<'_> {
    fn drop(&mut self) {
        if let Ok(parameter) = self.parameters.get_mut(&self.name) {
            parameter.set_ptype(self.original_type);
            parameter.set_blinded_value(self.original_blinded);
        }
    }
}

/// Grid value stamped onto an accepted result: always the intended grid
/// point, never the wiggled value the fit actually converged at.
fn stamp_scan_value(
    result: &mut df_core::FitResult,
    parameters: &ParameterSet,
    name: &str,
    grid_value: f64,
) -> Result<()> {
    let parameter = parameters.get(name)?;
    let mut stamped = ResultParameter::new(
        name,
        grid_value,
        0.0,
        grid_value,
        grid_value,
        parameter.ptype(),
        parameter.unit(),
    );
    stamped.scanned = true;
    result.params.set(stamped);
    Ok(())
}

/// 1D profile scan over `scan_param`'s grid.
///
/// Each point fixes the scanned parameter at the grid value and runs a safe
/// fit. A non-converged point gets one straight retry, then a wiggle search
/// alternating right/left around the grid value in growing multiples of
/// `step / 20`, bounded by [`MAX_WIGGLE_STEPS`]; the last result is accepted
/// as-is when the budget runs out.
pub fn do_scan(
    minimiser_config: &MinimiserConfiguration,
    function_config: &FitFunctionConfiguration,
    parameters: &mut ParameterSet,
    pdf_data: &mut [PdfWithData],
    constraints: &[ConstraintFunction],
    scan_param: &ScanParam,
    output_level: i32,
) -> Result<FitResultVector> {
    let mut function_config = function_config.clone();
    function_config.set_integrator_test(false);

    let mut results = FitResultVector::new(parameters.names());
    let mut guard = ScopedFix::new(parameters, scan_param.name())?;
    let wiggle_step_size = scan_param.step() / WIGGLE_DIVISOR;

    for i in 0..scan_param.points() {
        let grid_value = scan_param.grid_value(i);
        log::info!(
            "scan point {}/{}: {} = {grid_value}",
            i + 1,
            scan_param.points(),
            scan_param.name()
        );

        guard.set_value(grid_value)?;
        results.start_stopwatch();
        let mut result = FitAssembler::do_safe_fit(
            minimiser_config,
            &function_config,
            guard.params(),
            pdf_data,
            constraints,
            output_level,
        )?;

        let mut retries = 0_u32;
        let mut wiggle_step_num = 0_u32;
        while !result.converged() {
            let trial = if retries != 1 {
                retries += 1;
                log::warn!("scan point did not converge, retrying at the grid value");
                grid_value
            } else {
                if wiggle_step_num + 1 >= MAX_WIGGLE_STEPS {
                    log::warn!(
                        "retry budget exhausted at {} = {grid_value}, accepting last result",
                        scan_param.name()
                    );
                    break;
                }
                // Even step count wiggles right, odd wiggles left, with the
                // displacement growing every second attempt.
                let direction = if wiggle_step_num % 2 == 0 { 1.0 } else { -1.0 };
                let multiple = (wiggle_step_num / 2 + 1) as f64;
                let trial = grid_value + direction * wiggle_step_size * multiple;
                wiggle_step_num += 1;
                log::warn!("wiggling scan point to {trial} and retrying");
                trial
            };

            guard.set_value(trial)?;
            results.start_stopwatch();
            result = FitAssembler::do_safe_fit(
                minimiser_config,
                &function_config,
                guard.params(),
                pdf_data,
                constraints,
                output_level,
            )?;
        }

        stamp_scan_value(&mut result, guard.params(), scan_param.name(), grid_value)?;
        results.add_result(result);
    }

    Ok(results)
}

/// 2D scan: one inner [`do_scan`] per outer grid point.
///
/// Every inner result is stamped with the outer parameter's grid value and
/// marked scanned, so the pair of scanned parameters identifies the grid
/// cell.
pub fn do_scan_2d(
    minimiser_config: &MinimiserConfiguration,
    function_config: &FitFunctionConfiguration,
    parameters: &mut ParameterSet,
    pdf_data: &mut [PdfWithData],
    constraints: &[ConstraintFunction],
    outer: &ScanParam,
    inner: &ScanParam,
    output_level: i32,
) -> Result<Vec<FitResultVector>> {
    let mut collected = Vec::with_capacity(outer.points());
    let mut guard = ScopedFix::new(parameters, outer.name())?;

    for i in 0..outer.points() {
        let outer_value = outer.grid_value(i);
        log::info!(
            "2D scan outer point {}/{}: {} = {outer_value}",
            i + 1,
            outer.points(),
            outer.name()
        );
        guard.set_value(outer_value)?;

        let mut inner_results = do_scan(
            minimiser_config,
            function_config,
            guard.params_mut(),
            pdf_data,
            constraints,
            inner,
            output_level,
        )?;

        for j in 0..inner_results.len() {
            if let Some(result) = inner_results.result_mut(j) {
                stamp_scan_value(result, guard.params(), outer.name(), outer_value)?;
            }
        }
        collected.push(inner_results);
    }

    Ok(collected)
}

/// Public 1D entry point: resolve the scan descriptor by name.
pub fn single_scan(
    minimiser_config: &MinimiserConfiguration,
    function_config: &FitFunctionConfiguration,
    output_config: &OutputConfiguration,
    parameters: &mut ParameterSet,
    pdf_data: &mut [PdfWithData],
    constraints: &[ConstraintFunction],
    scan_name: &str,
    output_level: i32,
) -> Result<FitResultVector> {
    let scan_param = output_config.scan_param(scan_name)?;
    do_scan(
        minimiser_config,
        function_config,
        parameters,
        pdf_data,
        constraints,
        scan_param,
        output_level,
    )
}

/// Public 2D entry point: resolve both scan descriptors by name.
pub fn contour_scan(
    minimiser_config: &MinimiserConfiguration,
    function_config: &FitFunctionConfiguration,
    output_config: &OutputConfiguration,
    parameters: &mut ParameterSet,
    pdf_data: &mut [PdfWithData],
    constraints: &[ConstraintFunction],
    outer_name: &str,
    inner_name: &str,
    output_level: i32,
) -> Result<Vec<FitResultVector>> {
    let (outer, inner) = output_config.scan_params_2d(outer_name, inner_name)?;
    do_scan_2d(
        minimiser_config,
        function_config,
        parameters,
        pdf_data,
        constraints,
        outer,
        inner,
        output_level,
    )
}
