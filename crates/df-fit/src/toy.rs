//! Toy studies: repeated safe fits over regenerated pseudo-data.
//!
//! Structurally a scan that varies random data instead of a fixed parameter.

use crate::assembler::FitAssembler;
use crate::config::{FitFunctionConfiguration, MinimiserConfiguration};
use df_core::{FitResult, FitResultVector, ParameterSet, Result};
use df_model::{ConstraintFunction, PdfWithData};
use rayon::prelude::*;
use std::time::{Duration, Instant};

/// Seed for one (repeat, dataset) cell; repeats never share a seed.
fn repeat_seed(base: u64, repeat: usize, n_datasets: usize, index: usize) -> u64 {
    base.wrapping_add((repeat * n_datasets + index) as u64)
}

/// Run `n_repeats` safe fits, regenerating every toy dataset between
/// repeats. Sequential; the parameter set is shared across repeats exactly
/// as in a scan.
pub fn toy_study(
    minimiser_config: &MinimiserConfiguration,
    function_config: &FitFunctionConfiguration,
    parameters: &ParameterSet,
    pdf_data: &mut [PdfWithData],
    constraints: &[ConstraintFunction],
    n_repeats: usize,
    seed: u64,
    output_level: i32,
) -> Result<FitResultVector> {
    let mut results = FitResultVector::new(parameters.names());
    let n_datasets = pdf_data.len();

    for repeat in 0..n_repeats {
        log::info!("toy repeat {}/{n_repeats}", repeat + 1);
        for (index, pwd) in pdf_data.iter_mut().enumerate() {
            pwd.regenerate(repeat_seed(seed, repeat, n_datasets, index));
        }
        results.start_stopwatch();
        let result = FitAssembler::do_safe_fit(
            minimiser_config,
            function_config,
            parameters,
            pdf_data,
            constraints,
            output_level,
        )?;
        results.add_result(result);
    }

    Ok(results)
}

/// Parallel variant: each repeat works on its own clones of the parameter
/// set and data recipes, so no state is shared between concurrent fits.
///
/// Results are collected in repeat order, making the output independent of
/// scheduling.
pub fn toy_study_parallel(
    minimiser_config: &MinimiserConfiguration,
    function_config: &FitFunctionConfiguration,
    parameters: &ParameterSet,
    pdf_data: &[PdfWithData],
    constraints: &[ConstraintFunction],
    n_repeats: usize,
    seed: u64,
    output_level: i32,
) -> Result<FitResultVector> {
    let n_datasets = pdf_data.len();

    let outcomes: Vec<(FitResult, Duration)> = (0..n_repeats)
        .into_par_iter()
        .map(|repeat| {
            let mut local_pdf_data = pdf_data.to_vec();
            for (index, pwd) in local_pdf_data.iter_mut().enumerate() {
                pwd.regenerate(repeat_seed(seed, repeat, n_datasets, index));
            }
            let started = Instant::now();
            let result = FitAssembler::do_safe_fit(
                minimiser_config,
                function_config,
                parameters,
                &mut local_pdf_data,
                constraints,
                output_level,
            )?;
            Ok((result, started.elapsed()))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut results = FitResultVector::new(parameters.names());
    for (result, duration) in outcomes {
        results.add_timed_result(result, duration);
    }
    Ok(results)
}
