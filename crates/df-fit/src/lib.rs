//! # df-fit
//!
//! Fit assembly and scan orchestration for decayfit.
//!
//! The [`assembler::FitAssembler`] turns parameters, PDFs-with-data and
//! constraints into a [`df_core::FitResult`], either strictly (`do_fit`) or
//! with error isolation (`do_safe_fit`). The [`scan`] module drives repeated
//! safe fits over 1D and 2D parameter grids with a bounded retry policy,
//! and [`toy`] repeats fits over regenerated pseudo-data.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod assembler;
pub mod config;
pub mod fit_function;
pub mod minimiser;
pub mod objective;
pub mod registry;
pub mod scan;
pub mod toy;

pub use assembler::FitAssembler;
pub use config::{FitFunctionConfiguration, MinimiserConfiguration, OutputConfiguration};
pub use fit_function::FitFunction;
pub use minimiser::{LbfgsMinimiser, Minimiser, NelderMeadMinimiser};
pub use objective::{MinimiseConfig, MinimiseResult, MinimiseStatus, ObjectiveFunction};
pub use registry::{MinimiserFactory, MinimiserRegistry};
pub use scan::{contour_scan, do_scan, do_scan_2d, single_scan, ScopedFix};
pub use toy::{toy_study, toy_study_parallel};
