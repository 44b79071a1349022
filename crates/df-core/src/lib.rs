//! # df-core
//!
//! Core contracts for decayfit: physics parameters, fit results and scan
//! descriptors shared by the model layer and the fit/scan orchestration
//! layer.
//!
//! This crate is deliberately leaf-level: it carries no numerical machinery,
//! only the mutable parameter state and the immutable result records that
//! the rest of the workspace agrees on.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Contour plot storage.
pub mod contour;
/// Error types.
pub mod error;
/// Physics parameters and parameter sets.
pub mod parameter;
/// Fit result records.
pub mod result;
/// Result collections with timing.
pub mod result_vector;
/// Scan grid descriptors.
pub mod scan_param;

pub use contour::FunctionContour;
pub use error::{Error, Result};
pub use parameter::{ParameterSet, ParameterType, PhysicsParameter};
pub use result::{
    FitResult, ResultParameter, ResultParameterSet, FIT_CONVERGED, FIT_FAILED,
    LLSCAN_FIT_FAILURE_VALUE,
};
pub use result_vector::FitResultVector;
pub use scan_param::ScanParam;
