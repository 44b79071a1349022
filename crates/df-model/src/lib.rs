//! Physics models and their data for decayfit.
//!
//! This crate holds the collaborators the fit core consumes at their
//! interface boundary: the columnar [`DataSet`], the [`Pdf`] trait with the
//! built-in decay-time and mass models, Gaussian [`constraint`] penalties,
//! the [`PhysicsBottle`] joint-likelihood container, and [`PdfWithData`]
//! lazy data recipes (including seeded toy generation).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bottle;
pub mod constraint;
pub mod data;
pub mod pdf;
pub mod pdf_with_data;

pub use bottle::PhysicsBottle;
pub use constraint::{ConstraintFunction, ExternalConstraint};
pub use data::DataSet;
pub use pdf::{DecayTimePdf, GaussianMassPdf, Pdf, PdfFactory, PdfRegistry};
pub use pdf_with_data::{DataRecipe, PdfWithData};
