//! The joint-likelihood container binding PDFs, data, constraints and
//! parameters for one fit attempt.

use crate::constraint::ConstraintFunction;
use crate::data::DataSet;
use crate::pdf::Pdf;
use df_core::{Error, ParameterSet, Result};

/// Aggregate likelihood target: (PDF, dataset) pairs, external constraint
/// penalties and the shared parameter set.
///
/// A bottle is built incrementally, then sealed with [`PhysicsBottle::finalise`]
/// before any likelihood evaluation. Finalisation checks that every PDF has a
/// dataset and pushes the current parameter values into each PDF. Using an
/// unfinalised bottle is a validation error.
pub struct PhysicsBottle {
    pdfs: Vec<Box<dyn Pdf>>,
    datasets: Vec<DataSet>,
    constraints: Vec<ConstraintFunction>,
    parameters: ParameterSet,
    finalised: bool,
}

impl PhysicsBottle {
    /// Empty bottle over the given parameter set.
    pub fn new(parameters: ParameterSet) -> Self {
        Self {
            pdfs: Vec::new(),
            datasets: Vec::new(),
            constraints: Vec::new(),
            parameters,
            finalised: false,
        }
    }

    /// Add one (PDF, dataset) likelihood term.
    pub fn add_result(&mut self, pdf: Box<dyn Pdf>, data: DataSet) {
        self.pdfs.push(pdf);
        self.datasets.push(data);
        self.finalised = false;
    }

    /// Add a PDF without its dataset (the pairing is checked at finalise).
    pub fn add_pdf(&mut self, pdf: Box<dyn Pdf>) {
        self.pdfs.push(pdf);
        self.finalised = false;
    }

    /// Add a dataset without its PDF (the pairing is checked at finalise).
    pub fn add_dataset(&mut self, data: DataSet) {
        self.datasets.push(data);
        self.finalised = false;
    }

    /// Add an external constraint penalty.
    pub fn add_constraint(&mut self, constraint: ConstraintFunction) {
        self.constraints.push(constraint);
    }

    /// Seal the bottle: validate the PDF/dataset pairing and push the current
    /// parameter values into every PDF.
    pub fn finalise(&mut self) -> Result<()> {
        if self.pdfs.len() != self.datasets.len() {
            return Err(Error::Validation(format!(
                "bottle has {} PDFs but {} datasets",
                self.pdfs.len(),
                self.datasets.len()
            )));
        }
        for pdf in &mut self.pdfs {
            pdf.set_physics_parameters(&self.parameters)?;
        }
        self.finalised = true;
        Ok(())
    }

    /// True once [`PhysicsBottle::finalise`] has succeeded.
    pub fn is_finalised(&self) -> bool {
        self.finalised
    }

    /// Number of (PDF, dataset) pairs.
    pub fn n_results(&self) -> usize {
        self.pdfs.len()
    }

    /// Re-push updated parameter values into every PDF.
    ///
    /// Called once per objective evaluation with the minimiser's trial point.
    pub fn update_parameters(&mut self, params: &ParameterSet) -> Result<()> {
        if !self.finalised {
            return Err(Error::Validation(
                "bottle must be finalised before use".to_string(),
            ));
        }
        self.parameters = params.clone();
        for pdf in &mut self.pdfs {
            pdf.set_physics_parameters(&self.parameters)?;
        }
        Ok(())
    }

    /// The shared parameter set.
    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    /// The external constraint penalties.
    pub fn constraints(&self) -> &[ConstraintFunction] {
        &self.constraints
    }

    /// The i-th (PDF, dataset) pair; requires a finalised bottle.
    pub fn result(&self, index: usize) -> Result<(&dyn Pdf, &DataSet)> {
        if !self.finalised {
            return Err(Error::Validation(
                "bottle must be finalised before use".to_string(),
            ));
        }
        match (self.pdfs.get(index), self.datasets.get(index)) {
            (Some(pdf), Some(data)) => Ok((pdf.as_ref(), data)),
            _ => Err(Error::Validation(format!(
                "result index {index} out of range ({})",
                self.pdfs.len()
            ))),
        }
    }
}
