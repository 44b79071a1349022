//! Probability density functions over physics observables.

use crate::data::DataSet;
use df_core::{Error, ParameterSet, Result};
use std::collections::HashMap;

mod decay_time;
mod gaussian_mass;

pub use decay_time::DecayTimePdf;
pub use gaussian_mass::GaussianMassPdf;

/// The narrow contract every physics model implements.
///
/// A PDF is a pure evaluator over its declared observables, parameterised by
/// its declared physics parameters. Parameter values are pushed in before
/// each evaluation pass via [`Pdf::set_physics_parameters`]; evaluation
/// itself is immutable. Numerical normalisation failures are reported as
/// [`Error::Integration`], never panics.
pub trait Pdf: Send + Sync {
    /// Physics parameter names this PDF requires, in a stable order.
    fn parameter_names(&self) -> &[String];

    /// Observable names this PDF evaluates over, in a stable order.
    fn observable_names(&self) -> &[String];

    /// Observables the PDF refuses to have integrated over analytically.
    fn do_not_integrate_list(&self) -> &[String] {
        &[]
    }

    /// Push the current parameter values into the PDF.
    ///
    /// A required parameter missing from `params` is a validation error.
    fn set_physics_parameters(&mut self, params: &ParameterSet) -> Result<()>;

    /// Unnormalised density at one event of the dataset.
    fn evaluate(&self, data: &DataSet, event: usize) -> Result<f64>;

    /// Analytic integral of the density over the dataset's observable bounds.
    fn normalisation(&self, data: &DataSet) -> Result<f64>;

    /// Clone into a boxed trait object (prototype cloning for data recipes).
    fn clone_box(&self) -> Box<dyn Pdf>;
}

impl Clone for Box<dyn Pdf> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Constructor signature stored in the [`PdfRegistry`].
pub type PdfFactory = fn() -> Box<dyn Pdf>;

/// Name-to-constructor registry for PDFs.
///
/// Replaces by-name dispatch with an extensible table populated at startup.
pub struct PdfRegistry {
    factories: HashMap<&'static str, PdfFactory>,
}

impl PdfRegistry {
    /// Registry holding the built-in models.
    pub fn with_builtins() -> Self {
        let mut registry = Self { factories: HashMap::new() };
        registry.register("DecayTime", || Box::new(DecayTimePdf::new()));
        registry.register("GaussianMass", || Box::new(GaussianMassPdf::new()));
        registry
    }

    /// Register (or override) a factory under `name`.
    pub fn register(&mut self, name: &'static str, factory: PdfFactory) {
        self.factories.insert(name, factory);
    }

    /// Construct a PDF by name.
    pub fn build(&self, name: &str) -> Result<Box<dyn Pdf>> {
        self.factories
            .get(name)
            .map(|f| f())
            .ok_or_else(|| Error::Validation(format!("unknown PDF '{name}'")))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_builds_builtins() {
        let registry = PdfRegistry::with_builtins();
        assert_eq!(registry.names(), vec!["DecayTime", "GaussianMass"]);

        let pdf = registry.build("DecayTime").unwrap();
        assert_eq!(pdf.observable_names(), ["time"]);
        assert!(registry.build("NoSuchPdf").is_err());
    }
}
