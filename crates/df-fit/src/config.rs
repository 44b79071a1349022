//! Configuration objects consumed by the assembler and scan orchestrator.

use crate::fit_function::FitFunction;
use crate::minimiser::Minimiser;
use crate::objective::MinimiseConfig;
use crate::registry::MinimiserRegistry;
use df_core::{Error, Result, ScanParam};
use df_model::PhysicsBottle;

/// Recipe for constructing the minimiser of one fit attempt.
pub struct MinimiserConfiguration {
    name: String,
    config: MinimiseConfig,
    contour_pairs: Vec<(String, String)>,
    registry: MinimiserRegistry,
}

impl MinimiserConfiguration {
    /// Configuration resolving `name` against the built-in registry.
    pub fn new(name: impl Into<String>, config: MinimiseConfig) -> Self {
        Self {
            name: name.into(),
            config,
            contour_pairs: Vec::new(),
            registry: MinimiserRegistry::with_builtins(),
        }
    }

    /// Swap in a caller-populated registry.
    pub fn with_registry(mut self, registry: MinimiserRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Request covariance contours for these parameter pairs on every fit.
    pub fn set_contour_pairs(&mut self, pairs: Vec<(String, String)>) {
        self.contour_pairs = pairs;
    }

    /// Construct a minimiser sized to the free-parameter count.
    ///
    /// Unknown minimiser names are validation errors.
    pub fn minimiser(&self, n_free: usize) -> Result<Box<dyn Minimiser>> {
        let mut config = self.config.clone();
        // More parameters need more iterations before giving up.
        config.max_iter = config.max_iter.max(100 * n_free as u64);
        let mut minimiser = self.registry.build(&self.name, config)?;
        minimiser.set_contour_pairs(&self.contour_pairs);
        Ok(minimiser)
    }
}

/// Recipe for constructing the objective of one fit attempt.
#[derive(Debug, Clone, Default)]
pub struct FitFunctionConfiguration {
    weight_name: Option<String>,
    integrator_test: bool,
}

impl FitFunctionConfiguration {
    /// Unweighted configuration with the integrator test enabled.
    pub fn new() -> Self {
        Self { weight_name: None, integrator_test: true }
    }

    /// Use the named dataset column as a per-event weight.
    pub fn with_weight(mut self, weight_name: impl Into<String>) -> Self {
        self.weight_name = Some(weight_name.into());
        self
    }

    /// Enable or disable the up-front normalisation test.
    ///
    /// The scan orchestrator disables it: re-testing the same phase space at
    /// every grid point is pure overhead.
    pub fn set_integrator_test(&mut self, enabled: bool) {
        self.integrator_test = enabled;
    }

    /// Per-event weight column, if any.
    pub fn weight_name(&self) -> Option<&str> {
        self.weight_name.as_deref()
    }

    /// Build the objective over a finalised bottle.
    pub fn fit_function(&self, bottle: PhysicsBottle) -> Result<FitFunction> {
        FitFunction::new(bottle, self.weight_name.clone(), self.integrator_test)
    }
}

/// Holds the scan descriptors and contour requests of one analysis run.
#[derive(Debug, Clone, Default)]
pub struct OutputConfiguration {
    scan_params: Vec<ScanParam>,
    contour_pairs: Vec<(String, String)>,
}

impl OutputConfiguration {
    /// Empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a scan descriptor.
    pub fn add_scan_param(&mut self, param: ScanParam) {
        self.scan_params.push(param);
    }

    /// Register a 2D contour-plot request.
    pub fn add_contour_pair(&mut self, x_name: impl Into<String>, y_name: impl Into<String>) {
        self.contour_pairs.push((x_name.into(), y_name.into()));
    }

    /// Resolve a scan descriptor by parameter name.
    pub fn scan_param(&self, name: &str) -> Result<&ScanParam> {
        self.scan_params
            .iter()
            .find(|p| p.name() == name)
            .ok_or_else(|| Error::Validation(format!("no scan registered for '{name}'")))
    }

    /// Resolve the (outer, inner) descriptor pair of a 2D scan.
    pub fn scan_params_2d(&self, outer: &str, inner: &str) -> Result<(&ScanParam, &ScanParam)> {
        Ok((self.scan_param(outer)?, self.scan_param(inner)?))
    }

    /// Requested contour-plot pairs.
    pub fn contour_pairs(&self) -> &[(String, String)] {
        &self.contour_pairs
    }
}
