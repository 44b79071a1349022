//! Name-to-constructor registry for minimisers.

use crate::minimiser::{LbfgsMinimiser, Minimiser, NelderMeadMinimiser};
use crate::objective::MinimiseConfig;
use df_core::{Error, Result};
use std::collections::HashMap;

/// Constructor signature stored in the [`MinimiserRegistry`].
pub type MinimiserFactory = fn(MinimiseConfig) -> Box<dyn Minimiser>;

/// Registry resolving minimiser names to constructors.
pub struct MinimiserRegistry {
    factories: HashMap<&'static str, MinimiserFactory>,
}

impl MinimiserRegistry {
    /// Registry holding the built-in minimisers (`lbfgs`, `neldermead`).
    pub fn with_builtins() -> Self {
        let mut registry = Self { factories: HashMap::new() };
        registry.register("lbfgs", |config| Box::new(LbfgsMinimiser::new(config)));
        registry.register("neldermead", |config| Box::new(NelderMeadMinimiser::new(config)));
        registry
    }

    /// Register (or override) a factory under `name`.
    pub fn register(&mut self, name: &'static str, factory: MinimiserFactory) {
        self.factories.insert(name, factory);
    }

    /// Construct a minimiser by name.
    pub fn build(&self, name: &str, config: MinimiseConfig) -> Result<Box<dyn Minimiser>> {
        self.factories
            .get(name)
            .map(|f| f(config))
            .ok_or_else(|| Error::Validation(format!("unknown minimiser '{name}'")))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for MinimiserRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_resolve() {
        let registry = MinimiserRegistry::with_builtins();
        assert_eq!(registry.names(), vec!["lbfgs", "neldermead"]);
        assert!(registry.build("lbfgs", MinimiseConfig::default()).is_ok());
        assert!(registry.build("minuit", MinimiseConfig::default()).is_err());
    }
}
