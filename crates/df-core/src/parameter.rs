//! Physics parameters and the ordered parameter set shared across a fit.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Whether the minimiser may vary a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterType {
    /// Varied by the minimiser.
    Free,
    /// Held constant during minimisation.
    Fixed,
    /// Held constant and skipped in human-readable output.
    Hidden,
}

impl ParameterType {
    /// True for `Fixed` and `Hidden`.
    pub fn is_fixed(self) -> bool {
        !matches!(self, ParameterType::Free)
    }
}

/// A single named physics quantity with bounds, status and optional blinding.
///
/// The stored `value` is always the true value; blinded accessors apply the
/// blinding offset on the way in and out so that scan machinery and printed
/// output never see the unblinded number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhysicsParameter {
    name: String,
    value: f64,
    original_value: f64,
    minimum: f64,
    maximum: f64,
    ptype: ParameterType,
    unit: String,
    blind_offset: f64,
}

impl PhysicsParameter {
    /// Create a new parameter. `minimum <= value <= maximum` is required.
    pub fn new(
        name: impl Into<String>,
        value: f64,
        minimum: f64,
        maximum: f64,
        ptype: ParameterType,
        unit: impl Into<String>,
    ) -> Result<Self> {
        let name = name.into();
        if !(minimum <= value && value <= maximum) {
            return Err(Error::Validation(format!(
                "parameter '{name}': value {value} outside bounds [{minimum}, {maximum}]"
            )));
        }
        Ok(Self {
            name,
            value,
            original_value: value,
            minimum,
            maximum,
            ptype,
            unit: unit.into(),
            blind_offset: 0.0,
        })
    }

    /// Parameter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True (unblinded) value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Set the true value.
    pub fn set_value(&mut self, value: f64) {
        self.value = value;
    }

    /// Value as seen by the outside world (true value plus blinding offset).
    pub fn blinded_value(&self) -> f64 {
        self.value + self.blind_offset
    }

    /// Set the value from a blinded coordinate.
    pub fn set_blinded_value(&mut self, blinded: f64) {
        self.value = blinded - self.blind_offset;
    }

    /// Enable blinding with the given additive offset.
    pub fn set_blind_offset(&mut self, offset: f64) {
        self.blind_offset = offset;
    }

    /// Value the parameter was constructed with.
    pub fn original_value(&self) -> f64 {
        self.original_value
    }

    /// Lower bound.
    pub fn minimum(&self) -> f64 {
        self.minimum
    }

    /// Upper bound.
    pub fn maximum(&self) -> f64 {
        self.maximum
    }

    /// Free/Fixed/Hidden status.
    pub fn ptype(&self) -> ParameterType {
        self.ptype
    }

    /// Change the Free/Fixed/Hidden status.
    pub fn set_ptype(&mut self, ptype: ParameterType) {
        self.ptype = ptype;
    }

    /// Physical unit label.
    pub fn unit(&self) -> &str {
        &self.unit
    }
}

/// Ordered, unique-name collection of [`PhysicsParameter`].
///
/// Insertion order is preserved; it defines the parameter order everywhere
/// downstream (free-vector layout, result schemas).
#[derive(Debug, Clone, Default)]
pub struct ParameterSet {
    parameters: Vec<PhysicsParameter>,
    index: HashMap<String, usize>,
}

impl ParameterSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter. Duplicate names are a validation error.
    pub fn add(&mut self, parameter: PhysicsParameter) -> Result<()> {
        if self.index.contains_key(parameter.name()) {
            return Err(Error::Validation(format!(
                "duplicate parameter '{}'",
                parameter.name()
            )));
        }
        self.index.insert(parameter.name().to_string(), self.parameters.len());
        self.parameters.push(parameter);
        Ok(())
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    /// True if the set holds no parameters.
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// True if a parameter with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Look up a parameter by name.
    pub fn get(&self, name: &str) -> Result<&PhysicsParameter> {
        self.index
            .get(name)
            .map(|&i| &self.parameters[i])
            .ok_or_else(|| Error::Validation(format!("unknown parameter '{name}'")))
    }

    /// Look up a parameter mutably by name.
    pub fn get_mut(&mut self, name: &str) -> Result<&mut PhysicsParameter> {
        match self.index.get(name) {
            Some(&i) => Ok(&mut self.parameters[i]),
            None => Err(Error::Validation(format!("unknown parameter '{name}'"))),
        }
    }

    /// All parameter names in insertion order.
    pub fn names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name().to_string()).collect()
    }

    /// Names of parameters the minimiser may vary, in insertion order.
    pub fn free_names(&self) -> Vec<String> {
        self.parameters
            .iter()
            .filter(|p| p.ptype() == ParameterType::Free)
            .map(|p| p.name().to_string())
            .collect()
    }

    /// Names of parameters held constant (Fixed or Hidden), in insertion order.
    pub fn fixed_names(&self) -> Vec<String> {
        self.parameters
            .iter()
            .filter(|p| p.ptype().is_fixed())
            .map(|p| p.name().to_string())
            .collect()
    }

    /// Number of free parameters.
    pub fn float_count(&self) -> usize {
        self.parameters.iter().filter(|p| p.ptype() == ParameterType::Free).count()
    }

    /// Iterate over the parameters in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &PhysicsParameter> {
        self.parameters.iter()
    }

    /// Extract a reduced set containing `names` in the requested order.
    ///
    /// A missing name is a validation error naming the parameter.
    pub fn subset(&self, names: &[String]) -> Result<ParameterSet> {
        let mut out = ParameterSet::new();
        for name in names {
            out.add(self.get(name)?.clone())?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gamma() -> PhysicsParameter {
        PhysicsParameter::new("gamma", 0.66, 0.0, 2.0, ParameterType::Free, "ps^{-1}").unwrap()
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut set = ParameterSet::new();
        set.add(gamma()).unwrap();
        assert!(set.add(gamma()).is_err());
    }

    #[test]
    fn test_ordering_preserved_by_subset() {
        let mut set = ParameterSet::new();
        set.add(gamma()).unwrap();
        set.add(
            PhysicsParameter::new("deltaGamma", 0.1, -1.0, 1.0, ParameterType::Free, "ps^{-1}")
                .unwrap(),
        )
        .unwrap();

        let sub = set
            .subset(&["deltaGamma".to_string(), "gamma".to_string()])
            .unwrap();
        assert_eq!(sub.names(), vec!["deltaGamma", "gamma"]);
    }

    #[test]
    fn test_blinded_accessors_round_trip() {
        let mut p = gamma();
        p.set_blind_offset(0.5);
        assert!((p.blinded_value() - 1.16).abs() < 1e-12);
        p.set_blinded_value(1.0);
        assert!((p.value() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_free_and_fixed_names() {
        let mut set = ParameterSet::new();
        set.add(gamma()).unwrap();
        set.add(PhysicsParameter::new("tagEff", 0.3, 0.0, 1.0, ParameterType::Fixed, "").unwrap())
            .unwrap();
        set.add(PhysicsParameter::new("scale", 1.0, 0.0, 2.0, ParameterType::Hidden, "").unwrap())
            .unwrap();

        assert_eq!(set.free_names(), vec!["gamma"]);
        assert_eq!(set.fixed_names(), vec!["tagEff", "scale"]);
        assert_eq!(set.float_count(), 1);
    }

    #[test]
    fn test_out_of_bounds_value_rejected() {
        assert!(
            PhysicsParameter::new("gamma", 3.0, 0.0, 2.0, ParameterType::Free, "").is_err()
        );
    }
}
