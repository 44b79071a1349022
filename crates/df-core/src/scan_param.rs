//! Scan descriptors: which parameter to scan, over what grid.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Immutable description of a 1D parameter scan grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanParam {
    name: String,
    minimum: f64,
    maximum: f64,
    points: usize,
}

impl ScanParam {
    /// Create a scan descriptor. Requires `points >= 1` and `minimum <= maximum`.
    pub fn new(name: impl Into<String>, minimum: f64, maximum: f64, points: usize) -> Result<Self> {
        let name = name.into();
        if points == 0 {
            return Err(Error::Validation(format!("scan '{name}': points must be >= 1")));
        }
        if !(minimum <= maximum) {
            return Err(Error::Validation(format!(
                "scan '{name}': minimum {minimum} > maximum {maximum}"
            )));
        }
        Ok(Self { name, minimum, maximum, points })
    }

    /// Scanned parameter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Grid lower edge.
    pub fn minimum(&self) -> f64 {
        self.minimum
    }

    /// Grid upper edge.
    pub fn maximum(&self) -> f64 {
        self.maximum
    }

    /// Number of grid points.
    pub fn points(&self) -> usize {
        self.points
    }

    /// Grid spacing; 0 for a single-point scan.
    pub fn step(&self) -> f64 {
        if self.points == 1 {
            0.0
        } else {
            (self.maximum - self.minimum) / (self.points as f64 - 1.0)
        }
    }

    /// The i-th grid value `minimum + i * step`.
    pub fn grid_value(&self, i: usize) -> f64 {
        self.minimum + self.step() * i as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_grid_values() {
        let scan = ScanParam::new("gamma", 0.5, 0.9, 5).unwrap();
        assert_relative_eq!(scan.step(), 0.1);
        assert_relative_eq!(scan.grid_value(0), 0.5);
        assert_relative_eq!(scan.grid_value(4), 0.9);
    }

    #[test]
    fn test_single_point_scan_has_zero_step() {
        let scan = ScanParam::new("gamma", 0.5, 0.9, 1).unwrap();
        assert_relative_eq!(scan.step(), 0.0);
        assert_relative_eq!(scan.grid_value(0), 0.5);
    }

    #[test]
    fn test_invalid_descriptors_rejected() {
        assert!(ScanParam::new("gamma", 0.5, 0.9, 0).is_err());
        assert!(ScanParam::new("gamma", 0.9, 0.5, 3).is_err());
    }
}
