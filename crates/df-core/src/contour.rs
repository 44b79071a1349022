//! Contour plots retrieved from the minimiser.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// A set of (x, y) likelihood contours for one parameter pair, one ring per
/// sigma level (1-based).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionContour {
    x_name: String,
    y_name: String,
    levels: Vec<Vec<(f64, f64)>>,
}

impl FunctionContour {
    /// Create storage for `n_levels` sigma rings.
    pub fn new(x_name: impl Into<String>, y_name: impl Into<String>, n_levels: usize) -> Self {
        Self {
            x_name: x_name.into(),
            y_name: y_name.into(),
            levels: vec![Vec::new(); n_levels],
        }
    }

    /// Name of the x-axis parameter.
    pub fn x_name(&self) -> &str {
        &self.x_name
    }

    /// Name of the y-axis parameter.
    pub fn y_name(&self) -> &str {
        &self.y_name
    }

    /// Number of sigma levels.
    pub fn n_levels(&self) -> usize {
        self.levels.len()
    }

    /// Store the ring for `sigma` (1-based).
    pub fn set_level(&mut self, sigma: usize, points: Vec<(f64, f64)>) -> Result<()> {
        if sigma < 1 || sigma > self.levels.len() {
            return Err(Error::Validation(format!(
                "contour sigma value ({sigma}) is invalid, expected 1..={}",
                self.levels.len()
            )));
        }
        self.levels[sigma - 1] = points;
        Ok(())
    }

    /// Retrieve the ring for `sigma` (1-based).
    pub fn level(&self, sigma: usize) -> Result<&[(f64, f64)]> {
        if sigma < 1 || sigma > self.levels.len() {
            return Err(Error::Validation(format!(
                "contour sigma value ({sigma}) is invalid, expected 1..={}",
                self.levels.len()
            )));
        }
        Ok(&self.levels[sigma - 1])
    }
}
