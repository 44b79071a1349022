//! Columnar dataset of physics observables.

use df_core::{Error, Result};
use std::collections::HashMap;

/// Columnar (SoA) container of observable values plus per-observable bounds.
///
/// The bounds describe the phase-space box the PDFs normalise over; every
/// stored value is expected to lie inside it.
#[derive(Debug, Clone)]
pub struct DataSet {
    columns: Vec<(String, Vec<f64>)>,
    bounds: HashMap<String, (f64, f64)>,
    n_events: usize,
}

impl DataSet {
    /// Build a dataset from named columns and per-observable bounds.
    ///
    /// All columns must have equal length and every column needs a bounds
    /// entry with `low < high`.
    pub fn new(
        columns: Vec<(String, Vec<f64>)>,
        bounds: Vec<(String, (f64, f64))>,
    ) -> Result<Self> {
        let bounds: HashMap<String, (f64, f64)> = bounds.into_iter().collect();
        let n_events = columns.first().map(|(_, v)| v.len()).unwrap_or(0);

        for (name, values) in &columns {
            if values.len() != n_events {
                return Err(Error::Validation(format!(
                    "column '{name}' length {} != {n_events}",
                    values.len()
                )));
            }
            let (low, high) = bounds.get(name).copied().ok_or_else(|| {
                Error::Validation(format!("missing bounds for observable '{name}'"))
            })?;
            if !(low < high) {
                return Err(Error::Validation(format!(
                    "invalid bounds for '{name}': expected low < high, got ({low}, {high})"
                )));
            }
        }

        Ok(Self { columns, bounds, n_events })
    }

    /// Number of events.
    pub fn n_events(&self) -> usize {
        self.n_events
    }

    /// Observable names in column order.
    pub fn observable_names(&self) -> Vec<String> {
        self.columns.iter().map(|(n, _)| n.clone()).collect()
    }

    /// True if a column with this name exists.
    pub fn has_observable(&self, name: &str) -> bool {
        self.columns.iter().any(|(n, _)| n == name)
    }

    /// Values of one observable column.
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_slice())
    }

    /// Phase-space bounds of one observable.
    pub fn bounds(&self, name: &str) -> Option<(f64, f64)> {
        self.bounds.get(name).copied()
    }

    /// One observable value at one event.
    pub fn value(&self, name: &str, event: usize) -> Result<f64> {
        let column = self
            .column(name)
            .ok_or_else(|| Error::Validation(format!("missing column '{name}'")))?;
        column.get(event).copied().ok_or_else(|| {
            Error::Validation(format!("event index {event} out of range ({})", self.n_events))
        })
    }
}
