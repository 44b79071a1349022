//! Lazy binding of a PDF prototype to the data it will be fitted to.

use crate::data::DataSet;
use crate::pdf::Pdf;
use df_core::{Error, ParameterSet, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// How the dataset for a fit is obtained.
#[derive(Clone)]
pub enum DataRecipe {
    /// Use a caller-provided dataset as-is.
    Provided(DataSet),
    /// Generate a toy dataset from the PDF itself by accept-reject sampling
    /// over the given observable bounds.
    Toy {
        /// Phase-space box to sample, one entry per observable.
        bounds: Vec<(String, (f64, f64))>,
        /// Number of events to generate.
        n_events: usize,
        /// Seed for reproducible generation.
        seed: u64,
    },
}

/// A PDF prototype plus the recipe for its dataset.
///
/// [`PdfWithData::realise`] produces a fresh `(pdf, dataset)` pair for one
/// fit attempt: the PDF prototype is cloned and loaded with the current
/// parameter values, and toy data is generated on first use then cached.
/// [`PdfWithData::regenerate`] discards the cache with a new seed, which is
/// how toy studies obtain an independent dataset per repeat.
#[derive(Clone)]
pub struct PdfWithData {
    prototype: Box<dyn Pdf>,
    recipe: DataRecipe,
    cached: Option<DataSet>,
}

impl PdfWithData {
    /// Bind a PDF prototype to a data recipe.
    pub fn new(prototype: Box<dyn Pdf>, recipe: DataRecipe) -> Self {
        Self { prototype, recipe, cached: None }
    }

    /// The bound PDF prototype.
    pub fn pdf(&self) -> &dyn Pdf {
        self.prototype.as_ref()
    }

    /// Produce the (PDF, dataset) pair for one fit attempt.
    pub fn realise(&mut self, params: &ParameterSet) -> Result<(Box<dyn Pdf>, DataSet)> {
        let mut pdf = self.prototype.clone();
        pdf.set_physics_parameters(params)?;

        let data = match (&self.cached, &self.recipe) {
            (Some(data), _) => data.clone(),
            (None, DataRecipe::Provided(data)) => data.clone(),
            (None, DataRecipe::Toy { bounds, n_events, seed }) => {
                let data = generate_toy(pdf.as_ref(), bounds, *n_events, *seed)?;
                self.cached = Some(data.clone());
                data
            }
        };
        Ok((pdf, data))
    }

    /// Discard cached toy data and reseed the generator.
    ///
    /// No-op for provided datasets.
    pub fn regenerate(&mut self, new_seed: u64) {
        if let DataRecipe::Toy { seed, .. } = &mut self.recipe {
            *seed = new_seed;
            self.cached = None;
        }
    }
}

/// Accept-reject sampling of `n_events` from the PDF over the bounds box.
fn generate_toy(
    pdf: &dyn Pdf,
    bounds: &[(String, (f64, f64))],
    n_events: usize,
    seed: u64,
) -> Result<DataSet> {
    if bounds.is_empty() {
        return Err(Error::Validation(
            "toy generation needs at least one bounded observable".to_string(),
        ));
    }
    let mut rng = StdRng::seed_from_u64(seed);

    // Envelope estimate: densest of a uniform probe of the box, padded.
    let n_probe = 2_000;
    let probe = uniform_box(&mut rng, bounds, n_probe)?;
    let mut f_max = 0.0_f64;
    for event in 0..n_probe {
        f_max = f_max.max(pdf.evaluate(&probe, event)?);
    }
    if !(f_max.is_finite() && f_max > 0.0) {
        return Err(Error::Computation(format!(
            "toy envelope is not positive: {f_max}"
        )));
    }
    f_max *= 1.2;

    let mut columns: Vec<(String, Vec<f64>)> = bounds
        .iter()
        .map(|(name, _)| (name.clone(), Vec::with_capacity(n_events)))
        .collect();
    let mut accepted = 0;
    // Bail out if acceptance collapses rather than looping forever.
    let max_draws = 1_000 * n_events.max(1);
    let mut draws = 0;
    while accepted < n_events {
        if draws >= max_draws {
            return Err(Error::Computation(format!(
                "toy generation accepted only {accepted}/{n_events} events after {draws} draws"
            )));
        }
        let batch = 512.min(max_draws - draws);
        let candidates = uniform_box(&mut rng, bounds, batch)?;
        draws += batch;
        for event in 0..batch {
            if accepted >= n_events {
                break;
            }
            let f = pdf.evaluate(&candidates, event)?;
            if rng.random_range(0.0..f_max) <= f {
                for (i, (name, _)) in bounds.iter().enumerate() {
                    columns[i].1.push(candidates.value(name, event)?);
                }
                accepted += 1;
            }
        }
    }

    log::debug!(
        "toy generation: {n_events} events accepted from {draws} draws (seed {seed})"
    );
    DataSet::new(columns, bounds.to_vec())
}

/// Uniform draws over the bounds box, packaged as a dataset.
fn uniform_box(
    rng: &mut StdRng,
    bounds: &[(String, (f64, f64))],
    n: usize,
) -> Result<DataSet> {
    let columns = bounds
        .iter()
        .map(|(name, (low, high))| {
            let values = (0..n).map(|_| rng.random_range(*low..*high)).collect();
            (name.clone(), values)
        })
        .collect();
    DataSet::new(columns, bounds.to_vec())
}
